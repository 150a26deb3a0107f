//! Reading serialization and publishing.

use core::fmt::Write as _;

use heapless::String;

use crate::config::PAYLOAD_CAPACITY;
use crate::error::Status;
use crate::session::{MessagingSession, OutboundMessage, QoS};

/// A formatted reading.
pub type Payload = String<PAYLOAD_CAPACITY>;

/// Formats `"Data from device: <counter>"` into a buffer of capacity `N`.
///
/// # Errors
///
/// [`Status::EOVERFLOW`] if the text does not fit.
pub fn format_into<const N: usize>(counter: u32) -> Result<String<N>, Status> {
    let mut payload = String::new();
    write!(payload, "Data from device: {}", counter).map_err(|_| Status::EOVERFLOW)?;
    Ok(payload)
}

/// Formats the reading tagged with `counter`.
///
/// ```rust
/// use sensornode::node::payload::format_reading;
///
/// let payload = format_reading(42).unwrap();
/// assert_eq!(payload.as_str(), "Data from device: 42");
/// ```
pub fn format_reading(counter: u32) -> Result<Payload, Status> {
    format_into(counter)
}

/// Publishes the reading tagged with `counter` to `topic`, QoS 0, not retained.
///
/// Returns the session's status unchanged; there is no retry.
pub fn publish_reading<S>(session: &mut S, topic: &str, counter: u32) -> Result<(), Status>
where
    S: MessagingSession + ?Sized,
{
    let payload = format_reading(counter)?;
    let message = OutboundMessage {
        qos: QoS::AtMostOnce,
        payload: payload.as_bytes(),
        retained: false,
    };
    trace!("publishing {} bytes to {}", payload.len(), topic);
    session.publish(topic, &message)
}
