//! Messaging session boundary.
//!
//! [`MessagingSession`] is what the node needs from an MQTT client: a
//! handshake, one subscription, fire-and-forget publishing, and a
//! time-sliced [`dispatch`](MessagingSession::dispatch) during which inbound
//! messages are handed to a [`MessageSink`].
//!
//! Inbound messages are lent to the sink, never given away: the session
//! reuses the receive buffer as soon as [`MessageSink::on_message`] returns,
//! and the borrow checker keeps the sink from holding on to it.
//!
//! [`mqtt::MqttSession`] implements the trait over any
//! [`Connection`](crate::network::Connection).

pub mod mqtt;

use crate::error::Status;

/// MQTT protocol revision used for the CONNECT handshake.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ProtocolVersion {
    /// MQTT 3.1 (`MQIsdp`, level 3).
    V3_1,
    /// MQTT 3.1.1 (`MQTT`, level 4).
    V3_1_1,
}

/// Quality of Service levels for MQTT messages.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum QoS {
    /// At most once delivery. Fire and forget.
    AtMostOnce = 0,
    /// At least once delivery.
    AtLeastOnce = 1,
    /// Exactly once delivery.
    ExactlyOnce = 2,
}

impl QoS {
    /// Decodes the two QoS bits of a PUBLISH header.
    pub const fn from_bits(bits: u8) -> Option<QoS> {
        match bits {
            0 => Some(QoS::AtMostOnce),
            1 => Some(QoS::AtLeastOnce),
            2 => Some(QoS::ExactlyOnce),
            _ => None,
        }
    }
}

/// Millisecond clock used for command timeouts and dispatch budgets.
pub trait Timer {
    /// Milliseconds since an arbitrary, fixed origin.
    fn now_ms(&self) -> u64;
}

/// Parameters for creating a session.
#[derive(Debug)]
pub struct SessionConfig<'b, S> {
    /// Hardware timer the platform should use for the session's clock.
    pub timer_id: u32,
    /// The connected transport.
    pub socket: S,
    /// Upper bound on waiting for any single acknowledgement.
    pub command_timeout_ms: u32,
    /// Buffer outbound packets are assembled in.
    pub send_buffer: &'b mut [u8],
    /// Buffer inbound packets are read into.
    pub recv_buffer: &'b mut [u8],
}

/// Parameters of one CONNECT handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectConfig<'a> {
    /// Protocol revision.
    pub version: ProtocolVersion,
    /// Keep-alive interval in milliseconds, `0` to disable.
    pub keep_alive_ms: u32,
    /// Client identifier.
    pub client_id: &'a str,
    /// Optional user name.
    pub username: Option<&'a str>,
    /// Optional password. Only sent together with a user name.
    pub password: Option<&'a str>,
}

/// A message received on a subscribed topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InboundMessage<'a> {
    /// Topic the message was published to.
    pub topic: &'a str,
    /// Raw payload. Not terminated.
    pub payload: &'a [u8],
    /// Delivery guarantee the message arrived with.
    pub qos: QoS,
    /// Whether the broker delivered a retained value.
    pub retained: bool,
}

/// A message to publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutboundMessage<'a> {
    /// Delivery guarantee.
    pub qos: QoS,
    /// Payload.
    pub payload: &'a [u8],
    /// Ask the broker to retain the message.
    pub retained: bool,
}

/// Receiver of inbound messages during [`MessagingSession::dispatch`].
///
/// Any `FnMut(&InboundMessage)` closure is a sink.
pub trait MessageSink {
    /// Handle one message. Must not panic.
    fn on_message(&mut self, message: &InboundMessage<'_>);
}

impl<F> MessageSink for F
where
    F: FnMut(&InboundMessage<'_>),
{
    fn on_message(&mut self, message: &InboundMessage<'_>) {
        self(message)
    }
}

/// An initialized messaging session.
pub trait MessagingSession {
    /// Perform the CONNECT handshake.
    fn connect(&mut self, config: &ConnectConfig<'_>) -> Result<(), Status>;

    /// Subscribe to `topic`.
    fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), Status>;

    /// Publish `message` to `topic`.
    fn publish(&mut self, topic: &str, message: &OutboundMessage<'_>) -> Result<(), Status>;

    /// Service inbound traffic and keep-alives for `budget_ms`, handing every
    /// received message to `sink`.
    fn dispatch(&mut self, budget_ms: u32, sink: &mut dyn MessageSink) -> Result<(), Status>;
}
