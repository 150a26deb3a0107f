//! Console printing of inbound messages.

use core::fmt;

use crate::config::HANDLER_COPY_CAPACITY;
use crate::session::{InboundMessage, MessageSink};

/// Copies at most [`HANDLER_COPY_CAPACITY`] bytes of `payload` into `buf` and
/// writes a zero terminator right after them.
///
/// Returns the number of payload bytes copied.
pub fn terminated_copy(payload: &[u8], buf: &mut [u8; HANDLER_COPY_CAPACITY + 1]) -> usize {
    let len = payload.len().min(HANDLER_COPY_CAPACITY);
    buf[..len].copy_from_slice(&payload[..len]);
    buf[len] = 0;
    len
}

/// The longest printable prefix: up to the first NUL and the last complete character.
fn printable(bytes: &[u8]) -> &str {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    let bytes = &bytes[..end];
    match core::str::from_utf8(bytes) {
        Ok(text) => text,
        Err(err) => core::str::from_utf8(&bytes[..err.valid_up_to()]).unwrap_or_default(),
    }
}

/// Prints every inbound message as `Topic:<topic> -- Payload: <text>`.
///
/// The payload is copied into a local buffer first; nothing of the message
/// outlives the call.
///
/// ```rust
/// use sensornode::node::PrintSink;
/// use sensornode::session::{InboundMessage, MessageSink, QoS};
///
/// let mut sink = PrintSink::new(String::new());
/// sink.on_message(&InboundMessage {
///     topic: "sensornode/cmd",
///     payload: b"reboot",
///     qos: QoS::AtMostOnce,
///     retained: false,
/// });
/// assert_eq!(sink.into_inner(), "Topic:sensornode/cmd -- Payload: reboot\n");
/// ```
#[derive(Debug)]
pub struct PrintSink<W: fmt::Write> {
    out: W,
}

impl<W: fmt::Write> PrintSink<W> {
    /// Creates a sink printing to `out`.
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Returns the underlying writer.
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: fmt::Write> MessageSink for PrintSink<W> {
    fn on_message(&mut self, message: &InboundMessage<'_>) {
        let mut buf = [0u8; HANDLER_COPY_CAPACITY + 1];
        let len = terminated_copy(message.payload, &mut buf);
        if len < message.payload.len() {
            debug!("inbound payload truncated from {} to {} bytes", message.payload.len(), len);
        }
        let text = printable(&buf[..len]);
        if write!(self.out, "Topic:{} -- Payload: {}\n", message.topic, text).is_err() {
            warn!("console rejected inbound message output");
        }
    }
}
