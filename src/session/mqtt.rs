//! An MQTT 3.1.1 session based on the MQTT 3.1.1 specification.
//!
//! [`MqttSession`] speaks the protocol over any [`Connection`] and never
//! allocates: outbound packets are assembled in the caller's send buffer and
//! inbound packets are read into the caller's receive buffer. Waiting is
//! bounded by a [`Timer`]: acknowledgements by the command timeout,
//! [`dispatch`](MessagingSession::dispatch) by its budget.
//!
//! # Examples
//!
//! ```rust,no_run
//! use sensornode::session::mqtt::MqttSession;
//! use sensornode::session::{ConnectConfig, MessagingSession, ProtocolVersion, SessionConfig, Timer};
//! # use sensornode::network::Connection;
//! # struct TcpConnection;
//! # impl Connection for TcpConnection {}
//! # impl sensornode::network::Read for TcpConnection {
//! #     type Error = ();
//! #     fn read(&mut self, _buf: &mut [u8]) -> Result<usize, Self::Error> { Ok(0) }
//! # }
//! # impl sensornode::network::Write for TcpConnection {
//! #     type Error = ();
//! #     fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> { Ok(buf.len()) }
//! #     fn flush(&mut self) -> Result<(), Self::Error> { Ok(()) }
//! # }
//! # impl sensornode::network::Close for TcpConnection {
//! #     type Error = ();
//! #     fn close(self) -> Result<(), Self::Error> { Ok(()) }
//! # }
//! # struct Clock;
//! # impl Timer for Clock { fn now_ms(&self) -> u64 { 0 } }
//!
//! let mut send = [0u8; 256];
//! let mut recv = [0u8; 256];
//! let config = SessionConfig {
//!     timer_id: 1,
//!     socket: TcpConnection,
//!     command_timeout_ms: 20_000,
//!     send_buffer: &mut send,
//!     recv_buffer: &mut recv,
//! };
//! let mut session = MqttSession::new(config, Clock).unwrap();
//! session.connect(&ConnectConfig {
//!     version: ProtocolVersion::V3_1_1,
//!     keep_alive_ms: 60_000,
//!     client_id: "weather_station",
//!     username: None,
//!     password: None,
//! })?;
//! # Ok::<(), sensornode::error::Status>(())
//! ```

use core::ops::Range;

use heapless::Vec;

use super::{
    ConnectConfig, InboundMessage, MessageSink, MessagingSession, OutboundMessage,
    ProtocolVersion, QoS, SessionConfig, Timer,
};
use crate::error::Status;
use crate::network::{self, Connection, Read};

// MQTT Control Packet types - these are the fixed header packet type values
const CONNECT: u8 = 0x10;
const CONNACK: u8 = 0x20;
const PUBLISH: u8 = 0x30;
const PUBACK: u8 = 0x40;
const PUBREC: u8 = 0x50;
const PUBREL: u8 = 0x62;
const PUBREL_TYPE: u8 = 0x60;
const PUBCOMP: u8 = 0x70;
const SUBSCRIBE: u8 = 0x82;
const SUBACK: u8 = 0x90;
const PINGREQ: u8 = 0xC0;
const PINGRESP: u8 = 0xD0;

const PACKET_TYPE_MASK: u8 = 0xF0;

// CONNECT flags
const CLEAN_SESSION: u8 = 0x02;
const PASSWORD_FLAG: u8 = 0x40;
const USERNAME_FLAG: u8 = 0x80;

/// SUBACK return code signalling a rejected subscription.
const SUBACK_FAILURE: u8 = 0x80;

/// Bytes kept free at the front of the send buffer for the fixed header.
const HEADER_RESERVE: usize = 5;

/// Largest value the remaining length field can carry.
const MAX_REMAINING_LENGTH: usize = 268_435_455;

/// An MQTT session over a byte-stream connection.
///
/// Borrows its send and receive buffers for `'b`.
pub struct MqttSession<'b, C: Connection, T: Timer> {
    connection: C,
    timer: T,
    command_timeout_ms: u32,
    send_buf: &'b mut [u8],
    recv_buf: &'b mut [u8],
    keep_alive_ms: u32,
    last_tx_ms: u64,
    ping_outstanding: bool,
    next_packet_id: u16,
    is_connected: bool,
}

impl<C: Connection, T: Timer> core::fmt::Debug for MqttSession<'_, C, T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MqttSession")
            .field("command_timeout_ms", &self.command_timeout_ms)
            .field("send_buf_len", &self.send_buf.len())
            .field("recv_buf_len", &self.recv_buf.len())
            .field("keep_alive_ms", &self.keep_alive_ms)
            .field("is_connected", &self.is_connected)
            .finish()
    }
}

impl<'b, C: Connection, T: Timer> MqttSession<'b, C, T> {
    /// Creates an unconnected session.
    ///
    /// # Errors
    ///
    /// [`Status::EINVAL`] if the send buffer cannot hold a fixed header plus
    /// a body, or the receive buffer is empty.
    pub fn new(config: SessionConfig<'b, C>, timer: T) -> Result<Self, Status> {
        if config.send_buffer.len() <= HEADER_RESERVE || config.recv_buffer.is_empty() {
            return Err(Status::EINVAL);
        }
        let now = timer.now_ms();
        Ok(Self {
            connection: config.socket,
            timer,
            command_timeout_ms: config.command_timeout_ms,
            send_buf: config.send_buffer,
            recv_buf: config.recv_buffer,
            keep_alive_ms: 0,
            last_tx_ms: now,
            ping_outstanding: false,
            next_packet_id: 0,
            is_connected: false,
        })
    }

    /// Whether the CONNECT handshake succeeded and the link is still considered alive.
    pub fn is_connected(&self) -> bool {
        self.is_connected
    }

    /// The underlying connection.
    pub fn connection(&self) -> &C {
        &self.connection
    }

    /// The underlying connection, mutably.
    pub fn connection_mut(&mut self) -> &mut C {
        &mut self.connection
    }

    fn deadline(&self, ms: u32) -> u64 {
        self.timer.now_ms().saturating_add(u64::from(ms))
    }

    fn ensure_connected(&self) -> Result<(), Status> {
        if self.is_connected {
            Ok(())
        } else {
            Err(Status::ENOTCONN)
        }
    }

    fn next_packet_id(&mut self) -> u16 {
        // Packet identifier 0 is reserved.
        self.next_packet_id = self.next_packet_id.wrapping_add(1).max(1);
        self.next_packet_id
    }

    /// Assembles a packet with `body` and writes it to the connection.
    fn send_packet<F>(&mut self, first_byte: u8, body: F) -> Result<(), Status>
    where
        F: FnOnce(&mut Encoder<'_>) -> Result<(), Status>,
    {
        let mut encoder = Encoder::new(&mut *self.send_buf);
        body(&mut encoder)?;
        let frame = encoder.finish(first_byte)?;

        trace!("mqtt: tx {:#x}, {} bytes", first_byte, frame.len());
        network::write_all(&mut self.connection, &self.send_buf[frame])?;
        self.connection.flush().map_err(|_| Status::EIO)?;
        self.last_tx_ms = self.timer.now_ms();
        Ok(())
    }

    /// Reads one packet into the receive buffer.
    ///
    /// Returns `None` if no packet started before `deadline`. Once the first
    /// byte arrived the rest of the packet gets the full command timeout.
    fn read_packet(&mut self, deadline: u64) -> Result<Option<(u8, usize)>, Status> {
        let mut header = [0u8; 1];
        if fill(&mut self.connection, &self.timer, &mut header, deadline)? == 0 {
            return Ok(None);
        }

        let deadline = self.deadline(self.command_timeout_ms);
        let mut remaining_len = 0usize;
        let mut multiplier = 1usize;
        let mut digits = 0;
        loop {
            let mut digit = [0u8; 1];
            if fill(&mut self.connection, &self.timer, &mut digit, deadline)? == 0 {
                return Err(Status::ETIMEDOUT);
            }
            remaining_len += (digit[0] as usize & 127) * multiplier;
            multiplier *= 128;
            digits += 1;
            if digit[0] & 0x80 == 0 {
                break;
            }
            if digits == 4 {
                return Err(Status::EPROTO);
            }
        }

        if remaining_len > self.recv_buf.len() {
            warn!("mqtt: inbound packet of {} bytes exceeds the receive buffer", remaining_len);
            let mut left = remaining_len;
            while left > 0 {
                let chunk = left.min(self.recv_buf.len());
                let n = fill(&mut self.connection, &self.timer, &mut self.recv_buf[..chunk], deadline)?;
                if n < chunk {
                    return Err(Status::ETIMEDOUT);
                }
                left -= chunk;
            }
            return Err(Status::ENOBUFS);
        }

        let n = fill(
            &mut self.connection,
            &self.timer,
            &mut self.recv_buf[..remaining_len],
            deadline,
        )?;
        if n < remaining_len {
            return Err(Status::ETIMEDOUT);
        }
        trace!("mqtt: rx {:#x}, {} bytes", header[0], remaining_len);
        Ok(Some((header[0], remaining_len)))
    }

    /// Waits for a packet of type `kind`, optionally carrying `packet_id`.
    ///
    /// Returns the body length. Other packets are handled on the way; inbound
    /// PUBLISH packets are neither delivered nor acknowledged.
    fn await_packet(&mut self, kind: u8, packet_id: Option<u16>) -> Result<usize, Status> {
        let deadline = self.deadline(self.command_timeout_ms);
        loop {
            let Some((header, len)) = self.read_packet(deadline)? else {
                warn!("mqtt: timed out waiting for {:#x}", kind);
                return Err(Status::ETIMEDOUT);
            };
            if header & PACKET_TYPE_MASK != kind & PACKET_TYPE_MASK {
                self.handle_packet(header, len, None)?;
                continue;
            }
            if let Some(id) = packet_id {
                if self.body_packet_id(len)? != id {
                    continue;
                }
            }
            return Ok(len);
        }
    }

    fn body_packet_id(&self, len: usize) -> Result<u16, Status> {
        if len < 2 {
            return Err(Status::EPROTO);
        }
        Ok(u16::from_be_bytes([self.recv_buf[0], self.recv_buf[1]]))
    }

    /// Handles a packet that is not an awaited acknowledgement.
    fn handle_packet(
        &mut self,
        header: u8,
        len: usize,
        sink: Option<&mut dyn MessageSink>,
    ) -> Result<(), Status> {
        match header & PACKET_TYPE_MASK {
            PUBLISH => {
                let qos = QoS::from_bits((header >> 1) & 0x03).ok_or(Status::EPROTO)?;
                let retained = header & 0x01 != 0;
                let body = &self.recv_buf[..len];
                if len < 2 {
                    return Err(Status::EPROTO);
                }
                let topic_len = u16::from_be_bytes([body[0], body[1]]) as usize;
                let mut cursor = 2 + topic_len;
                if cursor > len {
                    return Err(Status::EPROTO);
                }
                let topic = core::str::from_utf8(&body[2..cursor]).map_err(|_| Status::EPROTO)?;
                let packet_id = if qos == QoS::AtMostOnce {
                    None
                } else {
                    if cursor + 2 > len {
                        return Err(Status::EPROTO);
                    }
                    let id = u16::from_be_bytes([body[cursor], body[cursor + 1]]);
                    cursor += 2;
                    Some(id)
                };

                let Some(sink) = sink else {
                    // Left unacknowledged so the broker still owns QoS 1/2 deliveries.
                    warn!("mqtt: dropping PUBLISH received while awaiting an acknowledgement");
                    return Ok(());
                };
                sink.on_message(&InboundMessage {
                    topic,
                    payload: &body[cursor..],
                    qos,
                    retained,
                });

                match (qos, packet_id) {
                    (QoS::AtLeastOnce, Some(id)) => self.send_packet(PUBACK, |e| e.put_u16(id)),
                    (QoS::ExactlyOnce, Some(id)) => self.send_packet(PUBREC, |e| e.put_u16(id)),
                    _ => Ok(()),
                }
            }
            PUBREL_TYPE => {
                let id = self.body_packet_id(len)?;
                self.send_packet(PUBCOMP, |e| e.put_u16(id))
            }
            PINGRESP => {
                self.ping_outstanding = false;
                Ok(())
            }
            other => {
                debug!("mqtt: ignoring unexpected packet {:#x}", other);
                Ok(())
            }
        }
    }

    /// When the next keep-alive check is due, if keep-alive is enabled.
    fn ping_due(&self) -> Option<u64> {
        (self.keep_alive_ms != 0).then(|| self.last_tx_ms.saturating_add(u64::from(self.keep_alive_ms)))
    }

    /// Sends PINGREQ once the keep-alive interval elapsed since the last transmission.
    fn keep_alive(&mut self) -> Result<(), Status> {
        if self.keep_alive_ms == 0 {
            return Ok(());
        }
        let idle = self.timer.now_ms().saturating_sub(self.last_tx_ms);
        if idle < u64::from(self.keep_alive_ms) {
            return Ok(());
        }
        if self.ping_outstanding {
            error!("mqtt: broker did not answer PINGREQ");
            self.is_connected = false;
            return Err(Status::ENOTCONN);
        }
        self.send_packet(PINGREQ, |_| Ok(()))?;
        self.ping_outstanding = true;
        Ok(())
    }
}

impl<C: Connection, T: Timer> MessagingSession for MqttSession<'_, C, T> {
    fn connect(&mut self, config: &ConnectConfig<'_>) -> Result<(), Status> {
        let (protocol_name, protocol_level): (&[u8], u8) = match config.version {
            ProtocolVersion::V3_1 => (b"MQIsdp", 3),
            ProtocolVersion::V3_1_1 => (b"MQTT", 4),
        };
        let keep_alive_seconds = u16::try_from(config.keep_alive_ms / 1000).unwrap_or(u16::MAX);
        let username = config.username;
        let password = username.and(config.password);

        let mut connect_flags = CLEAN_SESSION;
        if username.is_some() {
            connect_flags |= USERNAME_FLAG;
        }
        if password.is_some() {
            connect_flags |= PASSWORD_FLAG;
        }

        self.send_packet(CONNECT, |e| {
            // --- Variable Header ---
            e.put_bytes_prefixed(protocol_name)?;
            e.put_u8(protocol_level)?;
            e.put_u8(connect_flags)?;
            e.put_u16(keep_alive_seconds)?;
            // --- Payload ---
            e.put_str(config.client_id)?;
            if let Some(username) = username {
                e.put_str(username)?;
            }
            if let Some(password) = password {
                e.put_str(password)?;
            }
            Ok(())
        })?;
        debug!("mqtt: CONNECT sent, keep-alive {}s", keep_alive_seconds);

        let len = self.await_packet(CONNACK, None)?;
        if len != 2 {
            return Err(Status::EPROTO);
        }

        // Check connection acknowledgement status
        match self.recv_buf[1] {
            0 => {
                self.is_connected = true;
                self.ping_outstanding = false;
                self.keep_alive_ms = u32::from(keep_alive_seconds) * 1000;
                Ok(())
            }
            1..=5 => Err(Status::ECONNREFUSED),
            _ => Err(Status::EPROTO),
        }
    }

    fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), Status> {
        self.ensure_connected()?;
        let packet_id = self.next_packet_id();
        self.send_packet(SUBSCRIBE, |e| {
            e.put_u16(packet_id)?;
            e.put_str(topic)?;
            e.put_u8(qos as u8)
        })?;

        let len = self.await_packet(SUBACK, Some(packet_id))?;
        if len < 3 {
            return Err(Status::EPROTO);
        }
        match self.recv_buf[2] {
            0..=2 => Ok(()),
            SUBACK_FAILURE => Err(Status::EACCES),
            _ => Err(Status::EPROTO),
        }
    }

    fn publish(&mut self, topic: &str, message: &OutboundMessage<'_>) -> Result<(), Status> {
        self.ensure_connected()?;
        let mut first_byte = PUBLISH | ((message.qos as u8) << 1);
        if message.retained {
            first_byte |= 0x01;
        }
        let packet_id = match message.qos {
            QoS::AtMostOnce => None,
            _ => Some(self.next_packet_id()),
        };

        self.send_packet(first_byte, |e| {
            e.put_str(topic)?;
            if let Some(id) = packet_id {
                e.put_u16(id)?;
            }
            e.put_bytes(message.payload)
        })?;

        match (message.qos, packet_id) {
            (QoS::AtLeastOnce, Some(id)) => {
                self.await_packet(PUBACK, Some(id))?;
            }
            (QoS::ExactlyOnce, Some(id)) => {
                self.await_packet(PUBREC, Some(id))?;
                self.send_packet(PUBREL, |e| e.put_u16(id))?;
                self.await_packet(PUBCOMP, Some(id))?;
            }
            _ => {}
        }
        Ok(())
    }

    fn dispatch(&mut self, budget_ms: u32, sink: &mut dyn MessageSink) -> Result<(), Status> {
        self.ensure_connected()?;
        let deadline = self.deadline(budget_ms);
        loop {
            self.keep_alive()?;
            // Wake up in time for the next keep-alive check.
            let wake = self.ping_due().map_or(deadline, |due| due.min(deadline));
            if let Some((header, len)) = self.read_packet(wake)? {
                self.handle_packet(header, len, Some(&mut *sink))?;
            }
            if self.timer.now_ms() >= deadline {
                return Ok(());
            }
        }
    }
}

/// Reads into `buf` until it is full or `deadline` passed. Returns the number of bytes read.
fn fill<C: Read, T: Timer>(
    conn: &mut C,
    timer: &T,
    buf: &mut [u8],
    deadline: u64,
) -> Result<usize, Status> {
    let mut filled = 0;
    while filled < buf.len() {
        match conn.read(&mut buf[filled..]) {
            Ok(0) => {
                if timer.now_ms() >= deadline {
                    break;
                }
            }
            Ok(n) => filled += n,
            Err(_) => return Err(Status::EIO),
        }
    }
    Ok(filled)
}

/// Writes a packet body after a reserved header area.
struct Encoder<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> Encoder<'a> {
    fn new(buf: &'a mut [u8]) -> Self {
        Self {
            buf,
            pos: HEADER_RESERVE,
        }
    }

    fn put_bytes(&mut self, bytes: &[u8]) -> Result<(), Status> {
        let end = self.pos + bytes.len();
        let dst = self.buf.get_mut(self.pos..end).ok_or(Status::ENOBUFS)?;
        dst.copy_from_slice(bytes);
        self.pos = end;
        Ok(())
    }

    fn put_u8(&mut self, value: u8) -> Result<(), Status> {
        self.put_bytes(&[value])
    }

    fn put_u16(&mut self, value: u16) -> Result<(), Status> {
        self.put_bytes(&value.to_be_bytes())
    }

    fn put_bytes_prefixed(&mut self, bytes: &[u8]) -> Result<(), Status> {
        let len = u16::try_from(bytes.len()).map_err(|_| Status::EINVAL)?;
        self.put_u16(len)?;
        self.put_bytes(bytes)
    }

    fn put_str(&mut self, value: &str) -> Result<(), Status> {
        self.put_bytes_prefixed(value.as_bytes())
    }

    /// Writes the fixed header in front of the body and returns the frame's range.
    fn finish(self, first_byte: u8) -> Result<Range<usize>, Status> {
        let mut fixed_header: Vec<u8, 5> = Vec::new();
        fixed_header.push(first_byte).map_err(|_| Status::ENOBUFS)?;
        encode_remaining_length(&mut fixed_header, self.pos - HEADER_RESERVE)?;

        let start = HEADER_RESERVE - fixed_header.len();
        self.buf[start..HEADER_RESERVE].copy_from_slice(&fixed_header);
        Ok(start..self.pos)
    }
}

/// Encodes the remaining length field for an MQTT packet.
///
/// Each byte carries 7 bits of the length, the top bit flagging a
/// continuation; at most four bytes.
fn encode_remaining_length(buf: &mut Vec<u8, 5>, mut len: usize) -> Result<(), Status> {
    if len > MAX_REMAINING_LENGTH {
        return Err(Status::ENOBUFS);
    }
    loop {
        let mut byte = (len % 128) as u8;
        len /= 128;
        if len > 0 {
            byte |= 0x80;
        }
        buf.push(byte).map_err(|_| Status::ENOBUFS)?;
        if len == 0 {
            break;
        }
    }
    Ok(())
}
