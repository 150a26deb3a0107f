//! Byte-stream transport traits.
//!
//! The MQTT session only needs a blocking, byte-oriented connection. A read
//! that finds nothing to return yields `Ok(0)` rather than blocking forever,
//! so that time-sliced dispatch can stay within its budget.

#![deny(unsafe_code)]

/// Common error types for network operations
pub mod error;

use crate::error::Status;
use crate::platform::BrokerAddress;

/// Re-exports of common traits
pub mod prelude {
    pub use super::{Close, Connection, Read, TcpSocket, Write};
}

/// The receive half of a connection.
pub trait Read {
    /// Associated error type
    type Error: core::fmt::Debug;
    /// Read available data from the connection. `Ok(0)` means nothing was pending.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;
}

/// The transmit half of a connection.
pub trait Write {
    /// Associated error type
    type Error: core::fmt::Debug;
    /// Write data to the connection
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error>;
    /// Flush the write buffer
    fn flush(&mut self) -> Result<(), Self::Error>;
}

/// Orderly shutdown of a connection.
pub trait Close {
    /// Associated error type
    type Error: core::fmt::Debug;
    /// Close the connection
    fn close(self) -> Result<(), Self::Error>;
}

/// A synchronous connection
pub trait Connection: Read + Write + Close {}

/// A TCP socket bound to an adapter's network interface.
///
/// Created unconnected by [`Platform::init_socket`](crate::platform::Platform::init_socket);
/// [`connect`](TcpSocket::connect) attaches it to exactly one remote endpoint.
pub trait TcpSocket: Connection {
    /// Connect to the remote endpoint.
    fn connect(&mut self, remote: &BrokerAddress<'_>) -> Result<(), Status>;
}

/// Writes the whole buffer, retrying short writes.
///
/// A write that accepts zero bytes is reported as [`error::Error::WriteError`].
pub fn write_all<W: Write + ?Sized>(conn: &mut W, mut buf: &[u8]) -> Result<(), error::Error> {
    while !buf.is_empty() {
        match conn.write(buf) {
            Ok(0) | Err(_) => return Err(error::Error::WriteError),
            Ok(n) => buf = &buf[n..],
        }
    }
    Ok(())
}
