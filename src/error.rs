//! Status codes and bring-up errors.
//!
//! Every collaborator reports failure as a negative signed status, the way
//! C board-support layers do. [`Status`] carries that code unchanged through
//! the crate so that the node's exit code equals exactly the code the failing
//! driver produced.

use core::fmt;

/// A signed driver status. Negative values are failures.
#[derive(Debug, PartialEq, Eq, Clone, Copy, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Status(i32);

impl Status {
    /// Generic I/O failure.
    pub const EIO: Status = Status(-5);
    /// Out of memory.
    pub const ENOMEM: Status = Status(-12);
    /// Permission denied (e.g. a rejected subscription).
    pub const EACCES: Status = Status(-13);
    /// Invalid argument.
    pub const EINVAL: Status = Status(-22);
    /// Value does not fit in the destination.
    pub const EOVERFLOW: Status = Status(-75);
    /// Protocol error.
    pub const EPROTO: Status = Status(-71);
    /// No buffer space available.
    pub const ENOBUFS: Status = Status(-105);
    /// Transport endpoint is not connected.
    pub const ENOTCONN: Status = Status(-107);
    /// Operation timed out.
    pub const ETIMEDOUT: Status = Status(-110);
    /// Connection refused by the remote end.
    pub const ECONNREFUSED: Status = Status(-111);

    /// Wraps a raw status code.
    pub const fn new(code: i32) -> Self {
        Self(code)
    }

    /// The raw status code.
    pub const fn code(self) -> i32 {
        self.0
    }

    /// Whether this status reports a failure.
    pub const fn is_err(self) -> bool {
        self.0 < 0
    }

    /// Converts a raw driver return value into a `Result`.
    ///
    /// Non-negative values are passed through as `Ok`, negative ones become
    /// `Err(Status)`.
    ///
    /// ```rust
    /// use sensornode::error::Status;
    ///
    /// assert_eq!(Status::check(3), Ok(3));
    /// assert_eq!(Status::check(-1), Err(Status::new(-1)));
    /// ```
    pub const fn check(code: i32) -> Result<i32, Status> {
        if code < 0 { Err(Status(code)) } else { Ok(code) }
    }
}

impl From<Status> for i32 {
    fn from(status: Status) -> Self {
        status.0
    }
}

impl fmt::Display for Status {
    /// Renders as `<d> (-0x<hex>)`, the hex part being the magnitude.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{} ({}0x{:x})", self.0, sign, self.0.unsigned_abs())
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Status {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "{=i32}", self.0)
    }
}

/// A fallible step of the bring-up sequence or the steady-state loop.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Stage {
    /// Interrupt controller initialization.
    InterruptInit,
    /// Global interrupt enable.
    InterruptEnable,
    /// UART channel initialization.
    SerialInit,
    /// WiFi adapter initialization.
    AdapterInit,
    /// Joining the WiFi network.
    AdapterConnect,
    /// TCP socket creation.
    SocketInit,
    /// TCP connect to the broker.
    SocketConnect,
    /// MQTT session initialization.
    SessionInit,
    /// MQTT CONNECT handshake.
    SessionConnect,
    /// MQTT SUBSCRIBE.
    Subscribe,
    /// Serializing and publishing one reading.
    Publish,
    /// Dispatching inbound traffic for one time slice.
    Dispatch,
}

impl Stage {
    /// All stages in execution order.
    pub const ALL: [Stage; 12] = [
        Stage::InterruptInit,
        Stage::InterruptEnable,
        Stage::SerialInit,
        Stage::AdapterInit,
        Stage::AdapterConnect,
        Stage::SocketInit,
        Stage::SocketConnect,
        Stage::SessionInit,
        Stage::SessionConnect,
        Stage::Subscribe,
        Stage::Publish,
        Stage::Dispatch,
    ];

    /// Label printed in the diagnostic line.
    pub const fn label(self) -> &'static str {
        match self {
            Stage::InterruptInit => "Error irq_ctrl_init",
            Stage::InterruptEnable => "Error irq_global_enable",
            Stage::SerialInit => "Error uart_init",
            Stage::AdapterInit => "Error wifi_init",
            Stage::AdapterConnect => "Error wifi_connect",
            Stage::SocketInit => "Error socket_init",
            Stage::SocketConnect => "Error socket_connect",
            Stage::SessionInit => "Error mqtt_init",
            Stage::SessionConnect => "Error mqtt_connect",
            Stage::Subscribe => "Error mqtt_subscribe",
            Stage::Publish => "Error read_and_send",
            Stage::Dispatch => "Error mqtt_yield",
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Stage {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "{=str}", self.label())
    }
}

/// A failed stage together with the status it reported.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct NodeError {
    /// The stage that failed.
    pub stage: Stage,
    /// The status the collaborator returned, unchanged.
    pub status: Status,
}

impl NodeError {
    /// Creates an error for `stage`.
    pub const fn new(stage: Stage, status: Status) -> Self {
        Self { stage, status }
    }

    /// The raw status code, suitable as a process exit code.
    pub const fn code(&self) -> i32 {
        self.status.code()
    }
}

impl fmt::Display for NodeError {
    /// Renders the diagnostic line, `"<label> - Code: <d> (-0x<hex>) \n"`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - Code: {} \n", self.stage.label(), self.status)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for NodeError {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "{} - Code: {}", self.stage, self.status)
    }
}
