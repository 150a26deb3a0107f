//! Board support boundary.
//!
//! The node does not drive any peripheral itself. A board support package
//! implements [`Platform`] once, and the bring-up sequencer calls its
//! `init_*` methods strictly in order:
//!
//! ```text
//! init_interrupts ─▶ init_serial ─▶ init_adapter ─▶ init_socket ─▶ init_session
//!   Interrupts         Serial         Adapter         Socket         Session
//! ```
//!
//! Each method consumes or borrows the handle produced by the previous one, so
//! the type system already rules out calling a stage before its predecessor
//! succeeded.

use crate::error::Status;
use crate::network::TcpSocket;
use crate::session::{MessagingSession, SessionConfig};
use core::net::IpAddr;

/// How interrupts of the controller are dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchPolicy {
    /// The platform's default vector table handling.
    Vectored,
    /// A single shared entry point that demultiplexes in software.
    Shared,
}

/// Parameters for bringing up the interrupt controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterruptConfig {
    /// Controller identifier.
    pub controller_id: u32,
    /// Dispatch policy.
    pub policy: DispatchPolicy,
}

/// An initialized interrupt controller.
pub trait InterruptController {
    /// Unmask interrupts globally.
    fn global_enable(&mut self) -> Result<(), Status>;
}

/// UART character size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataBits {
    /// 5 data bits.
    Five,
    /// 6 data bits.
    Six,
    /// 7 data bits.
    Seven,
    /// 8 data bits.
    Eight,
}

/// UART parity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parity {
    /// No parity bit.
    None,
    /// Odd parity.
    Odd,
    /// Even parity.
    Even,
}

/// UART stop bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopBits {
    /// One stop bit.
    One,
    /// Two stop bits.
    Two,
}

/// UART flow control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowControl {
    /// No flow control.
    Disabled,
    /// RTS/CTS hardware flow control.
    RtsCts,
}

/// Parameters for opening the UART channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerialConfig {
    /// UART peripheral identifier.
    pub device_id: u32,
    /// Interrupt line serviced by the receive path.
    pub irq_id: u32,
    /// Baud rate.
    pub baud_rate: u32,
    /// Character size.
    pub data_bits: DataBits,
    /// Parity.
    pub parity: Parity,
    /// Stop bits.
    pub stop_bits: StopBits,
    /// Flow control.
    pub flow: FlowControl,
    /// Receive in the background into a driver-owned buffer.
    pub asynchronous_rx: bool,
}

/// Parameters for bringing up the WiFi adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdapterConfig {
    /// Interrupt line of the UART the adapter talks over.
    pub uart_irq_id: u32,
}

/// An initialized WiFi adapter.
pub trait NetworkAdapter {
    /// Handle sockets bind to.
    type Interface;

    /// Join the network.
    fn connect(&mut self, ssid: &str, password: &str) -> Result<(), Status>;

    /// The address assigned to the adapter, if it could be read.
    fn ip_address(&mut self) -> Option<IpAddr>;

    /// The adapter's network interface.
    fn network_interface(&mut self) -> Self::Interface;
}

/// Parameters for creating a TCP socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketConfig<I> {
    /// Interface the socket is bound to.
    pub interface: I,
    /// Upper bound on the socket's internal buffer, `0` for the adapter default.
    pub max_buffer_size: usize,
}

/// A remote endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrokerAddress<'a> {
    /// Address or host name.
    pub host: &'a str,
    /// TCP port.
    pub port: u16,
}

/// Factory for every collaborator of the bring-up sequence.
///
/// `'b` is the lifetime of the caller-owned MQTT buffers; sessions may hold
/// on to them for as long as they live.
pub trait Platform<'b> {
    /// Initialized interrupt controller.
    type Interrupts: InterruptController;
    /// Open UART channel.
    type Serial;
    /// Initialized WiFi adapter. Owns the UART it was created with.
    type Adapter: NetworkAdapter;
    /// TCP socket bound to the adapter's interface.
    type Socket: TcpSocket;
    /// MQTT session. Owns the socket it was created with.
    type Session: MessagingSession;

    /// Bring up the interrupt controller.
    fn init_interrupts(&mut self, config: &InterruptConfig) -> Result<Self::Interrupts, Status>;

    /// Open the UART channel.
    fn init_serial(
        &mut self,
        interrupts: &mut Self::Interrupts,
        config: &SerialConfig,
    ) -> Result<Self::Serial, Status>;

    /// Bring up the WiFi adapter over `serial`.
    fn init_adapter(
        &mut self,
        interrupts: &mut Self::Interrupts,
        serial: Self::Serial,
        config: &AdapterConfig,
    ) -> Result<Self::Adapter, Status>;

    /// Create a TCP socket.
    fn init_socket(
        &mut self,
        config: SocketConfig<<Self::Adapter as NetworkAdapter>::Interface>,
    ) -> Result<Self::Socket, Status>;

    /// Create an MQTT session over a connected socket.
    fn init_session(
        &mut self,
        config: SessionConfig<'b, Self::Socket>,
    ) -> Result<Self::Session, Status>;
}
