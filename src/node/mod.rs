//! Bring-up sequencer and steady-state loop.
//!
//! [`Node::bring_up`] walks the collaborators of a [`Platform`] strictly in
//! order and stops at the first failure. Every failure is reported on the
//! console as one annotated line and returned as a [`NodeError`] carrying the
//! collaborator's status unchanged.
//!
//! Once the [`Device`] is up, [`Node::run`] alternates between publishing a
//! counter-tagged reading and giving the session a fixed time slice to
//! service inbound traffic. It only returns when a cycle fails.
//!
//! ```rust,ignore
//! let mut send = [0u8; BUFF_LEN];
//! let mut recv = [0u8; BUFF_LEN];
//! let buffers = SessionBuffers { send: &mut send, recv: &mut recv };
//!
//! let code = run_node(&mut board, &Settings::DEFAULT, buffers, console, &mut PrintSink::new(log));
//! ```

pub mod handler;
pub mod payload;

pub use handler::PrintSink;

use core::fmt;

use crate::config::{Settings, non_empty};
use crate::error::{NodeError, Stage, Status};
use crate::network::TcpSocket;
use crate::platform::{
    AdapterConfig, BrokerAddress, DispatchPolicy, InterruptConfig, InterruptController,
    NetworkAdapter, Platform, SerialConfig, SocketConfig,
};
use crate::session::{ConnectConfig, MessageSink, MessagingSession, QoS, SessionConfig};

/// Caller-owned MQTT buffers, lent to the session for its whole life.
#[derive(Debug)]
pub struct SessionBuffers<'b> {
    /// Outbound packet buffer.
    pub send: &'b mut [u8],
    /// Inbound packet buffer.
    pub recv: &'b mut [u8],
}

/// Every handle produced by a successful bring-up.
///
/// The adapter owns the UART it was created with, and the session owns the
/// socket, so nothing here borrows from anything else.
pub struct Device<'b, P: Platform<'b>> {
    interrupts: P::Interrupts,
    adapter: P::Adapter,
    session: P::Session,
    counter: u32,
}

impl<'b, P: Platform<'b>> Device<'b, P> {
    /// Value the next published reading will carry.
    pub fn counter(&self) -> u32 {
        self.counter
    }

    /// The interrupt controller.
    pub fn interrupts(&mut self) -> &mut P::Interrupts {
        &mut self.interrupts
    }

    /// The WiFi adapter.
    pub fn adapter(&mut self) -> &mut P::Adapter {
        &mut self.adapter
    }

    /// The messaging session.
    pub fn session(&mut self) -> &mut P::Session {
        &mut self.session
    }
}

impl<'b, P: Platform<'b>> fmt::Debug for Device<'b, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("counter", &self.counter)
            .finish_non_exhaustive()
    }
}

/// Drives a [`Platform`] with a fixed set of [`Settings`], printing progress
/// and diagnostics to `console`.
#[derive(Debug)]
pub struct Node<'s, W: fmt::Write> {
    settings: &'s Settings<'s>,
    console: W,
}

impl<'s, W: fmt::Write> Node<'s, W> {
    /// Creates a node.
    pub fn new(settings: &'s Settings<'s>, console: W) -> Self {
        Self { settings, console }
    }

    /// The console.
    pub fn console(&self) -> &W {
        &self.console
    }

    /// Consumes the node, returning the console.
    pub fn into_console(self) -> W {
        self.console
    }

    fn say(&mut self, args: fmt::Arguments<'_>) {
        if self.console.write_fmt(args).is_err() {
            warn!("console write failed");
        }
    }

    /// Reports a failed stage on the console and in the log.
    fn report(&mut self, err: NodeError) -> NodeError {
        error!("{} failed with {}", err.stage.label(), err.code());
        self.say(format_args!("{}", err));
        err
    }

    fn stage<T>(&mut self, stage: Stage, result: Result<T, Status>) -> Result<T, NodeError> {
        result.map_err(|status| self.report(NodeError::new(stage, status)))
    }

    /// Brings the device up: interrupts, UART, WiFi, socket, MQTT session and
    /// subscription, in that order.
    ///
    /// # Errors
    ///
    /// The first failing stage, with its status unchanged. Nothing after it
    /// is attempted.
    pub fn bring_up<'b, P: Platform<'b>>(
        &mut self,
        platform: &mut P,
        buffers: SessionBuffers<'b>,
    ) -> Result<Device<'b, P>, NodeError> {
        let s = self.settings;

        debug!("bringing up interrupt controller {}", s.intc_device_id);
        let interrupt_config = InterruptConfig {
            controller_id: s.intc_device_id,
            policy: DispatchPolicy::Vectored,
        };
        let mut interrupts =
            self.stage(Stage::InterruptInit, platform.init_interrupts(&interrupt_config))?;
        self.stage(Stage::InterruptEnable, interrupts.global_enable())?;

        let serial_config = SerialConfig {
            device_id: s.uart_device_id,
            irq_id: s.uart_irq_id,
            baud_rate: s.uart_baud_rate,
            data_bits: s.uart_data_bits,
            parity: s.uart_parity,
            stop_bits: s.uart_stop_bits,
            flow: s.uart_flow,
            asynchronous_rx: true,
        };
        let serial = self.stage(
            Stage::SerialInit,
            platform.init_serial(&mut interrupts, &serial_config),
        )?;

        let adapter_config = AdapterConfig {
            uart_irq_id: s.uart_irq_id,
        };
        let mut adapter = self.stage(
            Stage::AdapterInit,
            platform.init_adapter(&mut interrupts, serial, &adapter_config),
        )?;
        info!("joining {}", s.wifi_ssid);
        self.stage(
            Stage::AdapterConnect,
            adapter.connect(s.wifi_ssid, s.wifi_password),
        )?;
        match adapter.ip_address() {
            Some(ip) => self.say(format_args!("Device ip is: {}\n", ip)),
            None => self.say(format_args!("Device ip is: unknown\n")),
        }

        let socket_config = SocketConfig {
            interface: adapter.network_interface(),
            max_buffer_size: 0,
        };
        let mut socket = self.stage(Stage::SocketInit, platform.init_socket(socket_config))?;
        let broker = BrokerAddress {
            host: s.broker_host,
            port: s.broker_port,
        };
        self.stage(Stage::SocketConnect, socket.connect(&broker))?;
        self.say(format_args!("Connection with \"{}\" established\n", s.broker_host));

        let session_config = SessionConfig {
            timer_id: s.timer_id,
            socket,
            command_timeout_ms: s.command_timeout_ms,
            send_buffer: buffers.send,
            recv_buffer: buffers.recv,
        };
        let mut session = self.stage(Stage::SessionInit, platform.init_session(session_config))?;
        let connect = ConnectConfig {
            version: s.mqtt_version,
            keep_alive_ms: s.keep_alive_ms,
            client_id: s.client_id,
            username: non_empty(s.username),
            password: non_empty(s.password),
        };
        self.stage(Stage::SessionConnect, session.connect(&connect))?;
        self.say(format_args!("Connected to mqtt broker\n"));

        self.stage(
            Stage::Subscribe,
            session.subscribe(s.subscribe_topic, QoS::AtMostOnce),
        )?;
        self.say(format_args!("Subscribed to topic: {}\n", s.subscribe_topic));
        info!("bring-up complete");

        Ok(Device {
            interrupts,
            adapter,
            session,
            counter: 0,
        })
    }

    /// One steady-state cycle: publish the current reading, then dispatch
    /// inbound traffic for the configured budget.
    ///
    /// The counter only advances when both halves succeed.
    pub fn cycle<'b, P: Platform<'b>>(
        &mut self,
        device: &mut Device<'b, P>,
        sink: &mut dyn MessageSink,
    ) -> Result<(), NodeError> {
        let s = self.settings;

        let published = payload::publish_reading(&mut device.session, s.publish_topic, device.counter);
        self.stage(Stage::Publish, published)?;
        self.say(format_args!("Data sent to broker\n"));

        let dispatched = device.session.dispatch(s.dispatch_budget_ms, sink);
        self.stage(Stage::Dispatch, dispatched)?;

        device.counter = device.counter.wrapping_add(1);
        Ok(())
    }

    /// Runs at most `cycles` cycles, stopping at the first failure.
    pub fn run_cycles<'b, P: Platform<'b>>(
        &mut self,
        device: &mut Device<'b, P>,
        cycles: usize,
        sink: &mut dyn MessageSink,
    ) -> Result<(), NodeError> {
        for _ in 0..cycles {
            self.cycle(device, sink)?;
        }
        Ok(())
    }

    /// Runs cycles until one fails and returns that failure.
    pub fn run<'b, P: Platform<'b>>(
        &mut self,
        device: &mut Device<'b, P>,
        sink: &mut dyn MessageSink,
    ) -> NodeError {
        loop {
            if let Err(err) = self.cycle(device, sink) {
                return err;
            }
        }
    }
}

/// Brings the node up and runs it until something fails.
///
/// Returns the failing collaborator's status code, suitable as a process exit
/// code. Never returns on a healthy device.
pub fn run_node<'b, P, W>(
    platform: &mut P,
    settings: &Settings<'_>,
    buffers: SessionBuffers<'b>,
    console: W,
    sink: &mut dyn MessageSink,
) -> i32
where
    P: Platform<'b>,
    W: fmt::Write,
{
    let mut node = Node::new(settings, console);
    let mut device = match node.bring_up(platform, buffers) {
        Ok(device) => device,
        Err(err) => return err.code(),
    };
    node.run(&mut device, sink).code()
}
