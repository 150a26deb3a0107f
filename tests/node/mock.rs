use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::net::IpAddr;
use std::rc::Rc;

use sensornode::error::Status;
use sensornode::network::{Close, Connection, Read, TcpSocket, Write};
use sensornode::platform::{
    AdapterConfig, BrokerAddress, InterruptConfig, InterruptController, NetworkAdapter, Platform,
    SerialConfig, SocketConfig,
};
use sensornode::session::{
    ConnectConfig, InboundMessage, MessageSink, MessagingSession, OutboundMessage, QoS,
    SessionConfig,
};

/// Interface handle the mock adapter hands out.
pub const INTERFACE: u8 = 7;

/// Makes the `after`-th call (zero based) named `call` fail with `code`.
#[derive(Debug, Clone, Copy)]
pub struct Fault {
    pub call: &'static str,
    pub after: usize,
    pub code: i32,
}

#[derive(Debug, Default)]
pub struct Recorder {
    pub calls: Vec<&'static str>,
    pub fault: Option<Fault>,
    pub interrupt_config: Option<InterruptConfig>,
    pub serial_config: Option<SerialConfig>,
    pub adapter_config: Option<AdapterConfig>,
    pub credentials: Option<(String, String)>,
    pub socket_interface: Option<u8>,
    pub socket_buffer_size: Option<usize>,
    pub broker: Option<(String, u16)>,
    pub session_timer: Option<u32>,
    pub session_timeout_ms: Option<u32>,
    pub session_buffers: Option<(usize, usize)>,
    pub connect: Option<RecordedConnect>,
    pub subscriptions: Vec<(String, QoS)>,
    pub published: Vec<(String, Vec<u8>, QoS, bool)>,
    pub dispatch_budgets: Vec<u32>,
    /// One batch of inbound messages per dispatch call.
    pub inbound: VecDeque<Vec<(String, Vec<u8>)>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedConnect {
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub keep_alive_ms: u32,
}

pub type Shared = Rc<RefCell<Recorder>>;

fn enter(shared: &Shared, call: &'static str) -> Result<(), Status> {
    let mut recorder = shared.borrow_mut();
    let previous = recorder.calls.iter().filter(|c| **c == call).count();
    recorder.calls.push(call);
    match recorder.fault {
        Some(fault) if fault.call == call && fault.after == previous => {
            Err(Status::new(fault.code))
        }
        _ => Ok(()),
    }
}

pub struct MockPlatform {
    pub shared: Shared,
    pub ip: Option<IpAddr>,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self {
            shared: Shared::default(),
            ip: Some(IpAddr::from([10, 0, 0, 42])),
        }
    }

    pub fn failing(call: &'static str, code: i32) -> Self {
        Self::failing_after(call, 0, code)
    }

    pub fn failing_after(call: &'static str, after: usize, code: i32) -> Self {
        let platform = Self::new();
        platform.shared.borrow_mut().fault = Some(Fault { call, after, code });
        platform
    }

    pub fn queue_inbound(&self, batch: &[(&str, &[u8])]) {
        self.shared.borrow_mut().inbound.push_back(
            batch
                .iter()
                .map(|(topic, payload)| (topic.to_string(), payload.to_vec()))
                .collect(),
        );
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.shared.borrow().calls.clone()
    }
}

pub struct MockInterrupts(Shared);

impl InterruptController for MockInterrupts {
    fn global_enable(&mut self) -> Result<(), Status> {
        enter(&self.0, "global_enable")
    }
}

pub struct MockSerial(Shared);

pub struct MockAdapter {
    shared: Shared,
    _serial: MockSerial,
    ip: Option<IpAddr>,
}

impl NetworkAdapter for MockAdapter {
    type Interface = u8;

    fn connect(&mut self, ssid: &str, password: &str) -> Result<(), Status> {
        self.shared.borrow_mut().credentials = Some((ssid.into(), password.into()));
        enter(&self.shared, "wifi_connect")
    }

    fn ip_address(&mut self) -> Option<IpAddr> {
        self.shared.borrow_mut().calls.push("ip_address");
        self.ip
    }

    fn network_interface(&mut self) -> u8 {
        INTERFACE
    }
}

pub struct MockSocket(Shared);

impl Read for MockSocket {
    type Error = ();
    fn read(&mut self, _buf: &mut [u8]) -> Result<usize, Self::Error> {
        Ok(0)
    }
}

impl Write for MockSocket {
    type Error = ();
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        Ok(buf.len())
    }
    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl Close for MockSocket {
    type Error = ();
    fn close(self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl Connection for MockSocket {}

impl TcpSocket for MockSocket {
    fn connect(&mut self, remote: &BrokerAddress<'_>) -> Result<(), Status> {
        self.0.borrow_mut().broker = Some((remote.host.into(), remote.port));
        enter(&self.0, "socket_connect")
    }
}

pub struct MockSession<'b> {
    shared: Shared,
    _socket: MockSocket,
    _send: &'b mut [u8],
    _recv: &'b mut [u8],
}

impl MessagingSession for MockSession<'_> {
    fn connect(&mut self, config: &ConnectConfig<'_>) -> Result<(), Status> {
        self.shared.borrow_mut().connect = Some(RecordedConnect {
            client_id: config.client_id.into(),
            username: config.username.map(Into::into),
            password: config.password.map(Into::into),
            keep_alive_ms: config.keep_alive_ms,
        });
        enter(&self.shared, "mqtt_connect")
    }

    fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), Status> {
        self.shared
            .borrow_mut()
            .subscriptions
            .push((topic.into(), qos));
        enter(&self.shared, "subscribe")
    }

    fn publish(&mut self, topic: &str, message: &OutboundMessage<'_>) -> Result<(), Status> {
        enter(&self.shared, "publish")?;
        self.shared.borrow_mut().published.push((
            topic.into(),
            message.payload.to_vec(),
            message.qos,
            message.retained,
        ));
        Ok(())
    }

    fn dispatch(&mut self, budget_ms: u32, sink: &mut dyn MessageSink) -> Result<(), Status> {
        self.shared.borrow_mut().dispatch_budgets.push(budget_ms);
        enter(&self.shared, "dispatch")?;
        let batch = self.shared.borrow_mut().inbound.pop_front().unwrap_or_default();
        for (topic, payload) in &batch {
            sink.on_message(&InboundMessage {
                topic,
                payload,
                qos: QoS::AtMostOnce,
                retained: false,
            });
        }
        Ok(())
    }
}

impl<'b> Platform<'b> for MockPlatform {
    type Interrupts = MockInterrupts;
    type Serial = MockSerial;
    type Adapter = MockAdapter;
    type Socket = MockSocket;
    type Session = MockSession<'b>;

    fn init_interrupts(&mut self, config: &InterruptConfig) -> Result<MockInterrupts, Status> {
        self.shared.borrow_mut().interrupt_config = Some(*config);
        enter(&self.shared, "init_interrupts")?;
        Ok(MockInterrupts(self.shared.clone()))
    }

    fn init_serial(
        &mut self,
        _interrupts: &mut MockInterrupts,
        config: &SerialConfig,
    ) -> Result<MockSerial, Status> {
        self.shared.borrow_mut().serial_config = Some(*config);
        enter(&self.shared, "init_serial")?;
        Ok(MockSerial(self.shared.clone()))
    }

    fn init_adapter(
        &mut self,
        _interrupts: &mut MockInterrupts,
        serial: MockSerial,
        config: &AdapterConfig,
    ) -> Result<MockAdapter, Status> {
        self.shared.borrow_mut().adapter_config = Some(*config);
        enter(&self.shared, "init_adapter")?;
        Ok(MockAdapter {
            shared: self.shared.clone(),
            _serial: serial,
            ip: self.ip,
        })
    }

    fn init_socket(&mut self, config: SocketConfig<u8>) -> Result<MockSocket, Status> {
        {
            let mut recorder = self.shared.borrow_mut();
            recorder.socket_interface = Some(config.interface);
            recorder.socket_buffer_size = Some(config.max_buffer_size);
        }
        enter(&self.shared, "init_socket")?;
        Ok(MockSocket(self.shared.clone()))
    }

    fn init_session(
        &mut self,
        config: SessionConfig<'b, MockSocket>,
    ) -> Result<MockSession<'b>, Status> {
        {
            let mut recorder = self.shared.borrow_mut();
            recorder.session_timer = Some(config.timer_id);
            recorder.session_timeout_ms = Some(config.command_timeout_ms);
            recorder.session_buffers = Some((config.send_buffer.len(), config.recv_buffer.len()));
        }
        enter(&self.shared, "init_session")?;
        Ok(MockSession {
            shared: self.shared.clone(),
            _socket: config.socket,
            _send: config.send_buffer,
            _recv: config.recv_buffer,
        })
    }
}

/// A console several writers can share, like a UART.
#[derive(Debug, Clone, Default)]
pub struct Console(Rc<RefCell<String>>);

impl Console {
    pub fn contents(&self) -> String {
        self.0.borrow().clone()
    }
}

impl fmt::Write for Console {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.0.borrow_mut().push_str(s);
        Ok(())
    }
}
