//! Runs the sensor node on a desktop host.
//!
//! The host's own network stack stands in for the WiFi adapter and stdout for
//! the UART console. The broker is fixed at build time, e.g.
//! `SERVER_ADDR=test.mosquitto.org cargo run`.

use std::fmt;
use std::io::{self, ErrorKind, Read as _, Write as _};
use std::net::{IpAddr, TcpStream, ToSocketAddrs, UdpSocket};
use std::process::ExitCode;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use sensornode::config::{BUFF_LEN, Settings};
use sensornode::error::Status;
use sensornode::network::error::Error;
use sensornode::network::{Close, Connection, Read, TcpSocket, Write};
use sensornode::node::{PrintSink, SessionBuffers, run_node};
use sensornode::platform::{
    AdapterConfig, BrokerAddress, InterruptConfig, InterruptController, NetworkAdapter, Platform,
    SerialConfig, SocketConfig,
};
use sensornode::session::mqtt::MqttSession;
use sensornode::session::{SessionConfig, Timer};

/// Interrupts are the host OS's business.
struct NoInterrupts;

impl InterruptController for NoInterrupts {
    fn global_enable(&mut self) -> Result<(), Status> {
        Ok(())
    }
}

/// The host's default route.
struct HostAdapter;

impl NetworkAdapter for HostAdapter {
    type Interface = ();

    fn connect(&mut self, ssid: &str, _password: &str) -> Result<(), Status> {
        info!("host network stands in for {ssid:?}");
        Ok(())
    }

    fn ip_address(&mut self) -> Option<IpAddr> {
        // No packet is sent; connecting a UDP socket only selects a route.
        let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
        socket.connect("192.0.2.1:9").ok()?;
        socket.local_addr().ok().map(|addr| addr.ip())
    }

    fn network_interface(&mut self) {}
}

struct HostSocket {
    stream: Option<TcpStream>,
}

impl Read for HostSocket {
    type Error = Error;
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let stream = self.stream.as_mut().ok_or(Error::NotOpen)?;
        match stream.read(buf) {
            Ok(0) => Err(Error::ConnectionClosed),
            Ok(n) => Ok(n),
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => Ok(0),
            Err(_) => Err(Error::ReadError),
        }
    }
}

impl Write for HostSocket {
    type Error = Error;
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        let stream = self.stream.as_mut().ok_or(Error::NotOpen)?;
        stream.write(buf).map_err(|_| Error::WriteError)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        let stream = self.stream.as_mut().ok_or(Error::NotOpen)?;
        stream.flush().map_err(|_| Error::WriteError)
    }
}

impl Close for HostSocket {
    type Error = Error;
    fn close(self) -> Result<(), Self::Error> {
        if let Some(stream) = self.stream {
            stream
                .shutdown(std::net::Shutdown::Both)
                .map_err(|_| Error::ConnectionClosed)?;
        }
        Ok(())
    }
}

impl Connection for HostSocket {}

impl TcpSocket for HostSocket {
    fn connect(&mut self, remote: &BrokerAddress<'_>) -> Result<(), Status> {
        let addrs = (remote.host, remote.port)
            .to_socket_addrs()
            .map_err(|_| Status::from(Error::InvalidAddress))?;
        let stream = TcpStream::connect(&addrs.collect::<Vec<_>>()[..]).map_err(|e| {
            warn!("connect to {}:{} failed: {e}", remote.host, remote.port);
            match e.kind() {
                ErrorKind::ConnectionRefused => Status::ECONNREFUSED,
                ErrorKind::TimedOut => Status::ETIMEDOUT,
                _ => Status::EIO,
            }
        })?;
        stream
            .set_read_timeout(Some(Duration::from_millis(10)))
            .map_err(|_| Status::EIO)?;
        stream.set_nodelay(true).map_err(|_| Status::EIO)?;
        self.stream = Some(stream);
        Ok(())
    }
}

struct HostClock(Instant);

impl Timer for HostClock {
    fn now_ms(&self) -> u64 {
        u64::try_from(self.0.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

struct Host;

impl<'b> Platform<'b> for Host {
    type Interrupts = NoInterrupts;
    type Serial = ();
    type Adapter = HostAdapter;
    type Socket = HostSocket;
    type Session = MqttSession<'b, HostSocket, HostClock>;

    fn init_interrupts(&mut self, config: &InterruptConfig) -> Result<NoInterrupts, Status> {
        debug!("interrupt controller {} ({:?})", config.controller_id, config.policy);
        Ok(NoInterrupts)
    }

    fn init_serial(
        &mut self,
        _interrupts: &mut NoInterrupts,
        config: &SerialConfig,
    ) -> Result<(), Status> {
        debug!("uart {} at {} baud", config.device_id, config.baud_rate);
        Ok(())
    }

    fn init_adapter(
        &mut self,
        _interrupts: &mut NoInterrupts,
        _serial: (),
        _config: &AdapterConfig,
    ) -> Result<HostAdapter, Status> {
        Ok(HostAdapter)
    }

    fn init_socket(&mut self, _config: SocketConfig<()>) -> Result<HostSocket, Status> {
        Ok(HostSocket { stream: None })
    }

    fn init_session(
        &mut self,
        config: SessionConfig<'b, HostSocket>,
    ) -> Result<Self::Session, Status> {
        MqttSession::new(config, HostClock(Instant::now()))
    }
}

/// Stdout as the node's console.
struct Stdout;

impl fmt::Write for Stdout {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let mut out = io::stdout().lock();
        out.write_all(s.as_bytes()).map_err(|_| fmt::Error)?;
        out.flush().map_err(|_| fmt::Error)
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let settings = Settings::DEFAULT;
    info!(
        "Configuration: broker={}:{}, client_id={}, publish={}, subscribe={}",
        settings.broker_host,
        settings.broker_port,
        settings.client_id,
        settings.publish_topic,
        settings.subscribe_topic
    );

    let mut send = [0u8; BUFF_LEN];
    let mut recv = [0u8; BUFF_LEN];
    let buffers = SessionBuffers {
        send: &mut send,
        recv: &mut recv,
    };

    let code = run_node(&mut Host, &settings, buffers, Stdout, &mut PrintSink::new(Stdout));
    ExitCode::from(code.unsigned_abs().min(255) as u8)
}
