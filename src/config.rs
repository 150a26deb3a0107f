//! Compile-time configuration.
//!
//! The node has no runtime configuration surface. Credentials and the broker
//! endpoint may be overridden when building, e.g.
//! `WIFI_SSID=lab WIFI_PWD=secret SERVER_ADDR=10.0.0.5 cargo build`.

use crate::platform::{DataBits, FlowControl, Parity, StopBits};
use crate::session::ProtocolVersion;

/// Interrupt controller identifier.
pub const INTC_DEVICE_ID: u32 = 0;
/// UART peripheral used for the adapter's AT command channel.
pub const UART_DEVICE_ID: u32 = 0;
/// Interrupt line attached to the UART.
pub const UART_IRQ_ID: u32 = 14;
/// Baud rate of the AT command channel.
pub const UART_BAUDRATE_DEFAULT: u32 = 115_200;
/// Hardware timer backing the MQTT command timeout.
pub const TIMER_ID: u32 = 1;

/// Size of each MQTT send and receive buffer.
pub const BUFF_LEN: usize = 256;
/// How long a single MQTT command may wait for its acknowledgement.
pub const MQTT_CONFIG_CMD_TIMEOUT_MS: u32 = 20_000;
/// MQTT keep-alive interval.
pub const MQTT_CONFIG_KEEP_ALIVE_MS: u32 = 7_200_000;
/// Dispatch budget of one steady-state cycle.
pub const SCAN_SENSOR_TIME_MS: u32 = 500;

/// Capacity of the outbound payload buffer.
pub const PAYLOAD_CAPACITY: usize = 100;
/// Number of inbound payload bytes the message handler copies at most.
pub const HANDLER_COPY_CAPACITY: usize = 100;

const fn or_default(value: Option<&'static str>, default: &'static str) -> &'static str {
    match value {
        Some(v) => v,
        None => default,
    }
}

/// WiFi network name.
pub const WIFI_SSID: &str = or_default(option_env!("WIFI_SSID"), "sensornode");
/// WiFi passphrase.
pub const WIFI_PWD: &str = or_default(option_env!("WIFI_PWD"), "sensornode-pass");
/// Broker host, as an address or a name the adapter can resolve.
pub const SERVER_ADDR: &str = or_default(option_env!("SERVER_ADDR"), "192.168.1.2");
/// Broker TCP port.
pub const SERVER_PORT: u16 = 1883;
/// MQTT client identifier.
pub const MQTT_CONFIG_CLIENT_NAME: &str = or_default(option_env!("MQTT_CLIENT_NAME"), "sensornode-client");
/// MQTT username; empty means none.
pub const MQTT_CONFIG_CLI_USER: &str = or_default(option_env!("MQTT_USER"), "");
/// MQTT password; empty means none.
pub const MQTT_CONFIG_CLI_PASS: &str = or_default(option_env!("MQTT_PASS"), "");
/// Topic the readings are published to.
pub const MQTT_PUBLISH_TOPIC: &str = "sensornode/data";
/// Topic the node listens on.
pub const MQTT_SUBSCRIBE_TOPIC: &str = "sensornode/cmd";

/// Every fixed parameter the bring-up and the loop consume.
///
/// [`Settings::DEFAULT`] collects the constants of this module. Tests and
/// demos build their own value with struct update syntax:
///
/// ```rust
/// use sensornode::config::Settings;
///
/// let settings = Settings {
///     wifi_ssid: "TestNet",
///     broker_host: "10.0.0.5",
///     ..Settings::DEFAULT
/// };
/// assert_eq!(settings.broker_port, 1883);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings<'a> {
    /// Interrupt controller identifier.
    pub intc_device_id: u32,
    /// UART peripheral identifier.
    pub uart_device_id: u32,
    /// Interrupt line of the UART.
    pub uart_irq_id: u32,
    /// UART baud rate.
    pub uart_baud_rate: u32,
    /// UART data bits.
    pub uart_data_bits: DataBits,
    /// UART parity.
    pub uart_parity: Parity,
    /// UART stop bits.
    pub uart_stop_bits: StopBits,
    /// UART flow control.
    pub uart_flow: FlowControl,
    /// Timer identifier used by the MQTT session.
    pub timer_id: u32,
    /// WiFi network name.
    pub wifi_ssid: &'a str,
    /// WiFi passphrase.
    pub wifi_password: &'a str,
    /// Broker host.
    pub broker_host: &'a str,
    /// Broker port.
    pub broker_port: u16,
    /// MQTT protocol revision.
    pub mqtt_version: ProtocolVersion,
    /// MQTT keep-alive interval in milliseconds.
    pub keep_alive_ms: u32,
    /// MQTT command timeout in milliseconds.
    pub command_timeout_ms: u32,
    /// MQTT client identifier.
    pub client_id: &'a str,
    /// MQTT username; empty means none.
    pub username: &'a str,
    /// MQTT password; empty means none.
    pub password: &'a str,
    /// Topic readings are published to.
    pub publish_topic: &'a str,
    /// Topic the node subscribes to.
    pub subscribe_topic: &'a str,
    /// Dispatch budget per cycle in milliseconds.
    pub dispatch_budget_ms: u32,
}

impl Settings<'static> {
    /// The build-time configuration.
    pub const DEFAULT: Settings<'static> = Settings {
        intc_device_id: INTC_DEVICE_ID,
        uart_device_id: UART_DEVICE_ID,
        uart_irq_id: UART_IRQ_ID,
        uart_baud_rate: UART_BAUDRATE_DEFAULT,
        uart_data_bits: DataBits::Eight,
        uart_parity: Parity::None,
        uart_stop_bits: StopBits::One,
        uart_flow: FlowControl::Disabled,
        timer_id: TIMER_ID,
        wifi_ssid: WIFI_SSID,
        wifi_password: WIFI_PWD,
        broker_host: SERVER_ADDR,
        broker_port: SERVER_PORT,
        mqtt_version: ProtocolVersion::V3_1_1,
        keep_alive_ms: MQTT_CONFIG_KEEP_ALIVE_MS,
        command_timeout_ms: MQTT_CONFIG_CMD_TIMEOUT_MS,
        client_id: MQTT_CONFIG_CLIENT_NAME,
        username: MQTT_CONFIG_CLI_USER,
        password: MQTT_CONFIG_CLI_PASS,
        publish_topic: MQTT_PUBLISH_TOPIC,
        subscribe_topic: MQTT_SUBSCRIBE_TOPIC,
        dispatch_budget_ms: SCAN_SENSOR_TIME_MS,
    };
}

impl Default for Settings<'static> {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Treats an empty credential as absent.
pub(crate) fn non_empty(value: &str) -> Option<&str> {
    if value.is_empty() { None } else { Some(value) }
}
