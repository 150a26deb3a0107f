mod mock;

use mock::{Console, INTERFACE, MockPlatform, RecordedConnect};
use sensornode::config::{BUFF_LEN, Settings};
use sensornode::error::{NodeError, Stage, Status};
use sensornode::node::{Node, PrintSink, SessionBuffers, run_node};
use sensornode::platform::{
    AdapterConfig, DataBits, DispatchPolicy, FlowControl, InterruptConfig, Parity, SerialConfig,
    StopBits,
};
use sensornode::session::QoS;

const BRING_UP_CALLS: [&str; 11] = [
    "init_interrupts",
    "global_enable",
    "init_serial",
    "init_adapter",
    "wifi_connect",
    "ip_address",
    "init_socket",
    "socket_connect",
    "init_session",
    "mqtt_connect",
    "subscribe",
];

const FAILURE_POINTS: [(&str, Stage); 10] = [
    ("init_interrupts", Stage::InterruptInit),
    ("global_enable", Stage::InterruptEnable),
    ("init_serial", Stage::SerialInit),
    ("init_adapter", Stage::AdapterInit),
    ("wifi_connect", Stage::AdapterConnect),
    ("init_socket", Stage::SocketInit),
    ("socket_connect", Stage::SocketConnect),
    ("init_session", Stage::SessionInit),
    ("mqtt_connect", Stage::SessionConnect),
    ("subscribe", Stage::Subscribe),
];

fn buffers<'b>(send: &'b mut [u8; BUFF_LEN], recv: &'b mut [u8; BUFF_LEN]) -> SessionBuffers<'b> {
    SessionBuffers { send, recv }
}

fn test_settings() -> Settings<'static> {
    Settings {
        wifi_ssid: "TestNet",
        wifi_password: "secret",
        broker_host: "10.0.0.5",
        broker_port: 1883,
        client_id: "node-under-test",
        username: "",
        password: "",
        publish_topic: "telemetry/out",
        subscribe_topic: "telemetry/in",
        ..Settings::DEFAULT
    }
}

fn diagnostic(stage: Stage, code: i32) -> String {
    format!("{} - Code: {} (-0x{:x}) \n", stage.label(), code, code.unsigned_abs())
}

#[test]
fn bring_up_runs_every_stage_in_order() {
    let settings = test_settings();
    let console = Console::default();
    let mut platform = MockPlatform::new();
    let (mut send, mut recv) = ([0u8; BUFF_LEN], [0u8; BUFF_LEN]);

    let mut node = Node::new(&settings, console.clone());
    let device = node
        .bring_up(&mut platform, buffers(&mut send, &mut recv))
        .unwrap();

    assert_eq!(device.counter(), 0);
    assert_eq!(platform.calls(), BRING_UP_CALLS);
    assert_eq!(
        console.contents(),
        "Device ip is: 10.0.0.42\n\
         Connection with \"10.0.0.5\" established\n\
         Connected to mqtt broker\n\
         Subscribed to topic: telemetry/in\n"
    );
}

#[test]
fn bring_up_hands_the_configuration_to_each_collaborator() {
    let settings = test_settings();
    let mut platform = MockPlatform::new();
    let (mut send, mut recv) = ([0u8; BUFF_LEN], [0u8; BUFF_LEN]);

    let mut node = Node::new(&settings, Console::default());
    node.bring_up(&mut platform, buffers(&mut send, &mut recv))
        .unwrap();

    let recorder = platform.shared.borrow();
    assert_eq!(
        recorder.interrupt_config,
        Some(InterruptConfig {
            controller_id: 0,
            policy: DispatchPolicy::Vectored,
        })
    );
    assert_eq!(
        recorder.serial_config,
        Some(SerialConfig {
            device_id: 0,
            irq_id: 14,
            baud_rate: 115_200,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            flow: FlowControl::Disabled,
            asynchronous_rx: true,
        })
    );
    assert_eq!(recorder.adapter_config, Some(AdapterConfig { uart_irq_id: 14 }));
    assert_eq!(
        recorder.credentials,
        Some(("TestNet".to_string(), "secret".to_string()))
    );
    assert_eq!(recorder.socket_interface, Some(INTERFACE));
    assert_eq!(recorder.socket_buffer_size, Some(0));
    assert_eq!(recorder.broker, Some(("10.0.0.5".to_string(), 1883)));
    assert_eq!(recorder.session_timer, Some(1));
    assert_eq!(recorder.session_timeout_ms, Some(20_000));
    assert_eq!(recorder.session_buffers, Some((BUFF_LEN, BUFF_LEN)));
    assert_eq!(
        recorder.connect,
        Some(RecordedConnect {
            client_id: "node-under-test".to_string(),
            username: None,
            password: None,
            keep_alive_ms: 7_200_000,
        })
    );
    assert_eq!(
        recorder.subscriptions,
        [("telemetry/in".to_string(), QoS::AtMostOnce)]
    );
}

#[test]
fn credentials_are_sent_when_configured() {
    let settings = Settings {
        username: "user",
        password: "pw",
        ..test_settings()
    };
    let mut platform = MockPlatform::new();
    let (mut send, mut recv) = ([0u8; BUFF_LEN], [0u8; BUFF_LEN]);

    Node::new(&settings, Console::default())
        .bring_up(&mut platform, buffers(&mut send, &mut recv))
        .unwrap();

    let connect = platform.shared.borrow().connect.clone().unwrap();
    assert_eq!(connect.username.as_deref(), Some("user"));
    assert_eq!(connect.password.as_deref(), Some("pw"));
}

#[test]
fn unknown_address_is_reported_and_bring_up_continues() {
    let settings = test_settings();
    let console = Console::default();
    let mut platform = MockPlatform::new();
    platform.ip = None;
    let (mut send, mut recv) = ([0u8; BUFF_LEN], [0u8; BUFF_LEN]);

    Node::new(&settings, console.clone())
        .bring_up(&mut platform, buffers(&mut send, &mut recv))
        .unwrap();

    assert!(console.contents().starts_with("Device ip is: unknown\n"));
    assert_eq!(platform.calls(), BRING_UP_CALLS);
}

#[test]
fn bring_up_stops_at_the_first_failing_stage() {
    let settings = test_settings();

    for (i, (call, stage)) in FAILURE_POINTS.into_iter().enumerate() {
        let code = -(10 + i as i32);
        let console = Console::default();
        let mut platform = MockPlatform::failing(call, code);
        let (mut send, mut recv) = ([0u8; BUFF_LEN], [0u8; BUFF_LEN]);

        let err = Node::new(&settings, console.clone())
            .bring_up(&mut platform, buffers(&mut send, &mut recv))
            .unwrap_err();

        assert_eq!(err, NodeError::new(stage, Status::new(code)), "{call}");
        let attempted = BRING_UP_CALLS.iter().position(|c| *c == call).unwrap() + 1;
        assert_eq!(platform.calls(), &BRING_UP_CALLS[..attempted], "{call}");
        assert!(
            console.contents().ends_with(&diagnostic(stage, code)),
            "{call}: {:?}",
            console.contents()
        );
        assert_eq!(console.contents().matches("Error ").count(), 1, "{call}");
    }
}

#[test]
fn failing_socket_connect_ends_the_process_with_its_code() {
    let settings = test_settings();
    let console = Console::default();
    let mut platform = MockPlatform::failing("socket_connect", -1);
    let (mut send, mut recv) = ([0u8; BUFF_LEN], [0u8; BUFF_LEN]);
    let mut sink = PrintSink::new(console.clone());

    let code = run_node(
        &mut platform,
        &settings,
        buffers(&mut send, &mut recv),
        console.clone(),
        &mut sink,
    );

    assert_eq!(code, -1);
    assert!(console.contents().contains("Error socket_connect - Code: -1 (-0x1) \n"));
    assert!(!console.contents().contains("established"));
    assert!(!platform.calls().contains(&"init_session"));
}

#[test]
fn steady_state_publishes_then_dispatches_every_cycle() {
    let settings = test_settings();
    let console = Console::default();
    let mut platform = MockPlatform::new();
    platform.queue_inbound(&[]);
    platform.queue_inbound(&[("telemetry/in", b"hello")]);
    let (mut send, mut recv) = ([0u8; BUFF_LEN], [0u8; BUFF_LEN]);
    let mut sink = PrintSink::new(console.clone());

    let mut node = Node::new(&settings, console.clone());
    let mut device = node
        .bring_up(&mut platform, buffers(&mut send, &mut recv))
        .unwrap();
    node.run_cycles(&mut device, 3, &mut sink).unwrap();

    assert_eq!(device.counter(), 3);
    assert_eq!(
        &platform.calls()[BRING_UP_CALLS.len()..],
        ["publish", "dispatch", "publish", "dispatch", "publish", "dispatch"]
    );

    let recorder = platform.shared.borrow();
    let payloads: Vec<_> = recorder
        .published
        .iter()
        .map(|(topic, payload, qos, retained)| {
            assert_eq!(topic, "telemetry/out");
            assert_eq!(*qos, QoS::AtMostOnce);
            assert!(!retained);
            String::from_utf8(payload.clone()).unwrap()
        })
        .collect();
    assert_eq!(
        payloads,
        ["Data from device: 0", "Data from device: 1", "Data from device: 2"]
    );
    assert_eq!(recorder.dispatch_budgets, [500, 500, 500]);

    assert!(console.contents().ends_with(
        "Subscribed to topic: telemetry/in\n\
         Data sent to broker\n\
         Data sent to broker\n\
         Topic:telemetry/in -- Payload: hello\n\
         Data sent to broker\n"
    ));
}

#[test]
fn publish_failure_ends_the_loop_without_dispatching() {
    let settings = test_settings();
    let console = Console::default();
    let mut platform = MockPlatform::failing_after("publish", 2, -5);
    let (mut send, mut recv) = ([0u8; BUFF_LEN], [0u8; BUFF_LEN]);
    let mut sink = PrintSink::new(console.clone());

    let mut node = Node::new(&settings, console.clone());
    let mut device = node
        .bring_up(&mut platform, buffers(&mut send, &mut recv))
        .unwrap();
    let err = node.run(&mut device, &mut sink);

    assert_eq!(err, NodeError::new(Stage::Publish, Status::EIO));
    assert_eq!(device.counter(), 2);
    assert_eq!(platform.shared.borrow().dispatch_budgets.len(), 2);
    assert!(console.contents().ends_with(&diagnostic(Stage::Publish, -5)));
}

#[test]
fn dispatch_failure_does_not_advance_the_counter() {
    let settings = test_settings();
    let console = Console::default();
    let mut platform = MockPlatform::failing_after("dispatch", 0, -110);
    let (mut send, mut recv) = ([0u8; BUFF_LEN], [0u8; BUFF_LEN]);
    let mut sink = PrintSink::new(console.clone());

    let mut node = Node::new(&settings, console.clone());
    let mut device = node
        .bring_up(&mut platform, buffers(&mut send, &mut recv))
        .unwrap();
    let err = node.run(&mut device, &mut sink);

    assert_eq!(err, NodeError::new(Stage::Dispatch, Status::ETIMEDOUT));
    assert_eq!(device.counter(), 0);
    assert_eq!(platform.shared.borrow().published.len(), 1);
    assert!(console.contents().ends_with(
        "Data sent to broker\nError mqtt_yield - Code: -110 (-0x6e) \n"
    ));
}

#[test]
fn run_node_returns_the_code_of_the_failing_cycle() {
    let settings = test_settings();
    let console = Console::default();
    let mut platform = MockPlatform::failing_after("dispatch", 4, -7);
    let (mut send, mut recv) = ([0u8; BUFF_LEN], [0u8; BUFF_LEN]);
    let mut seen = 0usize;
    let mut sink = |_: &sensornode::session::InboundMessage<'_>| seen += 1;
    for _ in 0..5 {
        platform.queue_inbound(&[("telemetry/in", b"x")]);
    }

    let code = run_node(
        &mut platform,
        &settings,
        buffers(&mut send, &mut recv),
        console.clone(),
        &mut sink,
    );

    assert_eq!(code, -7);
    assert_eq!(platform.shared.borrow().published.len(), 5);
    assert_eq!(console.contents().matches("Data sent to broker\n").count(), 5);
    assert_eq!(seen, 4);
}
