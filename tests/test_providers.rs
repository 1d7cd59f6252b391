mod common;
use common::*;

use dess_bridge::ascii::encode_command;
use dess_bridge::modbus::telemetry::{FAULTS_BLOCK, RUNTIME_BLOCK};
use dess_bridge::modbus::FrameCommon;
use dess_bridge::prelude::*;
use dess_bridge::provider::*;
use dess_bridge::transport::Transport;

use std::sync::Arc;

fn ascii_device() -> ScriptedTransport {
    ScriptedTransport::new()
        .respond(encode_command("QPIGS"), Factory::ascii_frame(Factory::qpigs_payload()))
        .respond(encode_command("QPIRI"), Factory::ascii_frame(Factory::qpiri_payload()))
        .respond(encode_command("QMOD"), Factory::ascii_frame("(B"))
        .respond(encode_command("QMN"), Factory::ascii_frame("(VMII-NXPW5KW"))
        .respond(encode_command("QVFW"), Factory::ascii_frame("(VERFW:00072.70"))
        .respond(encode_command("QPIGS2"), Factory::ascii_frame(Factory::qpigs2_payload()))
        .respond(encode_command("QID"), Factory::ascii_frame("(92932004102453"))
}

fn modbus_device(slave_id: u8) -> ScriptedTransport {
    let runtime = RUNTIME_BLOCK.request(slave_id).unwrap();
    ScriptedTransport::new().respond(
        runtime.bytes(),
        Factory::read_response(slave_id, &Factory::runtime_registers()),
    )
}

#[test]
fn registry_knows_builtin_kinds() {
    let registry = Registry::default();
    let kinds: Vec<&str> = registry.kinds().collect();
    assert_eq!(kinds, vec!["anern_modbus", "direct"]);

    let transport: Arc<dyn Transport> = Arc::new(ScriptedTransport::new());
    let provider = registry.create("direct", ProviderArgs::new(transport.clone())).unwrap();
    assert_eq!(provider.kind(), "direct");

    match registry.create("foo", ProviderArgs::new(transport.clone())) {
        Err(err) => assert_eq!(err, Error::UnknownProviderKind("foo".to_owned())),
        Ok(_) => panic!("unknown kind created a provider"),
    }

    // slave id is checked at construction
    assert!(registry
        .create("anern_modbus", ProviderArgs::new(transport).slave_id(0))
        .is_err());
}

#[tokio::test]
async fn ascii_snapshot() {
    let provider = AsciiProvider::new(Arc::new(ascii_device()));
    let snap = provider.read_snapshot().await.unwrap();

    assert_eq!(snap.model.as_deref(), Some("VMII-NXPW5KW"));
    assert_eq!(snap.firmware.as_deref(), Some("00072.70"));
    assert_eq!(snap.serial.as_deref(), Some("92932004102453"));
    assert_eq!(snap.operating_mode, OperatingMode::Battery);

    assert_eq!(snap.grid_voltage_v, Some(230.0));
    assert_eq!(snap.battery_voltage_v, Some(52.4));
    assert_eq!(snap.battery_current_a, Some(10.0));
    assert!((snap.battery_power_w.unwrap() - 524.0).abs() < 1e-9);
    assert_eq!(snap.battery_soc_percent, Some(62.0));
    assert_eq!(snap.pv_power_w, Some(456.0));
    assert_eq!(snap.pv2_voltage_v, Some(310.4));
    assert_eq!(snap.pv2_power_w, Some(651.0));
    assert_eq!(snap.pv_total_power_w(), Some(1107.0));

    // no grid power field in QPIGS
    assert_eq!(snap.grid_input_power_w, None);

    assert!(snap.raw.contains_key("qpigs"));
    assert!(snap.raw.contains_key("qpigs2"));
}

#[tokio::test]
async fn ascii_optional_queries_may_fail() {
    let transport = ascii_device()
        .fail(encode_command("QPIGS2"), Error::TransportFailure("NAK".to_owned()))
        .fail(encode_command("QID"), Error::TransportFailure("NAK".to_owned()));
    let provider = AsciiProvider::new(Arc::new(transport));

    let snap = provider.read_snapshot().await.unwrap();
    assert_eq!(snap.pv2_power_w, None);
    assert_eq!(snap.serial, None);
    assert_eq!(snap.pv_total_power_w(), Some(456.0));
    assert!(!snap.raw.contains_key("qpigs2"));
}

#[tokio::test]
async fn ascii_required_query_failure_is_an_error() {
    let mut bad = Factory::ascii_frame(Factory::qpiri_payload());
    bad[2] ^= 0x01;
    let transport = ascii_device().respond(encode_command("QPIRI"), bad);
    let provider = AsciiProvider::new(Arc::new(transport));

    assert!(matches!(
        provider.read_snapshot().await,
        Err(Error::ChecksumMismatch { .. })
    ));
}

#[tokio::test]
async fn ascii_probe() {
    let provider = AsciiProvider::new(Arc::new(ascii_device()));
    assert!(provider.probe().await);

    let provider = AsciiProvider::new(Arc::new(ScriptedTransport::new()));
    assert!(!provider.probe().await);
}

#[tokio::test]
async fn modbus_snapshot() {
    let transport = Arc::new(modbus_device(1));
    let provider = ModbusProvider::new(transport.clone(), 1).unwrap();
    let snap = provider.read_snapshot().await.unwrap();

    assert_eq!(snap.model.as_deref(), Some("ANERN-5K"));
    assert_eq!(snap.serial.as_deref(), Some("SN123"));
    assert_eq!(snap.operating_mode, OperatingMode::Battery);
    assert_eq!(snap.grid_voltage_v, Some(230.1));
    assert_eq!(snap.grid_input_power_w, Some(120.0));
    assert_eq!(snap.battery_voltage_v, Some(53.9));
    // power flow says discharging
    assert_eq!(snap.battery_current_a, Some(-3.0));
    assert_eq!(snap.battery_power_w, Some(-160.0));
    assert_eq!(snap.battery_soc_percent, Some(80.0));
    assert_eq!(snap.pv_power_w, Some(456.0));
    assert_eq!(snap.pv2_power_w, None);
    assert!(snap.raw.contains_key("anern_registers"));

    // fault block was asked for and its failure tolerated
    let faults = FAULTS_BLOCK.request(1).unwrap();
    assert!(transport.requests().contains(&faults.bytes()));
}

#[tokio::test]
async fn modbus_corrupted_response() {
    let runtime = RUNTIME_BLOCK.request(1).unwrap();
    let mut response = Factory::read_response(1, &Factory::runtime_registers());
    let last = response.len() - 1;
    response[last] ^= 0xFF;

    let transport = ScriptedTransport::new().respond(runtime.bytes(), response);
    let provider = ModbusProvider::new(Arc::new(transport), 1).unwrap();

    assert!(!provider.probe().await);
    assert!(matches!(
        provider.read_snapshot().await,
        Err(Error::ChecksumMismatch { .. })
    ));
}

#[tokio::test]
async fn modbus_answer_from_another_slave() {
    let runtime = RUNTIME_BLOCK.request(3).unwrap();
    let transport = ScriptedTransport::new().respond(
        runtime.bytes(),
        Factory::read_response(4, &Factory::runtime_registers()),
    );
    let provider = ModbusProvider::new(Arc::new(transport), 3).unwrap();

    assert_eq!(
        provider.read_snapshot().await,
        Err(Error::UnexpectedSlaveId { expected: 3, got: 4 })
    );
}

#[tokio::test]
async fn provider_enum_dispatches() {
    let provider: Provider = ModbusProvider::new(Arc::new(modbus_device(1)), 1)
        .unwrap()
        .into();
    assert_eq!(provider.kind(), "anern_modbus");
    assert!(provider.probe().await);
}
