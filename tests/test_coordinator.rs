mod common;
use common::*;

use dess_bridge::ascii::encode_command;
use dess_bridge::coordinator::{Coordinator, PolledDevice};
use dess_bridge::estimator::{DeviceEstimators, JsonFileStore};
use dess_bridge::modbus::telemetry::RUNTIME_BLOCK;
use dess_bridge::modbus::FrameCommon;
use dess_bridge::prelude::*;
use dess_bridge::provider::{AsciiProvider, ModbusProvider};

use std::sync::Arc;
use std::time::Duration;

const CONFIG: &str = r#"
poll_interval: 10
poll_timeout: 5
devices:
  - name: roof
    provider: direct
    host: 10.0.0.1
    port: 8899
    battery:
      capacity_wh: 5000
      bulk_voltage: 56.4
      float_voltage: 54.0
  - name: garage
    provider: anern_modbus
    host: 10.0.0.2
    port: 502
"#;

fn config() -> ConfigWrapper {
    ConfigWrapper::from_config(Config::parse(CONFIG).unwrap())
}

fn ascii_device() -> ScriptedTransport {
    ScriptedTransport::new()
        .respond(encode_command("QPIGS"), Factory::ascii_frame(Factory::qpigs_payload()))
        .respond(encode_command("QPIRI"), Factory::ascii_frame(Factory::qpiri_payload()))
        .respond(encode_command("QMOD"), Factory::ascii_frame("(B"))
        .respond(encode_command("QMN"), Factory::ascii_frame("(VMII-NXPW5KW"))
        .respond(encode_command("QVFW"), Factory::ascii_frame("(VERFW:00072.70"))
}

fn modbus_device() -> ScriptedTransport {
    ScriptedTransport::new().respond(
        RUNTIME_BLOCK.request(1).unwrap().bytes(),
        Factory::read_response(1, &Factory::runtime_registers()),
    )
}

fn devices(roof: ScriptedTransport, garage: ScriptedTransport) -> Vec<PolledDevice> {
    vec![
        PolledDevice::new("roof", AsciiProvider::new(Arc::new(roof)).into()),
        PolledDevice::new(
            "garage",
            ModbusProvider::new(Arc::new(garage), 1).unwrap().into(),
        ),
    ]
}

#[tokio::test]
async fn polls_every_device() {
    let mut c = Coordinator::from_devices(config(), devices(ascii_device(), modbus_device()), None).unwrap();

    let reports = c.poll_all().await;
    assert_eq!(reports.len(), 2);
    assert!(reports.iter().all(|r| r.is_ok()));

    let roof = reports[0].outcome.as_ref().unwrap();
    assert_eq!(roof.snapshot.operating_mode, OperatingMode::Battery);
    // starts empty until reset
    assert_eq!(roof.estimates.soc_percent, Some(0.0));

    let garage = reports[1].outcome.as_ref().unwrap();
    assert_eq!(garage.snapshot.battery_power_w, Some(-160.0));
    // no battery configured
    assert_eq!(garage.estimates.soc_percent, None);

    let json = reports[1].to_json();
    assert_eq!(json["device"], "garage");
    assert_eq!(json["snapshot"]["operating_mode"], "Battery");
}

#[tokio::test]
async fn failing_device_does_not_affect_others() {
    let mut c = Coordinator::from_devices(config(), devices(ascii_device(), ScriptedTransport::new()), None).unwrap();

    let reports = c.poll_all().await;
    assert!(reports[0].is_ok());
    assert!(matches!(
        reports[1].outcome,
        Err(Error::TransportFailure(_))
    ));
    assert!(reports[1].to_json()["error"].is_string());

    // estimators only move on a successful poll
    assert!(c.estimators("roof").unwrap().pv.previous.is_some());
    assert_eq!(c.estimators("garage"), Some(&DeviceEstimators::default()));
}

#[tokio::test(start_paused = true)]
async fn slow_device_times_out() {
    let slow = modbus_device().delayed(Duration::from_secs(60));
    let mut c = Coordinator::from_devices(config(), devices(ascii_device(), slow), None).unwrap();

    let reports = c.poll_all().await;
    assert!(reports[0].is_ok());
    assert_eq!(
        reports[1].outcome,
        Err(Error::TransportTimeout(Duration::from_secs(5)))
    );
    assert_eq!(c.estimators("garage"), Some(&DeviceEstimators::default()));
}

#[tokio::test]
async fn probe_reports_each_device() {
    let c = Coordinator::from_devices(config(), devices(ascii_device(), ScriptedTransport::new()), None).unwrap();
    let probes = c.probe_all().await;
    assert_eq!(
        probes,
        vec![("roof".to_owned(), true), ("garage".to_owned(), false)]
    );
}

#[tokio::test]
async fn reset_soc() {
    let mut c = Coordinator::from_devices(config(), devices(ascii_device(), modbus_device()), None).unwrap();
    c.poll_all().await;

    c.reset_soc("roof", 50.0).unwrap();
    assert_eq!(c.estimators("roof").unwrap().soc.accumulated_wh, 2500.0);

    assert!(c.reset_soc("garage", 50.0).is_err());
    assert!(c.reset_soc("shed", 50.0).is_err());
}

#[tokio::test]
async fn battery_change_applies_on_next_poll() {
    let config = config();
    let mut c = Coordinator::from_devices(config.clone(), devices(ascii_device(), modbus_device()), None).unwrap();

    c.poll_all().await;
    c.reset_soc("roof", 50.0).unwrap();

    config
        .set_battery(
            "roof",
            config::Battery {
                capacity_wh: 10000.0,
                bulk_voltage: 56.4,
                float_voltage: 54.0,
            },
        )
        .unwrap();

    let reports = c.poll_all().await;
    let soc = reports[0].outcome.as_ref().unwrap().estimates.soc_percent.unwrap();
    // 2500 Wh of a 10 kWh battery, plus a few ms of charging
    assert!((soc - 25.0).abs() < 0.1, "soc {}", soc);
}

#[tokio::test]
async fn state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");

    let mut c = Coordinator::from_devices(
        config(),
        devices(ascii_device(), modbus_device()),
        Some(JsonFileStore::new(&path)),
    )
    .unwrap();
    c.poll_all().await;
    c.reset_soc("roof", 40.0).unwrap();
    c.persist().unwrap();
    let before = c.estimators("roof").unwrap().clone();

    let restarted = Coordinator::from_devices(
        config(),
        devices(ascii_device(), modbus_device()),
        Some(JsonFileStore::new(&path)),
    )
    .unwrap();
    assert_eq!(restarted.estimators("roof"), Some(&before));
    assert_eq!(restarted.devices().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn run_until_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");

    let c = Coordinator::from_devices(
        config(),
        devices(ascii_device(), modbus_device()),
        Some(JsonFileStore::new(&path)),
    )
    .unwrap();

    let (tx, rx) = tokio::sync::broadcast::channel(1);
    let stop = async {
        tokio::time::sleep(Duration::from_secs(25)).await;
        tx.send(()).unwrap();
    };
    let (result, _) = tokio::join!(c.run(rx), stop);
    result.unwrap();

    let saved = JsonFileStore::new(&path).load().unwrap();
    assert!(saved.contains_key("roof"));
    assert!(saved.contains_key("garage"));
}

#[tokio::test]
async fn identity_is_echoed_into_reports() {
    let config = ConfigWrapper::from_config(
        Config::parse(
            r#"
devices:
  - name: roof
    provider: direct
    host: 10.0.0.1
    port: 8899
    identity:
      address: 1
      device_code: 2341
      part_number: PN1
      serial_number: SN1
  - name: garage
    provider: anern_modbus
    host: 10.0.0.2
    port: 502
"#,
        )
        .unwrap(),
    );

    // providers are built without connecting
    let c = Coordinator::new(config.clone()).unwrap();
    let roof = &c.devices()[0];
    assert_eq!(roof.identity().map(|i| i.serial_number.as_str()), Some("SN1"));
    assert_eq!(c.devices()[1].identity(), None);

    let identity = config.device("roof").unwrap().identity;
    let devices = devices(ascii_device(), ScriptedTransport::new())
        .into_iter()
        .map(|d| {
            let id = if d.name() == "roof" { identity.clone() } else { None };
            d.with_identity(id)
        })
        .collect();
    let mut c = Coordinator::from_devices(config, devices, None).unwrap();

    let reports = c.poll_all().await;
    assert_eq!(reports[0].identity, identity);
    let json = reports[0].to_json();
    assert_eq!(json["identity"]["part_number"], "PN1");
    assert_eq!(json["identity"]["device_code"], 2341);
    // no identity configured
    assert!(reports[1].to_json().get("identity").is_none());
}
