use crate::ascii::{self, AsciiFields, Command};
use crate::error::Error;
use crate::prelude::*;
use crate::provider::InverterProvider;
use crate::resolve;
use crate::transport::{to_hex, Transport};

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

/// Inverters speaking the ASCII query protocol (QPIGS family).
pub struct AsciiProvider {
    transport: Arc<dyn Transport>,
}

impl AsciiProvider {
    pub const KIND: &'static str = "direct";

    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    pub async fn query(&self, command: Command) -> Result<AsciiFields, Error> {
        let frame = ascii::encode_command(command.name());
        trace!("{} -> {}", command, to_hex(&frame));
        let response = self.transport.send(&frame).await?;
        trace!("{} <- {}", command, to_hex(&response));

        ascii::decode_response(command, &response)
    }

    /// Optional queries: older firmware rejects some of these.
    async fn query_optional(&self, command: Command) -> Option<AsciiFields> {
        match self.query(command).await {
            Ok(fields) => Some(fields),
            Err(err) => {
                debug!("optional {} failed: {}", command, err);
                None
            }
        }
    }
}

#[async_trait]
impl InverterProvider for AsciiProvider {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    async fn probe(&self) -> bool {
        match self.query(Command::Qmod).await {
            Ok(fields) => !fields.is_empty(),
            Err(err) => {
                debug!("probe failed: {}", err);
                false
            }
        }
    }

    async fn read_snapshot(&self) -> Result<CanonicalSnapshot, Error> {
        let timestamp = Utc::now();

        let qpigs = self.query(Command::Qpigs).await?;
        let qpiri = self.query(Command::Qpiri).await?;
        let qmod = self.query(Command::Qmod).await?;
        let qmn = self.query(Command::Qmn).await?;
        let qvfw = self.query(Command::Qvfw).await?;
        let qpigs2 = self.query_optional(Command::Qpigs2).await;
        let qid = self.query_optional(Command::Qid).await;

        Ok(build_snapshot(
            timestamp,
            &qpigs,
            &qpiri,
            &qmod,
            &qmn,
            &qvfw,
            qpigs2.as_ref(),
            qid.as_ref(),
        ))
    }
}

#[allow(clippy::too_many_arguments)]
fn build_snapshot(
    timestamp: chrono::DateTime<Utc>,
    qpigs: &AsciiFields,
    qpiri: &AsciiFields,
    qmod: &AsciiFields,
    qmn: &AsciiFields,
    qvfw: &AsciiFields,
    qpigs2: Option<&AsciiFields>,
    qid: Option<&AsciiFields>,
) -> CanonicalSnapshot {
    let g = |name: &str| qpigs.get_f64(name);
    let g2 = |name: &str| qpigs2.and_then(|f| f.get_f64(name));

    let mut snap = CanonicalSnapshot::new(timestamp);

    snap.model = qmn.get_text("model").map(str::to_owned);
    snap.firmware = qvfw.get_text("firmware_version").map(str::to_owned);
    snap.serial = qid.and_then(|f| f.get_text("device_id")).map(str::to_owned);

    snap.grid_voltage_v = g("grid_voltage");
    snap.grid_freq_hz = g("grid_frequency");
    snap.grid_input_power_w = resolve::grid_input_power(|name| g(name).or_else(|| g2(name)));

    snap.ac_out_voltage_v = g("ac_output_voltage");
    snap.ac_out_freq_hz = g("ac_output_frequency");
    snap.out_active_power_w = g("output_active_power");
    snap.out_apparent_power_va = g("output_apparent_power");
    snap.load_percent = g("load_percent");

    snap.battery_voltage_v = g("battery_voltage");
    snap.battery_current_a = resolve::signed_battery_current(
        g("battery_charging_current"),
        g("battery_discharge_current"),
    );
    snap.battery_power_w =
        resolve::battery_power(None, snap.battery_voltage_v, snap.battery_current_a);
    snap.battery_soc_percent = g("battery_capacity");
    snap.inverter_temp_c = g("inverter_heat_sink_temperature");

    snap.pv_voltage_v = g("pv_input_voltage");
    snap.pv_current_a = g("pv_input_current");
    snap.pv_power_w = resolve::pv_channel_power(
        g("pv_charging_power"),
        snap.pv_voltage_v,
        snap.pv_current_a,
    );

    snap.pv2_voltage_v = g2("pv_voltage");
    snap.pv2_current_a = g2("pv_current");
    snap.pv2_power_w = resolve::pv_channel_power(
        g2("pv_charging_power"),
        snap.pv2_voltage_v,
        snap.pv2_current_a,
    );

    snap.operating_mode = qmod
        .get_text("operating_mode")
        .map(OperatingMode::from_qmod)
        .unwrap_or_default();

    snap.raw.insert("qpigs".to_owned(), qpigs.to_json());
    snap.raw.insert("qpiri".to_owned(), qpiri.to_json());
    snap.raw.insert("qmod".to_owned(), qmod.to_json());
    snap.raw.insert("qmn".to_owned(), qmn.to_json());
    snap.raw.insert("qvfw".to_owned(), qvfw.to_json());
    if let Some(f) = qpigs2 {
        snap.raw.insert("qpigs2".to_owned(), f.to_json());
    }
    if let Some(f) = qid {
        snap.raw.insert("qid".to_owned(), f.to_json());
    }

    snap
}
