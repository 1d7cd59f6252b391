use crate::error::Error;
use crate::modbus::telemetry::{FAULTS_BLOCK, RUNTIME_BLOCK};
use crate::modbus::{
    decode_read_response, BatteryState, DecodedRegisterBlock, FrameCommon, ReadBlock, ReadHolding,
    RegisterMap, RegisterValues, RuntimeTelemetry,
};
use crate::prelude::*;
use crate::provider::InverterProvider;
use crate::resolve;
use crate::transport::{to_hex, Transport};

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

/// Modbus-RTU inverters of the ANERN register family.
pub struct ModbusProvider {
    transport: Arc<dyn Transport>,
    slave_id: u8,
    map: RegisterMap,
}

impl ModbusProvider {
    pub const KIND: &'static str = "anern_modbus";

    pub fn new(transport: Arc<dyn Transport>, slave_id: u8) -> Result<Self, Error> {
        Self::with_map(transport, slave_id, RegisterMap::anern())
    }

    pub fn with_map(
        transport: Arc<dyn Transport>,
        slave_id: u8,
        map: RegisterMap,
    ) -> Result<Self, Error> {
        // fail at construction rather than on the first poll
        RUNTIME_BLOCK.request(slave_id)?;

        Ok(Self {
            transport,
            slave_id,
            map,
        })
    }

    pub fn slave_id(&self) -> u8 {
        self.slave_id
    }

    pub async fn read_block(&self, block: &ReadBlock) -> Result<DecodedRegisterBlock, Error> {
        let request: ReadHolding = block.request(self.slave_id)?;
        let frame = request.bytes();
        trace!("{} -> {}", block.name, to_hex(&frame));
        let response = self.transport.send(&frame).await?;
        trace!("{} <- {}", block.name, to_hex(&response));

        decode_read_response(
            self.slave_id,
            request.register(),
            Some(request.count()),
            &response,
        )
    }
}

/// Orients a reading by the power-flow battery state when the device
/// reports magnitudes only.
fn oriented(value: Option<f64>, state: Option<BatteryState>) -> Option<f64> {
    let v = value?;
    Some(match state {
        Some(BatteryState::Charging) => v.abs(),
        Some(BatteryState::Discharging) => -v.abs(),
        _ => v,
    })
}

#[async_trait]
impl InverterProvider for ModbusProvider {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    async fn probe(&self) -> bool {
        match self.read_block(&RUNTIME_BLOCK).await {
            Ok(_) => true,
            Err(err) => {
                debug!("probe of slave {} failed: {}", self.slave_id, err);
                false
            }
        }
    }

    async fn read_snapshot(&self) -> Result<CanonicalSnapshot, Error> {
        let timestamp = Utc::now();

        let mut blocks = vec![self.read_block(&RUNTIME_BLOCK).await?];
        match self.read_block(&FAULTS_BLOCK).await {
            Ok(block) => blocks.push(block),
            Err(err) => debug!("fault block of slave {} unavailable: {}", self.slave_id, err),
        }

        let values = self.map.decode(&blocks);
        Ok(build_snapshot(timestamp, &values))
    }
}

fn build_snapshot(timestamp: chrono::DateTime<Utc>, values: &RegisterValues) -> CanonicalSnapshot {
    let t = RuntimeTelemetry::from_values(values);
    let battery_state = t.power_flow.map(|pf| pf.battery_state);

    let mut snap = CanonicalSnapshot::new(timestamp);

    snap.model = t.device_name.clone();
    snap.serial = t.serial_number.clone();
    snap.firmware = t.protocol_number.map(|p| p.to_string());

    snap.grid_voltage_v = t.mains_voltage_v;
    snap.grid_freq_hz = t.mains_freq_hz;
    snap.grid_input_power_w = resolve::grid_input_power(|name| values.get_f64(name));

    snap.ac_out_voltage_v = t.out_voltage_v;
    snap.ac_out_freq_hz = t.out_freq_hz;
    snap.out_active_power_w = t.out_active_power_w;
    snap.out_apparent_power_va = t.out_apparent_power_va;
    snap.load_percent = t.load_percent;

    snap.battery_voltage_v = t.bat_voltage_v;
    snap.battery_current_a = oriented(t.bat_current_a, battery_state);
    snap.battery_power_w = resolve::battery_power(
        oriented(t.bat_power_w, battery_state),
        snap.battery_voltage_v,
        snap.battery_current_a,
    );
    snap.battery_soc_percent = t.soc_percent;
    snap.inverter_temp_c = t.temp_inverter_c;

    snap.pv_voltage_v = t.pv_voltage_v;
    snap.pv_current_a = t.pv_current_a;
    snap.pv_power_w = resolve::pv_channel_power(t.pv_power_w, t.pv_voltage_v, t.pv_current_a);

    snap.operating_mode = t
        .work_mode
        .map(OperatingMode::from_work_mode)
        .unwrap_or_default();

    snap.raw.insert(
        "anern_runtime".to_owned(),
        serde_json::to_value(&t).unwrap_or_default(),
    );
    snap.raw.insert(
        "anern_registers".to_owned(),
        serde_json::to_value(values).unwrap_or_default(),
    );

    snap
}
