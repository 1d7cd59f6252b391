use crate::error::Error;
use crate::modbus::packet::ReadHolding;
use crate::modbus::register_map::RegisterValues;

use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatteryState {
    Idle,
    Charging,
    Discharging,
    Unknown,
}

/// Decoded power-flow status word.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct PowerFlow {
    pub raw: u16,
    pub pv_connected: bool,
    pub mains_connected: bool,
    pub battery_state: BatteryState,
    pub load_on: bool,
    pub mains_charging: bool,
    pub pv_charging: bool,
}

impl PowerFlow {
    pub fn from_raw(raw: u16) -> Self {
        let pair = |shift: u16| (raw >> shift) & 0b11;
        let battery_state = match pair(4) {
            0 => BatteryState::Idle,
            1 => BatteryState::Charging,
            2 => BatteryState::Discharging,
            _ => BatteryState::Unknown,
        };

        Self {
            raw,
            pv_connected: pair(0) == 0b01,
            mains_connected: pair(2) == 0b01,
            battery_state,
            load_on: pair(6) == 0b01,
            mains_charging: (raw >> 8) & 1 == 1,
            pv_charging: (raw >> 9) & 1 == 1,
        }
    }
}

/// A named read span worth polling.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReadBlock {
    pub name: &'static str,
    pub register: u16,
    pub count: u16,
}

impl ReadBlock {
    pub fn request(&self, slave_id: u8) -> Result<ReadHolding, Error> {
        ReadHolding::new(slave_id, self.register, self.count)
    }
}

pub const RUNTIME_BLOCK: ReadBlock = ReadBlock {
    name: "runtime_171_237",
    register: 171,
    count: 67,
};

pub const FAULTS_BLOCK: ReadBlock = ReadBlock {
    name: "faults_warnings_100_109",
    register: 100,
    count: 10,
};

pub const RECOMMENDED_BLOCKS: [ReadBlock; 7] = [
    RUNTIME_BLOCK,
    FAULTS_BLOCK,
    ReadBlock {
        name: "settings_300_339",
        register: 300,
        count: 40,
    },
    ReadBlock {
        name: "soc_currents_341_351",
        register: 341,
        count: 11,
    },
    ReadBlock {
        name: "remote_406_426",
        register: 406,
        count: 21,
    },
    ReadBlock {
        name: "version_626_644",
        register: 626,
        count: 19,
    },
    ReadBlock {
        name: "faultlog_700_729",
        register: 700,
        count: 30,
    },
];

/// Request frames for every recommended block, by block name.
pub fn recommended_read_frames(slave_id: u8) -> Result<Vec<(&'static str, ReadHolding)>, Error> {
    RECOMMENDED_BLOCKS
        .iter()
        .map(|b| Ok((b.name, b.request(slave_id)?)))
        .collect()
}

/// Typed runtime view. `None` means the register was not in the read span.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RuntimeTelemetry {
    pub device_type: Option<u16>,
    pub device_name: Option<String>,
    pub protocol_number: Option<u16>,
    pub serial_number: Option<String>,

    pub work_mode: Option<u16>,
    pub power_flow: Option<PowerFlow>,
    pub fault_code: Option<u32>,
    pub warning_code: Option<u32>,

    pub mains_voltage_v: Option<f64>,
    pub mains_freq_hz: Option<f64>,
    pub mains_power_w: Option<f64>,

    pub inv_voltage_v: Option<f64>,
    pub inv_current_a: Option<f64>,
    pub inv_freq_hz: Option<f64>,
    pub inv_power_w: Option<f64>,
    pub inv_charge_power_w: Option<f64>,
    pub inv_charge_current_a: Option<f64>,

    pub out_voltage_v: Option<f64>,
    pub out_current_a: Option<f64>,
    pub out_freq_hz: Option<f64>,
    pub out_active_power_w: Option<f64>,
    pub out_apparent_power_va: Option<f64>,
    pub load_percent: Option<f64>,

    pub bat_voltage_v: Option<f64>,
    pub bat_current_a: Option<f64>,
    pub bat_power_w: Option<f64>,
    pub soc_percent: Option<f64>,

    pub pv_voltage_v: Option<f64>,
    pub pv_current_a: Option<f64>,
    pub pv_power_w: Option<f64>,
    pub pv_charge_power_w: Option<f64>,
    pub pv_charge_current_a: Option<f64>,

    pub temp_dcdc_c: Option<f64>,
    pub temp_inverter_c: Option<f64>,
}

impl RuntimeTelemetry {
    pub fn from_values(v: &RegisterValues) -> Self {
        let u16_of = |name: &str| v.get_i64(name).and_then(|i| u16::try_from(i).ok());
        let u32_of = |name: &str| v.get_i64(name).and_then(|i| u32::try_from(i).ok());
        let text_of = |name: &str| v.get_text(name).map(str::to_owned);
        let f = |name: &str| v.get_f64(name);

        Self {
            device_type: u16_of("device_type"),
            device_name: text_of("device_name"),
            protocol_number: u16_of("protocol_number"),
            serial_number: text_of("serial_number"),

            work_mode: u16_of("work_mode"),
            power_flow: u16_of("power_flow_flags").map(PowerFlow::from_raw),
            fault_code: u32_of("fault_code"),
            warning_code: u32_of("warning_code"),

            mains_voltage_v: f("mains_voltage_v"),
            mains_freq_hz: f("mains_freq_hz"),
            mains_power_w: f("mains_power_w"),

            inv_voltage_v: f("inv_voltage_v"),
            inv_current_a: f("inv_current_a"),
            inv_freq_hz: f("inv_freq_hz"),
            inv_power_w: f("inv_power_w"),
            inv_charge_power_w: f("inv_charge_power_w"),
            inv_charge_current_a: f("inv_charge_current_a"),

            out_voltage_v: f("out_voltage_v"),
            out_current_a: f("out_current_a"),
            out_freq_hz: f("out_freq_hz"),
            out_active_power_w: f("out_active_power_w"),
            out_apparent_power_va: f("out_apparent_power_va"),
            load_percent: f("load_percent"),

            bat_voltage_v: f("bat_voltage_v"),
            bat_current_a: f("bat_current_a"),
            bat_power_w: f("bat_power_w"),
            soc_percent: f("soc_percent"),

            pv_voltage_v: f("pv_voltage_v"),
            pv_current_a: f("pv_current_a"),
            pv_power_w: f("pv_power_w"),
            pv_charge_power_w: f("pv_charge_power_w"),
            pv_charge_current_a: f("pv_charge_current_a"),

            temp_dcdc_c: f("temp_dcdc_c"),
            temp_inverter_c: f("temp_inverter_c"),
        }
    }
}
