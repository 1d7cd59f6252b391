use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperatingMode {
    PowerOn,
    Standby,
    Line,
    Battery,
    Fault,
    #[default]
    Unknown,
}

impl OperatingMode {
    /// QMOD single-letter mode.
    pub fn from_qmod(code: &str) -> Self {
        match code.trim() {
            "P" => Self::PowerOn,
            "S" => Self::Standby,
            "L" => Self::Line,
            "B" => Self::Battery,
            "F" => Self::Fault,
            // D (shutdown approaching), H and anything else
            _ => Self::Unknown,
        }
    }

    /// Modbus work-mode register.
    pub fn from_work_mode(mode: u16) -> Self {
        match mode {
            0 => Self::Standby,
            1 => Self::Line,
            2 => Self::Battery,
            3 => Self::PowerOn,
            4 => Self::Fault,
            _ => Self::Unknown,
        }
    }
}

impl std::fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// One normalized poll result.
///
/// Units are fixed regardless of source: volts, amps, hertz, watts, VA,
/// percent and degrees Celsius. Battery current and power are positive while
/// charging and negative while discharging. `None` always means the device
/// did not report the quantity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CanonicalSnapshot {
    pub timestamp: DateTime<Utc>,

    pub model: Option<String>,
    pub serial: Option<String>,
    pub firmware: Option<String>,

    pub grid_voltage_v: Option<f64>,
    pub grid_freq_hz: Option<f64>,
    pub grid_input_power_w: Option<f64>,

    pub ac_out_voltage_v: Option<f64>,
    pub ac_out_freq_hz: Option<f64>,
    pub out_active_power_w: Option<f64>,
    pub out_apparent_power_va: Option<f64>,
    pub load_percent: Option<f64>,

    pub battery_voltage_v: Option<f64>,
    pub battery_current_a: Option<f64>,
    pub battery_power_w: Option<f64>,
    pub battery_soc_percent: Option<f64>,
    pub inverter_temp_c: Option<f64>,

    pub pv_voltage_v: Option<f64>,
    pub pv_current_a: Option<f64>,
    pub pv_power_w: Option<f64>,
    pub pv2_voltage_v: Option<f64>,
    pub pv2_current_a: Option<f64>,
    pub pv2_power_w: Option<f64>,

    pub operating_mode: OperatingMode,

    /// protocol specific payloads, keyed by source (`qpigs`, `anern_runtime`...)
    pub raw: BTreeMap<String, serde_json::Value>,
}

impl CanonicalSnapshot {
    /// An empty snapshot taken at `timestamp`; providers fill it in before
    /// handing it out.
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            model: None,
            serial: None,
            firmware: None,
            grid_voltage_v: None,
            grid_freq_hz: None,
            grid_input_power_w: None,
            ac_out_voltage_v: None,
            ac_out_freq_hz: None,
            out_active_power_w: None,
            out_apparent_power_va: None,
            load_percent: None,
            battery_voltage_v: None,
            battery_current_a: None,
            battery_power_w: None,
            battery_soc_percent: None,
            inverter_temp_c: None,
            pv_voltage_v: None,
            pv_current_a: None,
            pv_power_w: None,
            pv2_voltage_v: None,
            pv2_current_a: None,
            pv2_power_w: None,
            operating_mode: OperatingMode::Unknown,
            raw: BTreeMap::new(),
        }
    }

    /// Total PV power over both channels, absent only if neither reported.
    pub fn pv_total_power_w(&self) -> Option<f64> {
        match (self.pv_power_w, self.pv2_power_w) {
            (None, None) => None,
            (a, b) => Some(a.unwrap_or(0.0) + b.unwrap_or(0.0)),
        }
    }
}
