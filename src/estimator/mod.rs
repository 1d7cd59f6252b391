pub mod energy;
pub mod soc;
pub mod store;

pub use energy::{trapezoid_wh, EnergyState, PowerSample};
pub use soc::{SocConfig, SocSample, SocState};
pub use store::JsonFileStore;

use crate::error::Error;
use crate::resolve;
use crate::snapshot::CanonicalSnapshot;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Every running estimate kept for one device. Owned by that device's poll
/// and only advanced with a fully decoded snapshot.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceEstimators {
    #[serde(default)]
    pub pv: EnergyState,
    #[serde(default)]
    pub pv2: EnergyState,
    #[serde(default)]
    pub battery_in: EnergyState,
    #[serde(default)]
    pub battery_out: EnergyState,
    #[serde(default)]
    pub load_out: EnergyState,
    #[serde(default)]
    pub grid_in: EnergyState,
    #[serde(default)]
    pub soc: SocState,
}

/// Values published alongside a snapshot.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct EstimatorReadings {
    pub pv_wh: f64,
    pub pv2_wh: f64,
    pub battery_in_wh: f64,
    pub battery_out_wh: f64,
    pub load_out_wh: f64,
    pub grid_in_wh: f64,
    pub soc_percent: Option<f64>,
}

fn step(state: EnergyState, at: DateTime<Utc>, power: Option<f64>) -> EnergyState {
    match power {
        Some(p) => state.update(PowerSample::new(at, p.max(0.0))),
        None => state,
    }
}

impl DeviceEstimators {
    /// Feeds each energy channel its power from `snapshot`. A channel whose
    /// power is absent is left as it was.
    pub fn advance_energy(self, snapshot: &CanonicalSnapshot) -> Self {
        let at = snapshot.timestamp;
        let (charge, discharge) = resolve::split_battery_power(snapshot.battery_power_w);

        Self {
            pv: step(self.pv, at, snapshot.pv_power_w),
            pv2: step(self.pv2, at, snapshot.pv2_power_w),
            battery_in: step(self.battery_in, at, charge),
            battery_out: step(self.battery_out, at, discharge),
            load_out: step(self.load_out, at, snapshot.out_active_power_w),
            grid_in: step(self.grid_in, at, snapshot.grid_input_power_w),
            soc: self.soc,
        }
    }

    /// Advances the SOC estimate with the snapshot's signed battery power.
    pub fn advance_soc(self, snapshot: &CanonicalSnapshot, config: &SocConfig) -> Result<Self, Error> {
        let Some(power_w) = snapshot.battery_power_w else {
            return Ok(self);
        };

        let sample = SocSample {
            timestamp: snapshot.timestamp,
            power_w,
            voltage_v: snapshot.battery_voltage_v,
        };

        Ok(Self {
            soc: self.soc.update(config, &sample)?,
            ..self
        })
    }

    pub fn reset_soc(self, config: &SocConfig, percent: f64, now: DateTime<Utc>) -> Result<Self, Error> {
        Ok(Self {
            soc: SocState::seeded(config, percent, now)?,
            ..self
        })
    }

    pub fn readings(&self, config: Option<&SocConfig>) -> EstimatorReadings {
        EstimatorReadings {
            pv_wh: self.pv.accumulated_wh,
            pv2_wh: self.pv2.accumulated_wh,
            battery_in_wh: self.battery_in.accumulated_wh,
            battery_out_wh: self.battery_out.accumulated_wh,
            load_out_wh: self.load_out.accumulated_wh,
            grid_in_wh: self.grid_in.accumulated_wh,
            soc_percent: config.and_then(|c| self.soc.percent(c).ok()),
        }
    }
}
