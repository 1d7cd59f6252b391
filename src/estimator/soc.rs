use crate::error::Error;
use crate::estimator::energy::{trapezoid_wh, PowerSample};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Battery parameters; read fresh on every update since they can change at
/// runtime.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SocConfig {
    pub capacity_wh: f64,
    pub bulk_voltage: f64,
    pub float_voltage: f64,
}

impl SocConfig {
    pub fn validate(&self) -> Result<(), Error> {
        if !(self.capacity_wh.is_finite() && self.capacity_wh > 0.0) {
            return Err(Error::InvalidEstimatorConfig(format!(
                "battery capacity must be positive, got {}",
                self.capacity_wh
            )));
        }
        if !(self.bulk_voltage.is_finite() && self.float_voltage.is_finite()) {
            return Err(Error::InvalidEstimatorConfig(
                "charging voltages must be finite".to_owned(),
            ));
        }
        Ok(())
    }

    /// Device evidence of a completed charge: at bulk voltage, or holding
    /// float voltage while taking a small positive power.
    pub fn is_full(&self, voltage_v: f64, power_w: f64) -> bool {
        voltage_v >= self.bulk_voltage
            || (voltage_v >= self.float_voltage
                && power_w > 0.0
                && power_w <= 2.0 * self.bulk_voltage)
    }
}

/// Input to one SOC step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SocSample {
    pub timestamp: DateTime<Utc>,
    /// signed battery power, positive while charging
    pub power_w: f64,
    pub voltage_v: Option<f64>,
}

/// Coulomb-counting state.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SocState {
    pub accumulated_wh: f64,
    pub previous: Option<PowerSample>,
}

impl SocState {
    /// Explicit recalibration to `percent` of capacity at `now`.
    pub fn seeded(config: &SocConfig, percent: f64, now: DateTime<Utc>) -> Result<Self, Error> {
        config.validate()?;
        let percent = percent.clamp(0.0, 100.0);

        Ok(Self {
            accumulated_wh: config.capacity_wh * percent / 100.0,
            previous: Some(PowerSample::new(now, 0.0)),
        })
    }

    pub fn update(self, config: &SocConfig, sample: &SocSample) -> Result<Self, Error> {
        config.validate()?;

        let current = PowerSample::new(sample.timestamp, sample.power_w);
        let mut accumulated_wh = self.accumulated_wh
            + self
                .previous
                .as_ref()
                .and_then(|prev| trapezoid_wh(prev, &current))
                .unwrap_or(0.0);

        if let Some(voltage) = sample.voltage_v {
            if config.is_full(voltage, sample.power_w) {
                accumulated_wh = config.capacity_wh;
            }
        }

        Ok(Self {
            accumulated_wh: accumulated_wh.clamp(0.0, config.capacity_wh),
            previous: Some(current),
        })
    }

    pub fn percent(&self, config: &SocConfig) -> Result<f64, Error> {
        config.validate()?;
        Ok(self.accumulated_wh / config.capacity_wh * 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn config() -> SocConfig {
        SocConfig {
            capacity_wh: 1000.0,
            bulk_voltage: 56.4,
            float_voltage: 54.0,
        }
    }

    #[test]
    fn full_condition() {
        let c = config();
        assert!(c.is_full(56.4, -500.0));
        assert!(c.is_full(54.5, 100.0));
        assert!(c.is_full(54.5, 112.8));
        assert!(!c.is_full(54.5, 112.9));
        assert!(!c.is_full(54.5, 0.0));
        assert!(!c.is_full(53.0, 10.0));
    }

    #[test]
    fn seeded_clamps_percent() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let s = SocState::seeded(&config(), 150.0, now).unwrap();
        assert_eq!(s.accumulated_wh, 1000.0);
    }

    #[test]
    fn rejects_zero_capacity() {
        let c = SocConfig {
            capacity_wh: 0.0,
            ..config()
        };
        assert!(matches!(
            SocState::default().percent(&c),
            Err(Error::InvalidEstimatorConfig(_))
        ));
    }
}
