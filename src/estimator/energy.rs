use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A power reading at an instant.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PowerSample {
    pub timestamp: DateTime<Utc>,
    pub power_w: f64,
}

impl PowerSample {
    pub fn new(timestamp: DateTime<Utc>, power_w: f64) -> Self {
        Self { timestamp, power_w }
    }
}

/// Watt-hours between two samples by the trapezoid rule. `None` when the
/// clock did not move forward.
pub fn trapezoid_wh(previous: &PowerSample, current: &PowerSample) -> Option<f64> {
    let elapsed = current.timestamp - previous.timestamp;
    let millis = elapsed.num_milliseconds();
    if millis <= 0 {
        return None;
    }

    let hours = millis as f64 / 3_600_000.0;
    Some((previous.power_w + current.power_w) / 2.0 * hours)
}

/// Running total of one energy channel.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EnergyState {
    pub accumulated_wh: f64,
    pub previous: Option<PowerSample>,
}

impl EnergyState {
    pub fn restored(accumulated_wh: f64) -> Self {
        Self {
            accumulated_wh,
            previous: None,
        }
    }

    /// Integrates `sample` against the previous one. The first sample only
    /// records; a sample that does not advance the clock replaces the
    /// previous one without accumulating.
    pub fn update(self, sample: PowerSample) -> Self {
        let added = self
            .previous
            .as_ref()
            .and_then(|prev| trapezoid_wh(prev, &sample))
            .unwrap_or(0.0);

        Self {
            accumulated_wh: self.accumulated_wh + added,
            previous: Some(sample),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn backwards_clock_accumulates_nothing() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let s = EnergyState::default()
            .update(PowerSample::new(t0, 100.0))
            .update(PowerSample::new(t0 - Duration::minutes(5), 100.0));
        assert_eq!(s.accumulated_wh, 0.0);
        assert_eq!(s.previous.unwrap().timestamp, t0 - Duration::minutes(5));
    }
}
