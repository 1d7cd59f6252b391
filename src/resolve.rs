//! Reconciles redundant or partial raw readings into single canonical values.
//!
//! Absence and zero are kept apart throughout; nothing here turns a missing
//! reading into 0 unless the function says so.

/// Raw field names that may carry grid input power, most specific first.
pub const GRID_INPUT_POWER_CANDIDATES: [&str; 4] = [
    "grid_active_power",
    "grid_input_power",
    "ac_input_power",
    "mains_power_w",
];

/// First present value, in order.
pub fn first_present<I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = Option<f64>>,
{
    values.into_iter().flatten().next()
}

/// Signed battery current from separate unsigned charge and discharge
/// readings, positive while charging.
///
/// Both absent, or both reported as zero, is absent. One missing side counts
/// as zero. When both sides are nonzero the difference is returned as a best
/// effort.
pub fn signed_battery_current(charge: Option<f64>, discharge: Option<f64>) -> Option<f64> {
    if charge.is_none() && discharge.is_none() {
        return None;
    }

    let c = charge.unwrap_or(0.0);
    let d = discharge.unwrap_or(0.0);

    if c == 0.0 && d == 0.0 {
        None
    } else if c > 0.0 && d == 0.0 {
        Some(c)
    } else if d > 0.0 && c == 0.0 {
        Some(-d)
    } else {
        Some(c - d)
    }
}

/// Grid input power from the first candidate `lookup` finds.
pub fn grid_input_power<F>(lookup: F) -> Option<f64>
where
    F: Fn(&str) -> Option<f64>,
{
    first_present(GRID_INPUT_POWER_CANDIDATES.iter().map(|name| lookup(name)))
}

/// Channel power: reported value, else voltage times current.
pub fn pv_channel_power(
    power: Option<f64>,
    voltage: Option<f64>,
    current: Option<f64>,
) -> Option<f64> {
    power.or_else(|| Some(voltage? * current?))
}

/// Signed battery power: reported value, else voltage times signed current.
pub fn battery_power(
    power: Option<f64>,
    voltage: Option<f64>,
    signed_current: Option<f64>,
) -> Option<f64> {
    power.or_else(|| Some(voltage? * signed_current?))
}

/// Splits signed battery power into non-negative `(charge, discharge)`.
pub fn split_battery_power(power: Option<f64>) -> (Option<f64>, Option<f64>) {
    match power {
        None => (None, None),
        Some(p) if p >= 0.0 => (Some(p), Some(0.0)),
        Some(p) => (Some(0.0), Some(-p)),
    }
}
