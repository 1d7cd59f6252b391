use chrono::{DateTime, Duration, TimeZone, Utc};
use dess_bridge::estimator::*;
use dess_bridge::prelude::*;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

#[test]
fn first_sample_only_records() {
    let s = EnergyState::default().update(PowerSample::new(t0(), 500.0));
    assert_eq!(s.accumulated_wh, 0.0);
    assert_eq!(s.previous, Some(PowerSample::new(t0(), 500.0)));
}

#[test]
fn constant_power_for_an_hour() {
    let s = EnergyState::default()
        .update(PowerSample::new(t0(), 100.0))
        .update(PowerSample::new(t0() + Duration::hours(1), 100.0));
    assert!(approx(s.accumulated_wh, 100.0));
}

#[test]
fn ramp_is_a_trapezoid() {
    let s = EnergyState::default()
        .update(PowerSample::new(t0(), 0.0))
        .update(PowerSample::new(t0() + Duration::hours(1), 200.0));
    assert!(approx(s.accumulated_wh, 100.0));
}

#[test]
fn irregular_intervals_add_up() {
    let s = EnergyState::restored(10.0)
        .update(PowerSample::new(t0(), 60.0))
        .update(PowerSample::new(t0() + Duration::minutes(30), 60.0))
        .update(PowerSample::new(t0() + Duration::minutes(40), 120.0));
    // 10 + 30 + (60+120)/2 * 1/6
    assert!(approx(s.accumulated_wh, 55.0));
}

fn battery() -> SocConfig {
    SocConfig {
        capacity_wh: 100.0,
        bulk_voltage: 56.4,
        float_voltage: 54.0,
    }
}

#[test]
fn soc_snaps_to_full_at_bulk_voltage() {
    let c = battery();
    let s = SocState {
        accumulated_wh: 50.0,
        previous: Some(PowerSample::new(t0(), 10.0)),
    };
    let s = s
        .update(
            &c,
            &SocSample {
                timestamp: t0() + Duration::minutes(1),
                power_w: 10.0,
                voltage_v: Some(57.0),
            },
        )
        .unwrap();
    assert_eq!(s.accumulated_wh, 100.0);
    assert_eq!(s.percent(&c).unwrap(), 100.0);
}

#[test]
fn soc_snaps_at_float_with_small_charge() {
    let c = battery();
    let s = SocState {
        accumulated_wh: 70.0,
        previous: None,
    };
    let sample = |power_w| SocSample {
        timestamp: t0(),
        power_w,
        voltage_v: Some(54.2),
    };

    assert_eq!(s.clone().update(&c, &sample(30.0)).unwrap().accumulated_wh, 100.0);
    // above 2 x bulk the battery is still charging hard
    assert_eq!(s.clone().update(&c, &sample(200.0)).unwrap().accumulated_wh, 70.0);
    // discharging at float voltage is no evidence of full
    assert_eq!(s.update(&c, &sample(-5.0)).unwrap().accumulated_wh, 70.0);
}

#[test]
fn soc_integrates_and_clamps() {
    let c = battery();
    let step = |s: SocState, minutes: i64, power_w: f64| {
        s.update(
            &c,
            &SocSample {
                timestamp: t0() + Duration::minutes(minutes),
                power_w,
                voltage_v: Some(50.0),
            },
        )
        .unwrap()
    };

    let s = SocState::seeded(&c, 50.0, t0()).unwrap();
    assert_eq!(s.accumulated_wh, 50.0);

    // seeded previous power is 0: (0 + -60)/2 over 30 minutes
    let s = step(s, 30, -60.0);
    assert!(approx(s.accumulated_wh, 35.0));
    assert!(approx(s.percent(&c).unwrap(), 35.0));

    // draining far past empty clamps at zero
    let s = step(s, 300, -600.0);
    assert_eq!(s.accumulated_wh, 0.0);
}

#[test]
fn capacity_change_is_picked_up() {
    let s = SocState {
        accumulated_wh: 50.0,
        previous: None,
    };
    assert_eq!(s.percent(&battery()).unwrap(), 50.0);
    let bigger = SocConfig {
        capacity_wh: 200.0,
        ..battery()
    };
    assert_eq!(s.percent(&bigger).unwrap(), 25.0);
}

#[test]
fn non_positive_capacity_is_fatal() {
    let bad = SocConfig {
        capacity_wh: -1.0,
        ..battery()
    };
    let sample = SocSample {
        timestamp: t0(),
        power_w: 0.0,
        voltage_v: None,
    };
    assert!(matches!(
        SocState::default().update(&bad, &sample),
        Err(Error::InvalidEstimatorConfig(_))
    ));
    assert!(SocState::seeded(&bad, 50.0, t0()).is_err());
}

#[test]
fn device_bundle_splits_battery_power() {
    let mut first = CanonicalSnapshot::new(t0());
    first.battery_power_w = Some(200.0);
    first.pv_power_w = Some(300.0);
    let mut second = CanonicalSnapshot::new(t0() + Duration::hours(1));
    second.battery_power_w = Some(-100.0);
    second.pv_power_w = Some(300.0);

    let e = DeviceEstimators::default()
        .advance_energy(&first)
        .advance_energy(&second);

    assert!(approx(e.pv.accumulated_wh, 300.0));
    // charge 200 -> 0, discharge 0 -> 100
    assert!(approx(e.battery_in.accumulated_wh, 100.0));
    assert!(approx(e.battery_out.accumulated_wh, 50.0));
    // never reported
    assert_eq!(e.grid_in, EnergyState::default());
}

#[test]
fn device_bundle_soc_needs_battery_power() {
    let c = battery();
    let snap = CanonicalSnapshot::new(t0());
    let e = DeviceEstimators::default().advance_soc(&snap, &c).unwrap();
    assert_eq!(e.soc, SocState::default());

    let e = e.reset_soc(&c, 40.0, t0()).unwrap();
    assert_eq!(e.readings(Some(&c)).soc_percent, Some(40.0));
    assert_eq!(e.readings(None).soc_percent, None);
}
