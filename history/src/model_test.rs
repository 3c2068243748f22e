use crate::model::{CommitWindow, Latency, LatencyUnit};
use crate::test_util::{commit, measurement, run, CORE, MEMORY};
use chrono::{DateTime, Utc};

fn utc(value: &str) -> DateTime<Utc> {
    value.parse().unwrap()
}

#[test]
fn latency_picks_readable_unit() {
    assert_eq!(Latency::from_secs_f64(5.0e-7).unit, LatencyUnit::Nsec);
    assert_eq!(Latency::from_secs_f64(4.0e-5).unit, LatencyUnit::Usec);
    assert_eq!(Latency::from_secs_f64(1.84e-3).unit, LatencyUnit::Msec);
    assert_eq!(Latency::from_secs_f64(2.5).unit, LatencyUnit::Sec);

    let latency = Latency::from_secs_f64(0.0018400684856455756);
    assert!((latency.value - 1.8400684856455756).abs() < 1e-12);
    assert!((latency.as_secs_f64() - 0.0018400684856455756).abs() < 1e-15);
}

#[test]
fn latency_unit_parses_its_own_rendering() {
    for unit in [
        LatencyUnit::Nsec,
        LatencyUnit::Usec,
        LatencyUnit::Msec,
        LatencyUnit::Sec,
    ] {
        assert_eq!(unit.as_str().parse::<LatencyUnit>(), Ok(unit));
    }

    assert!("minutes".parse::<LatencyUnit>().is_err());
    assert_eq!(
        Latency::new(40.5, LatencyUnit::Usec).to_string(),
        "40.5 usec"
    );
}

#[test]
fn duplicate_measurement_is_detected() {
    let unique = run("a", 1, vec![measurement(CORE, 1.0), measurement(MEMORY, 2.0)]);
    assert_eq!(unique.duplicate_measurement(), None);

    let repeated = run(
        "b",
        1,
        vec![
            measurement(CORE, 1.0),
            measurement(MEMORY, 2.0),
            measurement(CORE, 3.0),
        ],
    );
    assert_eq!(repeated.duplicate_measurement(), Some(CORE));
    assert_eq!(repeated.measurement(MEMORY).map(|m| m.value), Some(2.0));
}

#[test]
fn commit_window_is_half_open() {
    let window = CommitWindow::new(
        Some(utc("2025-02-26T00:00:00Z")),
        Some(utc("2025-02-27T00:00:00Z")),
    );

    assert!(window.contains(&commit("a", "2025-02-26T00:00:00Z").timestamp));
    assert!(window.contains(&commit("b", "2025-02-26T23:59:59Z").timestamp));
    assert!(!window.contains(&commit("c", "2025-02-27T00:00:00Z").timestamp));
    // 00:30 at +01:00 is still the 26th in UTC
    assert!(window.contains(&commit("d", "2025-02-27T00:30:00+01:00").timestamp));
    assert!(CommitWindow::default().contains(&commit("e", "1970-01-01T00:00:00Z").timestamp));
}

#[test]
fn invalid_statistic_names_the_first_bad_field() {
    let mut core = measurement(CORE, 1.0);
    assert_eq!(core.invalid_statistic(), None);

    core.stddev = f64::INFINITY;
    core.mean_latency = Latency::new(-1.0, LatencyUnit::Usec);
    assert_eq!(core.invalid_statistic(), Some(("stddev", f64::INFINITY)));

    core.stddev = 0.0;
    assert_eq!(core.invalid_statistic(), Some(("mean_latency", -1.0)));
}
