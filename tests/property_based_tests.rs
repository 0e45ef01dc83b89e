//! Property-based tests for the aggregate and configuration invariants

use lockknock::{MonitorConfig, SampleAggregator};
use proptest::prelude::*;
use std::time::Duration;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_metric_in_unit_interval(
        cycles in prop::collection::vec((0u64..50_000, 0u64..50_000), 1..50),
    ) {
        let agg = SampleAggregator::new();
        for (locked_us, unlocked_us) in &cycles {
            agg.record(Duration::from_micros(*locked_us), Duration::from_micros(*unlocked_us));
        }

        let total: u64 = cycles.iter().map(|(l, u)| l + u).sum();
        match agg.contention_metric() {
            Some(metric) => prop_assert!((0.0..=1.0).contains(&metric)),
            None => prop_assert_eq!(total, 0),
        }
    }

    #[test]
    fn prop_counters_never_decrease(
        cycles in prop::collection::vec((0u64..10_000, 0u64..10_000), 1..100),
    ) {
        let agg = SampleAggregator::new();
        let mut last_locked = 0;
        let mut last_unlocked = 0;

        for (locked_us, unlocked_us) in cycles {
            agg.record(Duration::from_micros(locked_us), Duration::from_micros(unlocked_us));
            let state = agg.state();
            prop_assert!(state.locked_duration >= Duration::from_micros(last_locked));
            prop_assert!(state.unlocked_duration >= Duration::from_micros(last_unlocked));
            last_locked = state.locked_duration.as_micros() as u64;
            last_unlocked = state.unlocked_duration.as_micros() as u64;
        }
    }

    #[test]
    fn prop_metric_matches_ratio(locked_ms in 0u64..10_000, unlocked_ms in 1u64..10_000) {
        let agg = SampleAggregator::new();
        agg.record(Duration::from_millis(locked_ms), Duration::from_millis(unlocked_ms));

        let expected = locked_ms as f64 / (locked_ms + unlocked_ms) as f64;
        let metric = agg.contention_metric().unwrap();
        prop_assert!((metric - expected).abs() < 1e-9);
        prop_assert_eq!(agg.locked_ms(), Some(locked_ms));
        prop_assert_eq!(agg.unlocked_ms(), Some(unlocked_ms));
    }

    #[test]
    fn prop_reset_clears_any_history(
        cycles in prop::collection::vec((0u64..10_000, 0u64..10_000), 0..20),
    ) {
        let agg = SampleAggregator::new();
        for (locked_us, unlocked_us) in cycles {
            agg.record(Duration::from_micros(locked_us), Duration::from_micros(unlocked_us));
        }
        agg.reset();
        prop_assert_eq!(agg.contention_metric(), None);
        prop_assert_eq!(agg.locked_ms(), None);
        prop_assert_eq!(agg.unlocked_ms(), None);
        prop_assert_eq!(agg.samples(), 0);
    }

    #[test]
    fn prop_clipped_cycle_fits_window(
        locked_ms in 0u64..1_000,
        unlocked_ms in 0u64..1_000,
        window_ms in 0u64..2_000,
    ) {
        let agg = SampleAggregator::new();
        let started = agg.state().started_at;
        agg.record_at(
            Duration::from_millis(locked_ms),
            Duration::from_millis(unlocked_ms),
            started + Duration::from_millis(window_ms),
        );

        let state = agg.state();
        let recorded = state.locked_duration + state.unlocked_duration;
        prop_assert!(recorded <= Duration::from_millis(window_ms));
        prop_assert!(state.locked_duration <= Duration::from_millis(locked_ms));
        prop_assert!(state.unlocked_duration <= Duration::from_millis(unlocked_ms));
    }

    #[test]
    fn prop_config_validation(interval_us in 0u64..100_000, timeout_ms in proptest::option::of(0u64..200)) {
        let mut config = MonitorConfig::from_ticks(interval_us);
        if let Some(ms) = timeout_ms {
            config = config.with_probe_timeout(Duration::from_millis(ms));
        }

        let interval = Duration::from_micros(interval_us);
        let expected_ok = interval_us > 0
            && timeout_ms.map_or(true, |ms| Duration::from_millis(ms) > interval);
        prop_assert_eq!(config.validate().is_ok(), expected_ok);
    }

    #[test]
    fn prop_config_survives_toml(interval_us in 1u64..1_000_000, extra_us in 1u64..1_000_000) {
        let config = MonitorConfig::from_ticks(interval_us)
            .with_probe_timeout(Duration::from_micros(interval_us + extra_us));
        prop_assert!(config.validate().is_ok());

        let text = config.to_toml_string().unwrap();
        let parsed = MonitorConfig::from_toml_str(&text).unwrap();
        prop_assert_eq!(parsed, config);
    }

    #[test]
    fn prop_config_parser_never_panics(input in "\\PC{0,64}") {
        if let Ok(config) = MonitorConfig::from_toml_str(&input) {
            prop_assert!(config.validate().is_ok());
        }
    }
}
