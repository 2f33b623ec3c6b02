//! Property-based tests for the monitoring facade.

use proptest::prelude::*;
use tw_monitor::{Monitor, MonitorConfig};

const MS: i64 = 1_000_000;

/// `(gap to previous request in ms, duration in ms, status)` triples.
fn traffic() -> impl Strategy<Value = Vec<(i64, i64, u16)>> {
    prop::collection::vec((1i64..50, 0i64..2_000, 100u16..600), 1..300)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Longer windows never report fewer requests than shorter ones, and the
    /// hour window sees everything.
    #[test]
    fn window_counts_are_monotone(requests in traffic(), tail_ms in 0i64..20_000) {
        let monitor = Monitor::new(MonitorConfig::default(), 0).unwrap();
        let mut time = 0;
        for (gap, duration, status) in &requests {
            time += gap * MS;
            monitor.record_request(time, duration * MS, *status);
        }
        let stats = monitor.statistics(time + tail_ms * MS);
        let counts: Vec<u64> = stats.requests.windows.values().map(|s| s.count()).collect();
        prop_assert!(counts.windows(2).all(|pair| pair[0] <= pair[1]), "counts: {:?}", counts);
        prop_assert_eq!(*counts.last().unwrap(), requests.len() as u64);

        let hour = stats.requests.longest().unwrap();
        let max = requests.iter().map(|(_, d, _)| d * MS).max().unwrap();
        let min = requests.iter().map(|(_, d, _)| d * MS).min().unwrap();
        prop_assert_eq!(hour.max(), max);
        prop_assert_eq!(hour.min(), min);
    }

    /// The histogram accounts for every response exactly once.
    #[test]
    fn response_histogram_is_complete(requests in traffic()) {
        let monitor = Monitor::new(MonitorConfig::default(), 0).unwrap();
        for (i, (_, duration, status)) in requests.iter().enumerate() {
            monitor.record_request(i as i64 * MS, *duration, *status);
        }
        let codes = monitor.responses().snapshot();
        prop_assert_eq!(codes.total, requests.len() as u64);
        prop_assert_eq!(codes.counts.values().sum::<u64>(), requests.len() as u64);
        prop_assert_eq!(codes.last, requests.last().map(|(_, _, s)| *s));
        let errors = requests.iter().filter(|(_, _, s)| *s >= 500).count() as u64;
        prop_assert_eq!(codes.class_count(5), errors);
    }
}
