//! Point-in-time statistical summaries.

use crate::time::TimeUnit;
use serde::{Deserialize, Serialize};

/// Running count/min/max/sum accumulator.
///
/// Used for raw timestamp slots, for aggregated chunks and for folding both
/// into a [`Snapshot`]. The sum is kept in `i128` so that summing many large
/// nanosecond latencies cannot overflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Stats {
    count: u64,
    min: i64,
    max: i64,
    sum: i128,
}

impl Stats {
    pub const fn new() -> Self {
        Self {
            count: 0,
            min: 0,
            max: 0,
            sum: 0,
        }
    }

    /// Add one value.
    pub fn record(&mut self, value: i64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.count += 1;
        self.sum += i128::from(value);
    }

    /// Fold another accumulator into this one.
    pub fn merge(&mut self, other: &Stats) {
        if other.count == 0 {
            return;
        }
        if self.count == 0 {
            *self = *other;
            return;
        }
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
        self.count += other.count;
        self.sum += other.sum;
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn min(&self) -> i64 {
        self.min
    }

    pub fn max(&self) -> i64 {
        self.max
    }

    pub fn sum(&self) -> i128 {
        self.sum
    }

    /// Freeze into an immutable snapshot covering `time_interval` nanoseconds.
    pub fn into_snapshot(self, time_interval: i64) -> Snapshot {
        if self.count == 0 {
            return Snapshot::empty(time_interval);
        }
        Snapshot {
            count: self.count,
            min: self.min,
            max: self.max,
            mean: self.sum as f64 / self.count as f64,
            time_interval,
        }
    }
}

impl FromIterator<i64> for Stats {
    fn from_iter<I: IntoIterator<Item = i64>>(iter: I) -> Self {
        let mut stats = Stats::new();
        for value in iter {
            stats.record(value);
        }
        stats
    }
}

/// Immutable count/min/max/mean summary over a trailing time window.
///
/// An empty snapshot reports `min = max = mean = 0`; check [`Snapshot::count`]
/// before trusting the other fields.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    count: u64,
    min: i64,
    max: i64,
    mean: f64,
    /// Nanoseconds covered by this snapshot, at most the reservoir window.
    time_interval: i64,
}

impl Snapshot {
    /// A snapshot with no contributions.
    pub const fn empty(time_interval: i64) -> Self {
        Self {
            count: 0,
            min: 0,
            max: 0,
            mean: 0.0,
            time_interval,
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn min(&self) -> i64 {
        self.min
    }

    pub fn max(&self) -> i64 {
        self.max
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Covered interval expressed in `unit` (truncated).
    pub fn time_interval(&self, unit: TimeUnit) -> i64 {
        unit.convert(self.time_interval, TimeUnit::Nanoseconds)
    }

    /// Covered interval in nanoseconds.
    pub fn time_interval_nanos(&self) -> i64 {
        self.time_interval
    }

    /// Contributions per `unit` over the covered interval.
    ///
    /// Returns 0.0 when the interval is empty.
    pub fn rate(&self, unit: TimeUnit) -> f64 {
        if self.time_interval <= 0 {
            return 0.0;
        }
        self.count as f64 * unit.nanos_per_unit() as f64 / self.time_interval as f64
    }
}
