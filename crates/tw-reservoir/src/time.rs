//! Time units shared by window sizes, sample timestamps and snapshot queries.
//!
//! Reservoirs keep everything in nanoseconds internally. Converting a coarser
//! unit into nanoseconds is exact; values that do not fit saturate at the
//! `i64` bounds instead of wrapping.

use serde::{Deserialize, Serialize};

const NANOS_PER_MICRO: i64 = 1_000;
const NANOS_PER_MILLI: i64 = 1_000_000;
const NANOS_PER_SECOND: i64 = 1_000_000_000;
const NANOS_PER_MINUTE: i64 = 60 * NANOS_PER_SECOND;
const NANOS_PER_HOUR: i64 = 60 * NANOS_PER_MINUTE;

/// Unit for window sizes, timestamps and query instants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeUnit {
    /// Base unit of every reservoir.
    #[default]
    Nanoseconds,
    Microseconds,
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
}

impl TimeUnit {
    /// Number of nanoseconds in one unit.
    pub const fn nanos_per_unit(self) -> i64 {
        match self {
            TimeUnit::Nanoseconds => 1,
            TimeUnit::Microseconds => NANOS_PER_MICRO,
            TimeUnit::Milliseconds => NANOS_PER_MILLI,
            TimeUnit::Seconds => NANOS_PER_SECOND,
            TimeUnit::Minutes => NANOS_PER_MINUTE,
            TimeUnit::Hours => NANOS_PER_HOUR,
        }
    }

    /// Convert `value` expressed in `self` into nanoseconds.
    pub const fn to_nanos(self, value: i64) -> i64 {
        value.saturating_mul(self.nanos_per_unit())
    }

    /// Convert `value` expressed in `from` into `self`.
    ///
    /// Refining (e.g. seconds to milliseconds) is exact up to saturation.
    /// Coarsening truncates toward zero.
    pub const fn convert(self, value: i64, from: TimeUnit) -> i64 {
        let from_nanos = from.nanos_per_unit();
        let to_nanos = self.nanos_per_unit();
        if from_nanos >= to_nanos {
            value.saturating_mul(from_nanos / to_nanos)
        } else {
            value / (to_nanos / from_nanos)
        }
    }

    /// Short suffix used in logs and rendered labels.
    pub const fn suffix(self) -> &'static str {
        match self {
            TimeUnit::Nanoseconds => "ns",
            TimeUnit::Microseconds => "us",
            TimeUnit::Milliseconds => "ms",
            TimeUnit::Seconds => "s",
            TimeUnit::Minutes => "min",
            TimeUnit::Hours => "h",
        }
    }
}

impl std::fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.suffix())
    }
}

impl std::str::FromStr for TimeUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ns" | "nanos" | "nanoseconds" => Ok(TimeUnit::Nanoseconds),
            "us" | "micros" | "microseconds" => Ok(TimeUnit::Microseconds),
            "ms" | "millis" | "milliseconds" => Ok(TimeUnit::Milliseconds),
            "s" | "secs" | "seconds" => Ok(TimeUnit::Seconds),
            "min" | "mins" | "minutes" => Ok(TimeUnit::Minutes),
            "h" | "hours" => Ok(TimeUnit::Hours),
            _ => Err(format!("unknown time unit: {}", s)),
        }
    }
}
