//! Execution time statistics over several trailing windows.
//!
//! One raw reservoir keeps exact samples for the raw window. Samples leaving
//! it feed a shared aggregating trimmer, and each longer reported window reads
//! its own aggregated reservoir on top of the two:
//!
//! ```text
//! add_execution ─→ raw (1s, exact) ──trim──→ trimmer (levels 0..N)
//!                   │                           │
//!                   ├── 1s  ←── raw directly    │
//!                   ├── 15s ←── aggregated ─────┤
//!                   └── 1h  ←── aggregated ─────┘
//! ```

use crate::config::MonitorConfig;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tracing::debug;
use tw_reservoir::{
    AggregatedReservoir, AggregatingTrimmer, SlidingWindowReservoir, Snapshot, TimeReservoir,
    TimeUnit,
};

const NS: TimeUnit = TimeUnit::Nanoseconds;
const NO_EXECUTION: i64 = i64::MIN;

/// Statistics of one reported window.
enum WindowSource {
    Raw,
    Aggregated(AggregatedReservoir),
}

/// Execution durations for one unit of work (all requests, one URI, ...).
pub struct ExecutionStatistics {
    raw: Arc<SlidingWindowReservoir>,
    trimmer: Arc<AggregatingTrimmer>,
    windows: Vec<(i64, WindowSource)>,
    last_start_time: AtomicI64,
}

impl ExecutionStatistics {
    /// Build the reservoirs described by `config`, observing from
    /// `start_time` (ns).
    pub fn new(config: &MonitorConfig, start_time: i64) -> Result<Self> {
        config.validate()?;
        let trimmer = Arc::new(AggregatingTrimmer::new(config.trimmer_config(start_time))?);
        let raw = Arc::new(SlidingWindowReservoir::with_trimmer(
            config.raw_config(start_time),
            trimmer.clone(),
        )?);

        let mut windows = Vec::new();
        for window in config.window_nanos() {
            let source = if window == raw.window() {
                WindowSource::Raw
            } else {
                WindowSource::Aggregated(AggregatedReservoir::new(
                    raw.clone(),
                    trimmer.clone(),
                    window,
                    NS,
                )?)
            };
            windows.push((window, source));
        }
        debug!(
            start_ns = start_time,
            raw_window_ns = raw.window(),
            windows = windows.len(),
            "execution statistics created"
        );
        Ok(Self {
            raw,
            trimmer,
            windows,
            last_start_time: AtomicI64::new(NO_EXECUTION),
        })
    }

    /// Record one execution that started at `start_time` and took `duration`
    /// (both ns).
    pub fn add_execution(&self, start_time: i64, duration: i64) {
        self.raw.update(duration, start_time, NS);
        self.last_start_time.store(start_time, Ordering::Release);
    }

    /// Start time of the most recently recorded execution.
    pub fn last_start_time(&self) -> Option<i64> {
        match self.last_start_time.load(Ordering::Acquire) {
            NO_EXECUTION => None,
            time => Some(time),
        }
    }

    /// Reported window lengths, ascending, in nanoseconds.
    pub fn windows(&self) -> impl Iterator<Item = i64> + '_ {
        self.windows.iter().map(|(window, _)| *window)
    }

    /// Snapshot of one reported window at `now` (ns).
    pub fn window_snapshot(&self, window: i64, now: i64) -> Option<Snapshot> {
        self.windows
            .iter()
            .find(|(length, _)| *length == window)
            .map(|(_, source)| self.read(source, now))
    }

    fn read(&self, source: &WindowSource, now: i64) -> Snapshot {
        match source {
            WindowSource::Raw => self.raw.snapshot(now, NS),
            WindowSource::Aggregated(reservoir) => reservoir.snapshot(now, NS),
        }
    }

    /// Snapshot of every reported window at `now` (ns).
    pub fn snapshot(&self, now: i64) -> ExecutionSnapshot {
        let windows = self
            .windows
            .iter()
            .map(|(window, source)| (*window, self.read(source, now)))
            .collect();
        ExecutionSnapshot {
            last_start_time: self.last_start_time(),
            windows,
        }
    }

    /// Samples dropped because their timestamp's collision buffer was full.
    pub fn dropped(&self) -> u64 {
        self.raw.dropped()
    }

    /// Live chunks across all trimmer levels.
    pub fn chunk_count(&self) -> usize {
        (0..self.trimmer.levels())
            .map(|level| self.trimmer.chunk_count(level))
            .sum()
    }
}

impl std::fmt::Debug for ExecutionStatistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionStatistics")
            .field("raw_window", &self.raw.window())
            .field("windows", &self.windows().collect::<Vec<_>>())
            .field("last_start_time", &self.last_start_time())
            .finish_non_exhaustive()
    }
}

/// Immutable execution statistics, keyed by window length in nanoseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSnapshot {
    pub last_start_time: Option<i64>,
    pub windows: BTreeMap<i64, Snapshot>,
}

impl ExecutionSnapshot {
    pub fn window(&self, window: i64, unit: TimeUnit) -> Option<&Snapshot> {
        self.windows.get(&unit.to_nanos(window))
    }

    /// The longest reported window.
    pub fn longest(&self) -> Option<&Snapshot> {
        self.windows.values().next_back()
    }
}
