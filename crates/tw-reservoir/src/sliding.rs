//! Exact sliding-window reservoir.
//!
//! Samples are kept per timestamp in an ordered map. Each timestamp owns a
//! bounded collision buffer so that bursts of simultaneous updates stay cheap,
//! and a running [`Stats`] so that a snapshot costs one fold per distinct live
//! timestamp rather than one per recorded value.
//!
//! # Window semantics
//!
//! A sample recorded at `t` is part of every snapshot taken at
//! `t <= t' <= t + window` and is trimmed as soon as any call observes
//! `t' > t + window`. Samples newer than `t'` stay stored but are not counted.
//!
//! ```text
//! window = 10ns, sample at now
//!   snapshot(now - 1)  → not yet counted
//!   snapshot(now + 10) → included
//!   snapshot(now + 11) → trimmed (handed to the trimmer, if any)
//! ```
//!
//! Trimming is lazy. It happens at the start of every `update` and `snapshot`
//! and only ever moves forward: once a query at `t'` has trimmed everything
//! older than `t' - window`, a later query for an earlier instant does not
//! resurrect it, and late updates behind that horizon bypass raw storage.

use crate::error::{ReservoirError, Result};
use crate::reservoir::TimeReservoir;
use crate::snapshot::{Snapshot, Stats};
use crate::time::TimeUnit;
use crate::trimmer::Trimmer;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, trace};

/// Default capacity of the per-timestamp collision buffer.
pub const DEFAULT_COLLISION_BUFFER: usize = 256;

/// Construction parameters for a [`SlidingWindowReservoir`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlidingWindowConfig {
    /// Window length, in `unit`.
    pub window: i64,
    /// Instant the reservoir starts observing, in `unit`.
    pub start_time: i64,
    /// Unit of `window` and `start_time`.
    pub unit: TimeUnit,
    /// Maximum values kept for one exact timestamp.
    pub collision_buffer: usize,
}

impl SlidingWindowConfig {
    pub fn new(window: i64, start_time: i64, unit: TimeUnit) -> Self {
        Self {
            window,
            start_time,
            unit,
            collision_buffer: DEFAULT_COLLISION_BUFFER,
        }
    }

    /// Override the collision buffer capacity.
    pub fn with_collision_buffer(mut self, capacity: usize) -> Self {
        self.collision_buffer = capacity;
        self
    }

    /// Reject configurations the reservoir cannot honor.
    pub fn validate(&self) -> Result<()> {
        if self.window <= 0 {
            return Err(ReservoirError::InvalidWindow {
                window: self.window,
            });
        }
        if self.collision_buffer == 0 {
            return Err(ReservoirError::InvalidCollisionBuffer {
                capacity: self.collision_buffer,
            });
        }
        Ok(())
    }
}

/// Values recorded at one exact timestamp.
#[derive(Debug, Default)]
struct Slot {
    values: Vec<i64>,
    stats: Stats,
}

impl Slot {
    fn push(&mut self, value: i64) {
        self.values.push(value);
        self.stats.record(value);
    }
}

#[derive(Debug)]
struct WindowState {
    slots: BTreeMap<i64, Slot>,
    /// Every timestamp strictly below this has been trimmed.
    horizon: i64,
    /// Earlier of the start time and the oldest timestamp ever recorded.
    origin: i64,
    dropped: u64,
}

/// Raw retained statistics handed to callers of
/// [`SlidingWindowReservoir::with_trimmed`].
#[derive(Debug, Clone, Copy)]
pub(crate) struct WindowView {
    pub stats: Stats,
    pub origin: i64,
}

/// Nanoseconds between `origin` and the query instant, clamped to
/// `[0, window]`.
pub(crate) fn covered_interval(origin: i64, time: i64, window: i64) -> i64 {
    time.saturating_sub(origin).clamp(0, window)
}

/// Exact per-sample reservoir over a short trailing window.
pub struct SlidingWindowReservoir {
    window: i64,
    collision_buffer: usize,
    trimmer: Option<Arc<dyn Trimmer>>,
    state: Mutex<WindowState>,
}

impl SlidingWindowReservoir {
    /// Create a reservoir that discards expired samples.
    pub fn new(config: SlidingWindowConfig) -> Result<Self> {
        Self::build(config, None)
    }

    /// Create a reservoir that hands expired samples to `trimmer`.
    pub fn with_trimmer(config: SlidingWindowConfig, trimmer: Arc<dyn Trimmer>) -> Result<Self> {
        Self::build(config, Some(trimmer))
    }

    fn build(config: SlidingWindowConfig, trimmer: Option<Arc<dyn Trimmer>>) -> Result<Self> {
        config.validate()?;
        let window = config.unit.to_nanos(config.window);
        let start = config.unit.to_nanos(config.start_time);
        debug!(
            window_ns = window,
            start_ns = start,
            collision_buffer = config.collision_buffer,
            has_trimmer = trimmer.is_some(),
            "sliding window reservoir created"
        );
        Ok(Self {
            window,
            collision_buffer: config.collision_buffer,
            trimmer,
            state: Mutex::new(WindowState {
                slots: BTreeMap::new(),
                horizon: i64::MIN,
                origin: start,
                dropped: 0,
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, WindowState> {
        // Every mutation leaves the state consistent, so a panic elsewhere
        // does not invalidate it.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Evict every slot older than `time - window`, oldest first.
    fn trim(&self, state: &mut WindowState, time: i64) {
        let cutoff = time.saturating_sub(self.window);
        if cutoff <= state.horizon {
            return;
        }
        if let Some(trimmer) = &self.trimmer {
            for (timestamp, slot) in state.slots.range(..cutoff) {
                trimmer.on_trim(*timestamp, &slot.values);
            }
        }
        let retained = state.slots.split_off(&cutoff);
        let expired = std::mem::replace(&mut state.slots, retained);
        state.horizon = cutoff;
        if !expired.is_empty() {
            trace!(
                cutoff_ns = cutoff,
                expired_timestamps = expired.len(),
                live_timestamps = state.slots.len(),
                "trimmed sliding window"
            );
        }
    }

    fn record(&self, value: i64, time: i64) {
        let mut guard = self.lock();
        let state = &mut *guard;
        self.trim(state, time);

        state.origin = state.origin.min(time);

        if time < state.horizon {
            match &self.trimmer {
                Some(trimmer) => trimmer.on_trim(time, &[value]),
                None => trace!(time_ns = time, horizon_ns = state.horizon, "late sample discarded"),
            }
            return;
        }

        let slot = state.slots.entry(time).or_default();
        if slot.values.len() >= self.collision_buffer {
            state.dropped += 1;
            trace!(
                time_ns = time,
                capacity = self.collision_buffer,
                "collision buffer full, sample dropped"
            );
            return;
        }
        slot.push(value);
    }

    /// Trim at `time` (nanoseconds) and run `f` over the retained samples
    /// recorded at or before `time` while the lock is still held.
    ///
    /// Anything `f` reads that is fed by this reservoir's trimmer is therefore
    /// consistent with the view: no trim can run concurrently.
    pub(crate) fn with_trimmed<R>(&self, time: i64, f: impl FnOnce(&WindowView) -> R) -> R {
        let mut guard = self.lock();
        let state = &mut *guard;
        self.trim(state, time);
        let mut stats = Stats::new();
        for slot in state.slots.range(..=time).map(|(_, slot)| slot) {
            stats.merge(&slot.stats);
        }
        let view = WindowView {
            stats,
            origin: state.origin,
        };
        f(&view)
    }

    /// Whether expired samples are handed to `trimmer`.
    pub(crate) fn feeds<T: Trimmer>(&self, trimmer: &T) -> bool {
        self.trimmer.as_ref().is_some_and(|own| {
            Arc::as_ptr(own) as *const () == trimmer as *const T as *const ()
        })
    }

    /// Number of distinct live timestamps.
    pub fn len(&self) -> usize {
        self.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().slots.is_empty()
    }

    /// Updates rejected because their timestamp's collision buffer was full.
    pub fn dropped(&self) -> u64 {
        self.lock().dropped
    }

    /// Capacity of each per-timestamp collision buffer.
    pub fn collision_buffer(&self) -> usize {
        self.collision_buffer
    }
}

impl TimeReservoir for SlidingWindowReservoir {
    fn update(&self, value: i64, time: i64, unit: TimeUnit) {
        self.record(value, unit.to_nanos(time));
    }

    fn snapshot(&self, time: i64, unit: TimeUnit) -> Snapshot {
        let time = unit.to_nanos(time);
        self.with_trimmed(time, |view| {
            let interval = covered_interval(view.origin, time, self.window);
            view.stats.into_snapshot(interval)
        })
    }

    fn window(&self) -> i64 {
        self.window
    }
}

impl std::fmt::Debug for SlidingWindowReservoir {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlidingWindowReservoir")
            .field("window", &self.window)
            .field("collision_buffer", &self.collision_buffer)
            .field("has_trimmer", &self.trimmer.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    const NS: TimeUnit = TimeUnit::Nanoseconds;

    fn reservoir(now: i64) -> SlidingWindowReservoir {
        SlidingWindowReservoir::new(SlidingWindowConfig::new(10, now, NS)).unwrap()
    }

    fn check(
        reservoir: &SlidingWindowReservoir,
        time: i64,
        count: u64,
        min: i64,
        max: i64,
        mean: f64,
    ) -> Snapshot {
        let snapshot = reservoir.snapshot(time, NS);
        assert_eq!(snapshot.count(), count, "count at {}", time);
        assert_eq!(snapshot.min(), min, "min at {}", time);
        assert_eq!(snapshot.max(), max, "max at {}", time);
        assert_eq!(snapshot.mean(), mean, "mean at {}", time);
        snapshot
    }

    #[derive(Default)]
    struct RecordingTrimmer {
        trimmed: StdMutex<Vec<(i64, Vec<i64>)>>,
    }

    impl Trimmer for RecordingTrimmer {
        fn on_trim(&self, timestamp: i64, values: &[i64]) {
            self.trimmed
                .lock()
                .unwrap()
                .push((timestamp, values.to_vec()));
        }
    }

    #[test]
    fn rejects_bad_config() {
        let err = SlidingWindowReservoir::new(SlidingWindowConfig::new(0, 0, NS)).unwrap_err();
        assert_eq!(err, ReservoirError::InvalidWindow { window: 0 });

        let err = SlidingWindowReservoir::new(
            SlidingWindowConfig::new(10, 0, NS).with_collision_buffer(0),
        )
        .unwrap_err();
        assert_eq!(err, ReservoirError::InvalidCollisionBuffer { capacity: 0 });
    }

    #[test]
    fn empty_reservoir_reports_zero() {
        let r = reservoir(100);
        let snapshot = check(&r, 100, 0, 0, 0, 0.0);
        assert_eq!(snapshot.time_interval_nanos(), 0);
        // Before construction.
        check(&r, 50, 0, 0, 0, 0.0);
    }

    #[test]
    fn simultaneous_requests_and_eviction() {
        for now in [0, 1_000_000_007] {
            let r = reservoir(now);
            for value in [10, 20, 30, 40] {
                r.update(value, now, NS);
            }
            r.update(50, now + 1, NS);
            r.update(60, now + 5, NS);
            r.update(70, now + 5, NS);
            let snapshot = check(&r, now + 5, 7, 10, 70, 40.0);
            assert_eq!(snapshot.time_interval_nanos(), 5);

            r.update(80, now + 10, NS);
            r.update(90, now + 10, NS);
            check(&r, now + 10, 9, 10, 90, 50.0);

            // Everything recorded at `now` is gone one tick past the window.
            check(&r, now + 11, 5, 50, 90, 70.0);
            check(&r, now + 12, 4, 60, 90, 75.0);
        }
    }

    #[test]
    fn updates_older_than_start_time() {
        let now = 1_000;
        let r = reservoir(now);
        r.update(10, now - 5, NS);
        r.update(20, now - 4, NS);
        assert_eq!(check(&r, now, 2, 10, 20, 15.0).time_interval_nanos(), 5);

        r.update(30, now, NS);
        assert_eq!(check(&r, now, 3, 10, 30, 20.0).time_interval_nanos(), 5);

        r.update(40, now + 1, NS);
        assert_eq!(check(&r, now + 1, 4, 10, 40, 25.0).time_interval_nanos(), 6);
        assert_eq!(check(&r, now + 5, 4, 10, 40, 25.0).time_interval_nanos(), 10);
        check(&r, now + 6, 3, 20, 40, 30.0);
        check(&r, now + 7, 2, 30, 40, 35.0);
        check(&r, now + 10, 2, 30, 40, 35.0);
        check(&r, now + 11, 1, 40, 40, 40.0);
        assert_eq!(check(&r, now + 12, 0, 0, 0, 0.0).time_interval_nanos(), 10);
    }

    #[test]
    fn collision_buffer_overflow_is_dropped() {
        let r = SlidingWindowReservoir::new(
            SlidingWindowConfig::new(10, 0, NS).with_collision_buffer(4),
        )
        .unwrap();
        for _ in 0..4 {
            r.update(10, 3, NS);
        }
        r.update(999_999, 3, NS);
        check(&r, 5, 4, 10, 10, 10.0);
        assert_eq!(r.dropped(), 1);
        assert_eq!(r.len(), 1);

        // A different timestamp has its own buffer.
        r.update(20, 4, NS);
        check(&r, 5, 5, 10, 20, 12.0);
    }

    #[test]
    fn trimmer_receives_expired_slots_in_order() {
        let trimmer = Arc::new(RecordingTrimmer::default());
        let r = SlidingWindowReservoir::with_trimmer(
            SlidingWindowConfig::new(10, 0, NS),
            trimmer.clone(),
        )
        .unwrap();
        r.update(1, 0, NS);
        r.update(2, 0, NS);
        r.update(3, 2, NS);
        r.update(4, 9, NS);

        r.snapshot(13, NS);
        let trimmed = trimmer.trimmed.lock().unwrap().clone();
        assert_eq!(trimmed, vec![(0, vec![1, 2]), (2, vec![3])]);
        assert_eq!(r.len(), 1);
    }

    #[test]
    fn late_update_goes_straight_to_trimmer() {
        let trimmer = Arc::new(RecordingTrimmer::default());
        let r = SlidingWindowReservoir::with_trimmer(
            SlidingWindowConfig::new(10, 0, NS),
            trimmer.clone(),
        )
        .unwrap();
        r.snapshot(100, NS);
        r.update(7, 50, NS);

        assert!(r.is_empty());
        assert_eq!(trimmer.trimmed.lock().unwrap().clone(), vec![(50, vec![7])]);
        check(&r, 100, 0, 0, 0, 0.0);
    }

    #[test]
    fn late_update_without_trimmer_is_discarded() {
        let r = reservoir(0);
        r.update(1, 20, NS);
        check(&r, 31, 0, 0, 0, 0.0);
        r.update(1, 20, NS);
        check(&r, 31, 0, 0, 0, 0.0);
        assert_eq!(r.dropped(), 0);
    }

    #[test]
    fn trim_is_monotone() {
        let r = reservoir(0);
        r.update(5, 0, NS);
        check(&r, 11, 0, 0, 0, 0.0);
        // Querying an earlier instant does not bring the sample back.
        check(&r, 5, 0, 0, 0, 0.0);
    }

    #[test]
    fn coarser_units_convert_exactly() {
        let r = SlidingWindowReservoir::new(SlidingWindowConfig::new(
            1,
            0,
            TimeUnit::Seconds,
        ))
        .unwrap();
        assert_eq!(r.window(), 1_000_000_000);
        r.update(10, 1, TimeUnit::Milliseconds);
        r.update(30, 1_000, TimeUnit::Microseconds);
        let snapshot = r.snapshot(1_000_000, NS);
        assert_eq!(snapshot.count(), 2);
        assert_eq!(snapshot.mean(), 20.0);
        assert_eq!(r.snapshot(1, TimeUnit::Seconds).count(), 2);
        assert_eq!(r.snapshot(1_001_000_001, NS).count(), 0);
    }

    #[test]
    fn samples_after_query_instant_are_not_counted() {
        let r = reservoir(0);
        r.update(100, 5, NS);
        check(&r, 4, 0, 0, 0, 0.0);
        // Still retained: a later query inside the window sees it.
        check(&r, 5, 1, 100, 100, 100.0);

        let r = reservoir(0);
        r.update(1, 2, NS);
        r.update(2, 6, NS);
        r.update(3, 9, NS);
        let snapshot = check(&r, 6, 2, 1, 2, 1.5);
        assert_eq!(snapshot.time_interval_nanos(), 6);
        check(&r, 9, 3, 1, 3, 2.0);
    }

    #[test]
    fn query_before_every_sample_reports_zero() {
        let r = reservoir(0);
        r.update(5, 100, NS);
        check(&r, 50, 0, 0, 0, 0.0);
        check(&r, 100, 1, 5, 5, 5.0);
    }

    #[test]
    fn covered_interval_clamps() {
        assert_eq!(covered_interval(0, -5, 10), 0);
        assert_eq!(covered_interval(0, 5, 10), 5);
        assert_eq!(covered_interval(0, 50, 10), 10);
        assert_eq!(covered_interval(i64::MIN, i64::MAX, 10), 10);
    }
}
