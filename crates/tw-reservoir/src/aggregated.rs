//! Long-window reservoir combining aggregated chunks with the raw reservoir.

use crate::aggregating::{AggregatingTrimmer, AggregatingTrimmerConfig};
use crate::error::{ReservoirError, Result};
use crate::reservoir::TimeReservoir;
use crate::sliding::{covered_interval, SlidingWindowConfig, SlidingWindowReservoir};
use crate::snapshot::Snapshot;
use crate::time::TimeUnit;
use std::sync::Arc;
use tracing::debug;

/// Reservoir answering queries over a window much longer than the raw one.
///
/// A snapshot at `t` merges every chunk (at the attached level) whose lower
/// bound lies in `[t - window, t]` with the samples at or before `t` still
/// held by the raw reservoir. Raw and chunk storage are disjoint, since
/// trimming hands a sample over instead of copying it, so nothing is counted
/// twice.
///
/// Chunks count as whole units: precision at the old edge of the window is
/// one chunk width of the attached level.
#[derive(Debug)]
pub struct AggregatedReservoir {
    raw: Arc<SlidingWindowReservoir>,
    trimmer: Arc<AggregatingTrimmer>,
    window: i64,
    level: u32,
}

impl AggregatedReservoir {
    /// Build the raw reservoir and its trimmer together and attach `window`.
    ///
    /// Further windows over the same samples can share the tiers through
    /// [`AggregatedReservoir::new`] with [`raw`](Self::raw) and
    /// [`trimmer`](Self::trimmer).
    pub fn with_tiers(
        raw: SlidingWindowConfig,
        trimmer: AggregatingTrimmerConfig,
        window: i64,
        unit: TimeUnit,
    ) -> Result<Self> {
        let trimmer = Arc::new(AggregatingTrimmer::new(trimmer)?);
        let raw = Arc::new(SlidingWindowReservoir::with_trimmer(raw, trimmer.clone())?);
        Self::new(raw, trimmer, window, unit)
    }

    /// Build an aggregated view over `raw`.
    ///
    /// `raw` must have been built with `trimmer` as its trimmer (the same
    /// `Arc`); anything else fails with [`ReservoirError::TrimmerMismatch`].
    pub fn new(
        raw: Arc<SlidingWindowReservoir>,
        trimmer: Arc<AggregatingTrimmer>,
        window: i64,
        unit: TimeUnit,
    ) -> Result<Self> {
        if !raw.feeds(trimmer.as_ref()) {
            return Err(ReservoirError::TrimmerMismatch);
        }
        if window <= 0 {
            return Err(ReservoirError::InvalidWindow { window });
        }
        let window = unit.to_nanos(window);
        if window < raw.window() {
            return Err(ReservoirError::WindowShorterThanRaw {
                window,
                raw_window: raw.window(),
            });
        }
        let level = trimmer.attach(window);
        debug!(
            window_ns = window,
            raw_window_ns = raw.window(),
            level,
            "aggregated reservoir created"
        );
        Ok(Self {
            raw,
            trimmer,
            window,
            level,
        })
    }

    /// Hierarchy level this reservoir reads.
    pub fn level(&self) -> u32 {
        self.level
    }

    /// The raw reservoir feeding this one.
    pub fn raw(&self) -> &Arc<SlidingWindowReservoir> {
        &self.raw
    }

    pub fn trimmer(&self) -> &Arc<AggregatingTrimmer> {
        &self.trimmer
    }
}

impl TimeReservoir for AggregatedReservoir {
    fn update(&self, value: i64, time: i64, unit: TimeUnit) {
        self.raw.update(value, time, unit);
    }

    fn snapshot(&self, time: i64, unit: TimeUnit) -> Snapshot {
        let time = unit.to_nanos(time);
        let from = time.saturating_sub(self.window);
        // Chunks are read while the raw lock is held, so a concurrent trim
        // cannot move samples between the two halves of this fold.
        self.raw.with_trimmed(time, |view| {
            let (mut stats, _) = self.trimmer.fold_range(self.level, from, time);
            stats.merge(&view.stats);
            let interval = covered_interval(view.origin, time, self.window);
            stats.into_snapshot(interval)
        })
    }

    fn window(&self) -> i64 {
        self.window
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trimmer::DiscardingTrimmer;

    const NS: TimeUnit = TimeUnit::Nanoseconds;

    fn build(start: i64, chunk: i64, raw_window: i64, window: i64) -> AggregatedReservoir {
        AggregatedReservoir::with_tiers(
            SlidingWindowConfig::new(raw_window, start, NS),
            AggregatingTrimmerConfig::new(start, chunk, NS),
            window,
            NS,
        )
        .unwrap()
    }

    #[test]
    fn end_to_end_scenario() {
        for t0 in [0, 1_234_567] {
            let reservoir = build(t0, 1, 10, 100);
            reservoir.update(10, t0, NS);
            reservoir.update(20, t0 + 50, NS);
            let snapshot = reservoir.snapshot(t0 + 100, NS);
            assert_eq!(snapshot.count(), 2);
            assert_eq!(snapshot.min(), 10);
            assert_eq!(snapshot.max(), 20);
            assert_eq!(snapshot.mean(), 15.0);
            assert_eq!(snapshot.time_interval_nanos(), 100);
        }
    }

    #[test]
    fn end_to_end_with_wider_chunks() {
        let t0 = 500;
        let reservoir = build(t0, 10, 10, 100);
        reservoir.update(10, t0, NS);
        reservoir.update(20, t0 + 50, NS);
        let snapshot = reservoir.snapshot(t0 + 100, NS);
        assert_eq!(snapshot.count(), 2);
        assert_eq!(snapshot.mean(), 15.0);
        // The chunk anchored at t0 leaves the window one tick later.
        let snapshot = reservoir.snapshot(t0 + 101, NS);
        assert_eq!(snapshot.count(), 1);
        assert_eq!(snapshot.min(), 20);
    }

    #[test]
    fn counts_raw_and_chunks_without_overlap() {
        let reservoir = build(0, 1, 10, 100);
        for t in 0..=60 {
            reservoir.update(t, t, NS);
        }
        let snapshot = reservoir.snapshot(60, NS);
        assert_eq!(snapshot.count(), 61);
        assert_eq!(snapshot.min(), 0);
        assert_eq!(snapshot.max(), 60);
        assert_eq!(snapshot.mean(), 30.0);
        assert_eq!(reservoir.raw().snapshot(60, NS).count(), 11);

        let snapshot = reservoir.snapshot(150, NS);
        assert_eq!(snapshot.count(), 11);
        assert_eq!(snapshot.min(), 50);
    }

    #[test]
    fn rejects_windows_shorter_than_raw() {
        let trimmer = Arc::new(
            AggregatingTrimmer::new(AggregatingTrimmerConfig::new(0, 1, NS)).unwrap(),
        );
        let raw = Arc::new(
            SlidingWindowReservoir::with_trimmer(
                SlidingWindowConfig::new(10, 0, NS),
                trimmer.clone(),
            )
            .unwrap(),
        );
        let err = AggregatedReservoir::new(raw.clone(), trimmer.clone(), 5, NS).unwrap_err();
        assert_eq!(
            err,
            ReservoirError::WindowShorterThanRaw {
                window: 5,
                raw_window: 10
            }
        );
        let err = AggregatedReservoir::new(raw, trimmer, 0, NS).unwrap_err();
        assert_eq!(err, ReservoirError::InvalidWindow { window: 0 });
    }

    #[test]
    fn empty_and_pre_construction_queries() {
        let reservoir = build(1_000, 1, 10, 100);
        assert_eq!(reservoir.snapshot(1_000, NS).count(), 0);
        assert_eq!(reservoir.snapshot(10, NS).count(), 0);
        reservoir.update(1, 1_005, NS);
        assert_eq!(reservoir.snapshot(900, NS).count(), 0);
        assert_eq!(reservoir.snapshot(1_005, NS).count(), 1);
    }

    #[test]
    fn query_in_the_past_excludes_newer_samples() {
        let reservoir = build(0, 1, 10, 100);
        reservoir.update(1, 0, NS);
        reservoir.update(2, 50, NS);
        reservoir.update(3, 60, NS);

        // Sample 0 has been trimmed into a chunk; 50 and 60 are still raw.
        let snapshot = reservoir.snapshot(20, NS);
        assert_eq!(snapshot.count(), 1);
        assert_eq!(snapshot.max(), 1);
        assert_eq!(snapshot.time_interval_nanos(), 20);

        let snapshot = reservoir.snapshot(55, NS);
        assert_eq!(snapshot.count(), 2);
        assert_eq!(snapshot.max(), 2);
        assert_eq!(reservoir.snapshot(60, NS).count(), 3);
    }

    #[test]
    fn chunks_after_query_instant_are_not_counted() {
        let reservoir = build(0, 1, 10, 100);
        for t in [0, 30, 60] {
            reservoir.update(t, t, NS);
        }
        // Push every sample into chunk storage.
        assert_eq!(reservoir.snapshot(90, NS).count(), 3);
        let snapshot = reservoir.snapshot(40, NS);
        assert_eq!(snapshot.count(), 2);
        assert_eq!(snapshot.max(), 30);
    }

    #[test]
    fn rejects_raw_reservoir_feeding_another_trimmer() {
        let config = AggregatingTrimmerConfig::new(0, 1, NS);
        let trimmer = Arc::new(AggregatingTrimmer::new(config.clone()).unwrap());
        let other = Arc::new(AggregatingTrimmer::new(config).unwrap());
        let raw = Arc::new(
            SlidingWindowReservoir::with_trimmer(SlidingWindowConfig::new(10, 0, NS), other)
                .unwrap(),
        );
        let err = AggregatedReservoir::new(raw, trimmer.clone(), 100, NS).unwrap_err();
        assert_eq!(err, ReservoirError::TrimmerMismatch);

        let untrimmed =
            Arc::new(SlidingWindowReservoir::new(SlidingWindowConfig::new(10, 0, NS)).unwrap());
        let err = AggregatedReservoir::new(untrimmed, trimmer.clone(), 100, NS).unwrap_err();
        assert_eq!(err, ReservoirError::TrimmerMismatch);

        let discarding = Arc::new(
            SlidingWindowReservoir::with_trimmer(
                SlidingWindowConfig::new(10, 0, NS),
                Arc::new(DiscardingTrimmer),
            )
            .unwrap(),
        );
        let err = AggregatedReservoir::new(discarding, trimmer, 100, NS).unwrap_err();
        assert_eq!(err, ReservoirError::TrimmerMismatch);
    }

    #[test]
    fn shared_tiers_serve_several_windows() {
        let short = build(0, 1, 10, 50);
        let long = AggregatedReservoir::new(
            short.raw().clone(),
            short.trimmer().clone(),
            200,
            NS,
        )
        .unwrap();
        for t in 0..150 {
            short.update(1, t, NS);
        }
        assert_eq!(short.snapshot(149, NS).count(), 51);
        assert_eq!(long.snapshot(149, NS).count(), 150);
    }
}
