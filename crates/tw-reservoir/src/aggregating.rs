//! Chunked aggregation of samples trimmed from a raw reservoir.
//!
//! Expired samples are folded into fixed-width, floor-aligned time buckets
//! ("chunks"). The trimmer keeps a hierarchy of resolutions: level `L` uses
//! chunks of `chunk_size << L` nanoseconds, all anchored on the same start
//! time, so each level-`L + 1` chunk covers exactly two level-`L` chunks.
//!
//! An aggregated reservoir attaches to the finest level on which its window
//! spans at most `max_chunks_per_window` chunks. Each level only keeps chunks
//! for the longest window attached to it, which bounds memory by
//! `window / width` chunks per level regardless of the event rate:
//!
//! ```text
//! chunk_size = 10ms, 10 levels, 1024 chunks per window
//!   15s window → level 1 (20ms chunks,   750 live chunks)
//!   1h window  → level 9 (5.12s chunks,  704 live chunks)
//! ```

use crate::error::{ReservoirError, Result};
use crate::snapshot::Stats;
use crate::time::TimeUnit;
use crate::trimmer::Trimmer;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, trace};

/// Number of resolutions a trimmer may maintain.
pub const MAX_LEVEL: u32 = 16;

/// Default upper bound on chunks spanned by one attached window.
pub const DEFAULT_MAX_CHUNKS_PER_WINDOW: u64 = 1024;

/// Lower bound of the bucket containing `index`.
///
/// Buckets are `chunk_size` wide and anchored on `start_time`. The grid phase
/// is `start_time mod (chunk_size >> level)`: a level-`L` bucket of width
/// `base << L` therefore shares its phase with the level-0 grid of width
/// `base`, which makes the buckets of consecutive levels nest.
///
/// For every `chunk_size >= 1` the result satisfies
/// `lower <= index < lower + chunk_size`. Arithmetic is widened to `i128`;
/// near `i64::MIN` the bound saturates, which keeps the inclusion property.
pub fn chunk_lower_bound(index: i64, start_time: i64, chunk_size: i64, level: u32) -> i64 {
    let chunk_size = chunk_size.max(1);
    let base = chunk_size.checked_shr(level).unwrap_or(0).max(1);
    let offset = i128::from(start_time.rem_euclid(base));
    let width = i128::from(chunk_size);
    let lower = (i128::from(index) - offset).div_euclid(width) * width + offset;
    i64::try_from(lower).unwrap_or(i64::MIN)
}

/// Construction parameters for an [`AggregatingTrimmer`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatingTrimmerConfig {
    /// Anchor of the chunk grid, in `unit`.
    pub start_time: i64,
    /// Width of a level-0 chunk, in `unit`.
    pub chunk_size: i64,
    pub unit: TimeUnit,
    /// Number of resolutions, `1..=MAX_LEVEL`.
    pub levels: u32,
    /// Upper bound on chunks an attached window may span.
    pub max_chunks_per_window: u64,
}

impl AggregatingTrimmerConfig {
    pub fn new(start_time: i64, chunk_size: i64, unit: TimeUnit) -> Self {
        Self {
            start_time,
            chunk_size,
            unit,
            levels: 1,
            max_chunks_per_window: DEFAULT_MAX_CHUNKS_PER_WINDOW,
        }
    }

    pub fn with_levels(mut self, levels: u32) -> Self {
        self.levels = levels;
        self
    }

    pub fn with_max_chunks_per_window(mut self, max_chunks: u64) -> Self {
        self.max_chunks_per_window = max_chunks;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size <= 0 {
            return Err(ReservoirError::InvalidChunkSize {
                chunk_size: self.chunk_size,
            });
        }
        if self.levels == 0 || self.levels > MAX_LEVEL {
            return Err(ReservoirError::InvalidLevels {
                levels: self.levels,
                max: MAX_LEVEL,
            });
        }
        if self.max_chunks_per_window == 0 {
            return Err(ReservoirError::InvalidChunkBudget {
                max_chunks: self.max_chunks_per_window,
            });
        }
        // The widest level must still be representable.
        let widest = self
            .unit
            .to_nanos(self.chunk_size)
            .checked_mul(1_i64 << (self.levels - 1));
        if widest.is_none() {
            return Err(ReservoirError::InvalidLevels {
                levels: self.levels,
                max: MAX_LEVEL,
            });
        }
        Ok(())
    }
}

/// Pre-aggregated statistics of one time bucket.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Chunk {
    lower_bound: i64,
    width: i64,
    stats: Stats,
}

impl Chunk {
    fn new(lower_bound: i64, width: i64) -> Self {
        Self {
            lower_bound,
            width,
            stats: Stats::new(),
        }
    }

    pub fn lower_bound(&self) -> i64 {
        self.lower_bound
    }

    pub fn width(&self) -> i64 {
        self.width
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// Whether `time` falls inside this bucket.
    pub fn contains(&self, time: i64) -> bool {
        let offset = i128::from(time) - i128::from(self.lower_bound);
        offset >= 0 && offset < i128::from(self.width)
    }
}

#[derive(Debug)]
struct Level {
    width: i64,
    /// Longest window attached to this level; zero while unattached.
    retention: i64,
    /// Chunks with a lower bound below this have been retired.
    retired_below: i64,
    chunks: BTreeMap<i64, Chunk>,
}

impl Level {
    fn is_active(&self) -> bool {
        self.retention > 0
    }

    fn retire(&mut self, floor: i64) {
        if floor <= self.retired_below {
            return;
        }
        self.chunks = self.chunks.split_off(&floor);
        self.retired_below = floor;
    }
}

#[derive(Debug)]
struct Hierarchy {
    levels: Vec<Level>,
}

/// Trimmer folding expired samples into a hierarchy of chunks.
#[derive(Debug)]
pub struct AggregatingTrimmer {
    start: i64,
    chunk_size: i64,
    max_chunks_per_window: u64,
    hierarchy: Mutex<Hierarchy>,
}

impl AggregatingTrimmer {
    pub fn new(config: AggregatingTrimmerConfig) -> Result<Self> {
        config.validate()?;
        let start = config.unit.to_nanos(config.start_time);
        let chunk_size = config.unit.to_nanos(config.chunk_size);
        let levels = (0..config.levels)
            .map(|level| Level {
                width: chunk_size << level,
                retention: 0,
                retired_below: i64::MIN,
                chunks: BTreeMap::new(),
            })
            .collect();
        debug!(
            start_ns = start,
            chunk_size_ns = chunk_size,
            levels = config.levels,
            max_chunks_per_window = config.max_chunks_per_window,
            "aggregating trimmer created"
        );
        Ok(Self {
            start,
            chunk_size,
            max_chunks_per_window: config.max_chunks_per_window,
            hierarchy: Mutex::new(Hierarchy { levels }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Hierarchy> {
        self.hierarchy.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Width of a level-0 chunk, in nanoseconds.
    pub fn chunk_size(&self) -> i64 {
        self.chunk_size
    }

    /// Number of resolutions.
    pub fn levels(&self) -> u32 {
        self.lock().levels.len() as u32
    }

    /// Chunk width at `level`, in nanoseconds.
    pub fn level_width(&self, level: u32) -> Option<i64> {
        self.lock().levels.get(level as usize).map(|l| l.width)
    }

    /// Finest level on which `window` (nanoseconds) spans at most
    /// `max_chunks_per_window` chunks; the coarsest level otherwise.
    pub fn level_for_window(&self, window: i64) -> u32 {
        let hierarchy = self.lock();
        self.pick_level(&hierarchy, window)
    }

    fn pick_level(&self, hierarchy: &Hierarchy, window: i64) -> u32 {
        let window = window.max(1) as u64;
        let top = hierarchy.levels.len().saturating_sub(1) as u32;
        hierarchy
            .levels
            .iter()
            .position(|level| window.div_ceil(level.width as u64) <= self.max_chunks_per_window)
            .map_or(top, |level| level as u32)
    }

    /// Register a window (nanoseconds) and return the level serving it.
    ///
    /// The level starts aggregating from this point on, so attach before
    /// samples begin to expire.
    pub fn attach(&self, window: i64) -> u32 {
        let mut hierarchy = self.lock();
        let index = self.pick_level(&hierarchy, window);
        let level = &mut hierarchy.levels[index as usize];
        level.retention = level.retention.max(window);
        debug!(
            window_ns = window,
            level = index,
            width_ns = level.width,
            retention_ns = level.retention,
            "window attached to aggregation level"
        );
        index
    }

    /// Live chunks at `level`.
    pub fn chunk_count(&self, level: u32) -> usize {
        self.lock()
            .levels
            .get(level as usize)
            .map_or(0, |l| l.chunks.len())
    }

    /// Copies of the live chunks at `level`, oldest first.
    pub fn chunks(&self, level: u32) -> Vec<Chunk> {
        self.lock()
            .levels
            .get(level as usize)
            .map(|l| l.chunks.values().copied().collect())
            .unwrap_or_default()
    }

    /// Fold every chunk at `level` whose lower bound lies in `[from, to]`.
    ///
    /// Also returns the oldest such lower bound.
    pub(crate) fn fold_range(&self, level: u32, from: i64, to: i64) -> (Stats, Option<i64>) {
        let hierarchy = self.lock();
        let Some(level) = hierarchy.levels.get(level as usize) else {
            return (Stats::new(), None);
        };
        let mut stats = Stats::new();
        let mut oldest = None;
        if from > to {
            return (Stats::new(), None);
        }
        for chunk in level.chunks.range(from..=to).map(|(_, chunk)| chunk) {
            oldest.get_or_insert(chunk.lower_bound);
            stats.merge(&chunk.stats);
        }
        (stats, oldest)
    }
}

impl Trimmer for AggregatingTrimmer {
    fn on_trim(&self, timestamp: i64, values: &[i64]) {
        if values.is_empty() {
            return;
        }
        let mut hierarchy = self.lock();
        for (index, level) in hierarchy.levels.iter_mut().enumerate() {
            if !level.is_active() {
                continue;
            }
            let floor = timestamp
                .saturating_sub(level.retention)
                .saturating_sub(level.width);
            level.retire(floor);

            let lower = chunk_lower_bound(timestamp, self.start, level.width, index as u32);
            if lower < level.retired_below {
                trace!(
                    timestamp_ns = timestamp,
                    level = index,
                    "expired sample older than retained chunks"
                );
                continue;
            }
            let width = level.width;
            let chunk = level
                .chunks
                .entry(lower)
                .or_insert_with(|| Chunk::new(lower, width));
            for value in values {
                chunk.stats.record(*value);
            }
        }
    }
}
