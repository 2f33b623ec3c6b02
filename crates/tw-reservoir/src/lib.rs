//! Sliding-window time reservoirs.
//!
//! This crate provides the statistics core used by the monitoring facade:
//! - An exact raw reservoir over a short trailing window
//! - A trimmer hook that receives samples as they age out of that window
//! - A chunked aggregating trimmer with a multi-level bucket hierarchy
//! - An aggregated reservoir answering queries over much longer windows
//!
//! # Architecture
//!
//! ```text
//! update(value, t) → SlidingWindowReservoir ──trim──→ AggregatingTrimmer
//!                          │                               │ chunks
//!                          └──────── AggregatedReservoir ──┘
//!                                          ↓
//!                                    snapshot(now)
//! ```
//!
//! Memory is bounded by `window / chunk_size` per hierarchy level instead of by
//! event volume, so an hour-long latency window costs a few thousand chunks at
//! most.
//!
//! # Example
//!
//! ```
//! use tw_reservoir::{
//!     AggregatedReservoir, AggregatingTrimmerConfig, SlidingWindowConfig, TimeReservoir,
//!     TimeUnit,
//! };
//!
//! let ns = TimeUnit::Nanoseconds;
//! let aggregated = AggregatedReservoir::with_tiers(
//!     SlidingWindowConfig::new(10, 0, ns),
//!     AggregatingTrimmerConfig::new(0, 1, ns),
//!     100,
//!     ns,
//! )
//! .unwrap();
//!
//! aggregated.update(10, 0, TimeUnit::Nanoseconds);
//! aggregated.update(20, 50, TimeUnit::Nanoseconds);
//!
//! let snapshot = aggregated.snapshot(100, TimeUnit::Nanoseconds);
//! assert_eq!(snapshot.count(), 2);
//! assert_eq!(snapshot.mean(), 15.0);
//! ```

pub mod aggregated;
pub mod aggregating;
pub mod error;
pub mod reservoir;
pub mod sliding;
pub mod snapshot;
pub mod time;
pub mod trimmer;

pub use aggregated::AggregatedReservoir;
pub use aggregating::{
    chunk_lower_bound, AggregatingTrimmer, AggregatingTrimmerConfig, Chunk,
    DEFAULT_MAX_CHUNKS_PER_WINDOW, MAX_LEVEL,
};
pub use error::{ReservoirError, Result};
pub use reservoir::TimeReservoir;
pub use sliding::{SlidingWindowConfig, SlidingWindowReservoir, DEFAULT_COLLISION_BUFFER};
pub use snapshot::{Snapshot, Stats};
pub use time::TimeUnit;
pub use trimmer::{DiscardingTrimmer, Trimmer};
