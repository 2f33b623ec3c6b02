//! The capability shared by every reservoir variant.

use crate::snapshot::Snapshot;
use crate::time::TimeUnit;

/// A bounded-memory structure answering statistical queries over a trailing
/// time window of `(value, timestamp)` samples.
///
/// Implementations are shared between request-handling threads (calling
/// [`update`](TimeReservoir::update)) and monitoring threads (calling
/// [`snapshot`](TimeReservoir::snapshot)); both calls are linearizable and
/// never fail.
pub trait TimeReservoir: Send + Sync {
    /// Record `value` observed at `time`.
    fn update(&self, value: i64, time: i64, unit: TimeUnit);

    /// Summarize the window ending at `time`.
    fn snapshot(&self, time: i64, unit: TimeUnit) -> Snapshot;

    /// Window length in nanoseconds.
    fn window(&self) -> i64;
}
