//! Hook invoked when raw samples age out of a sliding window.

use std::sync::Arc;

/// Receives the samples a reservoir is about to evict.
///
/// The owning reservoir calls [`on_trim`](Trimmer::on_trim) synchronously while
/// it holds its lock, once per expired timestamp and strictly before the
/// values are removed. Implementations must return promptly and must not call
/// back into the reservoir that owns them.
pub trait Trimmer: Send + Sync {
    fn on_trim(&self, timestamp: i64, values: &[i64]);
}

impl<T: Trimmer + ?Sized> Trimmer for Arc<T> {
    fn on_trim(&self, timestamp: i64, values: &[i64]) {
        (**self).on_trim(timestamp, values);
    }
}

/// Trimmer that drops expired samples.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscardingTrimmer;

impl Trimmer for DiscardingTrimmer {
    fn on_trim(&self, _timestamp: i64, _values: &[i64]) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sliding::{SlidingWindowConfig, SlidingWindowReservoir};
    use crate::{TimeReservoir, TimeUnit};

    #[test]
    fn discarding_trimmer_behaves_like_no_trimmer() {
        let r = SlidingWindowReservoir::with_trimmer(
            SlidingWindowConfig::new(10, 0, TimeUnit::Nanoseconds),
            Arc::new(DiscardingTrimmer),
        )
        .unwrap();
        r.update(1, 0, TimeUnit::Nanoseconds);
        r.update(2, 20, TimeUnit::Nanoseconds);
        r.update(3, 5, TimeUnit::Nanoseconds);
        let snapshot = r.snapshot(20, TimeUnit::Nanoseconds);
        assert_eq!(snapshot.count(), 1);
        assert_eq!(snapshot.min(), 2);
    }

    #[test]
    fn arc_forwards_to_inner_trimmer() {
        struct Counting(std::sync::atomic::AtomicUsize);
        impl Trimmer for Counting {
            fn on_trim(&self, _timestamp: i64, values: &[i64]) {
                self.0
                    .fetch_add(values.len(), std::sync::atomic::Ordering::SeqCst);
            }
        }
        let inner = Arc::new(Counting(Default::default()));
        let shared: Arc<dyn Trimmer> = Arc::new(Arc::clone(&inner));
        shared.on_trim(0, &[1, 2, 3]);
        assert_eq!(inner.0.load(std::sync::atomic::Ordering::SeqCst), 3);
    }
}
