use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

/// Trait for tracking cache effectiveness of the slice-query cache layer.
///
/// Every read issued through a cache records how many slices were requested
/// (`retrieval`) and how many of them had to be fetched from the backend
/// (`miss`), tagged with the name of the store being read.
pub trait CacheMetrics: Send + Sync {
    /// Records `count` slice lookups against `store`.
    fn retrieval(&self, store: &str, count: u64);

    /// Records `count` lookups against `store` that reached the backend.
    fn miss(&self, store: &str, count: u64);

    /// Records a per-key invalidation in `store`.
    fn invalidation(&self, store: &str);

    /// Records a full cache clear of `store`.
    fn clear(&self, store: &str);
}

/// A no-op implementation of [`CacheMetrics`] that discards all recorded metrics.
#[derive(Default)]
pub struct NoopCacheMetrics;

impl CacheMetrics for NoopCacheMetrics {
    fn retrieval(&self, _store: &str, _count: u64) {}
    fn miss(&self, _store: &str, _count: u64) {}
    fn invalidation(&self, _store: &str) {}
    fn clear(&self, _store: &str) {}
}

/// Counters for a single store.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StoreCacheCounts {
    pub retrievals: u64,
    pub misses: u64,
    pub invalidations: u64,
    pub clears: u64,
}

impl StoreCacheCounts {
    /// Lookups answered from the cache.
    pub fn hits(&self) -> u64 {
        self.retrievals.saturating_sub(self.misses)
    }
}

/// A thread-safe counter-based implementation of [`CacheMetrics`].
///
/// Totals are plain atomics; the per-store breakdown sits behind a mutex
/// since stores are few and lookups short.
#[derive(Default)]
pub struct CounterCacheMetrics {
    /// Number of slice lookups across all stores.
    pub retrievals: AtomicU64,

    /// Number of lookups that reached the backend.
    pub misses: AtomicU64,

    /// Number of per-key invalidations.
    pub invalidations: AtomicU64,

    /// Number of full cache clears.
    pub clears: AtomicU64,

    per_store: Mutex<FxHashMap<String, StoreCacheCounts>>,
}

impl CounterCacheMetrics {
    /// Snapshot of the counters recorded for `store`.
    pub fn store(&self, store: &str) -> StoreCacheCounts {
        self.per_store.lock().get(store).copied().unwrap_or_default()
    }

    fn with_store(&self, store: &str, f: impl FnOnce(&mut StoreCacheCounts)) {
        let mut guard = self.per_store.lock();
        if let Some(counts) = guard.get_mut(store) {
            f(counts);
            return;
        }
        let mut counts = StoreCacheCounts::default();
        f(&mut counts);
        guard.insert(store.to_string(), counts);
    }
}

impl CacheMetrics for CounterCacheMetrics {
    fn retrieval(&self, store: &str, count: u64) {
        self.retrievals.fetch_add(count, Ordering::Relaxed);
        self.with_store(store, |c| c.retrievals += count);
    }

    fn miss(&self, store: &str, count: u64) {
        self.misses.fetch_add(count, Ordering::Relaxed);
        self.with_store(store, |c| c.misses += count);
    }

    fn invalidation(&self, store: &str) {
        self.invalidations.fetch_add(1, Ordering::Relaxed);
        self.with_store(store, |c| c.invalidations += 1);
    }

    fn clear(&self, store: &str) {
        self.clears.fetch_add(1, Ordering::Relaxed);
        self.with_store(store, |c| c.clears += 1);
    }
}

/// Returns the default metrics implementation wrapped in an [`Arc`].
///
/// The default implementation is [`NoopCacheMetrics`].
pub fn default_metrics() -> Arc<dyn CacheMetrics> {
    Arc::new(NoopCacheMetrics)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_track_per_store() {
        let metrics = CounterCacheMetrics::default();
        metrics.retrieval("edgestore", 3);
        metrics.miss("edgestore", 1);
        metrics.retrieval("graphindex", 2);
        metrics.invalidation("edgestore");

        let edges = metrics.store("edgestore");
        assert_eq!(edges.retrievals, 3);
        assert_eq!(edges.hits(), 2);
        assert_eq!(edges.invalidations, 1);
        assert_eq!(metrics.retrievals.load(Ordering::Relaxed), 5);
        assert_eq!(metrics.store("missing"), StoreCacheCounts::default());
    }
}
