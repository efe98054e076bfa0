use std::sync::Arc;
use std::time::Duration;

use super::metrics::CacheMetrics;

/// Default byte budget of one store cache.
pub const DEFAULT_CACHE_SIZE: usize = 64 * 1024 * 1024;
/// Default time a cached slice stays valid after being written.
pub const DEFAULT_CACHE_TIME: Duration = Duration::from_millis(10_000);
/// Default grace period before an expired key's slices are cleaned up.
pub const DEFAULT_CLEAN_WAIT: Duration = Duration::from_millis(50);

/// Configuration for a [`super::cache::KcvsCache`].
#[derive(Clone)]
pub struct CacheOptions {
    /// Whether reads are cached at all; disabled yields a pass-through cache.
    pub enabled: bool,
    /// Upper bound on the summed byte weight of cached slices.
    pub max_bytes: usize,
    /// How long a cached slice stays valid after insertion; zero never expires.
    pub cache_time: Duration,
    /// Grace period before slices of an invalidated key are purged.
    pub clean_wait: Duration,
    /// Number of independently locked shards.
    pub shards: usize,
    /// Optional metrics sink.
    pub metrics: Option<Arc<dyn CacheMetrics>>,
}

impl CacheOptions {
    /// Creates options with caching enabled and default limits.
    pub fn new() -> Self {
        Self {
            enabled: true,
            max_bytes: DEFAULT_CACHE_SIZE,
            cache_time: DEFAULT_CACHE_TIME,
            clean_wait: DEFAULT_CLEAN_WAIT,
            shards: 8,
            metrics: None,
        }
    }

    /// Options for a pass-through cache.
    pub fn disabled() -> Self {
        Self::new().enabled(false)
    }

    /// Enables or disables caching.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Sets the byte budget.
    pub fn max_bytes(mut self, bytes: usize) -> Self {
        self.max_bytes = bytes;
        self
    }

    /// Sets the expire-after-write time.
    pub fn cache_time(mut self, time: Duration) -> Self {
        self.cache_time = time;
        self
    }

    /// Sets the cleanup grace period.
    pub fn clean_wait(mut self, wait: Duration) -> Self {
        self.clean_wait = wait;
        self
    }

    /// Sets the shard count (clamped to at least one).
    pub fn shards(mut self, shards: usize) -> Self {
        self.shards = shards.max(1);
        self
    }

    /// Sets the metrics collection implementation.
    pub fn metrics(mut self, metrics: Arc<dyn CacheMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Write-path configuration of a [`super::cache::CacheTransaction`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransactionOptions {
    /// Number of buffered mutations that form one persistence chunk.
    pub buffer_size: usize,
    /// Attempts made to persist a chunk before giving up on temporary errors.
    pub write_attempts: usize,
    /// Upper bound on the back-off between attempts.
    pub write_wait: Duration,
    /// Flush as soon as the buffer fills instead of waiting for commit.
    pub continuous_persistence: bool,
}

impl TransactionOptions {
    pub fn new() -> Self {
        Self {
            buffer_size: 1024,
            write_attempts: 5,
            write_wait: Duration::from_millis(100),
            continuous_persistence: false,
        }
    }

    /// Sets the chunk size (clamped to at least one).
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size.max(1);
        self
    }

    /// Sets the attempt count (clamped to at least one).
    pub fn write_attempts(mut self, attempts: usize) -> Self {
        self.write_attempts = attempts.max(1);
        self
    }

    pub fn write_wait(mut self, wait: Duration) -> Self {
        self.write_wait = wait;
        self
    }

    pub fn continuous_persistence(mut self, enabled: bool) -> Self {
        self.continuous_persistence = enabled;
        self
    }
}

impl Default for TransactionOptions {
    fn default() -> Self {
        Self::new()
    }
}
