//! Key-column-value storage layer.
//!
//! Defines the buffer/entry model, slice queries, the backend contracts, and
//! the slice cache with its write-buffering transaction.

/// Bounded retry of temporarily failing backend calls.
pub mod backend_op;

/// Slice cache and write-buffering transaction.
pub mod cache;

/// Reference in-memory backend.
pub mod inmemory;

mod buffer;
mod metrics;
mod options;
mod query;
mod store;

/// Buffers, entries, and entry lists.
pub use buffer::{Entry, EntryList, EntryMeta, StaticBuffer};

pub use cache::{CacheTransaction, CleanupStats, KcvsCache};

/// Metrics and profiling.
pub use metrics::{
    default_metrics, CacheMetrics, CounterCacheMetrics, NoopCacheMetrics, StoreCacheCounts,
};

/// Cache and transaction configuration.
pub use options::{
    CacheOptions, TransactionOptions, DEFAULT_CACHE_SIZE, DEFAULT_CACHE_TIME, DEFAULT_CLEAN_WAIT,
};

pub use query::{KeyRangeQuery, KeySliceQuery, SliceQuery, NO_LIMIT};

/// Backend contracts.
pub use store::{
    KcvMutation, KeyColumnValueStore, KeyEntries, KeyIterator, KeyMutations, StoreManager,
    StoreMutations, StoreTransaction,
};
