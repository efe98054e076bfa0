//! Read cache in front of a [`KeyColumnValueStore`].
//!
//! A [`KcvsCache`] serves exact-match slice reads from memory and records
//! every miss in the configured [`CacheMetrics`]. Writes never touch the
//! cache directly: they are buffered by a [`CacheTransaction`], persisted
//! through the store manager and then invalidate the written keys.

mod expiration;
mod transaction;

use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, trace};

use crate::types::Result;

use super::buffer::{Entry, EntryList, StaticBuffer};
use super::metrics::{default_metrics, CacheMetrics};
use super::options::CacheOptions;
use super::query::{KeyRangeQuery, KeySliceQuery, SliceQuery};
use super::store::{KeyColumnValueStore, KeyIterator};

use expiration::ExpirationCache;

pub use expiration::CleanupStats;
pub use transaction::CacheTransaction;

/// Per-store slice cache. Disabled caches pass every read through.
pub struct KcvsCache {
    store: Arc<dyn KeyColumnValueStore>,
    metrics: Arc<dyn CacheMetrics>,
    cache: Option<ExpirationCache>,
}

impl KcvsCache {
    pub fn new(store: Arc<dyn KeyColumnValueStore>, opts: &CacheOptions) -> Self {
        let cache = opts.enabled.then(|| {
            ExpirationCache::new(opts.shards, opts.max_bytes, opts.cache_time, opts.clean_wait)
        });
        Self {
            store,
            metrics: opts.metrics.clone().unwrap_or_else(default_metrics),
            cache,
        }
    }

    /// A cache that never retains anything.
    pub fn pass_through(store: Arc<dyn KeyColumnValueStore>) -> Self {
        Self::new(store, &CacheOptions::disabled())
    }

    pub fn name(&self) -> &str {
        self.store.name()
    }

    pub fn store(&self) -> &Arc<dyn KeyColumnValueStore> {
        &self.store
    }

    pub fn is_enabled(&self) -> bool {
        self.cache.is_some()
    }

    /// Reads one slice, from memory when possible.
    ///
    /// Keys with mutations still buffered in `tx` are read from the store and
    /// overlaid with those mutations; such reads never populate the cache.
    pub fn get_slice(&self, query: &KeySliceQuery, tx: &CacheTransaction) -> Result<EntryList> {
        self.metrics.retrieval(self.name(), 1);
        if let Some(pending) = tx.pending(self.name(), query.key()) {
            self.metrics.miss(self.name(), 1);
            let base = self.read_unlimited(query.key(), query.slice(), tx)?;
            return Ok(pending.overlay(&base, query.slice()));
        }
        let Some(cache) = &self.cache else {
            self.metrics.miss(self.name(), 1);
            return self.store.get_slice(query, tx.store_tx());
        };
        if cache.is_expired(query.key()) {
            self.metrics.miss(self.name(), 1);
            trace!(store = self.name(), key = %query.key(), "cache.get_slice.expired");
            return self.store.get_slice(query, tx.store_tx());
        }
        if let Some(hit) = cache.get(query) {
            trace!(store = self.name(), key = %query.key(), "cache.get_slice.hit");
            return Ok(hit);
        }
        self.metrics.miss(self.name(), 1);
        let generation = cache.generation();
        let entries = self.store.get_slice(query, tx.store_tx())?;
        cache.put(query.clone(), entries.clone(), generation);
        trace!(
            store = self.name(),
            key = %query.key(),
            entries = entries.len(),
            "cache.get_slice.miss"
        );
        Ok(entries)
    }

    /// Reads the same slice for several keys.
    ///
    /// Hits are answered from memory; all misses go to the store in a single
    /// multi-key read that names each key once. Every requested key appears
    /// in the result.
    pub fn get_multi_slice(
        &self,
        keys: &[StaticBuffer],
        query: &SliceQuery,
        tx: &CacheTransaction,
    ) -> Result<FxHashMap<StaticBuffer, EntryList>> {
        let mut results = FxHashMap::default();
        results.reserve(keys.len());
        self.metrics.retrieval(self.name(), keys.len() as u64);

        let generation = self.cache.as_ref().map(ExpirationCache::generation);
        let mut remaining = Vec::new();
        let mut cacheable = Vec::new();
        let mut overlaid = 0u64;
        let mut seen = FxHashSet::default();
        for key in keys {
            if !seen.insert(key) {
                continue;
            }
            if let Some(pending) = tx.pending(self.name(), key) {
                let base = self.read_unlimited(key, query, tx)?;
                results.insert(key.clone(), pending.overlay(&base, query));
                overlaid += 1;
                continue;
            }
            let Some(cache) = &self.cache else {
                remaining.push(key.clone());
                continue;
            };
            if cache.is_expired(key) {
                remaining.push(key.clone());
                continue;
            }
            let ksq = KeySliceQuery::new(key.clone(), query.clone());
            match cache.get(&ksq) {
                Some(hit) => {
                    results.insert(key.clone(), hit);
                }
                None => {
                    remaining.push(key.clone());
                    cacheable.push(ksq);
                }
            }
        }
        self.metrics.miss(self.name(), overlaid + remaining.len() as u64);

        if !remaining.is_empty() {
            let mut fetched = self.store.get_multi_slice(&remaining, query, tx.store_tx())?;
            if let (Some(cache), Some(generation)) = (&self.cache, generation) {
                for ksq in cacheable {
                    if let Some(entries) = fetched.get(ksq.key()) {
                        let entries = entries.clone();
                        cache.put(ksq, entries, generation);
                    }
                }
            }
            for key in &remaining {
                let entries = fetched.remove(key).unwrap_or_default();
                results.insert(key.clone(), entries);
            }
            debug!(
                store = self.name(),
                requested = keys.len(),
                fetched = remaining.len(),
                "cache.multi_get.miss"
            );
        }
        Ok(results)
    }

    /// Buffers a mutation of `key` in `tx`; it reaches the store on flush.
    pub fn mutate_entries(
        self: &Arc<Self>,
        key: StaticBuffer,
        additions: Vec<Entry>,
        deletions: Vec<StaticBuffer>,
        tx: &mut CacheTransaction,
    ) -> Result<()> {
        tx.mutate(self, key, additions, deletions)
    }

    /// Makes subsequent reads of `key` bypass the cache.
    pub fn invalidate(&self, key: &StaticBuffer) {
        if let Some(cache) = &self.cache {
            cache.invalidate(key);
            self.metrics.invalidation(self.name());
            debug!(store = self.name(), key = %key, "cache.invalidate");
        }
    }

    /// Drops every cached slice.
    pub fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.clear_expired(false);
            cache.invalidate_all();
            self.metrics.clear(self.name());
            debug!(store = self.name(), "cache.clear");
        }
    }

    /// Runs an expired-key cleanup pass now.
    pub fn force_clear_expired_cache(&self) -> CleanupStats {
        match &self.cache {
            Some(cache) => cache.clear_expired(false),
            None => CleanupStats::default(),
        }
    }

    /// Key-range scans are never cached.
    pub fn get_key_range(&self, query: &KeyRangeQuery, tx: &CacheTransaction) -> Result<KeyIterator> {
        self.store.get_key_range(query, tx.store_tx())
    }

    pub fn get_keys(&self, query: &SliceQuery, tx: &CacheTransaction) -> Result<KeyIterator> {
        self.store.get_keys(query, tx.store_tx())
    }

    /// Number of cached slices.
    pub fn cached_slices(&self) -> usize {
        self.cache.as_ref().map_or(0, ExpirationCache::len)
    }

    /// Summed byte weight of cached slices.
    pub fn cached_bytes(&self) -> usize {
        self.cache.as_ref().map_or(0, ExpirationCache::weight)
    }

    pub fn expired_keys(&self) -> usize {
        self.cache.as_ref().map_or(0, ExpirationCache::expired_keys)
    }

    pub fn close(&self) -> Result<()> {
        if let Some(cache) = &self.cache {
            cache.invalidate_all();
        }
        self.store.close()
    }

    fn read_unlimited(
        &self,
        key: &StaticBuffer,
        slice: &SliceQuery,
        tx: &CacheTransaction,
    ) -> Result<EntryList> {
        let unlimited = SliceQuery::new(slice.start().clone(), slice.end().clone());
        self.store
            .get_slice(&KeySliceQuery::new(key.clone(), unlimited), tx.store_tx())
    }
}
