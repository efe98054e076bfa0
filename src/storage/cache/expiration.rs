//! Sharded, byte-weighted slice cache with per-key expiration.
//!
//! Slices are cached under their full [`KeySliceQuery`]. A mutated key is not
//! purged right away: it is recorded in the expired-key table, which makes
//! every read of that key bypass the cache until the table entry lapses.
//! Cached slices of expired keys are dropped in batches once enough expired
//! reads have accumulated, or when forced.

use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;
use rand::Rng;
use rustc_hash::{FxHashMap, FxHasher};
use tracing::{debug, trace, warn};

use crate::storage::buffer::{EntryList, StaticBuffer};
use crate::storage::query::KeySliceQuery;

/// Expired-key reads tolerated before a cleanup pass runs.
const PENALTY_THRESHOLD: i64 = 5;
/// One in this many invalidations also counts towards the penalty.
const INVALIDATE_KEY_FRACTION_PENALTY: u32 = 1000;
/// Bookkeeping overhead charged to every cached slice.
const CACHE_ENTRY_OVERHEAD: usize = 64;

struct CachedSlice {
    entries: EntryList,
    inserted: Instant,
    weight: usize,
}

struct Shard {
    lru: LruCache<KeySliceQuery, CachedSlice>,
    bytes: usize,
    budget: usize,
}

impl Shard {
    fn remove(&mut self, query: &KeySliceQuery) {
        if let Some(old) = self.lru.pop(query) {
            self.bytes -= old.weight;
        }
    }

    fn clear(&mut self) {
        self.lru.clear();
        self.bytes = 0;
    }
}

#[derive(Clone, Copy)]
struct ExpiredKey {
    since: Instant,
    until: Option<Instant>,
}

impl ExpiredKey {
    fn lapsed(&self, now: Instant) -> bool {
        self.until.is_some_and(|until| until < now)
    }
}

/// Outcome of a cleanup pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CleanupStats {
    /// Expired keys whose cached slices were purged.
    pub keys_cleared: usize,
    /// Cached slices removed.
    pub slices_removed: usize,
    /// Expired-key entries dropped because they lapsed.
    pub keys_lapsed: usize,
}

pub(crate) struct ExpirationCache {
    shards: Vec<Mutex<Shard>>,
    expired: Mutex<FxHashMap<StaticBuffer, ExpiredKey>>,
    cache_time: Option<Duration>,
    clean_wait: Duration,
    penalty: AtomicI64,
    cleanup_running: AtomicBool,
    cleanup_lock: Mutex<()>,
    generation: AtomicU64,
}

impl ExpirationCache {
    /// `cache_time` of zero keeps slices until evicted or invalidated.
    pub(crate) fn new(shards: usize, max_bytes: usize, cache_time: Duration, clean_wait: Duration) -> Self {
        let shard_count = shards.max(1);
        let budget = (max_bytes / shard_count).max(1);
        let shards = (0..shard_count)
            .map(|_| {
                Mutex::new(Shard {
                    lru: LruCache::unbounded(),
                    bytes: 0,
                    budget,
                })
            })
            .collect();
        Self {
            shards,
            expired: Mutex::new(FxHashMap::default()),
            cache_time: (!cache_time.is_zero()).then_some(cache_time),
            clean_wait,
            penalty: AtomicI64::new(PENALTY_THRESHOLD),
            cleanup_running: AtomicBool::new(false),
            cleanup_lock: Mutex::new(()),
            generation: AtomicU64::new(0),
        }
    }

    /// Token identifying the current cache contents; fills started under an
    /// older token are discarded.
    pub(crate) fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Returns true when `key` was invalidated and reads must bypass the cache.
    pub(crate) fn is_expired(&self, key: &StaticBuffer) -> bool {
        {
            let mut table = self.expired.lock();
            match table.get(key) {
                None => return false,
                Some(entry) if entry.lapsed(Instant::now()) => {
                    table.remove(key);
                    return false;
                }
                Some(_) => {}
            }
        }
        // Each bypassed read brings the next cleanup pass closer.
        self.count_down();
        true
    }

    pub(crate) fn get(&self, query: &KeySliceQuery) -> Option<EntryList> {
        let mut shard = self.shard_for(query.key()).lock();
        let stale = match shard.lru.get(query) {
            None => return None,
            Some(cached) => match self.cache_time {
                Some(ttl) if cached.inserted.elapsed() >= ttl => true,
                _ => return Some(cached.entries.clone()),
            },
        };
        if stale {
            shard.remove(query);
        }
        None
    }

    /// Caches `entries` unless the cache was cleared or the key invalidated
    /// since `generation` was observed, or the slice alone exceeds the shard
    /// budget.
    pub(crate) fn put(&self, query: KeySliceQuery, entries: EntryList, generation: u64) {
        if self.generation() != generation {
            warn!(key = %query.key(), "cache.fill.raced_clear");
            return;
        }
        if self.expired.lock().contains_key(query.key()) {
            trace!(key = %query.key(), "cache.fill.key_expired");
            return;
        }
        let weight = CACHE_ENTRY_OVERHEAD + query.byte_size() + entries.byte_size();
        let mut shard = self.shard_for(query.key()).lock();
        if weight > shard.budget {
            return;
        }
        let cached = CachedSlice {
            entries,
            inserted: Instant::now(),
            weight,
        };
        if let Some(old) = shard.lru.put(query, cached) {
            shard.bytes -= old.weight;
        }
        shard.bytes += weight;
        while shard.bytes > shard.budget {
            match shard.lru.pop_lru() {
                Some((_, evicted)) => shard.bytes -= evicted.weight,
                None => break,
            }
        }
    }

    /// Marks `key` expired. Cached slices stay in place until cleanup.
    pub(crate) fn invalidate(&self, key: &StaticBuffer) {
        let now = Instant::now();
        let entry = ExpiredKey {
            since: now,
            until: self.cache_time.and_then(|ttl| now.checked_add(ttl)),
        };
        self.expired.lock().insert(key.clone(), entry);
        if rand::thread_rng().gen_ratio(1, INVALIDATE_KEY_FRACTION_PENALTY) {
            self.count_down();
        }
    }

    /// Drops every cached slice. Expired keys are untouched.
    pub(crate) fn invalidate_all(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        for shard in &self.shards {
            shard.lock().clear();
        }
    }

    /// Purges cached slices of keys expired for longer than the grace period.
    pub(crate) fn clear_expired(&self, reset_penalty: bool) -> CleanupStats {
        let _guard = self.cleanup_lock.lock();
        let now = Instant::now();
        let mut stats = CleanupStats::default();
        let ripe: FxHashMap<StaticBuffer, Instant> = {
            let mut table = self.expired.lock();
            let before = table.len();
            table.retain(|_, entry| !entry.lapsed(now));
            stats.keys_lapsed = before - table.len();
            table
                .iter()
                .filter(|(_, entry)| now.duration_since(entry.since) >= self.clean_wait)
                .map(|(key, entry)| (key.clone(), entry.since))
                .collect()
        };
        if !ripe.is_empty() {
            for shard in &self.shards {
                let mut shard = shard.lock();
                let doomed: Vec<KeySliceQuery> = shard
                    .lru
                    .iter()
                    .filter(|(q, _)| ripe.contains_key(q.key()))
                    .map(|(q, _)| q.clone())
                    .collect();
                stats.slices_removed += doomed.len();
                for query in &doomed {
                    shard.remove(query);
                }
            }
        }
        if reset_penalty {
            self.penalty.store(PENALTY_THRESHOLD, Ordering::Release);
        }
        {
            // Keys invalidated again during the pass keep their newer entry.
            let mut table = self.expired.lock();
            for (key, since) in &ripe {
                if table.get(key).is_some_and(|entry| entry.since == *since) {
                    table.remove(key);
                }
            }
        }
        stats.keys_cleared = ripe.len();
        debug!(
            keys_cleared = stats.keys_cleared,
            slices_removed = stats.slices_removed,
            keys_lapsed = stats.keys_lapsed,
            "cache.expired.cleanup"
        );
        stats
    }

    pub(crate) fn len(&self) -> usize {
        self.shards.iter().map(|s| s.lock().lru.len()).sum()
    }

    pub(crate) fn weight(&self) -> usize {
        self.shards.iter().map(|s| s.lock().bytes).sum()
    }

    pub(crate) fn expired_keys(&self) -> usize {
        self.expired.lock().len()
    }

    /// Counts one expired read and runs a cleanup pass once the penalty is
    /// used up. A pass that is already running leaves the counter spent, so
    /// the next expired read tries again.
    fn count_down(&self) {
        if self.penalty.fetch_sub(1, Ordering::AcqRel) > 1 {
            return;
        }
        if self
            .cleanup_running
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            return;
        }
        self.clear_expired(true);
        self.cleanup_running.store(false, Ordering::Release);
    }

    fn shard_for(&self, key: &StaticBuffer) -> &Mutex<Shard> {
        let mut hasher = FxHasher::default();
        key.hash(&mut hasher);
        let idx = (hasher.finish() as usize) % self.shards.len();
        &self.shards[idx]
    }
}
