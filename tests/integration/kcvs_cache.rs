#![allow(missing_docs)]

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use penumbra::storage::inmemory::{CountingStore, InMemoryStoreManager};
use penumbra::storage::{
    CacheOptions, CacheTransaction, CounterCacheMetrics, Entry, KcvsCache, KeyColumnValueStore,
    KeySliceQuery, SliceQuery, StaticBuffer, StoreManager, TransactionOptions,
};
use penumbra::types::Result;

const NUM_KEYS: u32 = 100;
const NUM_COLS: u32 = 10;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn key(k: u32) -> StaticBuffer {
    StaticBuffer::from_u32(k)
}

fn slice(start: u32, end: u32) -> SliceQuery {
    SliceQuery::new(StaticBuffer::from_u32(start), StaticBuffer::from_u32(end))
}

struct Harness {
    manager: Arc<InMemoryStoreManager>,
    counting: Arc<CountingStore>,
    cache: Arc<KcvsCache>,
    metrics: Arc<CounterCacheMetrics>,
}

impl Harness {
    fn load() -> Result<Self> {
        init_tracing();
        let manager = Arc::new(InMemoryStoreManager::new());
        let raw = manager.open_database("edgestore")?;
        let tx = manager.begin_transaction()?;
        for k in 1..=NUM_KEYS {
            let entries: Vec<Entry> = (1..=NUM_COLS)
                .map(|c| Entry::new(StaticBuffer::from_u32(c), StaticBuffer::from_u32(k * c)))
                .collect();
            raw.mutate(&key(k), &entries, &[], tx.as_ref())?;
        }
        let counting = Arc::new(CountingStore::new(raw));
        let metrics = Arc::new(CounterCacheMetrics::default());
        let opts = CacheOptions::new()
            .cache_time(Duration::from_secs(600))
            .clean_wait(Duration::ZERO)
            .metrics(metrics.clone());
        let cache = Arc::new(KcvsCache::new(counting.clone(), &opts));
        Ok(Self {
            manager,
            counting,
            cache,
            metrics,
        })
    }

    fn tx(&self) -> Result<CacheTransaction> {
        let manager: Arc<dyn StoreManager> = self.manager.clone();
        CacheTransaction::begin(manager, TransactionOptions::new())
    }

    fn calls(&self) -> u64 {
        self.counting.slice_calls()
    }
}

#[test]
fn warm_cache_answers_without_backend_calls() -> Result<()> {
    let h = Harness::load()?;
    let tx = h.tx()?;
    let full = slice(0, NUM_COLS + 1);
    for k in 1..=NUM_KEYS {
        let q = KeySliceQuery::new(key(k), full.clone());
        assert_eq!(h.cache.get_slice(&q, &tx)?.len(), NUM_COLS as usize);
        assert_eq!(h.cache.get_slice(&q, &tx)?.len(), NUM_COLS as usize);
    }
    assert_eq!(h.calls(), NUM_KEYS as u64);

    let keys: Vec<_> = (1..=NUM_KEYS).map(key).collect();
    let multi = h.cache.get_multi_slice(&keys, &full, &tx)?;
    assert_eq!(multi.len(), NUM_KEYS as usize);
    assert_eq!(h.calls(), NUM_KEYS as u64);

    let counts = h.metrics.store("edgestore");
    assert_eq!(counts.retrievals, 3 * NUM_KEYS as u64);
    assert_eq!(counts.misses, NUM_KEYS as u64);
    assert_eq!(counts.hits(), 2 * NUM_KEYS as u64);
    Ok(())
}

#[test]
fn clearing_forces_fresh_reads() -> Result<()> {
    let h = Harness::load()?;
    let tx = h.tx()?;
    let full = slice(0, NUM_COLS + 1);
    for k in 1..=NUM_KEYS {
        h.cache.get_slice(&KeySliceQuery::new(key(k), full.clone()), &tx)?;
    }
    let before = h.calls();
    h.cache.clear_cache();
    assert_eq!(h.cache.cached_slices(), 0);

    let narrow = slice(3, 6);
    for k in 1..=NUM_KEYS {
        h.cache.get_slice(&KeySliceQuery::new(key(k), full.clone()), &tx)?;
        let got = h.cache.get_slice(&KeySliceQuery::new(key(k), narrow.clone()), &tx)?;
        assert_eq!(got.len(), 3);
        assert_eq!(got[0].column(), &StaticBuffer::from_u32(3));
    }
    let keys: Vec<_> = (1..=NUM_KEYS).map(key).collect();
    h.cache.get_multi_slice(&keys, &slice(1, 3), &tx)?;
    assert_eq!(h.calls(), before + NUM_KEYS as u64 * 2 + 1);
    assert_eq!(h.metrics.clears.load(Ordering::Relaxed), 1);
    Ok(())
}

#[test]
fn committed_write_expires_the_key() -> Result<()> {
    let h = Harness::load()?;
    let target = key(23);
    let q = KeySliceQuery::new(target.clone(), slice(0, 20));
    let reader = h.tx()?;
    assert_eq!(h.cache.get_slice(&q, &reader)?.len(), NUM_COLS as usize);
    h.counting.reset_counter();

    let mut writer = h.tx()?;
    h.cache.mutate_entries(
        target.clone(),
        vec![Entry::new(StaticBuffer::from_u32(15), StaticBuffer::from_u32(1))],
        vec![],
        &mut writer,
    )?;
    // the writer sees its own buffered change; other readers stay cached
    assert_eq!(h.cache.get_slice(&q, &writer)?.len(), NUM_COLS as usize + 1);
    assert_eq!(h.cache.get_slice(&q, &writer)?.len(), NUM_COLS as usize + 1);
    assert_eq!(h.cache.get_slice(&q, &reader)?.len(), NUM_COLS as usize);
    assert_eq!(h.calls(), 2);

    writer.commit()?;
    assert_eq!(h.cache.expired_keys(), 1);
    for _ in 0..2 {
        assert_eq!(h.cache.get_slice(&q, &reader)?.len(), NUM_COLS as usize + 1);
    }
    assert_eq!(h.calls(), 4);

    let stats = h.cache.force_clear_expired_cache();
    assert_eq!(stats.keys_cleared, 1);
    assert_eq!(stats.slices_removed, 1);
    for _ in 0..3 {
        h.cache.get_slice(&q, &reader)?;
    }
    assert_eq!(h.calls(), 5);

    let untouched = KeySliceQuery::new(key(24), slice(0, 20));
    h.cache.get_slice(&untouched, &reader)?;
    h.cache.get_slice(&untouched, &reader)?;
    assert_eq!(h.calls(), 6);
    Ok(())
}

#[test]
fn limits_are_part_of_the_cached_query() -> Result<()> {
    let h = Harness::load()?;
    let tx = h.tx()?;
    let base = KeySliceQuery::new(key(7), slice(0, NUM_COLS + 1));
    let ten = h.cache.get_slice(&base.clone().with_limit(10), &tx)?;
    let twenty = h.cache.get_slice(&base.clone().with_limit(20), &tx)?;
    assert_eq!(ten.len(), 10);
    assert_eq!(twenty.len(), 10);
    assert_eq!(h.calls(), 2);
    let five = h.cache.get_slice(&base.with_limit(5), &tx)?;
    assert_eq!(five.len(), 5);
    assert_eq!(five[4].value(), &StaticBuffer::from_u32(35));
    assert_eq!(h.calls(), 3);
    Ok(())
}

#[test]
fn multi_slice_mixes_hits_and_misses() -> Result<()> {
    let h = Harness::load()?;
    let tx = h.tx()?;
    let q = slice(2, 5);
    for k in (1..=NUM_KEYS).step_by(2) {
        h.cache.get_slice(&KeySliceQuery::new(key(k), q.clone()), &tx)?;
    }
    let before = h.calls();
    let mut keys: Vec<_> = (1..=NUM_KEYS).map(key).collect();
    keys.push(key(NUM_KEYS + 50));
    let multi = h.cache.get_multi_slice(&keys, &q, &tx)?;
    assert_eq!(h.calls(), before + 1);
    assert_eq!(multi.len(), keys.len());
    assert!(multi[&key(NUM_KEYS + 50)].is_empty());
    for k in 1..=NUM_KEYS {
        let entries = &multi[&key(k)];
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].value(), &StaticBuffer::from_u32(2 * k));
    }
    let again = h.cache.get_multi_slice(&keys, &q, &tx)?;
    assert_eq!(again.len(), keys.len());
    assert_eq!(h.calls(), before + 1);
    Ok(())
}

#[test]
fn invalidation_is_limited_to_the_mutated_key() -> Result<()> {
    let h = Harness::load()?;
    let reader = h.tx()?;
    let full = slice(0, NUM_COLS + 1);
    let q1 = KeySliceQuery::new(key(1), full.clone());
    let q2 = KeySliceQuery::new(key(2), full);
    for _ in 0..100 {
        h.cache.get_slice(&q1, &reader)?;
        h.cache.get_slice(&q2, &reader)?;
    }
    assert_eq!(h.calls(), 2);

    let mut writer = h.tx()?;
    h.cache.mutate_entries(key(1), vec![], vec![StaticBuffer::from_u32(1)], &mut writer)?;
    writer.commit()?;
    assert_eq!(h.cache.get_slice(&q2, &reader)?.len(), NUM_COLS as usize);
    assert_eq!(h.calls(), 2);
    assert_eq!(h.cache.get_slice(&q1, &reader)?.len(), NUM_COLS as usize - 1);
    assert_eq!(h.calls(), 3);
    Ok(())
}
