#![allow(missing_docs)]

use std::sync::Arc;
use std::time::Duration;

use penumbra::storage::inmemory::InMemoryStoreManager;
use penumbra::storage::{
    CacheOptions, CacheTransaction, Entry, KcvsCache, KeySliceQuery, SliceQuery, StaticBuffer,
    StoreManager, TransactionOptions,
};
use penumbra::types::Result;

fn entry(col: u32, val: u32) -> Entry {
    Entry::new(StaticBuffer::from_u32(col), StaticBuffer::from_u32(val))
}

fn everything(key: u32) -> KeySliceQuery {
    KeySliceQuery::new(
        StaticBuffer::from_u32(key),
        SliceQuery::new(StaticBuffer::from_u32(0), StaticBuffer::from_u32(u32::MAX)),
    )
}

fn open(manager: &Arc<InMemoryStoreManager>, name: &str) -> Result<Arc<KcvsCache>> {
    let opts = CacheOptions::new()
        .cache_time(Duration::from_secs(600))
        .clean_wait(Duration::ZERO);
    Ok(Arc::new(KcvsCache::new(manager.open_database(name)?, &opts)))
}

fn begin(manager: &Arc<InMemoryStoreManager>, opts: TransactionOptions) -> Result<CacheTransaction> {
    let manager: Arc<dyn StoreManager> = manager.clone();
    CacheTransaction::begin(manager, opts)
}

#[test]
fn commit_spans_stores_and_refreshes_both_caches() -> Result<()> {
    let manager = Arc::new(InMemoryStoreManager::new());
    let edges = open(&manager, "edgestore")?;
    let index = open(&manager, "graphindex")?;
    let reader = begin(&manager, TransactionOptions::new())?;
    assert!(edges.get_slice(&everything(1), &reader)?.is_empty());
    assert!(index.get_slice(&everything(9), &reader)?.is_empty());

    let mut tx = begin(&manager, TransactionOptions::new().buffer_size(2))?;
    for col in 0..5 {
        edges.mutate_entries(StaticBuffer::from_u32(1), vec![entry(col, col)], vec![], &mut tx)?;
    }
    index.mutate_entries(StaticBuffer::from_u32(9), vec![entry(1, 1)], vec![], &mut tx)?;
    assert_eq!(tx.num_mutations(), 6);
    assert!(edges.get_slice(&everything(1), &reader)?.is_empty());

    tx.commit()?;
    assert!(!tx.has_mutations());
    assert_eq!(edges.get_slice(&everything(1), &reader)?.len(), 5);
    assert_eq!(index.get_slice(&everything(9), &reader)?.len(), 1);
    assert_eq!(manager.store("edgestore").row_count(), 1);
    Ok(())
}

#[test]
fn continuous_persistence_is_visible_before_commit() -> Result<()> {
    let manager = Arc::new(InMemoryStoreManager::new());
    let edges = open(&manager, "edgestore")?;
    let opts = TransactionOptions::new()
        .buffer_size(3)
        .continuous_persistence(true);
    let mut tx = begin(&manager, opts)?;
    let reader = begin(&manager, TransactionOptions::new())?;
    for col in 0..3 {
        edges.mutate_entries(StaticBuffer::from_u32(4), vec![entry(col, col)], vec![], &mut tx)?;
    }
    assert_eq!(tx.num_mutations(), 0);
    assert_eq!(edges.get_slice(&everything(4), &reader)?.len(), 3);

    edges.mutate_entries(StaticBuffer::from_u32(4), vec![], vec![StaticBuffer::from_u32(0)], &mut tx)?;
    assert_eq!(pending_len(&tx, 4), 1);
    tx.rollback()?;
    assert_eq!(edges.get_slice(&everything(4), &reader)?.len(), 3);
    Ok(())
}

fn pending_len(tx: &CacheTransaction, key: u32) -> usize {
    tx.pending("edgestore", &StaticBuffer::from_u32(key))
        .map_or(0, |m| m.total_mutations())
}
