//! Reference in-memory backend.
//!
//! Rows live in ordered maps guarded by a `parking_lot` lock. Transactions are
//! no-ops: every mutation is visible as soon as it is applied.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use tracing::trace;

use crate::types::{PenumbraError, Result};

use super::buffer::{Entry, EntryList, StaticBuffer};
use super::query::{KeyRangeQuery, KeySliceQuery, SliceQuery};
use super::store::{
    KeyColumnValueStore, KeyEntries, KeyIterator, StoreManager, StoreMutations, StoreTransaction,
};

type Row = BTreeMap<StaticBuffer, Entry>;

#[derive(Debug, Default)]
pub struct InMemoryTransaction;

impl StoreTransaction for InMemoryTransaction {
    fn commit(&mut self) -> Result<()> {
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        Ok(())
    }
}

/// A single named store of ordered rows.
pub struct InMemoryStore {
    name: String,
    rows: RwLock<BTreeMap<StaticBuffer, Row>>,
}

impl InMemoryStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rows: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.read().len()
    }

    fn slice_of(row: Option<&Row>, query: &SliceQuery) -> EntryList {
        let Some(row) = row else {
            return EntryList::empty();
        };
        let entries = row
            .range((
                Bound::Included(query.start().clone()),
                Bound::Excluded(query.end().clone()),
            ))
            .take(query.limit())
            .map(|(_, e)| e.clone())
            .collect();
        EntryList::from_sorted(entries)
    }

    fn scan<F>(&self, query: &SliceQuery, mut include: F) -> KeyIterator
    where
        F: FnMut(&StaticBuffer) -> bool,
    {
        let rows = self.rows.read();
        let mut out = Vec::new();
        for (key, row) in rows.iter() {
            if !include(key) {
                continue;
            }
            let entries = Self::slice_of(Some(row), query);
            if !entries.is_empty() {
                out.push(Ok(KeyEntries {
                    key: key.clone(),
                    entries,
                }));
            }
        }
        Box::new(out.into_iter())
    }
}

impl KeyColumnValueStore for InMemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn get_slice(&self, query: &KeySliceQuery, _tx: &dyn StoreTransaction) -> Result<EntryList> {
        let rows = self.rows.read();
        Ok(Self::slice_of(rows.get(query.key()), query.slice()))
    }

    fn get_multi_slice(
        &self,
        keys: &[StaticBuffer],
        query: &SliceQuery,
        _tx: &dyn StoreTransaction,
    ) -> Result<FxHashMap<StaticBuffer, EntryList>> {
        let rows = self.rows.read();
        let mut out = FxHashMap::default();
        out.reserve(keys.len());
        for key in keys {
            out.insert(key.clone(), Self::slice_of(rows.get(key), query));
        }
        Ok(out)
    }

    fn mutate(
        &self,
        key: &StaticBuffer,
        additions: &[Entry],
        deletions: &[StaticBuffer],
        _tx: &dyn StoreTransaction,
    ) -> Result<()> {
        let mut rows = self.rows.write();
        let row = rows.entry(key.clone()).or_default();
        for column in deletions {
            row.remove(column);
        }
        for entry in additions {
            row.insert(entry.column().clone(), entry.clone());
        }
        if row.is_empty() {
            rows.remove(key);
        }
        trace!(
            store = %self.name,
            key = %key,
            additions = additions.len(),
            deletions = deletions.len(),
            "inmemory.mutate"
        );
        Ok(())
    }

    fn get_key_range(&self, query: &KeyRangeQuery, _tx: &dyn StoreTransaction) -> Result<KeyIterator> {
        Ok(self.scan(query.slice(), |key| query.contains_key(key)))
    }

    fn get_keys(&self, query: &SliceQuery, _tx: &dyn StoreTransaction) -> Result<KeyIterator> {
        Ok(self.scan(query, |_| true))
    }
}

/// Manager handing out [`InMemoryStore`]s by name.
#[derive(Default)]
pub struct InMemoryStoreManager {
    stores: Mutex<FxHashMap<String, Arc<InMemoryStore>>>,
}

impl InMemoryStoreManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// The concrete store, for tests that need to inspect rows directly.
    pub fn store(&self, name: &str) -> Arc<InMemoryStore> {
        let mut stores = self.stores.lock();
        Arc::clone(
            stores
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(InMemoryStore::new(name))),
        )
    }
}

impl StoreManager for InMemoryStoreManager {
    fn name(&self) -> &str {
        "inmemory"
    }

    fn open_database(&self, name: &str) -> Result<Arc<dyn KeyColumnValueStore>> {
        Ok(self.store(name))
    }

    fn begin_transaction(&self) -> Result<Box<dyn StoreTransaction>> {
        Ok(Box::new(InMemoryTransaction))
    }

    fn mutate_many(&self, mutations: &StoreMutations, tx: &dyn StoreTransaction) -> Result<()> {
        for (store_name, keys) in mutations {
            let store = self.store(store_name);
            for (key, mutation) in keys {
                store.mutate(key, mutation.additions(), mutation.deletions(), tx)?;
            }
        }
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.stores.lock().clear();
        Ok(())
    }
}

/// Failure to inject into the next read of a [`CountingStore`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum InjectedFailure {
    Temporary,
    Permanent,
}

/// Store wrapper counting slice reads, used to observe cache behaviour.
pub struct CountingStore {
    inner: Arc<dyn KeyColumnValueStore>,
    slice_calls: AtomicU64,
    keys_read: AtomicU64,
    pending_failures: AtomicUsize,
    failure: Mutex<Option<InjectedFailure>>,
}

impl CountingStore {
    pub fn new(inner: Arc<dyn KeyColumnValueStore>) -> Self {
        Self {
            inner,
            slice_calls: AtomicU64::new(0),
            keys_read: AtomicU64::new(0),
            pending_failures: AtomicUsize::new(0),
            failure: Mutex::new(None),
        }
    }

    /// Number of `get_slice` plus `get_multi_slice` calls so far.
    pub fn slice_calls(&self) -> u64 {
        self.slice_calls.load(Ordering::SeqCst)
    }

    /// Keys named by slice reads so far, one per `get_slice`.
    pub fn keys_read(&self) -> u64 {
        self.keys_read.load(Ordering::SeqCst)
    }

    pub fn reset_counter(&self) {
        self.slice_calls.store(0, Ordering::SeqCst);
        self.keys_read.store(0, Ordering::SeqCst);
    }

    /// Makes the next `times` slice reads fail with `failure`.
    pub fn fail_next(&self, failure: InjectedFailure, times: usize) {
        *self.failure.lock() = Some(failure);
        self.pending_failures.store(times, Ordering::SeqCst);
    }

    fn record_read(&self, keys: usize) -> Result<()> {
        self.slice_calls.fetch_add(1, Ordering::SeqCst);
        self.keys_read.fetch_add(keys as u64, Ordering::SeqCst);
        let remaining = self.pending_failures.load(Ordering::SeqCst);
        if remaining == 0 {
            return Ok(());
        }
        self.pending_failures.store(remaining - 1, Ordering::SeqCst);
        match *self.failure.lock() {
            Some(InjectedFailure::Temporary) => {
                Err(PenumbraError::TemporaryBackend("injected read timeout".into()))
            }
            Some(InjectedFailure::Permanent) => {
                Err(PenumbraError::PermanentBackend("injected read failure".into()))
            }
            None => Ok(()),
        }
    }
}

impl KeyColumnValueStore for CountingStore {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn get_slice(&self, query: &KeySliceQuery, tx: &dyn StoreTransaction) -> Result<EntryList> {
        self.record_read(1)?;
        self.inner.get_slice(query, tx)
    }

    fn get_multi_slice(
        &self,
        keys: &[StaticBuffer],
        query: &SliceQuery,
        tx: &dyn StoreTransaction,
    ) -> Result<FxHashMap<StaticBuffer, EntryList>> {
        self.record_read(keys.len())?;
        self.inner.get_multi_slice(keys, query, tx)
    }

    fn mutate(
        &self,
        key: &StaticBuffer,
        additions: &[Entry],
        deletions: &[StaticBuffer],
        tx: &dyn StoreTransaction,
    ) -> Result<()> {
        self.inner.mutate(key, additions, deletions, tx)
    }

    fn get_key_range(&self, query: &KeyRangeQuery, tx: &dyn StoreTransaction) -> Result<KeyIterator> {
        self.inner.get_key_range(query, tx)
    }

    fn get_keys(&self, query: &SliceQuery, tx: &dyn StoreTransaction) -> Result<KeyIterator> {
        self.inner.get_keys(query, tx)
    }
}
