//! Contracts consumed from storage backends.
//!
//! A backend exposes its rows through [`KeyColumnValueStore`] and groups them
//! under a [`StoreManager`] that hands out transactions and applies batched
//! mutations. Every method may fail with a temporary or permanent backend
//! error; callers above this layer decide whether to retry.

use std::collections::BTreeMap;
use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::types::Result;

use super::buffer::{Entry, EntryList, StaticBuffer};
use super::query::{KeyRangeQuery, KeySliceQuery, SliceQuery};

/// Backend transaction handle.
pub trait StoreTransaction: Send + Sync {
    fn commit(&mut self) -> Result<()>;
    fn rollback(&mut self) -> Result<()>;
}

/// A row key together with the entries matching the scan's slice.
#[derive(Clone, Debug)]
pub struct KeyEntries {
    pub key: StaticBuffer,
    pub entries: EntryList,
}

/// Lazily produced rows of a key scan.
pub type KeyIterator = Box<dyn Iterator<Item = Result<KeyEntries>> + Send>;

/// An ordered key-column-value store.
pub trait KeyColumnValueStore: Send + Sync {
    /// Unique store name used to open it through its manager.
    fn name(&self) -> &str;

    /// Entries of one row within the query's slice, at most `limit` of them.
    fn get_slice(&self, query: &KeySliceQuery, tx: &dyn StoreTransaction) -> Result<EntryList>;

    /// The same slice for several rows. Every requested key is present in the
    /// result, with an empty list when the row does not exist.
    fn get_multi_slice(
        &self,
        keys: &[StaticBuffer],
        query: &SliceQuery,
        tx: &dyn StoreTransaction,
    ) -> Result<FxHashMap<StaticBuffer, EntryList>>;

    /// Applies `deletions` and then `additions` to one row.
    fn mutate(
        &self,
        key: &StaticBuffer,
        additions: &[Entry],
        deletions: &[StaticBuffer],
        tx: &dyn StoreTransaction,
    ) -> Result<()>;

    /// Rows whose key falls in the query's key range and that have at least
    /// one column in its slice.
    fn get_key_range(&self, query: &KeyRangeQuery, tx: &dyn StoreTransaction) -> Result<KeyIterator>;

    /// Every row with at least one column in `query`.
    fn get_keys(&self, query: &SliceQuery, tx: &dyn StoreTransaction) -> Result<KeyIterator>;

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Buffered changes to one row.
///
/// Deletions are applied before additions when persisted, so a column that
/// is both deleted and added ends up holding the added value.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KcvMutation {
    additions: Vec<Entry>,
    deletions: Vec<StaticBuffer>,
}

impl KcvMutation {
    pub fn new(additions: Vec<Entry>, deletions: Vec<StaticBuffer>) -> Self {
        Self {
            additions,
            deletions,
        }
    }

    pub fn additions(&self) -> &[Entry] {
        &self.additions
    }

    pub fn deletions(&self) -> &[StaticBuffer] {
        &self.deletions
    }

    pub fn is_empty(&self) -> bool {
        self.additions.is_empty() && self.deletions.is_empty()
    }

    pub fn total_mutations(&self) -> usize {
        self.additions.len() + self.deletions.len()
    }

    /// Folds a later mutation of the same row into this one.
    ///
    /// A later deletion cancels an earlier addition of that column; a later
    /// addition replaces an earlier addition of that column.
    pub fn merge(&mut self, later: KcvMutation) {
        if !later.deletions.is_empty() {
            let deleted: FxHashSet<&StaticBuffer> = later.deletions.iter().collect();
            self.additions.retain(|e| !deleted.contains(e.column()));
        }
        if !later.additions.is_empty() {
            let added: FxHashSet<&StaticBuffer> = later.additions.iter().map(Entry::column).collect();
            self.additions.retain(|e| !added.contains(e.column()));
        }
        self.deletions.extend(later.deletions);
        self.additions.extend(later.additions);
    }

    /// Drops redundant operations: repeated deletions, deletions shadowed by
    /// an addition, and all but the last addition of each column.
    pub fn consolidate(&mut self) {
        let mut seen = FxHashSet::default();
        let mut additions = Vec::with_capacity(self.additions.len());
        for entry in self.additions.drain(..).rev() {
            if seen.insert(entry.column().clone()) {
                additions.push(entry);
            }
        }
        additions.reverse();
        self.additions = additions;

        let mut deleted = FxHashSet::default();
        self.deletions
            .retain(|col| !seen.contains(col) && deleted.insert(col.clone()));
    }

    /// Applies this mutation over `base`, returning the merged row restricted
    /// to `slice`.
    pub fn overlay(&self, base: &[Entry], slice: &SliceQuery) -> EntryList {
        let deleted: FxHashSet<&StaticBuffer> = self.deletions.iter().collect();
        let mut merged: BTreeMap<StaticBuffer, Entry> = base
            .iter()
            .filter(|e| !deleted.contains(e.column()))
            .map(|e| (e.column().clone(), e.clone()))
            .collect();
        for entry in &self.additions {
            merged.insert(entry.column().clone(), entry.clone());
        }
        let rows: Vec<Entry> = merged.into_values().collect();
        slice.apply(&rows)
    }
}

/// Mutations of one store keyed by row.
pub type KeyMutations = FxHashMap<StaticBuffer, KcvMutation>;

/// Mutations across stores keyed by store name.
pub type StoreMutations = BTreeMap<String, KeyMutations>;

/// Owner of a backend's stores and transactions.
pub trait StoreManager: Send + Sync {
    fn name(&self) -> &str;

    /// Opens (creating on first use) the store called `name`.
    fn open_database(&self, name: &str) -> Result<Arc<dyn KeyColumnValueStore>>;

    fn begin_transaction(&self) -> Result<Box<dyn StoreTransaction>>;

    /// Persists a batch of mutations across stores.
    fn mutate_many(&self, mutations: &StoreMutations, tx: &dyn StoreTransaction) -> Result<()>;

    fn close(&self) -> Result<()> {
        Ok(())
    }
}
