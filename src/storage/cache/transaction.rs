use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::storage::backend_op;
use crate::storage::buffer::{Entry, StaticBuffer};
use crate::storage::options::TransactionOptions;
use crate::storage::store::{
    KcvMutation, KeyMutations, StoreManager, StoreMutations, StoreTransaction,
};
use crate::types::Result;

use super::KcvsCache;

struct PendingStore {
    cache: Arc<KcvsCache>,
    keys: KeyMutations,
}

/// Write buffer wrapping a backend transaction.
///
/// Mutations issued through [`KcvsCache::mutate_entries`] accumulate here,
/// grouped per store and row. A flush persists them through the store
/// manager in chunks of `buffer_size` mutations and then invalidates every
/// written key in its cache.
pub struct CacheTransaction {
    tx: Box<dyn StoreTransaction>,
    manager: Arc<dyn StoreManager>,
    opts: TransactionOptions,
    mutations: BTreeMap<String, PendingStore>,
    num_mutations: usize,
}

impl CacheTransaction {
    pub fn new(
        tx: Box<dyn StoreTransaction>,
        manager: Arc<dyn StoreManager>,
        opts: TransactionOptions,
    ) -> Self {
        Self {
            tx,
            manager,
            opts,
            mutations: BTreeMap::new(),
            num_mutations: 0,
        }
    }

    /// Opens a backend transaction on `manager` and wraps it.
    pub fn begin(manager: Arc<dyn StoreManager>, opts: TransactionOptions) -> Result<Self> {
        let tx = manager.begin_transaction()?;
        Ok(Self::new(tx, manager, opts))
    }

    /// The wrapped backend transaction.
    pub fn store_tx(&self) -> &dyn StoreTransaction {
        self.tx.as_ref()
    }

    pub fn options(&self) -> &TransactionOptions {
        &self.opts
    }

    pub fn has_mutations(&self) -> bool {
        self.num_mutations > 0
    }

    /// Buffered addition and deletion count.
    pub fn num_mutations(&self) -> usize {
        self.num_mutations
    }

    /// Buffered changes to `key` in the store called `store`, if any.
    pub fn pending(&self, store: &str, key: &StaticBuffer) -> Option<&KcvMutation> {
        self.mutations
            .get(store)
            .and_then(|pending| pending.keys.get(key))
            .filter(|m| !m.is_empty())
    }

    pub(crate) fn mutate(
        &mut self,
        cache: &Arc<KcvsCache>,
        key: StaticBuffer,
        additions: Vec<Entry>,
        deletions: Vec<StaticBuffer>,
    ) -> Result<()> {
        let mutation = KcvMutation::new(additions, deletions);
        let added = mutation.total_mutations();
        if added == 0 {
            return Ok(());
        }
        let pending = self
            .mutations
            .entry(cache.name().to_string())
            .or_insert_with(|| PendingStore {
                cache: Arc::clone(cache),
                keys: KeyMutations::default(),
            });
        match pending.keys.get_mut(&key) {
            Some(existing) => existing.merge(mutation),
            None => {
                pending.keys.insert(key, mutation);
            }
        }
        self.num_mutations += added;
        if self.opts.continuous_persistence && self.num_mutations >= self.opts.buffer_size {
            self.flush_internal()?;
        }
        Ok(())
    }

    /// Persists all buffered mutations without ending the transaction.
    pub fn flush(&mut self) -> Result<()> {
        self.flush_internal()
    }

    /// Flushes, then commits the backend transaction.
    pub fn commit(&mut self) -> Result<()> {
        self.flush_internal()?;
        self.tx.commit()
    }

    /// Discards buffered mutations and rolls the backend transaction back.
    pub fn rollback(&mut self) -> Result<()> {
        self.clear();
        self.tx.rollback()
    }

    fn clear(&mut self) {
        self.mutations.clear();
        self.num_mutations = 0;
    }

    fn flush_internal(&mut self) -> Result<()> {
        if self.num_mutations == 0 {
            return Ok(());
        }
        let chunk_size = self.opts.buffer_size.max(1);
        let mut chunk = StoreMutations::new();
        let mut chunk_count = 0usize;
        let mut persisted = 0usize;
        let outcome = (|| -> Result<()> {
            for (name, pending) in &self.mutations {
                let store_total: usize = pending.keys.values().map(KcvMutation::total_mutations).sum();
                if store_total == 0 {
                    continue;
                }
                if store_total * 2 <= chunk_size * 3 {
                    if chunk_count > 0 && chunk_count + store_total > chunk_size {
                        self.persist(&mut chunk)?;
                        persisted += 1;
                        chunk_count = 0;
                    }
                    let target = chunk.entry(name.clone()).or_default();
                    for (key, mutation) in &pending.keys {
                        if let Some(m) = consolidated(mutation) {
                            target.insert(key.clone(), m);
                        }
                    }
                    chunk_count += store_total;
                    continue;
                }
                // Too large for one chunk: split the store's batch by key.
                for (key, mutation) in &pending.keys {
                    let Some(m) = consolidated(mutation) else {
                        continue;
                    };
                    chunk_count += mutation.total_mutations();
                    chunk.entry(name.clone()).or_default().insert(key.clone(), m);
                    if chunk_count >= chunk_size {
                        self.persist(&mut chunk)?;
                        persisted += 1;
                        chunk_count = 0;
                    }
                }
            }
            if chunk_count > 0 {
                self.persist(&mut chunk)?;
                persisted += 1;
            }
            Ok(())
        })();

        // Written keys are invalidated even on failure: earlier chunks may
        // already be durable.
        for pending in self.mutations.values() {
            for key in pending.keys.keys() {
                pending.cache.invalidate(key);
            }
        }
        outcome?;
        debug!(
            stores = self.mutations.len(),
            mutations = self.num_mutations,
            chunks = persisted,
            "cache_tx.flush"
        );
        self.clear();
        Ok(())
    }

    fn persist(&self, chunk: &mut StoreMutations) -> Result<()> {
        backend_op::execute(
            "cache_tx.persist",
            self.opts.write_attempts,
            self.opts.write_wait,
            || self.manager.mutate_many(&*chunk, self.tx.as_ref()),
        )?;
        chunk.clear();
        Ok(())
    }
}

fn consolidated(mutation: &KcvMutation) -> Option<KcvMutation> {
    let mut m = mutation.clone();
    m.consolidate();
    (!m.is_empty()).then_some(m)
}

impl StoreTransaction for CacheTransaction {
    fn commit(&mut self) -> Result<()> {
        CacheTransaction::commit(self)
    }

    fn rollback(&mut self) -> Result<()> {
        CacheTransaction::rollback(self)
    }
}
