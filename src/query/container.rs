//! Batches of named vertex-centric queries planned against one schema.
//!
//! Queries added to a [`QueryContainer`] are planned immediately; the
//! container keeps the union of their slice queries so a caller can fetch
//! every slice once and hand each result to the queries that asked for it.

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use crate::schema::{SortOrder, TypeInspector};
use crate::storage::SliceQuery;
use crate::types::{ensure, Direction, Result, VertexId};

use super::condition::Condition;
use super::value::{Predicate, Value};
use super::vertex::{BaseVertexCentricQuery, VertexCentricQueryBuilder};
use super::{QueryLimits, RelationCategory};

/// Slice limit for queries whose results are filtered in memory.
pub const DEFAULT_HARD_QUERY_LIMIT: usize = 100_000;

/// A planned, named query. Two queries are equal when they ask for the same
/// category over the same slices. Queries without slices may be added any
/// number of times.
#[derive(Clone, Debug)]
pub struct Query {
    name: String,
    category: RelationCategory,
    slices: Vec<SliceQuery>,
    plan: BaseVertexCentricQuery,
}

impl Query {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> RelationCategory {
        self.category
    }

    /// Backend slices with their final limits applied.
    pub fn slices(&self) -> &[SliceQuery] {
        &self.slices
    }

    pub fn plan(&self) -> &BaseVertexCentricQuery {
        &self.plan
    }
}

impl PartialEq for Query {
    fn eq(&self, other: &Self) -> bool {
        self.category == other.category && self.slices == other.slices
    }
}

impl Eq for Query {}

impl Hash for Query {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.category.hash(state);
        self.slices.hash(state);
    }
}

#[derive(Default)]
struct ContainerState {
    queries: Vec<Arc<Query>>,
    names: FxHashSet<String>,
    by_slice: FxHashMap<SliceQuery, Vec<Arc<Query>>>,
    slices: Vec<SliceQuery>,
}

/// Collects queries and indexes them by the slices they read.
pub struct QueryContainer {
    inspector: Arc<dyn TypeInspector>,
    limits: QueryLimits,
    hard_limit: usize,
    has_modifications: bool,
    state: Mutex<ContainerState>,
}

impl QueryContainer {
    pub fn new(inspector: Arc<dyn TypeInspector>, limits: QueryLimits) -> Self {
        Self {
            inspector,
            hard_limit: limits.hard_max_limit,
            limits,
            has_modifications: false,
            state: Mutex::new(ContainerState::default()),
        }
    }

    /// Overrides the limit of slices that need filtering.
    pub fn with_hard_limit(mut self, limit: usize) -> Self {
        self.hard_limit = limit.max(1);
        self
    }

    /// Plans subsequent queries for a transaction with uncommitted changes.
    pub fn tx_modified(mut self, modified: bool) -> Self {
        self.has_modifications = modified;
        self
    }

    pub fn hard_limit(&self) -> usize {
        self.hard_limit
    }

    /// Starts a new query; it is planned and registered by one of the
    /// builder's terminal methods.
    pub fn add_query(&self) -> QueryBuilder<'_> {
        let inner = VertexCentricQueryBuilder::new(self.inspector.as_ref())
            .limits(self.limits)
            .tx_modified(self.has_modifications);
        QueryBuilder {
            container: self,
            name: None,
            inner,
        }
    }

    /// Registered queries in insertion order.
    pub fn queries(&self) -> Vec<Arc<Query>> {
        self.state.lock().queries.clone()
    }

    /// Queries reading `slice`.
    pub fn queries_for(&self, slice: &SliceQuery) -> Vec<Arc<Query>> {
        self.state
            .lock()
            .by_slice
            .get(slice)
            .cloned()
            .unwrap_or_default()
    }

    /// Distinct slices of all registered queries, in first-use order.
    pub fn get_slice_queries(&self) -> Vec<SliceQuery> {
        self.state.lock().slices.clone()
    }

    fn register(
        &self,
        name: Option<String>,
        category: RelationCategory,
        plan: BaseVertexCentricQuery,
    ) -> Result<Arc<Query>> {
        let slices: Vec<SliceQuery> = plan
            .sub_queries()
            .iter()
            .map(|holder| {
                let limit = if holder.fitted {
                    plan.limit()
                } else {
                    self.hard_limit
                };
                holder.query.update_limit(limit)
            })
            .collect();
        let mut state = self.state.lock();
        let name = name.unwrap_or_else(|| format!("query${}", state.queries.len()));
        ensure!(!state.names.contains(&name), "a query named {name} already exists");
        let query = Arc::new(Query {
            name,
            category,
            slices,
            plan,
        });
        // queries planned to nothing read no slices and never collide
        ensure!(
            query.slices.is_empty() || !state.queries.iter().any(|q| **q == *query),
            "query {} duplicates an existing query",
            query.name
        );
        let state = &mut *state;
        for slice in &query.slices {
            let readers = state.by_slice.entry(slice.clone()).or_default();
            if readers.is_empty() {
                state.slices.push(slice.clone());
            }
            readers.push(Arc::clone(&query));
        }
        state.names.insert(query.name.clone());
        state.queries.push(Arc::clone(&query));
        debug!(
            name = %query.name,
            slices = query.slices.len(),
            distinct = state.slices.len(),
            "query.container.added"
        );
        Ok(query)
    }
}

/// Builds one query of a [`QueryContainer`].
pub struct QueryBuilder<'c> {
    container: &'c QueryContainer,
    name: Option<String>,
    inner: VertexCentricQueryBuilder<'c>,
}

impl<'c> QueryBuilder<'c> {
    /// Names the query. Defaults to the queried type when exactly one is
    /// given, otherwise to `query$N`.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn direction(mut self, dir: Direction) -> Self {
        self.inner = self.inner.direction(dir);
        self
    }

    pub fn types<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inner = self.inner.types(names);
        self
    }

    pub fn type_name(self, name: impl Into<String>) -> Self {
        self.types([name.into()])
    }

    pub fn has(
        mut self,
        key: impl Into<String>,
        predicate: impl Into<Predicate>,
        value: impl Into<Value>,
    ) -> Self {
        self.inner = self.inner.has(key, predicate, value);
        self
    }

    pub fn has_not(mut self, key: impl Into<String>) -> Self {
        self.inner = self.inner.has_not(key);
        self
    }

    pub fn has_key(mut self, key: impl Into<String>) -> Self {
        self.inner = self.inner.has_key(key);
        self
    }

    pub fn has_any(mut self, key: impl Into<String>, values: Vec<Value>) -> Self {
        self.inner = self.inner.has_any(key, values);
        self
    }

    pub fn condition(mut self, condition: Condition) -> Self {
        self.inner = self.inner.condition(condition);
        self
    }

    pub fn order_by(mut self, key: impl Into<String>, order: SortOrder) -> Self {
        self.inner = self.inner.order_by(key, order);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.inner = self.inner.limit(limit);
        self
    }

    pub fn adjacent(mut self, vertex: VertexId) -> Self {
        self.inner = self.inner.adjacent(vertex);
        self
    }

    pub fn edges(self) -> Result<Arc<Query>> {
        self.finish(RelationCategory::Edge)
    }

    pub fn properties(self) -> Result<Arc<Query>> {
        self.finish(RelationCategory::Property)
    }

    pub fn relations(self) -> Result<Arc<Query>> {
        self.finish(RelationCategory::Relation)
    }

    fn finish(self, category: RelationCategory) -> Result<Arc<Query>> {
        let name = match self.name {
            Some(name) => {
                ensure!(!name.trim().is_empty(), "query names must not be blank");
                Some(name)
            }
            None => self.inner.single_type().map(str::to_string),
        };
        let plan = self.inner.build(category)?;
        self.container.register(name, category, plan)
    }
}
