//! Per-graph schema registry.

use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::storage::{CacheTransaction, KcvsCache};
use crate::types::{Direction, PenumbraError, Result, SchemaId};

use super::codec;
use super::definition::{TypeDefinitionCategory, TypeDefinitionDescription};
use super::index::IndexType;
use super::relation_type::RelationType;
use super::source::{SchemaCategory, SchemaEdge, SchemaResolver, SchemaSource, SchemaVertex};

/// Relation type lookups needed to plan vertex-centric queries.
pub trait TypeInspector: Send + Sync {
    fn relation_type(&self, id: SchemaId) -> Result<Arc<RelationType>>;

    fn relation_type_by_name(&self, name: &str) -> Result<Option<Arc<RelationType>>>;

    /// `ty` itself followed by the relation indexes defined over it.
    fn relation_indexes(&self, ty: &RelationType) -> Result<Vec<Arc<RelationType>>>;
}

#[derive(Default)]
struct Vertices {
    by_id: FxHashMap<SchemaId, Arc<SchemaVertex>>,
    by_name: FxHashMap<String, SchemaId>,
}

/// Schema vertices by id and name.
#[derive(Default)]
pub struct SchemaTable {
    inner: RwLock<Vertices>,
}

impl SchemaTable {
    pub fn get(&self, id: SchemaId) -> Option<Arc<SchemaVertex>> {
        self.inner.read().by_id.get(&id).cloned()
    }

    pub fn id_of(&self, name: &str) -> Option<SchemaId> {
        self.inner.read().by_name.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.inner.read().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert(&self, vertex: SchemaVertex) -> Result<()> {
        let mut inner = self.inner.write();
        if let Some(owner) = inner.by_name.get(vertex.name()) {
            if *owner != vertex.id() {
                return Err(PenumbraError::invalid(format!(
                    "schema name {} already used by {owner}",
                    vertex.name()
                )));
            }
        }
        if let Some(previous) = inner.by_id.get(&vertex.id()).cloned() {
            inner.by_name.remove(previous.name());
        }
        inner.by_name.insert(vertex.name().to_string(), vertex.id());
        inner.by_id.insert(vertex.id(), Arc::new(vertex));
        Ok(())
    }

    fn update<F>(&self, id: SchemaId, f: F) -> Result<()>
    where
        F: FnOnce(&mut SchemaVertex),
    {
        let mut inner = self.inner.write();
        let current = inner
            .by_id
            .get_mut(&id)
            .ok_or(PenumbraError::NotFound("schema vertex"))?;
        f(Arc::make_mut(current));
        Ok(())
    }

    /// Every schema id, ascending.
    pub fn ids(&self) -> Vec<SchemaId> {
        let mut ids: Vec<SchemaId> = self.inner.read().by_id.keys().copied().collect();
        ids.sort();
        ids
    }
}

impl SchemaResolver for SchemaTable {
    fn schema(&self, id: SchemaId) -> Option<Arc<dyn SchemaSource>> {
        self.get(id).map(|v| v as Arc<dyn SchemaSource>)
    }
}

/// Schema of one graph instance: the schema vertices plus the relation type
/// and index objects derived from them.
///
/// Derived objects are cached until [`invalidate`](Self::invalidate) or
/// [`reset_caches`](Self::reset_caches) is called after a schema change.
pub struct SchemaRegistry {
    table: Arc<SchemaTable>,
    relation_types: RwLock<FxHashMap<SchemaId, Arc<RelationType>>>,
    indexes: RwLock<FxHashMap<SchemaId, Arc<IndexType>>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self {
            table: Arc::new(SchemaTable::default()),
            relation_types: RwLock::new(FxHashMap::default()),
            indexes: RwLock::new(FxHashMap::default()),
        }
    }

    /// Builds a registry from every schema row in `cache`.
    pub fn load(cache: &KcvsCache, tx: &CacheTransaction) -> Result<Self> {
        let registry = Self::new();
        let vertices = codec::read_all(cache, tx)?;
        let count = vertices.len();
        for vertex in vertices {
            registry.table.insert(vertex)?;
        }
        debug!(store = cache.name(), vertices = count, "schema.registry.load");
        Ok(registry)
    }

    /// Buffers the rows of the given schema vertices in `tx`.
    pub fn persist(
        &self,
        cache: &Arc<KcvsCache>,
        ids: &[SchemaId],
        tx: &mut CacheTransaction,
    ) -> Result<()> {
        for id in ids {
            let vertex = self.table.get(*id).ok_or(PenumbraError::NotFound("schema vertex"))?;
            codec::write_vertex(cache, &vertex, tx)?;
        }
        Ok(())
    }

    pub fn table(&self) -> &Arc<SchemaTable> {
        &self.table
    }

    pub fn vertex(&self, id: SchemaId) -> Option<Arc<SchemaVertex>> {
        self.table.get(id)
    }

    pub fn id_of(&self, name: &str) -> Option<SchemaId> {
        self.table.id_of(name)
    }

    /// Adds or replaces a schema vertex.
    pub fn define(&self, vertex: SchemaVertex) -> Result<()> {
        let id = vertex.id();
        self.table.insert(vertex)?;
        self.invalidate(id);
        Ok(())
    }

    /// Adds a schema edge from `from` to `to`, recorded on both endpoints.
    pub fn connect(
        &self,
        from: SchemaId,
        to: SchemaId,
        description: TypeDefinitionDescription,
    ) -> Result<()> {
        if self.table.get(to).is_none() {
            return Err(PenumbraError::NotFound("schema vertex"));
        }
        let inverse = SchemaEdge {
            other: from,
            direction: Direction::In,
            description: description.clone(),
        };
        self.table.update(from, |v| {
            v.add_edge(SchemaEdge {
                other: to,
                direction: Direction::Out,
                description,
            })
        })?;
        self.table.update(to, |v| v.add_edge(inverse))?;
        self.invalidate(from);
        self.invalidate(to);
        Ok(())
    }

    pub fn index(&self, id: SchemaId) -> Result<Arc<IndexType>> {
        if let Some(index) = self.indexes.read().get(&id) {
            return Ok(Arc::clone(index));
        }
        let source = self
            .table
            .schema(id)
            .ok_or(PenumbraError::NotFound("index"))?;
        let resolver: Arc<dyn SchemaResolver> = self.table.clone();
        let index = Arc::new(IndexType::new(source, resolver)?);
        let mut indexes = self.indexes.write();
        Ok(Arc::clone(indexes.entry(id).or_insert(index)))
    }

    pub fn index_by_name(&self, name: &str) -> Result<Option<Arc<IndexType>>> {
        match self.table.id_of(name) {
            Some(id) if self.is_index(id) => self.index(id).map(Some),
            _ => Ok(None),
        }
    }

    /// Every graph index, ordered by id.
    pub fn indexes(&self) -> Result<Vec<Arc<IndexType>>> {
        self.table
            .ids()
            .into_iter()
            .filter(|id| self.is_index(*id))
            .map(|id| self.index(id))
            .collect()
    }

    fn is_index(&self, id: SchemaId) -> bool {
        self.table
            .get(id)
            .is_some_and(|v| v.category().is_index())
    }

    /// Drops the derived objects of `id` and of the relation indexes built
    /// over it. Outstanding handles keep their stale state.
    pub fn invalidate(&self, id: SchemaId) {
        self.indexes.write().remove(&id);
        self.relation_types
            .write()
            .retain(|key, ty| *key != id && ty.base_type() != Some(id));
        debug!(schema = %id, "schema.registry.invalidate");
    }

    /// Resets every index wrapper and drops all cached relation types.
    pub fn reset_caches(&self) {
        for index in self.indexes.read().values() {
            index.reset_cache();
        }
        self.relation_types.write().clear();
        debug!("schema.registry.reset_caches");
    }

    fn build_relation_type(&self, source: &SchemaVertex) -> Result<RelationType> {
        if source.category() != SchemaCategory::RelationIndex {
            return RelationType::from_source(source);
        }
        let base = source
            .related(TypeDefinitionCategory::RelationTypeIndex, Direction::In)
            .first()
            .map(|edge| edge.other)
            .ok_or_else(|| {
                PenumbraError::schema(format!(
                    "relation index {} has no indexed type",
                    source.name()
                ))
            })?;
        let base = self.relation_type(base)?;
        RelationType::index_from_source(source, &base)
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeInspector for SchemaRegistry {
    fn relation_type(&self, id: SchemaId) -> Result<Arc<RelationType>> {
        if let Some(ty) = self.relation_types.read().get(&id) {
            return Ok(Arc::clone(ty));
        }
        let vertex = self
            .table
            .get(id)
            .ok_or(PenumbraError::NotFound("relation type"))?;
        let ty = Arc::new(self.build_relation_type(&vertex)?);
        let mut types = self.relation_types.write();
        Ok(Arc::clone(types.entry(id).or_insert(ty)))
    }

    fn relation_type_by_name(&self, name: &str) -> Result<Option<Arc<RelationType>>> {
        let Some(id) = self.table.id_of(name) else {
            return Ok(None);
        };
        match self.table.get(id) {
            Some(v) if v.category().is_relation_type() => self.relation_type(id).map(Some),
            _ => Ok(None),
        }
    }

    fn relation_indexes(&self, ty: &RelationType) -> Result<Vec<Arc<RelationType>>> {
        let vertex = self
            .table
            .get(ty.id())
            .ok_or(PenumbraError::NotFound("relation type"))?;
        let mut out = vec![self.relation_type(ty.id())?];
        for edge in vertex.related(TypeDefinitionCategory::RelationTypeIndex, Direction::Out) {
            out.push(self.relation_type(edge.other)?);
        }
        Ok(out)
    }
}
