//! Composite and mixed graph index definitions.
//!
//! An index wraps its schema vertex and derives field keys, cardinality, and
//! the other definition values on first access. Derived data is cached per
//! index object until [`IndexType::reset_cache`] is called.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::types::{Direction, PenumbraError, Result, SchemaId};

use super::definition::{
    Cardinality, ConsistencyModifier, ElementCategory, Mapping, Parameter, SchemaStatus,
    TypeDefinitionCategory, TypeDefinitionDescription,
};
use super::lazy::ResettableLazy;
use super::relation_type::RelationType;
use super::source::{SchemaCategory, SchemaResolver, SchemaSource};

/// A property key taking part in an index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexField {
    pub key: Arc<RelationType>,
    pub status: SchemaStatus,
}

/// A mixed index field together with its analysis parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParameterIndexField {
    pub field: IndexField,
    pub mapping: Mapping,
    pub parameters: Vec<Parameter>,
}

impl ParameterIndexField {
    pub fn key(&self) -> &Arc<RelationType> {
        &self.field.key
    }

    pub fn status(&self) -> SchemaStatus {
        self.field.status
    }
}

/// State shared by both index kinds.
struct IndexBase {
    source: Arc<dyn SchemaSource>,
    resolver: Arc<dyn SchemaResolver>,
    schema_constraint: ResettableLazy<Option<String>>,
}

impl IndexBase {
    fn name(&self) -> &str {
        self.source.name()
    }

    /// Resolves the index's field edges into an array ordered by their
    /// position parameter.
    fn ordered_fields<F, T>(&self, mut build: F) -> Result<Vec<T>>
    where
        F: FnMut(IndexField, &TypeDefinitionDescription) -> Result<T>,
    {
        let edges = self
            .source
            .related(TypeDefinitionCategory::IndexField, Direction::Out);
        let count = edges.len();
        let mut slots: Vec<Option<T>> = (0..count).map(|_| None).collect();
        for edge in edges {
            let position = edge.description.index_position()?.ok_or_else(|| {
                PenumbraError::schema(format!(
                    "index {}: field {} has no position",
                    self.name(),
                    edge.other
                ))
            })?;
            let slot = usize::try_from(position)
                .ok()
                .and_then(|pos| slots.get_mut(pos))
                .ok_or_else(|| {
                    PenumbraError::schema(format!(
                        "index {}: field position {position} outside 0..{count}",
                        self.name()
                    ))
                })?;
            if slot.is_some() {
                return Err(PenumbraError::schema(format!(
                    "index {}: duplicate field position {position}",
                    self.name()
                )));
            }
            let key = self.property_key(edge.other)?;
            let field = IndexField {
                key,
                status: edge.description.field_status()?,
            };
            *slot = Some(build(field, &edge.description)?);
        }
        let fields = slots
            .into_iter()
            .enumerate()
            .map(|(pos, slot)| {
                slot.ok_or_else(|| {
                    PenumbraError::schema(format!(
                        "index {}: missing field position {pos}",
                        self.name()
                    ))
                })
            })
            .collect::<Result<Vec<T>>>()?;
        debug!(index = self.name(), fields = fields.len(), "schema.index.fields_resolved");
        Ok(fields)
    }

    fn property_key(&self, id: SchemaId) -> Result<Arc<RelationType>> {
        let source = self.resolver.schema(id).ok_or_else(|| {
            PenumbraError::schema(format!("index {}: unknown field key {id}", self.name()))
        })?;
        let key = RelationType::from_source(source.as_ref())?;
        if !key.is_property_key() {
            return Err(PenumbraError::schema(format!(
                "index {}: field {} is not a property key",
                self.name(),
                key.name()
            )));
        }
        Ok(Arc::new(key))
    }

    fn schema_constraint(&self) -> Result<Option<String>> {
        let value = self.schema_constraint.get_or_try_init(|| {
            let edges = self
                .source
                .related(TypeDefinitionCategory::IndexSchemaConstraint, Direction::Out);
            match edges.as_slice() {
                [] => Ok(None),
                [edge] => {
                    let target = self.resolver.schema(edge.other).ok_or_else(|| {
                        PenumbraError::schema(format!(
                            "index {}: unknown schema constraint {}",
                            self.name(),
                            edge.other
                        ))
                    })?;
                    Ok(Some(target.name().to_string()))
                }
                _ => Err(PenumbraError::schema(format!(
                    "index {}: more than one schema constraint",
                    self.name()
                ))),
            }
        })?;
        Ok(value.as_ref().clone())
    }

    fn reset(&self) {
        self.schema_constraint.reset();
    }
}

/// An index kept in the primary store, answering exact-match lookups.
pub struct CompositeIndex {
    base: IndexBase,
    fields: ResettableLazy<Vec<IndexField>>,
    by_key: ResettableLazy<FxHashMap<SchemaId, IndexField>>,
    cardinality: ResettableLazy<Cardinality>,
    consistency: ResettableLazy<ConsistencyModifier>,
}

impl CompositeIndex {
    /// Field keys ordered by position.
    pub fn field_keys(&self) -> Result<Arc<Vec<IndexField>>> {
        self.fields
            .get_or_try_init(|| self.base.ordered_fields(|field, _| Ok(field)))
    }

    pub fn field(&self, key: SchemaId) -> Result<Option<IndexField>> {
        let map = self.by_key.get_or_try_init(|| {
            let fields = self.field_keys()?;
            Ok(fields.iter().map(|f| (f.key.id(), f.clone())).collect())
        })?;
        Ok(map.get(&key).cloned())
    }

    /// Number of index entries allowed per value combination.
    pub fn cardinality(&self) -> Result<Cardinality> {
        let value = self.cardinality.get_or_try_init(|| {
            let def = self.base.source.definition();
            if def.contains(TypeDefinitionCategory::IndexCardinality) {
                def.cardinality()
            } else {
                Ok(Cardinality::List)
            }
        })?;
        Ok(*value)
    }

    pub fn consistency_modifier(&self) -> Result<ConsistencyModifier> {
        let value = self
            .consistency
            .get_or_try_init(|| Ok(self.base.source.definition().consistency()))?;
        Ok(*value)
    }

    fn reset(&self) {
        self.fields.reset();
        self.by_key.reset();
        self.cardinality.reset();
        self.consistency.reset();
    }
}

/// An index served by an external search backend.
pub struct MixedIndex {
    base: IndexBase,
    fields: ResettableLazy<Vec<ParameterIndexField>>,
    by_key: ResettableLazy<FxHashMap<SchemaId, ParameterIndexField>>,
    backing_index: ResettableLazy<String>,
    store_name: ResettableLazy<String>,
}

impl MixedIndex {
    /// Parameterized field keys ordered by position.
    pub fn field_keys(&self) -> Result<Arc<Vec<ParameterIndexField>>> {
        self.fields.get_or_try_init(|| {
            self.base.ordered_fields(|field, description| {
                Ok(ParameterIndexField {
                    field,
                    mapping: description.mapping()?,
                    parameters: description.modifier.clone(),
                })
            })
        })
    }

    pub fn field(&self, key: SchemaId) -> Result<Option<ParameterIndexField>> {
        let map = self.by_key.get_or_try_init(|| {
            let fields = self.field_keys()?;
            Ok(fields.iter().map(|f| (f.key().id(), f.clone())).collect())
        })?;
        Ok(map.get(&key).cloned())
    }

    /// Name of the external index configuration serving this index.
    pub fn backing_index_name(&self) -> Result<String> {
        let value = self
            .backing_index
            .get_or_try_init(|| self.base.source.definition().backing_index())?;
        Ok(value.as_ref().clone())
    }

    /// Collection name inside the backing index.
    pub fn store_name(&self) -> Result<String> {
        let value = self
            .store_name
            .get_or_try_init(|| self.base.source.definition().store_name())?;
        Ok(value.as_ref().clone())
    }

    fn reset(&self) {
        self.fields.reset();
        self.by_key.reset();
        self.backing_index.reset();
        self.store_name.reset();
    }
}

/// A graph index: composite or mixed.
pub enum IndexType {
    Composite(CompositeIndex),
    Mixed(MixedIndex),
}

impl IndexType {
    /// Wraps an index schema vertex.
    pub fn new(source: Arc<dyn SchemaSource>, resolver: Arc<dyn SchemaResolver>) -> Result<Self> {
        let category = source.category();
        let base = IndexBase {
            source,
            resolver,
            schema_constraint: ResettableLazy::new(),
        };
        match category {
            SchemaCategory::CompositeIndex => Ok(IndexType::Composite(CompositeIndex {
                base,
                fields: ResettableLazy::new(),
                by_key: ResettableLazy::new(),
                cardinality: ResettableLazy::new(),
                consistency: ResettableLazy::new(),
            })),
            SchemaCategory::MixedIndex => Ok(IndexType::Mixed(MixedIndex {
                base,
                fields: ResettableLazy::new(),
                by_key: ResettableLazy::new(),
                backing_index: ResettableLazy::new(),
                store_name: ResettableLazy::new(),
            })),
            other => Err(PenumbraError::schema(format!(
                "{} is a {other:?}, not an index",
                base.name()
            ))),
        }
    }

    fn base(&self) -> &IndexBase {
        match self {
            IndexType::Composite(index) => &index.base,
            IndexType::Mixed(index) => &index.base,
        }
    }

    pub fn id(&self) -> SchemaId {
        self.base().source.id()
    }

    pub fn name(&self) -> &str {
        self.base().name()
    }

    pub fn status(&self) -> Result<SchemaStatus> {
        self.base().source.status()
    }

    pub fn element_category(&self) -> Result<ElementCategory> {
        self.base().source.definition().element_category()
    }

    pub fn is_composite(&self) -> bool {
        matches!(self, IndexType::Composite(_))
    }

    pub fn is_mixed(&self) -> bool {
        matches!(self, IndexType::Mixed(_))
    }

    pub fn as_composite(&self) -> Option<&CompositeIndex> {
        match self {
            IndexType::Composite(index) => Some(index),
            IndexType::Mixed(_) => None,
        }
    }

    pub fn as_mixed(&self) -> Option<&MixedIndex> {
        match self {
            IndexType::Mixed(index) => Some(index),
            IndexType::Composite(_) => None,
        }
    }

    /// Field keys ordered by position, without mixed-index parameters.
    pub fn field_keys(&self) -> Result<Vec<IndexField>> {
        match self {
            IndexType::Composite(index) => Ok(index.field_keys()?.as_ref().clone()),
            IndexType::Mixed(index) => Ok(index
                .field_keys()?
                .iter()
                .map(|f| f.field.clone())
                .collect()),
        }
    }

    pub fn indexes_key(&self, key: SchemaId) -> Result<bool> {
        match self {
            IndexType::Composite(index) => Ok(index.field(key)?.is_some()),
            IndexType::Mixed(index) => Ok(index.field(key)?.is_some()),
        }
    }

    /// Name of the vertex or edge label this index is restricted to.
    pub fn schema_type_constraint(&self) -> Result<Option<String>> {
        self.base().schema_constraint()
    }

    /// Drops all derived data; the next accessor re-reads the schema vertex.
    pub fn reset_cache(&self) {
        self.base().reset();
        match self {
            IndexType::Composite(index) => index.reset(),
            IndexType::Mixed(index) => index.reset(),
        }
        debug!(index = self.name(), "schema.index.reset_cache");
    }
}

impl std::fmt::Debug for IndexType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = if self.is_composite() { "Composite" } else { "Mixed" };
        f.debug_struct("IndexType")
            .field("kind", &kind)
            .field("id", &self.id())
            .field("name", &self.name())
            .finish()
    }
}
