//! Property keys, edge labels, and relation indexes.

use crate::types::{Direction, PenumbraError, Result, SchemaId};

use super::definition::{
    Cardinality, DataType, Multiplicity, SchemaStatus, SortOrder, TypeDefinitionCategory,
};
use super::source::{SchemaCategory, SchemaSource};

/// Component of a relation type's extended sort key.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum SortKeyComponent {
    /// Value of a property key.
    Key(SchemaId),
    /// Id of the vertex at the other end of an edge.
    AdjacentId,
    /// Id of the relation itself.
    RelationId,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RelationKind {
    PropertyKey { data_type: DataType, cardinality: Cardinality },
    EdgeLabel,
}

/// A property key, an edge label, or a relation index over one of them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelationType {
    id: SchemaId,
    name: String,
    kind: RelationKind,
    multiplicity: Multiplicity,
    sort_key: Vec<SchemaId>,
    sort_order: SortOrder,
    unidirected: Option<Direction>,
    status: SchemaStatus,
    invisible: bool,
    base_type: Option<SchemaId>,
}

impl RelationType {
    /// Reads a property key or edge label from its schema vertex.
    pub fn from_source(source: &dyn SchemaSource) -> Result<Self> {
        let def = source.definition();
        let (kind, multiplicity) = match source.category() {
            SchemaCategory::PropertyKey => {
                let multiplicity = match def.get(TypeDefinitionCategory::Multiplicity) {
                    Some(_) => def.multiplicity()?,
                    None => Multiplicity::Many2One,
                };
                let kind = RelationKind::PropertyKey {
                    data_type: def.data_type()?,
                    cardinality: multiplicity.cardinality(),
                };
                (kind, Multiplicity::from_cardinality(multiplicity.cardinality()))
            }
            SchemaCategory::EdgeLabel => {
                let multiplicity = match def.get(TypeDefinitionCategory::Multiplicity) {
                    Some(_) => def.multiplicity()?,
                    None => Multiplicity::Multi,
                };
                (RelationKind::EdgeLabel, multiplicity)
            }
            other => {
                return Err(PenumbraError::schema(format!(
                    "{} is a {other:?}, not a relation type",
                    source.name()
                )))
            }
        };
        let unidirected = match def.unidirected() {
            Some(Direction::Both) | None => None,
            Some(dir) => Some(dir),
        };
        if unidirected.is_some() && matches!(kind, RelationKind::PropertyKey { .. }) {
            return Err(PenumbraError::schema(format!(
                "property key {} cannot be unidirected",
                source.name()
            )));
        }
        Ok(Self {
            id: source.id(),
            name: source.name().to_string(),
            kind,
            multiplicity,
            sort_key: def.sort_key()?,
            sort_order: def.sort_order(),
            unidirected,
            status: source.status()?,
            invisible: def.flag(TypeDefinitionCategory::Invisible),
            base_type: None,
        })
    }

    /// Reads a relation index over `base` from its schema vertex. The index
    /// shares the base type's kind and multiplicity and carries its own sort
    /// key, order, direction, and status.
    pub fn index_from_source(source: &dyn SchemaSource, base: &RelationType) -> Result<Self> {
        if source.category() != SchemaCategory::RelationIndex {
            return Err(PenumbraError::schema(format!(
                "{} is not a relation index",
                source.name()
            )));
        }
        let def = source.definition();
        let unidirected = match def.unidirected() {
            Some(Direction::Both) | None => base.unidirected,
            Some(dir) => Some(dir),
        };
        Ok(Self {
            id: source.id(),
            name: source.name().to_string(),
            kind: base.kind.clone(),
            multiplicity: base.multiplicity,
            sort_key: def.sort_key()?,
            sort_order: def.sort_order(),
            unidirected,
            status: source.status()?,
            invisible: true,
            base_type: Some(base.id),
        })
    }

    pub fn id(&self) -> SchemaId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &RelationKind {
        &self.kind
    }

    pub fn is_property_key(&self) -> bool {
        matches!(self.kind, RelationKind::PropertyKey { .. })
    }

    pub fn is_edge_label(&self) -> bool {
        self.kind == RelationKind::EdgeLabel
    }

    pub fn data_type(&self) -> Option<DataType> {
        match self.kind {
            RelationKind::PropertyKey { data_type, .. } => Some(data_type),
            RelationKind::EdgeLabel => None,
        }
    }

    pub fn cardinality(&self) -> Option<Cardinality> {
        match self.kind {
            RelationKind::PropertyKey { cardinality, .. } => Some(cardinality),
            RelationKind::EdgeLabel => None,
        }
    }

    pub fn multiplicity(&self) -> Multiplicity {
        self.multiplicity
    }

    pub fn sort_key(&self) -> &[SchemaId] {
        &self.sort_key
    }

    pub fn sort_order(&self) -> SortOrder {
        self.sort_order
    }

    pub fn status(&self) -> SchemaStatus {
        self.status
    }

    pub fn is_invisible(&self) -> bool {
        self.invisible
    }

    /// The indexed type when this is a relation index.
    pub fn base_type(&self) -> Option<SchemaId> {
        self.base_type
    }

    /// The only direction relations of this type are stored in, if any.
    /// Property keys are always stored outgoing.
    pub fn unidirected(&self) -> Option<Direction> {
        if self.is_property_key() {
            Some(Direction::Out)
        } else {
            self.unidirected
        }
    }

    /// Returns `true` when relations of this type are stored in `dir`.
    pub fn is_stored_in(&self, dir: Direction) -> bool {
        match self.unidirected() {
            None => true,
            Some(only) => dir == only,
        }
    }

    /// Sort key followed by the implicit components that make the column
    /// unique in direction `dir`.
    pub fn extended_sort_key(&self, dir: Direction) -> Vec<SortKeyComponent> {
        let mut keys: Vec<SortKeyComponent> =
            self.sort_key.iter().copied().map(SortKeyComponent::Key).collect();
        if !self.multiplicity.is_unique(dir) {
            if self.is_edge_label() {
                keys.push(SortKeyComponent::AdjacentId);
            }
            if !self.multiplicity.is_constrained() {
                keys.push(SortKeyComponent::RelationId);
            }
        }
        keys
    }
}
