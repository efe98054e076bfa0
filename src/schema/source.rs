//! Schema vertices as read from the system store.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::types::{Direction, Result, SchemaId};

use super::definition::{SchemaStatus, TypeDefinitionCategory, TypeDefinitionDescription, TypeDefinitionMap};

/// Kind of element a schema vertex defines.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum SchemaCategory {
    PropertyKey,
    EdgeLabel,
    VertexLabel,
    RelationIndex,
    CompositeIndex,
    MixedIndex,
}

impl SchemaCategory {
    pub fn is_relation_type(self) -> bool {
        matches!(
            self,
            SchemaCategory::PropertyKey | SchemaCategory::EdgeLabel | SchemaCategory::RelationIndex
        )
    }

    pub fn is_index(self) -> bool {
        matches!(self, SchemaCategory::CompositeIndex | SchemaCategory::MixedIndex)
    }
}

/// One schema edge as seen from one of its endpoints.
///
/// `direction` is [`Direction::Out`] on the vertex the edge starts from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaEdge {
    pub other: SchemaId,
    pub direction: Direction,
    pub description: TypeDefinitionDescription,
}

/// Read access to a schema vertex's definition and schema edges.
pub trait SchemaSource: Send + Sync + fmt::Debug {
    fn id(&self) -> SchemaId;

    fn name(&self) -> &str;

    fn category(&self) -> SchemaCategory;

    fn definition(&self) -> &TypeDefinitionMap;

    /// Schema edges of `category` leaving (`Out`) or entering (`In`) this vertex.
    fn related(&self, category: TypeDefinitionCategory, dir: Direction) -> Vec<&SchemaEdge>;

    /// Status recorded in the definition; elements without one are enabled.
    fn status(&self) -> Result<SchemaStatus> {
        if self.definition().contains(TypeDefinitionCategory::Status) {
            self.definition().status()
        } else {
            Ok(SchemaStatus::Enabled)
        }
    }
}

/// Looks up schema vertices by id.
pub trait SchemaResolver: Send + Sync {
    fn schema(&self, id: SchemaId) -> Option<Arc<dyn SchemaSource>>;
}

/// An owned schema vertex.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaVertex {
    id: SchemaId,
    name: String,
    category: SchemaCategory,
    definition: TypeDefinitionMap,
    edges: Vec<SchemaEdge>,
}

impl SchemaVertex {
    pub fn new(
        id: SchemaId,
        name: impl Into<String>,
        category: SchemaCategory,
        definition: TypeDefinitionMap,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            category,
            definition,
            edges: Vec::new(),
        }
    }

    pub fn edges(&self) -> &[SchemaEdge] {
        &self.edges
    }

    pub fn add_edge(&mut self, edge: SchemaEdge) {
        self.edges.push(edge);
    }

    pub fn definition_mut(&mut self) -> &mut TypeDefinitionMap {
        &mut self.definition
    }
}

impl SchemaSource for SchemaVertex {
    fn id(&self) -> SchemaId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn category(&self) -> SchemaCategory {
        self.category
    }

    fn definition(&self) -> &TypeDefinitionMap {
        &self.definition
    }

    fn related(&self, category: TypeDefinitionCategory, dir: Direction) -> Vec<&SchemaEdge> {
        self.edges
            .iter()
            .filter(|edge| edge.description.category == category && dir.covers(edge.direction))
            .collect()
    }
}
