#![forbid(unsafe_code)]
//! Typed views over the schema vertices stored in the system store.

/// Row codec for schema vertices.
pub mod codec;
pub mod definition;
pub mod index;
mod lazy;
mod registry;
mod relation_type;
mod source;

pub use definition::{
    Cardinality, ConsistencyModifier, DataType, DefinitionValue, ElementCategory, Mapping,
    Multiplicity, Parameter, ParameterType, ParameterValue, SchemaStatus, SortOrder,
    TypeDefinitionCategory, TypeDefinitionDescription, TypeDefinitionMap,
};
pub use index::{CompositeIndex, IndexField, IndexType, MixedIndex, ParameterIndexField};
pub use lazy::{LazyState, ResettableLazy};
pub use registry::{SchemaRegistry, SchemaTable, TypeInspector};
pub use relation_type::{RelationKind, RelationType, SortKeyComponent};
pub use source::{SchemaCategory, SchemaEdge, SchemaResolver, SchemaSource, SchemaVertex};
