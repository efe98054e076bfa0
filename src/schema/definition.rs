//! Schema definition vocabulary: categories, statuses, and parameters.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{Direction, PenumbraError, Result, SchemaId};

/// Lifecycle of a schema element (index, index field, relation index).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum SchemaStatus {
    Installed,
    Registered,
    Enabled,
    Disabled,
    Discarded,
}

impl SchemaStatus {
    /// Returns `true` when queries may be answered by the element.
    pub fn is_stable(self) -> bool {
        matches!(self, SchemaStatus::Enabled | SchemaStatus::Disabled)
    }
}

/// How many values a vertex may hold for one property key.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Cardinality {
    Single,
    List,
    Set,
}

/// Edge multiplicity; property cardinalities map onto the same model.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Multiplicity {
    /// Any number of parallel edges.
    Multi,
    /// At most one edge between a pair of vertices.
    Simple,
    /// At most one outgoing edge per vertex.
    Many2One,
    /// At most one incoming edge per vertex.
    One2Many,
    One2One,
}

impl Multiplicity {
    pub fn is_constrained(self) -> bool {
        self != Multiplicity::Multi
    }

    /// Returns `true` when a vertex holds at most one such relation in `dir`.
    pub fn is_unique(self, dir: Direction) -> bool {
        match dir {
            Direction::Out => matches!(self, Multiplicity::Many2One | Multiplicity::One2One),
            Direction::In => matches!(self, Multiplicity::One2Many | Multiplicity::One2One),
            Direction::Both => self == Multiplicity::One2One,
        }
    }

    /// Property cardinality stored with this multiplicity.
    pub fn cardinality(self) -> Cardinality {
        match self {
            Multiplicity::Multi => Cardinality::List,
            Multiplicity::Simple => Cardinality::Set,
            _ => Cardinality::Single,
        }
    }

    pub fn from_cardinality(cardinality: Cardinality) -> Self {
        match cardinality {
            Cardinality::Single => Multiplicity::Many2One,
            Cardinality::Set => Multiplicity::Simple,
            Cardinality::List => Multiplicity::Multi,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Value type of a property key.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Boolean,
    Long,
    Double,
    Text,
}

/// Locking behaviour requested for an index or relation type.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum ConsistencyModifier {
    #[default]
    Default,
    Lock,
    Fork,
}

/// How a mixed index field is analysed by the external index.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Mapping {
    #[default]
    Default,
    Text,
    String,
    TextString,
}

impl Mapping {
    /// Returns `true` when full-text predicates can be answered for the field.
    pub fn supports_text(self) -> bool {
        matches!(self, Mapping::Text | Mapping::TextString)
    }
}

/// Graph element kind an index is defined over.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum ElementCategory {
    Vertex,
    Edge,
    Property,
}

/// Keys of a schema vertex's definition map and labels of schema edges.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub enum TypeDefinitionCategory {
    Invisible,
    SortKey,
    SortOrder,
    Signature,
    Multiplicity,
    DataType,
    Unidirected,
    Status,
    InternalIndex,
    BackingIndex,
    IndexStoreName,
    IndexCardinality,
    ElementCategory,
    ConsistencyModifier,
    Ttl,
    /// Edge from a relation type to one of its relation indexes.
    RelationTypeIndex,
    /// Edge from an index to one of its field keys.
    IndexField,
    /// Edge from an index to the vertex or edge label it is restricted to.
    IndexSchemaConstraint,
    /// Edge from a relation type to a modifier vertex.
    TypeModifier,
}

impl TypeDefinitionCategory {
    /// Returns `true` for categories stored as schema edges.
    pub fn is_edge(self) -> bool {
        matches!(
            self,
            TypeDefinitionCategory::RelationTypeIndex
                | TypeDefinitionCategory::IndexField
                | TypeDefinitionCategory::IndexSchemaConstraint
                | TypeDefinitionCategory::TypeModifier
        )
    }

    fn accepts(self, value: &DefinitionValue) -> bool {
        use DefinitionValue as V;
        use TypeDefinitionCategory as C;
        match self {
            C::Invisible | C::InternalIndex => matches!(value, V::Bool(_)),
            C::SortKey | C::Signature => matches!(value, V::Ids(_)),
            C::SortOrder => matches!(value, V::Order(_)),
            C::Multiplicity => matches!(value, V::Multiplicity(_)),
            C::DataType => matches!(value, V::DataType(_)),
            C::Unidirected => matches!(value, V::Direction(_)),
            C::Status => matches!(value, V::Status(_)),
            C::BackingIndex | C::IndexStoreName => matches!(value, V::Name(_)),
            C::IndexCardinality => matches!(value, V::Cardinality(_)),
            C::ElementCategory => matches!(value, V::Element(_)),
            C::ConsistencyModifier => matches!(value, V::Consistency(_)),
            C::Ttl => matches!(value, V::Seconds(_)),
            C::RelationTypeIndex | C::IndexField | C::IndexSchemaConstraint | C::TypeModifier => {
                false
            }
        }
    }
}

impl fmt::Display for TypeDefinitionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Value stored under a [`TypeDefinitionCategory`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum DefinitionValue {
    Bool(bool),
    Ids(Vec<SchemaId>),
    Order(SortOrder),
    Multiplicity(Multiplicity),
    DataType(DataType),
    Direction(Direction),
    Status(SchemaStatus),
    Name(String),
    Cardinality(Cardinality),
    Element(ElementCategory),
    Consistency(ConsistencyModifier),
    Seconds(u64),
}

/// The definition of a schema vertex: one value per category.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDefinitionMap(BTreeMap<TypeDefinitionCategory, DefinitionValue>);

macro_rules! typed_getter {
    ($(#[$doc:meta])* $name:ident, $cat:ident, $variant:ident, $ty:ty) => {
        $(#[$doc])*
        pub fn $name(&self) -> Result<$ty> {
            match self.0.get(&TypeDefinitionCategory::$cat) {
                Some(DefinitionValue::$variant(v)) => Ok(v.clone()),
                Some(_) => Err(PenumbraError::schema(concat!(
                    "definition ",
                    stringify!($cat),
                    " has the wrong value type"
                ))),
                None => Err(PenumbraError::schema(concat!(
                    "definition ",
                    stringify!($cat),
                    " is missing"
                ))),
            }
        }
    };
}

impl TypeDefinitionMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` under `category`, rejecting edge categories and
    /// values of the wrong kind.
    pub fn set(&mut self, category: TypeDefinitionCategory, value: DefinitionValue) -> Result<()> {
        if !category.accepts(&value) {
            return Err(PenumbraError::invalid(format!(
                "{value:?} is not a valid value for {category}"
            )));
        }
        self.0.insert(category, value);
        Ok(())
    }

    /// Builder form of [`set`](Self::set).
    pub fn with(mut self, category: TypeDefinitionCategory, value: DefinitionValue) -> Result<Self> {
        self.set(category, value)?;
        Ok(self)
    }

    pub fn get(&self, category: TypeDefinitionCategory) -> Option<&DefinitionValue> {
        self.0.get(&category)
    }

    pub fn contains(&self, category: TypeDefinitionCategory) -> bool {
        self.0.contains_key(&category)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TypeDefinitionCategory, &DefinitionValue)> {
        self.0.iter()
    }

    typed_getter!(status, Status, Status, SchemaStatus);
    typed_getter!(multiplicity, Multiplicity, Multiplicity, Multiplicity);
    typed_getter!(data_type, DataType, DataType, DataType);
    typed_getter!(cardinality, IndexCardinality, Cardinality, Cardinality);
    typed_getter!(element_category, ElementCategory, Element, ElementCategory);
    typed_getter!(
        /// Name of the external index backing a mixed index.
        backing_index,
        BackingIndex,
        Name,
        String
    );
    typed_getter!(store_name, IndexStoreName, Name, String);

    /// Sort key of a relation type; absent means unsorted.
    pub fn sort_key(&self) -> Result<Vec<SchemaId>> {
        match self.get(TypeDefinitionCategory::SortKey) {
            Some(DefinitionValue::Ids(ids)) => Ok(ids.clone()),
            Some(_) => Err(PenumbraError::schema("definition SortKey has the wrong value type")),
            None => Ok(Vec::new()),
        }
    }

    pub fn sort_order(&self) -> SortOrder {
        match self.get(TypeDefinitionCategory::SortOrder) {
            Some(DefinitionValue::Order(order)) => *order,
            _ => SortOrder::Asc,
        }
    }

    /// The single direction a unidirected edge label is stored in.
    pub fn unidirected(&self) -> Option<Direction> {
        match self.get(TypeDefinitionCategory::Unidirected) {
            Some(DefinitionValue::Direction(dir)) => Some(*dir),
            _ => None,
        }
    }

    pub fn consistency(&self) -> ConsistencyModifier {
        match self.get(TypeDefinitionCategory::ConsistencyModifier) {
            Some(DefinitionValue::Consistency(modifier)) => *modifier,
            _ => ConsistencyModifier::Default,
        }
    }

    pub fn flag(&self, category: TypeDefinitionCategory) -> bool {
        matches!(self.get(category), Some(DefinitionValue::Bool(true)))
    }
}

/// Well-known parameter keys carried on schema edges.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ParameterType {
    /// Position of a field within its index.
    IndexPosition,
    /// Text analysis of a mixed index field.
    Mapping,
    /// Status of an index field.
    Status,
}

impl ParameterType {
    pub fn name(self) -> &'static str {
        match self {
            ParameterType::IndexPosition => "index-position",
            ParameterType::Mapping => "mapping",
            ParameterType::Status => "status",
        }
    }

    pub fn parameter(self, value: ParameterValue) -> Parameter {
        Parameter {
            key: self.name().to_string(),
            value,
        }
    }

    /// Finds the value of this parameter in `params`. More than one
    /// occurrence is a schema error.
    pub fn find_parameter(self, params: &[Parameter]) -> Result<Option<&ParameterValue>> {
        let mut matches = params.iter().filter(|p| p.key == self.name());
        let first = matches.next();
        if matches.next().is_some() {
            return Err(PenumbraError::schema(format!(
                "parameter {} appears more than once",
                self.name()
            )));
        }
        Ok(first.map(|p| &p.value))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum ParameterValue {
    Int(i64),
    Text(String),
    Mapping(Mapping),
    Status(SchemaStatus),
}

/// A key/value modifier attached to a schema edge.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub key: String,
    pub value: ParameterValue,
}

/// Category and modifier parameters of one schema edge.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDefinitionDescription {
    pub category: TypeDefinitionCategory,
    #[serde(default)]
    pub modifier: Vec<Parameter>,
}

impl TypeDefinitionDescription {
    pub fn new(category: TypeDefinitionCategory) -> Result<Self> {
        Self::with_modifier(category, Vec::new())
    }

    pub fn with_modifier(category: TypeDefinitionCategory, modifier: Vec<Parameter>) -> Result<Self> {
        if !category.is_edge() {
            return Err(PenumbraError::invalid(format!(
                "{category} does not describe a schema edge"
            )));
        }
        Ok(Self { category, modifier })
    }

    /// Position parameter of an index field edge.
    pub fn index_position(&self) -> Result<Option<i64>> {
        match ParameterType::IndexPosition.find_parameter(&self.modifier)? {
            Some(ParameterValue::Int(pos)) => Ok(Some(*pos)),
            Some(other) => Err(PenumbraError::schema(format!(
                "index position must be an integer, found {other:?}"
            ))),
            None => Ok(None),
        }
    }

    pub fn field_status(&self) -> Result<SchemaStatus> {
        match ParameterType::Status.find_parameter(&self.modifier)? {
            Some(ParameterValue::Status(status)) => Ok(*status),
            Some(other) => Err(PenumbraError::schema(format!(
                "field status must be a status, found {other:?}"
            ))),
            None => Ok(SchemaStatus::Enabled),
        }
    }

    pub fn mapping(&self) -> Result<Mapping> {
        match ParameterType::Mapping.find_parameter(&self.modifier)? {
            Some(ParameterValue::Mapping(mapping)) => Ok(*mapping),
            Some(other) => Err(PenumbraError::schema(format!(
                "mapping must be a mapping, found {other:?}"
            ))),
            None => Ok(Mapping::Default),
        }
    }
}
