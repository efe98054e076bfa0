#![allow(missing_docs)]

use penumbra::query::{select_index, Cmp, Condition, IndexCover, TextPredicate, Value};
use penumbra::schema::{
    Cardinality, ConsistencyModifier, DataType, DefinitionValue, ElementCategory, Mapping,
    ParameterType, ParameterValue, SchemaCategory, SchemaRegistry, SchemaStatus, SchemaVertex,
    TypeDefinitionCategory, TypeDefinitionDescription, TypeDefinitionMap,
};
use penumbra::types::{PenumbraError, Result, SchemaId};

const NAME: SchemaId = SchemaId(1);
const AGE: SchemaId = SchemaId(2);
const CITY: SchemaId = SchemaId(3);
const PERSON: SchemaId = SchemaId(5);
const BY_NAME: SchemaId = SchemaId(10);
const SEARCH: SchemaId = SchemaId(20);

fn field(position: i64, extra: Vec<(ParameterType, ParameterValue)>) -> Result<TypeDefinitionDescription> {
    let mut modifier = vec![ParameterType::IndexPosition.parameter(ParameterValue::Int(position))];
    modifier.extend(extra.into_iter().map(|(ty, value)| ty.parameter(value)));
    TypeDefinitionDescription::with_modifier(TypeDefinitionCategory::IndexField, modifier)
}

fn property_key(registry: &SchemaRegistry, id: SchemaId, name: &str, data_type: DataType) -> Result<()> {
    let def = TypeDefinitionMap::new().with(
        TypeDefinitionCategory::DataType,
        DefinitionValue::DataType(data_type),
    )?;
    registry.define(SchemaVertex::new(id, name, SchemaCategory::PropertyKey, def))
}

fn index(registry: &SchemaRegistry, id: SchemaId, name: &str, category: SchemaCategory) -> Result<()> {
    let def = TypeDefinitionMap::new().with(
        TypeDefinitionCategory::ElementCategory,
        DefinitionValue::Element(ElementCategory::Vertex),
    )?;
    let def = if category == SchemaCategory::MixedIndex {
        def.with(TypeDefinitionCategory::BackingIndex, DefinitionValue::Name("search".into()))?
            .with(TypeDefinitionCategory::IndexStoreName, DefinitionValue::Name("vertices".into()))?
    } else {
        def
    };
    registry.define(SchemaVertex::new(id, name, category, def))
}

/// `byName` is a composite index over name; `search` a mixed index over a
/// text-mapped name and a default-mapped age.
fn registry() -> Result<SchemaRegistry> {
    let registry = SchemaRegistry::new();
    property_key(&registry, NAME, "name", DataType::Text)?;
    property_key(&registry, AGE, "age", DataType::Long)?;
    property_key(&registry, CITY, "city", DataType::Text)?;
    registry.define(SchemaVertex::new(
        PERSON,
        "person",
        SchemaCategory::VertexLabel,
        TypeDefinitionMap::new(),
    ))?;
    index(&registry, BY_NAME, "byName", SchemaCategory::CompositeIndex)?;
    registry.connect(BY_NAME, NAME, field(0, vec![])?)?;
    index(&registry, SEARCH, "search", SchemaCategory::MixedIndex)?;
    // connected out of position order on purpose
    registry.connect(SEARCH, AGE, field(1, vec![])?)?;
    registry.connect(
        SEARCH,
        NAME,
        field(0, vec![(ParameterType::Mapping, ParameterValue::Mapping(Mapping::Text))])?,
    )?;
    Ok(registry)
}

fn set_status(registry: &SchemaRegistry, id: SchemaId, status: SchemaStatus) -> Result<()> {
    let mut vertex = (*registry.vertex(id).ok_or(PenumbraError::NotFound("schema vertex"))?).clone();
    vertex
        .definition_mut()
        .set(TypeDefinitionCategory::Status, DefinitionValue::Status(status))?;
    registry.define(vertex)
}

#[test]
fn wrappers_expose_ordered_fields_and_defaults() -> Result<()> {
    let registry = registry()?;
    let by_name = registry.index(BY_NAME)?;
    let composite = by_name.as_composite().expect("composite");
    assert_eq!(composite.cardinality()?, Cardinality::List);
    assert_eq!(composite.consistency_modifier()?, ConsistencyModifier::Default);
    assert_eq!(by_name.schema_type_constraint()?, None);
    assert!(by_name.indexes_key(NAME)?);
    assert!(!by_name.indexes_key(AGE)?);

    let search = registry.index_by_name("search")?.expect("mixed index");
    let mixed = search.as_mixed().expect("mixed");
    let names: Vec<String> = search
        .field_keys()?
        .iter()
        .map(|f| f.key.name().to_string())
        .collect();
    assert_eq!(names, ["name", "age"]);
    assert_eq!(mixed.field(NAME)?.map(|f| f.mapping), Some(Mapping::Text));
    assert_eq!(mixed.field(AGE)?.map(|f| f.mapping), Some(Mapping::Default));
    assert_eq!(mixed.field(CITY)?, None);
    assert_eq!(mixed.backing_index_name()?, "search");
    assert_eq!(mixed.store_name()?, "vertices");
    assert!(registry.index_by_name("name")?.is_none());
    assert_eq!(registry.indexes()?.len(), 2);
    Ok(())
}

#[test]
fn field_status_and_constraint_come_from_schema_edges() -> Result<()> {
    let registry = registry()?;
    registry.connect(
        SEARCH,
        CITY,
        field(
            2,
            vec![(ParameterType::Status, ParameterValue::Status(SchemaStatus::Registered))],
        )?,
    )?;
    registry.connect(
        BY_NAME,
        PERSON,
        TypeDefinitionDescription::new(TypeDefinitionCategory::IndexSchemaConstraint)?,
    )?;
    let search = registry.index(SEARCH)?;
    let city = search.as_mixed().expect("mixed").field(CITY)?.expect("city field");
    assert_eq!(city.status(), SchemaStatus::Registered);
    assert_eq!(
        registry.index(BY_NAME)?.schema_type_constraint()?.as_deref(),
        Some("person")
    );

    // a field that is not yet enabled cannot answer conditions
    let conditions = [Condition::has("city", TextPredicate::Contains, "berlin")];
    assert!(select_index(&registry, ElementCategory::Vertex, &conditions)?.is_none());
    Ok(())
}

#[test]
fn malformed_field_positions_fail_on_access() -> Result<()> {
    let registry = registry()?;
    index(&registry, SchemaId(30), "gapped", SchemaCategory::CompositeIndex)?;
    registry.connect(SchemaId(30), NAME, field(0, vec![])?)?;
    registry.connect(SchemaId(30), AGE, field(2, vec![])?)?;
    let gapped = registry.index(SchemaId(30))?;
    assert!(matches!(gapped.field_keys(), Err(PenumbraError::Schema(_))));

    index(&registry, SchemaId(31), "twice", SchemaCategory::CompositeIndex)?;
    registry.connect(SchemaId(31), NAME, field(0, vec![])?)?;
    registry.connect(SchemaId(31), AGE, field(0, vec![])?)?;
    assert!(matches!(registry.index(SchemaId(31))?.field_keys(), Err(PenumbraError::Schema(_))));

    index(&registry, SchemaId(32), "unplaced", SchemaCategory::CompositeIndex)?;
    registry.connect(
        SchemaId(32),
        NAME,
        TypeDefinitionDescription::new(TypeDefinitionCategory::IndexField)?,
    )?;
    assert!(matches!(registry.index(SchemaId(32))?.field_keys(), Err(PenumbraError::Schema(_))));
    Ok(())
}

#[test]
fn stale_wrappers_refresh_after_reset() -> Result<()> {
    let registry = registry()?;
    let search = registry.index(SEARCH)?;
    let mixed = search.as_mixed().expect("mixed");
    assert_eq!(mixed.field_keys()?[1].key().data_type(), Some(DataType::Long));

    property_key(&registry, AGE, "age", DataType::Double)?;
    // derived fields stay cached on the wrapper until it is reset
    assert_eq!(mixed.field_keys()?[1].key().data_type(), Some(DataType::Long));
    registry.reset_caches();
    assert_eq!(mixed.field_keys()?[1].key().data_type(), Some(DataType::Double));

    let before = registry.index(BY_NAME)?;
    set_status(&registry, BY_NAME, SchemaStatus::Disabled)?;
    assert_eq!(before.status()?, SchemaStatus::Enabled);
    assert_eq!(registry.index(BY_NAME)?.status()?, SchemaStatus::Disabled);
    assert_eq!(registry.index(BY_NAME)?.field_keys()?.len(), 1);
    Ok(())
}

#[test]
fn selection_follows_index_status() -> Result<()> {
    let registry = registry()?;
    let text_and_range = [
        Condition::has("name", TextPredicate::Contains, "ann"),
        Condition::has("age", Cmp::GreaterThan, 30i64),
    ];
    let chosen = select_index(&registry, ElementCategory::Vertex, &text_and_range)?.expect("index");
    assert_eq!(chosen.index.id(), SEARCH);
    assert_eq!(chosen.covered, [0, 1]);

    let exact_and_range = [
        Condition::any_of("name", vec![Value::from("ann"), Value::from("bob")]),
        Condition::has("age", Cmp::GreaterThan, 30i64),
    ];
    let chosen = select_index(&registry, ElementCategory::Vertex, &exact_and_range)?.expect("index");
    assert_eq!(chosen.index.id(), BY_NAME);
    assert_eq!(chosen.covered, [0]);
    assert_eq!(
        chosen.cover,
        IndexCover::Composite {
            values: vec![vec![Value::from("ann")], vec![Value::from("bob")]],
        }
    );

    set_status(&registry, BY_NAME, SchemaStatus::Disabled)?;
    let chosen = select_index(&registry, ElementCategory::Vertex, &exact_and_range)?.expect("index");
    assert_eq!(chosen.index.id(), SEARCH);
    assert_eq!(chosen.covered, [1]);
    assert!(select_index(&registry, ElementCategory::Edge, &exact_and_range)?.is_none());
    Ok(())
}
