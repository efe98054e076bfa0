#![allow(missing_docs)]

use std::sync::Arc;
use std::time::Duration;

use penumbra::schema::codec::{self, SCHEMA_STORE};
use penumbra::schema::{
    Cardinality, DataType, DefinitionValue, ElementCategory, Mapping, ParameterType,
    ParameterValue, SchemaCategory, SchemaRegistry, SchemaSource, SchemaStatus, SchemaVertex,
    SortKeyComponent, TypeDefinitionCategory, TypeDefinitionDescription, TypeDefinitionMap,
    TypeInspector,
};
use penumbra::storage::inmemory::InMemoryStoreManager;
use penumbra::storage::{CacheOptions, CacheTransaction, KcvsCache, StoreManager, TransactionOptions};
use penumbra::types::{Direction, Result, SchemaId};

const NAME: SchemaId = SchemaId(1);
const SINCE: SchemaId = SchemaId(2);
const KNOWS: SchemaId = SchemaId(10);
const KNOWS_BY_SINCE: SchemaId = SchemaId(11);
const BY_NAME: SchemaId = SchemaId(20);
const SEARCH: SchemaId = SchemaId(21);

fn def(pairs: Vec<(TypeDefinitionCategory, DefinitionValue)>) -> Result<TypeDefinitionMap> {
    pairs
        .into_iter()
        .try_fold(TypeDefinitionMap::new(), |map, (cat, value)| map.with(cat, value))
}

fn field(position: i64, mapping: Option<Mapping>) -> Result<TypeDefinitionDescription> {
    let mut modifier = vec![ParameterType::IndexPosition.parameter(ParameterValue::Int(position))];
    if let Some(mapping) = mapping {
        modifier.push(ParameterType::Mapping.parameter(ParameterValue::Mapping(mapping)));
    }
    TypeDefinitionDescription::with_modifier(TypeDefinitionCategory::IndexField, modifier)
}

fn build_schema() -> Result<SchemaRegistry> {
    use DefinitionValue as V;
    use TypeDefinitionCategory as C;
    let registry = SchemaRegistry::new();
    registry.define(SchemaVertex::new(
        NAME,
        "name",
        SchemaCategory::PropertyKey,
        def(vec![(C::DataType, V::DataType(DataType::Text))])?,
    ))?;
    registry.define(SchemaVertex::new(
        SINCE,
        "since",
        SchemaCategory::PropertyKey,
        def(vec![(C::DataType, V::DataType(DataType::Long))])?,
    ))?;
    registry.define(SchemaVertex::new(
        KNOWS,
        "knows",
        SchemaCategory::EdgeLabel,
        def(vec![(C::Unidirected, V::Direction(Direction::Out))])?,
    ))?;
    registry.define(SchemaVertex::new(
        KNOWS_BY_SINCE,
        "knowsBySince",
        SchemaCategory::RelationIndex,
        def(vec![
            (C::SortKey, V::Ids(vec![SINCE])),
            (C::Status, V::Status(SchemaStatus::Enabled)),
        ])?,
    ))?;
    registry.connect(
        KNOWS,
        KNOWS_BY_SINCE,
        TypeDefinitionDescription::new(C::RelationTypeIndex)?,
    )?;
    registry.define(SchemaVertex::new(
        BY_NAME,
        "byName",
        SchemaCategory::CompositeIndex,
        def(vec![
            (C::ElementCategory, V::Element(ElementCategory::Vertex)),
            (C::IndexCardinality, V::Cardinality(Cardinality::Single)),
        ])?,
    ))?;
    registry.connect(BY_NAME, NAME, field(0, None)?)?;
    registry.define(SchemaVertex::new(
        SEARCH,
        "search",
        SchemaCategory::MixedIndex,
        def(vec![
            (C::ElementCategory, V::Element(ElementCategory::Vertex)),
            (C::BackingIndex, V::Name("search".into())),
            (C::IndexStoreName, V::Name("people".into())),
        ])?,
    ))?;
    // rows list edges by direction then id, so connect in that order
    registry.connect(SEARCH, NAME, field(0, Some(Mapping::Text))?)?;
    registry.connect(SEARCH, SINCE, field(1, None)?)?;
    Ok(registry)
}

struct Backend {
    manager: Arc<InMemoryStoreManager>,
    cache: Arc<KcvsCache>,
}

impl Backend {
    fn open() -> Result<Self> {
        let manager = Arc::new(InMemoryStoreManager::new());
        let opts = CacheOptions::new()
            .cache_time(Duration::from_secs(600))
            .clean_wait(Duration::ZERO);
        let cache = Arc::new(KcvsCache::new(manager.open_database(SCHEMA_STORE)?, &opts));
        Ok(Self { manager, cache })
    }

    fn tx(&self) -> Result<CacheTransaction> {
        let manager: Arc<dyn StoreManager> = self.manager.clone();
        CacheTransaction::begin(manager, TransactionOptions::new())
    }
}

#[test]
fn persisted_schema_loads_back_equal() -> Result<()> {
    let backend = Backend::open()?;
    let original = build_schema()?;
    let mut tx = backend.tx()?;
    original.persist(&backend.cache, &original.table().ids(), &mut tx)?;
    tx.commit()?;
    assert_eq!(backend.manager.store(SCHEMA_STORE).row_count(), 6);

    let loaded = SchemaRegistry::load(&backend.cache, &backend.tx()?)?;
    assert_eq!(loaded.table().len(), original.table().len());
    for id in original.table().ids() {
        assert_eq!(loaded.vertex(id), original.vertex(id), "vertex {id}");
    }

    let knows = loaded.relation_type(KNOWS)?;
    assert_eq!(knows.unidirected(), Some(Direction::Out));
    let indexes = loaded.relation_indexes(&knows)?;
    assert_eq!(indexes.len(), 2);
    assert_eq!(indexes[1].base_type(), Some(KNOWS));
    assert_eq!(
        indexes[1].extended_sort_key(Direction::Out),
        vec![
            SortKeyComponent::Key(SINCE),
            SortKeyComponent::AdjacentId,
            SortKeyComponent::RelationId
        ]
    );

    let by_name = loaded.index_by_name("byName")?.expect("composite index");
    let composite = by_name.as_composite().expect("composite");
    assert_eq!(composite.cardinality()?, Cardinality::Single);
    assert_eq!(composite.field_keys()?[0].key.name(), "name");

    let search = loaded.index(SEARCH)?;
    let mixed = search.as_mixed().expect("mixed");
    let fields = mixed.field_keys()?;
    let names: Vec<&str> = fields.iter().map(|f| f.key().name()).collect();
    assert_eq!(names, ["name", "since"]);
    assert_eq!(fields[0].mapping, Mapping::Text);
    assert_eq!(mixed.store_name()?, "people");
    assert_eq!(loaded.indexes()?.len(), 2);
    Ok(())
}

#[test]
fn rewriting_a_vertex_drops_stale_columns() -> Result<()> {
    let backend = Backend::open()?;
    let registry = build_schema()?;
    let mut tx = backend.tx()?;
    registry.persist(&backend.cache, &registry.table().ids(), &mut tx)?;
    tx.commit()?;

    let mut search = (*registry.vertex(SEARCH).expect("search")).clone();
    let reduced = TypeDefinitionMap::new()
        .with(
            TypeDefinitionCategory::ElementCategory,
            DefinitionValue::Element(ElementCategory::Vertex),
        )?
        .with(
            TypeDefinitionCategory::Status,
            DefinitionValue::Status(SchemaStatus::Disabled),
        )?;
    *search.definition_mut() = reduced;
    registry.define(search)?;
    let mut tx = backend.tx()?;
    registry.persist(&backend.cache, &[SEARCH], &mut tx)?;
    tx.commit()?;

    let read = codec::read_vertex(&backend.cache, SEARCH, &backend.tx()?)?.expect("row");
    assert_eq!(read, *registry.vertex(SEARCH).expect("search"));
    assert!(!read
        .definition()
        .contains(TypeDefinitionCategory::IndexStoreName));

    let reloaded = SchemaRegistry::load(&backend.cache, &backend.tx()?)?;
    assert_eq!(reloaded.index(SEARCH)?.status()?, SchemaStatus::Disabled);
    Ok(())
}
