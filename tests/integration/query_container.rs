#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use penumbra::query::{
    Cmp, EdgeSerializer, QueryContainer, QueryLimits, Relation, RelationTarget, Value,
};
use penumbra::schema::{
    DataType, DefinitionValue, SchemaCategory, SchemaRegistry, SchemaVertex, SortOrder,
    TypeDefinitionCategory, TypeDefinitionMap, TypeInspector,
};
use penumbra::storage::inmemory::InMemoryStoreManager;
use penumbra::storage::{
    CacheOptions, CacheTransaction, KcvsCache, StaticBuffer, StoreManager, TransactionOptions,
};
use penumbra::types::{Direction, PenumbraError, RelationId, Result, SchemaId, VertexId};

const TIME: SchemaId = SchemaId(1);
const NAME: SchemaId = SchemaId(2);
const KNOWS: SchemaId = SchemaId(10);
const FOLLOWS: SchemaId = SchemaId(11);
const ALICE: VertexId = VertexId(1);

fn schema() -> Result<Arc<SchemaRegistry>> {
    use DefinitionValue as V;
    use TypeDefinitionCategory as C;
    let registry = SchemaRegistry::new();
    registry.define(SchemaVertex::new(
        TIME,
        "time",
        SchemaCategory::PropertyKey,
        TypeDefinitionMap::new().with(C::DataType, V::DataType(DataType::Long))?,
    ))?;
    registry.define(SchemaVertex::new(
        NAME,
        "name",
        SchemaCategory::PropertyKey,
        TypeDefinitionMap::new().with(C::DataType, V::DataType(DataType::Text))?,
    ))?;
    registry.define(SchemaVertex::new(
        KNOWS,
        "knows",
        SchemaCategory::EdgeLabel,
        TypeDefinitionMap::new()
            .with(C::SortKey, V::Ids(vec![TIME]))?
            .with(C::SortOrder, V::Order(SortOrder::Desc))?,
    ))?;
    registry.define(SchemaVertex::new(
        FOLLOWS,
        "follows",
        SchemaCategory::EdgeLabel,
        TypeDefinitionMap::new().with(C::Unidirected, V::Direction(Direction::Out))?,
    ))?;
    Ok(Arc::new(registry))
}

struct Graph {
    registry: Arc<SchemaRegistry>,
    manager: Arc<InMemoryStoreManager>,
    edges: Arc<KcvsCache>,
}

impl Graph {
    fn open() -> Result<Self> {
        let registry = schema()?;
        let manager = Arc::new(InMemoryStoreManager::new());
        let opts = CacheOptions::new()
            .cache_time(Duration::from_secs(600))
            .clean_wait(Duration::ZERO);
        let edges = Arc::new(KcvsCache::new(manager.open_database("edgestore")?, &opts));
        let graph = Self {
            registry,
            manager,
            edges,
        };
        graph.load()?;
        Ok(graph)
    }

    fn tx(&self) -> Result<CacheTransaction> {
        let manager: Arc<dyn StoreManager> = self.manager.clone();
        CacheTransaction::begin(manager, TransactionOptions::new())
    }

    /// Alice knows vertices 2..=11 at times 10..=100, is known by 20 at
    /// time 20, follows 30, and is named "alice".
    fn load(&self) -> Result<()> {
        let mut relations = Vec::new();
        for i in 1..=10u64 {
            relations.push((KNOWS, edge(i, Direction::Out, i + 1, vec![Value::Long(10 * i as i64)])));
        }
        relations.push((KNOWS, edge(11, Direction::In, 20, vec![Value::Long(20)])));
        relations.push((FOLLOWS, edge(12, Direction::Out, 30, vec![])));
        relations.push((
            NAME,
            Relation {
                id: RelationId(13),
                type_id: NAME,
                direction: Direction::Out,
                target: RelationTarget::Value("alice".into()),
                sort_values: vec![],
            },
        ));
        let serializer = EdgeSerializer::new();
        let mut entries = Vec::new();
        for (type_id, relation) in &relations {
            let ty = self.registry.relation_type(*type_id)?;
            entries.push(serializer.write_relation(self.registry.as_ref(), &ty, relation)?);
        }
        let mut tx = self.tx()?;
        self.edges.mutate_entries(row(ALICE), entries, vec![], &mut tx)?;
        tx.commit()
    }

    /// Reads every distinct slice once and hands the parsed relations to
    /// each query reading it.
    fn execute(&self, container: &QueryContainer) -> Result<BTreeMap<String, Vec<Relation>>> {
        let tx = self.tx()?;
        let serializer = EdgeSerializer::new();
        let mut results: BTreeMap<String, Vec<Relation>> = BTreeMap::new();
        for slice in container.get_slice_queries() {
            let rows = self.edges.get_multi_slice(&[row(ALICE)], &slice, &tx)?;
            let parsed = rows[&row(ALICE)]
                .iter()
                .map(|entry| serializer.parse_relation(self.registry.as_ref(), entry))
                .collect::<Result<Vec<_>>>()?;
            for query in container.queries_for(&slice) {
                results
                    .entry(query.name().to_string())
                    .or_default()
                    .extend(parsed.iter().cloned());
            }
        }
        Ok(results)
    }
}

fn row(vertex: VertexId) -> StaticBuffer {
    StaticBuffer::from_u64(vertex.0)
}

fn edge(id: u64, direction: Direction, other: u64, sort_values: Vec<Value>) -> Relation {
    Relation {
        id: RelationId(id),
        type_id: SchemaId(0),
        direction,
        target: RelationTarget::Vertex(VertexId(other)),
        sort_values,
    }
}

fn container(graph: &Graph) -> QueryContainer {
    let inspector: Arc<dyn TypeInspector> = graph.registry.clone();
    QueryContainer::new(inspector, QueryLimits::default())
}

fn times(relations: &[Relation]) -> Vec<i64> {
    relations
        .iter()
        .map(|r| match r.sort_values.first() {
            Some(Value::Long(t)) => *t,
            other => panic!("unexpected sort value {other:?}"),
        })
        .collect()
}

#[test]
fn batched_queries_share_one_read_per_slice() -> Result<()> {
    let graph = Graph::open()?;
    let c = container(&graph);
    let recent = c
        .add_query()
        .name("recent")
        .type_name("knows")
        .direction(Direction::Out)
        .has("time", Cmp::GreaterThanEqual, 50i64)
        .has("time", Cmp::LessThanEqual, 100i64)
        .edges()?;
    let by_time = c
        .add_query()
        .name("byTime")
        .type_name("knows")
        .has_any("time", vec![Value::Long(20), Value::Long(30)])
        .edges()?;
    c.add_query().name("props").properties()?;
    c.add_query().type_name("follows").edges()?;

    assert!(recent.plan().sub_queries().iter().all(|h| h.fitted));
    assert_eq!(by_time.slices().len(), 4);
    assert_eq!(c.get_slice_queries().len(), 7);

    let results = graph.execute(&c)?;
    // descending sort key: newest first
    assert_eq!(times(&results["recent"]), [100, 90, 80, 70, 60, 50]);
    let mut by_time = times(&results["byTime"]);
    by_time.sort_unstable();
    assert_eq!(by_time, [20, 20, 30]);
    let incoming: Vec<_> = results["byTime"]
        .iter()
        .filter(|r| r.direction == Direction::In)
        .map(|r| r.target.clone())
        .collect();
    assert_eq!(incoming, [RelationTarget::Vertex(VertexId(20))]);
    assert_eq!(results["props"].len(), 1);
    assert_eq!(results["props"][0].target, RelationTarget::Value("alice".into()));
    assert_eq!(results["follows"].len(), 1);
    assert_eq!(results["follows"][0].target, RelationTarget::Vertex(VertexId(30)));
    Ok(())
}

#[test]
fn unfitted_queries_read_up_to_the_hard_limit() -> Result<()> {
    let graph = Graph::open()?;
    let c = container(&graph).with_hard_limit(7);
    let filtered = c
        .add_query()
        .type_name("knows")
        .direction(Direction::Out)
        .has("time", Cmp::NotEqual, 40i64)
        .limit(3)
        .edges()?;
    assert_eq!(filtered.name(), "knows");
    assert!(filtered.slices().iter().all(|s| s.limit() == 7));
    let results = graph.execute(&c)?;
    assert_eq!(results["knows"].len(), 7);

    let limited = c
        .add_query()
        .name("limited")
        .type_name("knows")
        .direction(Direction::Out)
        .limit(3)
        .edges()?;
    assert!(limited.slices().iter().all(|s| s.limit() == 3));
    assert_eq!(graph.execute(&c)?["limited"].len(), 3);
    Ok(())
}

#[test]
fn duplicate_and_invalid_queries_are_rejected() -> Result<()> {
    let graph = Graph::open()?;
    let c = container(&graph);
    c.add_query().name("first").type_name("knows").edges()?;
    let duplicate = c.add_query().name("second").type_name("knows").edges();
    assert!(matches!(duplicate, Err(PenumbraError::Invalid(_))));
    let wrong_category = c.add_query().type_name("time").edges();
    assert!(matches!(wrong_category, Err(PenumbraError::Invalid(_))));
    let empty = c.add_query().name("never").type_name("knows").limit(0).edges()?;
    assert!(empty.slices().is_empty());
    assert_eq!(c.queries().len(), 2);
    assert_eq!(c.get_slice_queries().len(), 1);
    Ok(())
}
