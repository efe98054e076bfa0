#![forbid(unsafe_code)]
//! Query planning: vertex-centric slice construction, the query container,
//! and graph index selection.

pub mod condition;
pub mod container;
pub mod index_select;
pub mod serializer;
pub mod value;
pub mod vertex;

pub use condition::Condition;
pub use container::{Query, QueryBuilder, QueryContainer, DEFAULT_HARD_QUERY_LIMIT};
pub use index_select::{select_index, IndexCandidate, IndexCover};
pub use serializer::{EdgeSerializer, Relation, RelationTarget, TypedInterval};
pub use value::{Bound, Cmp, Interval, Predicate, TextPredicate, Value};
pub use vertex::{BackendQueryHolder, BaseVertexCentricQuery, VertexCentricQueryBuilder};

/// Kind of relations a vertex-centric query returns.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum RelationCategory {
    Edge,
    Property,
    Relation,
}

/// Upper bounds applied while planning queries.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct QueryLimits {
    /// Limit applied to slices whose results need in-memory filtering.
    pub hard_max_limit: usize,
    /// Largest limit produced by compensating for unfitted conditions.
    pub vertex_hard_max_limit: usize,
}

impl Default for QueryLimits {
    fn default() -> Self {
        Self {
            hard_max_limit: DEFAULT_HARD_QUERY_LIMIT,
            vertex_hard_max_limit: 300_000,
        }
    }
}
