//! Translation of vertex-centric queries into backend slice queries.
//!
//! A query names relation types, a direction, has-conditions, orders, and a
//! limit. Conditions that can be expressed as intervals over a relation
//! type's sort key are answered by the slice itself; the planner picks, per
//! type and direction, the relation index whose sort key covers the most
//! of them and expands point sets into one slice per point.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::trace;

use crate::schema::{RelationType, SchemaStatus, SortKeyComponent, SortOrder, TypeInspector};
use crate::storage::{SliceQuery, NO_LIMIT};
use crate::types::{ensure, Direction, PenumbraError, Result, SchemaId, VertexId};

use super::condition::Condition;
use super::serializer::{EdgeSerializer, TypedInterval};
use super::value::{Cmp, Interval, Predicate, Value};
use super::{QueryLimits, RelationCategory};

const INT_MAX: usize = i32::MAX as usize;

/// A slice query plus what the planner knows about its result.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackendQueryHolder {
    pub query: SliceQuery,
    /// Every returned relation satisfies all conditions; no filtering needed.
    pub fitted: bool,
    /// Results arrive in the query's requested order.
    pub sorted: bool,
}

/// A planned vertex-centric query.
#[derive(Clone, Debug)]
pub struct BaseVertexCentricQuery {
    conditions: Vec<Condition>,
    direction: Direction,
    queries: Vec<BackendQueryHolder>,
    orders: Vec<(SchemaId, SortOrder)>,
    limit: usize,
    types: Vec<SchemaId>,
    category: RelationCategory,
}

impl BaseVertexCentricQuery {
    /// A query with no slices; it returns nothing.
    pub fn empty(category: RelationCategory) -> Self {
        Self {
            conditions: Vec::new(),
            direction: Direction::Both,
            queries: Vec::new(),
            orders: Vec::new(),
            limit: 0,
            types: Vec::new(),
            category,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    pub fn sub_queries(&self) -> &[BackendQueryHolder] {
        &self.queries
    }

    pub fn num_sub_queries(&self) -> usize {
        self.queries.len()
    }

    /// Conditions results must still be checked against when a slice is not fitted.
    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn orders(&self) -> &[(SchemaId, SortOrder)] {
        &self.orders
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Resolved relation types; empty for untyped queries.
    pub fn types(&self) -> &[SchemaId] {
        &self.types
    }

    /// Category of the returned relations, narrowed by the queried types.
    pub fn category(&self) -> RelationCategory {
        self.category
    }
}

type Constraints = FxHashMap<SortKeyComponent, Interval>;

/// Accumulates a vertex-centric query and plans it with [`build`](Self::build).
#[derive(Clone)]
pub struct VertexCentricQueryBuilder<'a> {
    inspector: &'a dyn TypeInspector,
    serializer: EdgeSerializer,
    limits: QueryLimits,
    has_modifications: bool,
    direction: Direction,
    types: Vec<String>,
    conditions: Vec<Condition>,
    orders: Vec<(String, SortOrder)>,
    limit: usize,
    adjacent: Option<VertexId>,
}

impl<'a> VertexCentricQueryBuilder<'a> {
    pub fn new(inspector: &'a dyn TypeInspector) -> Self {
        Self {
            inspector,
            serializer: EdgeSerializer::new(),
            limits: QueryLimits::default(),
            has_modifications: false,
            direction: Direction::Both,
            types: Vec::new(),
            conditions: Vec::new(),
            orders: Vec::new(),
            limit: NO_LIMIT,
            adjacent: None,
        }
    }

    pub fn limits(mut self, limits: QueryLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Marks the reading transaction as holding uncommitted changes, which
    /// widens slice limits slightly.
    pub fn tx_modified(mut self, modified: bool) -> Self {
        self.has_modifications = modified;
        self
    }

    pub fn direction(mut self, dir: Direction) -> Self {
        self.direction = dir;
        self
    }

    /// Restricts the query to relations of the named types.
    pub fn types<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.types.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn has(
        mut self,
        key: impl Into<String>,
        predicate: impl Into<Predicate>,
        value: impl Into<Value>,
    ) -> Self {
        self.conditions.push(Condition::has(key, predicate, value));
        self
    }

    /// Keeps relations without a value for `key`.
    pub fn has_not(mut self, key: impl Into<String>) -> Self {
        self.conditions.push(Condition::Has {
            key: key.into(),
            predicate: Predicate::Cmp(Cmp::Equal),
            value: None,
        });
        self
    }

    /// Keeps relations with some value for `key`.
    pub fn has_key(mut self, key: impl Into<String>) -> Self {
        self.conditions.push(Condition::exists(key));
        self
    }

    /// Keeps relations whose `key` equals one of `values`.
    pub fn has_any(mut self, key: impl Into<String>, values: Vec<Value>) -> Self {
        self.conditions.push(Condition::any_of(key, values));
        self
    }

    pub fn condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn order_by(mut self, key: impl Into<String>, order: SortOrder) -> Self {
        self.orders.push((key.into(), order));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Keeps edges whose other end is `vertex`.
    pub fn adjacent(mut self, vertex: VertexId) -> Self {
        self.adjacent = Some(vertex);
        self
    }

    /// The queried type name when exactly one was given.
    pub fn single_type(&self) -> Option<&str> {
        match self.types.as_slice() {
            [name] => Some(name),
            _ => None,
        }
    }

    /// Limit to request for a slice that leaves `remaining` conditions
    /// unanswered: doubled per condition so filtering still leaves `base`
    /// results, never below `base`, capped at the vertex hard limit.
    pub fn compute_limit(&self, remaining: usize, base: usize) -> usize {
        if base == NO_LIMIT {
            return base;
        }
        let adjusted = adjust_limit_for_modifications(self.has_modifications, remaining, base);
        base.max(adjusted.min(self.limits.vertex_hard_max_limit))
    }

    /// Plans the query for relations of `category`.
    pub fn build(&self, category: RelationCategory) -> Result<BaseVertexCentricQuery> {
        ensure!(
            self.adjacent.is_none() || category == RelationCategory::Edge,
            "adjacent vertex constraints only apply to edges"
        );
        if self.limit == 0 {
            return Ok(BaseVertexCentricQuery::empty(category));
        }
        let mut dir = self.direction;
        if category == RelationCategory::Property {
            if dir == Direction::In {
                return Ok(BaseVertexCentricQuery::empty(category));
            }
            dir = Direction::Out;
        }
        let orders = self.resolve_orders()?;
        let Some((conditions, intervals, fitted_conditions)) = self.compile_constraints()? else {
            return Ok(BaseVertexCentricQuery::empty(category));
        };

        let mut slice_limit = self.limit;
        let mut queries = Vec::new();
        let mut types = Vec::new();
        let mut result_category = category;
        if self.types.is_empty() {
            let fitted = (dir == Direction::Both
                || (category == RelationCategory::Property && dir == Direction::Out))
                && conditions.is_empty()
                && self.adjacent.is_none();
            if slice_limit != NO_LIMIT
                && slice_limit < INT_MAX / 3
                && dir != Direction::Both
                && matches!(category, RelationCategory::Edge | RelationCategory::Relation)
            {
                // about half of a single-direction scan is filtered out
                slice_limit *= 2;
            }
            let query = self
                .serializer
                .category_query(category)
                .with_limit(self.compute_limit(conditions.len(), slice_limit));
            queries.push(BackendQueryHolder {
                query,
                fitted,
                sorted: orders.is_empty(),
            });
        } else {
            if intervals.values().any(Interval::is_empty) {
                return Ok(BaseVertexCentricQuery::empty(category));
            }
            for name in &self.types {
                let Some(ty) = self.inspector.relation_type_by_name(name)? else {
                    continue;
                };
                types.push(ty.id());
                let mut type_dir = dir;
                if ty.is_property_key() {
                    ensure!(
                        result_category != RelationCategory::Edge,
                        "querying for edges but including property key {name}"
                    );
                    result_category = RelationCategory::Property;
                    type_dir = Direction::Out;
                } else {
                    ensure!(
                        result_category != RelationCategory::Property,
                        "querying for properties but including edge label {name}"
                    );
                    result_category = RelationCategory::Edge;
                    if let Some(only) = ty.unidirected() {
                        if type_dir == Direction::Both {
                            type_dir = only;
                        } else if type_dir != only {
                            continue;
                        }
                    }
                }

                if ty.is_edge_label()
                    && type_dir == Direction::Both
                    && intervals.is_empty()
                    && orders.is_empty()
                {
                    let query = self
                        .serializer
                        .type_query(self.inspector, &ty, Direction::Both, &[])?
                        .with_limit(slice_limit);
                    queries.push(BackendQueryHolder {
                        query,
                        fitted: fitted_conditions,
                        sorted: true,
                    });
                    continue;
                }

                let dirs: Vec<Direction> = match type_dir {
                    Direction::Both if ty.is_edge_label() => Direction::PROPER.to_vec(),
                    Direction::Both => vec![Direction::Out],
                    proper => vec![proper],
                };
                for direction in dirs {
                    let (best, sorted) = self.best_candidate(&ty, direction, &intervals, &orders)?;
                    let sort_key = best.extended_sort_key(direction);
                    let constraints = vec![None; sort_key.len()];
                    let plan = SlicePlan {
                        sort_key: &sort_key,
                        candidate: &best,
                        direction,
                        intervals: &intervals,
                        slice_limit,
                        fitted_conditions,
                        sorted,
                    };
                    self.construct_slice_queries(&plan, constraints, 0, &mut queries)?;
                }
            }
            if queries.is_empty() {
                return Ok(BaseVertexCentricQuery::empty(category));
            }
        }
        trace!(
            types = self.types.len(),
            slices = queries.len(),
            limit = self.limit,
            "query.vertex.planned"
        );
        Ok(BaseVertexCentricQuery {
            conditions,
            direction: dir,
            queries,
            orders,
            limit: self.limit,
            types,
            category: result_category,
        })
    }

    fn resolve_orders(&self) -> Result<Vec<(SchemaId, SortOrder)>> {
        let mut out = Vec::with_capacity(self.orders.len());
        for (name, order) in &self.orders {
            let key = self
                .inspector
                .relation_type_by_name(name)?
                .filter(|ty| ty.is_property_key())
                .ok_or_else(|| PenumbraError::invalid(format!("cannot order by unknown key {name}")))?;
            out.push((key.id(), *order));
        }
        ensure!(
            out.windows(2).all(|w| w[0].1 == w[1].1),
            "all orders of a vertex-centric query must share one direction"
        );
        Ok(out)
    }

    /// Compiles has-conditions into per-key intervals. Returns `None` when
    /// the query cannot match anything, and whether every condition became
    /// an interval.
    fn compile_constraints(&self) -> Result<Option<(Vec<Condition>, Constraints, bool)>> {
        let mut kept = Vec::with_capacity(self.conditions.len());
        let mut intervals = Constraints::default();
        let mut fitted = true;
        for condition in &self.conditions {
            let (ty, interval) = match condition {
                Condition::Has {
                    key,
                    predicate,
                    value,
                } => {
                    let Some(ty) = self.inspector.relation_type_by_name(key)? else {
                        let trivially_true = matches!(
                            (predicate, value),
                            (Predicate::Cmp(Cmp::Equal), None) | (Predicate::Cmp(Cmp::NotEqual), Some(_))
                        );
                        if trivially_true {
                            continue;
                        }
                        return Ok(None);
                    };
                    check_key(&ty, *predicate, value.iter())?;
                    let interval = match (predicate, value) {
                        (Predicate::Cmp(cmp), Some(v)) => Interval::from_cmp(*cmp, v),
                        _ => None,
                    };
                    (ty, interval)
                }
                Condition::AnyOf { key, values } => {
                    let Some(ty) = self.inspector.relation_type_by_name(key)? else {
                        return Ok(None);
                    };
                    if values.is_empty() {
                        return Ok(None);
                    }
                    check_key(&ty, Predicate::Cmp(Cmp::Equal), values.iter())?;
                    (ty, Some(Interval::points(values.clone())))
                }
                Condition::HasLabel { .. } => {
                    return Err(PenumbraError::invalid(
                        "label conditions do not apply to vertex-centric queries",
                    ))
                }
            };
            kept.push(condition.clone());
            match interval {
                Some(interval) => {
                    let component = SortKeyComponent::Key(ty.id());
                    let merged = match intervals.get(&component) {
                        Some(existing) => existing.intersect(&interval),
                        None => interval,
                    };
                    intervals.insert(component, merged);
                }
                None => fitted = false,
            }
        }
        if let Some(vertex) = self.adjacent {
            intervals.insert(
                SortKeyComponent::AdjacentId,
                Interval::point(Value::Id(vertex.0)),
            );
        }
        Ok(Some((kept, intervals, fitted)))
    }

    /// Scores the relation indexes of `ty` by how much of the query their
    /// sort key answers: points score 5 divided by their count, a range 1,
    /// and support for the requested order 3.
    fn best_candidate(
        &self,
        ty: &RelationType,
        direction: Direction,
        intervals: &Constraints,
        orders: &[(SchemaId, SortOrder)],
    ) -> Result<(Arc<RelationType>, bool)> {
        let common_order = orders.first().map(|(_, order)| *order);
        let mut best: Option<(f64, Arc<RelationType>, bool)> = None;
        for candidate in self.inspector.relation_indexes(ty)? {
            if !candidate.is_stored_in(direction) {
                continue;
            }
            if candidate.id() != ty.id() && candidate.status() != SchemaStatus::Enabled {
                continue;
            }
            let supports_order = common_order.map_or(true, |order| order == candidate.sort_order());
            let mut current_order = 0;
            let mut score = 0.0;
            for component in candidate.extended_sort_key(direction) {
                if current_order < orders.len()
                    && component == SortKeyComponent::Key(orders[current_order].0)
                {
                    current_order += 1;
                }
                match intervals.get(&component) {
                    Some(Interval::Points(points)) => score += 5.0 / points.len() as f64,
                    Some(_) => {
                        score += 1.0;
                        break;
                    }
                    None => break,
                }
            }
            let sorted = supports_order && current_order == orders.len();
            if sorted {
                score += 3.0;
            }
            if best.as_ref().map_or(true, |(top, _, _)| score > *top) {
                best = Some((score, candidate, sorted));
            }
        }
        let (_, candidate, sorted) = best.ok_or_else(|| {
            PenumbraError::invalid(format!(
                "schema does not support the query constraints for type {}",
                ty.name()
            ))
        })?;
        Ok((candidate, sorted))
    }

    fn construct_slice_queries(
        &self,
        plan: &SlicePlan<'_>,
        mut constraints: Vec<Option<TypedInterval>>,
        mut position: usize,
        out: &mut Vec<BackendQueryHolder>,
    ) -> Result<()> {
        if let Some(component) = plan.sort_key.get(position).copied() {
            if let Some(interval) = plan.intervals.get(&component) {
                constraints[position] = Some(TypedInterval {
                    component,
                    interval: interval.clone(),
                });
                position += 1;
                if let Interval::Points(points) = interval {
                    for point in points {
                        let mut expanded = constraints.clone();
                        expanded[position - 1] = Some(TypedInterval {
                            component,
                            interval: Interval::point(point.clone()),
                        });
                        self.construct_slice_queries(plan, expanded, position, out)?;
                    }
                    return Ok(());
                }
            }
        }
        let mut fitted = plan.fitted_conditions && position == plan.intervals.len();
        if fitted && position > 0 {
            // an open upper end also matches relations without a value
            if let Some(Some(last)) = constraints.get(position - 1) {
                if !last.interval.is_points() && last.interval.end().is_none() {
                    fitted = false;
                }
            }
        }
        let query = self
            .serializer
            .type_query(self.inspector, plan.candidate, plan.direction, &constraints)?
            .with_limit(self.compute_limit(plan.intervals.len() - position, plan.slice_limit));
        out.push(BackendQueryHolder {
            query,
            fitted,
            sorted: plan.sorted,
        });
        Ok(())
    }
}

/// Inputs shared by every level of slice expansion.
struct SlicePlan<'p> {
    sort_key: &'p [SortKeyComponent],
    candidate: &'p RelationType,
    direction: Direction,
    intervals: &'p Constraints,
    slice_limit: usize,
    fitted_conditions: bool,
    sorted: bool,
}

fn check_key<'v>(
    ty: &RelationType,
    predicate: Predicate,
    values: impl Iterator<Item = &'v Value>,
) -> Result<()> {
    let data_type = ty
        .data_type()
        .ok_or_else(|| PenumbraError::invalid(format!("{} is not a property key", ty.name())))?;
    for value in values {
        ensure!(
            value.data_type() == Some(data_type),
            "value {value} does not match key {} of type {data_type:?}",
            ty.name()
        );
        ensure!(
            !predicate.is_text() || value.as_text().is_some(),
            "text predicates need text values"
        );
    }
    Ok(())
}

/// Scales `limit` by `2^uncovered` (bounded by `i32::MAX`) and adds a small
/// allowance when the reading transaction has uncommitted changes.
pub(crate) fn adjust_limit_for_modifications(
    has_modifications: bool,
    uncovered: usize,
    limit: usize,
) -> usize {
    let mut limit = limit;
    if uncovered > 0 {
        let max_multiplier = INT_MAX / limit.max(1);
        let factor = if uncovered >= 31 {
            usize::MAX
        } else {
            1usize << uncovered
        };
        limit = limit.saturating_mul(max_multiplier.min(factor));
    }
    if has_modifications {
        limit += INT_MAX.saturating_sub(limit).min(5);
    }
    limit
}
