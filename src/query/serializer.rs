//! Column layout of relations in a vertex's adjacency row.
//!
//! A relation is stored as one entry in the row of each vertex it is
//! incident to:
//!
//! ```text
//! column = [category][type id][direction][sort key values][tail]
//! ```
//!
//! `category` is `0x10` for properties and `0x20` for edges, the type id is
//! big-endian, and direction is `0` (out) or `1` (in); properties are always
//! out. Sort key values use the order-preserving codecs and are bit-flipped
//! for descending types. The tail holds the implicit components of the
//! extended sort key (adjacent vertex id, relation id); whatever does not go
//! into the column is written to the entry value.

use crate::primitives::bytes::buf::Cursor;
use crate::primitives::bytes::ord;
use crate::schema::{
    Cardinality, DataType, RelationKind, RelationType, SortKeyComponent, SortOrder, TypeInspector,
};
use crate::storage::{Entry, SliceQuery, StaticBuffer};
use crate::types::{ensure, Direction, PenumbraError, RelationId, Result, SchemaId, VertexId};

use super::value::{Interval, Value};
use super::RelationCategory;

const PROPERTY_CATEGORY: u8 = 0x10;
const EDGE_CATEGORY: u8 = 0x20;

/// A constraint on one component of an extended sort key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypedInterval {
    pub component: SortKeyComponent,
    pub interval: Interval,
}

/// The other end of a relation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RelationTarget {
    Vertex(VertexId),
    Value(Value),
}

/// A relation as seen from one of its vertices.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Relation {
    pub id: RelationId,
    pub type_id: SchemaId,
    pub direction: Direction,
    pub target: RelationTarget,
    /// Values of the type's sort key, in sort key order.
    pub sort_values: Vec<Value>,
}

/// Encodes relations into entries and builds slice queries over them.
#[derive(Copy, Clone, Debug, Default)]
pub struct EdgeSerializer;

impl EdgeSerializer {
    pub fn new() -> Self {
        Self
    }

    /// Slice covering every relation of a category.
    pub fn category_query(&self, category: RelationCategory) -> SliceQuery {
        let (start, end) = match category {
            RelationCategory::Property => (PROPERTY_CATEGORY, PROPERTY_CATEGORY + 1),
            RelationCategory::Edge => (EDGE_CATEGORY, EDGE_CATEGORY + 1),
            RelationCategory::Relation => (PROPERTY_CATEGORY, EDGE_CATEGORY + 1),
        };
        SliceQuery::new(StaticBuffer::copy_from(&[start]), StaticBuffer::copy_from(&[end]))
    }

    /// Slice covering the relations of `ty` in `dir` that satisfy
    /// `constraints`, given in extended sort key order.
    ///
    /// Point constraints must hold a single value. Reading stops at the first
    /// missing constraint or after the first range.
    pub fn type_query(
        &self,
        inspector: &dyn TypeInspector,
        ty: &RelationType,
        dir: Direction,
        constraints: &[Option<TypedInterval>],
    ) -> Result<SliceQuery> {
        if dir == Direction::Both {
            ensure!(
                ty.is_edge_label(),
                "{} cannot be read in both directions",
                ty.name()
            );
            let mut start = vec![EDGE_CATEGORY];
            ord::push_u64(&mut start, ty.id().0);
            let end = next_bigger(&start)?;
            return Ok(SliceQuery::new(start.into(), end.into()));
        }
        ensure!(
            ty.is_stored_in(dir),
            "{} is not stored in direction {dir:?}",
            ty.name()
        );
        let mut col_start = Vec::with_capacity(32);
        write_prefix(&mut col_start, ty, dir)?;
        let mut col_end = col_start.clone();
        let key_start = col_start.len();
        let sort_len = ty.sort_key().len();
        let mut key_end = None;
        let mut range = None;
        for (i, constraint) in constraints.iter().enumerate() {
            let Some(TypedInterval {
                component,
                interval,
            }) = constraint
            else {
                break;
            };
            if i >= sort_len && key_end.is_none() {
                key_end = Some(col_start.len());
            }
            if interval.is_empty() {
                break;
            }
            let data_type = component_type(inspector, *component)?;
            match interval {
                Interval::Points(points) => {
                    ensure!(
                        points.len() == 1,
                        "slice constraints on {component:?} must be single points"
                    );
                    write_value(&mut col_start, &points[0], data_type)?;
                    write_value(&mut col_end, &points[0], data_type)?;
                }
                Interval::Range { start, end } => {
                    ensure!(i < sort_len, "implicit sort key components take points only");
                    if let Some(bound) = start {
                        write_value(&mut col_start, &bound.value, data_type)?;
                    }
                    if let Some(bound) = end {
                        write_value(&mut col_end, &bound.value, data_type)?;
                    }
                    let start_inclusive = start.as_ref().map_or(true, |b| b.inclusive);
                    let end_inclusive = end.as_ref().map_or(true, |b| b.inclusive);
                    range = Some(match ty.sort_order() {
                        SortOrder::Asc => {
                            let s = if start_inclusive {
                                col_start.clone()
                            } else {
                                next_bigger(&col_start)?
                            };
                            let e = if end_inclusive {
                                next_bigger(&col_end)?
                            } else {
                                col_end
                            };
                            (s, e)
                        }
                        SortOrder::Desc => {
                            flip(&mut col_start[key_start..]);
                            flip(&mut col_end[key_start..]);
                            let e = if start_inclusive {
                                next_bigger(&col_start)?
                            } else {
                                col_start.clone()
                            };
                            let s = if end_inclusive {
                                col_end
                            } else {
                                next_bigger(&col_end)?
                            };
                            (s, e)
                        }
                    });
                    break;
                }
            }
        }
        let (start, end) = match range {
            Some(bounds) => bounds,
            None => {
                if ty.sort_order() == SortOrder::Desc {
                    let key_end = key_end.unwrap_or(col_start.len());
                    flip(&mut col_start[key_start..key_end]);
                }
                let end = next_bigger(&col_start)?;
                (col_start, end)
            }
        };
        ensure!(start <= end, "constraints on {} yield an inverted slice", ty.name());
        Ok(SliceQuery::new(start.into(), end.into()))
    }

    /// Encodes `relation` as stored in the row of the vertex it is read from.
    pub fn write_relation(
        &self,
        inspector: &dyn TypeInspector,
        ty: &RelationType,
        relation: &Relation,
    ) -> Result<Entry> {
        let dir = relation.direction;
        ensure!(dir.is_proper(), "relations are stored in a proper direction");
        ensure!(
            ty.is_stored_in(dir),
            "{} is not stored in direction {dir:?}",
            ty.name()
        );
        ensure!(
            relation.sort_values.len() == ty.sort_key().len(),
            "{} expects {} sort key values, got {}",
            ty.name(),
            ty.sort_key().len(),
            relation.sort_values.len()
        );
        let mut column = Vec::with_capacity(32);
        write_prefix(&mut column, ty, dir)?;
        let key_start = column.len();
        for (key, value) in ty.sort_key().iter().zip(&relation.sort_values) {
            let data_type = component_type(inspector, SortKeyComponent::Key(*key))?;
            write_value(&mut column, value, data_type)?;
        }
        if ty.sort_order() == SortOrder::Desc {
            flip(&mut column[key_start..]);
        }
        let mut value = Vec::with_capacity(16);
        let multiplicity = ty.multiplicity();
        match (&relation.target, ty.kind()) {
            (RelationTarget::Vertex(adjacent), RelationKind::EdgeLabel) => {
                let adjacent_dst = if multiplicity.is_unique(dir) {
                    &mut value
                } else {
                    &mut column
                };
                ord::push_u64(adjacent_dst, adjacent.0);
                let id_dst = if multiplicity.is_constrained() {
                    &mut value
                } else {
                    &mut column
                };
                ord::push_u64(id_dst, relation.id.0);
            }
            (
                RelationTarget::Value(v),
                RelationKind::PropertyKey {
                    data_type,
                    cardinality,
                },
            ) => match cardinality {
                Cardinality::Single => {
                    write_value(&mut value, v, Some(*data_type))?;
                    ord::push_u64(&mut value, relation.id.0);
                }
                Cardinality::Set => {
                    write_value(&mut column, v, Some(*data_type))?;
                    ord::push_u64(&mut value, relation.id.0);
                }
                Cardinality::List => {
                    ord::push_u64(&mut column, relation.id.0);
                    write_value(&mut value, v, Some(*data_type))?;
                }
            },
            _ => {
                return Err(PenumbraError::invalid(format!(
                    "relation target does not match type {}",
                    ty.name()
                )))
            }
        }
        Ok(Entry::new(column.into(), value.into()))
    }

    /// Decodes an entry written by [`write_relation`](Self::write_relation).
    pub fn parse_relation(&self, inspector: &dyn TypeInspector, entry: &Entry) -> Result<Relation> {
        let mut cursor = Cursor::new(entry.column());
        let category = cursor.take_u8()?;
        let type_id = SchemaId(cursor.take_u64()?);
        let dir = match cursor.take_u8()? {
            0 => Direction::Out,
            1 => Direction::In,
            _ => return Err(PenumbraError::Corruption("relation direction")),
        };
        let ty = inspector.relation_type(type_id)?;
        let expected = if ty.is_property_key() {
            PROPERTY_CATEGORY
        } else {
            EDGE_CATEGORY
        };
        if category != expected {
            return Err(PenumbraError::Corruption("relation category"));
        }

        let mut sort_values = Vec::with_capacity(ty.sort_key().len());
        if !ty.sort_key().is_empty() {
            let rest = cursor.rest();
            let plain: Vec<u8> = match ty.sort_order() {
                SortOrder::Asc => rest.to_vec(),
                SortOrder::Desc => rest.iter().map(|b| !b).collect(),
            };
            let mut keys = Cursor::new(&plain);
            for key in ty.sort_key() {
                let data_type = component_type(inspector, SortKeyComponent::Key(*key))?;
                sort_values.push(read_value(&mut keys, data_type)?);
            }
            let consumed = plain.len() - keys.rest().len();
            cursor.take(consumed)?;
        }

        let mut value = Cursor::new(entry.value());
        let multiplicity = ty.multiplicity();
        let (target, id) = match ty.kind() {
            RelationKind::EdgeLabel => {
                let adjacent = if multiplicity.is_unique(dir) {
                    value.take_u64()?
                } else {
                    cursor.take_u64()?
                };
                let id = if multiplicity.is_constrained() {
                    value.take_u64()?
                } else {
                    cursor.take_u64()?
                };
                (RelationTarget::Vertex(VertexId(adjacent)), id)
            }
            RelationKind::PropertyKey {
                data_type,
                cardinality,
            } => {
                let data_type = Some(*data_type);
                match cardinality {
                    Cardinality::Single => {
                        let v = read_value(&mut value, data_type)?;
                        (RelationTarget::Value(v), value.take_u64()?)
                    }
                    Cardinality::Set => {
                        let v = read_value(&mut cursor, data_type)?;
                        (RelationTarget::Value(v), value.take_u64()?)
                    }
                    Cardinality::List => {
                        let id = cursor.take_u64()?;
                        (RelationTarget::Value(read_value(&mut value, data_type)?), id)
                    }
                }
            }
        };
        Ok(Relation {
            id: RelationId(id),
            type_id,
            direction: dir,
            target,
            sort_values,
        })
    }
}

fn write_prefix(out: &mut Vec<u8>, ty: &RelationType, dir: Direction) -> Result<()> {
    let (category, dir_byte) = match (ty.is_property_key(), dir) {
        (true, Direction::Out) => (PROPERTY_CATEGORY, 0),
        (false, Direction::Out) => (EDGE_CATEGORY, 0),
        (false, Direction::In) => (EDGE_CATEGORY, 1),
        _ => {
            return Err(PenumbraError::invalid(format!(
                "{} has no column prefix for {dir:?}",
                ty.name()
            )))
        }
    };
    out.push(category);
    ord::push_u64(out, ty.id().0);
    out.push(dir_byte);
    Ok(())
}

fn component_type(
    inspector: &dyn TypeInspector,
    component: SortKeyComponent,
) -> Result<Option<DataType>> {
    match component {
        SortKeyComponent::Key(id) => {
            let key = inspector.relation_type(id)?;
            key.data_type().map(Some).ok_or_else(|| {
                PenumbraError::schema(format!("sort key {} is not a property key", key.name()))
            })
        }
        SortKeyComponent::AdjacentId | SortKeyComponent::RelationId => Ok(None),
    }
}

fn write_value(out: &mut Vec<u8>, value: &Value, data_type: Option<DataType>) -> Result<()> {
    match (value, data_type) {
        (Value::Bool(v), Some(DataType::Boolean)) => out.push(u8::from(*v)),
        (Value::Long(v), Some(DataType::Long)) => ord::push_i64(out, *v),
        (Value::Double(v), Some(DataType::Double)) => {
            ensure!(!v.is_nan(), "NaN cannot be stored");
            ord::push_f64(out, *v);
        }
        (Value::Text(v), Some(DataType::Text)) => ord::push_str(out, v),
        (Value::Id(v), None) => ord::push_u64(out, *v),
        (value, expected) => {
            return Err(PenumbraError::invalid(format!(
                "value {value} does not match {expected:?}"
            )))
        }
    }
    Ok(())
}

fn read_value(cursor: &mut Cursor<'_>, data_type: Option<DataType>) -> Result<Value> {
    let truncated = PenumbraError::Corruption("value truncated");
    Ok(match data_type {
        Some(DataType::Boolean) => match cursor.take_u8()? {
            0 => Value::Bool(false),
            1 => Value::Bool(true),
            _ => return Err(PenumbraError::Corruption("boolean value")),
        },
        Some(DataType::Long) => Value::Long(ord::get_i64_be(cursor.take(8)?).ok_or(truncated)?),
        Some(DataType::Double) => Value::Double(ord::get_f64_be(cursor.take(8)?).ok_or(truncated)?),
        Some(DataType::Text) => {
            let (text, consumed) = ord::split_str(cursor.rest()).ok_or(truncated)?;
            cursor.take(consumed)?;
            Value::Text(text)
        }
        None => Value::Id(cursor.take_u64()?),
    })
}

fn next_bigger(bytes: &[u8]) -> Result<Vec<u8>> {
    StaticBuffer::copy_from(bytes)
        .next_prefix()
        .map(|b| b.to_vec())
        .ok_or(PenumbraError::Corruption("column has no successor"))
}

fn flip(bytes: &mut [u8]) {
    for b in bytes {
        *b = !*b;
    }
}
