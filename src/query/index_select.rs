//! Choosing a graph index to answer the conditions of a graph-centric query.

use std::sync::Arc;

use tracing::debug;

use crate::schema::{
    Cardinality, DataType, ElementCategory, IndexType, Mapping, ParameterIndexField,
    SchemaRegistry, SchemaStatus,
};
use crate::types::Result;

use super::condition::Condition;
use super::value::{Cmp, Predicate, Value};

/// How an index answers the conditions it covers.
#[derive(Clone, Debug, PartialEq)]
pub enum IndexCover {
    /// One lookup per combination of field values, in field order.
    Composite { values: Vec<Vec<Value>> },
    /// Conditions handed to the external index.
    Mixed { conditions: Vec<Condition> },
}

/// An index able to answer part of a query.
#[derive(Clone, Debug)]
pub struct IndexCandidate {
    pub index: Arc<IndexType>,
    /// Positions of the covered conditions in the query.
    pub covered: Vec<usize>,
    pub cover: IndexCover,
}

/// Picks the enabled index over `element` that covers the most conditions.
/// Ties favour composite indexes, then single-cardinality ones.
pub fn select_index(
    registry: &SchemaRegistry,
    element: ElementCategory,
    conditions: &[Condition],
) -> Result<Option<IndexCandidate>> {
    let mut best: Option<((usize, bool, bool), IndexCandidate)> = None;
    for index in registry.indexes()? {
        let Some(found) = candidate(&index, element, conditions)? else {
            continue;
        };
        let single = match index.as_composite() {
            Some(composite) => composite.cardinality()? == Cardinality::Single,
            None => false,
        };
        let rank = (found.covered.len(), index.is_composite(), single);
        if best.as_ref().map_or(true, |(top, _)| rank > *top) {
            best = Some((rank, found));
        }
    }
    if let Some((_, chosen)) = &best {
        debug!(
            index = chosen.index.name(),
            covered = chosen.covered.len(),
            "query.index.selected"
        );
    }
    Ok(best.map(|(_, chosen)| chosen))
}

/// What `index` can answer of `conditions`, or `None` when it cannot be used.
pub fn candidate(
    index: &Arc<IndexType>,
    element: ElementCategory,
    conditions: &[Condition],
) -> Result<Option<IndexCandidate>> {
    if index.status()? != SchemaStatus::Enabled || index.element_category()? != element {
        return Ok(None);
    }
    let mut covered = Vec::new();
    if let Some(label) = index.schema_type_constraint()? {
        let position = conditions.iter().position(|c| match c {
            Condition::HasLabel { labels } => labels.len() == 1 && labels[0] == label,
            _ => false,
        });
        match position {
            Some(pos) => covered.push(pos),
            None => return Ok(None),
        }
    }

    let cover = match index.as_ref() {
        IndexType::Composite(composite) => {
            let mut sets: Vec<&[Value]> = Vec::new();
            for field in composite.field_keys()?.iter() {
                let found = conditions.iter().enumerate().find_map(|(i, c)| {
                    (c.key() == Some(field.key.name()))
                        .then(|| c.equality_values())
                        .flatten()
                        .map(|values| (i, values))
                });
                let Some((i, values)) = found else {
                    return Ok(None);
                };
                covered.push(i);
                sets.push(values);
            }
            IndexCover::Composite {
                values: cartesian(&sets),
            }
        }
        IndexType::Mixed(mixed) => {
            let fields = mixed.field_keys()?;
            let mut answered = Vec::new();
            for (i, condition) in conditions.iter().enumerate() {
                let Some(key) = condition.key() else {
                    continue;
                };
                let supported = fields.iter().any(|f| {
                    f.status() == SchemaStatus::Enabled
                        && f.key().name() == key
                        && supports(f, condition)
                });
                if supported {
                    covered.push(i);
                    answered.push(condition.clone());
                }
            }
            if answered.is_empty() {
                return Ok(None);
            }
            IndexCover::Mixed {
                conditions: answered,
            }
        }
    };
    covered.sort_unstable();
    covered.dedup();
    Ok(Some(IndexCandidate {
        index: Arc::clone(index),
        covered,
        cover,
    }))
}

fn supports(field: &ParameterIndexField, condition: &Condition) -> bool {
    match condition {
        Condition::Has {
            predicate: Predicate::Cmp(Cmp::NotEqual),
            value: None,
            ..
        } => true,
        Condition::Has { value: None, .. } => false,
        Condition::Has {
            predicate: Predicate::Text(_),
            ..
        } => {
            field.mapping.supports_text()
                || (field.mapping == Mapping::Default
                    && field.key().data_type() == Some(DataType::Text))
        }
        Condition::Has { .. } | Condition::AnyOf { .. } => field.mapping != Mapping::Text,
        Condition::HasLabel { .. } => false,
    }
}

fn cartesian(sets: &[&[Value]]) -> Vec<Vec<Value>> {
    sets.iter().fold(vec![Vec::new()], |acc, set| {
        acc.iter()
            .flat_map(|prefix| {
                set.iter().map(move |value| {
                    let mut row = prefix.clone();
                    row.push(value.clone());
                    row
                })
            })
            .collect()
    })
}
