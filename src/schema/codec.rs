//! Row encoding of schema vertices in the system store.
//!
//! Each schema vertex is one row keyed by its big-endian id:
//!
//! | column                                   | value                 |
//! |------------------------------------------|-----------------------|
//! | `0x01`                                   | name and category     |
//! | `0x02` + category                        | definition value      |
//! | `0x03` + direction + other id + category | edge modifier         |
//!
//! Categories and values are JSON encoded.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::primitives::bytes::buf::Cursor;
use crate::storage::{
    CacheTransaction, Entry, KcvsCache, KeySliceQuery, SliceQuery, StaticBuffer,
};
use crate::types::{Direction, PenumbraError, Result, SchemaId};

use super::definition::{
    DefinitionValue, Parameter, TypeDefinitionCategory, TypeDefinitionDescription,
    TypeDefinitionMap,
};
use super::source::{SchemaCategory, SchemaEdge, SchemaSource, SchemaVertex};

/// Store holding schema rows.
pub const SCHEMA_STORE: &str = "system_schema";

const HEADER: u8 = 0x01;
const DEFINITION: u8 = 0x02;
const EDGE: u8 = 0x03;

#[derive(Serialize, Deserialize)]
struct Header {
    name: String,
    category: SchemaCategory,
}

pub fn row_key(id: SchemaId) -> StaticBuffer {
    StaticBuffer::from_u64(id.0)
}

/// Slice covering every column of a schema row.
pub fn row_slice() -> SliceQuery {
    SliceQuery::new(
        StaticBuffer::copy_from(&[HEADER]),
        StaticBuffer::copy_from(&[EDGE + 1]),
    )
}

fn to_json<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value)
        .map_err(|err| PenumbraError::schema(format!("failed to encode schema value: {err}")))
}

fn from_json<'a, T: Deserialize<'a>>(bytes: &'a [u8]) -> Result<T> {
    serde_json::from_slice(bytes)
        .map_err(|err| PenumbraError::schema(format!("failed to decode schema value: {err}")))
}

fn direction_byte(dir: Direction) -> Result<u8> {
    match dir {
        Direction::Out => Ok(0),
        Direction::In => Ok(1),
        Direction::Both => Err(PenumbraError::invalid("schema edges have a proper direction")),
    }
}

pub fn encode_vertex(vertex: &SchemaVertex) -> Result<Vec<Entry>> {
    let mut entries = Vec::with_capacity(1 + vertex.definition().len() + vertex.edges().len());
    let header = Header {
        name: vertex.name().to_string(),
        category: vertex.category(),
    };
    entries.push(Entry::new(
        StaticBuffer::copy_from(&[HEADER]),
        StaticBuffer::from(to_json(&header)?),
    ));
    for (category, value) in vertex.definition().iter() {
        let mut column = vec![DEFINITION];
        column.extend(to_json(category)?);
        entries.push(Entry::new(
            StaticBuffer::from(column),
            StaticBuffer::from(to_json(value)?),
        ));
    }
    for edge in vertex.edges() {
        let mut column = vec![EDGE, direction_byte(edge.direction)?];
        column.extend_from_slice(&edge.other.0.to_be_bytes());
        column.extend(to_json(&edge.description.category)?);
        entries.push(Entry::new(
            StaticBuffer::from(column),
            StaticBuffer::from(to_json(&edge.description.modifier)?),
        ));
    }
    Ok(entries)
}

/// Rebuilds a schema vertex from its row; `None` when the row has no header.
pub fn decode_vertex(id: SchemaId, entries: &[Entry]) -> Result<Option<SchemaVertex>> {
    let mut header = None;
    let mut definition = TypeDefinitionMap::new();
    let mut edges = Vec::new();
    for entry in entries {
        let mut cursor = Cursor::new(entry.column());
        match cursor.take_u8()? {
            HEADER => header = Some(from_json::<Header>(entry.value())?),
            DEFINITION => {
                let category: TypeDefinitionCategory = from_json(cursor.rest())?;
                let value: DefinitionValue = from_json(entry.value())?;
                definition.set(category, value)?;
            }
            EDGE => {
                let direction = match cursor.take_u8()? {
                    0 => Direction::Out,
                    1 => Direction::In,
                    _ => return Err(PenumbraError::Corruption("schema edge direction")),
                };
                let other = SchemaId(cursor.take_u64()?);
                let category: TypeDefinitionCategory = from_json(cursor.rest())?;
                let modifier: Vec<Parameter> = from_json(entry.value())?;
                edges.push(SchemaEdge {
                    other,
                    direction,
                    description: TypeDefinitionDescription::with_modifier(category, modifier)?,
                });
            }
            _ => return Err(PenumbraError::Corruption("unknown schema column")),
        }
    }
    let Some(header) = header else {
        return Ok(None);
    };
    let mut vertex = SchemaVertex::new(id, header.name, header.category, definition);
    for edge in edges {
        vertex.add_edge(edge);
    }
    Ok(Some(vertex))
}

/// Buffers the row of `vertex` in `tx`, deleting columns it no longer has.
pub fn write_vertex(
    cache: &Arc<KcvsCache>,
    vertex: &SchemaVertex,
    tx: &mut CacheTransaction,
) -> Result<()> {
    let key = row_key(vertex.id());
    let existing = cache.get_slice(&KeySliceQuery::new(key.clone(), row_slice()), tx)?;
    let additions = encode_vertex(vertex)?;
    let deletions = existing
        .iter()
        .map(|e| e.column().clone())
        .filter(|col| !additions.iter().any(|a| a.column() == col))
        .collect();
    cache.mutate_entries(key, additions, deletions, tx)
}

pub fn read_vertex(
    cache: &KcvsCache,
    id: SchemaId,
    tx: &CacheTransaction,
) -> Result<Option<SchemaVertex>> {
    let entries = cache.get_slice(&KeySliceQuery::new(row_key(id), row_slice()), tx)?;
    decode_vertex(id, &entries)
}

/// Reads every schema row, ordered by id.
pub fn read_all(cache: &KcvsCache, tx: &CacheTransaction) -> Result<Vec<SchemaVertex>> {
    let slice = row_slice();
    let mut keys = Vec::new();
    for row in cache.get_keys(&slice, tx)? {
        keys.push(row?.key);
    }
    keys.sort();
    let mut rows = cache.get_multi_slice(&keys, &slice, tx)?;
    let mut vertices = Vec::with_capacity(keys.len());
    for key in keys {
        let id = Cursor::new(&key).take_u64().map(SchemaId)?;
        let entries = rows.remove(&key).unwrap_or_default();
        if let Some(vertex) = decode_vertex(id, &entries)? {
            vertices.push(vertex);
        }
    }
    Ok(vertices)
}
