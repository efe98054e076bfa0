//! Penumbra: a slice cache over key-column-value stores and the schema and
//! query planning layer of a property graph built on top of it.
//!
//! * [`storage`] holds the backend contracts, the expiring slice cache, and
//!   the write-buffering [`storage::CacheTransaction`].
//! * [`schema`] wraps schema vertices as relation types and graph indexes.
//! * [`query`] plans vertex-centric queries into slice queries, batches them
//!   in a [`query::QueryContainer`], and selects graph indexes.

#![forbid(unsafe_code)]

pub mod config;
pub mod primitives;
pub mod query;
pub mod schema;
pub mod storage;
pub mod types;

pub use config::PenumbraConfig;
pub use types::{Direction, PenumbraError, RelationId, Result, SchemaId, VertexId};
