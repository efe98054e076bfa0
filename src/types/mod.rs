#![forbid(unsafe_code)]
//! Identifiers and the crate-wide error type.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a graph vertex (user data or schema).
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct VertexId(pub u64);

/// Identifier of a single relation (edge or property instance).
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct RelationId(pub u64);

/// Identifier of a schema vertex: property key, edge label, or index.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
pub struct SchemaId(pub u64);

/// Direction of an edge relative to the vertex it is read from.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Serialize, Deserialize)]
pub enum Direction {
    Out,
    In,
    Both,
}

impl Direction {
    /// The two directions a stored relation can have.
    pub const PROPER: [Direction; 2] = [Direction::Out, Direction::In];

    pub fn is_proper(self) -> bool {
        self != Direction::Both
    }

    pub fn opposite(self) -> Direction {
        match self {
            Direction::Out => Direction::In,
            Direction::In => Direction::Out,
            Direction::Both => Direction::Both,
        }
    }

    /// Returns `true` when reading in `self` also returns relations stored in `dir`.
    pub fn covers(self, dir: Direction) -> bool {
        self == Direction::Both || self == dir
    }
}

#[derive(thiserror::Error, Debug)]
pub enum PenumbraError {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    /// Retriable storage failure (timeout, transient unavailability).
    #[error("temporary backend failure: {0}")]
    TemporaryBackend(String),
    /// Non-retriable storage failure (bad request, serialization error).
    #[error("permanent backend failure: {0}")]
    PermanentBackend(String),
    /// Violated precondition on the caller's side.
    #[error("invalid argument: {0}")]
    Invalid(String),
    /// Schema data that cannot be interpreted (missing or duplicate field positions).
    #[error("schema: {0}")]
    Schema(String),
    #[error("corruption: {0}")]
    Corruption(&'static str),
    #[error("config: {0}")]
    Config(String),
    #[error("{0} not found")]
    NotFound(&'static str),
}

impl PenumbraError {
    /// Returns `true` when retrying the failed operation may succeed.
    pub fn is_temporary(&self) -> bool {
        matches!(self, PenumbraError::TemporaryBackend(_))
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        PenumbraError::Invalid(msg.into())
    }

    pub(crate) fn schema(msg: impl Into<String>) -> Self {
        PenumbraError::Schema(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, PenumbraError>;

/// Fails with [`PenumbraError::Invalid`] when `cond` does not hold.
macro_rules! ensure {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            return Err($crate::types::PenumbraError::Invalid(format!($($arg)+)));
        }
    };
}
pub(crate) use ensure;

impl fmt::Display for VertexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for RelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for SchemaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for VertexId {
    fn from(value: u64) -> Self {
        VertexId(value)
    }
}

impl From<u64> for SchemaId {
    fn from(value: u64) -> Self {
        SchemaId(value)
    }
}

impl From<SchemaId> for u64 {
    fn from(value: SchemaId) -> Self {
        value.0
    }
}
