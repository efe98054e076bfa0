//! Column-interval reads: slice, key-slice, and key-range queries.

use std::cmp::Ordering;
use std::fmt;

use super::buffer::{Entry, EntryList, StaticBuffer};

/// Sentinel limit meaning "return every matching column".
pub const NO_LIMIT: usize = usize::MAX;

/// A read of all columns in `[start, end)` of a row, up to `limit` entries.
///
/// Equality and hashing cover both bounds and the limit: a result cached for
/// a small limit never answers a request for a larger one.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SliceQuery {
    start: StaticBuffer,
    end: StaticBuffer,
    limit: usize,
}

impl SliceQuery {
    /// Creates an unlimited slice. Panics when `start > end`.
    pub fn new(start: StaticBuffer, end: StaticBuffer) -> Self {
        assert!(start <= end, "slice start {start:?} sorts after end {end:?}");
        Self {
            start,
            end,
            limit: NO_LIMIT,
        }
    }

    /// Sets the limit in place, consuming the query.
    pub fn with_limit(mut self, limit: usize) -> Self {
        assert!(limit > 0, "slice limit must be positive");
        self.limit = limit;
        self
    }

    /// Returns a copy with the same bounds and a different limit.
    pub fn update_limit(&self, limit: usize) -> Self {
        self.clone().with_limit(limit)
    }

    pub fn start(&self) -> &StaticBuffer {
        &self.start
    }

    pub fn end(&self) -> &StaticBuffer {
        &self.end
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn has_limit(&self) -> bool {
        self.limit != NO_LIMIT
    }

    pub fn contains(&self, column: &StaticBuffer) -> bool {
        self.start <= *column && *column < self.end
    }

    /// Restricts an already sorted list of entries to this slice.
    pub fn apply(&self, entries: &[Entry]) -> EntryList {
        let selected = entries
            .iter()
            .filter(|e| self.contains(e.column()))
            .take(self.limit)
            .cloned()
            .collect();
        EntryList::from_sorted(selected)
    }
}

impl PartialOrd for SliceQuery {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SliceQuery {
    fn cmp(&self, other: &Self) -> Ordering {
        self.start
            .cmp(&other.start)
            .then_with(|| self.end.cmp(&other.end))
            .then_with(|| self.limit.cmp(&other.limit))
    }
}

impl fmt::Debug for SliceQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?},{:?})", self.start, self.end)?;
        if self.has_limit() {
            write!(f, "@{}", self.limit)?;
        }
        Ok(())
    }
}

/// A slice read against one row key; the primary cache key.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeySliceQuery {
    key: StaticBuffer,
    slice: SliceQuery,
}

impl KeySliceQuery {
    pub fn new(key: StaticBuffer, slice: SliceQuery) -> Self {
        Self { key, slice }
    }

    pub fn key(&self) -> &StaticBuffer {
        &self.key
    }

    pub fn slice(&self) -> &SliceQuery {
        &self.slice
    }

    pub fn with_limit(self, limit: usize) -> Self {
        Self {
            key: self.key,
            slice: self.slice.with_limit(limit),
        }
    }

    /// Estimated footprint of the query itself for cache weighing.
    pub fn byte_size(&self) -> usize {
        self.key.byte_size() + self.slice.start.byte_size() + self.slice.end.byte_size() + 16
    }
}

impl fmt::Debug for KeySliceQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}->{:?}", self.key, self.slice)
    }
}

/// A scan over keys in `[key_start, key_end)` returning each key's slice.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct KeyRangeQuery {
    key_start: StaticBuffer,
    key_end: StaticBuffer,
    slice: SliceQuery,
}

impl KeyRangeQuery {
    pub fn new(key_start: StaticBuffer, key_end: StaticBuffer, slice: SliceQuery) -> Self {
        assert!(key_start <= key_end, "key range start sorts after end");
        Self {
            key_start,
            key_end,
            slice,
        }
    }

    pub fn key_start(&self) -> &StaticBuffer {
        &self.key_start
    }

    pub fn key_end(&self) -> &StaticBuffer {
        &self.key_end
    }

    pub fn slice(&self) -> &SliceQuery {
        &self.slice
    }

    pub fn contains_key(&self, key: &StaticBuffer) -> bool {
        self.key_start <= *key && *key < self.key_end
    }
}
