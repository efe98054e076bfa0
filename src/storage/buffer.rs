//! Immutable byte buffers and the entries they form.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use bytes::Bytes;

/// Fixed per-buffer overhead used by cache weight estimation.
const BUFFER_OVERHEAD: usize = 32;

/// An immutable, cheaply cloneable byte sequence.
///
/// Ordering is lexicographic over unsigned bytes; equality and hashing are
/// value based.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StaticBuffer(Bytes);

impl StaticBuffer {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    pub const fn empty() -> Self {
        Self(Bytes::new())
    }

    pub fn copy_from(bytes: &[u8]) -> Self {
        Self(Bytes::copy_from_slice(bytes))
    }

    /// Big-endian encoding of `v`, the conventional test key/column shape.
    pub fn from_u32(v: u32) -> Self {
        Self::copy_from(&v.to_be_bytes())
    }

    pub fn from_u64(v: u64) -> Self {
        Self::copy_from(&v.to_be_bytes())
    }

    /// A buffer of `len` zero bytes, the smallest buffer of that length.
    pub fn zero(len: usize) -> Self {
        Self(Bytes::from(vec![0u8; len]))
    }

    /// A buffer of `len` `0xFF` bytes, the largest buffer of that length.
    pub fn one(len: usize) -> Self {
        Self(Bytes::from(vec![0xFFu8; len]))
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Zero-copy sub-range of this buffer.
    pub fn sub(&self, start: usize, end: usize) -> Self {
        Self(self.0.slice(start..end))
    }

    pub fn starts_with(&self, prefix: &StaticBuffer) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// The smallest buffer that sorts after every buffer prefixed by `self`,
    /// or `None` when all bytes are `0xFF`. Trailing `0xFF` bytes are dropped
    /// before incrementing, so the result may be shorter than `self`.
    pub fn next_prefix(&self) -> Option<Self> {
        let mut bytes = self.0.to_vec();
        while let Some(last) = bytes.last_mut() {
            if *last == 0xFF {
                bytes.pop();
                continue;
            }
            *last += 1;
            return Some(Self(Bytes::from(bytes)));
        }
        None
    }

    /// Estimated heap footprint used for cache weighing.
    pub fn byte_size(&self) -> usize {
        BUFFER_OVERHEAD + self.0.len()
    }
}

impl Deref for StaticBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for StaticBuffer {
    fn from(value: Vec<u8>) -> Self {
        Self(Bytes::from(value))
    }
}

impl From<&'static [u8]> for StaticBuffer {
    fn from(value: &'static [u8]) -> Self {
        Self(Bytes::from_static(value))
    }
}

impl fmt::Debug for StaticBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(&self.0))
    }
}

impl fmt::Display for StaticBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0))
    }
}

/// Optional per-entry metadata carried alongside the column/value pair.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct EntryMeta {
    /// Time-to-live in seconds, if the backend should expire the cell.
    pub ttl_secs: Option<u32>,
}

/// A single column/value cell of a row.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Entry {
    column: StaticBuffer,
    value: StaticBuffer,
    meta: EntryMeta,
}

impl Entry {
    pub fn new(column: StaticBuffer, value: StaticBuffer) -> Self {
        Self {
            column,
            value,
            meta: EntryMeta::default(),
        }
    }

    pub fn with_ttl(mut self, ttl_secs: u32) -> Self {
        self.meta.ttl_secs = Some(ttl_secs);
        self
    }

    pub fn column(&self) -> &StaticBuffer {
        &self.column
    }

    pub fn value(&self) -> &StaticBuffer {
        &self.value
    }

    pub fn meta(&self) -> EntryMeta {
        self.meta
    }

    pub fn byte_size(&self) -> usize {
        self.column.byte_size() + self.value.byte_size()
    }
}

/// The column-sorted entries of one row returned by a slice read.
///
/// Cloning shares the underlying storage, so lists handed out by the cache
/// are never copied entry by entry.
#[derive(Clone, PartialEq, Eq)]
pub struct EntryList {
    entries: Arc<[Entry]>,
    byte_size: usize,
}

impl EntryList {
    pub fn empty() -> Self {
        Self::from_sorted(Vec::new())
    }

    /// Wraps entries that are already sorted by column.
    pub fn from_sorted(entries: Vec<Entry>) -> Self {
        debug_assert!(
            entries.windows(2).all(|w| w[0].column < w[1].column),
            "entry list must be strictly sorted by column"
        );
        let byte_size = entries.iter().map(Entry::byte_size).sum();
        Self {
            entries: entries.into(),
            byte_size,
        }
    }

    /// Sorts by column; for duplicate columns the last entry wins.
    pub fn from_unsorted(mut entries: Vec<Entry>) -> Self {
        entries.reverse();
        entries.sort_by(|a, b| a.column.cmp(&b.column));
        entries.dedup_by(|later, earlier| later.column == earlier.column);
        Self::from_sorted(entries)
    }

    /// Estimated heap footprint used for cache weighing.
    pub fn byte_size(&self) -> usize {
        self.byte_size
    }

    pub fn to_vec(&self) -> Vec<Entry> {
        self.entries.to_vec()
    }
}

impl Default for EntryList {
    fn default() -> Self {
        Self::empty()
    }
}

impl Deref for EntryList {
    type Target = [Entry];

    fn deref(&self) -> &[Entry] {
        &self.entries
    }
}

impl From<Vec<Entry>> for EntryList {
    fn from(value: Vec<Entry>) -> Self {
        Self::from_unsorted(value)
    }
}

impl fmt::Debug for EntryList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.entries.iter()).finish()
    }
}
