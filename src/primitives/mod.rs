//! Low-level primitives shared by the storage and query layers.

/// Order-preserving encodings and a bounds-checked read cursor.
pub mod bytes;
