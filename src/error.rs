//! Error types for the batch-parallel forest structures.

use thiserror::Error;

/// Result type for fallible forest operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Resource exhaustion errors. Precondition violations (cyclic links, cuts of
/// missing edges) are not reported here; the structures trust their callers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Requested array is longer than the largest size class.
    #[error("Array of length {len} exceeds maximum supported length {max}")]
    ArrayTooLong { len: usize, max: usize },

    /// Every slot of a concurrent map holds a key or a tombstone.
    #[error("Concurrent map is full (capacity {capacity})")]
    MapFull { capacity: usize },

    /// Not enough free edge elements left for the requested links.
    #[error("Edge pool exhausted: {requested} edges requested, {available} available")]
    PoolExhausted { requested: usize, available: usize },
}
