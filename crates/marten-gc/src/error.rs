//! Collector error types.

use thiserror::Error;

/// Errors reported by the collector's fallible operations.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum GcError {
    /// The system allocator refused memory, even after a forced collection.
    #[error("system allocator exhausted")]
    OutOfMemory,

    /// Registry bookkeeping memory could not be allocated, even after a
    /// forced collection.
    #[error("allocation metadata exhausted")]
    MetadataExhausted,

    /// `realloc` was handed a non-null pointer this collector does not manage.
    #[error("pointer is not managed by this collector")]
    InvalidPointer,
}
