//! Error types for the cache subsystem

use thiserror::Error;

use crate::codec::CodecError;

/// Errors surfaced by cache operations
///
/// Most failures never reach callers of an intercepted operation: read
/// failures degrade to a miss and corrupt journals are wiped. These variants
/// describe what a single store operation can report.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Reading or writing a cache file failed
    #[error("Cache IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A payload or journal record could not be (de)serialized
    #[error("Cache codec error: {0}")]
    Codec(#[from] CodecError),

    /// The journal could not be trusted and must be rebuilt
    #[error("Journal corrupt: {0}")]
    JournalCorrupt(String),

    /// The key cannot be used as a data file name inside the cache directory
    #[error("Invalid cache key {0:?}")]
    InvalidKey(String),

    /// The worker gave up on the operation without a result
    #[error("Cache operation aborted")]
    Aborted,

    /// The worker that owns the cache directory has stopped
    #[error("Cache worker is no longer running")]
    WorkerGone,
}

/// Result alias for cache operations
pub type Result<T, E = CacheError> = std::result::Result<T, E>;
