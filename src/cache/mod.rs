//! Persistent disk cache
//!
//! This module provides a journal-backed store that persists typed values to
//! the filesystem with per-entry expiry. The journal makes the index durable
//! across restarts and recoverable after a crash; a single worker thread owns
//! the directory so that reads and writes never interleave.

mod entry;
mod journal;
mod manager;

pub use entry::{CacheEntry, MAX_AGE_MILLIS};
pub use journal::{CacheStats, JournalStore, JOURNAL_FILE, JOURNAL_FILE_BACKUP, JOURNAL_FILE_TEMP};
pub use manager::CacheManager;
