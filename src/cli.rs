//! Command-line interface parsing for offcache
//!
//! This module handles parsing of CLI arguments using clap and the plain-text
//! rendering of cache state printed by the subcommands.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use thiserror::Error;

use crate::cache::{CacheEntry, CacheStats};
use crate::config::CacheConfig;
use crate::remote::{RemotePolicy, DEFAULT_OFFLINE_TTL};

/// Error types for CLI argument handling
#[derive(Debug, Error)]
pub enum CliError {
    /// Neither `--dir`, `OFFCACHE_DIR` nor a home directory is available
    #[error("No cache directory could be determined; pass --dir or set OFFCACHE_DIR")]
    NoCacheDirectory,

    /// `--offline-ttl` shorter than `--ttl`
    #[error("Invalid offline TTL: {offline}s is shorter than the {ttl}s TTL")]
    OfflineTtlTooShort { ttl: u64, offline: u64 },
}

/// offcache - Inspect and use a journaled offline cache
#[derive(Parser, Debug)]
#[command(name = "offcache")]
#[command(about = "offcache: a journaled disk cache with offline fallback")]
#[command(version)]
pub struct Cli {
    /// Cache directory (defaults to $OFFCACHE_DIR, then the platform cache dir)
    #[arg(long, global = true, value_name = "PATH")]
    pub dir: Option<PathBuf>,

    /// Log cache activity at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Show entry and journal record counts
    Stats,

    /// Drop expired entries and compact the journal
    Sweep,

    /// Delete every cached entry
    Clear,

    /// Show the metadata recorded for one key
    Inspect {
        /// Cache key (32 hex digits)
        key: String,
    },

    /// Fetch a URL through the cache and print the body
    ///
    /// Examples:
    ///   offcache fetch https://example.com                   # Cached for 5 minutes
    ///   offcache fetch https://example.com --offline-ttl 3600 # Stale copy if offline
    ///   offcache fetch https://example.com --fresh           # Skip the cached copy
    Fetch {
        /// URL to fetch
        url: String,

        /// Seconds a fetched body is served without refetching
        #[arg(long, default_value_t = 300, value_name = "SECS")]
        ttl: u64,

        /// Seconds a fetched body may stand in for a failed fetch
        #[arg(long, value_name = "SECS")]
        offline_ttl: Option<u64>,

        /// Always refetch, updating the cached copy
        #[arg(long)]
        fresh: bool,
    },
}

impl Cli {
    /// Resolves the cache location from `--dir`, `OFFCACHE_DIR`, or the
    /// platform cache directory.
    ///
    /// # Returns
    /// * `Ok(CacheConfig)` for the first location found
    /// * `Err(CliError::NoCacheDirectory)` if none is available
    pub fn cache_config(&self) -> Result<CacheConfig, CliError> {
        CacheConfig::resolve(self.dir.clone()).ok_or(CliError::NoCacheDirectory)
    }
}

/// Builds the cache windows for `fetch` from its flags.
///
/// # Arguments
/// * `ttl` - Freshness window in seconds
/// * `offline_ttl` - Offline window in seconds, defaults to 24 hours (or `ttl`
///   if that is longer)
///
/// # Returns
/// * `Ok(RemotePolicy)` when the offline window is at least the freshness window
/// * `Err(CliError::OfflineTtlTooShort)` otherwise
pub fn fetch_policy(ttl: u64, offline_ttl: Option<u64>) -> Result<RemotePolicy, CliError> {
    let ttl = Duration::from_secs(ttl);
    let offline_ttl = offline_ttl
        .map(Duration::from_secs)
        .unwrap_or_else(|| DEFAULT_OFFLINE_TTL.max(ttl));

    if offline_ttl < ttl {
        return Err(CliError::OfflineTtlTooShort {
            ttl: ttl.as_secs(),
            offline: offline_ttl.as_secs(),
        });
    }

    Ok(RemotePolicy { ttl, offline_ttl })
}

/// Renders cache statistics, one `name: value` per line
pub fn format_stats(stats: &CacheStats) -> String {
    let mut out = format!(
        "directory: {}\nentries: {}\njournal records: {}",
        stats.directory.display(),
        stats.entries,
        stats.journal_records
    );
    if stats.has_journal_errors {
        out.push_str("\njournal errors: pending compaction");
    }
    out
}

/// Renders an entry's metadata, one `name: value` per line
pub fn format_entry(entry: &CacheEntry) -> String {
    format!(
        "key: {}\ncreated: {}\nexpires: {}\nmax age: {}s",
        entry.key,
        entry.created_at.to_rfc3339(),
        entry.expires_at.to_rfc3339(),
        entry.max_age_millis / 1000
    )
}
