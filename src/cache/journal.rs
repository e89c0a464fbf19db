//! Journal-backed cache store
//!
//! `JournalStore` keeps an in-memory index of [`CacheEntry`] records that is
//! rebuilt from an append-only journal file on first access. Each entry's
//! payload lives in its own data file, named by the entry key, next to the
//! journal.
//!
//! The journal is plain UTF-8: a version line followed by one JSON record per
//! line. Every put appends a record and every removal appends a tombstone;
//! the journal is compacted (rewritten with only live entries) when loading
//! finds superseded records, a truncated tail, or expired entries.
//!
//! The store is synchronous and not thread-safe on purpose. It is meant to be
//! owned by a single worker, see [`CacheManager`](super::CacheManager).

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use super::CacheEntry;
use crate::clock::Clock;
use crate::codec::{EntryCodec, PayloadType};
use crate::error::{CacheError, Result};

/// Name of the journal file
pub const JOURNAL_FILE: &str = "journal";
/// Name of the journal being written during compaction
pub const JOURNAL_FILE_TEMP: &str = "journal.tmp";
/// Name of the previous journal while it is being replaced
pub const JOURNAL_FILE_BACKUP: &str = "journal.bkp";

/// Suffix of a data file while it is being written
const DATA_FILE_TEMP_SUFFIX: &str = ".tmp";

/// Summary of the store's current state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    /// Directory owned by the store
    pub directory: PathBuf,
    /// Number of entries in the index
    pub entries: usize,
    /// Number of records in the journal file
    pub journal_records: usize,
    /// Whether a journal append has failed since the last compaction
    pub has_journal_errors: bool,
}

/// Durable key to entry index backed by a journal and one file per entry
#[derive(Debug)]
pub struct JournalStore {
    directory: PathBuf,
    version: u32,
    codec: EntryCodec,
    clock: Arc<dyn Clock>,
    entries: HashMap<String, CacheEntry>,
    journal_writer: Option<BufWriter<File>>,
    journal_records: usize,
    has_journal_errors: bool,
    swept_on_load: usize,
    initialized: bool,
}

impl JournalStore {
    /// Creates a store over `directory`
    ///
    /// Nothing touches the disk until the first operation.
    pub fn new(directory: impl Into<PathBuf>, version: u32, clock: Arc<dyn Clock>) -> Self {
        Self {
            directory: directory.into(),
            version,
            codec: EntryCodec,
            clock,
            entries: HashMap::with_capacity(256),
            journal_writer: None,
            journal_records: 0,
            has_journal_errors: false,
            swept_on_load: 0,
            initialized: false,
        }
    }

    /// Directory owned by this store
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Current time according to the store's clock
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn journal_path(&self) -> PathBuf {
        self.directory.join(JOURNAL_FILE)
    }

    fn data_path(&self, key: &str) -> PathBuf {
        self.directory.join(key)
    }

    /// Checks that `key` names a data file the store may own
    ///
    /// Keys are plain file names made of ASCII letters, digits, `-` and `_`,
    /// and may not shadow the journal files.
    fn validate_key(key: &str) -> Result<()> {
        let plain = !key.is_empty()
            && key
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
        if !plain || key.starts_with(JOURNAL_FILE) {
            return Err(CacheError::InvalidKey(key.to_string()));
        }
        Ok(())
    }

    /// Loads the index from disk if that has not happened yet
    ///
    /// Recovery order: resolve a leftover backup journal, read the journal
    /// (or create an empty one), then sweep expired entries. If the journal
    /// cannot be read, the directory is wiped and the cache starts cold.
    pub fn initialize(&mut self) -> Result<()> {
        if self.initialized {
            return Ok(());
        }

        fs::create_dir_all(&self.directory)?;

        self.swept_on_load = 0;
        if let Err(e) = self.restore_backup().and_then(|()| self.load()) {
            warn!(
                directory = %self.directory.display(),
                error = %e,
                "Cache journal unreadable, wiping cache"
            );
            self.wipe()?;
        }

        if self.journal_writer.is_none() {
            self.journal_writer = Some(self.open_journal_writer()?);
        }
        self.initialized = true;

        debug!(
            directory = %self.directory.display(),
            entries = self.entries.len(),
            "Cache initialized"
        );
        Ok(())
    }

    /// Brings back the journal a compaction was in the middle of replacing
    fn restore_backup(&self) -> Result<()> {
        let backup = self.directory.join(JOURNAL_FILE_BACKUP);
        if !backup.exists() {
            return Ok(());
        }

        let journal = self.journal_path();
        if journal.exists() {
            fs::remove_file(&backup)?;
        } else {
            fs::rename(&backup, &journal)?;
        }
        Ok(())
    }

    fn load(&mut self) -> Result<()> {
        self.entries.clear();
        remove_if_exists(&self.directory.join(JOURNAL_FILE_TEMP))?;

        let journal = self.journal_path();
        if !journal.exists() {
            return self.rebuild();
        }

        let mut lines = BufReader::new(File::open(&journal)?).lines();

        let version_line = lines
            .next()
            .transpose()?
            .ok_or_else(|| CacheError::JournalCorrupt("missing version line".to_string()))?;
        let version: u32 = version_line.trim().parse().map_err(|_| {
            CacheError::JournalCorrupt(format!("bad version line {:?}", version_line))
        })?;
        if version != self.version {
            return Err(CacheError::JournalCorrupt(format!(
                "unexpected version: required {}, found {}",
                self.version, version
            )));
        }

        let mut record_count = 0;
        let mut truncated = false;
        for line in lines {
            let line = match line {
                Ok(line) => line,
                // A torn multi-byte character at the tail
                Err(e) if e.kind() == ErrorKind::InvalidData => {
                    truncated = true;
                    break;
                }
                Err(e) => return Err(e.into()),
            };

            let record = self
                .codec
                .decode_entry(&line)
                .map_err(CacheError::from)
                .and_then(|entry| Self::validate_key(&entry.key).map(|()| entry));
            match record {
                Ok(entry) => {
                    self.entries.insert(entry.key.clone(), entry);
                    record_count += 1;
                }
                Err(e) => {
                    debug!(records = record_count, error = %e, "Cache journal truncated");
                    truncated = true;
                    break;
                }
            }
        }
        self.journal_records = record_count;

        if truncated || record_count > self.entries.len() {
            self.rebuild()?;
        }

        self.swept_on_load = self.sweep_expired()?;
        Ok(())
    }

    /// Drops tombstoned and expired entries along with their data files
    ///
    /// Compacts the journal when anything was removed. Returns the number of
    /// entries dropped.
    pub fn sweep_expired(&mut self) -> Result<usize> {
        let now = self.clock.now();
        let doomed: Vec<String> = self
            .entries
            .values()
            .filter(|entry| entry.is_sweepable_at(now))
            .map(|entry| entry.key.clone())
            .collect();

        for key in &doomed {
            remove_if_exists(&self.data_path(key))?;
            self.entries.remove(key);
        }

        if !doomed.is_empty() {
            debug!(removed = doomed.len(), "Swept expired cache entries");
            self.rebuild()?;
        }
        Ok(doomed.len())
    }

    /// Initializes if needed, then drops expired entries
    ///
    /// The count includes entries removed by the startup sweep when this call
    /// is what loaded the journal.
    pub fn sweep(&mut self) -> Result<usize> {
        let swept_on_load = if self.initialized {
            0
        } else {
            self.initialize()?;
            self.swept_on_load
        };
        Ok(swept_on_load + self.sweep_expired()?)
    }

    /// Rewrites the journal with only the entries currently in the index
    ///
    /// The new journal is written to a temp file first and swapped in with
    /// renames, so a crash leaves either the old or the new journal (or a
    /// backup that [`initialize`](Self::initialize) knows how to restore).
    fn rebuild(&mut self) -> Result<()> {
        self.close_writer();

        let temp = self.directory.join(JOURNAL_FILE_TEMP);
        let mut writer = BufWriter::new(File::create(&temp)?);
        writeln!(writer, "{}", self.version)?;
        for entry in self.entries.values() {
            writeln!(writer, "{}", self.codec.encode_entry(entry)?)?;
        }
        writer.into_inner().map_err(|e| e.into_error())?.sync_all()?;

        let journal = self.journal_path();
        if journal.exists() {
            let backup = self.directory.join(JOURNAL_FILE_BACKUP);
            fs::rename(&journal, &backup)?;
            fs::rename(&temp, &journal)?;
            remove_if_exists(&backup)?;
        } else {
            fs::rename(&temp, &journal)?;
        }

        self.journal_records = self.entries.len();
        self.has_journal_errors = false;
        self.journal_writer = Some(self.open_journal_writer()?);

        debug!(records = self.journal_records, "Rebuilt cache journal");
        Ok(())
    }

    /// Deletes everything in the cache directory and starts an empty journal
    fn wipe(&mut self) -> Result<()> {
        self.close_writer();
        self.entries.clear();
        delete_contents(&self.directory)?;
        fs::create_dir_all(&self.directory)?;
        self.rebuild()
    }

    fn open_journal_writer(&self) -> io::Result<BufWriter<File>> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.journal_path())?;
        Ok(BufWriter::new(file))
    }

    fn close_writer(&mut self) {
        if let Some(mut writer) = self.journal_writer.take() {
            if let Err(e) = writer.flush() {
                warn!(error = %e, "Failed to flush cache journal");
            }
        }
    }

    /// Runs lazy initialization and retries compaction after journal errors
    fn prepare(&mut self) -> Result<()> {
        self.initialize()?;
        if self.has_journal_errors {
            self.rebuild()?;
        }
        Ok(())
    }

    fn append_record(&mut self, entry: &CacheEntry) -> Result<()> {
        let line = self.codec.encode_entry(entry)?;
        let writer = self
            .journal_writer
            .as_mut()
            .ok_or_else(|| io::Error::new(ErrorKind::NotConnected, "cache journal is closed"))?;
        writeln!(writer, "{}", line)?;
        writer.flush()?;
        self.journal_records += 1;
        Ok(())
    }

    /// Appends a record, remembering (rather than reporting) any failure
    ///
    /// The index stays authoritative for this session; the journal is
    /// rewritten from it before the next operation.
    fn log_to_journal(&mut self, entry: &CacheEntry) {
        if let Err(e) = self.append_record(entry) {
            warn!(key = %entry.key, error = %e, "Failed to append to cache journal");
            self.has_journal_errors = true;
        }
    }

    /// Tombstones an entry, deletes its data file and drops it from the index
    fn purge(&mut self, entry: &CacheEntry) {
        self.log_to_journal(&entry.tombstone());
        if let Err(e) = remove_if_exists(&self.data_path(&entry.key)) {
            warn!(key = %entry.key, error = %e, "Failed to delete cache data file");
        }
        self.entries.remove(&entry.key);
    }

    /// Reads the value cached under `key`
    ///
    /// Returns `Ok(None)` when the key is unknown or its entry is invalid
    /// (tombstoned, expired, missing data file, undecodable payload); invalid
    /// entries are purged. When `strict_age_limit_millis` is positive, an
    /// entry older than the limit is reported as absent but kept, since a
    /// looser read may still want it.
    pub fn get<T: DeserializeOwned>(
        &mut self,
        key: &str,
        payload_type: PayloadType,
        strict_age_limit_millis: i64,
    ) -> Result<Option<T>> {
        Self::validate_key(key)?;
        self.prepare()?;

        let Some(entry) = self.entries.get(key).cloned() else {
            return Ok(None);
        };

        let now = self.clock.now();
        let data_path = self.data_path(key);
        if !entry.is_servable_at(now) || !data_path.exists() {
            debug!(key, "Purging invalid cache entry");
            self.purge(&entry);
            return Ok(None);
        }

        if strict_age_limit_millis > 0
            && entry.age_at(now)
                > Duration::try_milliseconds(strict_age_limit_millis).unwrap_or(Duration::MAX)
        {
            return Ok(None);
        }

        let bytes = match fs::read(&data_path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                self.purge(&entry);
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        match self.codec.decode(&bytes, payload_type) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                debug!(key, error = %e, "Purging undecodable cache entry");
                self.purge(&entry);
                Ok(None)
            }
        }
    }

    /// Stores `value` under `entry.key`, replacing any previous entry
    pub fn put<T: Serialize + DeserializeOwned>(
        &mut self,
        entry: CacheEntry,
        value: &T,
        payload_type: PayloadType,
    ) -> Result<()> {
        let bytes = self.codec.encode(value, payload_type)?;
        self.put_encoded(entry, &bytes)
    }

    /// Stores an already-encoded payload under `entry.key`
    ///
    /// The data file is written to a temp name and renamed into place, so a
    /// failed write leaves any previous entry for the key intact.
    pub fn put_encoded(&mut self, entry: CacheEntry, bytes: &[u8]) -> Result<()> {
        Self::validate_key(&entry.key)?;
        self.prepare()?;

        let data_path = self.data_path(&entry.key);
        let temp = self
            .directory
            .join(format!("{}{}", entry.key, DATA_FILE_TEMP_SUFFIX));
        if let Err(e) = fs::write(&temp, bytes).and_then(|()| fs::rename(&temp, &data_path)) {
            let _ = remove_if_exists(&temp);
            return Err(e.into());
        }

        self.log_to_journal(&entry);
        self.entries.insert(entry.key.clone(), entry);
        Ok(())
    }

    /// Tombstones `entry` and deletes its data
    pub fn remove(&mut self, entry: &CacheEntry) -> Result<()> {
        Self::validate_key(&entry.key)?;
        self.prepare()?;
        self.log_to_journal(&entry.tombstone());
        remove_if_exists(&self.data_path(&entry.key))?;
        self.entries.remove(&entry.key);
        Ok(())
    }

    /// Removes the entry stored under `key`, if any
    pub fn remove_key(&mut self, key: &str) -> Result<bool> {
        Self::validate_key(key)?;
        self.prepare()?;
        match self.entries.get(key).cloned() {
            Some(entry) => {
                self.remove(&entry)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Metadata of the entry indexed under `key`, without validating it
    pub fn entry(&mut self, key: &str) -> Result<Option<CacheEntry>> {
        Self::validate_key(key)?;
        self.prepare()?;
        Ok(self.entries.get(key).cloned())
    }

    /// Deletes every cached file and starts over with an empty journal
    pub fn clear(&mut self) -> Result<()> {
        self.wipe()?;
        self.initialized = true;
        Ok(())
    }

    /// Current store statistics
    pub fn stats(&mut self) -> Result<CacheStats> {
        self.initialize()?;
        Ok(CacheStats {
            directory: self.directory.clone(),
            entries: self.entries.len(),
            journal_records: self.journal_records,
            has_journal_errors: self.has_journal_errors,
        })
    }

    /// Flushes buffered journal writes
    pub fn flush(&mut self) -> Result<()> {
        if let Some(writer) = self.journal_writer.as_mut() {
            writer.flush()?;
        }
        Ok(())
    }

    /// Closes the journal; the next operation re-reads it from disk
    pub fn close(&mut self) {
        self.close_writer();
        self.entries.clear();
        self.initialized = false;
    }
}

impl Drop for JournalStore {
    fn drop(&mut self) {
        self.close_writer();
    }
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Deletes everything inside `directory`, keeping the directory itself
///
/// Keeps going after a failure and reports the first error at the end.
fn delete_contents(directory: &Path) -> io::Result<()> {
    let dir = match fs::read_dir(directory) {
        Ok(dir) => dir,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };

    let mut first_error = None;
    for item in dir {
        let result = item.and_then(|item| {
            let path = item.path();
            if item.file_type()?.is_dir() {
                fs::remove_dir_all(&path)
            } else {
                fs::remove_file(&path)
            }
        });
        if let Err(e) = result {
            first_error.get_or_insert(e);
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
