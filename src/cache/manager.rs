//! Async handle to a journal store running on its own worker thread
//!
//! Every operation is sent as a job over a FIFO channel to a single worker
//! thread that owns the [`JournalStore`]. Jobs run one at a time in
//! submission order, so concurrent puts never interleave journal writes and a
//! get never observes a half-written data file.

use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};

use super::{CacheEntry, CacheStats, JournalStore};
use crate::clock::{Clock, SystemClock};
use crate::codec::{EntryCodec, PayloadType};
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};

type Job = Box<dyn FnOnce(&mut JournalStore) + Send>;

/// Cloneable handle to a cache directory
///
/// All clones feed the same worker. The worker stops, and the journal is
/// flushed, once the last clone is dropped.
#[derive(Debug, Clone)]
pub struct CacheManager {
    jobs: mpsc::UnboundedSender<Job>,
    directory: PathBuf,
}

impl CacheManager {
    /// Opens the cache described by `config` using the system clock
    pub fn new(config: &CacheConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Opens a cache in `directory` with the default protocol version
    ///
    /// Useful for testing or when a specific cache location is needed.
    pub fn with_dir(directory: impl Into<PathBuf>) -> Result<Self> {
        Self::new(&CacheConfig::with_dir(directory))
    }

    /// Opens the cache described by `config` using a custom time source
    pub fn with_clock(config: &CacheConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let store = JournalStore::new(&config.directory, config.protocol_version, clock);
        let (jobs, queue) = mpsc::unbounded_channel::<Job>();

        thread::Builder::new()
            .name("offcache-journal".to_string())
            .spawn(move || run_worker(store, queue))?;

        Ok(Self {
            jobs,
            directory: config.directory.clone(),
        })
    }

    /// Directory owned by this cache
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Runs `job` on the worker and waits for its result
    async fn submit<R, F>(&self, job: F) -> Result<R>
    where
        F: FnOnce(&mut JournalStore) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let (reply, response) = oneshot::channel();
        self.jobs
            .send(Box::new(move |store: &mut JournalStore| {
                // The caller may have gone away; the job still ran to completion
                let _ = reply.send(job(store));
            }))
            .map_err(|_| CacheError::WorkerGone)?;

        response.await.map_err(|_| CacheError::Aborted)?
    }

    /// Loads the journal now instead of on first use
    pub async fn initialize(&self) -> Result<()> {
        self.submit(|store| store.initialize()).await
    }

    /// Reads the value cached under `key`
    pub async fn get<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.get_with_age_limit(key, 0).await
    }

    /// Reads the value cached under `key` if it is at most
    /// `strict_age_limit_millis` old (`0` means no limit)
    ///
    /// An entry that is too old is reported as absent but left in place.
    pub async fn get_with_age_limit<T>(
        &self,
        key: &str,
        strict_age_limit_millis: i64,
    ) -> Result<Option<T>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let key = key.to_string();
        self.submit(move |store| {
            store.get::<T>(&key, PayloadType::of::<T>(), strict_age_limit_millis)
        })
        .await
    }

    /// Caches `value` under `key` for `max_age`
    ///
    /// The value is encoded on the calling task, before the returned future
    /// is first polled; only bytes cross over to the worker. The entry's
    /// creation time is taken on the worker. Lifetimes beyond
    /// [`MAX_AGE_MILLIS`](super::MAX_AGE_MILLIS) are clamped.
    ///
    /// `T` is the type later read back with [`get`](Self::get), so borrowed
    /// forms such as `str` are rejected:
    ///
    /// ```compile_fail
    /// # async fn demo(cache: offcache::CacheManager) {
    /// cache.put("k", "hello", std::time::Duration::from_secs(60)).await;
    /// # }
    /// ```
    pub fn put<T>(
        &self,
        key: &str,
        value: &T,
        max_age: Duration,
    ) -> impl Future<Output = Result<()>> + Send + 'static
    where
        T: Serialize + DeserializeOwned,
    {
        let encoded = EntryCodec.encode(value, PayloadType::of::<T>());
        let key = key.to_string();
        let max_age_millis = i64::try_from(max_age.as_millis()).unwrap_or(i64::MAX);
        let this = self.clone();

        async move {
            let bytes = encoded?;
            this.submit(move |store| {
                let entry = CacheEntry::new(key, store.now(), max_age_millis);
                store.put_encoded(entry, &bytes)
            })
            .await
        }
    }

    /// Caches `value` under a caller-built entry
    pub fn put_entry<T>(
        &self,
        entry: CacheEntry,
        value: &T,
    ) -> impl Future<Output = Result<()>> + Send + 'static
    where
        T: Serialize + DeserializeOwned,
    {
        let encoded = EntryCodec.encode(value, PayloadType::of::<T>());
        let this = self.clone();

        async move {
            let bytes = encoded?;
            this.submit(move |store| store.put_encoded(entry, &bytes)).await
        }
    }

    /// Removes `entry` from the cache
    pub async fn remove(&self, entry: CacheEntry) -> Result<()> {
        self.submit(move |store| store.remove(&entry)).await
    }

    /// Removes whatever is cached under `key`
    ///
    /// Returns `true` if an entry was removed.
    pub async fn remove_key(&self, key: &str) -> Result<bool> {
        let key = key.to_string();
        self.submit(move |store| store.remove_key(&key)).await
    }

    /// Metadata of the entry cached under `key`
    pub async fn entry(&self, key: &str) -> Result<Option<CacheEntry>> {
        let key = key.to_string();
        self.submit(move |store| store.entry(&key)).await
    }

    /// Drops expired entries now
    ///
    /// The count includes entries dropped while loading the journal, when
    /// this call is what loaded it.
    pub async fn sweep_expired(&self) -> Result<usize> {
        self.submit(|store| store.sweep()).await
    }

    /// Deletes every cached entry
    pub async fn clear(&self) -> Result<()> {
        self.submit(|store| store.clear()).await
    }

    /// Current cache statistics
    pub async fn stats(&self) -> Result<CacheStats> {
        self.submit(|store| store.stats()).await
    }

    /// Flushes buffered journal writes
    pub async fn flush(&self) -> Result<()> {
        self.submit(|store| store.flush()).await
    }

    /// Closes the journal; the next operation reloads it from disk
    pub async fn close(&self) -> Result<()> {
        self.submit(|store| {
            store.close();
            Ok(())
        })
        .await
    }
}

fn run_worker(mut store: JournalStore, mut queue: mpsc::UnboundedReceiver<Job>) {
    while let Some(job) = queue.blocking_recv() {
        // A panicking job drops its reply; its caller sees `Aborted`
        if panic::catch_unwind(AssertUnwindSafe(|| job(&mut store))).is_err() {
            error!(
                directory = %store.directory().display(),
                "Cache operation panicked, reloading journal"
            );
            store.close();
        }
    }
    store.close();
    debug!(directory = %store.directory().display(), "Cache worker stopped");
}
