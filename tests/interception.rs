//! End-to-end tests for intercepted services
//!
//! A small service trait is decorated with a cache layer the way an
//! application would do it, and exercised across cache restarts.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use offcache::{
    build_key, CacheConfig, CacheLayer, CacheManager, CachePolicy, Fetched, ManualClock,
    Operation,
};
use serde::{Deserialize, Serialize};
use tempfile::TempDir;

const MINUTE: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(3600);

const GET_PROFILE: Operation =
    Operation::cached("ProfileApi", "getProfile", CachePolicy::cache(MINUTE));
const GET_PROFILE_FRESH: Operation = Operation::cached(
    "ProfileApi",
    "getProfileFresh",
    CachePolicy::cache(MINUTE).fresh(),
);
const GET_PROFILE_OFFLINE: Operation = Operation::cached(
    "ProfileApi",
    "getProfileOffline",
    CachePolicy::offline(MINUTE, HOUR),
);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Profile {
    id: u64,
    name: String,
}

#[derive(Debug, Clone, PartialEq)]
struct Unavailable;

#[async_trait]
trait ProfileApi: Send + Sync {
    async fn get_profile(&self, id: u64) -> Result<Profile, Unavailable>;
    async fn get_profile_fresh(&self, id: u64) -> Result<Profile, Unavailable>;
    async fn get_profile_offline(&self, id: u64) -> Result<Fetched<Profile>, Unavailable>;
}

/// Backend that counts calls and fails while `down` is set
#[derive(Debug, Default, Clone)]
struct Backend {
    calls: Arc<AtomicUsize>,
    down: Arc<AtomicBool>,
}

impl Backend {
    fn load(&self, id: u64) -> Result<Profile, Unavailable> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.down.load(Ordering::SeqCst) {
            return Err(Unavailable);
        }
        Ok(Profile {
            id,
            name: format!("profile {} v{}", id, n),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProfileApi for Backend {
    async fn get_profile(&self, id: u64) -> Result<Profile, Unavailable> {
        self.load(id)
    }

    async fn get_profile_fresh(&self, id: u64) -> Result<Profile, Unavailable> {
        self.load(id)
    }

    async fn get_profile_offline(&self, id: u64) -> Result<Fetched<Profile>, Unavailable> {
        self.load(id).map(Fetched::fresh)
    }
}

struct CachedProfileApi<A> {
    inner: A,
    layer: CacheLayer,
}

#[async_trait]
impl<A: ProfileApi> ProfileApi for CachedProfileApi<A> {
    async fn get_profile(&self, id: u64) -> Result<Profile, Unavailable> {
        let call = self
            .layer
            .call(&GET_PROFILE, &[&id], || self.inner.get_profile(id));
        call.await
    }

    async fn get_profile_fresh(&self, id: u64) -> Result<Profile, Unavailable> {
        let call = self
            .layer
            .call(&GET_PROFILE_FRESH, &[&id], || self.inner.get_profile_fresh(id));
        call.await
    }

    async fn get_profile_offline(&self, id: u64) -> Result<Fetched<Profile>, Unavailable> {
        let call = self
            .layer
            .call_with_status(&GET_PROFILE_OFFLINE, &[&id], move || async move {
                self.inner.get_profile_offline(id).await.map(|f| f.data)
            });
        call.await
    }
}

fn open(dir: &Path, clock: &ManualClock) -> CacheManager {
    CacheManager::with_clock(&CacheConfig::with_dir(dir), Arc::new(clock.clone()))
        .expect("Cache should open")
}

fn decorate(backend: &Backend, cache: &CacheManager) -> CachedProfileApi<Backend> {
    CachedProfileApi {
        inner: backend.clone(),
        layer: CacheLayer::new(cache.clone()),
    }
}

#[tokio::test]
async fn test_cached_result_survives_restart() {
    let temp_dir = TempDir::new().unwrap();
    let clock = ManualClock::default();
    let backend = Backend::default();

    let cache = open(temp_dir.path(), &clock);
    let first = decorate(&backend, &cache).get_profile(7).await.unwrap();
    cache.close().await.unwrap();
    drop(cache);

    let reopened = open(temp_dir.path(), &clock);
    let second = decorate(&backend, &reopened).get_profile(7).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn test_offline_fallback_after_restart() {
    let temp_dir = TempDir::new().unwrap();
    let clock = ManualClock::default();
    let backend = Backend::default();

    let cache = open(temp_dir.path(), &clock);
    let online = decorate(&backend, &cache)
        .get_profile_offline(7)
        .await
        .unwrap();
    assert!(!online.is_stale);
    cache.close().await.unwrap();
    drop(cache);

    clock.advance(chrono::Duration::minutes(10));
    backend.down.store(true, Ordering::SeqCst);

    let reopened = open(temp_dir.path(), &clock);
    let offline = decorate(&backend, &reopened)
        .get_profile_offline(7)
        .await
        .unwrap();

    assert!(offline.is_stale);
    assert_eq!(offline.data, online.data);
    assert_eq!(backend.calls(), 2);
}

#[tokio::test]
async fn test_offline_entry_expires_across_restart() {
    let temp_dir = TempDir::new().unwrap();
    let clock = ManualClock::default();
    let backend = Backend::default();

    let cache = open(temp_dir.path(), &clock);
    decorate(&backend, &cache)
        .get_profile_offline(7)
        .await
        .unwrap();
    cache.close().await.unwrap();
    drop(cache);

    clock.advance(chrono::Duration::hours(2));
    backend.down.store(true, Ordering::SeqCst);

    let reopened = open(temp_dir.path(), &clock);
    // Startup sweep already dropped the expired entry
    assert_eq!(reopened.stats().await.unwrap().entries, 0);

    let result = decorate(&backend, &reopened).get_profile_offline(7).await;
    assert_eq!(result, Err(Unavailable));
}

#[tokio::test]
async fn test_fresh_call_updates_entry_seen_by_plain_call() {
    let temp_dir = TempDir::new().unwrap();
    let clock = ManualClock::default();
    let backend = Backend::default();
    let cache = open(temp_dir.path(), &clock);
    let api = decorate(&backend, &cache);

    let plain = api.get_profile(7).await.unwrap();
    let fresh = api.get_profile_fresh(7).await.unwrap();
    let cached = api.get_profile(7).await.unwrap();

    assert_ne!(plain, fresh);
    assert_eq!(cached, fresh);
    assert_eq!(backend.calls(), 2);

    let key = build_key(&GET_PROFILE.id, false, &[&7_u64]);
    assert!(cache.entry(&key).await.unwrap().is_some());
    assert!(temp_dir.path().join(&key).exists());
}

#[tokio::test]
async fn test_concurrent_callers_each_get_a_result() {
    let temp_dir = TempDir::new().unwrap();
    let clock = ManualClock::default();
    let backend = Backend::default();
    let cache = open(temp_dir.path(), &clock);
    let api = Arc::new(decorate(&backend, &cache));

    let handles: Vec<_> = (0..8_u64)
        .map(|id| {
            let api = Arc::clone(&api);
            tokio::spawn(async move { api.get_profile(id % 4).await })
        })
        .collect();

    for handle in handles {
        let profile = handle.await.unwrap().unwrap();
        assert!(profile.id < 4);
    }

    assert_eq!(cache.stats().await.unwrap().entries, 4);
    // Without request coalescing, concurrent misses may each call through
    assert!(backend.calls() >= 4 && backend.calls() <= 8);
}

#[tokio::test]
async fn test_clear_forgets_every_operation() {
    let temp_dir = TempDir::new().unwrap();
    let clock = ManualClock::default();
    let backend = Backend::default();
    let cache = open(temp_dir.path(), &clock);
    let api = decorate(&backend, &cache);

    api.get_profile(1).await.unwrap();
    api.get_profile_offline(1).await.unwrap();
    api.layer.clear_cache().await.unwrap();

    assert_eq!(cache.stats().await.unwrap().entries, 0);
    api.get_profile(1).await.unwrap();
    assert_eq!(backend.calls(), 3);
}
