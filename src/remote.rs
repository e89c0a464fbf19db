//! Cached HTTP text fetching
//!
//! [`RemoteApi`] is a small capability interface for fetching documents over
//! HTTP. [`HttpRemote`] implements it with `reqwest`; [`CachedRemoteApi`]
//! decorates any implementation with the cache policies declared for each
//! method, so callers swap one for the other without changing call sites.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;

use crate::intercept::{CacheLayer, CachePolicy, Fetched, Operation};

/// Service name used in cache keys
const SERVICE: &str = "RemoteApi";

/// Default freshness window for fetched documents (5 minutes)
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Default offline window for fetched documents (24 hours)
pub const DEFAULT_OFFLINE_TTL: Duration = Duration::from_secs(24 * 3600);

/// Errors that can occur when fetching a document
#[derive(Debug, Error)]
pub enum FetchError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// Server answered with a non-success status
    #[error("Server returned status {0}")]
    Status(u16),
}

/// Fetches text documents by URL
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Fetches the document at `url`
    async fn fetch_text(&self, url: &str) -> Result<String, FetchError>;

    /// Fetches the document at `url`, bypassing any cached copy
    async fn fetch_text_fresh(&self, url: &str) -> Result<String, FetchError>;

    /// Fetches the document at `url`, reporting whether the result is a
    /// stale copy served because the fetch failed
    async fn fetch_text_offline(&self, url: &str) -> Result<Fetched<String>, FetchError>;
}

/// [`RemoteApi`] over plain HTTP
#[derive(Debug, Clone)]
pub struct HttpRemote {
    client: Client,
}

impl Default for HttpRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpRemote {
    /// Create a new HttpRemote with default settings
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    /// Create a new HttpRemote with a custom HTTP client
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        Ok(response.text().await?)
    }
}

#[async_trait]
impl RemoteApi for HttpRemote {
    async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
        self.get_text(url).await
    }

    async fn fetch_text_fresh(&self, url: &str) -> Result<String, FetchError> {
        self.get_text(url).await
    }

    async fn fetch_text_offline(&self, url: &str) -> Result<Fetched<String>, FetchError> {
        self.get_text(url).await.map(Fetched::fresh)
    }
}

/// Cache windows applied by [`CachedRemoteApi`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemotePolicy {
    /// How long a fetched document is served without refetching
    pub ttl: Duration,
    /// How long a fetched document may stand in for a failed fetch
    pub offline_ttl: Duration,
}

impl Default for RemotePolicy {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            offline_ttl: DEFAULT_OFFLINE_TTL,
        }
    }
}

impl RemotePolicy {
    fn fetch_text(&self) -> Operation {
        Operation::cached(SERVICE, "fetchText", CachePolicy::cache(self.ttl))
    }

    fn fetch_text_fresh(&self) -> Operation {
        Operation::cached(
            SERVICE,
            "fetchTextFresh",
            CachePolicy::cache(self.ttl).fresh(),
        )
    }

    fn fetch_text_offline(&self) -> Operation {
        Operation::cached(
            SERVICE,
            "fetchTextOffline",
            CachePolicy::offline(self.ttl, self.offline_ttl),
        )
    }
}

/// Decorates a [`RemoteApi`] with caching
///
/// `fetch_text` and `fetch_text_fresh` share cache entries; `fetch_text_offline`
/// keeps its own, written with the offline window.
#[derive(Debug, Clone)]
pub struct CachedRemoteApi<A> {
    inner: A,
    layer: CacheLayer,
    policy: RemotePolicy,
}

impl<A: RemoteApi> CachedRemoteApi<A> {
    /// Wraps `inner` using the default cache windows
    pub fn new(inner: A, layer: CacheLayer) -> Self {
        Self::with_policy(inner, layer, RemotePolicy::default())
    }

    /// Wraps `inner` using custom cache windows
    pub fn with_policy(inner: A, layer: CacheLayer, policy: RemotePolicy) -> Self {
        Self {
            inner,
            layer,
            policy,
        }
    }

    /// The cache layer in use
    pub fn layer(&self) -> &CacheLayer {
        &self.layer
    }
}

#[async_trait]
impl<A: RemoteApi> RemoteApi for CachedRemoteApi<A> {
    async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
        let call = self
            .layer
            .call(&self.policy.fetch_text(), &[&url], || self.inner.fetch_text(url));
        call.await
    }

    async fn fetch_text_fresh(&self, url: &str) -> Result<String, FetchError> {
        let call = self.layer.call(&self.policy.fetch_text_fresh(), &[&url], || {
            self.inner.fetch_text_fresh(url)
        });
        call.await
    }

    async fn fetch_text_offline(&self, url: &str) -> Result<Fetched<String>, FetchError> {
        let call = self
            .layer
            .call_with_status(&self.policy.fetch_text_offline(), &[&url], move || async move {
                self.inner
                    .fetch_text_offline(url)
                    .await
                    .map(|fetched| fetched.data)
            });
        call.await
    }
}
