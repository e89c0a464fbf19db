//! Read-through caching with offline fallback for async operations
//!
//! [`CacheLayer`] sits between a caller and the real operation. For each call
//! it decides whether to answer from the cache, run the operation (storing a
//! successful result), or answer a failed operation with a stale cached
//! result. The caller sees the operation's own signature; only
//! [`Fetched::is_stale`] reveals that a fallback happened.
//!
//! Every path resolves the call exactly once. Dropping the returned future
//! drops the real operation with it, and a cancelled operation never reaches
//! the store-and-return path.

use std::future::Future;
use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, debug_span, info, warn, Instrument};

use super::policy::{CachePolicy, Operation};
use crate::cache::CacheManager;
use crate::codec::PayloadType;
use crate::config::CacheConfig;
use crate::error::Result;
use crate::key::{build_key, KeyArg, OperationId};

/// Result of an intercepted call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetched<T> {
    /// The operation's result
    pub data: T,
    /// Whether `data` came from the offline window after the real operation
    /// failed
    pub is_stale: bool,
}

impl<T> Fetched<T> {
    /// A freshly computed (or fresh cached) result
    pub fn fresh(data: T) -> Self {
        Self {
            data,
            is_stale: false,
        }
    }

    /// A fallback result served after the real operation failed
    pub fn stale(data: T) -> Self {
        Self {
            data,
            is_stale: true,
        }
    }
}

/// Everything one intercepted call needs to know, built before the call runs
#[derive(Debug, Clone)]
struct RequestContext {
    operation: OperationId,
    key: String,
    payload_type: PayloadType,
    fresh: bool,
    read_age_limit_millis: i64,
    write_ttl: Duration,
    has_offline_fallback: bool,
}

impl RequestContext {
    fn new<T>(operation: &Operation, policy: CachePolicy, args: &[&dyn KeyArg]) -> Self {
        Self {
            operation: operation.id,
            key: build_key(&operation.id, policy.fresh, args),
            payload_type: PayloadType::of::<T>(),
            fresh: policy.fresh,
            read_age_limit_millis: policy.read_age_limit_millis(),
            write_ttl: policy.write_ttl(),
            has_offline_fallback: policy.has_offline_fallback(),
        }
    }
}

/// Applies cache policies to async operations
///
/// Cheap to clone; clones share the same cache.
#[derive(Debug, Clone)]
pub struct CacheLayer {
    cache: Option<CacheManager>,
}

impl CacheLayer {
    /// A layer backed by `cache`
    pub fn new(cache: CacheManager) -> Self {
        Self { cache: Some(cache) }
    }

    /// A layer that forwards every call unchanged
    pub fn disabled() -> Self {
        Self { cache: None }
    }

    /// Opens the cache described by `config`, or a disabled layer if caching
    /// is turned off
    pub fn from_config(config: &CacheConfig) -> Result<Self> {
        if !config.enabled {
            return Ok(Self::disabled());
        }
        Ok(Self::new(CacheManager::new(config)?))
    }

    /// The cache behind this layer, if enabled
    pub fn cache(&self) -> Option<&CacheManager> {
        self.cache.as_ref()
    }

    /// Deletes everything in the cache
    pub async fn clear_cache(&self) -> Result<()> {
        match &self.cache {
            Some(cache) => cache.clear().await,
            None => Ok(()),
        }
    }

    /// Runs `upstream` under `operation`'s cache policy
    ///
    /// The key is computed from `args` before this returns, so the argument
    /// list does not need to outlive the call.
    pub fn call<T, E, F, Fut>(
        &self,
        operation: &Operation,
        args: &[&dyn KeyArg],
        upstream: F,
    ) -> impl Future<Output = Result<T, E>>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let call = self.call_with_status(operation, args, upstream);
        async move { call.await.map(|fetched| fetched.data) }
    }

    /// Like [`call`](Self::call), but reports whether the result is stale
    pub fn call_with_status<T, E, F, Fut>(
        &self,
        operation: &Operation,
        args: &[&dyn KeyArg],
        upstream: F,
    ) -> impl Future<Output = Result<Fetched<T>, E>>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let request = match (&self.cache, operation.policy) {
            (Some(cache), Some(policy)) => Some((
                cache.clone(),
                RequestContext::new::<T>(operation, policy, args),
            )),
            _ => None,
        };
        let span = debug_span!("cached_call", operation = %operation.id);

        async move {
            match request {
                Some((cache, request)) => resolve(cache, request, upstream).await,
                None => upstream().await.map(Fetched::fresh),
            }
        }
        .instrument(span)
    }
}

async fn resolve<T, E, F, Fut>(
    cache: CacheManager,
    request: RequestContext,
    upstream: F,
) -> Result<Fetched<T>, E>
where
    T: Serialize + DeserializeOwned + Send + 'static,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    if !request.fresh {
        match cache
            .get_with_age_limit::<T>(&request.key, request.read_age_limit_millis)
            .await
        {
            Ok(Some(data)) => {
                debug!(key = %request.key, "Cache hit");
                return Ok(Fetched::fresh(data));
            }
            Ok(None) => debug!(key = %request.key, "Cache miss"),
            Err(e) => warn!(key = %request.key, error = %e, "Cache read failed, calling through"),
        }
    }

    match upstream().await {
        Ok(data) => {
            if let Err(e) = cache.put(&request.key, &data, request.write_ttl).await {
                warn!(
                    key = %request.key,
                    payload = %request.payload_type,
                    error = %e,
                    "Failed to cache result"
                );
            }
            Ok(Fetched::fresh(data))
        }
        Err(err) => {
            if request.has_offline_fallback {
                match cache.get::<T>(&request.key).await {
                    Ok(Some(data)) => {
                        info!(
                            operation = %request.operation,
                            key = %request.key,
                            "Operation failed, serving stale cached result"
                        );
                        return Ok(Fetched::stale(data));
                    }
                    Ok(None) => {}
                    Err(e) => warn!(key = %request.key, error = %e, "Offline fallback read failed"),
                }
            }
            Err(err)
        }
    }
}
