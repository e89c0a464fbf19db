//! Per-operation cache policies

use std::time::Duration;

use crate::key::OperationId;

/// How the results of one operation are cached
///
/// A plain policy serves cached results for `expires_after`. An offline
/// policy additionally keeps results for `offline_expires_after`; within that
/// longer window a cached result is only served when the real operation
/// fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    /// Freshness window: cached results younger than this are served directly
    pub expires_after: Duration,
    /// Offline window, for operations with an offline fallback
    pub offline_expires_after: Option<Duration>,
    /// Skip the cache read, but still store the result
    pub fresh: bool,
}

impl CachePolicy {
    /// Serve cached results for `expires_after`
    pub const fn cache(expires_after: Duration) -> Self {
        Self {
            expires_after,
            offline_expires_after: None,
            fresh: false,
        }
    }

    /// Serve cached results for `expires_after`, and fall back to results up
    /// to `offline_expires_after` old when the real operation fails
    pub const fn offline(expires_after: Duration, offline_expires_after: Duration) -> Self {
        Self {
            expires_after,
            offline_expires_after: Some(offline_expires_after),
            fresh: false,
        }
    }

    /// Always call the real operation, storing the result
    pub const fn fresh(mut self) -> Self {
        self.fresh = true;
        self
    }

    /// Whether failures may be answered from the offline window
    pub fn has_offline_fallback(&self) -> bool {
        self.offline_expires_after.is_some()
    }

    /// Lifetime given to stored results
    pub fn write_ttl(&self) -> Duration {
        self.offline_expires_after.unwrap_or(self.expires_after)
    }

    /// Strict age bound for the initial cache read, in milliseconds (`0` = none)
    ///
    /// Offline entries live for the offline window, so the freshness window
    /// has to be enforced at read time instead.
    pub fn read_age_limit_millis(&self) -> i64 {
        if self.has_offline_fallback() {
            millis(self.expires_after)
        } else {
            0
        }
    }
}

/// Declaration of an operation: its identity and optional cache policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operation {
    /// Identity used for key derivation
    pub id: OperationId,
    /// Cache policy; `None` forwards every call unchanged
    pub policy: Option<CachePolicy>,
}

impl Operation {
    /// An operation whose results are never cached
    pub const fn uncached(service: &'static str, name: &'static str) -> Self {
        Self {
            id: OperationId::new(service, name),
            policy: None,
        }
    }

    /// An operation cached under `policy`
    pub const fn cached(service: &'static str, name: &'static str, policy: CachePolicy) -> Self {
        Self {
            id: OperationId::new(service, name),
            policy: Some(policy),
        }
    }
}

pub(crate) fn millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}
