//! Cache entry metadata as recorded in the journal

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Longest lifetime an entry can be written with (100 years)
///
/// Longer lifetimes are clamped, which keeps `expires_at` a representable,
/// four-digit-year timestamp in the journal.
pub const MAX_AGE_MILLIS: i64 = 100 * 365 * 24 * 60 * 60 * 1000;

/// Metadata for one cached key
///
/// The payload itself lives in a separate data file named by `key`. Entries
/// are never edited in place: a re-put replaces the entry, and a removal
/// appends a tombstone copy with `expired = true`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    /// Cache key, also the name of the data file
    pub key: String,
    /// Instant at which the entry stops being served
    pub expires_at: DateTime<Utc>,
    /// Lifetime the entry was written with
    pub max_age_millis: i64,
    /// Tombstone flag
    pub expired: bool,
    /// When the entry was written
    pub created_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Creates a live entry written at `now` that lives for `max_age_millis`
    ///
    /// The lifetime is clamped to `0..=MAX_AGE_MILLIS`.
    pub fn new(key: impl Into<String>, now: DateTime<Utc>, max_age_millis: i64) -> Self {
        let max_age_millis = max_age_millis.clamp(0, MAX_AGE_MILLIS);
        Self {
            key: key.into(),
            expires_at: now
                .checked_add_signed(Duration::milliseconds(max_age_millis))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
            max_age_millis,
            expired: false,
            created_at: now,
        }
    }

    /// Returns a tombstone copy of this entry
    pub fn tombstone(&self) -> Self {
        Self {
            expired: true,
            ..self.clone()
        }
    }

    /// Time elapsed since the entry was written
    pub fn age_at(&self, now: DateTime<Utc>) -> Duration {
        now - self.created_at
    }

    /// Whether the entry may be served at `now`
    ///
    /// An entry whose remaining lifetime exceeds its maximum age was written
    /// "in the future" relative to `now` (the clock moved backwards) and is
    /// not trusted either.
    pub fn is_servable_at(&self, now: DateTime<Utc>) -> bool {
        !self.expired
            && now < self.expires_at
            && self.expires_at - now <= self.max_age()
    }

    /// Lifetime the entry was written with
    ///
    /// Records read back from a journal are not clamped, so out-of-range
    /// values saturate here instead.
    pub fn max_age(&self) -> Duration {
        Duration::try_milliseconds(self.max_age_millis).unwrap_or(if self.max_age_millis < 0 {
            Duration::zero()
        } else {
            Duration::MAX
        })
    }

    /// Whether the startup sweep should drop this entry
    pub fn is_sweepable_at(&self, now: DateTime<Utc>) -> bool {
        self.expired || now > self.expires_at
    }
}
