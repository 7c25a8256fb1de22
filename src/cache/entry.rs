//! Stored envelope around every cached value.
//!
//! The store only ever sees the JSON encoding of [`CacheEntry`]. Expiration is
//! carried inside the envelope as an absolute timestamp and checked on every
//! read, so an entry that outlived its timestamp is a miss even when the
//! backend still holds it.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{CacheError, StoreResult};

/// Per-write expiration policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntryOptions {
    /// Absolute lifetime from the moment of the call; `None` uses the default TTL
    pub ttl: Option<Duration>,
    /// When set, every read pushes expiration out to `now + sliding`
    pub sliding: Option<Duration>,
}

impl EntryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_sliding(mut self, window: Duration) -> Self {
        self.sliding = Some(window);
        self
    }

    /// Sliding expiration whose window equals the TTL
    pub fn sliding_ttl(ttl: Duration) -> Self {
        Self {
            ttl: Some(ttl),
            sliding: Some(ttl),
        }
    }

    pub fn ttl_or(&self, default_ttl: Duration) -> Duration {
        self.ttl.unwrap_or(default_ttl)
    }
}

/// Serialized value plus its expiration metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub value: serde_json::Value,
    pub absolute_expiration: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sliding_window_ms: Option<u64>,
}

impl CacheEntry {
    /// Build an entry that expires at a fixed instant
    pub fn new<T: Serialize>(
        value: &T,
        absolute_expiration: DateTime<Utc>,
        sliding: Option<Duration>,
    ) -> StoreResult<Self> {
        Ok(Self {
            value: serde_json::to_value(value)?,
            absolute_expiration,
            sliding_window_ms: sliding.map(|w| u64::try_from(w.as_millis()).unwrap_or(u64::MAX)),
        })
    }

    /// Build an entry that expires `ttl` from `now`
    pub fn with_ttl<T: Serialize>(
        value: &T,
        now: DateTime<Utc>,
        ttl: Duration,
        sliding: Option<Duration>,
    ) -> StoreResult<Self> {
        Self::new(value, expiration_after(now, ttl), sliding)
    }

    pub fn sliding_window(&self) -> Option<Duration> {
        self.sliding_window_ms.map(Duration::from_millis)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.absolute_expiration <= now
    }

    /// Time left before expiration, zero once expired
    pub fn remaining_ttl_at(&self, now: DateTime<Utc>) -> Duration {
        (self.absolute_expiration - now)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    /// Push expiration to `now + window`. Returns false for non-sliding entries.
    pub fn slide(&mut self, now: DateTime<Utc>) -> bool {
        match self.sliding_window() {
            Some(window) => {
                self.absolute_expiration = expiration_after(now, window);
                true
            }
            None => false,
        }
    }

    pub fn decode<T: DeserializeOwned>(&self) -> StoreResult<T> {
        T::deserialize(&self.value).map_err(CacheError::from)
    }

    pub fn to_json(&self) -> StoreResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(raw: &str) -> StoreResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

pub(crate) fn expiration_after(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
