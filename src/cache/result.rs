//! Explicit presence wrapper returned by cache reads.

use serde::{Deserialize, Serialize};

/// Outcome of a cache read: either a value, or nothing.
///
/// A miss is `CacheResult::none()` rather than a sentinel, so a cached
/// `None`, `0` or empty string is still a hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheResult<T> {
    value: Option<T>,
}

impl<T> CacheResult<T> {
    pub fn some(value: T) -> Self {
        Self { value: Some(value) }
    }

    pub fn none() -> Self {
        Self { value: None }
    }

    pub fn has_value(&self) -> bool {
        self.value.is_some()
    }

    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn into_value(self) -> Option<T> {
        self.value
    }

    /// Returns the cached value or `default` on a miss
    pub fn unwrap_or(self, default: T) -> T {
        self.value.unwrap_or(default)
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> CacheResult<U> {
        CacheResult {
            value: self.value.map(f),
        }
    }
}

impl<T> Default for CacheResult<T> {
    fn default() -> Self {
        Self::none()
    }
}

impl<T> From<CacheResult<T>> for Option<T> {
    fn from(result: CacheResult<T>) -> Self {
        result.value
    }
}
