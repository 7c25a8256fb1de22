//! Counters describing how the cache is behaving.
//!
//! Plain relaxed atomics: the numbers are for dashboards and tests, not for
//! coordination.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct CacheMetrics {
    hits: AtomicU64,
    misses: AtomicU64,
    factory_invocations: AtomicU64,
    degraded_computations: AtomicU64,
    locks_acquired: AtomicU64,
    lock_timeouts: AtomicU64,
    lock_unavailable: AtomicU64,
    reconnect_requests: AtomicU64,
    store_errors: AtomicU64,
}

/// Point-in-time copy of [`CacheMetrics`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheMetricsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub factory_invocations: u64,
    pub degraded_computations: u64,
    pub locks_acquired: u64,
    pub lock_timeouts: u64,
    pub lock_unavailable: u64,
    pub reconnect_requests: u64,
    pub store_errors: u64,
}

impl CacheMetricsSnapshot {
    /// Calculate the hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

impl CacheMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_factory_invocation(&self) {
        self.factory_invocations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_degraded_computation(&self) {
        self.degraded_computations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_lock_acquired(&self) {
        self.locks_acquired.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_lock_timeout(&self) {
        self.lock_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_lock_unavailable(&self) {
        self.lock_unavailable.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reconnect_request(&self) {
        self.reconnect_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_store_error(&self) {
        self.store_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CacheMetricsSnapshot {
        CacheMetricsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            factory_invocations: self.factory_invocations.load(Ordering::Relaxed),
            degraded_computations: self.degraded_computations.load(Ordering::Relaxed),
            locks_acquired: self.locks_acquired.load(Ordering::Relaxed),
            lock_timeouts: self.lock_timeouts.load(Ordering::Relaxed),
            lock_unavailable: self.lock_unavailable.load(Ordering::Relaxed),
            reconnect_requests: self.reconnect_requests.load(Ordering::Relaxed),
            store_errors: self.store_errors.load(Ordering::Relaxed),
        }
    }
}
