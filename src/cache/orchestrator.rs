//! # Get-Or-Add Orchestration
//!
//! Cache-aside with a per-key distributed lock in front of the factory:
//!
//! ```text
//! read ──hit──> (slide) return
//!   │ miss
//!   ├─ store unreachable ───────────> factory + best-effort write
//!   └─ try_acquire
//!        ├─ acquired ──> re-read ──hit──> release, return
//!        │                  └─ miss ──> factory, write, release, return
//!        ├─ not acquired ──> poll for the winner's value, else factory (no write)
//!        └─ unavailable ──> factory + best-effort write
//! ```
//!
//! Factory errors are returned verbatim as [`GetOrAddError::Factory`] on
//! every branch. Infrastructure trouble only ever changes which branch runs.
//! An acquired lease is released before this returns, including on
//! cancellation and factory failure.

use crate::cache::adapter::{StoreAdapter, StoreRead, StoreWrite};
use crate::cache::entry::{expiration_after, CacheEntry, EntryOptions};
use crate::cache::lock::LockCoordinator;
use crate::cache::metrics::CacheMetrics;
use crate::cache::traits::Connector;
use crate::config::CacheConfig;
use crate::constants::components;
use crate::error::{cancellable, Cancelled, GetOrAddError, LockError};
use crate::supervisor::ConnectionSupervisor;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Lease timing for get-or-add locks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockSettings {
    pub lease: Duration,
    pub wait: Duration,
    pub retry_interval: Duration,
}

impl LockSettings {
    pub fn from_config(config: &CacheConfig) -> Self {
        Self {
            lease: config.lock_lease(),
            wait: config.lock_wait(),
            retry_interval: config.lock_retry_interval(),
        }
    }
}

/// Where a computed value should be written, fixed when the call starts
struct Pending {
    expires_at: DateTime<Utc>,
    sliding: Option<Duration>,
}

pub struct GetOrAddOrchestrator<C: Connector> {
    adapter: Arc<StoreAdapter<C>>,
    locks: LockCoordinator<C>,
    supervisor: Arc<ConnectionSupervisor<C>>,
    metrics: Arc<CacheMetrics>,
    settings: LockSettings,
    default_ttl: Duration,
}

impl<C: Connector> std::fmt::Debug for GetOrAddOrchestrator<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GetOrAddOrchestrator")
            .field("settings", &self.settings)
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}

impl<C: Connector> GetOrAddOrchestrator<C> {
    pub fn new(
        adapter: Arc<StoreAdapter<C>>,
        locks: LockCoordinator<C>,
        supervisor: Arc<ConnectionSupervisor<C>>,
        metrics: Arc<CacheMetrics>,
        settings: LockSettings,
        default_ttl: Duration,
    ) -> Self {
        Self {
            adapter,
            locks,
            supervisor,
            metrics,
            settings,
            default_ttl,
        }
    }

    /// Return the cached value for `key`, computing and storing it on a miss
    pub async fn get_or_add<T, E, F, Fut>(
        &self,
        key: &str,
        factory: F,
        options: EntryOptions,
        cancel: &CancellationToken,
    ) -> Result<T, GetOrAddError<E>>
    where
        T: Serialize + DeserializeOwned + Send,
        F: FnOnce(CancellationToken) -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send,
        E: Send,
    {
        let pending = Pending {
            expires_at: expiration_after(Utc::now(), options.ttl_or(self.default_ttl)),
            sliding: options.sliding,
        };

        match self.adapter.get::<T>(key, cancel).await? {
            StoreRead::Hit { value, entry } => {
                self.metrics.record_hit();
                if entry.sliding_window().is_some()
                    && self.adapter.renew(key, entry, cancel).await? == StoreWrite::Unreachable
                {
                    self.supervisor.request_reconnect();
                }
                return Ok(value);
            }
            StoreRead::Miss => self.metrics.record_miss(),
            StoreRead::Unreachable => {
                self.metrics.record_miss();
                self.supervisor.request_reconnect();
                debug!(
                    component = components::ORCHESTRATOR,
                    key = %key,
                    "Store unreachable, computing without lock"
                );
                return self.compute_degraded(key, factory, &pending, true, cancel).await;
            }
        }

        let acquired = self
            .locks
            .try_acquire(
                key,
                self.settings.lease,
                self.settings.wait,
                self.settings.retry_interval,
                cancel,
            )
            .await;

        let mut lock = match acquired {
            Ok(lock) => lock,
            Err(LockError::Cancelled(cancelled)) => return Err(cancelled.into()),
            Err(LockError::Unavailable(e)) => {
                self.supervisor.request_reconnect();
                warn!(
                    component = components::ORCHESTRATOR,
                    key = %key,
                    error = %e,
                    "Lock unavailable, computing without lock"
                );
                return self.compute_degraded(key, factory, &pending, true, cancel).await;
            }
        };

        if lock.is_acquired() {
            let result = self.fill_under_lock(key, factory, &pending, cancel).await;
            self.locks.release(&mut lock).await;
            return result;
        }

        if let Some(value) = self.await_winner::<T>(key, cancel).await? {
            return Ok(value);
        }

        debug!(
            component = components::ORCHESTRATOR,
            key = %key,
            "No value appeared while waiting for lock holder, computing without write"
        );
        self.compute_degraded(key, factory, &pending, false, cancel).await
    }

    /// Double-check then compute. Caller holds the lease.
    async fn fill_under_lock<T, E, F, Fut>(
        &self,
        key: &str,
        factory: F,
        pending: &Pending,
        cancel: &CancellationToken,
    ) -> Result<T, GetOrAddError<E>>
    where
        T: Serialize + DeserializeOwned + Send,
        F: FnOnce(CancellationToken) -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send,
    {
        if let StoreRead::Hit { value, .. } = self.adapter.get::<T>(key, cancel).await? {
            debug!(
                component = components::ORCHESTRATOR,
                key = %key,
                "Value was filled while waiting for the lock"
            );
            return Ok(value);
        }

        let value = self.invoke(factory, cancel).await?;
        self.write_best_effort(key, &value, pending, cancel).await?;
        Ok(value)
    }

    /// Poll for a value written by the current lock holder.
    ///
    /// Gives up after another lock wait window, or as soon as the store
    /// stops answering.
    async fn await_winner<T: DeserializeOwned>(
        &self,
        key: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<T>, Cancelled> {
        let deadline = Instant::now() + self.settings.wait;

        loop {
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            let pause = self.settings.retry_interval.min(deadline - now);
            cancellable(cancel, tokio::time::sleep(pause)).await?;

            match self.adapter.get::<T>(key, cancel).await? {
                StoreRead::Hit { value, .. } => return Ok(Some(value)),
                StoreRead::Miss => {}
                StoreRead::Unreachable => {
                    self.supervisor.request_reconnect();
                    return Ok(None);
                }
            }
        }
    }

    /// Compute without coordination, optionally writing the result
    async fn compute_degraded<T, E, F, Fut>(
        &self,
        key: &str,
        factory: F,
        pending: &Pending,
        write: bool,
        cancel: &CancellationToken,
    ) -> Result<T, GetOrAddError<E>>
    where
        T: Serialize + Send,
        F: FnOnce(CancellationToken) -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send,
    {
        self.metrics.record_degraded_computation();
        let value = self.invoke(factory, cancel).await?;
        if write {
            self.write_best_effort(key, &value, pending, cancel).await?;
        }
        Ok(value)
    }

    async fn invoke<T, E, F, Fut>(
        &self,
        factory: F,
        cancel: &CancellationToken,
    ) -> Result<T, GetOrAddError<E>>
    where
        F: FnOnce(CancellationToken) -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send,
    {
        self.metrics.record_factory_invocation();
        cancellable(cancel, factory(cancel.clone()))
            .await?
            .map_err(GetOrAddError::Factory)
    }

    async fn write_best_effort<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        pending: &Pending,
        cancel: &CancellationToken,
    ) -> Result<(), Cancelled> {
        let entry = match CacheEntry::new(value, pending.expires_at, pending.sliding) {
            Ok(entry) => entry,
            Err(e) => {
                error!(
                    component = components::ORCHESTRATOR,
                    key = %key,
                    error = %e,
                    "Failed to serialize computed value, not cached"
                );
                return Ok(());
            }
        };

        if self.adapter.set(key, &entry, cancel).await? == StoreWrite::Unreachable {
            self.supervisor.request_reconnect();
        }
        Ok(())
    }
}
