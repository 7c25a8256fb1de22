//! # Resilient Cache
//!
//! The public entry point. Every call degrades instead of failing when the
//! store is down: reads become misses, writes become no-ops and get-or-add
//! computes directly. Each degraded call submits a background reconnect and
//! returns without waiting for it.
//!
//! Only cancellation and a get-or-add factory's own error reach the caller.

use crate::cache::adapter::{Presence, StoreAdapter, StoreRead, StoreWrite};
use crate::cache::entry::{CacheEntry, EntryOptions};
use crate::cache::keys::KeySpace;
use crate::cache::lock::LockCoordinator;
use crate::cache::metrics::{CacheMetrics, CacheMetricsSnapshot};
use crate::cache::orchestrator::{GetOrAddOrchestrator, LockSettings};
use crate::cache::result::CacheResult;
use crate::cache::traits::Connector;
use crate::config::{CacheConfig, ConfigResult};
use crate::constants::components;
use crate::error::{Cancelled, GetOrAddError};
use crate::supervisor::{ConnectionState, ConnectionSupervisor};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

/// Cancels the health loop once the last cache clone is gone
struct ShutdownGuard<C: Connector> {
    supervisor: Arc<ConnectionSupervisor<C>>,
}

impl<C: Connector> Drop for ShutdownGuard<C> {
    fn drop(&mut self) {
        self.supervisor.shutdown();
    }
}

/// Cache-aside client over a supervised store connection.
///
/// Cheap to clone; clones share one connection, one health loop and one set
/// of metrics.
///
/// ```rust,no_run
/// use resilient_cache::{CacheConfig, MemoryConnector, ResilientCache};
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let cache = ResilientCache::new(MemoryConnector::default(), CacheConfig::default())?;
/// let cancel = CancellationToken::new();
///
/// let name: String = cache
///     .get_or_add(
///         "user:42:name",
///         |_cancel| async { Ok::<_, std::io::Error>("ada".to_string()) },
///         &cancel,
///     )
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct ResilientCache<C: Connector> {
    supervisor: Arc<ConnectionSupervisor<C>>,
    adapter: Arc<StoreAdapter<C>>,
    orchestrator: Arc<GetOrAddOrchestrator<C>>,
    metrics: Arc<CacheMetrics>,
    default_ttl: Duration,
    _guard: Arc<ShutdownGuard<C>>,
}

impl<C: Connector> Clone for ResilientCache<C> {
    fn clone(&self) -> Self {
        Self {
            supervisor: Arc::clone(&self.supervisor),
            adapter: Arc::clone(&self.adapter),
            orchestrator: Arc::clone(&self.orchestrator),
            metrics: Arc::clone(&self.metrics),
            default_ttl: self.default_ttl,
            _guard: Arc::clone(&self._guard),
        }
    }
}

impl<C: Connector> std::fmt::Debug for ResilientCache<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientCache")
            .field("supervisor", &self.supervisor)
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}

impl<C: Connector> ResilientCache<C> {
    /// Build a cache and spawn its health loop on the current runtime.
    ///
    /// The first connect attempt happens in the background; calls made
    /// before it succeeds run in degraded mode.
    pub fn new(connector: C, config: CacheConfig) -> ConfigResult<Self> {
        config.validate()?;

        let metrics = Arc::new(CacheMetrics::new());
        let keys = KeySpace::from_config(&config);
        let supervisor = Arc::new(ConnectionSupervisor::new(
            connector,
            &config,
            Arc::clone(&metrics),
        ));
        let adapter = Arc::new(StoreAdapter::new(
            Arc::clone(&supervisor),
            keys.clone(),
            Arc::clone(&metrics),
        ));
        let locks = LockCoordinator::new(Arc::clone(&supervisor), keys, Arc::clone(&metrics));
        let orchestrator = Arc::new(GetOrAddOrchestrator::new(
            Arc::clone(&adapter),
            locks,
            Arc::clone(&supervisor),
            Arc::clone(&metrics),
            LockSettings::from_config(&config),
            config.default_ttl(),
        ));

        tokio::spawn(Arc::clone(&supervisor).run());

        info!(
            component = components::FACADE,
            key_prefix = %config.key_prefix,
            default_ttl_ms = config.default_ttl_ms,
            "Resilient cache created"
        );

        Ok(Self {
            _guard: Arc::new(ShutdownGuard {
                supervisor: Arc::clone(&supervisor),
            }),
            supervisor,
            adapter,
            orchestrator,
            metrics,
            default_ttl: config.default_ttl(),
        })
    }

    /// Read `key`. A miss, an expired entry and an unreachable store all
    /// return [`CacheResult::none`].
    #[instrument(skip(self, cancel), fields(key = %key))]
    pub async fn get<T: DeserializeOwned>(
        &self,
        key: &str,
        cancel: &CancellationToken,
    ) -> Result<CacheResult<T>, Cancelled> {
        let read = self.adapter.get::<T>(key, cancel).await.inspect_err(log_cancelled)?;
        match read {
            StoreRead::Hit { value, entry } => {
                self.metrics.record_hit();
                if entry.sliding_window().is_some() {
                    let renewed = self.adapter.renew(key, entry, cancel).await;
                    self.after_write(renewed.inspect_err(log_cancelled)?);
                }
                Ok(CacheResult::some(value))
            }
            StoreRead::Miss => {
                self.metrics.record_miss();
                Ok(CacheResult::none())
            }
            StoreRead::Unreachable => {
                self.metrics.record_miss();
                self.degraded("get");
                Ok(CacheResult::none())
            }
        }
    }

    /// Write `value` with the default TTL
    pub async fn set<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        cancel: &CancellationToken,
    ) -> Result<(), Cancelled> {
        self.set_with_options(key, value, EntryOptions::new(), cancel)
            .await
    }

    /// Write `value` with an explicit TTL and/or sliding window
    #[instrument(skip(self, value, cancel), fields(key = %key))]
    pub async fn set_with_options<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        options: EntryOptions,
        cancel: &CancellationToken,
    ) -> Result<(), Cancelled> {
        let ttl = options.ttl_or(self.default_ttl);
        let entry = match CacheEntry::with_ttl(value, Utc::now(), ttl, options.sliding) {
            Ok(entry) => entry,
            Err(e) => {
                error!(
                    component = components::FACADE,
                    key = %key,
                    error = %e,
                    "Failed to serialize value, write skipped"
                );
                return Ok(());
            }
        };

        let written = self.adapter.set(key, &entry, cancel).await;
        self.after_write(written.inspect_err(log_cancelled)?);
        Ok(())
    }

    /// Delete `key`; a no-op when the store is unreachable
    #[instrument(skip(self, cancel), fields(key = %key))]
    pub async fn remove(&self, key: &str, cancel: &CancellationToken) -> Result<(), Cancelled> {
        let removed = self.adapter.delete(key, cancel).await;
        self.after_write(removed.inspect_err(log_cancelled)?);
        Ok(())
    }

    /// Whether a live entry exists; `false` when the store is unreachable
    #[instrument(skip(self, cancel), fields(key = %key))]
    pub async fn exists(&self, key: &str, cancel: &CancellationToken) -> Result<bool, Cancelled> {
        match self.adapter.exists(key, cancel).await.inspect_err(log_cancelled)? {
            Presence::Present => Ok(true),
            Presence::Absent => Ok(false),
            Presence::Unreachable => {
                self.degraded("exists");
                Ok(false)
            }
        }
    }

    /// Get `key`, or compute it with `factory` and cache it with the default TTL
    pub async fn get_or_add<T, E, F, Fut>(
        &self,
        key: &str,
        factory: F,
        cancel: &CancellationToken,
    ) -> Result<T, GetOrAddError<E>>
    where
        T: Serialize + DeserializeOwned + Send,
        F: FnOnce(CancellationToken) -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send,
        E: Send,
    {
        self.get_or_add_with_options(key, factory, EntryOptions::new(), cancel)
            .await
    }

    /// Get `key`, or compute and cache it with explicit expiration options
    #[instrument(skip(self, factory, cancel), fields(key = %key))]
    pub async fn get_or_add_with_options<T, E, F, Fut>(
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
        let result = self
            .orchestrator
            .get_or_add(key, factory, options, cancel)
            .await;
        if let Err(GetOrAddError::Cancelled(_)) = &result {
            log_cancelled(&Cancelled);
        }
        result
    }

    /// Connect now if not already connected
    pub async fn ensure_connected(&self, cancel: &CancellationToken) -> Result<(), Cancelled> {
        self.supervisor.ensure_connected(cancel).await
    }

    pub fn is_connected(&self) -> bool {
        self.supervisor.is_connected()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.supervisor.state()
    }

    pub fn metrics(&self) -> CacheMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Stop the health loop and drop the connection.
    ///
    /// Every later call runs in degraded mode.
    pub fn shutdown(&self) {
        self.supervisor.shutdown();
    }

    fn after_write(&self, outcome: StoreWrite) {
        if outcome == StoreWrite::Unreachable {
            self.degraded("write");
        }
    }

    fn degraded(&self, operation: &'static str) {
        debug!(
            component = components::FACADE,
            operation = operation,
            "Store unreachable, returning degraded result"
        );
        self.supervisor.request_reconnect();
    }
}

fn log_cancelled(_: &Cancelled) {
    debug!(component = components::FACADE, "Cache operation cancelled");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::providers::{MemoryConnector, MemoryStore};

    async fn connected(store: MemoryStore) -> ResilientCache<MemoryConnector> {
        let cache =
            ResilientCache::new(MemoryConnector::new(store), CacheConfig::default()).unwrap();
        cache
            .ensure_connected(&CancellationToken::new())
            .await
            .unwrap();
        cache
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let config = CacheConfig {
            lock_wait_ms: 0,
            ..Default::default()
        };
        assert!(ResilientCache::new(MemoryConnector::default(), config).is_err());
    }

    #[tokio::test]
    async fn test_set_get_remove() {
        let cache = connected(MemoryStore::new()).await;
        let cancel = CancellationToken::new();

        cache.set("n", &0u32, &cancel).await.unwrap();
        let hit = cache.get::<u32>("n", &cancel).await.unwrap();
        assert!(hit.has_value());
        assert_eq!(hit.value(), Some(&0));
        assert!(cache.exists("n", &cancel).await.unwrap());

        cache.remove("n", &cancel).await.unwrap();
        assert!(!cache.get::<u32>("n", &cancel).await.unwrap().has_value());
        assert!(!cache.exists("n", &cancel).await.unwrap());

        let metrics = cache.metrics();
        assert_eq!(metrics.hits, 1);
        assert_eq!(metrics.misses, 1);
    }

    #[tokio::test]
    async fn test_short_ttl_expires() {
        let cache = connected(MemoryStore::new()).await;
        let cancel = CancellationToken::new();

        cache
            .set_with_options(
                "brief",
                &"v",
                EntryOptions::new().with_ttl(Duration::from_millis(30)),
                &cancel,
            )
            .await
            .unwrap();
        assert!(cache.get::<String>("brief", &cancel).await.unwrap().has_value());

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(!cache.get::<String>("brief", &cancel).await.unwrap().has_value());
    }

    #[tokio::test]
    async fn test_sliding_entry_survives_while_read() {
        let cache = connected(MemoryStore::new()).await;
        let cancel = CancellationToken::new();

        cache
            .set_with_options(
                "session",
                &"token",
                EntryOptions::sliding_ttl(Duration::from_millis(200)),
                &cancel,
            )
            .await
            .unwrap();

        for _ in 0..4 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            assert!(cache.get::<String>("session", &cancel).await.unwrap().has_value());
        }

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(!cache.get::<String>("session", &cancel).await.unwrap().has_value());
    }

    #[tokio::test]
    async fn test_shutdown_degrades_later_calls() {
        let cache = connected(MemoryStore::new()).await;
        let cancel = CancellationToken::new();
        assert_eq!(cache.connection_state(), ConnectionState::Connected);

        cache.shutdown();
        assert!(!cache.is_connected());
        cache.set("k", &1, &cancel).await.unwrap();
        assert!(!cache.get::<i32>("k", &cancel).await.unwrap().has_value());

        let value: i32 = cache
            .get_or_add("k", |_| async { Ok::<_, String>(9) }, &cancel)
            .await
            .unwrap();
        assert_eq!(value, 9);
    }

    #[tokio::test]
    async fn test_dropping_last_clone_stops_the_loop() {
        let cache = connected(MemoryStore::new()).await;
        let supervisor = Arc::clone(&cache.supervisor);
        let clone = cache.clone();

        drop(cache);
        assert!(!supervisor.is_shut_down());
        drop(clone);
        assert!(supervisor.is_shut_down());
    }
}
