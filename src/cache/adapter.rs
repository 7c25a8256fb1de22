//! # Store Adapter
//!
//! Issues reads and writes against a snapshot of the supervisor's current
//! connection. It never retries and never reconnects: a missing or dead
//! connection, or a failed command, is reported as
//! [`StoreRead::Unreachable`] / [`StoreWrite::Unreachable`] and left for the
//! caller to act on.
//!
//! Every command is bounded by the configured command timeout. A timeout or
//! other transport failure also unpublishes the connection it happened on.
//!
//! Values travel inside a [`CacheEntry`] envelope, so expiry is enforced here
//! on every read regardless of what the backend still holds.

use crate::cache::entry::CacheEntry;
use crate::cache::keys::KeySpace;
use crate::cache::metrics::CacheMetrics;
use crate::cache::traits::{Connector, StoreConnection};
use crate::constants::components;
use crate::error::{cancellable, CacheError, Cancelled, StoreResult};
use crate::supervisor::ConnectionSupervisor;
use chrono::Utc;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Outcome of a read
#[derive(Debug, Clone, PartialEq)]
pub enum StoreRead<T> {
    /// Live entry decoded as `T`; the envelope is kept for sliding renewal
    Hit { value: T, entry: CacheEntry },
    Miss,
    Unreachable,
}

impl<T> StoreRead<T> {
    pub fn is_unreachable(&self) -> bool {
        matches!(self, StoreRead::Unreachable)
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            StoreRead::Hit { value, .. } => Some(value),
            StoreRead::Miss | StoreRead::Unreachable => None,
        }
    }
}

/// Outcome of a write or delete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreWrite {
    Done,
    /// Nothing was sent: the entry was already expired or would not encode
    Skipped,
    Unreachable,
}

/// Outcome of an existence check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Present,
    Absent,
    Unreachable,
}

/// Stateless access to the store through the supervisor's live connection
pub struct StoreAdapter<C: Connector> {
    supervisor: Arc<ConnectionSupervisor<C>>,
    keys: KeySpace,
    metrics: Arc<CacheMetrics>,
}

impl<C: Connector> std::fmt::Debug for StoreAdapter<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreAdapter")
            .field("keys", &self.keys)
            .finish()
    }
}

impl<C: Connector> StoreAdapter<C> {
    pub fn new(
        supervisor: Arc<ConnectionSupervisor<C>>,
        keys: KeySpace,
        metrics: Arc<CacheMetrics>,
    ) -> Self {
        Self {
            supervisor,
            keys,
            metrics,
        }
    }

    /// Live connection snapshot, or `None` when the store cannot be used
    fn connection(&self) -> Option<Arc<C::Connection>> {
        self.supervisor
            .current()
            .filter(|connection| connection.is_connected())
    }

    /// Drive one command on `connection`.
    ///
    /// `Ok(None)` means the command failed or timed out; it has already been
    /// logged and counted.
    async fn command<T>(
        &self,
        operation: &'static str,
        key: &str,
        connection: &Arc<C::Connection>,
        command: impl Future<Output = StoreResult<T>>,
        cancel: &CancellationToken,
    ) -> Result<Option<T>, Cancelled> {
        let timeout = self.supervisor.command_timeout();
        let error = match cancellable(cancel, tokio::time::timeout(timeout, command)).await? {
            Ok(Ok(value)) => return Ok(Some(value)),
            Ok(Err(e)) => e,
            Err(_) => CacheError::Timeout(format!(
                "{} did not complete within {}ms",
                operation,
                timeout.as_millis()
            )),
        };

        self.metrics.record_store_error();
        warn!(
            component = components::ADAPTER,
            operation = operation,
            key = %key,
            error = %error,
            "Store operation failed"
        );
        if error.is_transport() {
            self.supervisor.invalidate(connection);
        }
        Ok(None)
    }

    /// Read and decode the entry for `key`.
    ///
    /// Expired entries and payloads that do not decode as `T` are misses.
    pub async fn get<T: DeserializeOwned>(
        &self,
        key: &str,
        cancel: &CancellationToken,
    ) -> Result<StoreRead<T>, Cancelled> {
        let entry = match self.get_entry(key, cancel).await? {
            StoreRead::Hit { entry, .. } => entry,
            StoreRead::Miss => return Ok(StoreRead::Miss),
            StoreRead::Unreachable => return Ok(StoreRead::Unreachable),
        };

        match entry.decode::<T>() {
            Ok(value) => Ok(StoreRead::Hit { value, entry }),
            Err(e) => {
                warn!(
                    component = components::ADAPTER,
                    key = %key,
                    error = %e,
                    "Cached value does not decode as the requested type, treating as miss"
                );
                Ok(StoreRead::Miss)
            }
        }
    }

    /// Read the raw envelope for `key`, enforcing expiry
    pub async fn get_entry(
        &self,
        key: &str,
        cancel: &CancellationToken,
    ) -> Result<StoreRead<()>, Cancelled> {
        let Some(connection) = self.connection() else {
            return Ok(StoreRead::Unreachable);
        };

        let data_key = self.keys.data_key(key);
        let read = self
            .command(
                "get",
                key,
                &connection,
                connection.get(&data_key),
                cancel,
            )
            .await?;
        let raw = match read {
            Some(Some(raw)) => raw,
            Some(None) => {
                debug!(component = components::ADAPTER, key = %key, "Cache MISS");
                return Ok(StoreRead::Miss);
            }
            None => return Ok(StoreRead::Unreachable),
        };

        let entry = match CacheEntry::from_json(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(
                    component = components::ADAPTER,
                    key = %key,
                    error = %e,
                    "Stored payload is not a cache entry, treating as miss"
                );
                return Ok(StoreRead::Miss);
            }
        };

        if entry.is_expired_at(Utc::now()) {
            debug!(component = components::ADAPTER, key = %key, "Cache entry expired");
            return Ok(StoreRead::Miss);
        }

        debug!(component = components::ADAPTER, key = %key, "Cache HIT");
        Ok(StoreRead::Hit { value: (), entry })
    }

    /// Write `entry` under `key` with whatever lifetime it has left
    pub async fn set(
        &self,
        key: &str,
        entry: &CacheEntry,
        cancel: &CancellationToken,
    ) -> Result<StoreWrite, Cancelled> {
        let ttl = entry.remaining_ttl_at(Utc::now());
        if ttl.is_zero() {
            debug!(
                component = components::ADAPTER,
                key = %key,
                "Entry already expired, write skipped"
            );
            return Ok(StoreWrite::Skipped);
        }

        let payload = match entry.to_json() {
            Ok(payload) => payload,
            Err(e) => {
                error!(
                    component = components::ADAPTER,
                    key = %key,
                    error = %e,
                    "Failed to encode cache entry, write skipped"
                );
                return Ok(StoreWrite::Skipped);
            }
        };

        let Some(connection) = self.connection() else {
            return Ok(StoreWrite::Unreachable);
        };

        let data_key = self.keys.data_key(key);
        let written = self
            .command(
                "set",
                key,
                &connection,
                connection.set(&data_key, &payload, ttl),
                cancel,
            )
            .await?;
        if written.is_none() {
            return Ok(StoreWrite::Unreachable);
        }

        debug!(
            component = components::ADAPTER,
            key = %key,
            ttl_ms = ttl.as_millis() as u64,
            "Cache SET"
        );
        Ok(StoreWrite::Done)
    }

    /// Push a sliding entry's expiration forward and rewrite it.
    ///
    /// Non-sliding entries are left alone.
    pub async fn renew(
        &self,
        key: &str,
        mut entry: CacheEntry,
        cancel: &CancellationToken,
    ) -> Result<StoreWrite, Cancelled> {
        if !entry.slide(Utc::now()) {
            return Ok(StoreWrite::Skipped);
        }
        self.set(key, &entry, cancel).await
    }

    pub async fn delete(
        &self,
        key: &str,
        cancel: &CancellationToken,
    ) -> Result<StoreWrite, Cancelled> {
        let Some(connection) = self.connection() else {
            return Ok(StoreWrite::Unreachable);
        };

        let data_key = self.keys.data_key(key);
        let removed = self
            .command(
                "delete",
                key,
                &connection,
                connection.delete(&data_key),
                cancel,
            )
            .await?;
        let Some(removed) = removed else {
            return Ok(StoreWrite::Unreachable);
        };

        debug!(
            component = components::ADAPTER,
            key = %key,
            removed = removed,
            "Cache DEL"
        );
        Ok(StoreWrite::Done)
    }

    /// Whether a live entry exists for `key`.
    ///
    /// A physical key is confirmed against its envelope so an expired entry
    /// still reports absent.
    pub async fn exists(
        &self,
        key: &str,
        cancel: &CancellationToken,
    ) -> Result<Presence, Cancelled> {
        let Some(connection) = self.connection() else {
            return Ok(Presence::Unreachable);
        };

        let data_key = self.keys.data_key(key);
        let present = self
            .command(
                "exists",
                key,
                &connection,
                connection.exists(&data_key),
                cancel,
            )
            .await?;
        match present {
            Some(true) => {}
            Some(false) => return Ok(Presence::Absent),
            None => return Ok(Presence::Unreachable),
        }

        Ok(match self.get_entry(key, cancel).await? {
            StoreRead::Hit { .. } => Presence::Present,
            StoreRead::Miss => Presence::Absent,
            StoreRead::Unreachable => Presence::Unreachable,
        })
    }
}
