//! Store backend traits.
//!
//! A [`Connector`] produces live [`StoreConnection`]s. The supervisor owns the
//! connector and publishes whatever connection it last produced; every other
//! component only ever sees a snapshot of that connection.

use crate::error::StoreResult;
use std::time::Duration;

/// A live connection to a key/value store with lease-based locking.
///
/// Implementations report failures as [`CacheError`](crate::CacheError) and
/// never retry; reconnecting is the supervisor's job.
pub trait StoreConnection: Send + Sync + 'static {
    /// Whether the connection still believes it can reach the store
    fn is_connected(&self) -> bool;

    /// Get a raw value by key. `Ok(None)` on a miss.
    fn get(
        &self,
        key: &str,
    ) -> impl std::future::Future<Output = StoreResult<Option<String>>> + Send;

    /// Set a raw value that the store expires after `ttl`
    fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> impl std::future::Future<Output = StoreResult<()>> + Send;

    /// Delete a key. Returns whether something was removed.
    fn delete(&self, key: &str) -> impl std::future::Future<Output = StoreResult<bool>> + Send;

    /// Check whether a key is present
    fn exists(&self, key: &str) -> impl std::future::Future<Output = StoreResult<bool>> + Send;

    /// Round-trip to the store
    fn ping(&self) -> impl std::future::Future<Output = StoreResult<()>> + Send;

    /// Claim `resource` for `token` unless someone else holds it.
    ///
    /// `Ok(false)` means the lease is held by another owner.
    fn try_lock(
        &self,
        resource: &str,
        token: &str,
        lease: Duration,
    ) -> impl std::future::Future<Output = StoreResult<bool>> + Send;

    /// Release `resource` only if it is still held by `token`
    fn unlock(
        &self,
        resource: &str,
        token: &str,
    ) -> impl std::future::Future<Output = StoreResult<bool>> + Send;

    /// Get the name of the store provider
    fn provider_name(&self) -> &'static str;
}

/// Factory for store connections, invoked by the supervisor
pub trait Connector: Send + Sync + 'static {
    type Connection: StoreConnection;

    /// Open a new connection
    fn connect(&self) -> impl std::future::Future<Output = StoreResult<Self::Connection>> + Send;

    /// Endpoint description safe to log
    fn endpoint(&self) -> String;
}
