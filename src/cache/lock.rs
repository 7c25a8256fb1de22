//! # Lock Coordinator
//!
//! Per-key exclusive leases held in the backing store. A lease is owned by a
//! random token, bounded by its lease duration, and released with a
//! compare-and-delete so an owner can never release someone else's lease.
//!
//! Three outcomes are kept apart:
//!
//! - acquired: [`LockHandle::is_acquired`] is true
//! - not acquired within the wait window: an unacquired handle, not an error
//! - lock backend unusable: [`LockError::Unavailable`], returned at once
//!
//! Each attempt is bounded by the command timeout and by what is left of the
//! wait window. Release is bounded by the shorter of the command timeout and
//! the lease.

use crate::cache::keys::KeySpace;
use crate::cache::metrics::CacheMetrics;
use crate::cache::traits::{Connector, StoreConnection};
use crate::constants::components;
use crate::error::{cancellable, CacheError, LockError};
use crate::supervisor::ConnectionSupervisor;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

/// A lease on one lock resource.
///
/// Release it through [`LockCoordinator::release`]. A handle dropped while
/// still holding its lease schedules a detached release on the current
/// runtime; without a runtime the lease simply runs out.
pub struct LockHandle<C: Connector> {
    resource: String,
    token: String,
    acquired: bool,
    lease: Duration,
    release_timeout: Duration,
    connection: Option<Arc<C::Connection>>,
}

impl<C: Connector> std::fmt::Debug for LockHandle<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockHandle")
            .field("resource", &self.resource)
            .field("acquired", &self.acquired)
            .field("lease", &self.lease)
            .field("held", &self.is_held())
            .finish()
    }
}

impl<C: Connector> LockHandle<C> {
    fn acquired(
        resource: String,
        token: String,
        lease: Duration,
        command_timeout: Duration,
        connection: Arc<C::Connection>,
    ) -> Self {
        Self {
            resource,
            token,
            acquired: true,
            lease,
            release_timeout: command_timeout.min(lease),
            connection: Some(connection),
        }
    }

    fn not_acquired(resource: String, lease: Duration) -> Self {
        Self {
            resource,
            token: String::new(),
            acquired: false,
            lease,
            release_timeout: Duration::ZERO,
            connection: None,
        }
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Whether the lease was won. Stays true after release.
    pub fn is_acquired(&self) -> bool {
        self.acquired
    }

    /// Whether the lease is still owned and unreleased
    pub fn is_held(&self) -> bool {
        self.connection.is_some()
    }

    pub fn lease(&self) -> Duration {
        self.lease
    }

    async fn release(&mut self) {
        let Some(connection) = self.connection.take() else {
            return;
        };

        let released = tokio::time::timeout(
            self.release_timeout,
            connection.unlock(&self.resource, &self.token),
        )
        .await;
        match released {
            Ok(Ok(true)) => {
                debug!(component = components::LOCK, resource = %self.resource, "Lock released");
            }
            Ok(Ok(false)) => {
                warn!(
                    component = components::LOCK,
                    resource = %self.resource,
                    lease_ms = self.lease.as_millis() as u64,
                    "Lock lease expired before release"
                );
            }
            Ok(Err(e)) => {
                warn!(
                    component = components::LOCK,
                    resource = %self.resource,
                    error = %e,
                    "Lock release failed, lease will expire on its own"
                );
            }
            Err(_) => {
                warn!(
                    component = components::LOCK,
                    resource = %self.resource,
                    "Lock release timed out, lease will expire on its own"
                );
            }
        }
    }
}

impl<C: Connector> Drop for LockHandle<C> {
    fn drop(&mut self) {
        let Some(connection) = self.connection.take() else {
            return;
        };

        let resource = std::mem::take(&mut self.resource);
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(
                component = components::LOCK,
                resource = %resource,
                "Lock handle dropped outside a runtime, lease will expire on its own"
            );
            return;
        };

        debug!(
            component = components::LOCK,
            resource = %resource,
            "Lock handle dropped while held, releasing in background"
        );
        let token = std::mem::take(&mut self.token);
        let release_timeout = self.release_timeout;
        runtime.spawn(async move {
            if !matches!(
                tokio::time::timeout(release_timeout, connection.unlock(&resource, &token)).await,
                Ok(Ok(true))
            ) {
                debug!(
                    component = components::LOCK,
                    resource = %resource,
                    "Background lock release did not remove the lease"
                );
            }
        });
    }
}

/// Acquires and releases per-key leases through the live connection
pub struct LockCoordinator<C: Connector> {
    supervisor: Arc<ConnectionSupervisor<C>>,
    keys: KeySpace,
    metrics: Arc<CacheMetrics>,
}

impl<C: Connector> std::fmt::Debug for LockCoordinator<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockCoordinator")
            .field("keys", &self.keys)
            .finish()
    }
}

impl<C: Connector> LockCoordinator<C> {
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

    /// Try to lease the lock for logical `key`.
    ///
    /// Retries every `retry_interval` until `wait` elapses. Running out of
    /// time yields an unacquired handle; a failing lock backend yields
    /// [`LockError::Unavailable`] immediately.
    pub async fn try_acquire(
        &self,
        key: &str,
        lease: Duration,
        wait: Duration,
        retry_interval: Duration,
        cancel: &CancellationToken,
    ) -> Result<LockHandle<C>, LockError> {
        let resource = self.keys.lock_key(key);

        let Some(connection) = self
            .supervisor
            .current()
            .filter(|connection| connection.is_connected())
        else {
            self.metrics.record_lock_unavailable();
            debug!(
                component = components::LOCK,
                resource = %resource,
                "No live connection for lock"
            );
            return Err(LockError::Unavailable(CacheError::ConnectionError(
                "no live store connection".to_string(),
            )));
        };

        let token = Uuid::new_v4().to_string();
        let command_timeout = self.supervisor.command_timeout();
        let deadline = Instant::now() + wait;
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;
            // the first attempt always gets a full round trip
            let budget = if attempts == 1 {
                command_timeout
            } else {
                command_timeout.min(deadline.saturating_duration_since(Instant::now()))
            };

            let attempt =
                tokio::time::timeout(budget, connection.try_lock(&resource, &token, lease));
            let outcome = cancellable(cancel, attempt).await?;
            let error = match outcome {
                Ok(Ok(true)) => {
                    self.metrics.record_lock_acquired();
                    debug!(
                        component = components::LOCK,
                        resource = %resource,
                        attempts = attempts,
                        "Lock acquired"
                    );
                    return Ok(LockHandle::acquired(
                        resource,
                        token,
                        lease,
                        command_timeout,
                        connection,
                    ));
                }
                Ok(Ok(false)) => None,
                Ok(Err(e)) => Some(e),
                // cut short by the wait window rather than by the store
                Err(_) if budget < command_timeout => None,
                Err(_) => Some(CacheError::Timeout(format!(
                    "lock attempt did not complete within {}ms",
                    command_timeout.as_millis()
                ))),
            };

            if let Some(e) = error {
                self.metrics.record_lock_unavailable();
                warn!(
                    component = components::LOCK,
                    resource = %resource,
                    error = %e,
                    "Lock backend unavailable"
                );
                if e.is_transport() {
                    self.supervisor.invalidate(&connection);
                }
                return Err(LockError::Unavailable(e));
            }

            let now = Instant::now();
            if now >= deadline {
                self.metrics.record_lock_timeout();
                debug!(
                    component = components::LOCK,
                    resource = %resource,
                    attempts = attempts,
                    wait_ms = wait.as_millis() as u64,
                    "Lock not acquired within wait window"
                );
                return Ok(LockHandle::not_acquired(resource, lease));
            }

            let pause = retry_interval.min(deadline - now);
            cancellable(cancel, tokio::time::sleep(pause)).await?;
        }
    }

    /// Release a lease. Safe to call any number of times, and on handles
    /// that never acquired.
    pub async fn release(&self, handle: &mut LockHandle<C>) {
        handle.release().await;
    }
}
