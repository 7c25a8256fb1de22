//! # Connection Supervisor
//!
//! Owns the lifecycle of the store connection for one cache instance.
//!
//! ```text
//! Disconnected ──connect──> Connecting ──ok──> Connected
//!      ^                        │                  │
//!      └────────── failure ─────┘<── ping fails ───┘
//! ```
//!
//! - The live connection is published through an [`ArcSwapOption`]; readers
//!   take a snapshot and never block on a replacement.
//! - A single async gate serializes connect attempts. Callers that queue on
//!   the gate while an attempt is running take that attempt's outcome instead
//!   of starting another one.
//! - [`ConnectionSupervisor::run`] is the background health loop. It pings
//!   while connected and retries with exponential backoff plus jitter while
//!   disconnected.
//! - [`RetryState`] is private to the supervisor.

pub mod backoff;

use crate::cache::metrics::CacheMetrics;
use crate::cache::traits::{Connector, StoreConnection};
use crate::config::CacheConfig;
use crate::constants::{components, MIN_HEALTH_CHECK_INTERVAL};
use crate::error::Cancelled;
use arc_swap::ArcSwapOption;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub use backoff::{compute_backoff, jitter, retry_delay};

/// Reachability of the backing store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
}

impl From<u8> for ConnectionState {
    fn from(value: u8) -> Self {
        match value {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            _ => ConnectionState::Disconnected,
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
        }
    }
}

/// Failed-attempt counter and the delays it scales
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryState {
    attempt: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl RetryState {
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            attempt: 0,
            base_delay,
            max_delay,
        }
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Count a failed attempt and return the new attempt number
    pub fn record_failure(&mut self) -> u32 {
        self.attempt = self.attempt.saturating_add(1);
        self.attempt
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Delay before the next attempt, jitter included
    pub fn next_delay(&self) -> Duration {
        retry_delay(self.attempt, self.base_delay, self.max_delay)
    }
}

/// Supervises the connection produced by a [`Connector`]
pub struct ConnectionSupervisor<C: Connector> {
    connector: C,
    handle: ArcSwapOption<C::Connection>,
    state: AtomicU8,
    connect_gate: tokio::sync::Mutex<()>,
    completed_attempts: AtomicU64,
    retry: parking_lot::Mutex<RetryState>,
    reconnect_pending: AtomicBool,
    health_check_interval: Duration,
    connect_timeout: Duration,
    command_timeout: Duration,
    metrics: Arc<CacheMetrics>,
    shutdown: CancellationToken,
}

impl<C: Connector> std::fmt::Debug for ConnectionSupervisor<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSupervisor")
            .field("endpoint", &self.connector.endpoint())
            .field("state", &self.state())
            .field("attempt", &self.retry.lock().attempt())
            .finish()
    }
}

impl<C: Connector> ConnectionSupervisor<C> {
    pub fn new(connector: C, config: &CacheConfig, metrics: Arc<CacheMetrics>) -> Self {
        Self {
            connector,
            handle: ArcSwapOption::empty(),
            state: AtomicU8::new(ConnectionState::Disconnected as u8),
            connect_gate: tokio::sync::Mutex::new(()),
            completed_attempts: AtomicU64::new(0),
            retry: parking_lot::Mutex::new(RetryState::new(
                config.retry_base_delay(),
                config.retry_max_delay(),
            )),
            reconnect_pending: AtomicBool::new(false),
            health_check_interval: config.health_check_interval().max(MIN_HEALTH_CHECK_INTERVAL),
            connect_timeout: config.connect_timeout(),
            command_timeout: config.command_timeout(),
            metrics,
            shutdown: CancellationToken::new(),
        }
    }

    /// Snapshot of the live connection, if any
    pub fn current(&self) -> Option<Arc<C::Connection>> {
        self.handle.load_full()
    }

    pub fn state(&self) -> ConnectionState {
        let state = ConnectionState::from(self.state.load(Ordering::Acquire));
        if state == ConnectionState::Connected && !self.handle_alive() {
            ConnectionState::Disconnected
        } else {
            state
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Current failed-attempt count
    pub fn retry_attempt(&self) -> u32 {
        self.retry.lock().attempt()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Bound for one command on the live connection
    pub fn command_timeout(&self) -> Duration {
        self.command_timeout
    }

    /// Unpublish `connection` after a transport failure.
    ///
    /// A no-op if it was already replaced. The next caller or health check
    /// sees no live handle and reconnects.
    pub fn invalidate(&self, connection: &Arc<C::Connection>) {
        let expected = Some(Arc::clone(connection));
        let previous = self
            .handle
            .compare_and_swap(&expected, None::<Arc<C::Connection>>);
        if (*previous)
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, connection))
        {
            warn!(
                component = components::SUPERVISOR,
                provider = connection.provider_name(),
                "Store connection dropped after transport failure"
            );
        }
    }

    fn handle_alive(&self) -> bool {
        self.current().is_some_and(|conn| conn.is_connected())
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Connect unless already connected.
    ///
    /// Connect failures are logged and leave the supervisor disconnected;
    /// only cancellation is returned as an error.
    pub async fn ensure_connected(&self, cancel: &CancellationToken) -> Result<(), Cancelled> {
        if self.is_connected() {
            return Ok(());
        }

        let observed = self.completed_attempts.load(Ordering::Acquire);
        let _gate = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Cancelled),
            gate = self.connect_gate.lock() => gate,
        };

        if self.is_connected() || self.completed_attempts.load(Ordering::Acquire) != observed {
            return Ok(());
        }

        self.connect_once(cancel).await
    }

    /// One connect attempt. Caller must hold the connect gate.
    async fn connect_once(&self, cancel: &CancellationToken) -> Result<(), Cancelled> {
        if self.shutdown.is_cancelled() {
            return Ok(());
        }

        self.set_state(ConnectionState::Connecting);
        debug!(
            component = components::SUPERVISOR,
            endpoint = %self.connector.endpoint(),
            "Connecting to store"
        );

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                self.set_state(ConnectionState::Disconnected);
                return Err(Cancelled);
            }
            outcome = tokio::time::timeout(self.connect_timeout, self.connector.connect()) => {
                outcome
            }
        };

        let failure = match outcome {
            Ok(Ok(connection)) => {
                self.handle.store(Some(Arc::new(connection)));
                self.set_state(ConnectionState::Connected);
                // shutdown may have run while connecting; its store(None) must win
                if self.shutdown.is_cancelled() {
                    self.handle.store(None);
                    self.set_state(ConnectionState::Disconnected);
                    debug!(
                        component = components::SUPERVISOR,
                        "Connected after shutdown, discarding connection"
                    );
                } else {
                    self.retry.lock().reset();
                    info!(
                        component = components::SUPERVISOR,
                        endpoint = %self.connector.endpoint(),
                        "Store connection established"
                    );
                }
                None
            }
            Ok(Err(e)) => Some(e.to_string()),
            Err(_) => Some(format!(
                "connect timed out after {}ms",
                self.connect_timeout.as_millis()
            )),
        };

        if let Some(error) = failure {
            let attempt = self.retry.lock().record_failure();
            self.set_state(ConnectionState::Disconnected);
            warn!(
                component = components::SUPERVISOR,
                endpoint = %self.connector.endpoint(),
                attempt = attempt,
                error = %error,
                "Store connection attempt failed"
            );
        }

        self.completed_attempts.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    /// Submit a detached reconnect and return immediately.
    ///
    /// At most one such task is in flight; its outcome never reaches the
    /// caller that triggered it.
    pub fn request_reconnect(self: &Arc<Self>) {
        if self.shutdown.is_cancelled() || self.is_connected() {
            return;
        }
        if self.reconnect_pending.swap(true, Ordering::AcqRel) {
            return;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            self.reconnect_pending.store(false, Ordering::Release);
            return;
        };

        self.metrics.record_reconnect_request();
        debug!(component = components::SUPERVISOR, "Background reconnect requested");

        let supervisor = Arc::clone(self);
        runtime.spawn(async move {
            let token = supervisor.shutdown.child_token();
            if supervisor.ensure_connected(&token).await.is_err() {
                debug!(
                    component = components::SUPERVISOR,
                    "Background reconnect cancelled by shutdown"
                );
            }
            supervisor.reconnect_pending.store(false, Ordering::Release);
        });
    }

    /// Health loop. Runs until [`shutdown`](Self::shutdown).
    pub async fn run(self: Arc<Self>) {
        info!(
            component = components::SUPERVISOR,
            endpoint = %self.connector.endpoint(),
            health_check_interval_ms = self.health_check_interval.as_millis() as u64,
            "Connection supervisor started"
        );

        while !self.shutdown.is_cancelled() {
            if self.is_connected() {
                if !self.pause(self.health_check_interval).await {
                    break;
                }
                self.verify().await;
                continue;
            }

            if self.ensure_connected(&self.shutdown).await.is_err() {
                break;
            }
            if self.is_connected() {
                continue;
            }

            let delay = self.retry.lock().next_delay();
            debug!(
                component = components::SUPERVISOR,
                attempt = self.retry_attempt(),
                backoff_ms = delay.as_millis() as u64,
                "Waiting before next connect attempt"
            );
            if !self.pause(delay).await {
                break;
            }
        }

        info!(component = components::SUPERVISOR, "Connection supervisor stopped");
    }

    /// Sleep unless shut down first; false means shutdown
    async fn pause(&self, delay: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    /// Ping the live connection and drop to disconnected if it fails
    async fn verify(&self) {
        let Some(connection) = self.current() else {
            self.set_state(ConnectionState::Disconnected);
            return;
        };

        let error = match tokio::time::timeout(self.connect_timeout, connection.ping()).await {
            Ok(Ok(())) if connection.is_connected() => return,
            Ok(Ok(())) => "connection reports unreachable".to_string(),
            Ok(Err(e)) => e.to_string(),
            Err(_) => "health check timed out".to_string(),
        };

        self.set_state(ConnectionState::Disconnected);
        warn!(
            component = components::SUPERVISOR,
            provider = connection.provider_name(),
            error = %error,
            "Store health check failed"
        );
    }

    /// Stop the health loop and drop the live connection
    pub fn shutdown(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        self.shutdown.cancel();
        self.handle.store(None);
        self.set_state(ConnectionState::Disconnected);
        info!(component = components::SUPERVISOR, "Connection supervisor shut down");
    }
}
