//! Fault-injecting store connector backed by a [`MemoryStore`].

use resilient_cache::cache::providers::MemoryConnection;
use resilient_cache::{CacheError, Connector, MemoryStore, StoreConnection, StoreResult};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Switches shared between a test and every connection it hands out
#[derive(Debug, Clone, Default)]
pub struct Faults {
    store_down: Arc<AtomicBool>,
    lock_down: Arc<AtomicBool>,
    writes_down: Arc<AtomicBool>,
    stalled: Arc<AtomicBool>,
    lock_stalled: Arc<AtomicBool>,
    refuse_connect: Arc<AtomicBool>,
    connect_delay_ms: Arc<AtomicU64>,
    connects: Arc<AtomicUsize>,
    lock_attempts: Arc<AtomicUsize>,
}

impl Faults {
    /// Every data and lock command fails with a transport error
    pub fn set_store_down(&self, down: bool) {
        self.store_down.store(down, Ordering::SeqCst);
    }

    /// Lock commands fail while data commands keep working
    pub fn set_lock_down(&self, down: bool) {
        self.lock_down.store(down, Ordering::SeqCst);
    }

    /// SET and DEL fail with a transport error while reads keep working
    pub fn set_writes_down(&self, down: bool) {
        self.writes_down.store(down, Ordering::SeqCst);
    }

    /// Every command hangs without failing, like a store that stopped
    /// answering but kept the socket open
    pub fn set_stalled(&self, stalled: bool) {
        self.stalled.store(stalled, Ordering::SeqCst);
    }

    /// Only lock commands hang
    pub fn set_lock_stalled(&self, stalled: bool) {
        self.lock_stalled.store(stalled, Ordering::SeqCst);
    }

    pub fn set_refuse_connect(&self, refuse: bool) {
        self.refuse_connect.store(refuse, Ordering::SeqCst);
    }

    pub fn set_connect_delay(&self, delay: Duration) {
        self.connect_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn lock_attempts(&self) -> usize {
        self.lock_attempts.load(Ordering::SeqCst)
    }

    fn store_down(&self) -> bool {
        self.store_down.load(Ordering::SeqCst)
    }

    fn lock_down(&self) -> bool {
        self.lock_down.load(Ordering::SeqCst)
    }

    fn writes_down(&self) -> bool {
        self.writes_down.load(Ordering::SeqCst)
    }

    fn stalled(&self, lock_command: bool) -> bool {
        self.stalled.load(Ordering::SeqCst)
            || (lock_command && self.lock_stalled.load(Ordering::SeqCst))
    }
}

#[derive(Debug, Clone, Default)]
pub struct FlakyConnector {
    pub store: MemoryStore,
    pub faults: Faults,
}

impl FlakyConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connector whose connect attempts fail until told otherwise
    pub fn refusing() -> Self {
        let connector = Self::default();
        connector.faults.set_refuse_connect(true);
        connector
    }
}

impl Connector for FlakyConnector {
    type Connection = FlakyConnection;

    async fn connect(&self) -> StoreResult<FlakyConnection> {
        self.faults.connects.fetch_add(1, Ordering::SeqCst);

        let delay = self.faults.connect_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        if self.faults.refuse_connect.load(Ordering::SeqCst) {
            return Err(CacheError::ConnectionError("connection refused".to_string()));
        }

        Ok(FlakyConnection {
            inner: MemoryConnection::new(self.store.clone()),
            faults: self.faults.clone(),
        })
    }

    fn endpoint(&self) -> String {
        "flaky://test".to_string()
    }
}

pub struct FlakyConnection {
    inner: MemoryConnection,
    faults: Faults,
}

impl FlakyConnection {
    fn check_store(&self) -> StoreResult<()> {
        if self.faults.store_down() {
            Err(CacheError::ConnectionError("store unreachable".to_string()))
        } else {
            Ok(())
        }
    }

    fn check_lock(&self) -> StoreResult<()> {
        self.check_store()?;
        if self.faults.lock_down() {
            Err(CacheError::BackendError("lock backend unavailable".to_string()))
        } else {
            Ok(())
        }
    }

    fn check_write(&self) -> StoreResult<()> {
        self.check_store()?;
        if self.faults.writes_down() {
            Err(CacheError::ConnectionError("write connection reset".to_string()))
        } else {
            Ok(())
        }
    }

    /// Never returns while the matching stall switch is on
    async fn stall(&self, lock_command: bool) {
        if self.faults.stalled(lock_command) {
            std::future::pending::<()>().await;
        }
    }
}

impl StoreConnection for FlakyConnection {
    fn is_connected(&self) -> bool {
        !self.faults.store_down()
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.stall(false).await;
        self.check_store()?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        self.stall(false).await;
        self.check_write()?;
        self.inner.set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        self.stall(false).await;
        self.check_write()?;
        self.inner.delete(key).await
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        self.stall(false).await;
        self.check_store()?;
        self.inner.exists(key).await
    }

    async fn ping(&self) -> StoreResult<()> {
        self.stall(false).await;
        self.check_store()
    }

    async fn try_lock(&self, resource: &str, token: &str, lease: Duration) -> StoreResult<bool> {
        self.faults.lock_attempts.fetch_add(1, Ordering::SeqCst);
        self.stall(true).await;
        self.check_lock()?;
        self.inner.try_lock(resource, token, lease).await
    }

    async fn unlock(&self, resource: &str, token: &str) -> StoreResult<bool> {
        self.stall(true).await;
        self.check_lock()?;
        self.inner.unlock(resource, token).await
    }

    fn provider_name(&self) -> &'static str {
        "flaky"
    }
}
