//! In-process store provider.
//!
//! [`MemoryStore`] is a plain value the caller constructs and hands to a
//! [`MemoryConnector`]; two caches sharing one store see each other's entries
//! and locks, two caches with separate stores are fully isolated. Expiry is
//! lazy: stale keys are dropped when touched, never swept.

use crate::cache::traits::{Connector, StoreConnection};
use crate::error::StoreResult;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Clone)]
struct StoredValue {
    value: String,
    expires_at: Option<Instant>,
}

impl StoredValue {
    fn new(value: &str, ttl: Duration, now: Instant) -> Self {
        Self {
            value: value.to_string(),
            expires_at: now.checked_add(ttl),
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Shared in-memory key/value map with per-key expiry
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<DashMap<String, StoredValue>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        match self.entries.get(key) {
            None => return None,
            Some(stored) if !stored.is_expired(now) => return Some(stored.value.clone()),
            Some(_) => {}
        }
        self.entries.remove_if(key, |_, stored| stored.is_expired(now));
        None
    }

    pub fn set(&self, key: &str, value: &str, ttl: Duration) {
        self.entries
            .insert(key.to_string(), StoredValue::new(value, ttl, Instant::now()));
    }

    pub fn remove(&self, key: &str) -> bool {
        let now = Instant::now();
        self.entries
            .remove(key)
            .is_some_and(|(_, stored)| !stored.is_expired(now))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Insert `token` under `resource` unless a live lease already exists
    pub fn try_lock(&self, resource: &str, token: &str, lease: Duration) -> bool {
        let now = Instant::now();
        match self.entries.entry(resource.to_string()) {
            Entry::Occupied(mut held) => {
                if held.get().is_expired(now) {
                    held.insert(StoredValue::new(token, lease, now));
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(free) => {
                free.insert(StoredValue::new(token, lease, now));
                true
            }
        }
    }

    /// Remove `resource` if it is still leased to `token`
    pub fn unlock(&self, resource: &str, token: &str) -> bool {
        let now = Instant::now();
        self.entries
            .remove_if(resource, |_, held| held.value == token && !held.is_expired(now))
            .is_some()
    }

    /// Number of physically present keys, expired or not
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Connection over a [`MemoryStore`]; always reachable
#[derive(Debug, Clone)]
pub struct MemoryConnection {
    store: MemoryStore,
}

impl MemoryConnection {
    pub fn new(store: MemoryStore) -> Self {
        Self { store }
    }
}

impl StoreConnection for MemoryConnection {
    fn is_connected(&self) -> bool {
        true
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.store.get(key))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        self.store.set(key, value, ttl);
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        Ok(self.store.remove(key))
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        Ok(self.store.contains(key))
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn try_lock(&self, resource: &str, token: &str, lease: Duration) -> StoreResult<bool> {
        Ok(self.store.try_lock(resource, token, lease))
    }

    async fn unlock(&self, resource: &str, token: &str) -> StoreResult<bool> {
        Ok(self.store.unlock(resource, token))
    }

    fn provider_name(&self) -> &'static str {
        "memory"
    }
}

/// Hands out connections to one injected [`MemoryStore`]
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    store: MemoryStore,
}

impl MemoryConnector {
    pub fn new(store: MemoryStore) -> Self {
        Self { store }
    }
}

impl Connector for MemoryConnector {
    type Connection = MemoryConnection;

    async fn connect(&self) -> StoreResult<MemoryConnection> {
        debug!("Memory store connection opened");
        Ok(MemoryConnection::new(self.store.clone()))
    }

    fn endpoint(&self) -> String {
        "memory://local".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expired_values_are_dropped_on_read() {
        let store = MemoryStore::new();
        store.set("k", "v", Duration::ZERO);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("k"), None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_remove_reports_live_keys_only() {
        let store = MemoryStore::new();
        store.set("live", "v", Duration::from_secs(60));
        store.set("dead", "v", Duration::ZERO);
        assert!(store.remove("live"));
        assert!(!store.remove("dead"));
        assert!(!store.remove("missing"));
    }

    #[test]
    fn test_lock_is_exclusive_until_released() {
        let store = MemoryStore::new();
        assert!(store.try_lock("r:lock", "a", Duration::from_secs(30)));
        assert!(!store.try_lock("r:lock", "b", Duration::from_secs(30)));

        // only the owner can release
        assert!(!store.unlock("r:lock", "b"));
        assert!(store.unlock("r:lock", "a"));
        assert!(store.try_lock("r:lock", "b", Duration::from_secs(30)));
    }

    #[test]
    fn test_expired_lease_can_be_taken_over() {
        let store = MemoryStore::new();
        assert!(store.try_lock("r:lock", "a", Duration::ZERO));
        assert!(store.try_lock("r:lock", "b", Duration::from_secs(30)));
        assert!(!store.unlock("r:lock", "a"));
    }

    #[tokio::test]
    async fn test_connections_share_the_injected_store() {
        let store = MemoryStore::new();
        let connector = MemoryConnector::new(store.clone());
        let first = connector.connect().await.unwrap();
        let second = connector.connect().await.unwrap();

        first.set("shared", "1", Duration::from_secs(60)).await.unwrap();
        assert_eq!(second.get("shared").await.unwrap(), Some("1".to_string()));
        assert!(second.exists("shared").await.unwrap());
        assert!(store.contains("shared"));

        let isolated = MemoryConnector::default().connect().await.unwrap();
        assert_eq!(isolated.get("shared").await.unwrap(), None);
    }
}
