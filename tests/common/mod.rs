#![allow(dead_code)]

pub mod flaky;
pub mod strategies;

pub use flaky::*;

use resilient_cache::{CacheConfig, ResilientCache};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Config with timings short enough for tests
pub fn test_config() -> CacheConfig {
    CacheConfig::default()
        .with_lock_timing(
            Duration::from_secs(5),
            Duration::from_millis(500),
            Duration::from_millis(10),
        )
        .with_retry_delays(Duration::from_millis(10), Duration::from_millis(50))
        .with_connect_timeout(Duration::from_millis(500))
}

/// Cache over `connector`, connected before it is returned
pub async fn connected_cache(connector: FlakyConnector) -> ResilientCache<FlakyConnector> {
    connected_cache_with(connector, test_config()).await
}

pub async fn connected_cache_with(
    connector: FlakyConnector,
    config: CacheConfig,
) -> ResilientCache<FlakyConnector> {
    let cache = ResilientCache::new(connector, config).expect("valid test config");
    cache
        .ensure_connected(&CancellationToken::new())
        .await
        .expect("not cancelled");
    assert!(cache.is_connected(), "test store should accept connections");
    cache
}

/// Poll `condition` every 5ms for up to `limit`
pub async fn eventually(limit: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
