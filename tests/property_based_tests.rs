mod common;

use common::strategies::*;
use proptest::prelude::*;
use resilient_cache::supervisor::{compute_backoff, jitter, retry_delay};
use resilient_cache::{
    CacheConfig, CacheEntry, KeySpace, MemoryConnector, MemoryStore, ResilientCache,
};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

proptest! {
    /// Property: backoff never shrinks as attempts grow and never passes the cap
    #[test]
    fn backoff_is_monotonic_and_capped(
        (base, max) in backoff_bounds_strategy(),
        attempt in attempt_strategy(),
    ) {
        let current = compute_backoff(attempt, base, max);
        let next = compute_backoff(attempt + 1, base, max);
        prop_assert!(next >= current);
        prop_assert!(next <= max);
        prop_assert!(current >= base.min(max));
    }

    /// Property: below the cap and the exponent ceiling, each attempt doubles the delay
    #[test]
    fn backoff_strictly_increases_until_capped(
        (base, max) in backoff_bounds_strategy(),
        attempt in 1u32..10,
    ) {
        let current = compute_backoff(attempt, base, max);
        let next = compute_backoff(attempt + 1, base, max);
        if current < max {
            prop_assert!(next > current, "attempt {} -> {:?} then {:?}", attempt, current, next);
        } else {
            prop_assert_eq!(next, max);
        }
    }

    /// Property: jitter always lands in [0, base)
    #[test]
    fn jitter_is_below_base(base in base_delay_strategy()) {
        prop_assert!(jitter(base) < base);
    }

    /// Property: full retry delay is the capped backoff plus less than one base of jitter
    #[test]
    fn retry_delay_is_bounded(
        (base, max) in backoff_bounds_strategy(),
        attempt in attempt_strategy(),
    ) {
        let floor = compute_backoff(attempt, base, max);
        let delay = retry_delay(attempt, base, max);
        prop_assert!(delay >= floor);
        prop_assert!(delay < floor + base);
    }

    /// Property: lock keys never collide with data keys
    #[test]
    fn lock_keys_differ_from_data_keys(key in cache_key_strategy(), prefix in "[a-z]{0,4}:?") {
        let keys = KeySpace::new(prefix.clone(), ":lock");
        prop_assert_ne!(keys.data_key(&key), keys.lock_key(&key));
        prop_assert!(keys.data_key(&key).starts_with(&prefix));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Property: an entry whose expiration has passed is never returned, even if
    /// the backend still holds it
    #[test]
    fn expired_entries_are_never_returned(
        key in cache_key_strategy(),
        expired_ago in expired_offset_strategy(),
        value in any::<i64>(),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let (hit, exists) = runtime.block_on(async {
            let store = MemoryStore::new();
            let entry = CacheEntry::new(&value, chrono::Utc::now() - expired_ago, None).unwrap();
            store.set(&key, &entry.to_json().unwrap(), Duration::from_secs(3600));

            let cache =
                ResilientCache::new(MemoryConnector::new(store), CacheConfig::default()).unwrap();
            let cancel = CancellationToken::new();
            cache.ensure_connected(&cancel).await.unwrap();

            let hit = cache.get::<i64>(&key, &cancel).await.unwrap().has_value();
            let exists = cache.exists(&key, &cancel).await.unwrap();
            cache.shutdown();
            (hit, exists)
        });

        prop_assert!(!hit);
        prop_assert!(!exists);
    }
}
