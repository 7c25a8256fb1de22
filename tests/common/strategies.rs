//! Proptest strategies for timing and cache inputs.

use proptest::prelude::*;
use std::time::Duration;

/// Base delay between 1ms and 2s
pub fn base_delay_strategy() -> impl Strategy<Value = Duration> {
    (1u64..2_000).prop_map(Duration::from_millis)
}

/// (base, max) with max >= base
pub fn backoff_bounds_strategy() -> impl Strategy<Value = (Duration, Duration)> {
    base_delay_strategy().prop_flat_map(|base| {
        let base_ms = base.as_millis() as u64;
        (Just(base), (base_ms..base_ms * 4_096).prop_map(Duration::from_millis))
    })
}

/// Reconnect attempt numbers, including ones past the exponent ceiling
pub fn attempt_strategy() -> impl Strategy<Value = u32> {
    1u32..64
}

/// Cache keys as applications tend to write them
pub fn cache_key_strategy() -> impl Strategy<Value = String> {
    "[a-z]{1,8}(:[a-z0-9]{1,8}){0,3}"
}

/// How far in the past an entry expired
pub fn expired_offset_strategy() -> impl Strategy<Value = chrono::Duration> {
    (0i64..10_000_000).prop_map(chrono::Duration::milliseconds)
}
