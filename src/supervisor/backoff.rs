//! Reconnect backoff.
//!
//! `delay(attempt) = min(max, base * 2^(min(attempt, 10) - 1)) + jitter`,
//! with jitter drawn uniformly from `[0, max(base, 1ms))`.

use crate::constants::MAX_BACKOFF_EXPONENT;
use std::time::Duration;

/// Exponential part of the backoff, without jitter
pub fn compute_backoff(attempt: u32, base: Duration, max: Duration) -> Duration {
    let exponent = attempt.clamp(1, MAX_BACKOFF_EXPONENT) - 1;
    base.saturating_mul(1u32 << exponent).min(max)
}

/// Random jitter in `[0, base)`; a zero base still jitters within one millisecond
pub fn jitter(base: Duration) -> Duration {
    let bound = u64::try_from(base.as_millis()).unwrap_or(u64::MAX).max(1);
    Duration::from_millis(fastrand::u64(0..bound))
}

/// Full delay before reconnect attempt number `attempt`
pub fn retry_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    compute_backoff(attempt, base, max) + jitter(base)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: Duration = Duration::from_millis(100);
    const MAX: Duration = Duration::from_secs(5);

    #[test]
    fn test_backoff_doubles_per_attempt() {
        assert_eq!(compute_backoff(1, BASE, MAX), Duration::from_millis(100));
        assert_eq!(compute_backoff(2, BASE, MAX), Duration::from_millis(200));
        assert_eq!(compute_backoff(3, BASE, MAX), Duration::from_millis(400));
        assert_eq!(compute_backoff(6, BASE, MAX), Duration::from_millis(3200));
    }

    #[test]
    fn test_backoff_is_capped() {
        assert_eq!(compute_backoff(7, BASE, MAX), MAX);
        assert_eq!(compute_backoff(u32::MAX, BASE, MAX), MAX);
    }

    #[test]
    fn test_attempt_zero_behaves_like_first_attempt() {
        assert_eq!(compute_backoff(0, BASE, MAX), BASE);
    }

    #[test]
    fn test_exponent_ceiling_prevents_overflow() {
        let huge = Duration::from_secs(u64::MAX / 2);
        let delay = compute_backoff(1_000, huge, Duration::MAX);
        assert_eq!(delay, huge.saturating_mul(1 << (MAX_BACKOFF_EXPONENT - 1)));
    }

    #[test]
    fn test_jitter_stays_below_base() {
        for _ in 0..1_000 {
            assert!(jitter(BASE) < BASE);
        }
        assert_eq!(jitter(Duration::ZERO), Duration::ZERO);
    }
}
