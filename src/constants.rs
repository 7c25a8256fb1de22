//! # Cache Constants
//!
//! Fixed protocol values shared by the supervisor, the lock coordinator and
//! the store backends.

use std::time::Duration;

/// Suffix appended to a data key to name its lock resource
pub const DEFAULT_LOCK_SUFFIX: &str = ":lock";

/// Ceiling for the backoff exponent so `base * 2^(attempt-1)` cannot overflow
pub const MAX_BACKOFF_EXPONENT: u32 = 10;

/// Smallest health-check sleep the supervisor will use
pub const MIN_HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Component names used as `component` fields in structured logs
pub mod components {
    pub const SUPERVISOR: &str = "connection_supervisor";
    pub const ADAPTER: &str = "store_adapter";
    pub const LOCK: &str = "lock_coordinator";
    pub const ORCHESTRATOR: &str = "get_or_add";
    pub const FACADE: &str = "resilient_cache";
}

/// Environment variables consulted by configuration and logging
pub mod env {
    /// Prefix for configuration overrides, e.g. `RESILIENT_CACHE__LOCK_WAIT_MS`
    pub const CONFIG_PREFIX: &str = "RESILIENT_CACHE";
    pub const CONFIG_SEPARATOR: &str = "__";
    pub const ENVIRONMENT: &str = "RESILIENT_CACHE_ENV";
    pub const FALLBACK_ENVIRONMENT: &str = "APP_ENV";
}
