//! # Cache Configuration
//!
//! All tunables of the resilient cache live in [`CacheConfig`]. Durations are
//! stored as millisecond integers so they can be written in any config file
//! format or environment variable, and exposed as [`Duration`] accessors.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use resilient_cache::config::CacheConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Defaults, then cache.toml, then RESILIENT_CACHE__* environment overrides
//! let config = CacheConfig::load(Some(std::path::Path::new("cache.toml")))?;
//!
//! let lease = config.lock_lease();
//! let prefix = &config.key_prefix;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use crate::constants::DEFAULT_LOCK_SUFFIX;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};

/// Root configuration for a [`ResilientCache`](crate::ResilientCache) instance
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Connection string for the remote store (credentials are redacted in logs)
    pub url: String,

    /// Prepended to every logical key
    pub key_prefix: String,

    /// Appended to a data key to name its lock
    pub lock_suffix: String,

    /// Expiration used when a write does not carry its own TTL
    pub default_ttl_ms: u64,

    /// How long a get-or-add lock lease lives before the store expires it
    pub lock_lease_ms: u64,

    /// How long to wait for a contended lock (and to poll for its result)
    pub lock_wait_ms: u64,

    /// Pause between lock attempts and between result polls
    pub lock_retry_interval_ms: u64,

    /// Sleep between health checks while connected
    pub health_check_interval_ms: u64,

    /// First reconnect backoff step and the upper bound of jitter
    pub retry_base_delay_ms: u64,

    /// Ceiling for the exponential part of the reconnect backoff
    pub retry_max_delay_ms: u64,

    /// Upper bound for a single connect attempt
    pub connect_timeout_ms: u64,

    /// Upper bound for one store or lock command round trip
    pub command_timeout_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            key_prefix: String::new(),
            lock_suffix: DEFAULT_LOCK_SUFFIX.to_string(),
            default_ttl_ms: 300_000,
            lock_lease_ms: 30_000,
            lock_wait_ms: 10_000,
            lock_retry_interval_ms: 200,
            health_check_interval_ms: 10_000,
            retry_base_delay_ms: 500,
            retry_max_delay_ms: 30_000,
            connect_timeout_ms: 5_000,
            command_timeout_ms: 1_000,
        }
    }
}

impl CacheConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_millis(self.default_ttl_ms)
    }

    pub fn lock_lease(&self) -> Duration {
        Duration::from_millis(self.lock_lease_ms)
    }

    pub fn lock_wait(&self) -> Duration {
        Duration::from_millis(self.lock_wait_ms)
    }

    pub fn lock_retry_interval(&self) -> Duration {
        Duration::from_millis(self.lock_retry_interval_ms)
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_interval_ms)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn retry_max_delay(&self) -> Duration {
        Duration::from_millis(self.retry_max_delay_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    /// Set the store connection string
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Set the key prefix
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Set the default entry TTL
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl_ms = duration_ms(ttl);
        self
    }

    /// Set lease, wait window and retry interval for get-or-add locks
    pub fn with_lock_timing(mut self, lease: Duration, wait: Duration, retry: Duration) -> Self {
        self.lock_lease_ms = duration_ms(lease);
        self.lock_wait_ms = duration_ms(wait);
        self.lock_retry_interval_ms = duration_ms(retry);
        self
    }

    /// Set the health-check interval
    pub fn with_health_check_interval(mut self, interval: Duration) -> Self {
        self.health_check_interval_ms = duration_ms(interval);
        self
    }

    /// Set the reconnect backoff bounds
    pub fn with_retry_delays(mut self, base: Duration, max: Duration) -> Self {
        self.retry_base_delay_ms = duration_ms(base);
        self.retry_max_delay_ms = duration_ms(max);
        self
    }

    /// Set the per-attempt connect timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = duration_ms(timeout);
        self
    }

    /// Set the per-command timeout
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout_ms = duration_ms(timeout);
        self
    }

    /// Validate configuration values
    pub fn validate(&self) -> ConfigResult<()> {
        let positive = [
            ("default_ttl_ms", self.default_ttl_ms),
            ("lock_lease_ms", self.lock_lease_ms),
            ("lock_wait_ms", self.lock_wait_ms),
            ("lock_retry_interval_ms", self.lock_retry_interval_ms),
            ("health_check_interval_ms", self.health_check_interval_ms),
            ("retry_base_delay_ms", self.retry_base_delay_ms),
            ("retry_max_delay_ms", self.retry_max_delay_ms),
            ("connect_timeout_ms", self.connect_timeout_ms),
            ("command_timeout_ms", self.command_timeout_ms),
        ];

        for (field, value) in positive {
            if value == 0 {
                return Err(ConfigurationError::invalid_value(
                    field,
                    value,
                    "must be greater than 0",
                ));
            }
        }

        if self.retry_max_delay_ms < self.retry_base_delay_ms {
            return Err(ConfigurationError::invalid_value(
                "retry_max_delay_ms",
                self.retry_max_delay_ms,
                format!(
                    "must be at least retry_base_delay_ms ({})",
                    self.retry_base_delay_ms
                ),
            ));
        }

        if self.lock_suffix.is_empty() {
            return Err(ConfigurationError::invalid_value(
                "lock_suffix",
                "",
                "lock keys must be distinguishable from data keys",
            ));
        }

        if self.url.trim().is_empty() {
            return Err(ConfigurationError::invalid_value(
                "url",
                "",
                "a store connection string is required",
            ));
        }

        Ok(())
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
