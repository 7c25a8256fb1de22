#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Resilient Cache
//!
//! Cache-aside client for a remote key/value store that keeps serving while
//! the store is down and stops concurrent callers from recomputing the same
//! missing key.
//!
//! ## Key Features
//!
//! - **Supervised connection**: one background loop reconnects with
//!   exponential backoff and jitter; connect attempts never overlap
//! - **Degraded mode**: an unreachable store turns reads into misses, writes
//!   into no-ops and get-or-add into a direct computation
//! - **Lock-guarded get-or-add**: a per-key lease in the store lets exactly one
//!   caller run the factory while the others wait for its result
//! - **Typed results**: [`CacheResult`] distinguishes a miss from a cached
//!   default value
//!
//! ## Module Organization
//!
//! - [`cache`] - facade, orchestrator, adapter, locks and store backends
//! - [`supervisor`] - connection lifecycle and reconnect backoff
//! - [`config`] - configuration loading and validation
//! - [`error`] - error types
//! - [`logging`] - structured logging setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use resilient_cache::{CacheConfig, RedisConnector, ResilientCache};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! resilient_cache::logging::init_structured_logging();
//!
//! let config = CacheConfig::load(None)?;
//! let cache = ResilientCache::new(RedisConnector::from_config(&config)?, config)?;
//! let cancel = CancellationToken::new();
//!
//! let report: Vec<u64> = cache
//!     .get_or_add(
//!         "report:daily",
//!         |_cancel| async { Ok::<_, std::io::Error>(vec![1, 2, 3]) },
//!         &cancel,
//!     )
//!     .await?;
//!
//! let cached = cache.get::<Vec<u64>>("report:daily", &cancel).await?;
//! assert_eq!(cached.into_value(), Some(report));
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod supervisor;

pub use cache::{
    CacheEntry, CacheMetricsSnapshot, CacheResult, Connector, EntryOptions, KeySpace, LockHandle,
    MemoryConnector, MemoryStore, ResilientCache, StoreConnection,
};
#[cfg(feature = "cache-redis")]
pub use cache::RedisConnector;
pub use config::{CacheConfig, ConfigurationError};
pub use error::{CacheError, Cancelled, GetOrAddError, LockError, StoreResult};
pub use supervisor::{ConnectionState, RetryState};
