//! # Cache Module
//!
//! ## Architecture
//!
//! ```text
//! ResilientCache (facade)
//!   ├── GetOrAddOrchestrator     <- read, lock, double-check, compute, write, release
//!   │     ├── StoreAdapter       <- envelope encode/decode, expiry, never retries
//!   │     └── LockCoordinator    <- SET NX PX leases, compare-and-delete release
//!   └── ConnectionSupervisor     <- health loop, backoff, single connect gate
//!         └── Connector          <- MemoryConnector | RedisConnector
//! ```
//!
//! ## Design Decisions
//!
//! - **Graceful degradation**: store failures turn into misses and no-ops, never errors
//! - **Best-effort writes**: write failures are logged and trigger a background reconnect
//! - **Lazy expiry**: entries carry their own absolute expiration, checked on read

pub mod adapter;
pub mod entry;
pub mod facade;
pub mod keys;
pub mod lock;
pub mod metrics;
pub mod orchestrator;
pub mod providers;
pub mod result;
pub mod traits;

pub use adapter::{Presence, StoreAdapter, StoreRead, StoreWrite};
pub use entry::{CacheEntry, EntryOptions};
pub use facade::ResilientCache;
pub use keys::KeySpace;
pub use lock::{LockCoordinator, LockHandle};
pub use metrics::{CacheMetrics, CacheMetricsSnapshot};
pub use orchestrator::{GetOrAddOrchestrator, LockSettings};
pub use providers::{MemoryConnection, MemoryConnector, MemoryStore};
#[cfg(feature = "cache-redis")]
pub use providers::{RedisConnection, RedisConnector};
pub use result::CacheResult;
pub use traits::{Connector, StoreConnection};
