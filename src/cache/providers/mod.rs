//! Store backends.
//!
//! - [`MemoryConnector`] - in-process store owned by the caller
//! - `RedisConnector` - remote Redis (or protocol-compatible) server, behind
//!   the `cache-redis` feature

pub mod memory;
#[cfg(feature = "cache-redis")]
pub mod redis;

pub use self::memory::{MemoryConnection, MemoryConnector, MemoryStore};
#[cfg(feature = "cache-redis")]
pub use self::redis::{RedisConnection, RedisConnector};
