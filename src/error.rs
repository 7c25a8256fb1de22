//! Error types for the resilient cache.
//!
//! Failures fall into four categories and each has its own type:
//!
//! - [`CacheError`] - transient infrastructure failures raised by a store
//!   backend. They are caught at the adapter boundary and never reach callers.
//! - [`LockError`] - the lock backend could not be used at all. Failing to win
//!   the lock inside the wait window is not an error.
//! - [`GetOrAddError::Factory`] - the caller's own factory error, passed
//!   through untouched.
//! - [`Cancelled`] - the caller's cancellation token fired.

use std::future::Future;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Errors that can occur while talking to a store backend
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// Failed to connect to the store backend
    #[error("Cache connection error: {0}")]
    ConnectionError(String),

    /// Failed to serialize or deserialize a cache entry
    #[error("Cache serialization error: {0}")]
    SerializationError(String),

    /// Store operation timed out
    #[error("Cache operation timed out: {0}")]
    Timeout(String),

    /// Generic backend error
    #[error("Cache backend error: {0}")]
    BackendError(String),
}

impl CacheError {
    /// Whether the error means the connection itself is unusable.
    ///
    /// The adapter drops the connection on these. A server-side rejection or
    /// a bad payload only fails the one command.
    pub fn is_transport(&self) -> bool {
        matches!(self, CacheError::ConnectionError(_) | CacheError::Timeout(_))
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(error: serde_json::Error) -> Self {
        CacheError::SerializationError(error.to_string())
    }
}

/// Result type for store backend operations
pub type StoreResult<T> = Result<T, CacheError>;

/// The caller's cancellation token fired before the operation finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Cache operation cancelled")]
pub struct Cancelled;

/// Drive `future` unless `cancel` fires first
pub async fn cancellable<F>(cancel: &CancellationToken, future: F) -> Result<F::Output, Cancelled>
where
    F: Future,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Cancelled),
        output = future => Ok(output),
    }
}

/// Errors surfaced by the distributed lock coordinator
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LockError {
    /// The lock backend is unreachable or rejected the command
    #[error("Lock backend unavailable: {0}")]
    Unavailable(CacheError),

    /// Cancelled while waiting for the lease
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

/// Errors returned by get-or-add.
///
/// Infrastructure failures never show up here: only the factory's own error
/// and cancellation do.
#[derive(Debug, Error)]
pub enum GetOrAddError<E> {
    /// The factory failed; the original error is carried verbatim
    #[error("Cache value factory failed: {0}")]
    Factory(E),

    /// Cancelled while reading, waiting for the lock, or computing
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

impl<E> GetOrAddError<E> {
    /// Returns the factory error if that is what this is
    pub fn into_factory_error(self) -> Option<E> {
        match self {
            GetOrAddError::Factory(e) => Some(e),
            GetOrAddError::Cancelled(_) => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, GetOrAddError::Cancelled(_))
    }
}
