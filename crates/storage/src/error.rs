//! Storage error types and result alias.
//!
//! Every collaborator backend (app registry, scope resolver) maps its internal
//! failures onto [`StorageError`] so the authentication layer can reason about
//! them uniformly.
//!
//! # Example
//!
//! ```
//! use academy_common_storage::{StorageError, StorageResult};
//!
//! fn lookup(slug: &str) -> StorageResult<Vec<u8>> {
//!     Err(StorageError::not_found(slug))
//! }
//! ```

use thiserror::Error;

/// Result type alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur while reading app registry or scope data.
///
/// # Non-exhaustive
///
/// This enum is marked `#[non_exhaustive]`: new variants may be added in
/// future minor releases without a semver-breaking change. Downstream match
/// expressions must include a wildcard arm (`_ =>`).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    /// The requested record does not exist.
    #[error("Record not found: {key}")]
    NotFound {
        /// The key that was not found.
        key: String,
    },

    /// Connection or network error talking to the backing store.
    #[error("Connection error: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Backend-specific failure that fits no other category.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },

    /// Operation exceeded its time limit.
    #[error("Operation timeout")]
    Timeout,
}

impl StorageError {
    /// Creates a new `NotFound` error for the given key.
    #[must_use]
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    /// Creates a new `Connection` error with the given message.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection { message: message.into() }
    }

    /// Creates a new `Internal` error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Returns `true` for failures where the record may exist but could not
    /// be reached (connection loss, timeout).
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Timeout)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(StorageError::not_found("academy").to_string(), "Record not found: academy");
        assert_eq!(StorageError::Timeout.to_string(), "Operation timeout");
        assert_eq!(StorageError::connection("refused").to_string(), "Connection error: refused");
        assert_eq!(
            StorageError::internal("App already registered: crm").to_string(),
            "Internal error: App already registered: crm"
        );
    }

    #[test]
    fn test_is_transient() {
        assert!(StorageError::Timeout.is_transient());
        assert!(StorageError::connection("x").is_transient());
        assert!(!StorageError::not_found("x").is_transient());
        assert!(!StorageError::internal("x").is_transient());
    }
}
