//! # Repository Error Types
//!
//! Every fallible operation in the crate reports an `OcflError`. Nothing is
//! retried internally; callers retry at operation granularity after resolving
//! the root cause (for example, re-fetching the inventory and reapplying an
//! update after `ObjectOutOfSync`).

use std::io;

use thiserror::Error;

use crate::validate::ValidationResults;

/// Result type for repository operations
pub type Result<T> = std::result::Result<T, OcflError>;

/// Repository errors
#[derive(Debug, Error)]
pub enum OcflError {
    /// Object, version, or logical path missing
    #[error("Not found: {0}")]
    NotFound(String),

    /// Import target collides with an existing object
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Optimistic head mismatch during update
    #[error("Object out of sync: {0}")]
    ObjectOutOfSync(String),

    /// Logical path collides without OVERWRITE
    #[error("Path already exists: {0}")]
    PathAlreadyExists(String),

    /// Computed digest disagrees with the expected digest
    #[error("Fixity check failed: {0}")]
    Fixity(String),

    /// External validation reported errors; carries the full result set
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        results: ValidationResults,
    },

    /// Object state precondition failed (mutable HEAD, staged file mismatch,
    /// closed repository)
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Blank arguments, non-regular files where files were expected, bad
    /// output paths
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Wrapped filesystem or backend failure
    #[error("I/O error: {message}")]
    Io {
        message: String,
        #[source]
        source: io::Error,
    },

    /// A file lock could not be acquired within the configured duration
    #[error("Lock timeout: {0}")]
    LockTimeout(String),
}

impl OcflError {
    /// Wrap an I/O error with a message describing what was being attempted
    pub fn io(message: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source,
        }
    }

    /// Wrap an I/O error that occurred while operating on a path
    pub fn io_at(path: &std::path::Path, source: io::Error) -> Self {
        Self::Io {
            message: format!("Failed to access {}", path.display()),
            source,
        }
    }

    /// Build a `Validation` error from a result set
    pub fn validation(message: impl Into<String>, results: ValidationResults) -> Self {
        Self::Validation {
            message: message.into(),
            results,
        }
    }
}

/// Fail with `InvalidInput` when a required string argument is blank
pub fn not_blank(value: &str, what: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(OcflError::InvalidInput(format!("{} cannot be blank", what)));
    }
    Ok(())
}
