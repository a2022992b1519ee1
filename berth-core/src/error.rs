//! Error types for BERTH.
//!
//! All errors use `thiserror` for ergonomic error handling and proper error chains.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for BERTH operations.
pub type Result<T> = std::result::Result<T, BerthError>;

/// Main error type for BERTH.
#[derive(Error, Debug)]
pub enum BerthError {
    // Store errors
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("{entity} already exists: {key}")]
    Conflict { entity: &'static str, key: String },

    #[error("Operation not allowed: {reason}")]
    NotAllowed { reason: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // Git errors
    #[error("Repository not found at {path:?}")]
    RepositoryNotFound { path: PathBuf },

    #[error("Repository already exists at {path:?}")]
    RepositoryExists { path: PathBuf },

    #[error("Git authentication failed: {reason}")]
    AuthenticationFailed { reason: String },

    #[error("Failed to clone repository {url}: {reason}")]
    CloneFailed { url: String, reason: String },

    #[error("Failed to pull repository at {path:?}: {reason}")]
    PullFailed { path: PathBuf, reason: String },

    #[error("Repository validation failed: {reason}")]
    ValidationFailed { reason: String },

    #[error("Invalid repository at {path:?}: {reason}")]
    InvalidRepository { path: PathBuf, reason: String },

    #[error("Branch not found: {branch}")]
    BranchNotFound { branch: String },

    #[error("File not found in repository: {path}")]
    FileNotFound { path: String },

    #[error("Insufficient disk space: {available} bytes available, {required} bytes required")]
    DiskSpace { available: u64, required: u64 },

    #[error("Operation timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("Operation cancelled")]
    Cancelled,

    // Configuration errors
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    // File system errors
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BerthError {
    /// Create a NotFound error for an entity type and id.
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound { entity, id: id.to_string() }
    }

    /// Create a Storage error from any underlying storage fault.
    pub fn storage(err: impl std::fmt::Display) -> Self {
        Self::Storage(err.to_string())
    }

    /// Create a Serialization error from any encode/decode fault.
    pub fn serialization(err: impl std::fmt::Display) -> Self {
        Self::Serialization(err.to_string())
    }
}
