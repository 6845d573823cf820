//! Error types for Groundwork Core
//!
//! Every bootstrap failure is terminal: the variants below map one-to-one onto
//! the failure taxonomy reported to the supervisor, and each one names the path
//! or resource that could not be established.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::ErrorCode;
use thiserror::Error;

/// Result type alias for Groundwork operations
pub type Result<T> = std::result::Result<T, BootstrapError>;

/// Main error type for bootstrap operations
#[derive(Error, Debug)]
pub enum BootstrapError {
    /// A required path is occupied by an entry of the wrong type
    #[error("path conflict: {} exists with the wrong file type", .path.display())]
    PathConflict { path: PathBuf },

    /// The process lacks the rights to create or write a required path
    #[error("permission denied: {}: {reason}", .path.display())]
    PermissionDenied { path: PathBuf, reason: String },

    /// The underlying medium cannot accept writes
    #[error("storage unavailable: {}: {reason}", .path.display())]
    StorageUnavailable { path: PathBuf, reason: String },

    /// The store file exists but fails to open or validate
    #[error("store corrupt: {}: {reason}", .path.display())]
    StoreCorrupt { path: PathBuf, reason: String },

    /// Initialization did not finish inside the startup window
    #[error("startup timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// The migration set handed to the bootstrap is malformed
    #[error("invalid migration {version}: {reason}")]
    Migration { version: i64, reason: String },

    /// Configuration could not be loaded or is invalid
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The bootstrap worker died without reporting (panic, thread spawn failure)
    #[error("bootstrap aborted: {0}")]
    Internal(String),
}

/// Plain failure category, without the path/resource payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    PathConflict,
    PermissionDenied,
    StorageUnavailable,
    StoreCorrupt,
    Timeout,
    Config,
    Internal,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::PathConflict => "PathConflict",
            FailureKind::PermissionDenied => "PermissionDenied",
            FailureKind::StorageUnavailable => "StorageUnavailable",
            FailureKind::StoreCorrupt => "StoreCorrupt",
            FailureKind::Timeout => "Timeout",
            FailureKind::Config => "Config",
            FailureKind::Internal => "Internal",
        };
        f.write_str(name)
    }
}

impl BootstrapError {
    /// Failure category of this error
    pub fn kind(&self) -> FailureKind {
        match self {
            BootstrapError::PathConflict { .. } => FailureKind::PathConflict,
            BootstrapError::PermissionDenied { .. } => FailureKind::PermissionDenied,
            BootstrapError::StorageUnavailable { .. } => FailureKind::StorageUnavailable,
            BootstrapError::StoreCorrupt { .. } => FailureKind::StoreCorrupt,
            BootstrapError::Timeout(_) => FailureKind::Timeout,
            BootstrapError::Migration { .. } | BootstrapError::Config(_) => FailureKind::Config,
            BootstrapError::Internal(_) => FailureKind::Internal,
        }
    }

    /// Classify a filesystem error raised while working on `path`
    pub fn from_io(path: impl AsRef<Path>, err: io::Error) -> Self {
        let path = path.as_ref().to_path_buf();
        match err.kind() {
            io::ErrorKind::PermissionDenied => BootstrapError::PermissionDenied {
                path,
                reason: err.to_string(),
            },
            io::ErrorKind::NotADirectory | io::ErrorKind::AlreadyExists => {
                BootstrapError::PathConflict { path }
            }
            _ => BootstrapError::StorageUnavailable {
                path,
                reason: err.to_string(),
            },
        }
    }

    /// Classify a SQLite error raised while opening or validating the store at `path`
    pub fn from_sqlite(path: impl AsRef<Path>, err: rusqlite::Error) -> Self {
        let path = path.as_ref().to_path_buf();
        let reason = err.to_string();
        match err.sqlite_error_code() {
            Some(ErrorCode::NotADatabase) | Some(ErrorCode::DatabaseCorrupt) => {
                BootstrapError::StoreCorrupt { path, reason }
            }
            Some(ErrorCode::PermissionDenied) => BootstrapError::PermissionDenied { path, reason },
            // Read-only media, full disks, missing mounts and lock contention past
            // busy_timeout all mean the medium cannot take the bootstrap writes.
            _ => BootstrapError::StorageUnavailable { path, reason },
        }
    }
}

impl From<toml::de::Error> for BootstrapError {
    fn from(e: toml::de::Error) -> Self {
        BootstrapError::Config(e.to_string())
    }
}
