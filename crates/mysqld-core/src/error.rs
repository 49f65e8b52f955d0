//! Error types for the embedded MySQL lifecycle.
//!
//! Setup failures (directory, port, binary, spawn, readiness) surface as
//! [`MysqldError`]. Initialization script failures never do; they are logged
//! by [`crate::Mysqld::initialize`] and swallowed.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Main error type for the embedded server.
#[derive(Debug, Error)]
pub enum MysqldError {
    /// The working directory neither exists nor could be created.
    #[error("no permission to create folder {}", .0.display())]
    PermissionDenied(PathBuf),

    /// A TCP connection to the target port succeeded before startup.
    #[error("port {0} has been used")]
    PortInUse(u16),

    #[error("mysqld binary not found: {message}")]
    BinaryNotFound { message: String },

    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("mysqld launch failed on port {port}: {message}")]
    LaunchFailed { port: u16, message: String },

    #[error("mysqld on port {port} exited before it was ready ({status})")]
    ProcessExited { port: u16, status: String },

    #[error("mysqld was not ready for connections within {0:?}")]
    ReadyTimeout(Duration),

    #[error("Database error: {message}")]
    Database {
        message: String,
        #[source]
        source: Option<mysql::Error>,
    },

    #[error("Configuration error: {message}")]
    Config { message: String },
}

/// Result type alias for embedded server operations.
pub type Result<T> = std::result::Result<T, MysqldError>;

impl From<std::io::Error> for MysqldError {
    fn from(err: std::io::Error) -> Self {
        MysqldError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<mysql::Error> for MysqldError {
    fn from(err: mysql::Error) -> Self {
        MysqldError::Database {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl MysqldError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        MysqldError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }
}
