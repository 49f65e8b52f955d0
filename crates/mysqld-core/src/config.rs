//! Centralized configuration for the embedded server.
//!
//! Constants live on [`MysqldConfig`]; the values a caller may override
//! through the environment are collected into [`MysqldSettings`].

use crate::error::{MysqldError, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable names, defaults and fixed timings.
pub struct MysqldConfig;

impl MysqldConfig {
    pub const ENV_ROOT: &'static str = "MYSQLD_ROOT";
    pub const ENV_PORT: &'static str = "MYSQLD_PORT";
    pub const ENV_INIT: &'static str = "MYSQLD_INIT";
    pub const ENV_BIN: &'static str = "MYSQLD_BIN";
    pub const ENV_READY_TIMEOUT: &'static str = "MYSQLD_READY_TIMEOUT";

    /// Working directory, relative to the current directory.
    pub const DEFAULT_ROOT: &'static str = "mysqld";
    /// Same as the stock MySQL port.
    pub const DEFAULT_PORT: u16 = 3306;
    pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(120);

    pub const READY_POLL_INTERVAL: Duration = Duration::from_millis(10);
    pub const PORT_PROBE_TIMEOUT: Duration = Duration::from_millis(250);
    pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

    /// Printed by mysqld once it accepts client connections.
    pub const READY_MARKER: &'static str = "ready for connections";
    pub const ADMIN_USER: &'static str = "root";

    pub const BINARY_NAME: &'static str = "mysqld";
    pub const FALLBACK_BINARY_PATHS: &'static [&'static str] = &[
        "/usr/sbin/mysqld",
        "/usr/local/mysql/bin/mysqld",
        "/usr/local/bin/mysqld",
        "/opt/homebrew/bin/mysqld",
    ];

    pub const DATA_DIR_NAME: &'static str = "data";
    pub const TMP_DIR_NAME: &'static str = "tmp";
    pub const SOCKET_FILE_NAME: &'static str = "mysql.sock";
    pub const PID_FILE_NAME: &'static str = "mysqld.pid";
    /// Present in the data directory once `--initialize-insecure` has run.
    pub const SYSTEM_SCHEMA_DIR: &'static str = "mysql";
}

/// Resolved configuration used by a pool to start instances.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MysqldSettings {
    /// Working directory; relative paths are rooted at the current directory.
    pub root: PathBuf,
    /// Port used by `start()` when no shared instance exists.
    pub port: u16,
    /// SQL script executed once after readiness.
    pub init_script: Option<PathBuf>,
    /// Explicit server binary. Looked up on `PATH` when unset.
    pub binary: Option<PathBuf>,
    /// Ceiling for the readiness wait; `None` waits indefinitely.
    pub ready_timeout: Option<Duration>,
}

impl Default for MysqldSettings {
    fn default() -> Self {
        Self {
            root: PathBuf::from(MysqldConfig::DEFAULT_ROOT),
            port: MysqldConfig::DEFAULT_PORT,
            init_script: None,
            binary: None,
            ready_timeout: Some(MysqldConfig::DEFAULT_READY_TIMEOUT),
        }
    }
}

impl MysqldSettings {
    /// Read overrides from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read overrides through an arbitrary lookup function.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Self::default();
        let value = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(root) = value(MysqldConfig::ENV_ROOT) {
            settings.root = PathBuf::from(root);
        }

        if let Some(port) = value(MysqldConfig::ENV_PORT) {
            settings.port = parse_port(&port)?;
        }

        settings.init_script = value(MysqldConfig::ENV_INIT).map(PathBuf::from);
        settings.binary = value(MysqldConfig::ENV_BIN).map(PathBuf::from);

        if let Some(timeout) = value(MysqldConfig::ENV_READY_TIMEOUT) {
            let secs: u64 = timeout.trim().parse().map_err(|_| MysqldError::Config {
                message: format!(
                    "{} must be a number of seconds, got {:?}",
                    MysqldConfig::ENV_READY_TIMEOUT,
                    timeout
                ),
            })?;
            settings.ready_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }

        Ok(settings)
    }

    /// Set the working directory.
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    /// Set the default port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the initialization script.
    pub fn with_init_script(mut self, path: impl Into<PathBuf>) -> Self {
        self.init_script = Some(path.into());
        self
    }

    /// Set the server binary.
    pub fn with_binary(mut self, path: impl Into<PathBuf>) -> Self {
        self.binary = Some(path.into());
        self
    }

    /// Set the readiness ceiling. `None` waits indefinitely.
    pub fn with_ready_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.ready_timeout = timeout;
        self
    }
}

fn parse_port(value: &str) -> Result<u16> {
    value.trim().parse().map_err(|_| MysqldError::Config {
        message: format!(
            "{} must be a port number, got {:?}",
            MysqldConfig::ENV_PORT,
            value
        ),
    })
}
