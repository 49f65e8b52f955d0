//! Server binary lookup and working directory preparation.

use crate::config::MysqldConfig;
use crate::error::{MysqldError, Result};
use crate::redirect::OutputRedirector;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, info};

/// Files and directories a server instance uses under its root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerLayout {
    pub root: PathBuf,
    pub data_dir: PathBuf,
    pub tmp_dir: PathBuf,
    pub socket: PathBuf,
    pub pid_file: PathBuf,
}

impl ServerLayout {
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        Self {
            data_dir: root.join(MysqldConfig::DATA_DIR_NAME),
            tmp_dir: root.join(MysqldConfig::TMP_DIR_NAME),
            socket: root
                .join(MysqldConfig::TMP_DIR_NAME)
                .join(MysqldConfig::SOCKET_FILE_NAME),
            pid_file: root.join(MysqldConfig::PID_FILE_NAME),
            root,
        }
    }

    /// Whether the data directory already holds the system schema.
    pub fn is_initialized(&self) -> bool {
        self.data_dir.join(MysqldConfig::SYSTEM_SCHEMA_DIR).is_dir()
    }
}

/// Find the server binary.
///
/// Order: the explicit path, `mysqld` on `PATH`, then well-known install
/// locations.
pub fn locate_binary(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return if path.is_file() {
            Ok(path.to_path_buf())
        } else {
            Err(MysqldError::BinaryNotFound {
                message: format!("{} does not exist", path.display()),
            })
        };
    }

    if let Ok(path) = which::which(MysqldConfig::BINARY_NAME) {
        return Ok(path);
    }

    MysqldConfig::FALLBACK_BINARY_PATHS
        .iter()
        .map(PathBuf::from)
        .find(|path| path.is_file())
        .ok_or_else(|| MysqldError::BinaryNotFound {
            message: format!(
                "no {} on PATH; set {}",
                MysqldConfig::BINARY_NAME,
                MysqldConfig::ENV_BIN
            ),
        })
}

/// Arguments every invocation needs before anything else.
pub(crate) fn base_args() -> Vec<String> {
    let mut args = vec!["--no-defaults".to_string()];
    // mysqld refuses to run as root without naming the user explicitly
    #[cfg(unix)]
    {
        if nix::unistd::geteuid().is_root() {
            args.push("--user=root".to_string());
        }
    }
    args
}

/// Prepare `layout` so the server can start from it.
///
/// Creates the data and temp directories, then initializes the data
/// directory with `--initialize-insecure` unless that has already been done.
/// The generated `root` account has an empty password.
pub fn deploy_files(binary: &Path, layout: &ServerLayout) -> Result<()> {
    for dir in [&layout.data_dir, &layout.tmp_dir] {
        fs::create_dir_all(dir).map_err(|e| MysqldError::io_with_path(e, dir))?;
    }

    if layout.is_initialized() {
        debug!("Data directory {} already initialized", layout.data_dir.display());
        return Ok(());
    }

    info!("Initializing data directory {}", layout.data_dir.display());

    let output = Command::new(binary)
        .args(base_args())
        .arg("--initialize-insecure")
        .arg(format!("--datadir={}", layout.data_dir.display()))
        .arg(format!("--tmpdir={}", layout.tmp_dir.display()))
        .current_dir(&layout.root)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| MysqldError::io_with_path(e, binary))?;

    let mut stdout = OutputRedirector::stdout("mysqld-init");
    let mut stderr = OutputRedirector::stderr("mysqld-init");
    stdout.write_all(&output.stdout)?;
    stdout.flush()?;
    stderr.write_all(&output.stderr)?;
    stderr.flush()?;

    if !output.status.success() {
        let detail = String::from_utf8_lossy(&output.stderr);
        let last_line = detail.lines().rev().find(|l| !l.trim().is_empty());
        return Err(MysqldError::Io {
            message: format!(
                "data directory initialization failed ({}): {}",
                output.status,
                last_line.unwrap_or("no output")
            ),
            path: Some(layout.data_dir.clone()),
            source: None,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_layout() {
        let layout = ServerLayout::new("/srv/mysqld");

        assert_eq!(layout.data_dir, PathBuf::from("/srv/mysqld/data"));
        assert_eq!(layout.tmp_dir, PathBuf::from("/srv/mysqld/tmp"));
        assert_eq!(layout.socket, PathBuf::from("/srv/mysqld/tmp/mysql.sock"));
        assert_eq!(layout.pid_file, PathBuf::from("/srv/mysqld/mysqld.pid"));
    }

    #[test]
    fn test_initialized_detection() {
        let temp_dir = TempDir::new().unwrap();
        let layout = ServerLayout::new(temp_dir.path());
        assert!(!layout.is_initialized());

        fs::create_dir_all(layout.data_dir.join("mysql")).unwrap();
        assert!(layout.is_initialized());
    }

    #[test]
    fn test_explicit_binary_missing() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("mysqld");

        let result = locate_binary(Some(&missing));
        assert!(matches!(result, Err(MysqldError::BinaryNotFound { .. })));
    }

    #[test]
    fn test_explicit_binary_found() {
        let temp_dir = TempDir::new().unwrap();
        let binary = temp_dir.path().join("mysqld");
        fs::write(&binary, "").unwrap();

        assert_eq!(locate_binary(Some(&binary)).unwrap(), binary);
    }

    #[test]
    fn test_deploy_skips_initialized_dir() {
        let temp_dir = TempDir::new().unwrap();
        let layout = ServerLayout::new(temp_dir.path());
        fs::create_dir_all(layout.data_dir.join("mysql")).unwrap();

        // The binary is never invoked for an initialized directory.
        deploy_files(Path::new("/nonexistent/mysqld"), &layout).unwrap();
        assert!(layout.tmp_dir.is_dir());
    }
}
