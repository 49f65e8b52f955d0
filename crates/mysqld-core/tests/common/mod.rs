//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::fs;
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// How the fake server behaves after it starts.
#[derive(Debug, Clone, Copy)]
pub enum FakeMode {
    /// Announce readiness on stderr, then keep running.
    Ready,
    /// Keep running without ever announcing readiness.
    NeverReady,
    /// Exit immediately with a failure status.
    Crash,
    /// Take a second to initialize, then never announce readiness.
    SlowInit,
}

/// Install `tracing` output for the test harness.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// A port nothing listens on right now.
pub fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind ephemeral port");
    listener.local_addr().unwrap().port()
}

/// Write a shell script standing in for `mysqld` into `dir`.
///
/// `--initialize-insecure` appends one line to `inits.log` in the working
/// directory, creates the system schema directory and exits. A server start
/// appends one line to `starts.log`.
#[cfg(unix)]
pub fn fake_mysqld(dir: &Path, mode: FakeMode) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let tail = match mode {
        FakeMode::Ready => {
            "echo \"[Note] mysqld: ready for connections. Version: 'fake'\" >&2\nexec sleep 300"
        }
        FakeMode::NeverReady | FakeMode::SlowInit => "exec sleep 300",
        FakeMode::Crash => "echo \"[ERROR] Aborting\" >&2\nexit 3",
    };

    let init_delay = match mode {
        FakeMode::SlowInit => "sleep 1",
        _ => ":",
    };

    let script = format!(
        r#"#!/bin/sh
if [ "$1" = "--version" ]; then
  echo "mysqld fake"
  exit 0
fi
datadir=""
init=""
for arg in "$@"; do
  case "$arg" in
    --datadir=*) datadir="${{arg#--datadir=}}" ;;
    --initialize-insecure) init=1 ;;
  esac
done
if [ -n "$init" ]; then
  echo "init $$" >> inits.log
  {init_delay}
  mkdir -p "$datadir/mysql"
  echo "initializing $datadir" >&2
  exit 0
fi
echo "start $$" >> starts.log
echo "fake mysqld starting on $*"
{tail}
"#
    );

    let path = dir.join("mysqld");
    fs::write(&path, script).expect("Failed to write fake mysqld");
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();

    // A fork on another test thread can briefly hold the write handle open,
    // making exec fail with ETXTBSY. Wait until the script is executable.
    let runnable = wait_until(Duration::from_secs(5), || {
        std::process::Command::new(&path)
            .arg("--version")
            .output()
            .map(|out| out.status.success())
            .unwrap_or(false)
    });
    assert!(runnable, "fake mysqld at {} never became executable", path.display());
    path
}

/// Number of server starts recorded under `root`.
pub fn start_count(root: &Path) -> usize {
    fs::read_to_string(root.join("starts.log"))
        .map(|log| log.lines().count())
        .unwrap_or(0)
}

/// Number of `--initialize-insecure` runs recorded under `root`.
pub fn init_count(root: &Path) -> usize {
    fs::read_to_string(root.join("inits.log"))
        .map(|log| log.lines().count())
        .unwrap_or(0)
}

/// Poll `condition` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    condition()
}

/// Temp directory holding a binary dir and a server root.
pub struct TestEnv {
    pub temp_dir: TempDir,
    pub root: PathBuf,
}

impl TestEnv {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let root = temp_dir.path().join("mysqld");
        fs::create_dir_all(temp_dir.path().join("bin")).unwrap();
        Self { temp_dir, root }
    }

    pub fn bin_dir(&self) -> PathBuf {
        self.temp_dir.path().join("bin")
    }
}
