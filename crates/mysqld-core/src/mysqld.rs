//! A single embedded MySQL server instance.
//!
//! An instance is bound to one port and one working directory. It is built
//! by [`crate::MysqldPool`], which registers it and calls [`Mysqld::run`];
//! callers receive an `Arc<Mysqld>` and release it with [`Mysqld::close`].

use crate::cancel::InterruptToken;
use crate::config::{MysqldConfig, MysqldSettings};
use crate::deploy::{self, ServerLayout};
use crate::error::{MysqldError, Result};
use crate::platform;
use crate::redirect::{self, OutputRedirector};
use crate::registry::Registry;
use mysql::prelude::Queryable;
use std::collections::BTreeMap;
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::JoinHandle;
use std::time::Instant;
use tracing::{debug, info, warn};

pub(crate) type SharedRegistry = Mutex<Registry<Mysqld>>;

/// One embedded server process bound to a directory and a port.
pub struct Mysqld {
    port: u16,
    layout: ServerLayout,
    binary: PathBuf,
    options: BTreeMap<String, String>,
    init_script: Option<PathBuf>,
    ready_timeout: Option<std::time::Duration>,
    process: Mutex<Option<Child>>,
    pumps: Mutex<Vec<JoinHandle<()>>>,
    ready: Arc<AtomicBool>,
    interrupt: InterruptToken,
    registry: Weak<SharedRegistry>,
}

impl std::fmt::Debug for Mysqld {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mysqld")
            .field("port", &self.port)
            .field("root", &self.layout.root)
            .field("binary", &self.binary)
            .field("ready", &self.is_ready())
            .finish()
    }
}

/// Resolve `root` against the current directory when it is relative.
pub fn resolve_root(root: &Path) -> Result<PathBuf> {
    if root.is_absolute() {
        Ok(root.to_path_buf())
    } else {
        let cwd = std::env::current_dir()?;
        Ok(cwd.join(root))
    }
}

/// Create `path` and its parents, failing with `PermissionDenied(root)` when
/// that is impossible and the path is not already a directory.
fn ensure_dir(path: &Path, root: &Path) -> Result<()> {
    match fs::create_dir_all(path) {
        Ok(()) => Ok(()),
        Err(_) if path.is_dir() => Ok(()),
        Err(e) => {
            debug!("create_dir_all({}) failed: {}", path.display(), e);
            Err(MysqldError::PermissionDenied(root.to_path_buf()))
        }
    }
}

/// Read a script as UTF-8 lines joined with the platform line separator.
pub fn read_script(path: &Path) -> Result<String> {
    let file = fs::File::open(path).map_err(|e| MysqldError::io_with_path(e, path))?;
    let mut sql = String::new();
    for line in BufReader::new(file).lines() {
        let line = line.map_err(|e| MysqldError::io_with_path(e, path))?;
        sql.push_str(&line);
        sql.push_str(platform::LINE_SEPARATOR);
    }
    Ok(sql)
}

impl Mysqld {
    /// Build an instance: resolve and create the directory, find the binary
    /// and deploy server files. Nothing is registered or started here.
    pub(crate) fn new(
        root: &Path,
        port: u16,
        settings: &MysqldSettings,
        interrupt: InterruptToken,
        registry: Weak<SharedRegistry>,
    ) -> Result<Self> {
        let path = resolve_root(root)?;
        ensure_dir(&path, root)?;

        let binary = deploy::locate_binary(settings.binary.as_deref())?;

        // Initializing the data directory spawns the binary, so a taken
        // port has to be caught first.
        if platform::port_in_use(port, MysqldConfig::PORT_PROBE_TIMEOUT) {
            return Err(MysqldError::PortInUse(port));
        }

        let layout = ServerLayout::new(&path);
        deploy::deploy_files(&binary, &layout)?;

        let mut options = BTreeMap::new();
        options.insert("port".to_string(), port.to_string());
        options.insert("bind-address".to_string(), "127.0.0.1".to_string());
        options.insert("datadir".to_string(), layout.data_dir.display().to_string());
        options.insert("tmpdir".to_string(), layout.tmp_dir.display().to_string());
        options.insert("socket".to_string(), layout.socket.display().to_string());
        options.insert("pid-file".to_string(), layout.pid_file.display().to_string());
        // X Protocol listens on its own fixed port, which parallel instances would fight over
        options.insert("loose-mysqlx".to_string(), "OFF".to_string());

        info!("embedded mysql server @ path={} port={}", path.display(), port);

        Ok(Self {
            port,
            layout,
            binary,
            options,
            init_script: settings.init_script.clone(),
            ready_timeout: settings.ready_timeout,
            process: Mutex::new(None),
            pumps: Mutex::new(Vec::new()),
            ready: Arc::new(AtomicBool::new(false)),
            interrupt,
            registry,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Absolute working directory.
    pub fn root(&self) -> &Path {
        &self.layout.root
    }

    pub fn layout(&self) -> &ServerLayout {
        &self.layout
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Startup options passed as `--key=value`.
    pub fn options(&self) -> &BTreeMap<String, String> {
        &self.options
    }

    /// Client URL for the administrative account.
    pub fn connection_url(&self) -> String {
        format!(
            "mysql://{}@localhost:{}/",
            MysqldConfig::ADMIN_USER,
            self.port
        )
    }

    fn lock_process(&self) -> MutexGuard<'_, Option<Child>> {
        self.process.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether the server process has been spawned and has not exited.
    pub fn is_running(&self) -> bool {
        matches!(self.exit_status(), Ok(None))
    }

    /// Exit status once the process has exited; `Ok(None)` while it runs.
    fn exit_status(&self) -> Result<Option<ExitStatus>> {
        let mut process = self.lock_process();
        match process.as_mut() {
            Some(child) => Ok(child.try_wait()?),
            None => Err(MysqldError::LaunchFailed {
                port: self.port,
                message: "process not started".to_string(),
            }),
        }
    }

    /// Whether the server has reported it is ready for connections.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Stop a readiness wait in progress on another thread, or the next one
    /// to begin.
    ///
    /// The process keeps running and `run` returns without an error.
    pub fn interrupt(&self) {
        self.interrupt.interrupt();
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.args(deploy::base_args());
        cmd.args(self.options.iter().map(|(k, v)| format!("--{}={}", k, v)));
        cmd.current_dir(&self.layout.root);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd
    }

    /// Start the server if it is not running and wait until it is ready.
    ///
    /// Fails with [`MysqldError::PortInUse`] before spawning anything when
    /// the port already accepts connections. Runs the init script once ready.
    pub fn run(&self) -> Result<()> {
        {
            let mut process = self.lock_process();
            if let Some(child) = process.as_mut() {
                if child.try_wait()?.is_none() {
                    debug!("mysqld @ {} already running", self.port);
                    return Ok(());
                }
            }

            if platform::port_in_use(self.port, MysqldConfig::PORT_PROBE_TIMEOUT) {
                return Err(MysqldError::PortInUse(self.port));
            }

            self.ready.store(false, Ordering::SeqCst);

            let mut child = self.command().spawn().map_err(|e| MysqldError::LaunchFailed {
                port: self.port,
                message: format!("{}: {}", self.binary.display(), e),
            })?;
            info!("Launched mysqld with PID {} on port {}", child.id(), self.port);

            let pumps = self.spawn_pumps(&mut child);
            *process = Some(child);
            let mut handles = self.pumps.lock().unwrap_or_else(PoisonError::into_inner);
            handles.extend(pumps);
        }

        self.wait_for_ready()?;

        info!("embedded mysql server started");
        self.initialize();
        Ok(())
    }

    fn spawn_pumps(&self, child: &mut Child) -> Vec<JoinHandle<()>> {
        let label = format!("mysqld@{}", self.port);
        let ready = self.ready.clone();
        let observer: redirect::LineObserver = Arc::new(move |line: &str| {
            if line.contains(MysqldConfig::READY_MARKER) {
                ready.store(true, Ordering::SeqCst);
            }
        });

        let mut handles = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            let sink = OutputRedirector::stdout(label.clone()).with_observer(observer.clone());
            match redirect::pump(stdout, sink, format!("{}-stdout", label)) {
                Ok(handle) => handles.push(handle),
                Err(e) => warn!("Failed to start stdout pump for {}: {}", label, e),
            }
        }
        if let Some(stderr) = child.stderr.take() {
            let sink = OutputRedirector::stderr(label.clone()).with_observer(observer);
            match redirect::pump(stderr, sink, format!("{}-stderr", label)) {
                Ok(handle) => handles.push(handle),
                Err(e) => warn!("Failed to start stderr pump for {}: {}", label, e),
            }
        }
        handles
    }

    /// Poll until the process is running and ready.
    ///
    /// An interrupt ends the wait early without an error; the caller carries
    /// on as if the server were ready.
    fn wait_for_ready(&self) -> Result<()> {
        let start = Instant::now();

        loop {
            if self.interrupt.take() {
                warn!("mysql is not ready for connections");
                return Ok(());
            }

            if let Some(status) = self.exit_status()? {
                self.join_pumps();
                return Err(MysqldError::ProcessExited {
                    port: self.port,
                    status: status.to_string(),
                });
            }

            if self.is_ready() {
                return Ok(());
            }

            if let Some(timeout) = self.ready_timeout {
                if start.elapsed() >= timeout {
                    warn!("mysqld @ {} not ready within {:?}, stopping it", self.port, timeout);
                    self.shutdown()?;
                    return Err(MysqldError::ReadyTimeout(timeout));
                }
            }

            std::thread::sleep(MysqldConfig::READY_POLL_INTERVAL);
        }
    }

    /// Run the configured init script, if any.
    ///
    /// Failures are logged and swallowed; the server stays usable.
    pub fn initialize(&self) {
        let Some(script) = &self.init_script else {
            return;
        };

        let sql = match read_script(script) {
            Ok(sql) => sql,
            Err(e) => {
                warn!("read sql file failed: {}", e);
                return;
            }
        };

        match self.execute_batch(&sql) {
            Ok(()) => info!("executed init script {}", script.display()),
            Err(e) => warn!("initialize mysql server failed: {}", e),
        }
    }

    /// Open a connection as the administrative user with an empty password.
    pub fn connect(&self) -> Result<mysql::Conn> {
        let opts = mysql::OptsBuilder::new()
            .ip_or_hostname(Some("localhost"))
            .tcp_port(self.port)
            .user(Some(MysqldConfig::ADMIN_USER))
            .pass(Some(""))
            .prefer_socket(false);
        Ok(mysql::Conn::new(opts)?)
    }

    /// Execute `sql` as one multi-statement batch.
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        let mut conn = self.connect()?;
        conn.query_drop(sql)?;
        Ok(())
    }

    /// Stop the server process if it is running.
    pub fn shutdown(&self) -> Result<()> {
        let child = self.lock_process().take();
        if let Some(mut child) = child {
            let was_running = child.try_wait()?.is_none();
            platform::terminate_child(&mut child, MysqldConfig::SHUTDOWN_GRACE)?;
            if was_running {
                info!("embedded mysql server stopped");
            }
        }
        self.ready.store(false, Ordering::SeqCst);
        self.join_pumps();
        Ok(())
    }

    fn join_pumps(&self) {
        let handles: Vec<_> = self
            .pumps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for handle in handles {
            let _ = handle.join();
        }
    }

    /// Release this instance.
    ///
    /// Shared instances are left running and registered. Otherwise the
    /// process is stopped and the port unregistered. Safe to call repeatedly.
    pub fn close(&self) -> Result<()> {
        info!("disconnect mysql @ {}", self.port);

        let Some(registry) = self.registry.upgrade() else {
            return self.shutdown();
        };

        let mut registry = registry.lock().unwrap_or_else(PoisonError::into_inner);
        if registry.is_shared(self.port) {
            return Ok(());
        }

        self.shutdown()?;
        let registered_here = registry
            .get(self.port)
            .is_some_and(|instance| std::ptr::eq(Arc::as_ptr(&instance), self));
        if registered_here {
            registry.remove(self.port);
        }
        Ok(())
    }
}

impl Drop for Mysqld {
    fn drop(&mut self) {
        let process = self.process.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(mut child) = process.take() {
            if let Err(e) = platform::terminate_child(&mut child, MysqldConfig::SHUTDOWN_GRACE) {
                warn!("Failed to stop mysqld @ {} on drop: {}", self.port, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_root() {
        let absolute = Path::new("/var/lib/mysqld");
        assert_eq!(resolve_root(absolute).unwrap(), absolute);

        let relative = resolve_root(Path::new("mysqld")).unwrap();
        assert!(relative.is_absolute());
        assert_eq!(relative, std::env::current_dir().unwrap().join("mysqld"));
    }

    #[test]
    fn test_ensure_dir_creates_tree() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("a").join("b");

        ensure_dir(&path, &path).unwrap();
        assert!(path.is_dir());
        ensure_dir(&path, &path).unwrap();
    }

    #[test]
    fn test_ensure_dir_collides_with_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("taken");
        fs::write(&path, "not a directory").unwrap();

        let result = ensure_dir(&path, Path::new("taken"));
        match result {
            Err(MysqldError::PermissionDenied(root)) => assert_eq!(root, PathBuf::from("taken")),
            other => panic!("expected PermissionDenied, got {other:?}"),
        }
    }

    #[test]
    fn test_read_script_joins_lines() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("init.sql");
        fs::write(&path, "CREATE DATABASE demo;\r\nUSE demo;\nCREATE TABLE t (id INT);").unwrap();

        let sql = read_script(&path).unwrap();
        let sep = platform::LINE_SEPARATOR;
        assert_eq!(
            sql,
            format!("CREATE DATABASE demo;{sep}USE demo;{sep}CREATE TABLE t (id INT);{sep}")
        );
    }

    #[test]
    fn test_read_script_missing() {
        let result = read_script(Path::new("/nonexistent/init.sql"));
        assert!(matches!(result, Err(MysqldError::Io { .. })));
    }
}
