//! Platform-specific helpers for ports, line endings and child processes.
//!
//! All `#[cfg]` blocks for OS-specific behavior live here rather than in the
//! lifecycle code.

use crate::error::{MysqldError, Result};
use std::net::{TcpStream, ToSocketAddrs};
use std::process::{Child, ExitStatus};
use std::time::Duration;
use tracing::{debug, warn};

/// Line separator used when joining script lines.
#[cfg(windows)]
pub const LINE_SEPARATOR: &str = "\r\n";
#[cfg(not(windows))]
pub const LINE_SEPARATOR: &str = "\n";

/// Whether something accepts TCP connections on `localhost:port`.
///
/// A successful connect means the port is taken. Every connect error,
/// including resolution failures and timeouts, counts as free.
pub fn port_in_use(port: u16, timeout: Duration) -> bool {
    let addrs = match ("localhost", port).to_socket_addrs() {
        Ok(addrs) => addrs,
        Err(e) => {
            debug!("Could not resolve localhost:{}: {}", port, e);
            return false;
        }
    };

    for addr in addrs {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(_) => {
                debug!("Port {} accepted a connection on {}", port, addr);
                return true;
            }
            Err(e) => debug!("Port probe {} failed: {}", addr, e),
        }
    }
    false
}

/// Stop a child process gracefully, then forcefully, and reap it.
///
/// # Platform Behavior
/// - **Linux/macOS**: Sends SIGTERM, waits up to `grace`, then SIGKILL
/// - **Windows**: Terminates immediately via `TerminateProcess`
pub fn terminate_child(child: &mut Child, grace: Duration) -> Result<ExitStatus> {
    if let Some(status) = child.try_wait()? {
        debug!("Process {} already exited: {}", child.id(), status);
        return Ok(status);
    }

    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let pid = child.id();
        debug!("Sending SIGTERM to process {}", pid);
        match kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
            Ok(()) => {
                if let Some(status) = wait_with_grace(child, grace)? {
                    debug!("Process {} terminated gracefully", pid);
                    return Ok(status);
                }
                debug!("Process {} still running after {:?}, killing", pid, grace);
            }
            Err(nix::errno::Errno::ESRCH) => {}
            Err(e) => warn!("Failed to send SIGTERM to {}: {}", pid, e),
        }
    }

    #[cfg(not(unix))]
    let _ = grace;

    if let Err(e) = child.kill() {
        // InvalidInput means it exited between the checks
        if e.kind() != std::io::ErrorKind::InvalidInput {
            return Err(MysqldError::Io {
                message: format!("kill process {}", child.id()),
                path: None,
                source: Some(e),
            });
        }
    }
    Ok(child.wait()?)
}

#[cfg(unix)]
fn wait_with_grace(child: &mut Child, grace: Duration) -> Result<Option<ExitStatus>> {
    use std::thread::sleep;
    use std::time::Instant;

    let deadline = Instant::now() + grace;
    let interval = Duration::from_millis(50);

    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        sleep(interval);
    }
}
