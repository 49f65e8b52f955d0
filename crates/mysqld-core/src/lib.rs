//! Embedded MySQL server lifecycle for test suites.
//!
//! Starts a local `mysqld` bound to a working directory and port, waits until
//! it accepts connections, optionally runs an init script, and shuts it down
//! when tests are done. A [`MysqldPool`] hands the same running instance to
//! every caller asking for the same port; a [`TestRunHook`] keeps one shared
//! instance alive for a whole test run.
//!
//! # Example
//!
//! ```rust,no_run
//! use embedded_mysqld::{MysqldPool, MysqldSettings};
//!
//! fn main() -> embedded_mysqld::Result<()> {
//!     let pool = MysqldPool::new(MysqldSettings::from_env()?.with_port(13306));
//!
//!     let mysql = pool.start()?;
//!     println!("server at {}", mysql.connection_url());
//!
//!     // Same port, same instance, no second process.
//!     let again = pool.start()?;
//!     assert!(std::sync::Arc::ptr_eq(&mysql, &again));
//!
//!     mysql.close()?;
//!     Ok(())
//! }
//! ```
//!
//! # Configuration
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | `MYSQLD_ROOT` | `mysqld` | Working directory, relative to the current directory |
//! | `MYSQLD_PORT` | `3306` | Port used by [`MysqldPool::start`] |
//! | `MYSQLD_INIT` | unset | SQL script run once after startup |
//! | `MYSQLD_BIN` | `mysqld` on `PATH` | Server binary |
//! | `MYSQLD_READY_TIMEOUT` | `120` | Seconds to wait for readiness, `0` waits forever |

pub mod cancel;
pub mod config;
pub mod deploy;
pub mod error;
pub mod hook;
pub mod mysqld;
pub mod platform;
pub mod pool;
pub mod redirect;
pub mod registry;

// Re-export commonly used types
pub use config::{MysqldConfig, MysqldSettings};
pub use error::{MysqldError, Result};
pub use hook::TestRunHook;
pub use mysqld::Mysqld;
pub use pool::MysqldPool;
pub use redirect::OutputRedirector;
pub use registry::Registry;
