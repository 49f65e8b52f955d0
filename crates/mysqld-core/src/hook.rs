//! Test-run lifecycle hook.
//!
//! Starts one shared instance before a test run and stops it afterwards.
//! Tests in between call [`MysqldPool::start`] and [`Mysqld::close`] freely;
//! they all get the shared instance and none of them stops it.

use crate::error::Result;
use crate::mysqld::Mysqld;
use crate::pool::MysqldPool;
use std::sync::Arc;
use tracing::{debug, warn};

/// Provisions and tears down the run-wide shared server.
#[derive(Debug)]
pub struct TestRunHook {
    pool: MysqldPool,
    mysql: Option<Arc<Mysqld>>,
}

impl TestRunHook {
    pub fn new(pool: MysqldPool) -> Self {
        Self { pool, mysql: None }
    }

    pub fn pool(&self) -> &MysqldPool {
        &self.pool
    }

    /// The shared instance, between start and finish.
    pub fn instance(&self) -> Option<&Arc<Mysqld>> {
        self.mysql.as_ref()
    }

    /// Start the shared instance on the configured root and port.
    ///
    /// Errors propagate so the run can be aborted.
    pub fn test_run_started(&mut self) -> Result<Arc<Mysqld>> {
        debug!("on test run started: start embedded mysql server");

        let settings = self.pool.settings();
        let mysql = self.pool.start_shared(&settings.root, settings.port)?;
        self.mysql = Some(mysql.clone());
        Ok(mysql)
    }

    /// Stop the shared instance regardless of its shared flag.
    pub fn test_run_finished(&mut self) -> Result<()> {
        debug!("on test run finished: stop embedded mysql server");

        if let Some(mysql) = self.mysql.take() {
            self.pool.terminate(mysql.port())?;
        }
        Ok(())
    }
}

impl Drop for TestRunHook {
    fn drop(&mut self) {
        if self.mysql.is_some() {
            if let Err(e) = self.test_run_finished() {
                warn!("Failed to stop shared mysqld: {}", e);
            }
        }
    }
}
