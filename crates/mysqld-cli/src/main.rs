//! mysqld-run - start an embedded MySQL server and keep it up until Ctrl-C.
//!
//! Provisions one shared instance the same way a test run does, prints its
//! connection URL, and tears it down on interrupt.

use anyhow::{Context, Result};
use clap::Parser;
use embedded_mysqld::{MysqldPool, MysqldSettings, TestRunHook};
use std::path::PathBuf;
use std::sync::mpsc;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "mysqld-run")]
#[command(about = "Run an embedded MySQL server until interrupted")]
struct Args {
    /// Working directory (overrides MYSQLD_ROOT)
    #[arg(long)]
    root: Option<PathBuf>,

    /// Port to listen on (overrides MYSQLD_PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// SQL script to run once the server is ready (overrides MYSQLD_INIT)
    #[arg(long)]
    init: Option<PathBuf>,

    /// mysqld binary (overrides MYSQLD_BIN)
    #[arg(long)]
    binary: Option<PathBuf>,

    /// Seconds to wait for readiness, 0 = forever (overrides MYSQLD_READY_TIMEOUT)
    #[arg(long)]
    ready_timeout: Option<u64>,

    /// Enable debug logging (includes server stderr)
    #[arg(short, long)]
    debug: bool,
}

impl Args {
    fn settings(&self) -> Result<MysqldSettings> {
        let mut settings =
            MysqldSettings::from_env().context("invalid MYSQLD_* environment")?;
        if let Some(root) = &self.root {
            settings = settings.with_root(root);
        }
        if let Some(port) = self.port {
            settings = settings.with_port(port);
        }
        if let Some(init) = &self.init {
            settings = settings.with_init_script(init);
        }
        if let Some(binary) = &self.binary {
            settings = settings.with_binary(binary);
        }
        if let Some(secs) = self.ready_timeout {
            settings = settings.with_ready_timeout((secs > 0).then(|| Duration::from_secs(secs)));
        }
        Ok(settings)
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    let settings = args.settings()?;
    info!(
        "Starting embedded mysqld in {} on port {}",
        settings.root.display(),
        settings.port
    );

    let pool = MysqldPool::new(settings);
    let mut hook = TestRunHook::new(pool.clone());

    let (tx, rx) = mpsc::channel();
    {
        let pool = pool.clone();
        ctrlc::set_handler(move || {
            // A start still waiting for readiness gives up; the main thread
            // then tears the instance down.
            pool.interrupt();
            let _ = tx.send(());
        })
        .context("failed to install Ctrl-C handler")?;
    }

    let mysql = hook
        .test_run_started()
        .context("failed to start embedded mysqld")?;

    // Intentional stdout so wrapper scripts can pick up the address
    println!("MYSQL_URL={}", mysql.connection_url());
    info!("mysqld running on port {}, press Ctrl-C to stop", mysql.port());

    rx.recv().context("signal channel closed")?;
    info!("Shutdown signal received, stopping mysqld");

    hook.test_run_finished()?;
    Ok(())
}
