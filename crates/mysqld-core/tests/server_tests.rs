//! Tests against a real `mysqld`.
//!
//! Ignored unless `MYSQLD_INTEGRATION=1` is set and a MySQL (not MariaDB)
//! server binary can be found. Point `MYSQLD_BIN` at one if it is not on
//! `PATH`:
//!
//!   MYSQLD_INTEGRATION=1 cargo test -p embedded-mysqld --test server_tests

mod common;

use common::{free_port, TestEnv};
use embedded_mysqld::deploy::locate_binary;
use embedded_mysqld::{MysqldConfig, MysqldPool, MysqldSettings};
use mysql::prelude::Queryable;
use std::path::PathBuf;
use std::process::Command;

fn integration_enabled() -> bool {
    std::env::var("MYSQLD_INTEGRATION").is_ok_and(|v| v == "1")
}

fn real_binary() -> Option<PathBuf> {
    if !integration_enabled() {
        return None;
    }

    let explicit = std::env::var(MysqldConfig::ENV_BIN).ok().map(PathBuf::from);
    let path = match locate_binary(explicit.as_deref()) {
        Ok(path) => path,
        Err(e) => {
            eprintln!("skipping: {}", e);
            return None;
        }
    };

    // MariaDB has no --initialize-insecure
    let version = Command::new(&path).arg("--version").output().ok()?;
    if String::from_utf8_lossy(&version.stdout).contains("MariaDB") {
        eprintln!("skipping: {} is MariaDB", path.display());
        return None;
    }
    Some(path)
}

#[test]
fn test_init_script_creates_table() {
    let Some(binary) = real_binary() else {
        return;
    };
    common::init_tracing();

    let env = TestEnv::new();
    let script = env.temp_dir.path().join("init.sql");
    std::fs::write(
        &script,
        "CREATE DATABASE demo;\nUSE demo;\nCREATE TABLE t (id INT);\n",
    )
    .unwrap();

    let port = free_port();
    let pool = MysqldPool::new(
        MysqldSettings::default()
            .with_root(&env.root)
            .with_port(port)
            .with_binary(binary)
            .with_init_script(&script),
    );

    let mysql = pool.start().unwrap();
    assert!(mysql.is_ready());

    let mut conn = mysql.connect().unwrap();
    let count: Option<u64> = conn
        .query_first(
            "SELECT COUNT(*) FROM information_schema.tables \
             WHERE table_schema = 'demo' AND table_name = 't'",
        )
        .unwrap();
    assert_eq!(count, Some(1));
    drop(conn);

    mysql.close().unwrap();
    assert!(!mysql.is_running());
}

#[test]
fn test_bad_init_script_leaves_server_usable() {
    let Some(binary) = real_binary() else {
        return;
    };
    common::init_tracing();

    let env = TestEnv::new();
    let script = env.temp_dir.path().join("broken.sql");
    std::fs::write(&script, "THIS IS NOT SQL;\n").unwrap();

    let port = free_port();
    let pool = MysqldPool::new(
        MysqldSettings::default()
            .with_root(&env.root)
            .with_binary(binary)
            .with_init_script(&script),
    );

    let mysql = pool.start_at(&env.root, port).unwrap();

    let mut conn = mysql.connect().unwrap();
    let one: Option<i64> = conn.query_first("SELECT 1").unwrap();
    assert_eq!(one, Some(1));
    drop(conn);

    mysql.close().unwrap();
}
