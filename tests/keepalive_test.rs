//! Integration tests for the keep-alive task, run on a paused clock.
//!
//! Tests verify that:
//! - Probes are only sent after the idle threshold has passed
//! - A failed probe reconnects without stopping the task
//! - close() and the dialect policy control whether the task runs

mod common;

use common::{MockDriver, config_for, postgres_config};
use db_adapter::Database;
use db_adapter::config::KeepAliveOptions;
use db_adapter::db::KeepAliveOutcome;
use db_adapter::models::{DatabaseType, LifecycleState};
use std::time::Duration;
use tokio::time::sleep;
use tokio_test::assert_ok;

const KEEPALIVE: KeepAliveOptions = KeepAliveOptions {
    interval_secs: 30,
    idle_threshold_secs: 20,
};

async fn connected(db_type: DatabaseType) -> (Database<MockDriver>, MockDriver) {
    let driver = MockDriver::new();
    let config = config_for(db_type).with_keepalive(KEEPALIVE);
    let db = Database::with_driver(driver.clone(), config);
    assert_ok!(db.connect().await);
    (db, driver)
}

#[tokio::test(start_paused = true)]
async fn test_recent_activity_suppresses_probes() {
    let (db, driver) = connected(DatabaseType::PostgreSQL).await;
    assert!(db.manager().is_keepalive_running());

    for _ in 0..12 {
        sleep(Duration::from_secs(10)).await;
        assert_ok!(db.query("SELECT * FROM statuses", &[]).await);
    }

    assert_eq!(driver.probes(), 0);
    assert_eq!(driver.runs(), 12);
}

#[tokio::test(start_paused = true)]
async fn test_idle_adapter_is_probed() {
    let (db, driver) = connected(DatabaseType::MySQL).await;

    sleep(Duration::from_secs(31)).await;
    assert_eq!(driver.probes(), 1);

    // Probes do not count as activity
    sleep(Duration::from_secs(30)).await;
    assert_eq!(driver.probes(), 2);
    assert_eq!(driver.runs(), 0);
    assert_eq!(driver.connects(), 1);
    assert_eq!(db.manager().state(), LifecycleState::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_failed_probe_reconnects() {
    let (db, driver) = connected(DatabaseType::PostgreSQL).await;
    driver.with(|s| s.fail_probes = 1);

    sleep(Duration::from_secs(31)).await;
    assert_eq!(driver.probes(), 1);
    assert_eq!(driver.connects(), 2);
    assert_eq!(driver.closes(), 1);
    assert_eq!(db.manager().state(), LifecycleState::Connected);
    assert!(db.manager().is_keepalive_running());

    // The new handle is probed on the following tick
    sleep(Duration::from_secs(30)).await;
    assert_eq!(driver.probes(), 2);
    assert_eq!(driver.connects(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_failed_recovery_retries_next_tick() {
    let (db, driver) = connected(DatabaseType::PostgreSQL).await;
    driver.with(|s| {
        s.fail_probes = 1;
        s.fail_connects = 1;
    });

    sleep(Duration::from_secs(31)).await;
    assert_eq!(db.manager().state(), LifecycleState::Failed);
    assert!(db.manager().is_keepalive_running());

    sleep(Duration::from_secs(30)).await;
    assert_eq!(driver.connects(), 3);
    assert_eq!(db.manager().state(), LifecycleState::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_manual_tick() {
    let (db, driver) = connected(DatabaseType::PostgreSQL).await;

    assert_eq!(db.manager().keepalive_tick().await, KeepAliveOutcome::Skipped);
    tokio::time::advance(Duration::from_secs(21)).await;
    assert_eq!(db.manager().keepalive_tick().await, KeepAliveOutcome::Healthy);

    driver.with(|s| s.fail_probes = 1);
    assert_eq!(db.manager().keepalive_tick().await, KeepAliveOutcome::Recovered);
    assert_eq!(driver.connects(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_close_stops_keepalive() {
    let (db, driver) = connected(DatabaseType::PostgreSQL).await;
    assert_ok!(db.close().await);
    assert!(!db.manager().is_keepalive_running());

    sleep(Duration::from_secs(120)).await;
    assert_eq!(driver.probes(), 0);
    assert!(!db.status().keepalive_running);
}

#[tokio::test(start_paused = true)]
async fn test_caller_reconnect_restarts_keepalive() {
    let (db, driver) = connected(DatabaseType::PostgreSQL).await;
    assert_ok!(db.reconnect().await);
    assert!(db.manager().is_keepalive_running());

    sleep(Duration::from_secs(31)).await;
    assert_eq!(driver.probes(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_sqlite_has_no_keepalive() {
    let (db, driver) = connected(DatabaseType::SQLite).await;
    assert!(!db.manager().is_keepalive_running());

    sleep(Duration::from_secs(120)).await;
    assert_eq!(driver.probes(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_disabled_keepalive() {
    let driver = MockDriver::new();
    let config = postgres_config().with_keepalive(KeepAliveOptions::disabled());
    let db = Database::with_driver(driver.clone(), config);
    assert_ok!(db.connect().await);

    assert!(!db.manager().is_keepalive_running());
    sleep(Duration::from_secs(120)).await;
    assert_eq!(driver.probes(), 0);
}
