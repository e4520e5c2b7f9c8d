// crates/sqlforage-sqlite/tests/bootstrap_unit.rs
// ============================================================================
// Module: Store Bootstrapper Unit Tests
// Description: Table existence checks and creation outcomes.
// Purpose: Validate ensure/require results and store-scoped statements.
// Dependencies: sqlforage-sqlite, tempfile, tokio
// ============================================================================

//! ## Overview
//! Exercises [`sqlforage_sqlite::ensure_store`] and
//! [`sqlforage_sqlite::require_store`] against a counting engine:
//! - Creation is idempotent
//! - A failed creation reports `false`, and `require_store` turns it into an error
//! - A failed existence check is an error, never `false`
//! - Store-scoped statements create their table on first use

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

mod common;

use common::CountingEngine;
use common::Faults;
use common::counting_manager;
use sqlforage_sqlite::LifecycleError;
use sqlforage_sqlite::LifecycleManager;
use sqlforage_sqlite::SqlValue;
use sqlforage_sqlite::ensure_store;
use sqlforage_sqlite::require_store;

async fn table_exists(manager: &LifecycleManager<CountingEngine>, table: &str) -> bool {
    let rows = manager
        .query(
            "db1",
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
            vec![SqlValue::Text(table.to_string())],
        )
        .await
        .unwrap();
    !rows.is_empty()
}

// ============================================================================
// SECTION: Ensure
// ============================================================================

#[tokio::test]
async fn ensure_store_creates_once_and_is_idempotent() {
    let (manager, _dir) = counting_manager();
    assert!(ensure_store(&manager, "db1", "kv").await.unwrap());
    assert!(ensure_store(&manager, "db1", "kv").await.unwrap());
    assert!(table_exists(&manager, "kv").await);
    assert_eq!(manager.stats().committed, 1);
    assert!(!manager.is_open("db1"));
}

#[tokio::test]
async fn failed_creation_reports_false() {
    let (manager, _dir) = counting_manager();
    Faults::set(&manager.engine().faults.execute, true);
    let ensured = ensure_store(&manager, "db1", "kv").await;
    let required = require_store(&manager, "db1", "kv").await;
    Faults::set(&manager.engine().faults.execute, false);

    assert_eq!(ensured, Ok(false));
    match required {
        Err(LifecycleError::TableCreation {
            store,
            ..
        }) => assert_eq!(store, "kv"),
        other => panic!("unexpected result: {other:?}"),
    }
    assert!(!table_exists(&manager, "kv").await);
    assert_eq!(manager.stats().rolled_back, 2);
}

#[tokio::test]
async fn failed_existence_check_is_an_error() {
    let (manager, _dir) = counting_manager();
    Faults::set(&manager.engine().faults.select, true);
    let ensured = ensure_store(&manager, "db1", "kv").await;
    let required = require_store(&manager, "db1", "kv").await;
    Faults::set(&manager.engine().faults.select, false);

    assert!(matches!(ensured, Err(LifecycleError::Query(_))));
    assert!(matches!(required, Err(LifecycleError::Query(_))));
    assert_eq!(manager.stats().committed, 0);
    assert!(!table_exists(&manager, "kv").await);
}

#[tokio::test]
async fn reserved_store_name_never_opens_the_database() {
    let (manager, _dir) = counting_manager();
    let result = ensure_store(&manager, "db1", "sqlite_stat1").await;
    assert!(matches!(result, Err(LifecycleError::InvalidName(_))));
    assert_eq!(manager.engine().opens(), 0);
}

// ============================================================================
// SECTION: Store-Scoped Statements
// ============================================================================

#[tokio::test]
async fn store_scoped_statements_create_their_table() {
    let (manager, _dir) = counting_manager();
    let written = manager
        .execute_in_store(
            "db1",
            "kv",
            "INSERT INTO \"kv\" (key, value) VALUES (?1, ?2)",
            vec![SqlValue::Text("a".to_string()), SqlValue::Text("1".to_string())],
        )
        .await
        .unwrap();
    assert_eq!(written, 1);

    let rows = manager
        .query_in_store("db1", "kv", "SELECT key FROM \"kv\"", Vec::new())
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("key"), Some(&SqlValue::Text("a".to_string())));
    assert_eq!(manager.engine().opens(), 2);
    assert_eq!(manager.engine().closes(), 2);
}

#[tokio::test]
async fn store_scoped_statement_fails_when_table_cannot_be_created() {
    let (manager, _dir) = counting_manager();
    Faults::set(&manager.engine().faults.execute, true);
    let result = manager
        .execute_in_store("db1", "kv", "DELETE FROM \"kv\"", Vec::new())
        .await;
    Faults::set(&manager.engine().faults.execute, false);

    assert!(matches!(result, Err(LifecycleError::TableCreation { .. })));
    assert!(!manager.is_open("db1"));
}
