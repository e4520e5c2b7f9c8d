// crates/sqlforage-sqlite/tests/kv_unit.rs
// ============================================================================
// Module: SQLite Key-Value Store Unit Tests
// Description: Key-value semantics over the lifecycle layer.
// Purpose: Validate round trips, ordering, isolation, and connection reuse.
// Dependencies: sqlforage-core, sqlforage-sqlite, proptest, serde_json, tempfile, tokio
// ============================================================================

//! ## Overview
//! Exercises [`sqlforage_sqlite::SqliteKvStore`] and
//! [`sqlforage_sqlite::SqliteDriver`]:
//! - Round trips including JSON `null` versus missing keys
//! - `length`, `keys`, `key(n)`, `iterate` agreement and early stop
//! - `clear`, `remove_item`, and `drop_instance` effects
//! - Concurrent writes sharing one connection
//! - A model-based comparison against an in-memory map

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

use std::collections::BTreeMap;
use std::sync::Arc;

use common::CountingEngine;
use common::Faults;
use common::counting_manager;
use proptest::prelude::*;
use serde_json::Value;
use serde_json::json;
use sqlforage_core::Forage;
use sqlforage_core::KeyValueStore;
use sqlforage_core::NamespacedDriver;
use sqlforage_core::StoreError;
use sqlforage_core::StoreKey;
use sqlforage_core::StoreOptions;
use sqlforage_sqlite::LifecycleManager;
use sqlforage_sqlite::SQLITE_DRIVER_NAME;
use sqlforage_sqlite::SqliteDriver;
use sqlforage_sqlite::SqliteEngineConfig;
use sqlforage_sqlite::SqliteKvStore;
use tempfile::TempDir;

async fn open_store(
    manager: &LifecycleManager<CountingEngine>,
    name: &str,
    store: &str,
) -> SqliteKvStore<CountingEngine> {
    SqliteKvStore::open(manager.clone(), &StoreOptions::new(name, store)).await.unwrap()
}

async fn sqlite_forage(dir: &TempDir, name: &str, store: &str) -> Forage {
    let driver = SqliteDriver::from_config(SqliteEngineConfig::in_directory(dir.path())).unwrap();
    Forage::builder().driver(driver).build(StoreOptions::new(name, store)).await.unwrap()
}

// ============================================================================
// SECTION: Round Trips
// ============================================================================

#[tokio::test]
async fn set_then_get_round_trips_values_and_null() {
    let dir = tempfile::tempdir().unwrap();
    let forage = sqlite_forage(&dir, "db1", "kv").await;
    assert_eq!(forage.driver(), SQLITE_DRIVER_NAME);

    let stored = forage.set_item("a", json!("1")).await.unwrap();
    assert_eq!(stored, json!("1"));
    forage.set_item("obj", json!({"n": [1, 2.5, null]})).await.unwrap();
    forage.set_item("nothing", Value::Null).await.unwrap();

    assert_eq!(forage.get_item("a").await.unwrap(), Some(json!("1")));
    assert_eq!(forage.get_item("obj").await.unwrap(), Some(json!({"n": [1, 2.5, null]})));
    assert_eq!(forage.get_item("nothing").await.unwrap(), Some(Value::Null));
    assert_eq!(forage.get_item("missing").await.unwrap(), None);
    assert_eq!(forage.key(0).await.unwrap().as_deref(), Some("a"));
}

#[tokio::test]
async fn set_item_replaces_existing_value() {
    let dir = tempfile::tempdir().unwrap();
    let forage = sqlite_forage(&dir, "db1", "kv").await;
    forage.set_item(1_i64, json!(1)).await.unwrap();
    forage.set_item("1", json!(2)).await.unwrap();
    assert_eq!(forage.length().await.unwrap(), 1);
    assert_eq!(forage.get_item(1.0_f64).await.unwrap(), Some(json!(2)));
}

#[tokio::test]
async fn remove_and_clear_hide_keys() {
    let dir = tempfile::tempdir().unwrap();
    let forage = sqlite_forage(&dir, "db1", "kv").await;
    for key in ["a", "b", "c"] {
        forage.set_item(key, json!(key)).await.unwrap();
    }
    forage.remove_item("b").await.unwrap();
    assert_eq!(forage.get_item("b").await.unwrap(), None);
    assert_eq!(forage.keys().await.unwrap(), vec!["a".to_string(), "c".to_string()]);

    forage.clear().await.unwrap();
    assert_eq!(forage.length().await.unwrap(), 0);
    assert_eq!(forage.get_item("a").await.unwrap(), None);
    assert_eq!(forage.key(0).await.unwrap(), None);
}

// ============================================================================
// SECTION: Ordering
// ============================================================================

#[tokio::test]
async fn keys_follow_insertion_order_and_iterate_stops_early() {
    let (manager, _dir) = counting_manager();
    let store = open_store(&manager, "db1", "kv").await;
    for (key, value) in [("z", 1), ("a", 2), ("m", 3)] {
        store.set_item(StoreKey::from(key), json!(value)).await.unwrap();
    }
    assert_eq!(store.keys().await.unwrap(), vec!["z", "a", "m"]);
    assert_eq!(store.key(1).await.unwrap().as_deref(), Some("a"));
    assert_eq!(store.key(3).await.unwrap(), None);
    assert_eq!(store.length().await.unwrap(), 3);

    let mut visited = Vec::new();
    let mut visitor = |value: Value, key: &str, number: usize| {
        visited.push((key.to_string(), number));
        (value == json!(2)).then(|| json!({"found": key}))
    };
    let result = store.iterate(&mut visitor).await.unwrap();
    assert_eq!(result, Some(json!({"found": "a"})));
    assert_eq!(visited, vec![("z".to_string(), 1), ("a".to_string(), 2)]);

    let mut count = 0;
    let mut exhaust = |_: Value, _: &str, _: usize| {
        count += 1;
        None
    };
    assert_eq!(store.iterate(&mut exhaust).await.unwrap(), None);
    assert_eq!(count, 3);
}

// ============================================================================
// SECTION: Isolation
// ============================================================================

#[tokio::test]
async fn stores_in_one_database_are_isolated() {
    let (manager, _dir) = counting_manager();
    let first = open_store(&manager, "db1", "kv").await;
    let second = open_store(&manager, "db1", "other").await;
    first.set_item(StoreKey::from("a"), json!(1)).await.unwrap();
    second.set_item(StoreKey::from("b"), json!(2)).await.unwrap();
    assert_eq!(first.keys().await.unwrap(), vec!["a"]);
    assert_eq!(second.keys().await.unwrap(), vec!["b"]);
    second.clear().await.unwrap();
    assert_eq!(first.length().await.unwrap(), 1);
}

#[tokio::test]
async fn hostile_store_names_become_plain_tables() {
    let (manager, _dir) = counting_manager();
    let store = open_store(&manager, "db1", "kv\"; DROP TABLE kv; --").await;
    assert_eq!(store.options().store_name, "kv___DROP_TABLE_kv____");
    store.set_item(StoreKey::from("a"), json!(1)).await.unwrap();
    assert_eq!(store.get_item(StoreKey::from("a")).await.unwrap(), Some(json!(1)));
}

#[tokio::test]
async fn reserved_store_names_are_rejected() {
    let (manager, _dir) = counting_manager();
    let result =
        SqliteKvStore::open(manager.clone(), &StoreOptions::new("db1", "sqlite_master")).await;
    assert!(matches!(result, Err(StoreError::Invalid(_))));
}

// ============================================================================
// SECTION: Lifecycle
// ============================================================================

#[tokio::test]
async fn concurrent_set_items_share_one_connection() {
    let (manager, _dir) = counting_manager();
    let store = Arc::new(open_store(&manager, "db1", "kv").await);
    let opens_before = manager.engine().opens();
    let closes_before = manager.engine().closes();

    let mut handles = Vec::new();
    for index in 0 .. 12_i64 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            store.set_item(StoreKey::from(index), json!(index)).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(manager.engine().opens() - opens_before, 1);
    assert_eq!(manager.engine().closes() - closes_before, 1);
    assert!(!manager.is_open("db1"));
    assert_eq!(store.length().await.unwrap(), 12);
    assert_eq!(manager.stats().connections_opened, manager.stats().connections_closed);
}

#[tokio::test]
async fn failed_write_leaves_previous_value() {
    let (manager, _dir) = counting_manager();
    let store = open_store(&manager, "db1", "kv").await;
    store.set_item(StoreKey::from("a"), json!("old")).await.unwrap();
    Faults::set(&manager.engine().faults.commit, true);
    let result = store.set_item(StoreKey::from("a"), json!("new")).await;
    Faults::set(&manager.engine().faults.commit, false);
    assert!(matches!(result, Err(StoreError::Backend(_))));
    assert_eq!(store.get_item(StoreKey::from("a")).await.unwrap(), Some(json!("old")));
}

#[tokio::test]
async fn open_failure_surfaces_as_unavailable() {
    let (manager, _dir) = counting_manager();
    Faults::set(&manager.engine().faults.open, true);
    let result = SqliteKvStore::open(manager.clone(), &StoreOptions::new("db1", "kv")).await;
    assert!(matches!(result, Err(StoreError::Unavailable(_))));
}

#[tokio::test]
async fn drop_instance_then_reopen_gives_a_fresh_table() {
    let (manager, dir) = counting_manager();
    let store = open_store(&manager, "db1", "kv").await;
    let other = open_store(&manager, "db1", "other").await;
    store.set_item(StoreKey::from("a"), json!(1)).await.unwrap();
    other.set_item(StoreKey::from("b"), json!(2)).await.unwrap();

    store.drop_instance().await.unwrap();
    assert!(!dir.path().join("db1.db").exists());

    assert_eq!(store.length().await.unwrap(), 0);
    assert_eq!(other.get_item(StoreKey::from("b")).await.unwrap(), None);
    store.set_item(StoreKey::from("c"), json!(3)).await.unwrap();
    assert_eq!(store.keys().await.unwrap(), vec!["c"]);
}

#[tokio::test]
async fn drop_instance_queued_behind_set_item_does_not_fail_it() {
    let (manager, _dir) = counting_manager();
    let store = Arc::new(open_store(&manager, "db1", "kv").await);
    let writer = {
        let store = Arc::clone(&store);
        tokio::spawn(async move { store.set_item(StoreKey::from("a"), json!(1)).await })
    };
    tokio::task::yield_now().await;
    let dropped = store.drop_instance().await;

    assert_eq!(writer.await.unwrap().unwrap(), json!(1));
    dropped.unwrap();
    assert_eq!(store.get_item(StoreKey::from("a")).await.unwrap(), None);
    assert_eq!(store.length().await.unwrap(), 0);
}

#[tokio::test]
async fn sqlite_is_preferred_over_namespaced_fallback() {
    let dir = tempfile::tempdir().unwrap();
    let driver = SqliteDriver::from_config(SqliteEngineConfig::in_directory(dir.path())).unwrap();
    let forage = Forage::builder()
        .driver(driver)
        .driver(NamespacedDriver::default())
        .build(StoreOptions::default())
        .await
        .unwrap();
    assert_eq!(forage.driver(), SQLITE_DRIVER_NAME);
    forage.set_item("k", json!(true)).await.unwrap();
    assert!(dir.path().join("localforage.db").exists());
}

// ============================================================================
// SECTION: Model Check
// ============================================================================

/// Operation applied to both the store and the model.
#[derive(Debug, Clone)]
enum Op {
    Set(String, i64),
    Remove(String),
    Clear,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    let key = prop::sample::select(vec!["a", "b", "c", "d", "5"]).prop_map(str::to_string);
    prop_oneof![
        6 => (key.clone(), any::<i64>()).prop_map(|(key, value)| Op::Set(key, value)),
        3 => key.prop_map(Op::Remove),
        1 => Just(Op::Clear),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn store_matches_map_model(ops in prop::collection::vec(op_strategy(), 1 .. 20)) {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        runtime.block_on(async {
            let (manager, _dir) = counting_manager();
            let store = open_store(&manager, "model", "kv").await;
            let mut model = BTreeMap::new();
            for op in ops {
                match op {
                    Op::Set(key, value) => {
                        store.set_item(StoreKey::from(key.as_str()), json!(value)).await.unwrap();
                        model.insert(key, value);
                    }
                    Op::Remove(key) => {
                        store.remove_item(StoreKey::from(key.as_str())).await.unwrap();
                        model.remove(&key);
                    }
                    Op::Clear => {
                        store.clear().await.unwrap();
                        model.clear();
                    }
                }
            }
            let mut keys = store.keys().await.unwrap();
            keys.sort();
            assert_eq!(keys, model.keys().cloned().collect::<Vec<_>>());
            assert_eq!(store.length().await.unwrap(), model.len());
            for (key, value) in &model {
                assert_eq!(
                    store.get_item(StoreKey::from(key.as_str())).await.unwrap(),
                    Some(json!(value))
                );
            }
            assert!(!manager.is_open("model"));
        });
    }
}
