// crates/state-store-sql/tests/helpers/contract.rs
// ============================================================================
// Module: Storage Contract Cases
// Description: Backend-independent storage contract assertions.
// Purpose: Hold Postgres and SQLite to the same read/write/delete semantics.
// Dependencies: state-store-sql, serde_json, tokio
// ============================================================================

//! ## Overview
//! Every case takes a configuration for a persistent backend whose
//! collection no other test touches. Cases that need a mid-batch failure
//! expect the backend suite to have installed a trigger that rejects inserts
//! of [`REJECTED_KEY`] with [`REJECTION_MESSAGE`].

use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use serde_json::Value;
use serde_json::json;
use state_store_core::MAX_KEY_LENGTH;
use state_store_sql::ConnectionState;
use state_store_sql::SqlKeyValueStore;
use state_store_sql::Storage;
use state_store_sql::StorageError;
use state_store_sql::StoreConfig;
use state_store_sql::StoreItems;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// Key rejected by the backend trigger installed for atomicity cases.
pub const REJECTED_KEY: &str = "rejected";
/// Message raised by that trigger.
pub const REJECTION_MESSAGE: &str = "key rejected by trigger";

pub fn items(entries: &[(&str, Value)]) -> StoreItems {
    entries.iter().map(|(key, value)| ((*key).to_string(), value.clone())).collect()
}

pub fn keys(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| (*value).to_string()).collect()
}

pub fn store(config: StoreConfig) -> SqlKeyValueStore {
    SqlKeyValueStore::new(config).expect("store")
}

fn assert_rejected(result: Result<(), StorageError>) {
    match result {
        Err(StorageError::Query(message)) => {
            assert!(message.contains(REJECTION_MESSAGE), "server detail missing: {message}");
        }
        other => panic!("expected query error, got {other:?}"),
    }
}

// ============================================================================
// SECTION: Storage Semantics
// ============================================================================

pub async fn write_read_delete(config: StoreConfig) {
    let store = store(config);
    store.write(items(&[("a", json!({"x": 1}))])).await.expect("write");
    let read = store.read(&keys(&["a", "missing"])).await.expect("read");
    assert_eq!(read, items(&[("a", json!({"x": 1}))]));

    store.delete(&keys(&["a"])).await.expect("delete");
    assert!(store.read(&keys(&["a"])).await.expect("read after delete").is_empty());
    store.close().await.expect("close");
}

pub async fn last_write_wins(config: StoreConfig) {
    let store = store(config);
    store.write(items(&[("k", json!({"v": 1, "extra": true}))])).await.expect("first");
    store.write(items(&[("k", json!({"v": 2}))])).await.expect("second");
    let read = store.read(&keys(&["k"])).await.expect("read");
    assert_eq!(read.get("k"), Some(&json!({"v": 2})));
    store.close().await.expect("close");
}

pub async fn payloads_round_trip_every_json_shape(config: StoreConfig) {
    let store = store(config);
    let written = items(&[
        ("number", json!(42)),
        ("negative", json!(-17)),
        ("large", json!(u64::MAX)),
        ("float", json!(1.5)),
        ("string", json!("hello")),
        ("nul_escape", json!("a\u{0}b")),
        ("unicode", json!("snow \u{2603} \u{1F600}")),
        ("bool", json!(true)),
        ("null", Value::Null),
        ("empty_object", json!({})),
        ("empty_array", json!([])),
        ("array", json!([1, "two", {"three": 3}])),
        ("nested", json!({"a": {"b": [null, false, "\u{0}"]}})),
    ]);
    store.write(written.clone()).await.expect("write");
    let requested: Vec<String> = written.keys().cloned().collect();
    let read = store.read(&requested).await.expect("read");
    assert_eq!(read, written);
    store.close().await.expect("close");
}

pub async fn read_follows_request_order_and_dedupes(config: StoreConfig) {
    let store = store(config);
    store
        .write(items(&[("a", json!(1)), ("b", json!(2)), ("c", json!(3))]))
        .await
        .expect("write");
    let read = store.read(&keys(&["c", "a", "c", "missing", "b"])).await.expect("read");
    let order: Vec<&str> = read.keys().map(String::as_str).collect();
    assert_eq!(order, vec!["c", "a", "b"]);
    store.close().await.expect("close");
}

pub async fn delete_is_idempotent(config: StoreConfig) {
    let store = store(config);
    store.write(items(&[("a", json!(1)), ("b", json!(2))])).await.expect("write");
    store.delete(&keys(&["a", "missing"])).await.expect("delete");
    store.delete(&keys(&["a", "a"])).await.expect("delete again");
    let read = store.read(&keys(&["a", "b"])).await.expect("read");
    assert_eq!(read, items(&[("b", json!(2))]));
    store.close().await.expect("close");
}

pub async fn large_key_sets(config: StoreConfig) {
    let store = store(config);
    let written: StoreItems =
        (0..1_200).map(|index| (format!("key-{index}"), json!(index))).collect();
    let requested: Vec<String> = written.keys().cloned().collect();
    store.write(written.clone()).await.expect("write");
    assert_eq!(store.read(&requested).await.expect("read"), written);
    store.delete(&requested).await.expect("delete");
    assert!(store.read(&requested).await.expect("read after delete").is_empty());
    store.close().await.expect("close");
}

pub async fn unstorable_keys_are_rejected_before_connect(config: StoreConfig) {
    let store = store(config);
    let long_key = "k".repeat(MAX_KEY_LENGTH + 1);
    let result = store.write(items(&[(long_key.as_str(), json!(1))])).await;
    assert!(matches!(result, Err(StorageError::Invalid(_))));
    let result = store.write(items(&[("ok", json!(1)), ("a\u{0}b", json!(2))])).await;
    assert!(matches!(result, Err(StorageError::Invalid(_))));
    assert_eq!(store.state().await, ConnectionState::Disconnected);

    let max_key = "k".repeat(MAX_KEY_LENGTH);
    store.write(items(&[(max_key.as_str(), json!(1))])).await.expect("max length key");
    let requested = vec!["a\u{0}b".to_string(), long_key, max_key.clone()];
    let read = store.read(&requested).await.expect("read");
    assert_eq!(read, items(&[(max_key.as_str(), json!(1))]));
    assert!(store.read(&keys(&["ok"])).await.expect("read rejected batch").is_empty());
    store.delete(&requested).await.expect("delete");
    assert!(store.read(&requested).await.expect("read after delete").is_empty());
    store.close().await.expect("close");
}

// ============================================================================
// SECTION: Write Atomicity
// ============================================================================

/// Expects per-key atomicity and an installed rejection trigger.
pub async fn per_key_write_fails_fast(store: &SqlKeyValueStore) {
    let result = store
        .write(items(&[("first", json!(1)), (REJECTED_KEY, json!(2)), ("after", json!(3))]))
        .await;
    assert_rejected(result);
    let read = store.read(&keys(&["first", REJECTED_KEY, "after"])).await.expect("read");
    assert_eq!(read, items(&[("first", json!(1))]));
}

/// Expects batch atomicity and an installed rejection trigger.
pub async fn batch_write_rolls_back(store: &SqlKeyValueStore) {
    let result = store.write(items(&[("first", json!(1)), (REJECTED_KEY, json!(2))])).await;
    assert_rejected(result);
    assert!(store.read(&keys(&["first", REJECTED_KEY])).await.expect("read").is_empty());

    store.write(items(&[("first", json!(1)), ("second", json!(2))])).await.expect("batch");
    let read = store.read(&keys(&["first", "second"])).await.expect("read");
    assert_eq!(read, items(&[("first", json!(1)), ("second", json!(2))]));
}

// ============================================================================
// SECTION: Session Lifecycle
// ============================================================================

pub async fn concurrent_first_use_opens_one_session(config: StoreConfig) {
    let creates = Arc::new(AtomicUsize::new(0));
    let sink = Arc::clone(&creates);
    let config = config.with_statement_logger(move |statement: &str, _elapsed: Duration| {
        if statement.starts_with("CREATE TABLE") {
            sink.fetch_add(1, Ordering::SeqCst);
        }
    });
    let store = Arc::new(store(config));
    let mut tasks = Vec::new();
    for index in 0..8 {
        let store = Arc::clone(&store);
        tasks.push(tokio::spawn(async move {
            let key = format!("k{index}");
            store.write(items(&[(key.as_str(), json!(index))])).await
        }));
    }
    for task in tasks {
        task.await.expect("join").expect("write");
    }
    assert_eq!(creates.load(Ordering::SeqCst), 1);
    let requested: Vec<String> = (0..8).map(|index| format!("k{index}")).collect();
    assert_eq!(store.read(&requested).await.expect("read").len(), 8);
    store.close().await.expect("close");
}

pub async fn close_is_idempotent_and_store_reconnects(config: StoreConfig) {
    let store = store(config);
    store.close().await.expect("close when disconnected");

    store.write(items(&[("a", json!("persisted"))])).await.expect("write");
    store.close().await.expect("close");
    assert_eq!(store.state().await, ConnectionState::Disconnected);
    assert!(store.pool_stats().await.is_none());
    store.close().await.expect("close again");

    let read = store.read(&keys(&["a"])).await.expect("read after reconnect");
    assert_eq!(read.get("a"), Some(&json!("persisted")));
    assert_eq!(store.state().await, ConnectionState::Connected);
    store.close().await.expect("close");
}

pub async fn connect_replaces_existing_session(config: StoreConfig) {
    let store = store(config);
    store.write(items(&[("a", json!(1))])).await.expect("write");
    store.connect().await.expect("reconnect");
    assert_eq!(store.state().await, ConnectionState::Connected);
    let read = store.read(&keys(&["a"])).await.expect("read");
    assert_eq!(read.get("a"), Some(&json!(1)));
    store.close().await.expect("close");
}

pub async fn readiness_connects_and_reports_pool(config: StoreConfig) {
    let store = store(config);
    assert!(store.pool_stats().await.is_none());
    store.readiness().await.expect("ready");
    assert_eq!(store.state().await, ConnectionState::Connected);
    let stats = store.pool_stats().await.expect("stats");
    assert!(stats.connections >= 1);
    store.close().await.expect("close");
}
