//! Tests for Engine
//!
//! These tests verify:
//! - Basic create/get/delete/delete_all operations
//! - Key, value and TTL constraints
//! - Lazy TTL expiry
//! - Persistence across engine restarts
//! - Capacity ceiling and rollback
//! - Concurrent access through the single lock

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde_json::{json, Value};
use stashkv::buffer::MappedBuffer;
use stashkv::clock::ManualClock;
use stashkv::config::Config;
use stashkv::engine::Engine;
use stashkv::StashError;
use tempfile::TempDir;

const START_MS: u64 = 1_700_000_000_000;

// =============================================================================
// Helper Functions
// =============================================================================

fn test_config(capacity: usize) -> Config {
    Config::builder()
        .max_key_len(16)
        .max_value_size(256)
        .max_local_storage_size(capacity)
        .build()
}

fn open_file(path: &Path) -> File {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .unwrap()
}

fn open_engine(path: &Path, config: Config, clock: Arc<ManualClock>) -> Engine {
    let buffer = MappedBuffer::open(open_file(path), config.max_local_storage_size).unwrap();
    Engine::with_clock(buffer, config, clock).unwrap()
}

fn setup_temp_engine() -> (TempDir, PathBuf, Arc<ManualClock>, Engine) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("store");
    let clock = Arc::new(ManualClock::at(START_MS));
    let engine = open_engine(&path, test_config(64 * 1024), Arc::clone(&clock));
    (temp_dir, path, clock, engine)
}

/// The JSON document currently persisted in the file, padding stripped
fn persisted_document(path: &Path) -> Value {
    let bytes = fs::read(path).unwrap();
    let end = bytes.iter().rposition(|&b| b != 0).map_or(0, |p| p + 1);
    assert!(bytes[end..].iter().all(|&b| b == 0));
    serde_json::from_slice(&bytes[..end]).unwrap()
}

// =============================================================================
// Construction Tests
// =============================================================================

#[test]
fn test_engine_blank_file_initialized_with_empty_document() {
    let (_temp, path, _clock, engine) = setup_temp_engine();

    assert!(engine.is_empty());
    assert_eq!(engine.capacity(), 64 * 1024);
    assert_eq!(engine.used_bytes(), 2);
    assert_eq!(persisted_document(&path), json!({}));
    assert_eq!(fs::metadata(&path).unwrap().len(), 64 * 1024);
}

#[test]
fn test_engine_corrupt_file_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("store");
    fs::write(&path, br#"{"k":[{},12"#).unwrap();

    let buffer = MappedBuffer::open(open_file(&path), 1024).unwrap();
    let result = Engine::new(buffer, test_config(1024));

    assert!(matches!(result, Err(StashError::CorruptStore(_))));
}

#[test]
fn test_engine_invalid_config_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("store");
    let buffer = MappedBuffer::open(open_file(&path), 1024).unwrap();

    let config = Config::builder().max_value_size(0).build();
    let result = Engine::new(buffer, config);

    assert!(matches!(result, Err(StashError::Config(_))));
}

// =============================================================================
// Basic Operations Tests
// =============================================================================

#[test]
fn test_engine_create_get() {
    let (_temp, _path, _clock, engine) = setup_temp_engine();
    let msg = json!({"message": "success"});

    engine.create("get_test", msg.clone(), None).unwrap();

    assert_eq!(Value::Object(engine.get("get_test").unwrap()), msg);
}

#[test]
fn test_engine_create_empty_object() {
    let (_temp, _path, _clock, engine) = setup_temp_engine();

    engine.create("key", json!({}), None).unwrap();

    assert!(engine.get("key").unwrap().is_empty());
}

#[test]
fn test_engine_get_nonexistent_key() {
    let (_temp, _path, _clock, engine) = setup_temp_engine();

    let result = engine.get("nonexistent");

    assert!(matches!(result, Err(StashError::KeyNotFound(k)) if k == "nonexistent"));
}

#[test]
fn test_engine_duplicate_create_rejected_and_value_kept() {
    let (_temp, _path, _clock, engine) = setup_temp_engine();

    engine.create("k", json!({"v": 1}), None).unwrap();
    let result = engine.create("k", json!({"v": 2}), Some(5));

    assert!(matches!(result, Err(StashError::DuplicateKey(k)) if k == "k"));
    assert_eq!(Value::Object(engine.get("k").unwrap()), json!({"v": 1}));
    assert_eq!(engine.len(), 1);
}

#[test]
fn test_engine_delete() {
    let (_temp, path, _clock, engine) = setup_temp_engine();

    engine.create("test_delete", json!({}), None).unwrap();
    engine.delete("test_delete").unwrap();

    assert!(matches!(engine.get("test_delete"), Err(StashError::KeyNotFound(_))));
    assert_eq!(persisted_document(&path), json!({}));
}

#[test]
fn test_engine_delete_nonexistent_key_is_noop() {
    let (_temp, path, _clock, engine) = setup_temp_engine();
    engine.create("keep", json!({"a": 1}), None).unwrap();
    let before = fs::read(&path).unwrap();

    engine.delete("missing").unwrap();

    assert_eq!(engine.keys(), vec!["keep".to_string()]);
    assert_eq!(fs::read(&path).unwrap(), before);
}

#[test]
fn test_engine_create_after_delete() {
    let (_temp, _path, _clock, engine) = setup_temp_engine();

    engine.create("k", json!({"gen": 1}), None).unwrap();
    engine.delete("k").unwrap();
    engine.create("k", json!({"gen": 2}), None).unwrap();

    assert_eq!(Value::Object(engine.get("k").unwrap()), json!({"gen": 2}));
}

#[test]
fn test_engine_delete_all() {
    let (_temp, path, _clock, engine) = setup_temp_engine();
    for i in 0..5 {
        engine.create(&format!("key{}", i), json!({"i": i}), None).unwrap();
    }

    engine.delete_all().unwrap();

    for i in 0..5 {
        assert!(matches!(
            engine.get(&format!("key{}", i)),
            Err(StashError::KeyNotFound(_))
        ));
    }
    assert!(engine.is_empty());
    assert_eq!(persisted_document(&path), json!({}));
}

#[test]
fn test_engine_persisted_format() {
    let (_temp, path, _clock, engine) = setup_temp_engine();

    engine.create("a", json!({"x": 1}), None).unwrap();
    engine.create("b", json!({"y": [true]}), Some(30)).unwrap();

    let bytes = fs::read(&path).unwrap();
    let expected = format!(
        r#"{{"a":[{{"x":1}},{},null],"b":[{{"y":[true]}},{},30]}}"#,
        START_MS, START_MS
    );
    assert_eq!(&bytes[..expected.len()], expected.as_bytes());
    assert!(bytes[expected.len()..].iter().all(|&b| b == 0));
}

// =============================================================================
// Constraint Tests
// =============================================================================

#[test]
fn test_engine_key_too_long() {
    let (_temp, _path, _clock, engine) = setup_temp_engine();
    let max = engine.config().max_key_len;

    engine.create(&"a".repeat(max), json!({}), None).unwrap();
    let result = engine.create(&"a".repeat(max + 1), json!({}), None);

    assert!(matches!(result, Err(StashError::InvalidKey(_))));
    assert_eq!(engine.len(), 1);
}

#[test]
fn test_engine_empty_key_rejected() {
    let (_temp, _path, _clock, engine) = setup_temp_engine();

    assert!(matches!(
        engine.create("", json!({}), None),
        Err(StashError::InvalidKey(_))
    ));
}

#[test]
fn test_engine_non_object_value_rejected() {
    let (_temp, _path, _clock, engine) = setup_temp_engine();

    let result = engine.create("key", json!(1), None);

    assert!(matches!(result, Err(StashError::InvalidValue(_))));
    assert!(!engine.contains_key("key"));
}

#[test]
fn test_engine_value_too_large() {
    let (_temp, _path, _clock, engine) = setup_temp_engine();
    let big = "x".repeat(engine.config().max_value_size);

    let result = engine.create("k", json!({ "blob": big }), None);

    assert!(matches!(result, Err(StashError::InvalidValue(_))));
    assert!(!engine.contains_key("k"));
}

#[test]
fn test_engine_create_from_json() {
    let (_temp, _path, clock, engine) = setup_temp_engine();

    engine
        .create_from_json(&json!("a"), json!({"v": 1}), Some(&json!("2")))
        .unwrap();
    engine
        .create_from_json(&json!("b"), json!({"v": 2}), Some(&Value::Null))
        .unwrap();

    clock.advance_secs(10);
    assert!(matches!(engine.get("a"), Err(StashError::ExpiredKey(_))));
    assert_eq!(Value::Object(engine.get("b").unwrap()), json!({"v": 2}));
}

#[test]
fn test_engine_create_from_json_rejects_bad_input() {
    let (_temp, _path, _clock, engine) = setup_temp_engine();

    assert!(matches!(
        engine.create_from_json(&json!(1), json!({}), None),
        Err(StashError::InvalidKey(_))
    ));
    assert!(matches!(
        engine.create_from_json(&json!("k"), json!({}), Some(&json!("soon"))),
        Err(StashError::InvalidTtl(_))
    ));
    assert!(matches!(
        engine.create_from_json(&json!("k"), json!([1, 2]), None),
        Err(StashError::InvalidValue(_))
    ));
    assert!(engine.is_empty());
}

// =============================================================================
// Expiry Tests
// =============================================================================

#[test]
fn test_engine_lazy_expiry() {
    let (_temp, path, clock, engine) = setup_temp_engine();
    let sample = json!({"key": "Value"});

    engine.create("test_ttl", sample.clone(), Some(1)).unwrap();
    assert_eq!(Value::Object(engine.get("test_ttl").unwrap()), sample);

    clock.advance_ms(1_000);
    // Exactly the ttl elapsed: still alive
    assert_eq!(Value::Object(engine.get("test_ttl").unwrap()), sample);

    clock.advance_ms(1);
    assert!(matches!(engine.get("test_ttl"), Err(StashError::ExpiredKey(_))));
    assert!(matches!(engine.get("test_ttl"), Err(StashError::KeyNotFound(_))));
    assert_eq!(persisted_document(&path), json!({}));
}

#[test]
fn test_engine_expired_key_stays_until_read() {
    let (_temp, path, clock, engine) = setup_temp_engine();

    engine.create("short", json!({}), Some(1)).unwrap();
    engine.create("other", json!({}), None).unwrap();
    clock.advance_secs(5);

    // No background sweep
    assert!(engine.contains_key("short"));
    assert!(persisted_document(&path).get("short").is_some());

    engine.get("other").unwrap();
    assert!(engine.contains_key("short"));

    assert!(matches!(engine.get("short"), Err(StashError::ExpiredKey(_))));
    assert!(!engine.contains_key("short"));
}

#[test]
fn test_engine_expired_key_blocks_create_until_read() {
    let (_temp, _path, clock, engine) = setup_temp_engine();

    engine.create("k", json!({}), Some(1)).unwrap();
    clock.advance_secs(2);

    assert!(matches!(
        engine.create("k", json!({}), None),
        Err(StashError::DuplicateKey(_))
    ));

    assert!(matches!(engine.get("k"), Err(StashError::ExpiredKey(_))));
    engine.create("k", json!({}), None).unwrap();
}

#[test]
fn test_engine_expiry_with_system_clock() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("store");
    let buffer = MappedBuffer::open(open_file(&path), 4096).unwrap();
    let engine = Engine::new(buffer, test_config(4096)).unwrap();

    engine.create("k", json!({"v": 1}), Some(1)).unwrap();
    assert!(engine.get("k").is_ok());

    thread::sleep(Duration::from_millis(1_200));

    assert!(matches!(engine.get("k"), Err(StashError::ExpiredKey(_))));
    assert!(matches!(engine.get("k"), Err(StashError::KeyNotFound(_))));
}

// =============================================================================
// Persistence Tests
// =============================================================================

#[test]
fn test_engine_restart_round_trip() {
    let (_temp, path, clock, engine) = setup_temp_engine();

    engine.create("alpha", json!({"n": 1}), None).unwrap();
    engine.create("beta", json!({"list": [1, 2, 3]}), Some(60)).unwrap();
    engine.create("gamma", json!({"nested": {"deep": "yes"}}), None).unwrap();
    engine.delete("beta").unwrap();
    engine.close().unwrap();

    let engine = open_engine(&path, test_config(64 * 1024), clock);

    assert_eq!(engine.keys(), vec!["alpha".to_string(), "gamma".to_string()]);
    assert_eq!(Value::Object(engine.get("alpha").unwrap()), json!({"n": 1}));
    assert_eq!(
        Value::Object(engine.get("gamma").unwrap()),
        json!({"nested": {"deep": "yes"}})
    );
    assert!(matches!(engine.get("beta"), Err(StashError::KeyNotFound(_))));
}

#[test]
fn test_engine_restart_keeps_ttl_and_created_at() {
    let (_temp, path, clock, engine) = setup_temp_engine();

    engine.create("k", json!({}), Some(10)).unwrap();
    drop(engine);

    clock.advance_secs(11);
    let engine = open_engine(&path, test_config(64 * 1024), clock);

    assert!(matches!(engine.get("k"), Err(StashError::ExpiredKey(_))));
}

// =============================================================================
// Capacity Tests
// =============================================================================

#[test]
fn test_engine_capacity_exceeded_rolls_back() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("store");
    let clock = Arc::new(ManualClock::at(START_MS));
    let engine = open_engine(&path, test_config(256), Arc::clone(&clock));

    let mut created = Vec::new();
    let offending = loop {
        let key = format!("key{}", created.len());
        match engine.create(&key, json!({"payload": "0123456789"}), None) {
            Ok(()) => created.push(key),
            Err(StashError::CapacityExceeded { required, capacity }) => {
                assert!(required > capacity);
                assert_eq!(capacity, 256);
                break key;
            }
            Err(e) => panic!("unexpected error: {}", e),
        }
    };

    assert!(!created.is_empty());
    assert!(!engine.contains_key(&offending));
    assert_eq!(engine.len(), created.len());

    // Buffer still holds the last good document
    let persisted = persisted_document(&path);
    assert_eq!(persisted.as_object().unwrap().len(), created.len());
    assert!(persisted.get(&offending).is_none());

    // Still usable after the failure
    engine.delete(&created[0]).unwrap();
    engine.create(&offending, json!({"payload": "0123456789"}), None).unwrap();
    drop(engine);

    let engine = open_engine(&path, test_config(256), clock);
    assert!(engine.get(&offending).is_ok());
    assert!(matches!(engine.get(&created[0]), Err(StashError::KeyNotFound(_))));
}

// =============================================================================
// Concurrent Access Tests
// =============================================================================

#[test]
fn test_engine_concurrent_disjoint_keys() {
    let (_temp, path, clock, engine) = setup_temp_engine();
    let engine = Arc::new(engine);

    let mut handles = vec![];
    for t in 0..4 {
        let engine_clone = Arc::clone(&engine);
        handles.push(thread::spawn(move || {
            for i in 0..25 {
                let key = format!("t{}_k{}", t, i);
                engine_clone.create(&key, json!({"t": t, "i": i}), None).unwrap();
                assert_eq!(
                    Value::Object(engine_clone.get(&key).unwrap()),
                    json!({"t": t, "i": i})
                );
                // Odd keys are deleted again
                if i % 2 == 1 {
                    engine_clone.delete(&key).unwrap();
                }
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(engine.len(), 4 * 13);
    for t in 0..4 {
        for i in 0..25 {
            let key = format!("t{}_k{}", t, i);
            assert_eq!(engine.contains_key(&key), i % 2 == 0);
        }
    }

    // The file agrees with memory after all the interleaved flushes
    let engine = Arc::try_unwrap(engine).unwrap();
    let keys = engine.keys();
    drop(engine);
    let reopened = open_engine(&path, test_config(64 * 1024), clock);
    assert_eq!(reopened.keys(), keys);
}

#[test]
fn test_engine_concurrent_duplicate_create_single_winner() {
    let (_temp, _path, _clock, engine) = setup_temp_engine();
    let engine = Arc::new(engine);

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let engine_clone = Arc::clone(&engine);
            thread::spawn(move || engine_clone.create("shared", json!({ "winner": t }), None).is_ok())
        })
        .collect();

    let winners = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|&won| won)
        .count();

    assert_eq!(winners, 1);
    assert_eq!(engine.len(), 1);
}
