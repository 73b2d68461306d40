#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Integration tests for the key-value store
//!
//! # Test Coverage
//!
//! - miss and write-visibility semantics
//! - journal replay after reopen in strict and batched modes
//! - compaction, torn tails, corrupt journals
//! - concurrent writers from many threads

mod common;

use common::journal::{journal_lines, temp_journal};
use edgerun::store::{DurabilityMode, InvalidKeyReason, KvStore, StoreError, MAX_KEY_LEN};
use serde_json::{json, Value};
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::{Arc, Barrier};

#[test]
fn test_get_never_set_is_absent() {
    let store = KvStore::in_memory();
    let longest = "k".repeat(MAX_KEY_LEN);
    for key in ["counter", "a", "unicode-ключ", longest.as_str()] {
        assert_eq!(store.get(key).unwrap(), None, "{key}");
    }
}

#[test]
fn test_set_is_visible_until_overwritten() {
    let store = KvStore::in_memory();
    let values = [json!(0), json!("text"), json!({"nested": [1, 2]}), Value::Null];
    for v in values {
        store.set("k", v.clone()).unwrap();
        assert_eq!(store.get("k").unwrap(), Some(v.clone()));
        assert_eq!(store.get("k").unwrap(), Some(v));
    }
}

#[test]
fn test_invalid_keys() {
    let store = KvStore::in_memory();
    let too_long = "x".repeat(MAX_KEY_LEN + 1);
    let cases = [
        ("", InvalidKeyReason::Empty),
        (too_long.as_str(), InvalidKeyReason::TooLong { len: MAX_KEY_LEN + 1 }),
        ("bad\nkey", InvalidKeyReason::ControlCharacter { index: 3 }),
    ];
    for (key, expected) in cases {
        match store.set(key, json!(1)) {
            Err(StoreError::InvalidKey { reason, .. }) => assert_eq!(reason, expected),
            other => panic!("expected InvalidKey for {key:?}, got {other:?}"),
        }
    }
    assert!(store.is_empty());
}

#[test]
fn test_strict_journal_replays_after_reopen() {
    let (_dir, path) = temp_journal();
    {
        let store = KvStore::open(&path, DurabilityMode::Strict).unwrap();
        store.set("counter", json!(0)).unwrap();
        store.set("counter", json!(1)).unwrap();
        store.set("scratch", json!("tmp")).unwrap();
        assert!(store.delete("scratch").unwrap());
    }
    let store = KvStore::open(&path, DurabilityMode::Strict).unwrap();
    assert_eq!(store.get("counter").unwrap(), Some(json!(1)));
    assert_eq!(store.get("scratch").unwrap(), None);
    assert_eq!(store.keys(), vec!["counter".to_string()]);

    let lines = journal_lines(&path);
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[3], json!({"op": "delete", "key": "scratch"}));
}

#[test]
fn test_batched_journal_flushes_on_drop() {
    let (_dir, path) = temp_journal();
    let mode = DurabilityMode::Batched {
        interval_ms: 60_000,
        batch_size: 1_000,
    };
    {
        let store = KvStore::open(&path, mode).unwrap();
        for i in 0..10 {
            store.set(&format!("k{i}"), json!(i)).unwrap();
        }
        // Nothing forced a sync yet; dropping the last handle must.
    }
    let store = KvStore::open(&path, mode).unwrap();
    assert_eq!(store.len(), 10);
    assert_eq!(store.get("k7").unwrap(), Some(json!(7)));
}

#[test]
fn test_batched_flush_writes_through() {
    let (_dir, path) = temp_journal();
    let store = KvStore::open(
        &path,
        DurabilityMode::Batched {
            interval_ms: 60_000,
            batch_size: 1_000,
        },
    )
    .unwrap();
    store.set("a", json!(1)).unwrap();
    store.flush().unwrap();
    assert_eq!(journal_lines(&path).len(), 1);
}

#[test]
fn test_none_mode_ignores_path() {
    let (_dir, path) = temp_journal();
    let store = KvStore::open(&path, DurabilityMode::None).unwrap();
    store.set("a", json!(1)).unwrap();
    assert!(!path.exists());
}

#[test]
fn test_compact_keeps_only_live_entries() {
    let (_dir, path) = temp_journal();
    let store = KvStore::open(&path, DurabilityMode::Strict).unwrap();
    for i in 0..50 {
        store.set("counter", json!(i)).unwrap();
    }
    store.set("gone", json!(true)).unwrap();
    store.delete("gone").unwrap();
    assert_eq!(journal_lines(&path).len(), 52);

    assert_eq!(store.compact().unwrap(), 1);
    assert_eq!(
        journal_lines(&path),
        vec![json!({"op": "set", "key": "counter", "value": 49})]
    );

    // Writes after compaction land in the new journal.
    store.set("after", json!("x")).unwrap();
    drop(store);
    let store = KvStore::open(&path, DurabilityMode::Strict).unwrap();
    assert_eq!(store.get("counter").unwrap(), Some(json!(49)));
    assert_eq!(store.get("after").unwrap(), Some(json!("x")));
}

#[test]
fn test_compact_leaves_sibling_journals_alone() {
    let dir = tempfile::tempdir().unwrap();
    let journal = dir.path().join("a.journal");
    let sibling = dir.path().join("a.log");
    let oddly_named = dir.path().join("a.compact");

    let stores: Vec<KvStore> = [&journal, &sibling, &oddly_named]
        .iter()
        .enumerate()
        .map(|(i, path)| {
            let store = KvStore::open(path, DurabilityMode::Strict).unwrap();
            store.set("owner", json!(i)).unwrap();
            store.set("owner", json!(i * 10)).unwrap();
            store
        })
        .collect();
    for store in &stores {
        assert_eq!(store.compact().unwrap(), 1);
    }
    drop(stores);

    for (i, path) in [&journal, &sibling, &oddly_named].iter().enumerate() {
        assert_eq!(
            journal_lines(path),
            vec![json!({"op": "set", "key": "owner", "value": i * 10})]
        );
    }
    let leftovers: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty(), "{leftovers:?}");
}

#[test]
fn test_torn_tail_is_discarded() {
    let (_dir, path) = temp_journal();
    {
        let store = KvStore::open(&path, DurabilityMode::Strict).unwrap();
        store.set("counter", json!(3)).unwrap();
    }
    {
        let mut f = OpenOptions::new().append(true).open(&path).unwrap();
        f.write_all(br#"{"op":"set","key":"counter","val"#).unwrap();
    }
    let store = KvStore::open(&path, DurabilityMode::Strict).unwrap();
    assert_eq!(store.get("counter").unwrap(), Some(json!(3)));

    // The journal is usable again: the next write starts on a clean line.
    store.set("counter", json!(4)).unwrap();
    drop(store);
    let store = KvStore::open(&path, DurabilityMode::Strict).unwrap();
    assert_eq!(store.get("counter").unwrap(), Some(json!(4)));
    assert_eq!(journal_lines(&path).len(), 2);
}

#[test]
fn test_corrupt_middle_line_is_an_error() {
    let (_dir, path) = temp_journal();
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(
        &path,
        "{\"op\":\"set\",\"key\":\"a\",\"value\":1}\nnot json\n{\"op\":\"set\",\"key\":\"b\",\"value\":2}\n",
    )
    .unwrap();
    match KvStore::open(&path, DurabilityMode::Strict) {
        Err(StoreError::CorruptJournal { line, .. }) => assert_eq!(line, 2),
        other => panic!("expected CorruptJournal, got {other:?}"),
    }
}

#[test]
fn test_closed_store_rejects_writes_but_serves_reads() {
    let (_dir, path) = temp_journal();
    let store = KvStore::open(&path, DurabilityMode::Strict).unwrap();
    store.set("k", json!(1)).unwrap();
    store.close().unwrap();
    assert!(matches!(store.set("k", json!(2)), Err(StoreError::Closed)));
    assert!(matches!(store.compact(), Err(StoreError::Closed)));
    assert_eq!(store.get("k").unwrap(), Some(json!(1)));
}

#[test]
fn test_concurrent_writers_distinct_keys() {
    let (_dir, path) = temp_journal();
    let store = KvStore::open(&path, DurabilityMode::buffered_default()).unwrap();
    let threads = 8;
    let per_thread = 200;
    let barrier = Arc::new(Barrier::new(threads));

    std::thread::scope(|s| {
        for t in 0..threads {
            let store = store.clone();
            let barrier = Arc::clone(&barrier);
            s.spawn(move || {
                barrier.wait();
                for i in 0..per_thread {
                    store.set(&format!("t{t}-{i}"), json!(i)).unwrap();
                }
            });
        }
    });

    assert_eq!(store.len(), threads * per_thread);
    store.flush().unwrap();
    drop(store);
    let reopened = KvStore::open(&path, DurabilityMode::Strict).unwrap();
    assert_eq!(reopened.len(), threads * per_thread);
}

#[test]
fn test_concurrent_writers_same_key_replay_matches_memory() {
    let (_dir, path) = temp_journal();
    let store = KvStore::open(&path, DurabilityMode::Strict).unwrap();
    std::thread::scope(|s| {
        for t in 0..4 {
            let store = store.clone();
            s.spawn(move || {
                for i in 0..50 {
                    store.set("shared", json!(t * 1000 + i)).unwrap();
                }
            });
        }
    });
    let in_memory = store.get("shared").unwrap();
    drop(store);
    // Journal order equals commit order, so replay lands on the same winner.
    let reopened = KvStore::open(&path, DurabilityMode::Strict).unwrap();
    assert_eq!(reopened.get("shared").unwrap(), in_memory);
}
