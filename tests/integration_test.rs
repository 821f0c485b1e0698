use std::sync::atomic::{AtomicUsize, Ordering};

use record_map::store::memory::MemoryStore;
use record_map::store::RemoteStore;
use record_map::{Error, LockOptions, Record, RecordSchema, Registry, TypeDesc, Value};

fn schema() -> RecordSchema {
    RecordSchema::builder("tests.Counter")
        .field("count", TypeDesc::INT, 0i64)
        .field("name", TypeDesc::Str, "anonymous")
        .field("flag", TypeDesc::Bool, false)
        .field(
            "tags",
            TypeDesc::map(TypeDesc::Str, TypeDesc::INT),
            Value::Map(Vec::new()),
        )
        .build()
        .unwrap()
}

async fn open(store: &MemoryStore) -> Record {
    Registry::new().open(store, schema()).await.unwrap()
}

#[tokio::test]
async fn test_default_values() {
    let store = MemoryStore::new();
    let record = open(&store).await;

    assert_eq!(record.get(&store, "count").await.unwrap(), Value::Int(0));
    assert_eq!(
        record.get(&store, "name").await.unwrap(),
        Value::Str("anonymous".to_string())
    );
    assert_eq!(record.get(&store, "flag").await.unwrap(), Value::Bool(false));
}

#[tokio::test]
async fn test_scalar_round_trip() {
    let store = MemoryStore::new();
    let record = open(&store).await;

    record.set(&store, "count", 42i64).await.unwrap();
    record.set(&store, "name", "bob").await.unwrap();
    record.set(&store, "flag", true).await.unwrap();

    assert_eq!(record.get(&store, "count").await.unwrap(), Value::Int(42));
    assert_eq!(
        record.get(&store, "name").await.unwrap(),
        Value::Str("bob".to_string())
    );
    assert_eq!(record.get(&store, "flag").await.unwrap(), Value::Bool(true));
}

#[tokio::test]
async fn test_null_write_deletes_key() {
    let store = MemoryStore::new();
    let record = open(&store).await;

    record.set(&store, "name", "bob").await.unwrap();
    assert!(store.get("tests.Counter.name").await.unwrap().is_some());

    record.set(&store, "name", Value::None).await.unwrap();
    assert!(store.get("tests.Counter.name").await.unwrap().is_none());
    assert_eq!(
        record.get(&store, "name").await.unwrap(),
        Value::Str("anonymous".to_string())
    );
}

#[tokio::test]
async fn test_unknown_field() {
    let store = MemoryStore::new();
    let record = open(&store).await;

    assert!(matches!(
        record.get(&store, "missing").await,
        Err(Error::UnknownField(_))
    ));
}

#[tokio::test]
async fn test_map_view_operations() {
    let store = MemoryStore::new();
    let record = open(&store).await;
    let tags = record.map_view("tags").unwrap();

    assert!(tags.is_empty(&store).await.unwrap());
    assert_eq!(tags.get(&store, &Value::from("a")).await.unwrap(), None);

    tags.insert(&store, "a", 1i64).await.unwrap();
    tags.insert(&store, "b", 2i64).await.unwrap();

    assert_eq!(
        tags.get(&store, &Value::from("a")).await.unwrap(),
        Some(Value::Int(1))
    );
    assert!(tags.contains(&store, &Value::from("b")).await.unwrap());
    assert_eq!(tags.len(&store).await.unwrap(), 2);

    tags.remove(&store, &Value::from("a")).await.unwrap();
    assert!(!tags.contains(&store, &Value::from("a")).await.unwrap());

    tags.insert(&store, "a", 3i64).await.unwrap();
    let snapshot = tags.snapshot(&store).await.unwrap();
    assert_eq!(
        snapshot,
        vec![
            (Value::from("a"), Value::Int(3)),
            (Value::from("b"), Value::Int(2)),
        ]
    );
    assert_eq!(
        tags.keys(&store).await.unwrap(),
        vec![Value::from("a"), Value::from("b")]
    );
    assert_eq!(
        tags.values(&store).await.unwrap(),
        vec![Value::Int(3), Value::Int(2)]
    );
}

#[tokio::test]
async fn test_whole_field_replace() {
    let store = MemoryStore::new();
    let record = open(&store).await;

    record
        .set(
            &store,
            "tags",
            Value::Map(vec![(Value::from("x"), Value::Int(1))]),
        )
        .await
        .unwrap();
    assert_eq!(store.hlen("tests.Counter.tags").await.unwrap(), 1);

    record
        .set(&store, "tags", Value::Map(Vec::new()))
        .await
        .unwrap();
    assert_eq!(store.hlen("tests.Counter.tags").await.unwrap(), 0);
    assert!(store.hgetall("tests.Counter.tags").await.unwrap().is_empty());

    let tags = record.map_view("tags").unwrap();
    assert!(!tags.contains(&store, &Value::from("x")).await.unwrap());
}

#[tokio::test]
async fn test_scalar_read_of_map_field_fails() {
    let store = MemoryStore::new();
    let record = open(&store).await;

    assert!(matches!(
        record.get(&store, "tags").await,
        Err(Error::MapFieldRead(_))
    ));
    assert!(matches!(
        record.map_view("count"),
        Err(Error::NotAMapField(_))
    ));
}

#[test]
fn test_nested_map_is_a_registration_error() {
    let nested = RecordSchema::builder("tests.Nested")
        .field(
            "broken",
            TypeDesc::map(TypeDesc::Str, TypeDesc::map(TypeDesc::Str, TypeDesc::INT)),
            Value::Map(Vec::new()),
        )
        .build();
    assert!(matches!(nested, Err(Error::NestedContainer(_))));

    let wide = RecordSchema::builder("tests.Wide")
        .field(
            "n",
            TypeDesc::Int {
                width: 9,
                signed: true,
            },
            0i64,
        )
        .build();
    assert!(matches!(wide, Err(Error::InvalidIntWidth { .. })));
}

#[tokio::test]
async fn test_schema_change_resets_data() {
    let store = MemoryStore::new();

    let record = open(&store).await;
    record.set(&store, "count", 5i64).await.unwrap();

    // Same field set, new process: data survives.
    let record = Registry::new().open(&store, schema()).await.unwrap();
    assert_eq!(record.get(&store, "count").await.unwrap(), Value::Int(5));

    // Changed field set under the same qualified name: data is wiped.
    let changed = RecordSchema::builder("tests.Counter")
        .field("count", TypeDesc::Str, "none")
        .build()
        .unwrap();
    let record = Registry::new().open(&store, changed).await.unwrap();
    assert_eq!(
        record.get(&store, "count").await.unwrap(),
        Value::Str("none".to_string())
    );
    assert!(store.get("tests.Counter.count").await.unwrap().is_none());
}

#[tokio::test]
async fn test_registry_returns_one_instance() {
    let store = MemoryStore::new();
    let registry = Registry::new();
    let first = registry.open(&store, schema()).await.unwrap();
    let second = registry.open(&store, schema()).await.unwrap();

    // Staged state is visible through both handles: one shared instance.
    first
        .with_lock(&store, LockOptions::local_copy(), || async {
            first.set(&store, "count", 7i64).await?;
            assert_eq!(second.get(&store, "count").await?, Value::Int(7));
            Ok::<(), Error>(())
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn test_lock_direct_increments() {
    let store = MemoryStore::new();
    let record = open(&store).await;

    for _ in 0..10 {
        record
            .with_lock(&store, LockOptions::direct(), || async {
                let count = record.get(&store, "count").await?.as_int().unwrap_or(0);
                record.set(&store, "count", count + 1).await
            })
            .await
            .unwrap();
    }
    assert_eq!(record.get(&store, "count").await.unwrap(), Value::Int(10));
}

#[tokio::test]
async fn test_lock_local_copy_defers_writes() {
    let store = MemoryStore::new();
    let record = open(&store).await;
    record.set(&store, "count", 1i64).await.unwrap();

    record
        .with_lock(&store, LockOptions::local_copy(), || async {
            record.set(&store, "count", 2i64).await?;
            record.set(&store, "name", "staged").await?;
            // An outside reader still sees the pre-session bytes.
            assert_eq!(
                store.get("tests.Counter.count").await?,
                Some(vec![0, 0, 0, 1])
            );
            assert!(store.get("tests.Counter.name").await?.is_none());
            // The session itself reads its own staged values.
            assert_eq!(record.get(&store, "count").await?, Value::Int(2));
            Ok::<(), Error>(())
        })
        .await
        .unwrap();

    assert_eq!(record.get(&store, "count").await.unwrap(), Value::Int(2));
    assert_eq!(
        record.get(&store, "name").await.unwrap(),
        Value::Str("staged".to_string())
    );
}

#[tokio::test]
async fn test_lock_serializes_concurrent_tasks() {
    let store = MemoryStore::new();
    let record = open(&store).await;

    let mut handles = Vec::new();
    for _ in 0..4 {
        let store = store.clone();
        let record = record.clone();
        handles.push(tokio::spawn(async move {
            for _ in 0..25 {
                record
                    .with_lock(&store, LockOptions::direct(), || async {
                        let count = record.get(&store, "count").await?.as_int().unwrap_or(0);
                        record.set(&store, "count", count + 1).await
                    })
                    .await
                    .unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
    assert_eq!(record.get(&store, "count").await.unwrap(), Value::Int(100));
}

#[tokio::test]
async fn test_stale_view_detection() {
    let store = MemoryStore::new();
    let record = open(&store).await;
    let before = record.map_view("tags").unwrap();
    before.insert(&store, "early", 1i64).await.unwrap();

    record
        .with_lock(&store, LockOptions::local_copy(), || async {
            // The view predates the session buffer: it must not touch the hash.
            assert!(matches!(before.len(&store).await, Err(Error::StaleView)));
            assert!(matches!(
                before.insert(&store, "x", 1i64).await,
                Err(Error::StaleView)
            ));
            // A view created inside the session reads and writes the buffer.
            let inside = record.map_view("tags")?;
            inside.insert(&store, "staged", 2i64).await?;
            assert_eq!(inside.len(&store).await?, 2);
            Ok::<(), Error>(())
        })
        .await
        .unwrap();

    // The buffer is detached again: the old view works.
    assert_eq!(before.len(&store).await.unwrap(), 2);
    assert_eq!(
        before.get(&store, &Value::from("staged")).await.unwrap(),
        Some(Value::Int(2))
    );
}

#[tokio::test]
async fn test_sessions_are_not_reentrant() {
    let store = MemoryStore::new();
    let record = open(&store).await;

    let result = record
        .with_lock(&store, LockOptions::local_copy(), || async {
            record
                .with_transaction(&store, |_ctl| async { Ok::<(), Error>(()) })
                .await
        })
        .await;
    assert!(matches!(result, Err(Error::SessionActive)));

    // The outer lock and buffer were torn down; a fresh session works.
    record
        .with_lock(&store, LockOptions::local_copy(), || async {
            record.set(&store, "count", 1i64).await
        })
        .await
        .unwrap();
    assert_eq!(record.get(&store, "count").await.unwrap(), Value::Int(1));
}

#[tokio::test]
async fn test_flush_policy_on_body_error() {
    let store = MemoryStore::new();
    let record = open(&store).await;

    // Default: a body error still flushes the staged writes.
    let result = record
        .with_lock(&store, LockOptions::local_copy(), || async {
            record.set(&store, "count", 5i64).await?;
            Err::<(), Error>(Error::Serialization("boom".to_string()))
        })
        .await;
    assert!(matches!(result, Err(Error::Serialization(_))));
    assert_eq!(record.get(&store, "count").await.unwrap(), Value::Int(5));

    // Opt-in: a body error discards them.
    let result = record
        .with_lock(
            &store,
            LockOptions::local_copy().discard_on_error(true),
            || async {
                record.set(&store, "count", 9i64).await?;
                Err::<(), Error>(Error::Serialization("boom".to_string()))
            },
        )
        .await;
    assert!(matches!(result, Err(Error::Serialization(_))));
    assert_eq!(record.get(&store, "count").await.unwrap(), Value::Int(5));
}

#[tokio::test]
async fn test_transaction_commits() {
    let store = MemoryStore::new();
    let record = open(&store).await;

    record
        .with_transaction(&store, |_ctl| async {
            let count = record.get(&store, "count").await?.as_int().unwrap_or(0);
            record.set(&store, "count", count + 1).await?;
            let tags = record.map_view("tags")?;
            tags.insert(&store, "first", 1i64).await?;
            Ok::<(), Error>(())
        })
        .await
        .unwrap();

    assert_eq!(record.get(&store, "count").await.unwrap(), Value::Int(1));
    let tags = record.map_view("tags").unwrap();
    assert_eq!(
        tags.get(&store, &Value::from("first")).await.unwrap(),
        Some(Value::Int(1))
    );
}

#[tokio::test]
async fn test_transaction_conflict_applies_nothing() {
    let store = MemoryStore::new();
    let record = open(&store).await;

    let result = record
        .with_transaction(&store, |_ctl| async {
            record.set(&store, "count", 5i64).await?;
            record.set(&store, "name", "mine").await?;
            // An external writer mutates a watched key before commit.
            store.set("tests.Counter.count", vec![0, 0, 0, 42]).await?;
            Ok::<(), Error>(())
        })
        .await;

    assert!(matches!(result, Err(Error::Conflict)));
    assert!(result.unwrap_err().is_conflict());
    // None of the staged writes landed; the external write survives.
    assert_eq!(record.get(&store, "count").await.unwrap(), Value::Int(42));
    assert_eq!(
        record.get(&store, "name").await.unwrap(),
        Value::Str("anonymous".to_string())
    );
}

#[tokio::test]
async fn test_transaction_discard() {
    let store = MemoryStore::new();
    let record = open(&store).await;

    let handle = record.clone();
    let backend = store.clone();
    record
        .with_transaction(&store, |ctl| async move {
            handle.set(&backend, "count", 5i64).await?;
            ctl.discard();
            Ok::<(), Error>(())
        })
        .await
        .unwrap();

    assert_eq!(record.get(&store, "count").await.unwrap(), Value::Int(0));
}

#[tokio::test]
async fn test_transaction_body_error_aborts() {
    let store = MemoryStore::new();
    let record = open(&store).await;

    let result = record
        .with_transaction(&store, |_ctl| async {
            record.set(&store, "count", 5i64).await?;
            Err::<(), Error>(Error::Serialization("boom".to_string()))
        })
        .await;

    assert!(matches!(result, Err(Error::Serialization(_))));
    assert_eq!(record.get(&store, "count").await.unwrap(), Value::Int(0));
}

#[tokio::test]
async fn test_transaction_retry_succeeds_after_conflict() {
    let store = MemoryStore::new();
    let record = open(&store).await;
    let attempts = AtomicUsize::new(0);

    record
        .with_transaction_retry(&store, 5, |_ctl| async {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst);
            if attempt == 0 {
                // Induce a conflict on the first run only.
                store.set("tests.Counter.count", vec![0, 0, 0, 1]).await?;
            }
            let count = record.get(&store, "count").await?.as_int().unwrap_or(0);
            record.set(&store, "count", count + 1).await
        })
        .await
        .unwrap();

    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert_eq!(record.get(&store, "count").await.unwrap(), Value::Int(2));
}

#[tokio::test]
async fn test_read_all() {
    let store = MemoryStore::new();
    let record = open(&store).await;
    record.set(&store, "count", 3i64).await.unwrap();
    let tags = record.map_view("tags").unwrap();
    tags.insert(&store, "a", 1i64).await.unwrap();

    let all = record.read_all(&store).await.unwrap();
    assert_eq!(
        all,
        vec![
            ("count".to_string(), Value::Int(3)),
            ("name".to_string(), Value::Str("anonymous".to_string())),
            ("flag".to_string(), Value::Bool(false)),
            (
                "tags".to_string(),
                Value::Map(vec![(Value::from("a"), Value::Int(1))])
            ),
        ]
    );
}

#[tokio::test]
async fn test_counter_scenario() {
    let store = MemoryStore::new();
    let record = Registry::new()
        .open(
            &store,
            RecordSchema::builder("tests.Scenario")
                .field("count", TypeDesc::INT, 0i64)
                .field(
                    "tags",
                    TypeDesc::map(TypeDesc::Str, TypeDesc::INT),
                    Value::Map(Vec::new()),
                )
                .build()
                .unwrap(),
        )
        .await
        .unwrap();

    for _ in 0..3000 {
        record
            .with_lock(&store, LockOptions::local_copy(), || async {
                let count = record.get(&store, "count").await?.as_int().unwrap_or(0) + 1;
                record.set(&store, "count", count).await?;
                let tags = record.map_view("tags")?;
                tags.insert(&store, count.to_string(), count).await?;
                Ok::<(), Error>(())
            })
            .await
            .unwrap();
    }

    assert_eq!(record.get(&store, "count").await.unwrap(), Value::Int(3000));
    let tags = record.map_view("tags").unwrap();
    assert_eq!(tags.len(&store).await.unwrap(), 3000);
    assert_eq!(
        tags.get(&store, &Value::from("3000")).await.unwrap(),
        Some(Value::Int(3000))
    );
}
