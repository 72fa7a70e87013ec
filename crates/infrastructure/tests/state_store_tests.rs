use scheduler_config::{StateStoreBackend, StateStoreConfig};
use scheduler_core::StateStore;
use scheduler_infrastructure::{InMemoryStateStore, StateStoreFactory};
use std::collections::BTreeMap;
use std::sync::Arc;

#[tokio::test]
async fn test_factory_builds_memory_store() {
    let config = StateStoreConfig {
        backend: StateStoreBackend::Memory,
        ..Default::default()
    };
    let store = StateStoreFactory::create(&config).await.unwrap();
    store.set("k", "v").await.unwrap();
    assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
}

#[tokio::test]
async fn test_set_nx_only_writes_once() {
    let store = InMemoryStateStore::new();
    assert!(store.set_nx("state:batch_size", "10").await.unwrap());
    assert!(!store.set_nx("state:batch_size", "99").await.unwrap());
    assert_eq!(
        store.get("state:batch_size").await.unwrap().as_deref(),
        Some("10")
    );
    assert!(store.del("state:batch_size").await.unwrap());
    assert!(!store.del("state:batch_size").await.unwrap());
}

#[tokio::test]
async fn test_zrange_by_score_orders_and_limits() {
    let store = InMemoryStateStore::new();
    store.zadd("z", "c", 30).await.unwrap();
    store.zadd("z", "a", 10).await.unwrap();
    store.zadd("z", "b", 20).await.unwrap();

    let due = store.zrange_by_score("z", 25, 10).await.unwrap();
    assert_eq!(due, vec![("a".to_string(), 10), ("b".to_string(), 20)]);

    let all = store.zrange_by_score("z", i64::MAX, 2).await.unwrap();
    assert_eq!(all.len(), 2);
}

#[tokio::test]
async fn test_hash_operations() {
    let store = InMemoryStateStore::new();
    store.hset("cursors:r1", "1_current", "3").await.unwrap();
    store.hset("cursors:r1", "1_total", "9").await.unwrap();

    let all = store.hgetall("cursors:r1").await.unwrap();
    let expected: BTreeMap<String, String> = [
        ("1_current".to_string(), "3".to_string()),
        ("1_total".to_string(), "9".to_string()),
    ]
    .into_iter()
    .collect();
    assert_eq!(all, expected);

    assert!(store.hdel("cursors:r1", "1_current").await.unwrap());
    assert_eq!(store.hget("cursors:r1", "1_current").await.unwrap(), None);
    assert!(store.hgetall("missing").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_concurrent_claims_never_duplicate() {
    let store = Arc::new(InMemoryStateStore::new());
    for i in 0..50 {
        store.zadd("delayed", &format!("job-{i}"), i).await.unwrap();
    }

    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            let mut claimed = Vec::new();
            while let Some(member) = store.claim_due("delayed", 1_000).await.unwrap() {
                claimed.push(member);
            }
            claimed
        }));
    }

    let mut all = Vec::new();
    for handle in handles {
        all.extend(handle.await.unwrap());
    }
    all.sort();
    all.dedup();
    assert_eq!(all.len(), 50);
    assert_eq!(store.zcard("delayed").await.unwrap(), 0);
}
