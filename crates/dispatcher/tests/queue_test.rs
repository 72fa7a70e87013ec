use serde_json::{json, Map};

use scheduler_core::{now_millis, DispatchMode, StateStore};
use scheduler_dispatcher::queue::{DELAYED_KEY, QUEUE_KEY};
use scheduler_dispatcher::{JobQueue, SubQueue};
use scheduler_testing_utils::{memory_store, JobBuilder};

fn queue() -> JobQueue {
    JobQueue::new(memory_store())
}

#[tokio::test]
async fn test_fifo_order() {
    let queue = queue();
    for wf in ["a", "b", "c"] {
        queue
            .enqueue(wf, json!({}), DispatchMode::ById, Map::new(), 0)
            .await
            .unwrap();
    }

    let mut order = Vec::new();
    while let Some(job) = queue.dequeue().await.unwrap() {
        order.push(job.workflow);
    }
    assert_eq!(order, vec!["a", "b", "c"]);
}

#[tokio::test]
async fn test_enqueue_ack_reports_target_and_depth() {
    let queue = queue();
    let first = queue
        .enqueue("a", json!({}), DispatchMode::ById, Map::new(), 0)
        .await
        .unwrap();
    assert_eq!(first.target, SubQueue::Ready);
    assert_eq!(first.depth, 1);
    assert!(first.ready_at.is_none());

    let before = now_millis();
    let delayed = queue
        .enqueue("b", json!({}), DispatchMode::ByFile, Map::new(), 60_000)
        .await
        .unwrap();
    assert_eq!(delayed.target, SubQueue::Delayed);
    assert_eq!(delayed.depth, 1);
    assert!(delayed.ready_at.unwrap() >= before + 60_000);

    assert_eq!(queue.size().await.unwrap(), 1);
    assert_eq!(queue.delayed_size().await.unwrap(), 1);
}

#[tokio::test]
async fn test_delay_is_honoured() {
    let queue = queue();
    queue
        .enqueue("later", json!({}), DispatchMode::ById, Map::new(), 300)
        .await
        .unwrap();

    assert!(queue.dequeue().await.unwrap().is_none());
    tokio::time::sleep(std::time::Duration::from_millis(350)).await;
    let job = queue.dequeue().await.unwrap().unwrap();
    assert_eq!(job.workflow, "later");
}

#[tokio::test]
async fn test_ready_delayed_entries_come_first() {
    let store = memory_store();
    let queue = JobQueue::new(store.clone());
    queue
        .enqueue("plain", json!({}), DispatchMode::ById, Map::new(), 0)
        .await
        .unwrap();

    let due = JobBuilder::new().with_workflow("due").build();
    store
        .zadd(DELAYED_KEY, &due.to_json().unwrap(), now_millis() - 1)
        .await
        .unwrap();

    assert_eq!(queue.dequeue().await.unwrap().unwrap().workflow, "due");
    assert_eq!(queue.dequeue().await.unwrap().unwrap().workflow, "plain");
}

#[tokio::test]
async fn test_malformed_entries_are_skipped() {
    let store = memory_store();
    let queue = JobQueue::new(store.clone());
    store.lpush(QUEUE_KEY, "{not json").await.unwrap();
    store.lpush(QUEUE_KEY, r#"{"mode":"id"}"#).await.unwrap();
    queue
        .enqueue("good", json!({}), DispatchMode::ById, Map::new(), 0)
        .await
        .unwrap();

    let job = queue.dequeue().await.unwrap().unwrap();
    assert_eq!(job.workflow, "good");
    assert_eq!(queue.size().await.unwrap(), 0);
}

#[tokio::test]
async fn test_requeue_keeps_identity() {
    let queue = queue();
    let job = JobBuilder::new()
        .with_workflow("wf")
        .with_phase("2")
        .with_retry_count(3)
        .build();

    queue.requeue(&job, 0).await.unwrap();
    let back = queue.dequeue().await.unwrap().unwrap();
    assert_eq!(back.id, job.id);
    assert_eq!(back.retry_count, 3);
    assert_eq!(back.meta, job.meta);
}

#[tokio::test]
async fn test_empty_workflow_is_rejected() {
    let queue = queue();
    let result = queue
        .enqueue("  ", json!({}), DispatchMode::ById, Map::new(), 0)
        .await;
    assert!(result.is_err());
    assert_eq!(queue.size().await.unwrap(), 0);
}

#[tokio::test]
async fn test_list_and_clear() {
    let queue = queue();
    for wf in ["a", "b", "c"] {
        queue
            .enqueue(wf, json!({}), DispatchMode::ById, Map::new(), 0)
            .await
            .unwrap();
    }
    queue
        .enqueue("d", json!({}), DispatchMode::ById, Map::new(), 60_000)
        .await
        .unwrap();

    let listed: Vec<String> = queue
        .list_jobs(2)
        .await
        .unwrap()
        .into_iter()
        .map(|j| j.workflow)
        .collect();
    assert_eq!(listed, vec!["a", "b"]);

    let delayed = queue.list_delayed(10).await.unwrap();
    assert_eq!(delayed.len(), 1);
    assert_eq!(delayed[0].job.workflow, "d");
    assert!(!delayed[0].is_ready(now_millis()));

    assert_eq!(queue.clear().await.unwrap(), (3, 1));
    assert_eq!(queue.size().await.unwrap(), 0);
    assert_eq!(queue.delayed_size().await.unwrap(), 0);
}

#[tokio::test]
async fn test_cursor_operations() {
    let queue = queue();
    queue.set_cursor("run-1", "1_current", 4).await.unwrap();
    queue.set_cursor("run-1", "1_total", 10).await.unwrap();

    assert_eq!(queue.get_cursor("run-1", "1_current").await.unwrap(), Some(4));
    assert_eq!(queue.get_cursor("run-1", "missing").await.unwrap(), None);
    assert_eq!(queue.get_all_cursors("run-1").await.unwrap().len(), 2);

    assert!(queue.reset_cursors("run-1").await.unwrap());
    assert!(queue.get_all_cursors("run-1").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_oversized_delay_saturates_instead_of_wrapping() {
    let queue = queue();
    let job = JobBuilder::new().with_workflow("later").build();

    let ack = queue.requeue(&job, u64::MAX).await.unwrap();
    assert_eq!(ack.target, SubQueue::Delayed);
    assert_eq!(ack.ready_at, Some(i64::MAX));

    assert!(queue.dequeue().await.unwrap().is_none());
    assert_eq!(queue.delayed_size().await.unwrap(), 1);
}
