use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Map};
use tempfile::TempDir;
use tokio::sync::broadcast;

use scheduler_core::{now_millis, DispatchMode, JobStatus, StateStore};
use scheduler_dispatcher::auto_refiller::DEFAULT_COOLDOWN;
use scheduler_dispatcher::batch_sizer::{SIZE_KEY, STATS_KEY};
use scheduler_dispatcher::{
    AdaptiveBatchSizer, AutoRefiller, DispatchOutcome, JobQueue, JobScheduler, PhaseGate,
    RetryPolicy, SchedulerSettings,
};
use scheduler_infrastructure::{LocalCursorFile, SchedulerMetrics};
use scheduler_testing_utils::{
    memory_store, FaultyStateStore, JobBuilder, MockExecutionBackend, RecordingJobLog,
    RecordingLauncher, TestEnv,
};

struct SchedulerFixture {
    _dir: TempDir,
    store: Arc<dyn StateStore>,
    queue: JobQueue,
    backend: MockExecutionBackend,
    job_log: RecordingJobLog,
    launcher: RecordingLauncher,
    gate: Arc<PhaseGate>,
    scheduler: JobScheduler,
}

impl SchedulerFixture {
    async fn new(settings: SchedulerSettings) -> Self {
        Self::with_store(settings, memory_store()).await
    }

    async fn with_store(settings: SchedulerSettings, store: Arc<dyn StateStore>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let queue = JobQueue::new(store.clone());
        let backend = MockExecutionBackend::new();
        let job_log = RecordingJobLog::new();
        let launcher = RecordingLauncher::new();

        let sizer = Arc::new(AdaptiveBatchSizer::new(store.clone(), 10, 1.0).await.unwrap());
        let gate = Arc::new(PhaseGate::new(
            store.clone(),
            LocalCursorFile::new(dir.path().join("cursors.json")),
        ));
        let refiller = Arc::new(AutoRefiller::new(
            Arc::new(launcher.clone()),
            DEFAULT_COOLDOWN,
        ));

        let scheduler = JobScheduler::new(
            queue.clone(),
            Arc::new(backend.clone()),
            sizer,
            gate.clone(),
            refiller,
            Arc::new(job_log.clone()),
            SchedulerMetrics::new(),
            settings,
        );

        Self {
            _dir: dir,
            store,
            queue,
            backend,
            job_log,
            launcher,
            gate,
            scheduler,
        }
    }

    async fn enqueue(&self, workflow: &str) {
        self.queue
            .enqueue(workflow, json!({}), DispatchMode::ById, Map::new(), 0)
            .await
            .unwrap();
    }
}

fn settings(concurrency_limit: usize) -> SchedulerSettings {
    SchedulerSettings {
        concurrency_limit,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_scenario_a_dispatches_up_to_free_slots() {
    let fixture = SchedulerFixture::new(settings(2)).await;
    for wf in ["a", "b", "c"] {
        fixture.enqueue(wf).await;
    }

    let report = fixture.scheduler.tick().await.unwrap();
    assert_eq!(report.slots, 2);
    assert_eq!(report.queued, 3);
    assert_eq!(report.dispatched, 2);
    assert_eq!(report.succeeded, 2);
    assert_eq!(fixture.backend.execution_count(), 2);
    assert_eq!(fixture.queue.size().await.unwrap(), 1);

    let workflows: Vec<String> = fixture
        .backend
        .requests()
        .into_iter()
        .map(|r| r.workflow)
        .collect();
    assert_eq!(workflows, vec!["a", "b"]);
}

#[tokio::test]
async fn test_full_concurrency_dispatches_nothing() {
    let fixture = SchedulerFixture::new(settings(2)).await;
    fixture.backend.set_active(5);
    fixture.enqueue("a").await;

    let report = fixture.scheduler.tick().await.unwrap();
    assert_eq!(report.slots, 0);
    assert_eq!(report.dispatched, 0);
    assert_eq!(fixture.queue.size().await.unwrap(), 1);
}

#[tokio::test]
async fn test_count_failure_fails_the_tick() {
    let fixture = SchedulerFixture::new(settings(2)).await;
    fixture.backend.fail_count_active(true);
    fixture.enqueue("a").await;

    assert!(fixture.scheduler.tick().await.is_err());
    assert_eq!(fixture.queue.size().await.unwrap(), 1);
}

#[tokio::test]
async fn test_scenario_b_closed_gate_defers_without_retry() {
    let fixture = SchedulerFixture::new(settings(5)).await;
    fixture.gate.set_rule("2", "1", "complete").await.unwrap();
    fixture.queue.set_cursor("run-7", "1_current", 5).await.unwrap();
    fixture.queue.set_cursor("run-7", "1_total", 10).await.unwrap();

    let job = JobBuilder::new()
        .with_workflow("phase-two")
        .with_phase("2")
        .with_run_id("run-7")
        .build();
    fixture.queue.enqueue_job(&job, 0).await.unwrap();

    let before = now_millis();
    let report = fixture.scheduler.tick().await.unwrap();
    assert_eq!(report.deferred, 1);
    assert_eq!(report.dispatched, 0);
    assert_eq!(fixture.backend.execution_count(), 0);
    assert!(fixture.job_log.entries().is_empty());

    let delayed = fixture.queue.list_delayed(10).await.unwrap();
    assert_eq!(delayed.len(), 1);
    assert_eq!(delayed[0].job.id, job.id);
    assert_eq!(delayed[0].job.retry_count, 0);
    let delay = delayed[0].ready_at - before;
    assert!((9_900..=10_500).contains(&delay), "delay was {delay}");
}

#[tokio::test]
async fn test_open_gate_dispatches() {
    let fixture = SchedulerFixture::new(settings(5)).await;
    fixture.gate.set_rule("2", "1", "complete").await.unwrap();
    fixture.queue.set_cursor("run-7", "1_current", 10).await.unwrap();
    fixture.queue.set_cursor("run-7", "1_total", 10).await.unwrap();

    let job = JobBuilder::new().with_phase("2").with_run_id("run-7").build();
    let outcome = fixture.scheduler.dispatch_job(job).await.unwrap();
    assert_eq!(outcome, DispatchOutcome::Succeeded);
}

#[tokio::test]
async fn test_scenario_c_refill_once_per_cooldown() {
    let fixture = SchedulerFixture::new(SchedulerSettings {
        concurrency_limit: 2,
        refill_command: Some("./refill.sh".to_string()),
        refill_threshold: 10,
        ..Default::default()
    })
    .await;
    fixture.backend.set_active(2);

    for wf in ["a", "b", "c"] {
        fixture.enqueue(wf).await;
    }
    for wf in ["d", "e"] {
        fixture
            .queue
            .enqueue(wf, json!({}), DispatchMode::ById, Map::new(), 60_000)
            .await
            .unwrap();
    }

    let first = fixture.scheduler.tick().await.unwrap();
    assert_eq!(first.queued, 5);
    assert!(first.refill_triggered);

    for _ in 0..5 {
        let report = fixture.scheduler.tick().await.unwrap();
        assert!(!report.refill_triggered);
    }
    assert_eq!(fixture.launcher.commands(), vec!["./refill.sh"]);
}

#[tokio::test]
async fn test_no_refill_without_command() {
    let fixture = SchedulerFixture::new(settings(2)).await;
    let report = fixture.scheduler.tick().await.unwrap();
    assert!(!report.refill_triggered);
    assert_eq!(fixture.launcher.launch_count(), 0);
}

#[tokio::test]
async fn test_backoff_sequence_then_drop() {
    let fixture = SchedulerFixture::new(settings(1)).await;
    let policy = RetryPolicy::default();
    let mut job = JobBuilder::new().with_workflow("flaky").build();

    let mut delays = Vec::new();
    loop {
        fixture.backend.push_error("Execution failed: exit 1");
        match fixture.scheduler.dispatch_job(job.clone()).await.unwrap() {
            DispatchOutcome::Retried {
                retry_count,
                delay_ms,
            } => {
                delays.push(delay_ms);
                let requeued = fixture.queue.list_delayed(1).await.unwrap().remove(0);
                assert_eq!(requeued.job.retry_count, retry_count);
                assert_eq!(requeued.job.workflow, "flaky");
                fixture.store.del("job_queue:delayed").await.unwrap();
                job = requeued.job;
            }
            DispatchOutcome::Dropped => break,
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    assert_eq!(delays, vec![2000, 4000, 8000, 16000, 32000]);
    assert_eq!(policy.max_retries as usize, delays.len());
    assert_eq!(fixture.queue.delayed_size().await.unwrap(), 0);
    assert_eq!(fixture.job_log.entries().len(), 6);
}

#[tokio::test]
async fn test_sentinel_output_counts_as_failure() {
    let fixture = SchedulerFixture::new(settings(1)).await;
    fixture
        .backend
        .push_output("Execution failed: workflow error in node X");

    let outcome = fixture
        .scheduler
        .dispatch_job(JobBuilder::new().build())
        .await
        .unwrap();
    assert_eq!(
        outcome,
        DispatchOutcome::Retried {
            retry_count: 1,
            delay_ms: 2000
        }
    );

    let entries = fixture.job_log.entries();
    assert_eq!(entries[0].status, JobStatus::Failed);
    assert!(entries[0]
        .error
        .as_deref()
        .unwrap()
        .starts_with("Execution failed"));
}

#[tokio::test]
async fn test_batch_size_override_and_env_hints() {
    let fixture = SchedulerFixture::new(SchedulerSettings {
        broker_port: Some(5679),
        ..settings(2)
    })
    .await;
    fixture.store.set(SIZE_KEY, "17").await.unwrap();

    fixture
        .scheduler
        .dispatch_job(JobBuilder::new().build())
        .await
        .unwrap();
    fixture
        .scheduler
        .dispatch_job(JobBuilder::new().with_batch_size(3).build())
        .await
        .unwrap();

    let requests = fixture.backend.requests();
    assert_eq!(requests[0].env["BATCH_SIZE"], "17");
    assert_eq!(requests[0].env["N8N_BATCH_SIZE"], "17");
    assert_eq!(requests[0].env["N8N_RUNNERS_BROKER_PORT"], "5679");
    assert_eq!(requests[1].env["BATCH_SIZE"], "3");
    assert_eq!(requests[1].env["N8N_BATCH_SIZE"], "3");
}

#[tokio::test]
async fn test_job_log_contents() {
    let fixture = SchedulerFixture::new(settings(2)).await;
    fixture.backend.set_latency(Duration::from_millis(30));
    let job = JobBuilder::new()
        .with_workflow("report")
        .with_meta("owner", json!("ops"))
        .build();

    fixture.scheduler.dispatch_job(job.clone()).await.unwrap();

    let entries = fixture.job_log.entries();
    assert_eq!(entries.len(), 1);
    let entry = &entries[0];
    assert_eq!(entry.job_id, job.id);
    assert_eq!(entry.workflow, "report");
    assert_eq!(entry.status, JobStatus::Success);
    assert!(entry.error.is_none());
    assert!(entry.duration >= 0.03);
    assert_eq!(entry.meta["owner"], "ops");
    assert_eq!(entry.retry_count, 0);
    assert_eq!(entry.batch_size, 10);
}

#[tokio::test]
async fn test_log_sink_failure_does_not_fail_dispatch() {
    let fixture = SchedulerFixture::new(settings(2)).await;
    fixture.job_log.set_failing(true);
    let outcome = fixture
        .scheduler
        .dispatch_job(JobBuilder::new().build())
        .await
        .unwrap();
    assert_eq!(outcome, DispatchOutcome::Succeeded);
    assert_eq!(fixture.scheduler.processed_count(), 1);
}

#[tokio::test]
async fn test_run_loop_stops_on_shutdown() {
    let fixture = Arc::new(
        SchedulerFixture::new(SchedulerSettings {
            poll_interval: Duration::from_secs(3600),
            ..settings(2)
        })
        .await,
    );
    fixture.enqueue("a").await;

    let (tx, rx) = broadcast::channel(1);
    let runner = fixture.clone();
    let handle = tokio::spawn(async move { runner.scheduler.run(rx).await });

    let backend = fixture.backend.clone();
    assert!(
        TestEnv::wait_for(
            || {
                let backend = backend.clone();
                async move { backend.execution_count() == 1 }
            },
            Duration::from_secs(2)
        )
        .await
    );

    tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("loop did not stop")
        .unwrap();
}

#[tokio::test]
async fn test_failed_requeue_still_records_attempt() {
    let faulty = Arc::new(FaultyStateStore::new(memory_store()));
    let fixture = SchedulerFixture::with_store(settings(2), faulty.clone()).await;
    faulty.fail_on("zadd");
    fixture.backend.push_error("Execution failed: exit 1");

    let outcome = fixture
        .scheduler
        .dispatch_job(JobBuilder::new().with_workflow("flaky").build())
        .await
        .unwrap();
    assert_eq!(outcome, DispatchOutcome::Dropped);

    let entries = fixture.job_log.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].status, JobStatus::Failed);
    assert_eq!(fixture.store.llen(STATS_KEY).await.unwrap(), 1);
}

#[tokio::test]
async fn test_failed_requeue_does_not_abandon_remaining_slots() {
    let faulty = Arc::new(FaultyStateStore::new(memory_store()));
    let fixture = SchedulerFixture::with_store(settings(3), faulty.clone()).await;
    for wf in ["a", "b", "c"] {
        fixture.enqueue(wf).await;
    }
    faulty.fail_on("zadd");
    fixture.backend.push_error("Execution failed: exit 1");

    let report = fixture.scheduler.tick().await.unwrap();
    assert_eq!(report.dispatched, 3);
    assert_eq!(report.succeeded, 2);
    assert_eq!(report.dropped, 1);
    assert_eq!(fixture.backend.execution_count(), 3);
    assert_eq!(fixture.job_log.entries().len(), 3);
}

#[tokio::test]
async fn test_failed_deferral_continues_tick() {
    let faulty = Arc::new(FaultyStateStore::new(memory_store()));
    let fixture = SchedulerFixture::with_store(settings(2), faulty.clone()).await;
    fixture.gate.set_rule("2", "1", "complete").await.unwrap();

    let gated = JobBuilder::new().with_phase("2").with_run_id("run-1").build();
    fixture.queue.enqueue_job(&gated, 0).await.unwrap();
    fixture.enqueue("plain").await;
    faulty.fail_on("zadd");

    let report = fixture.scheduler.tick().await.unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(report.succeeded, 1);
    assert_eq!(fixture.backend.requests()[0].workflow, "plain");
}
