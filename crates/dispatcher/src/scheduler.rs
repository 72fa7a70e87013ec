use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use scheduler_config::SchedulerConfig;
use scheduler_core::{
    is_failure_output, ExecutionBackend, ExecutionRequest, Job, JobLogEntry, JobLogSink,
    JobStatus, SchedulerResult,
};
use scheduler_infrastructure::SchedulerMetrics;

use crate::auto_refiller::AutoRefiller;
use crate::batch_sizer::AdaptiveBatchSizer;
use crate::phase_gate::PhaseGate;
use crate::queue::JobQueue;
use crate::retry_policy::{RetryDecision, RetryPolicy};

/// 一个调度周期的统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub active: usize,
    pub slots: usize,
    pub queued: usize,
    pub refill_triggered: bool,
    pub dispatched: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub deferred: usize,
    pub dropped: usize,
}

/// 单个任务的派发结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Succeeded,
    /// 失败后已安排重试
    Retried { retry_count: u32, delay_ms: u64 },
    /// 重试次数用尽，任务被丢弃
    Dropped,
    /// 闸门未放行，任务延后
    Deferred,
}

/// 调度器运行参数
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub concurrency_limit: usize,
    pub poll_interval: Duration,
    pub retry_policy: RetryPolicy,
    pub gate_defer_delay_ms: u64,
    pub refill_command: Option<String>,
    pub refill_threshold: usize,
    pub broker_port: Option<u16>,
}

impl SchedulerSettings {
    pub fn from_config(config: &SchedulerConfig, broker_port: Option<u16>) -> Self {
        Self {
            concurrency_limit: config.concurrency_limit,
            poll_interval: Duration::from_secs(config.poll_interval_seconds),
            retry_policy: RetryPolicy::new(config.max_retries, config.retry_base_delay_ms),
            gate_defer_delay_ms: config.gate_defer_delay_ms,
            refill_command: config.refill_command.clone(),
            refill_threshold: config.refill_threshold,
            broker_port,
        }
    }
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self::from_config(&SchedulerConfig::default(), None)
    }
}

/// 轮询调度器
///
/// 每个周期统计后端正在运行的执行数，按剩余槽位从队列取任务并顺序派发。
/// 除本次会话处理过的任务数外，不在进程内保存任何状态。
pub struct JobScheduler {
    queue: JobQueue,
    backend: Arc<dyn ExecutionBackend>,
    sizer: Arc<AdaptiveBatchSizer>,
    gate: Arc<PhaseGate>,
    refiller: Arc<AutoRefiller>,
    job_log: Arc<dyn JobLogSink>,
    metrics: SchedulerMetrics,
    settings: SchedulerSettings,
    processed: AtomicU64,
}

impl JobScheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        queue: JobQueue,
        backend: Arc<dyn ExecutionBackend>,
        sizer: Arc<AdaptiveBatchSizer>,
        gate: Arc<PhaseGate>,
        refiller: Arc<AutoRefiller>,
        job_log: Arc<dyn JobLogSink>,
        metrics: SchedulerMetrics,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            queue,
            backend,
            sizer,
            gate,
            refiller,
            job_log,
            metrics,
            settings,
            processed: AtomicU64::new(0),
        }
    }

    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    /// 本次会话已派发（不含延后）的任务数
    pub fn processed_count(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    /// 执行一个调度周期
    pub async fn tick(&self) -> SchedulerResult<TickReport> {
        self.metrics.record_tick();
        let mut report = TickReport::default();

        report.active = self.backend.count_active().await?;
        report.slots = self
            .settings
            .concurrency_limit
            .saturating_sub(report.active);

        let ready = self.queue.size().await?;
        let delayed = self.queue.delayed_size().await?;
        report.queued = ready + delayed;

        if let Some(command) = &self.settings.refill_command {
            report.refill_triggered = self
                .refiller
                .check_and_refill(report.queued, self.settings.refill_threshold, command)
                .await;
        }

        if report.slots == 0 {
            debug!(
                "已达到并发上限 ({}/{})",
                report.active, self.settings.concurrency_limit
            );
            return Ok(report);
        }
        if report.queued == 0 {
            return Ok(report);
        }

        info!(
            event = "tick_dispatch",
            slots = report.slots,
            ready = ready,
            delayed = delayed,
            "有可用槽位，开始派发"
        );

        for _ in 0..report.slots {
            let Some(job) = self.queue.dequeue().await? else {
                break;
            };

            let job_id = job.id;
            let outcome = match self.dispatch_job(job).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(job.id = %job_id, "任务派发失败: {}", e);
                    report.failed += 1;
                    continue;
                }
            };
            match outcome {
                DispatchOutcome::Succeeded => {
                    report.dispatched += 1;
                    report.succeeded += 1;
                }
                DispatchOutcome::Retried { .. } => {
                    report.dispatched += 1;
                    report.failed += 1;
                }
                DispatchOutcome::Dropped => {
                    report.dispatched += 1;
                    report.failed += 1;
                    report.dropped += 1;
                }
                DispatchOutcome::Deferred => report.deferred += 1,
            }
        }

        Ok(report)
    }

    /// 派发单个任务：闸门检查、执行、失败重试、记录样本与日志
    pub async fn dispatch_job(&self, mut job: Job) -> SchedulerResult<DispatchOutcome> {
        if let Some(phase) = job.phase() {
            let run_id = job.run_id().unwrap_or_default();
            let open = match self.gate.can_run(&run_id, &phase).await {
                Ok(open) => open,
                Err(e) => {
                    warn!("闸门检查失败，任务延后: {}", e);
                    false
                }
            };
            if !open {
                self.queue
                    .requeue(&job, self.settings.gate_defer_delay_ms)
                    .await?;
                self.metrics.record_deferral();
                info!(
                    event = "job_deferred",
                    job.id = %job.id,
                    job.workflow = %job.workflow,
                    phase = %phase,
                    run_id = %run_id,
                    delay_ms = self.settings.gate_defer_delay_ms,
                    "阶段闸门未放行，任务延后"
                );
                return Ok(DispatchOutcome::Deferred);
            }
        }

        let batch_size = match job.batch_size_override() {
            Some(size) => size,
            None => match self.sizer.get_batch_size().await {
                Ok(size) => size,
                Err(e) => {
                    warn!("读取批大小失败，使用默认值: {}", e);
                    self.sizer.default_batch_size()
                }
            },
        };

        let request = ExecutionRequest::for_job(&job, self.execution_env(batch_size));
        info!(
            event = "job_dispatched",
            job.id = %job.id,
            job.workflow = %job.workflow,
            job.mode = %job.mode,
            retry_count = job.retry_count,
            batch_size = batch_size,
            "开始执行任务"
        );

        let started = Instant::now();
        let result = self.backend.execute(&request).await;
        let duration = started.elapsed();
        let duration_ms = duration.as_secs_f64() * 1000.0;

        let error = match result {
            Ok(output) if is_failure_output(&output) => Some(output.trim().to_string()),
            Ok(_) => None,
            Err(e) => Some(e.to_string()),
        };
        let success = error.is_none();

        self.processed.fetch_add(1, Ordering::Relaxed);
        self.metrics
            .record_dispatch(duration.as_secs_f64(), batch_size);

        // 日志记录的是本次尝试时的重试次数
        let entry = JobLogEntry::from_attempt(
            &job,
            if success {
                JobStatus::Success
            } else {
                JobStatus::Failed
            },
            duration_ms,
            error.clone(),
            batch_size,
        );

        // 样本和日志先于重新入队写入，入队失败也不会丢失本次记录
        if let Err(e) = self.sizer.update_stats(duration_ms, success).await {
            warn!("更新批大小样本失败: {}", e);
        }
        if let Err(e) = self.job_log.append(&entry).await {
            warn!("写入任务日志失败: {}", e);
        }

        let outcome = match error {
            None => {
                info!(
                    event = "job_succeeded",
                    job.id = %job.id,
                    duration_ms = duration_ms,
                    "任务执行成功"
                );
                DispatchOutcome::Succeeded
            }
            Some(error) => {
                self.metrics.record_failure();
                self.handle_failure(&mut job, &error).await
            }
        };

        Ok(outcome)
    }

    async fn handle_failure(&self, job: &mut Job, error: &str) -> DispatchOutcome {
        match self.settings.retry_policy.decide(job.retry_count) {
            RetryDecision::Retry {
                retry_count,
                delay_ms,
            } => {
                job.retry_count = retry_count;
                if let Err(e) = self.queue.requeue(job, delay_ms).await {
                    self.metrics.record_drop();
                    error!(
                        event = "job_requeue_failed",
                        job.id = %job.id,
                        job.workflow = %job.workflow,
                        retry_count = retry_count,
                        error = %e,
                        "重试入队失败，任务被丢弃"
                    );
                    return DispatchOutcome::Dropped;
                }
                warn!(
                    event = "job_retry_scheduled",
                    job.id = %job.id,
                    job.workflow = %job.workflow,
                    retry_count = retry_count,
                    delay_ms = delay_ms,
                    error = %error,
                    "任务执行失败，已安排重试"
                );
                DispatchOutcome::Retried {
                    retry_count,
                    delay_ms,
                }
            }
            RetryDecision::GiveUp => {
                self.metrics.record_drop();
                error!(
                    event = "job_dropped",
                    job.id = %job.id,
                    job.workflow = %job.workflow,
                    retry_count = job.retry_count,
                    error = %error,
                    "任务重试次数已用尽，放弃执行"
                );
                DispatchOutcome::Dropped
            }
        }
    }

    fn execution_env(&self, batch_size: usize) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        env.insert("BATCH_SIZE".to_string(), batch_size.to_string());
        env.insert("N8N_BATCH_SIZE".to_string(), batch_size.to_string());
        if let Some(port) = self.settings.broker_port {
            env.insert("N8N_RUNNERS_BROKER_PORT".to_string(), port.to_string());
        }
        env
    }

    /// 轮询循环，直到收到关闭信号
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(
            concurrency = self.settings.concurrency_limit,
            poll_interval_secs = self.settings.poll_interval.as_secs(),
            "调度器循环启动"
        );

        loop {
            match self.tick().await {
                Ok(report) => debug!(?report, "调度周期完成"),
                Err(e) => error!("调度周期失败: {}", e),
            }

            tokio::select! {
                _ = tokio::time::sleep(self.settings.poll_interval) => {}
                _ = shutdown_rx.recv() => {
                    info!(
                        processed = self.processed_count(),
                        "调度器循环收到关闭信号"
                    );
                    break;
                }
            }
        }
    }
}
