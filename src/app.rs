use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use scheduler_config::AppConfig;
use scheduler_core::StateStore;
use scheduler_dispatcher::{
    AdaptiveBatchSizer, AutoRefiller, JobQueue, JobScheduler, PhaseGate, SchedulerSettings,
};
use scheduler_infrastructure::{
    FileJobLog, HttpExecutionBackend, LocalCursorFile, SchedulerMetrics, ShellRefillLauncher,
    StateStoreFactory,
};
use tokio::sync::broadcast;
use tracing::info;

/// 共享存储之上的控制面组件
///
/// 调度进程和命令行工具都通过它访问队列、批大小和闸门。
pub struct ControlPlane {
    pub store: Arc<dyn StateStore>,
    pub queue: JobQueue,
    pub sizer: Arc<AdaptiveBatchSizer>,
    pub gate: Arc<PhaseGate>,
    pub cursor_file: LocalCursorFile,
}

impl ControlPlane {
    /// 按配置连接共享存储
    pub async fn connect(config: &AppConfig) -> Result<Self> {
        let store = StateStoreFactory::create(&config.state_store)
            .await
            .context("连接共享状态存储失败")?;
        Self::with_store(config, store).await
    }

    /// 在给定存储上组装控制面
    pub async fn with_store(config: &AppConfig, store: Arc<dyn StateStore>) -> Result<Self> {
        let sizer = AdaptiveBatchSizer::new(
            store.clone(),
            config.scheduler.default_batch_size,
            config.scheduler.recompute_probability,
        )
        .await
        .context("初始化批大小控制器失败")?;

        let cursor_file = LocalCursorFile::new(&config.scheduler.local_cursor_path);
        let gate = PhaseGate::new(store.clone(), cursor_file.clone());

        Ok(Self {
            queue: JobQueue::new(store.clone()),
            sizer: Arc::new(sizer),
            gate: Arc::new(gate),
            cursor_file,
            store,
        })
    }
}

/// 调度进程
pub struct Application {
    scheduler: Arc<JobScheduler>,
}

impl Application {
    pub async fn new(config: AppConfig) -> Result<Self> {
        info!("初始化调度进程");

        let control = ControlPlane::connect(&config).await?;
        let backend = HttpExecutionBackend::new(config.backend.clone())
            .context("创建执行后端客户端失败")?;

        let refiller = AutoRefiller::new(
            Arc::new(ShellRefillLauncher::new()),
            Duration::from_secs(config.scheduler.refill_cooldown_seconds),
        );
        let job_log = FileJobLog::new(&config.job_log.path);
        let settings = SchedulerSettings::from_config(&config.scheduler, config.backend.broker_port);

        let scheduler = JobScheduler::new(
            control.queue,
            Arc::new(backend),
            control.sizer,
            control.gate,
            Arc::new(refiller),
            Arc::new(job_log),
            SchedulerMetrics::new(),
            settings,
        );

        Ok(Self {
            scheduler: Arc::new(scheduler),
        })
    }

    pub fn scheduler(&self) -> &Arc<JobScheduler> {
        &self.scheduler
    }

    /// 运行轮询循环直到收到关闭信号
    pub async fn run(&self, shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        self.scheduler.run(shutdown_rx).await;
        info!(
            processed = self.scheduler.processed_count(),
            "调度进程已停止"
        );
        Ok(())
    }
}
