use std::sync::Arc;

use tracing::{debug, info, warn};

use scheduler_core::{
    BatchDecision, BatchSizingConfig, OutcomeSample, SchedulerResult, StateStore,
};

pub const CONFIG_KEY: &str = "config:batch_sizing";
pub const SIZE_KEY: &str = "state:batch_size";
pub const STATS_KEY: &str = "stats:recent_jobs";

/// 自适应批大小控制器
///
/// 配置、当前批大小和样本窗口都保存在共享存储中，进程内不做缓存，
/// 多个调度进程看到的是同一个批大小。
pub struct AdaptiveBatchSizer {
    store: Arc<dyn StateStore>,
    default_batch_size: usize,
    recompute_probability: f64,
}

impl AdaptiveBatchSizer {
    /// 创建控制器，并在存储中补齐缺失的默认配置与批大小
    pub async fn new(
        store: Arc<dyn StateStore>,
        default_batch_size: usize,
        recompute_probability: f64,
    ) -> SchedulerResult<Self> {
        let defaults = serde_json::to_string(&BatchSizingConfig::default())?;
        if store.set_nx(CONFIG_KEY, &defaults).await? {
            info!("已写入默认批大小配置");
        }
        if store
            .set_nx(SIZE_KEY, &default_batch_size.to_string())
            .await?
        {
            info!("已初始化批大小为 {}", default_batch_size);
        }

        Ok(Self {
            store,
            default_batch_size,
            recompute_probability,
        })
    }

    pub fn default_batch_size(&self) -> usize {
        self.default_batch_size
    }

    /// 当前批大小，缺失或不是数字时返回默认值，结果限制在配置范围内
    pub async fn get_batch_size(&self) -> SchedulerResult<usize> {
        let config = self.get_config().await?;
        let stored = self.read_stored_size().await?;
        Ok(config.clamp_size(stored.unwrap_or(self.default_batch_size)))
    }

    async fn read_stored_size(&self) -> SchedulerResult<Option<usize>> {
        let raw = self.store.get(SIZE_KEY).await?;
        Ok(raw.and_then(|v| v.trim().parse().ok()))
    }

    /// 读取配置，缺失字段取默认值，无法解析时整体回退为默认配置
    pub async fn get_config(&self) -> SchedulerResult<BatchSizingConfig> {
        let Some(raw) = self.store.get(CONFIG_KEY).await? else {
            return Ok(BatchSizingConfig::default());
        };
        match serde_json::from_str(&raw) {
            Ok(config) => Ok(config),
            Err(e) => {
                warn!("批大小配置无法解析，使用默认配置: {}", e);
                Ok(BatchSizingConfig::default())
            }
        }
    }

    pub async fn set_config_field(
        &self,
        field: &str,
        value: &str,
    ) -> SchedulerResult<BatchSizingConfig> {
        let mut config = self.get_config().await?;
        config.set_field(field, value)?;
        self.save_config(&config).await?;
        info!(event = "batch_config_updated", field = field, value = value, "批大小配置已更新");
        Ok(config)
    }

    pub async fn reset_config(&self) -> SchedulerResult<BatchSizingConfig> {
        let config = BatchSizingConfig::default();
        self.save_config(&config).await?;
        info!("批大小配置已恢复默认值");
        Ok(config)
    }

    async fn save_config(&self, config: &BatchSizingConfig) -> SchedulerResult<()> {
        self.store
            .set(CONFIG_KEY, &serde_json::to_string(config)?)
            .await
    }

    /// 记录一次执行结果，并按概率触发重算
    ///
    /// 返回值为本次重算的结果；未触发重算时为 `None`。
    pub async fn update_stats(
        &self,
        duration_ms: f64,
        success: bool,
    ) -> SchedulerResult<Option<(usize, BatchDecision)>> {
        let config = self.get_config().await?;
        let sample = serde_json::to_string(&OutcomeSample::new(duration_ms, success))?;

        self.store.lpush(STATS_KEY, &sample).await?;
        let last = config.window_size.max(1) as isize - 1;
        self.store.ltrim(STATS_KEY, 0, last).await?;

        if self.should_recompute() {
            Ok(Some(self.recalculate(&config).await?))
        } else {
            Ok(None)
        }
    }

    fn should_recompute(&self) -> bool {
        self.recompute_probability >= 1.0 || rand::random::<f64>() < self.recompute_probability
    }

    /// 根据样本窗口重算批大小，仅在结果变化时写回
    pub async fn recalculate(
        &self,
        config: &BatchSizingConfig,
    ) -> SchedulerResult<(usize, BatchDecision)> {
        let raw = self.store.lrange(STATS_KEY, 0, -1).await?;
        let samples: Vec<OutcomeSample> = raw
            .iter()
            .filter_map(|entry| match serde_json::from_str(entry) {
                Ok(sample) => Some(sample),
                Err(e) => {
                    warn!("跳过无法解析的样本 {}: {}", entry, e);
                    None
                }
            })
            .collect();

        let stored = self.read_stored_size().await?;
        let current = stored.unwrap_or(self.default_batch_size);
        let (next, decision) = config.decide(current, &samples);

        if stored != Some(next) {
            self.store.set(SIZE_KEY, &next.to_string()).await?;
            info!(
                event = "batch_size_adjusted",
                from = current,
                to = next,
                decision = ?decision,
                samples = samples.len(),
                "批大小已调整"
            );
        } else {
            debug!("批大小保持 {} ({:?})", current, decision);
        }

        Ok((next, decision))
    }
}
