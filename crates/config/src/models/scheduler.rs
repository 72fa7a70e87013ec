use serde::{Deserialize, Serialize};

use crate::validation::{ConfigValidator, ValidationUtils};
use crate::{ConfigError, ConfigResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// 允许同时运行的执行数上限
    pub concurrency_limit: usize,
    pub poll_interval_seconds: u64,
    pub max_retries: u32,
    /// 退避基数，第 n 次重试延迟 base * 2^n
    pub retry_base_delay_ms: u64,
    /// 闸门未放行时的延后时间
    pub gate_defer_delay_ms: u64,
    pub default_batch_size: usize,
    /// 每次记录样本后触发重算的概率
    pub recompute_probability: f64,
    pub refill_command: Option<String>,
    pub refill_threshold: usize,
    pub refill_cooldown_seconds: u64,
    /// 共享存储不可用时读取的本地游标文件
    pub local_cursor_path: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: 5,
            poll_interval_seconds: 5,
            max_retries: 5,
            retry_base_delay_ms: 2000,
            gate_defer_delay_ms: 10_000,
            default_batch_size: 10,
            recompute_probability: 1.0,
            refill_command: None,
            refill_threshold: 10,
            refill_cooldown_seconds: 10,
            local_cursor_path: ".n8n_factory/cursors.json".to_string(),
        }
    }
}

impl ConfigValidator for SchedulerConfig {
    fn validate(&self) -> ConfigResult<()> {
        ValidationUtils::validate_count(
            self.concurrency_limit,
            "scheduler.concurrency_limit",
            1000,
        )?;
        ValidationUtils::validate_seconds(
            self.poll_interval_seconds,
            "scheduler.poll_interval_seconds",
        )?;
        if self.max_retries > 20 {
            return Err(ConfigError::Validation(
                "scheduler.max_retries must be less than or equal to 20".to_string(),
            ));
        }
        if self.retry_base_delay_ms == 0 {
            return Err(ConfigError::Validation(
                "scheduler.retry_base_delay_ms must be greater than 0".to_string(),
            ));
        }
        ValidationUtils::validate_count(
            self.default_batch_size,
            "scheduler.default_batch_size",
            10000,
        )?;
        ValidationUtils::validate_probability(
            self.recompute_probability,
            "scheduler.recompute_probability",
        )?;
        if let Some(command) = &self.refill_command {
            ValidationUtils::validate_not_empty(command, "scheduler.refill_command")?;
        }
        ValidationUtils::validate_seconds(
            self.refill_cooldown_seconds,
            "scheduler.refill_cooldown_seconds",
        )?;
        ValidationUtils::validate_not_empty(
            &self.local_cursor_path,
            "scheduler.local_cursor_path",
        )?;
        Ok(())
    }
}
