use serde::{Deserialize, Serialize};

use crate::{SchedulerError, SchedulerResult};

/// 自适应批大小的调节参数
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BatchSizingConfig {
    pub min_size: usize,
    pub max_size: usize,
    /// 单批目标耗时（毫秒）
    pub target_latency_ms: f64,
    /// 失败率超过该值时收缩
    pub failure_threshold_rate: f64,
    pub adjustment_factor: f64,
    /// 滑动窗口内保留的样本数
    pub window_size: usize,
}

impl Default for BatchSizingConfig {
    fn default() -> Self {
        Self {
            min_size: 1,
            max_size: 100,
            target_latency_ms: 5000.0,
            failure_threshold_rate: 0.1,
            adjustment_factor: 1.2,
            window_size: 10,
        }
    }
}

impl BatchSizingConfig {
    pub const FIELDS: [&'static str; 6] = [
        "min_size",
        "max_size",
        "target_latency_ms",
        "failure_threshold_rate",
        "adjustment_factor",
        "window_size",
    ];

    pub fn validate(&self) -> SchedulerResult<()> {
        if self.min_size == 0 || self.max_size == 0 || self.window_size == 0 {
            return Err(SchedulerError::config_error(
                "min_size, max_size 和 window_size 必须大于0",
            ));
        }
        if self.min_size > self.max_size {
            return Err(SchedulerError::config_error(format!(
                "min_size ({}) 不能大于 max_size ({})",
                self.min_size, self.max_size
            )));
        }
        if self.target_latency_ms <= 0.0 || self.failure_threshold_rate <= 0.0 {
            return Err(SchedulerError::config_error(
                "target_latency_ms 和 failure_threshold_rate 必须大于0",
            ));
        }
        if self.adjustment_factor <= 1.0 {
            return Err(SchedulerError::config_error(
                "adjustment_factor 必须大于1",
            ));
        }
        Ok(())
    }

    /// 读取单个字段，供运维命令使用
    pub fn get_field(&self, name: &str) -> SchedulerResult<String> {
        let value = match name {
            "min_size" => self.min_size.to_string(),
            "max_size" => self.max_size.to_string(),
            "target_latency_ms" => self.target_latency_ms.to_string(),
            "failure_threshold_rate" => self.failure_threshold_rate.to_string(),
            "adjustment_factor" => self.adjustment_factor.to_string(),
            "window_size" => self.window_size.to_string(),
            other => return Err(unknown_field(other)),
        };
        Ok(value)
    }

    /// 按字段名更新并校验，失败时保持原值不变
    pub fn set_field(&mut self, name: &str, raw: &str) -> SchedulerResult<()> {
        let mut updated = self.clone();
        match name {
            "min_size" => updated.min_size = parse_field(name, raw)?,
            "max_size" => updated.max_size = parse_field(name, raw)?,
            "target_latency_ms" => updated.target_latency_ms = parse_field(name, raw)?,
            "failure_threshold_rate" => updated.failure_threshold_rate = parse_field(name, raw)?,
            "adjustment_factor" => updated.adjustment_factor = parse_field(name, raw)?,
            "window_size" => updated.window_size = parse_field(name, raw)?,
            other => return Err(unknown_field(other)),
        }
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// 把批大小限制在 `[min_size, max_size]` 内
    pub fn clamp_size(&self, size: usize) -> usize {
        size.min(self.max_size).max(self.min_size)
    }

    fn shrink(&self, current: usize) -> usize {
        let next = (current as f64 / self.adjustment_factor).floor() as usize;
        self.clamp_size(next)
    }

    fn grow(&self, current: usize) -> usize {
        let next = ((current as f64 * self.adjustment_factor).floor() as usize).saturating_add(1);
        self.clamp_size(next)
    }

    /// 根据窗口样本计算新的批大小
    ///
    /// 带死区的开关控制：失败率优先于延迟判断，
    /// 延迟落在目标值的 0.8 到 1.2 倍之间时保持不变。
    /// 超出范围的当前值先被收回范围内，结果总在 `[min_size, max_size]` 中。
    pub fn decide(&self, current: usize, samples: &[OutcomeSample]) -> (usize, BatchDecision) {
        let current = self.clamp_size(current);
        if samples.is_empty() {
            return (current, BatchDecision::Hold);
        }

        let n = samples.len() as f64;
        let failures = samples.iter().filter(|s| !s.success).count() as f64;
        let failure_rate = failures / n;
        let avg_latency = samples.iter().map(|s| s.duration_ms).sum::<f64>() / n;

        if failure_rate > self.failure_threshold_rate {
            (
                self.shrink(current),
                BatchDecision::ShrinkOnFailures { failure_rate },
            )
        } else if avg_latency > self.target_latency_ms * 1.2 {
            (
                self.shrink(current),
                BatchDecision::ShrinkOnLatency { avg_latency_ms: avg_latency },
            )
        } else if avg_latency < self.target_latency_ms * 0.8 {
            (
                self.grow(current),
                BatchDecision::Grow { avg_latency_ms: avg_latency },
            )
        } else {
            (current, BatchDecision::Hold)
        }
    }
}

fn unknown_field(name: &str) -> SchedulerError {
    SchedulerError::validation_error(format!(
        "未知的批大小配置字段: {name}，可选值: {}",
        BatchSizingConfig::FIELDS.join(", ")
    ))
}

fn parse_field<T: std::str::FromStr>(name: &str, raw: &str) -> SchedulerResult<T> {
    raw.trim().parse().map_err(|_| {
        SchedulerError::validation_error(format!("字段 {name} 的值无效: {raw}"))
    })
}

/// 单个任务的耗时与结果
///
/// 存储格式为紧凑的 `{"d": 毫秒, "s": 0|1}`，与其他写入同一存储的工具共用。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct OutcomeSample {
    #[serde(rename = "d")]
    pub duration_ms: f64,
    #[serde(rename = "s", with = "flag")]
    pub success: bool,
}

mod flag {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(u8::from(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Flag {
            Int(i64),
            Bool(bool),
        }
        Ok(match Flag::deserialize(deserializer)? {
            Flag::Int(v) => v != 0,
            Flag::Bool(v) => v,
        })
    }
}

impl OutcomeSample {
    pub fn new(duration_ms: f64, success: bool) -> Self {
        Self {
            duration_ms,
            success,
        }
    }
}

/// 一次重算得出的调节方向
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BatchDecision {
    ShrinkOnFailures { failure_rate: f64 },
    ShrinkOnLatency { avg_latency_ms: f64 },
    Grow { avg_latency_ms: f64 },
    Hold,
}
