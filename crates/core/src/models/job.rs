use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::{SchedulerError, SchedulerResult};

/// 工作流的派发方式
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum DispatchMode {
    /// 按工作流ID执行
    #[default]
    #[serde(rename = "id", alias = "by-id")]
    ById,
    /// 按工作流定义文件执行
    #[serde(rename = "file", alias = "by-file")]
    ByFile,
}

impl DispatchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchMode::ById => "id",
            DispatchMode::ByFile => "file",
        }
    }
}

impl fmt::Display for DispatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DispatchMode {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "id" | "by-id" => Ok(DispatchMode::ById),
            "file" | "by-file" => Ok(DispatchMode::ByFile),
            other => Err(SchedulerError::validation_error(format!(
                "不支持的派发方式: {other}，可选值: id, file"
            ))),
        }
    }
}

/// 一次派发的工作单元
///
/// `meta` 中有三个键会被调度器识别：
/// - `phase`: 任务所属阶段，存在时需要通过阶段闸门
/// - `run_id`: 阶段游标所属的运行ID
/// - `batch_size`: 覆盖自适应批大小
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub workflow: String,
    #[serde(default)]
    pub mode: DispatchMode,
    #[serde(default = "empty_object")]
    pub inputs: Value,
    #[serde(default)]
    pub meta: Map<String, Value>,
    #[serde(default, alias = "retries")]
    pub retry_count: u32,
    #[serde(default = "Utc::now")]
    pub enqueued_at: DateTime<Utc>,
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

impl Job {
    pub fn new(workflow: impl Into<String>, mode: DispatchMode) -> Self {
        Self {
            id: Uuid::new_v4(),
            workflow: workflow.into(),
            mode,
            inputs: empty_object(),
            meta: Map::new(),
            retry_count: 0,
            enqueued_at: Utc::now(),
        }
    }

    pub fn with_inputs(mut self, inputs: Value) -> Self {
        self.inputs = inputs;
        self
    }

    pub fn with_meta(mut self, meta: Map<String, Value>) -> Self {
        self.meta = meta;
        self
    }

    /// 入队前的最小校验：工作流引用不能为空
    pub fn validate(&self) -> SchedulerResult<()> {
        if self.workflow.trim().is_empty() {
            return Err(SchedulerError::InvalidJob(
                "workflow 不能为空".to_string(),
            ));
        }
        Ok(())
    }

    pub fn phase(&self) -> Option<String> {
        self.meta_string("phase")
    }

    pub fn run_id(&self) -> Option<String> {
        self.meta_string("run_id")
    }

    /// `meta.batch_size` 覆盖值，接受数字或数字字符串
    pub fn batch_size_override(&self) -> Option<usize> {
        match self.meta.get("batch_size")? {
            Value::Number(n) => n.as_u64().map(|v| v as usize),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn meta_string(&self, key: &str) -> Option<String> {
        match self.meta.get(key)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn to_json(&self) -> SchedulerResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(raw: &str) -> SchedulerResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// 尚未到期的任务及其就绪时间
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DelayedJob {
    pub job: Job,
    /// 毫秒级Unix时间戳
    pub ready_at: i64,
}

impl DelayedJob {
    pub fn is_ready(&self, now_ms: i64) -> bool {
        now_ms >= self.ready_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_dispatch_mode_parsing() {
        assert_eq!("id".parse::<DispatchMode>().unwrap(), DispatchMode::ById);
        assert_eq!("by-file".parse::<DispatchMode>().unwrap(), DispatchMode::ByFile);
        assert!("webhook".parse::<DispatchMode>().is_err());
    }

    #[test]
    fn test_decode_legacy_entry() {
        // 旧版本写入的条目只有 workflow/mode/inputs/retries
        let job = Job::from_json(r#"{"workflow":"wf1","mode":"file","inputs":{},"retries":2}"#)
            .unwrap();
        assert_eq!(job.workflow, "wf1");
        assert_eq!(job.mode, DispatchMode::ByFile);
        assert_eq!(job.retry_count, 2);
        assert!(job.meta.is_empty());
    }

    #[test]
    fn test_meta_accessors() {
        let meta = json!({"phase": 2, "run_id": "r1", "batch_size": "25"});
        let job = Job::new("wf", DispatchMode::ById)
            .with_meta(meta.as_object().cloned().unwrap());
        assert_eq!(job.phase().as_deref(), Some("2"));
        assert_eq!(job.run_id().as_deref(), Some("r1"));
        assert_eq!(job.batch_size_override(), Some(25));
    }

    #[test]
    fn test_validate_rejects_blank_workflow() {
        assert!(Job::new("  ", DispatchMode::ById).validate().is_err());
        assert!(Job::new("wf", DispatchMode::ById).validate().is_ok());
    }
}
