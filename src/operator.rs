//! 命令行操作的参数解析与状态汇总

use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};

use scheduler_core::{BatchSizingConfig, SchedulerError, SchedulerResult};

use crate::app::ControlPlane;

/// 把 `--data` / `--meta` 参数解析为 JSON 对象
///
/// 参数缺失时返回空对象；不是合法 JSON 或不是对象时返回校验错误。
pub fn parse_json_object(flag: &str, raw: Option<&str>) -> SchedulerResult<Map<String, Value>> {
    let Some(raw) = raw else {
        return Ok(Map::new());
    };
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(SchedulerError::validation_error(format!(
            "{flag} 必须是 JSON 对象，实际为: {other}"
        ))),
        Err(e) => Err(SchedulerError::validation_error(format!(
            "{flag} 不是合法的 JSON: {e}"
        ))),
    }
}

/// `status` 命令输出的快照
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub queued: usize,
    pub delayed: usize,
    pub batch_size: usize,
    pub batch_config: BatchSizingConfig,
    pub gate_rules: usize,
}

impl StatusReport {
    pub async fn collect(control: &ControlPlane) -> SchedulerResult<Self> {
        Ok(Self {
            queued: control.queue.size().await?,
            delayed: control.queue.delayed_size().await?,
            batch_size: control.sizer.get_batch_size().await?,
            batch_config: control.sizer.get_config().await?,
            gate_rules: control.gate.list_rules().await?.len(),
        })
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "队列: {} 就绪, {} 延迟", self.queued, self.delayed)?;
        writeln!(
            f,
            "批大小: {} (范围 {}..={}, 目标耗时 {} ms)",
            self.batch_size,
            self.batch_config.min_size,
            self.batch_config.max_size,
            self.batch_config.target_latency_ms
        )?;
        write!(f, "闸门规则: {} 条", self.gate_rules)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_flag_is_empty_object() {
        assert!(parse_json_object("--data", None).unwrap().is_empty());
    }

    #[test]
    fn test_object_is_accepted() {
        let map = parse_json_object("--meta", Some(r#"{"phase":"2","run_id":"r1"}"#)).unwrap();
        assert_eq!(map["phase"], "2");
        assert_eq!(map["run_id"], "r1");
    }

    #[test]
    fn test_invalid_json_rejected() {
        let err = parse_json_object("--data", Some("{not json")).unwrap_err();
        assert!(matches!(err, SchedulerError::ValidationError(_)));
    }

    #[test]
    fn test_non_object_rejected() {
        for raw in ["[1,2]", "\"text\"", "42", "null"] {
            let err = parse_json_object("--meta", Some(raw)).unwrap_err();
            assert!(matches!(err, SchedulerError::ValidationError(_)), "{raw}");
        }
    }
}
