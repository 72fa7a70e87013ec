use serde::{Deserialize, Serialize};
use std::fmt;

/// 闸门放行条件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum GateCondition {
    /// 依赖阶段的游标满足 `total > 0 && current >= total`
    Complete,
    /// 无法识别的条件（可能由其他工具写入）
    Unrecognized(String),
}

impl GateCondition {
    pub fn is_recognized(&self) -> bool {
        !matches!(self, GateCondition::Unrecognized(_))
    }
}

impl Default for GateCondition {
    fn default() -> Self {
        GateCondition::Complete
    }
}

impl From<String> for GateCondition {
    fn from(value: String) -> Self {
        match value.as_str() {
            "complete" => GateCondition::Complete,
            _ => GateCondition::Unrecognized(value),
        }
    }
}

impl From<&str> for GateCondition {
    fn from(value: &str) -> Self {
        GateCondition::from(value.to_string())
    }
}

impl From<GateCondition> for String {
    fn from(value: GateCondition) -> Self {
        value.to_string()
    }
}

impl fmt::Display for GateCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateCondition::Complete => f.write_str("complete"),
            GateCondition::Unrecognized(raw) => f.write_str(raw),
        }
    }
}

/// 阶段依赖规则：`phase` 须等待 `dependency` 满足 `condition`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseRule {
    pub dependency: String,
    #[serde(default)]
    pub condition: GateCondition,
}

impl PhaseRule {
    pub fn new(dependency: impl Into<String>, condition: GateCondition) -> Self {
        Self {
            dependency: dependency.into(),
            condition,
        }
    }
}

/// 某个运行中一个阶段的进度
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CursorProgress {
    pub current: Option<i64>,
    pub total: Option<i64>,
}

impl CursorProgress {
    pub fn new(current: Option<i64>, total: Option<i64>) -> Self {
        Self { current, total }
    }

    pub fn is_resolved(&self) -> bool {
        self.current.is_some() && self.total.is_some()
    }

    /// 用另一来源补齐缺失字段，已有值优先
    pub fn fill_from(self, other: CursorProgress) -> CursorProgress {
        CursorProgress {
            current: self.current.or(other.current),
            total: self.total.or(other.total),
        }
    }

    /// total 为 0 表示依赖阶段尚未初始化，不能视为已完成
    pub fn is_complete(&self) -> bool {
        match (self.current, self.total) {
            (Some(current), Some(total)) => total > 0 && current >= total,
            _ => false,
        }
    }

    pub fn current_field(phase: &str) -> String {
        format!("{phase}_current")
    }

    pub fn total_field(phase: &str) -> String {
        format!("{phase}_total")
    }
}
