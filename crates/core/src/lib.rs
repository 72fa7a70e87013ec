pub mod errors;
pub mod models;
pub mod traits;

pub use errors::*;
pub use models::{
    BatchDecision, BatchSizingConfig, CursorProgress, DelayedJob, DispatchMode, GateCondition,
    Job, JobLogEntry, JobStatus, OutcomeSample, PhaseRule,
};
pub use traits::{
    is_failure_output, ExecutionBackend, ExecutionRequest, JobLogSink, RefillLauncher, StateStore,
    FAILURE_SENTINEL,
};

/// 当前时间（毫秒级Unix时间戳），延迟队列以此为分数
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
