//! # 数据模型
//!
//! 调度核心的数据结构：任务与延迟任务、批大小调节参数与样本、
//! 阶段闸门规则与游标进度，以及任务日志条目。
//! 所有需要写入共享状态存储的模型都以 JSON 序列化。

pub mod batch;
pub mod gate;
pub mod job;
pub mod job_log;

pub use batch::{BatchDecision, BatchSizingConfig, OutcomeSample};
pub use gate::{CursorProgress, GateCondition, PhaseRule};
pub use job::{DelayedJob, DispatchMode, Job};
pub use job_log::{JobLogEntry, JobStatus};
