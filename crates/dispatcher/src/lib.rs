//! 调度核心
//!
//! 队列、自适应批大小、阶段闸门、自动补货以及把它们串起来的轮询调度器。
//! 所有控制状态都保存在共享状态存储中。

pub mod auto_refiller;
pub mod batch_sizer;
pub mod phase_gate;
pub mod queue;
pub mod retry_policy;
pub mod scheduler;

pub use auto_refiller::AutoRefiller;
pub use batch_sizer::AdaptiveBatchSizer;
pub use phase_gate::PhaseGate;
pub use queue::{EnqueueAck, JobQueue, SubQueue};
pub use retry_policy::{RetryDecision, RetryPolicy};
pub use scheduler::{DispatchOutcome, JobScheduler, SchedulerSettings, TickReport};
