use async_trait::async_trait;

use crate::models::JobLogEntry;
use crate::SchedulerResult;

/// 任务日志输出端，只追加
#[async_trait]
pub trait JobLogSink: Send + Sync {
    async fn append(&self, entry: &JobLogEntry) -> SchedulerResult<()>;
}
