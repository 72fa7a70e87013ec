use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::Job;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Success,
    Failed,
}

/// 任务日志中的一行，每次派发尝试写入一条
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobLogEntry {
    pub timestamp: DateTime<Utc>,
    pub job_id: Uuid,
    pub workflow: String,
    pub status: JobStatus,
    /// 耗时（秒）
    pub duration: f64,
    pub error: Option<String>,
    pub meta: Map<String, Value>,
    pub retry_count: u32,
    pub batch_size: usize,
}

impl JobLogEntry {
    pub fn from_attempt(
        job: &Job,
        status: JobStatus,
        duration_ms: f64,
        error: Option<String>,
        batch_size: usize,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            job_id: job.id,
            workflow: job.workflow.clone(),
            status,
            duration: duration_ms / 1000.0,
            error,
            meta: job.meta.clone(),
            retry_count: job.retry_count,
            batch_size,
        }
    }
}
