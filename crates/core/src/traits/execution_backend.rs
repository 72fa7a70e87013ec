use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::models::{DispatchMode, Job};
use crate::SchedulerResult;

/// 执行后端返回的失败标记，输出以此开头即视为失败
pub const FAILURE_SENTINEL: &str = "Execution failed";

/// 判断执行输出是否为失败标记
pub fn is_failure_output(output: &str) -> bool {
    output.trim_start().starts_with(FAILURE_SENTINEL)
}

/// 一次工作流执行请求
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ExecutionRequest {
    pub workflow: String,
    pub mode: DispatchMode,
    pub inputs: Value,
    /// 传给执行环境的提示，例如批大小
    pub env: BTreeMap<String, String>,
}

impl ExecutionRequest {
    pub fn for_job(job: &Job, env: BTreeMap<String, String>) -> Self {
        Self {
            workflow: job.workflow.clone(),
            mode: job.mode,
            inputs: job.inputs.clone(),
            env,
        }
    }
}

/// 执行后端抽象接口
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    /// 当前正在运行的执行数量
    async fn count_active(&self) -> SchedulerResult<usize>;

    /// 执行一个工作流，返回后端输出
    async fn execute(&self, request: &ExecutionRequest) -> SchedulerResult<String>;
}
