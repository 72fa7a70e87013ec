use thiserror::Error;

/// 调度器错误类型定义
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("共享状态存储错误: {0}")]
    StateStore(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("执行后端错误: {0}")]
    ExecutionBackend(String),

    #[error("网络错误: {0}")]
    Network(String),

    #[error("数据验证失败: {0}")]
    ValidationError(String),

    #[error("无效的任务: {0}")]
    InvalidJob(String),

    #[error("IO错误: {0}")]
    Io(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

/// 统一的Result类型
pub type SchedulerResult<T> = std::result::Result<T, SchedulerError>;

impl SchedulerError {
    pub fn state_store<S: Into<String>>(msg: S) -> Self {
        Self::StateStore(msg.into())
    }
    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }
    pub fn validation_error<S: Into<String>>(msg: S) -> Self {
        Self::ValidationError(msg.into())
    }
    pub fn backend<S: Into<String>>(msg: S) -> Self {
        Self::ExecutionBackend(msg.into())
    }

    /// 临时性错误，下一个调度周期可能自行恢复
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SchedulerError::StateStore(_)
                | SchedulerError::ExecutionBackend(_)
                | SchedulerError::Network(_)
                | SchedulerError::Io(_)
        )
    }
}

impl From<serde_json::Error> for SchedulerError {
    fn from(err: serde_json::Error) -> Self {
        SchedulerError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for SchedulerError {
    fn from(err: std::io::Error) -> Self {
        SchedulerError::Io(err.to_string())
    }
}

impl From<anyhow::Error> for SchedulerError {
    fn from(err: anyhow::Error) -> Self {
        SchedulerError::Internal(err.to_string())
    }
}
