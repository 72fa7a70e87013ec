use serde::{Deserialize, Serialize};

use crate::validation::{ConfigValidator, ValidationUtils};
use crate::ConfigResult;

/// 执行后端（工作流自动化产品）的访问配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// 公共 API 根地址，用于统计运行中的执行
    pub api_url: String,
    /// 接收执行请求的地址
    pub runner_url: String,
    pub api_key: Option<String>,
    pub request_timeout_seconds: u64,
    /// 统计运行中执行时每页条数
    pub page_size: usize,
    /// 任务运行器的 broker 端口，设置后作为环境提示传给执行
    pub broker_port: Option<u16>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            api_url: "http://127.0.0.1:5678".to_string(),
            runner_url: "http://127.0.0.1:5678/webhook/flow-scheduler/execute".to_string(),
            api_key: None,
            request_timeout_seconds: 300,
            page_size: 250,
            broker_port: None,
        }
    }
}

impl ConfigValidator for BackendConfig {
    fn validate(&self) -> ConfigResult<()> {
        ValidationUtils::validate_url(&self.api_url, "backend.api_url")?;
        ValidationUtils::validate_url(&self.runner_url, "backend.runner_url")?;
        ValidationUtils::validate_seconds(
            self.request_timeout_seconds,
            "backend.request_timeout_seconds",
        )?;
        ValidationUtils::validate_count(self.page_size, "backend.page_size", 1000)?;
        Ok(())
    }
}
