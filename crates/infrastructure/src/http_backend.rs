//! HTTP execution backend for the workflow-automation product

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use scheduler_config::BackendConfig;
use scheduler_core::{
    ExecutionBackend, ExecutionRequest, SchedulerError, SchedulerResult, FAILURE_SENTINEL,
};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument, warn};

const API_KEY_HEADER: &str = "X-N8N-API-KEY";

/// Upper bound on pages followed per count, guards against a cursor loop
const MAX_PAGES: usize = 1000;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExecutionsPage {
    #[serde(default)]
    data: Vec<serde_json::Value>,
    #[serde(default)]
    next_cursor: Option<String>,
}

fn network_err(e: reqwest::Error) -> SchedulerError {
    SchedulerError::Network(e.to_string())
}

pub struct HttpExecutionBackend {
    client: Client,
    config: BackendConfig,
}

impl HttpExecutionBackend {
    pub fn new(config: BackendConfig) -> SchedulerResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()
            .map_err(|e| SchedulerError::config_error(format!("无法创建HTTP客户端: {e}")))?;
        Ok(Self { client, config })
    }

    fn executions_url(&self) -> String {
        format!(
            "{}/api/v1/executions",
            self.config.api_url.trim_end_matches('/')
        )
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.api_key {
            Some(key) => request.header(API_KEY_HEADER, key),
            None => request,
        }
    }
}

fn failure_message(status: StatusCode, body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        format!("{FAILURE_SENTINEL}: HTTP {status}")
    } else {
        format!("{FAILURE_SENTINEL}: HTTP {status}: {body}")
    }
}

#[async_trait]
impl ExecutionBackend for HttpExecutionBackend {
    #[instrument(skip(self))]
    async fn count_active(&self) -> SchedulerResult<usize> {
        let limit = self.config.page_size.to_string();
        let mut cursor: Option<String> = None;
        let mut total = 0usize;

        for _ in 0..MAX_PAGES {
            let mut query: Vec<(&str, &str)> = vec![("status", "running"), ("limit", &limit)];
            if let Some(c) = cursor.as_deref() {
                query.push(("cursor", c));
            }

            let response = self
                .authorize(self.client.get(self.executions_url()).query(&query))
                .send()
                .await
                .map_err(network_err)?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(SchedulerError::backend(format!(
                    "查询运行中执行失败: HTTP {status}: {}",
                    body.trim()
                )));
            }

            let page: ExecutionsPage = response.json().await.map_err(|e| {
                SchedulerError::Serialization(format!("无法解析执行列表: {e}"))
            })?;
            total += page.data.len();

            match page.next_cursor.filter(|c| !c.is_empty()) {
                Some(next) => cursor = Some(next),
                None => {
                    debug!("运行中的执行数量: {}", total);
                    return Ok(total);
                }
            }
        }

        warn!("执行列表分页超过 {} 页，按已统计数量返回", MAX_PAGES);
        Ok(total)
    }

    #[instrument(skip(self, request), fields(workflow = %request.workflow))]
    async fn execute(&self, request: &ExecutionRequest) -> SchedulerResult<String> {
        let response = self
            .authorize(self.client.post(&self.config.runner_url).json(request))
            .send()
            .await
            .map_err(network_err)?;

        let status = response.status();
        let body = response.text().await.map_err(network_err)?;

        if status.is_success() {
            Ok(body)
        } else {
            Err(SchedulerError::backend(failure_message(status, &body)))
        }
    }
}
