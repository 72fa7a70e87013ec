use scheduler_core::{CursorProgress, SchedulerError, SchedulerResult};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

type CursorDocument = BTreeMap<String, Map<String, Value>>;

/// 本地游标文件
///
/// 共享存储不可用或字段缺失时，阶段闸门从这里补齐游标。
/// 文件内容为 `{run_id: {field: number}}` 形式的 JSON。
#[derive(Debug, Clone)]
pub struct LocalCursorFile {
    path: PathBuf,
}

impl LocalCursorFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 读取整个文件；文件不存在时返回空文档
    pub async fn load(&self) -> SchedulerResult<CursorDocument> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) if raw.trim().is_empty() => Ok(CursorDocument::new()),
            Ok(raw) => serde_json::from_str(&raw).map_err(|e| {
                SchedulerError::Serialization(format!(
                    "游标文件 {} 格式错误: {e}",
                    self.path.display()
                ))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(CursorDocument::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// 读取某个运行中一个阶段的进度，任何读取问题都视为缺失
    pub async fn progress(&self, run_id: &str, phase: &str) -> CursorProgress {
        let document = match self.load().await {
            Ok(document) => document,
            Err(e) => {
                warn!("读取本地游标文件失败: {}", e);
                return CursorProgress::default();
            }
        };

        let Some(fields) = document.get(run_id) else {
            debug!("本地游标文件中没有运行 {}", run_id);
            return CursorProgress::default();
        };

        CursorProgress::new(
            fields
                .get(&CursorProgress::current_field(phase))
                .and_then(as_integer),
            fields
                .get(&CursorProgress::total_field(phase))
                .and_then(as_integer),
        )
    }

    pub async fn record(&self, run_id: &str, field: &str, value: i64) -> SchedulerResult<()> {
        let mut document = self.load().await?;
        document
            .entry(run_id.to_string())
            .or_default()
            .insert(field.to_string(), Value::from(value));
        self.save(&document).await
    }

    pub async fn reset(&self, run_id: &str) -> SchedulerResult<()> {
        let mut document = self.load().await?;
        if document.remove(run_id).is_some() {
            self.save(&document).await?;
        }
        Ok(())
    }

    async fn save(&self, document: &CursorDocument) -> SchedulerResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let rendered = serde_json::to_string_pretty(document)?;
        tokio::fs::write(&self.path, rendered).await?;
        Ok(())
    }
}

/// 接受整数或整数字符串，与共享存储中的字符串值保持一致
fn as_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
