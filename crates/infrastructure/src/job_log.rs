use async_trait::async_trait;
use scheduler_core::{JobLogEntry, JobLogSink, SchedulerResult};
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// 以 JSON Lines 追加写入的任务日志
pub struct FileJobLog {
    path: PathBuf,
    // 串行化同一进程内的追加写
    write_lock: Mutex<()>,
}

impl FileJobLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl JobLogSink for FileJobLog {
    async fn append(&self, entry: &JobLogEntry) -> SchedulerResult<()> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}
