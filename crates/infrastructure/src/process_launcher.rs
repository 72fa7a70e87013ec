use scheduler_core::{RefillLauncher, SchedulerError, SchedulerResult};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{info, warn};

/// 通过 `sh -c` 在后台启动补货命令
///
/// 启动后立即返回，由一个后台任务回收子进程并记录退出状态。
/// 必须在 tokio 运行时内调用。
#[derive(Debug, Default, Clone)]
pub struct ShellRefillLauncher;

impl ShellRefillLauncher {
    pub fn new() -> Self {
        Self
    }
}

impl RefillLauncher for ShellRefillLauncher {
    fn launch(&self, command: &str) -> SchedulerResult<()> {
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .spawn()
            .map_err(|e| SchedulerError::Io(format!("无法启动补货命令 `{command}`: {e}")))?;

        let pid = child.id();
        info!(event = "refill_launched", pid = ?pid, command = command, "补货命令已启动");

        let command = command.to_string();
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) if status.success() => {
                    info!(event = "refill_finished", command = %command, "补货命令执行完成");
                }
                Ok(status) => {
                    warn!(
                        event = "refill_finished",
                        command = %command,
                        status = %status,
                        "补货命令以非零状态退出"
                    );
                }
                Err(e) => warn!("等待补货命令结束失败: {}", e),
            }
        });

        Ok(())
    }
}
