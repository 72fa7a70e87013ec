use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::{debug, error, info};

use scheduler_core::RefillLauncher;

pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(10);

/// 队列低水位时触发外部补货命令
pub struct AutoRefiller {
    launcher: Arc<dyn RefillLauncher>,
    cooldown: Duration,
    last_trigger: Mutex<Option<Instant>>,
}

impl AutoRefiller {
    pub fn new(launcher: Arc<dyn RefillLauncher>, cooldown: Duration) -> Self {
        Self {
            launcher,
            cooldown,
            last_trigger: Mutex::new(None),
        }
    }

    /// 队列长度低于阈值且已过冷却期时启动补货命令，返回是否触发
    ///
    /// 启动失败也会记录触发时间，避免损坏的命令在每个周期反复执行。
    pub async fn check_and_refill(
        &self,
        current_size: usize,
        threshold: usize,
        command: &str,
    ) -> bool {
        if current_size >= threshold {
            return false;
        }

        let mut last_trigger = self.last_trigger.lock().await;
        if let Some(last) = *last_trigger {
            let elapsed = last.elapsed();
            if elapsed < self.cooldown {
                debug!("补货冷却中，剩余 {:?}", self.cooldown.saturating_sub(elapsed));
                return false;
            }
        }

        info!(
            event = "refill_triggered",
            queue_size = current_size,
            threshold = threshold,
            "队列低于阈值，启动补货命令"
        );
        if let Err(e) = self.launcher.launch(command) {
            error!("补货命令启动失败: {}", e);
        }
        *last_trigger = Some(Instant::now());
        true
    }
}
