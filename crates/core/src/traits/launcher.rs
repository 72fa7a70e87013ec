use crate::SchedulerResult;

/// 以后台方式启动补货命令，不等待命令结束
pub trait RefillLauncher: Send + Sync {
    fn launch(&self, command: &str) -> SchedulerResult<()>;
}
