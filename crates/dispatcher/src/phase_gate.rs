use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use scheduler_core::{
    CursorProgress, GateCondition, PhaseRule, SchedulerError, SchedulerResult, StateStore,
};
use scheduler_infrastructure::LocalCursorFile;

use crate::queue::cursor_key;

pub const GATES_KEY: &str = "config:gates";

/// 从共享存储读到的游标字段
enum StoreProgress {
    Read(CursorProgress),
    /// 字段存在但不是整数
    Invalid,
    Unavailable,
}

/// 阶段闸门
///
/// 每个阶段最多一条规则，规则以 JSON 保存在 `config:gates` 哈希中。
/// 依赖阶段的游标优先从共享存储读取，存储失败或字段缺失时
/// 回退到本地游标文件；仍然无法确定时闸门关闭。
pub struct PhaseGate {
    store: Arc<dyn StateStore>,
    cursor_file: LocalCursorFile,
}

impl PhaseGate {
    pub fn new(store: Arc<dyn StateStore>, cursor_file: LocalCursorFile) -> Self {
        Self { store, cursor_file }
    }

    /// 写入或覆盖阶段规则，只接受可识别的条件
    pub async fn set_rule(
        &self,
        phase: &str,
        dependency: &str,
        condition: &str,
    ) -> SchedulerResult<PhaseRule> {
        if phase.trim().is_empty() || dependency.trim().is_empty() {
            return Err(SchedulerError::validation_error(
                "phase 和 dependency 不能为空",
            ));
        }
        let condition = GateCondition::from(condition);
        if !condition.is_recognized() {
            return Err(SchedulerError::config_error(format!(
                "不支持的闸门条件: {condition}，可选值: complete"
            )));
        }

        let rule = PhaseRule::new(dependency, condition);
        self.store
            .hset(GATES_KEY, phase, &serde_json::to_string(&rule)?)
            .await?;
        info!(
            event = "gate_rule_set",
            phase = phase,
            dependency = dependency,
            condition = %rule.condition,
            "闸门规则已更新"
        );
        Ok(rule)
    }

    pub async fn get_rule(&self, phase: &str) -> SchedulerResult<Option<PhaseRule>> {
        match self.store.hget(GATES_KEY, phase).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// 列出全部规则，跳过无法解析的条目
    pub async fn list_rules(&self) -> SchedulerResult<BTreeMap<String, PhaseRule>> {
        let raw = self.store.hgetall(GATES_KEY).await?;
        Ok(raw
            .into_iter()
            .filter_map(|(phase, rule)| match serde_json::from_str(&rule) {
                Ok(rule) => Some((phase, rule)),
                Err(e) => {
                    warn!("阶段 {} 的闸门规则无法解析: {}", phase, e);
                    None
                }
            })
            .collect())
    }

    pub async fn remove_rule(&self, phase: &str) -> SchedulerResult<bool> {
        let removed = self.store.hdel(GATES_KEY, phase).await?;
        if removed {
            info!(event = "gate_rule_removed", phase = phase, "闸门规则已删除");
        }
        Ok(removed)
    }

    /// 判断某个运行中的阶段是否可以执行
    ///
    /// 读取规则本身失败时返回错误；规则无法解析时视为关闭。
    pub async fn can_run(&self, run_id: &str, phase: &str) -> SchedulerResult<bool> {
        let rule = match self.get_rule(phase).await {
            Ok(Some(rule)) => rule,
            Ok(None) => return Ok(true),
            Err(SchedulerError::Serialization(e)) => {
                warn!("阶段 {} 的闸门规则无法解析，闸门关闭: {}", phase, e);
                return Ok(false);
            }
            Err(e) => return Err(e),
        };

        if let GateCondition::Unrecognized(condition) = &rule.condition {
            warn!(
                event = "gate_condition_unrecognized",
                phase = phase,
                condition = %condition,
                "无法识别的闸门条件，按放行处理"
            );
            return Ok(true);
        }

        let progress = match self.read_store_progress(run_id, &rule.dependency).await {
            StoreProgress::Invalid => return Ok(false),
            StoreProgress::Read(progress) if progress.is_resolved() => progress,
            StoreProgress::Read(progress) => progress.fill_from(
                self.cursor_file
                    .progress(run_id, &rule.dependency)
                    .await,
            ),
            StoreProgress::Unavailable => {
                self.cursor_file
                    .progress(run_id, &rule.dependency)
                    .await
            }
        };

        let open = match rule.condition {
            GateCondition::Complete => progress.is_complete(),
            GateCondition::Unrecognized(_) => true,
        };

        debug!(
            run_id = run_id,
            phase = phase,
            dependency = %rule.dependency,
            current = ?progress.current,
            total = ?progress.total,
            open = open,
            "闸门判定"
        );
        Ok(open)
    }

    async fn read_store_progress(&self, run_id: &str, dependency: &str) -> StoreProgress {
        let current_field = CursorProgress::current_field(dependency);
        let total_field = CursorProgress::total_field(dependency);

        let values = match self
            .store
            .hmget(&cursor_key(run_id), &[current_field.as_str(), total_field.as_str()])
            .await
        {
            Ok(values) => values,
            Err(e) => {
                warn!("读取游标失败，改用本地游标文件: {}", e);
                return StoreProgress::Unavailable;
            }
        };

        let mut parsed = [None, None];
        for (slot, value) in parsed.iter_mut().zip(values.iter()) {
            if let Some(raw) = value {
                match raw.trim().parse::<i64>() {
                    Ok(n) => *slot = Some(n),
                    Err(_) => {
                        warn!("游标值不是整数: {}", raw);
                        return StoreProgress::Invalid;
                    }
                }
            }
        }

        StoreProgress::Read(CursorProgress::new(parsed[0], parsed[1]))
    }
}
