use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use scheduler_core::{now_millis, DelayedJob, DispatchMode, Job, SchedulerResult, StateStore};

pub const QUEUE_KEY: &str = "job_queue";
pub const DELAYED_KEY: &str = "job_queue:delayed";

/// 单次出队最多跳过的损坏条目数
pub const MAX_DEQUEUE_ATTEMPTS: usize = 16;

pub fn cursor_key(run_id: &str) -> String {
    format!("cursors:{run_id}")
}

/// 任务写入的子队列
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubQueue {
    Ready,
    Delayed,
}

impl fmt::Display for SubQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubQueue::Ready => f.write_str("ready"),
            SubQueue::Delayed => f.write_str("delayed"),
        }
    }
}

/// 入队回执
#[derive(Debug, Clone, PartialEq)]
pub struct EnqueueAck {
    pub job_id: Uuid,
    pub target: SubQueue,
    /// 写入后目标子队列的长度
    pub depth: usize,
    pub ready_at: Option<i64>,
}

/// 基于共享状态存储的任务队列
///
/// 就绪队列是一个列表（头部写入、尾部弹出），延迟队列是按就绪时间
/// 排序的有序集合。出队时优先取已到期的延迟任务。
#[derive(Clone)]
pub struct JobQueue {
    store: Arc<dyn StateStore>,
}

impl JobQueue {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    pub async fn enqueue(
        &self,
        workflow: &str,
        inputs: Value,
        mode: DispatchMode,
        meta: Map<String, Value>,
        delay_ms: u64,
    ) -> SchedulerResult<EnqueueAck> {
        let job = Job::new(workflow, mode).with_inputs(inputs).with_meta(meta);
        self.enqueue_job(&job, delay_ms).await
    }

    pub async fn enqueue_job(&self, job: &Job, delay_ms: u64) -> SchedulerResult<EnqueueAck> {
        job.validate()?;
        let payload = job.to_json()?;

        let ack = if delay_ms == 0 {
            let depth = self.store.lpush(QUEUE_KEY, &payload).await?;
            EnqueueAck {
                job_id: job.id,
                target: SubQueue::Ready,
                depth,
                ready_at: None,
            }
        } else {
            let delay = i64::try_from(delay_ms).unwrap_or(i64::MAX);
            let ready_at = now_millis().saturating_add(delay);
            self.store.zadd(DELAYED_KEY, &payload, ready_at).await?;
            let depth = self.store.zcard(DELAYED_KEY).await?;
            EnqueueAck {
                job_id: job.id,
                target: SubQueue::Delayed,
                depth,
                ready_at: Some(ready_at),
            }
        };

        info!(
            event = "job_enqueued",
            job.id = %job.id,
            job.workflow = %job.workflow,
            queue = %ack.target,
            depth = ack.depth,
            delay_ms = delay_ms,
            "任务已入队"
        );
        Ok(ack)
    }

    /// 重新入队，保留任务ID、元数据与重试次数
    pub async fn requeue(&self, job: &Job, delay_ms: u64) -> SchedulerResult<EnqueueAck> {
        self.enqueue_job(job, delay_ms).await
    }

    /// 取出下一个任务，已到期的延迟任务优先
    pub async fn dequeue(&self) -> SchedulerResult<Option<Job>> {
        for _ in 0..MAX_DEQUEUE_ATTEMPTS {
            let raw = match self.store.claim_due(DELAYED_KEY, now_millis()).await? {
                Some(raw) => raw,
                None => match self.store.rpop(QUEUE_KEY).await? {
                    Some(raw) => raw,
                    None => return Ok(None),
                },
            };

            match Job::from_json(&raw) {
                Ok(job) => {
                    debug!("任务 {} 出队", job.id);
                    return Ok(Some(job));
                }
                Err(e) => {
                    warn!(event = "malformed_entry", error = %e, entry = %raw, "丢弃无法解析的队列条目");
                }
            }
        }

        warn!("连续 {} 个队列条目无法解析，本次出队放弃", MAX_DEQUEUE_ATTEMPTS);
        Ok(None)
    }

    pub async fn size(&self) -> SchedulerResult<usize> {
        self.store.llen(QUEUE_KEY).await
    }

    pub async fn delayed_size(&self) -> SchedulerResult<usize> {
        self.store.zcard(DELAYED_KEY).await
    }

    /// 查看就绪队列中最早入队的任务，按出队顺序排列
    pub async fn list_jobs(&self, limit: usize) -> SchedulerResult<Vec<Job>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let start = -(limit.min(isize::MAX as usize) as isize);
        let mut raw = self.store.lrange(QUEUE_KEY, start, -1).await?;
        raw.reverse();
        Ok(raw.iter().filter_map(|entry| decode_or_warn(entry)).collect())
    }

    /// 查看延迟队列，按就绪时间升序
    pub async fn list_delayed(&self, limit: usize) -> SchedulerResult<Vec<DelayedJob>> {
        let raw = self
            .store
            .zrange_by_score(DELAYED_KEY, i64::MAX, limit)
            .await?;
        Ok(raw
            .iter()
            .filter_map(|(entry, ready_at)| {
                decode_or_warn(entry).map(|job| DelayedJob {
                    job,
                    ready_at: *ready_at,
                })
            })
            .collect())
    }

    /// 清空两个子队列，返回清除前的 (就绪, 延迟) 数量
    pub async fn clear(&self) -> SchedulerResult<(usize, usize)> {
        let ready = self.size().await?;
        let delayed = self.delayed_size().await?;
        self.store.del(QUEUE_KEY).await?;
        self.store.del(DELAYED_KEY).await?;
        info!(event = "queue_cleared", ready = ready, delayed = delayed, "队列已清空");
        Ok((ready, delayed))
    }

    pub async fn set_cursor(&self, run_id: &str, field: &str, value: i64) -> SchedulerResult<()> {
        self.store
            .hset(&cursor_key(run_id), field, &value.to_string())
            .await
    }

    pub async fn get_cursor(&self, run_id: &str, field: &str) -> SchedulerResult<Option<i64>> {
        let raw = self.store.hget(&cursor_key(run_id), field).await?;
        Ok(raw.and_then(|v| match v.trim().parse() {
            Ok(n) => Some(n),
            Err(_) => {
                warn!("游标 {}.{} 的值不是整数: {}", run_id, field, v);
                None
            }
        }))
    }

    pub async fn get_all_cursors(&self, run_id: &str) -> SchedulerResult<BTreeMap<String, String>> {
        self.store.hgetall(&cursor_key(run_id)).await
    }

    /// 删除某个运行的全部游标，返回是否存在
    pub async fn reset_cursors(&self, run_id: &str) -> SchedulerResult<bool> {
        self.store.del(&cursor_key(run_id)).await
    }
}

fn decode_or_warn(entry: &str) -> Option<Job> {
    match Job::from_json(entry) {
        Ok(job) => Some(job),
        Err(e) => {
            warn!("跳过无法解析的队列条目: {}", e);
            None
        }
    }
}
