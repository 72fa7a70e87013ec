use async_trait::async_trait;
use std::collections::BTreeMap;

use crate::SchedulerResult;

/// 共享状态存储抽象接口
///
/// 所有调度进程通过同一个存储协调队列、游标、批大小与闸门规则。
/// 只依赖单键原子操作；键名为相对键，命名空间前缀由实现负责。
#[async_trait]
pub trait StateStore: Send + Sync {
    /// 读取标量键
    async fn get(&self, key: &str) -> SchedulerResult<Option<String>>;

    /// 写入标量键
    async fn set(&self, key: &str, value: &str) -> SchedulerResult<()>;

    /// 键不存在时写入，返回是否写入成功
    async fn set_nx(&self, key: &str, value: &str) -> SchedulerResult<bool>;

    /// 删除任意类型的键，返回键是否存在
    async fn del(&self, key: &str) -> SchedulerResult<bool>;

    /// 从列表头部压入，返回压入后的长度
    async fn lpush(&self, key: &str, value: &str) -> SchedulerResult<usize>;

    /// 从列表尾部弹出
    async fn rpop(&self, key: &str) -> SchedulerResult<Option<String>>;

    async fn llen(&self, key: &str) -> SchedulerResult<usize>;

    /// 按下标读取列表区间，语义同 LRANGE（负数从尾部计）
    async fn lrange(&self, key: &str, start: isize, stop: isize) -> SchedulerResult<Vec<String>>;

    /// 裁剪列表，语义同 LTRIM
    async fn ltrim(&self, key: &str, start: isize, stop: isize) -> SchedulerResult<()>;

    /// 向有序集合添加成员
    async fn zadd(&self, key: &str, member: &str, score: i64) -> SchedulerResult<()>;

    async fn zcard(&self, key: &str) -> SchedulerResult<usize>;

    /// 按分数升序读取分数不大于 `max` 的成员（含分数），最多 `limit` 个
    async fn zrange_by_score(
        &self,
        key: &str,
        max: i64,
        limit: usize,
    ) -> SchedulerResult<Vec<(String, i64)>>;

    /// 原子地取出一个分数不大于 `now` 的成员
    ///
    /// 读取与删除必须在存储端一次完成，多个调度进程并发调用时
    /// 同一成员只会被一个调用方取到。
    async fn claim_due(&self, key: &str, now: i64) -> SchedulerResult<Option<String>>;

    async fn hset(&self, key: &str, field: &str, value: &str) -> SchedulerResult<()>;

    async fn hget(&self, key: &str, field: &str) -> SchedulerResult<Option<String>>;

    /// 批量读取哈希字段，结果顺序与 `fields` 一致
    async fn hmget(&self, key: &str, fields: &[&str]) -> SchedulerResult<Vec<Option<String>>>;

    async fn hgetall(&self, key: &str) -> SchedulerResult<BTreeMap<String, String>>;

    async fn hdel(&self, key: &str, field: &str) -> SchedulerResult<bool>;
}
