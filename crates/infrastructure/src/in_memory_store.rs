use async_trait::async_trait;
use scheduler_core::{SchedulerError, SchedulerResult, StateStore};
use std::collections::{BTreeMap, HashMap, VecDeque};
use tokio::sync::Mutex;
use tracing::info;

/// 单个键的取值，类型与 Redis 的数据结构一一对应
#[derive(Debug, Clone)]
enum Entry {
    Str(String),
    List(VecDeque<String>),
    /// member -> score
    ZSet(HashMap<String, i64>),
    Hash(BTreeMap<String, String>),
}

impl Entry {
    fn is_empty(&self) -> bool {
        match self {
            Entry::Str(_) => false,
            Entry::List(list) => list.is_empty(),
            Entry::ZSet(set) => set.is_empty(),
            Entry::Hash(hash) => hash.is_empty(),
        }
    }
}

fn wrong_type(key: &str) -> SchedulerError {
    SchedulerError::state_store(format!(
        "WRONGTYPE: 键 {key} 上的操作与已有值的类型不符"
    ))
}

/// 将 LRANGE/LTRIM 风格的下标换算为闭区间，区间为空时返回 None
fn normalize_range(start: isize, stop: isize, len: usize) -> Option<(usize, usize)> {
    let len = len as isize;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if len == 0 || start > stop || start >= len {
        None
    } else {
        Some((start as usize, stop as usize))
    }
}

/// 内存状态存储
///
/// 用于测试和单进程部署。所有操作在同一把锁内完成，
/// 因此 `claim_due` 的读取与删除天然是原子的。
#[derive(Debug, Default)]
pub struct InMemoryStateStore {
    data: Mutex<HashMap<String, Entry>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        info!("Creating in-memory state store");
        Self::default()
    }
}

macro_rules! typed_mut {
    ($data:expr, $key:expr, $variant:ident, $default:expr) => {{
        let entry = $data
            .entry($key.to_string())
            .or_insert_with(|| Entry::$variant($default));
        match entry {
            Entry::$variant(inner) => inner,
            _ => return Err(wrong_type($key)),
        }
    }};
}

macro_rules! typed_ref {
    ($data:expr, $key:expr, $variant:ident) => {{
        match $data.get($key) {
            None => None,
            Some(Entry::$variant(inner)) => Some(inner),
            Some(_) => return Err(wrong_type($key)),
        }
    }};
}

fn prune(data: &mut HashMap<String, Entry>, key: &str) {
    if data.get(key).is_some_and(Entry::is_empty) {
        data.remove(key);
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn get(&self, key: &str) -> SchedulerResult<Option<String>> {
        let data = self.data.lock().await;
        Ok(typed_ref!(data, key, Str).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> SchedulerResult<()> {
        let mut data = self.data.lock().await;
        data.insert(key.to_string(), Entry::Str(value.to_string()));
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: &str) -> SchedulerResult<bool> {
        let mut data = self.data.lock().await;
        if data.contains_key(key) {
            return Ok(false);
        }
        data.insert(key.to_string(), Entry::Str(value.to_string()));
        Ok(true)
    }

    async fn del(&self, key: &str) -> SchedulerResult<bool> {
        let mut data = self.data.lock().await;
        Ok(data.remove(key).is_some())
    }

    async fn lpush(&self, key: &str, value: &str) -> SchedulerResult<usize> {
        let mut data = self.data.lock().await;
        let list = typed_mut!(data, key, List, VecDeque::new());
        list.push_front(value.to_string());
        Ok(list.len())
    }

    async fn rpop(&self, key: &str) -> SchedulerResult<Option<String>> {
        let mut data = self.data.lock().await;
        let popped = match data.get_mut(key) {
            None => None,
            Some(Entry::List(list)) => list.pop_back(),
            Some(_) => return Err(wrong_type(key)),
        };
        prune(&mut data, key);
        Ok(popped)
    }

    async fn llen(&self, key: &str) -> SchedulerResult<usize> {
        let data = self.data.lock().await;
        Ok(typed_ref!(data, key, List).map_or(0, VecDeque::len))
    }

    async fn lrange(&self, key: &str, start: isize, stop: isize) -> SchedulerResult<Vec<String>> {
        let data = self.data.lock().await;
        let Some(list) = typed_ref!(data, key, List) else {
            return Ok(Vec::new());
        };
        Ok(match normalize_range(start, stop, list.len()) {
            Some((from, to)) => list.range(from..=to).cloned().collect(),
            None => Vec::new(),
        })
    }

    async fn ltrim(&self, key: &str, start: isize, stop: isize) -> SchedulerResult<()> {
        let mut data = self.data.lock().await;
        match data.get_mut(key) {
            None => return Ok(()),
            Some(Entry::List(list)) => match normalize_range(start, stop, list.len()) {
                Some((from, to)) => {
                    list.truncate(to + 1);
                    list.drain(..from);
                }
                None => list.clear(),
            },
            Some(_) => return Err(wrong_type(key)),
        }
        prune(&mut data, key);
        Ok(())
    }

    async fn zadd(&self, key: &str, member: &str, score: i64) -> SchedulerResult<()> {
        let mut data = self.data.lock().await;
        let set = typed_mut!(data, key, ZSet, HashMap::new());
        set.insert(member.to_string(), score);
        Ok(())
    }

    async fn zcard(&self, key: &str) -> SchedulerResult<usize> {
        let data = self.data.lock().await;
        Ok(typed_ref!(data, key, ZSet).map_or(0, HashMap::len))
    }

    async fn zrange_by_score(
        &self,
        key: &str,
        max: i64,
        limit: usize,
    ) -> SchedulerResult<Vec<(String, i64)>> {
        let data = self.data.lock().await;
        let Some(set) = typed_ref!(data, key, ZSet) else {
            return Ok(Vec::new());
        };
        let mut due: Vec<(String, i64)> = set
            .iter()
            .filter(|(_, score)| **score <= max)
            .map(|(member, score)| (member.clone(), *score))
            .collect();
        // 与 Redis 一致：分数相同时按成员字典序
        due.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        due.truncate(limit);
        Ok(due)
    }

    async fn claim_due(&self, key: &str, now: i64) -> SchedulerResult<Option<String>> {
        let mut data = self.data.lock().await;
        let claimed = match data.get_mut(key) {
            None => None,
            Some(Entry::ZSet(set)) => {
                let next = set
                    .iter()
                    .filter(|(_, score)| **score <= now)
                    .min_by(|a, b| a.1.cmp(b.1).then_with(|| a.0.cmp(b.0)))
                    .map(|(member, _)| member.clone());
                if let Some(member) = &next {
                    set.remove(member);
                }
                next
            }
            Some(_) => return Err(wrong_type(key)),
        };
        prune(&mut data, key);
        Ok(claimed)
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> SchedulerResult<()> {
        let mut data = self.data.lock().await;
        let hash = typed_mut!(data, key, Hash, BTreeMap::new());
        hash.insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn hget(&self, key: &str, field: &str) -> SchedulerResult<Option<String>> {
        let data = self.data.lock().await;
        Ok(typed_ref!(data, key, Hash).and_then(|hash| hash.get(field).cloned()))
    }

    async fn hmget(&self, key: &str, fields: &[&str]) -> SchedulerResult<Vec<Option<String>>> {
        let data = self.data.lock().await;
        let hash = typed_ref!(data, key, Hash);
        Ok(fields
            .iter()
            .map(|field| hash.and_then(|h| h.get(*field).cloned()))
            .collect())
    }

    async fn hgetall(&self, key: &str) -> SchedulerResult<BTreeMap<String, String>> {
        let data = self.data.lock().await;
        Ok(typed_ref!(data, key, Hash).cloned().unwrap_or_default())
    }

    async fn hdel(&self, key: &str, field: &str) -> SchedulerResult<bool> {
        let mut data = self.data.lock().await;
        let removed = match data.get_mut(key) {
            None => false,
            Some(Entry::Hash(hash)) => hash.remove(field).is_some(),
            Some(_) => return Err(wrong_type(key)),
        };
        prune(&mut data, key);
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_range() {
        assert_eq!(normalize_range(0, -1, 5), Some((0, 4)));
        assert_eq!(normalize_range(0, 9, 3), Some((0, 2)));
        assert_eq!(normalize_range(-2, -1, 5), Some((3, 4)));
        assert_eq!(normalize_range(3, 1, 5), None);
        assert_eq!(normalize_range(0, -1, 0), None);
        assert_eq!(normalize_range(7, 9, 5), None);
    }

    #[tokio::test]
    async fn test_list_is_fifo_through_lpush_rpop() {
        let store = InMemoryStateStore::new();
        store.lpush("q", "a").await.unwrap();
        store.lpush("q", "b").await.unwrap();
        assert_eq!(store.rpop("q").await.unwrap().as_deref(), Some("a"));
        assert_eq!(store.rpop("q").await.unwrap().as_deref(), Some("b"));
        assert_eq!(store.rpop("q").await.unwrap(), None);
        assert_eq!(store.llen("q").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_ltrim_keeps_window() {
        let store = InMemoryStateStore::new();
        for v in ["1", "2", "3", "4"] {
            store.lpush("l", v).await.unwrap();
        }
        store.ltrim("l", 0, 1).await.unwrap();
        assert_eq!(store.lrange("l", 0, -1).await.unwrap(), vec!["4", "3"]);
    }

    #[tokio::test]
    async fn test_claim_due_takes_earliest_ready() {
        let store = InMemoryStateStore::new();
        store.zadd("z", "late", 200).await.unwrap();
        store.zadd("z", "early", 100).await.unwrap();
        assert_eq!(store.claim_due("z", 50).await.unwrap(), None);
        assert_eq!(store.claim_due("z", 250).await.unwrap().as_deref(), Some("early"));
        assert_eq!(store.zcard("z").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_type_mismatch_is_an_error() {
        let store = InMemoryStateStore::new();
        store.set("k", "v").await.unwrap();
        assert!(store.lpush("k", "x").await.is_err());
        assert!(store.hget("k", "f").await.is_err());
    }

    #[tokio::test]
    async fn test_hmget_preserves_order() {
        let store = InMemoryStateStore::new();
        store.hset("h", "b", "2").await.unwrap();
        store.hset("h", "a", "1").await.unwrap();
        let values = store.hmget("h", &["b", "missing", "a"]).await.unwrap();
        assert_eq!(values, vec![Some("2".into()), None, Some("1".into())]);
    }
}
