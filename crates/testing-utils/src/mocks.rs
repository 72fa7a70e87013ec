//! Hand-written test doubles for the collaborator traits
//!
//! Each mock records what it was asked to do so tests can assert on it
//! afterwards, and can be scripted to fail.

use async_trait::async_trait;
use scheduler_core::{
    ExecutionBackend, ExecutionRequest, JobLogEntry, JobLogSink, RefillLauncher, SchedulerError,
    SchedulerResult, StateStore,
};
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Scripted result for one `execute` call
#[derive(Debug, Clone)]
pub enum ScriptedExecution {
    Output(String),
    Error(String),
}

/// Mock implementation of ExecutionBackend for testing
///
/// `execute` consumes scripted results in order and falls back to a plain
/// success output once the script runs out.
#[derive(Debug, Clone, Default)]
pub struct MockExecutionBackend {
    active: Arc<Mutex<usize>>,
    count_fails: Arc<Mutex<bool>>,
    script: Arc<Mutex<VecDeque<ScriptedExecution>>>,
    latency: Arc<Mutex<Option<Duration>>>,
    requests: Arc<Mutex<Vec<ExecutionRequest>>>,
}

impl MockExecutionBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_active(self, active: usize) -> Self {
        self.set_active(active);
        self
    }

    pub fn set_active(&self, active: usize) {
        *self.active.lock().unwrap() = active;
    }

    pub fn fail_count_active(&self, fail: bool) {
        *self.count_fails.lock().unwrap() = fail;
    }

    pub fn push_output(&self, output: &str) {
        self.script
            .lock()
            .unwrap()
            .push_back(ScriptedExecution::Output(output.to_string()));
    }

    pub fn push_error(&self, message: &str) {
        self.script
            .lock()
            .unwrap()
            .push_back(ScriptedExecution::Error(message.to_string()));
    }

    /// Make every `execute` call take at least `latency`
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = Some(latency);
    }

    pub fn requests(&self) -> Vec<ExecutionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn execution_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl ExecutionBackend for MockExecutionBackend {
    async fn count_active(&self) -> SchedulerResult<usize> {
        if *self.count_fails.lock().unwrap() {
            return Err(SchedulerError::Network("backend unreachable".to_string()));
        }
        Ok(*self.active.lock().unwrap())
    }

    async fn execute(&self, request: &ExecutionRequest) -> SchedulerResult<String> {
        self.requests.lock().unwrap().push(request.clone());

        let latency = *self.latency.lock().unwrap();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(ScriptedExecution::Output(output)) => Ok(output),
            Some(ScriptedExecution::Error(message)) => Err(SchedulerError::backend(message)),
            None => Ok("Execution was successful".to_string()),
        }
    }
}

/// Mock implementation of JobLogSink that keeps entries in memory
#[derive(Debug, Clone, Default)]
pub struct RecordingJobLog {
    entries: Arc<Mutex<Vec<JobLogEntry>>>,
    fail: Arc<Mutex<bool>>,
}

impl RecordingJobLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }

    pub fn entries(&self) -> Vec<JobLogEntry> {
        self.entries.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobLogSink for RecordingJobLog {
    async fn append(&self, entry: &JobLogEntry) -> SchedulerResult<()> {
        if *self.fail.lock().unwrap() {
            return Err(SchedulerError::Io("disk full".to_string()));
        }
        self.entries.lock().unwrap().push(entry.clone());
        Ok(())
    }
}

/// Mock implementation of RefillLauncher that records commands
#[derive(Debug, Clone, Default)]
pub struct RecordingLauncher {
    commands: Arc<Mutex<Vec<String>>>,
    fail: Arc<Mutex<bool>>,
}

impl RecordingLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    pub fn launch_count(&self) -> usize {
        self.commands.lock().unwrap().len()
    }
}

impl RefillLauncher for RecordingLauncher {
    fn launch(&self, command: &str) -> SchedulerResult<()> {
        self.commands.lock().unwrap().push(command.to_string());
        if *self.fail.lock().unwrap() {
            return Err(SchedulerError::Io(format!("cannot spawn {command}")));
        }
        Ok(())
    }
}

/// StateStore wrapper that fails selected operations
///
/// Operations are named after the trait methods (`"hmget"`, `"rpop"`, ...).
/// `unreachable()` builds a store where every operation fails.
pub struct FaultyStateStore {
    inner: Arc<dyn StateStore>,
    failing: Mutex<HashSet<&'static str>>,
    fail_all: bool,
}

impl FaultyStateStore {
    pub fn new(inner: Arc<dyn StateStore>) -> Self {
        Self {
            inner,
            failing: Mutex::new(HashSet::new()),
            fail_all: false,
        }
    }

    pub fn unreachable() -> Self {
        Self {
            inner: crate::helpers::memory_store(),
            failing: Mutex::new(HashSet::new()),
            fail_all: true,
        }
    }

    pub fn fail_on(&self, operation: &'static str) {
        self.failing.lock().unwrap().insert(operation);
    }

    fn check(&self, operation: &'static str) -> SchedulerResult<()> {
        if self.fail_all || self.failing.lock().unwrap().contains(operation) {
            return Err(SchedulerError::state_store(format!(
                "{operation}: connection refused"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl StateStore for FaultyStateStore {
    async fn get(&self, key: &str) -> SchedulerResult<Option<String>> {
        self.check("get")?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> SchedulerResult<()> {
        self.check("set")?;
        self.inner.set(key, value).await
    }

    async fn set_nx(&self, key: &str, value: &str) -> SchedulerResult<bool> {
        self.check("set_nx")?;
        self.inner.set_nx(key, value).await
    }

    async fn del(&self, key: &str) -> SchedulerResult<bool> {
        self.check("del")?;
        self.inner.del(key).await
    }

    async fn lpush(&self, key: &str, value: &str) -> SchedulerResult<usize> {
        self.check("lpush")?;
        self.inner.lpush(key, value).await
    }

    async fn rpop(&self, key: &str) -> SchedulerResult<Option<String>> {
        self.check("rpop")?;
        self.inner.rpop(key).await
    }

    async fn llen(&self, key: &str) -> SchedulerResult<usize> {
        self.check("llen")?;
        self.inner.llen(key).await
    }

    async fn lrange(&self, key: &str, start: isize, stop: isize) -> SchedulerResult<Vec<String>> {
        self.check("lrange")?;
        self.inner.lrange(key, start, stop).await
    }

    async fn ltrim(&self, key: &str, start: isize, stop: isize) -> SchedulerResult<()> {
        self.check("ltrim")?;
        self.inner.ltrim(key, start, stop).await
    }

    async fn zadd(&self, key: &str, member: &str, score: i64) -> SchedulerResult<()> {
        self.check("zadd")?;
        self.inner.zadd(key, member, score).await
    }

    async fn zcard(&self, key: &str) -> SchedulerResult<usize> {
        self.check("zcard")?;
        self.inner.zcard(key).await
    }

    async fn zrange_by_score(
        &self,
        key: &str,
        max: i64,
        limit: usize,
    ) -> SchedulerResult<Vec<(String, i64)>> {
        self.check("zrange_by_score")?;
        self.inner.zrange_by_score(key, max, limit).await
    }

    async fn claim_due(&self, key: &str, now: i64) -> SchedulerResult<Option<String>> {
        self.check("claim_due")?;
        self.inner.claim_due(key, now).await
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> SchedulerResult<()> {
        self.check("hset")?;
        self.inner.hset(key, field, value).await
    }

    async fn hget(&self, key: &str, field: &str) -> SchedulerResult<Option<String>> {
        self.check("hget")?;
        self.inner.hget(key, field).await
    }

    async fn hmget(&self, key: &str, fields: &[&str]) -> SchedulerResult<Vec<Option<String>>> {
        self.check("hmget")?;
        self.inner.hmget(key, fields).await
    }

    async fn hgetall(&self, key: &str) -> SchedulerResult<BTreeMap<String, String>> {
        self.check("hgetall")?;
        self.inner.hgetall(key).await
    }

    async fn hdel(&self, key: &str, field: &str) -> SchedulerResult<bool> {
        self.check("hdel")?;
        self.inner.hdel(key, field).await
    }
}
