//! Test data builders with sensible defaults

use scheduler_core::{DispatchMode, Job};
use serde_json::Value;

/// Builder for creating test Job entities
pub struct JobBuilder {
    job: Job,
}

impl JobBuilder {
    pub fn new() -> Self {
        Self {
            job: Job::new("test_workflow", DispatchMode::ById),
        }
    }

    pub fn with_workflow(mut self, workflow: &str) -> Self {
        self.job.workflow = workflow.to_string();
        self
    }

    pub fn with_mode(mut self, mode: DispatchMode) -> Self {
        self.job.mode = mode;
        self
    }

    pub fn with_inputs(mut self, inputs: Value) -> Self {
        self.job.inputs = inputs;
        self
    }

    pub fn with_meta(mut self, key: &str, value: Value) -> Self {
        self.job.meta.insert(key.to_string(), value);
        self
    }

    pub fn with_phase(self, phase: &str) -> Self {
        self.with_meta("phase", Value::from(phase))
    }

    pub fn with_run_id(self, run_id: &str) -> Self {
        self.with_meta("run_id", Value::from(run_id))
    }

    pub fn with_batch_size(self, batch_size: u64) -> Self {
        self.with_meta("batch_size", Value::from(batch_size))
    }

    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.job.retry_count = retry_count;
        self
    }

    pub fn build(self) -> Job {
        self.job
    }
}

impl Default for JobBuilder {
    fn default() -> Self {
        Self::new()
    }
}
