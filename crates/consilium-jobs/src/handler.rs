//! Job handler trait and execution context.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use consilium_core::{Job, JobType};

/// Context provided to job handlers.
pub struct JobContext {
    /// The claimed job being processed.
    pub job: Job,
    /// Correlation id for log lines spanning this execution.
    pub request_id: Uuid,
}

impl JobContext {
    /// Create a new job context with a fresh correlation id.
    pub fn new(job: Job) -> Self {
        Self {
            job,
            request_id: Uuid::now_v7(),
        }
    }

    /// Get the job payload.
    pub fn payload(&self) -> &JsonValue {
        &self.job.payload
    }

    /// Get a string field from the payload.
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.job.payload.get(key).and_then(|v| v.as_str())
    }
}

/// Result of job execution.
#[derive(Debug)]
pub enum JobResult {
    /// Job completed; the job row moves to `done`.
    Success,
    /// Permanent failure; the job row moves to `failed` and nothing is
    /// re-enqueued.
    Failed(String),
    /// Transient failure; the job row moves to `failed` and the dispatcher
    /// re-enqueues a fresh job for the same target, up to the attempt bound.
    Retry(String),
}

/// Trait for job handlers.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// The job type this handler processes.
    fn job_type(&self) -> JobType;

    /// Execute the job.
    async fn execute(&self, ctx: JobContext) -> JobResult;
}

/// No-op handler for testing.
pub struct NoOpHandler {
    job_type: JobType,
}

impl NoOpHandler {
    /// Create a new no-op handler for the given job type.
    pub fn new(job_type: JobType) -> Self {
        Self { job_type }
    }
}

#[async_trait]
impl JobHandler for NoOpHandler {
    fn job_type(&self) -> JobType {
        self.job_type
    }

    async fn execute(&self, _ctx: JobContext) -> JobResult {
        JobResult::Success
    }
}
