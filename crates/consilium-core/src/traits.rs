//! Service seams for the registry.
//!
//! Every collaborator the core logic talks to sits behind one of these
//! traits so that handlers, the dispatcher, and the verifier can be
//! exercised against in-memory fakes. Implementations are injected as
//! `Arc<dyn Trait>`; nothing reaches for a global.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::time::Duration;

use crate::error::Result;
use crate::models::{Document, Job, JobType, NewDocument, ObjectInfo, ToolOutput};

/// Durable job queue.
///
/// Claim semantics are the heart of the contract: `claim_next` must
/// atomically select the oldest pending job of the given type, flip it to
/// processing, and increment its attempt counter so that no two dispatchers
/// can ever claim the same job.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new pending job and return it.
    async fn enqueue(&self, job_type: JobType, payload: JsonValue) -> Result<Job>;

    /// Atomically claim the oldest pending job of `job_type`, moving it to
    /// processing and bumping `attempts`. Returns `None` when the queue for
    /// that type is empty.
    async fn claim_next(&self, job_type: JobType) -> Result<Option<Job>>;

    /// Mark a processing job done.
    async fn complete(&self, id: i64) -> Result<()>;

    /// Mark a processing job failed, recording the reason.
    async fn fail(&self, id: i64, error: &str) -> Result<()>;

    /// Fetch a job by id.
    async fn get(&self, id: i64) -> Result<Job>;
}

/// Durable document registry rows.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert a new document row and return it.
    async fn insert(&self, doc: NewDocument) -> Result<Document>;

    /// Fetch a document by doc id; `None` when absent.
    async fn get(&self, doc_id: &str) -> Result<Option<Document>>;

    /// Overwrite the recorded content hash.
    async fn update_sha(&self, doc_id: &str, sha256: &str) -> Result<()>;

    /// Overwrite the document status.
    async fn set_status(&self, doc_id: &str, status: &str) -> Result<()>;

    /// Replace the tag list.
    async fn set_tags(&self, doc_id: &str, tags: &[String]) -> Result<()>;

    /// Shallow-merge keys into `origin_meta`, keeping unrelated keys.
    async fn merge_origin_meta(&self, doc_id: &str, patch: JsonValue) -> Result<()>;

    /// Documents eligible for integrity verification: those whose status is
    /// in `statuses`, oldest-updated first, capped at `limit`. Documents
    /// lacking a storage ref or recorded hash are still selected so the
    /// verifier can record them as errors.
    async fn list_for_integrity(&self, statuses: &[String], limit: i64) -> Result<Vec<Document>>;
}

/// Binary content storage.
///
/// `storage_ref` is opaque to callers; only the store interprets it.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Retrieve the full content behind a storage ref.
    async fn fetch(&self, storage_ref: &str) -> Result<Vec<u8>>;

    /// Store new content and return its storage ref.
    async fn put(&self, name: &str, content: &[u8], mime: &str) -> Result<String>;

    /// Replace the content behind an existing storage ref.
    async fn update(&self, storage_ref: &str, content: &[u8]) -> Result<()>;

    /// Name and MIME type of the stored object.
    async fn describe(&self, storage_ref: &str) -> Result<ObjectInfo>;
}

/// Fire-and-forget event announcements.
///
/// Notification is best-effort by contract: implementations log and swallow
/// their own failures, so emitting an event can never fail a registry
/// operation.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &str, payload: JsonValue);
}

/// Seam over external process execution.
///
/// The runner folds spawn failures and timeouts into a `ToolOutput` with a
/// non-zero code and the error text on stderr, so extraction strategies
/// handle every outcome through one shape.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args`, optionally feeding `stdin`, killing the
    /// process after `timeout`.
    async fn run(
        &self,
        program: &str,
        args: &[String],
        stdin: Option<&[u8]>,
        timeout: Duration,
    ) -> ToolOutput;

    /// Whether `program` is invocable at all.
    async fn available(&self, program: &str) -> bool;
}
