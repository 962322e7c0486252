//! Dispatcher loop that drains the durable job queue.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value as JsonValue;
use tokio::sync::{broadcast, mpsc};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use consilium_core::{defaults, Job, JobStore, JobType, Result};

use crate::handler::{JobContext, JobHandler, JobResult};

/// Broadcast channel capacity for dispatcher events.
const EVENT_BUS_CAPACITY: usize = 64;

/// Configuration for the dispatcher.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Sleep between polls when the queue is empty (milliseconds).
    pub idle_backoff_ms: u64,
    /// Maximum total attempts per job target before transient failures stop
    /// being re-enqueued.
    pub max_attempts: i64,
    /// Whether to enable job processing.
    pub enabled: bool,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            idle_backoff_ms: defaults::JOB_IDLE_BACKOFF_MS,
            max_attempts: defaults::JOB_MAX_ATTEMPTS,
            enabled: true,
        }
    }
}

impl DispatcherConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `JOB_DISPATCHER_ENABLED` | `true` | Enable/disable job processing |
    /// | `JOB_IDLE_BACKOFF_MS` | `2000` | Sleep when the queue is empty |
    /// | `JOB_MAX_ATTEMPTS` | `3` | Attempt bound for transient retries |
    pub fn from_env() -> Self {
        let enabled = std::env::var("JOB_DISPATCHER_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        let idle_backoff_ms = std::env::var("JOB_IDLE_BACKOFF_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::JOB_IDLE_BACKOFF_MS);

        let max_attempts = std::env::var("JOB_MAX_ATTEMPTS")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(defaults::JOB_MAX_ATTEMPTS)
            .max(1);

        Self {
            idle_backoff_ms,
            max_attempts,
            enabled,
        }
    }

    /// Set the idle backoff.
    pub fn with_idle_backoff(mut self, ms: u64) -> Self {
        self.idle_backoff_ms = ms;
        self
    }

    /// Set the attempt bound.
    pub fn with_max_attempts(mut self, max: i64) -> Self {
        self.max_attempts = max.max(1);
        self
    }

    /// Enable or disable job processing.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Event emitted by the dispatcher.
#[derive(Debug, Clone)]
pub enum DispatcherEvent {
    /// A job was claimed and handed to its handler.
    JobStarted { job_id: i64, job_type: JobType },
    /// A job completed successfully.
    JobCompleted { job_id: i64, job_type: JobType },
    /// A job failed terminally.
    JobFailed {
        job_id: i64,
        job_type: JobType,
        error: String,
    },
    /// A transient failure was re-enqueued as a fresh job.
    JobRequeued { job_id: i64, new_job_id: i64 },
    /// Dispatcher started.
    DispatcherStarted,
    /// Dispatcher stopped.
    DispatcherStopped,
}

/// Handle for controlling a running dispatcher.
pub struct DispatcherHandle {
    shutdown_tx: mpsc::Sender<()>,
    event_rx: broadcast::Receiver<DispatcherEvent>,
}

impl DispatcherHandle {
    /// Signal the dispatcher to shut down gracefully.
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown_tx.send(()).await.map_err(|_| {
            consilium_core::Error::Internal("Failed to send shutdown signal".into())
        })?;
        Ok(())
    }

    /// Get a receiver for dispatcher events.
    pub fn events(&self) -> broadcast::Receiver<DispatcherEvent> {
        self.event_rx.resubscribe()
    }
}

/// Dispatcher that claims jobs from the store and routes them to handlers.
///
/// Every claimed job reaches a terminal status: handler panics are isolated
/// in a spawned task and routed to `failed`, so a crash never leaves a row
/// stuck in `processing`.
pub struct Dispatcher {
    jobs: Arc<dyn JobStore>,
    config: DispatcherConfig,
    handlers: HashMap<JobType, Arc<dyn JobHandler>>,
    event_tx: broadcast::Sender<DispatcherEvent>,
}

impl Dispatcher {
    /// Create a new dispatcher over the given job store.
    pub fn new(jobs: Arc<dyn JobStore>, config: DispatcherConfig) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        Self {
            jobs,
            config,
            handlers: HashMap::new(),
            event_tx,
        }
    }

    /// Register a handler for a job type.
    pub fn register_handler<H: JobHandler + 'static>(mut self, handler: H) -> Self {
        let job_type = handler.job_type();
        self.handlers.insert(job_type, Arc::new(handler));
        debug!(
            subsystem = "jobs",
            component = "dispatcher",
            job_type = %job_type,
            "Registered job handler"
        );
        self
    }

    /// Get a receiver for dispatcher events.
    pub fn events(&self) -> broadcast::Receiver<DispatcherEvent> {
        self.event_tx.subscribe()
    }

    /// Start the dispatcher and return a handle for control.
    pub fn start(self) -> DispatcherHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let event_rx = self.event_tx.subscribe();

        tokio::spawn(async move {
            self.run(&mut shutdown_rx).await;
        });

        DispatcherHandle {
            shutdown_tx,
            event_rx,
        }
    }

    /// Run the dispatcher loop until a shutdown signal arrives.
    async fn run(&self, shutdown_rx: &mut mpsc::Receiver<()>) {
        if !self.config.enabled {
            info!(
                subsystem = "jobs",
                component = "dispatcher",
                "Dispatcher is disabled, not starting"
            );
            return;
        }

        info!(
            subsystem = "jobs",
            component = "dispatcher",
            idle_backoff_ms = self.config.idle_backoff_ms,
            max_attempts = self.config.max_attempts,
            "Dispatcher started"
        );
        let _ = self.event_tx.send(DispatcherEvent::DispatcherStarted);

        let idle_backoff = Duration::from_millis(self.config.idle_backoff_ms);

        loop {
            if shutdown_rx.try_recv().is_ok() {
                info!(
                    subsystem = "jobs",
                    component = "dispatcher",
                    "Dispatcher received shutdown signal"
                );
                break;
            }

            if !self.dispatch_next().await {
                // Queue empty, sleep before polling again
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!(
                            subsystem = "jobs",
                            component = "dispatcher",
                            "Dispatcher received shutdown signal"
                        );
                        break;
                    }
                    _ = sleep(idle_backoff) => {}
                }
            }
        }

        let _ = self.event_tx.send(DispatcherEvent::DispatcherStopped);
        info!(
            subsystem = "jobs",
            component = "dispatcher",
            "Dispatcher stopped"
        );
    }

    /// Claim and execute at most one job. Returns whether a job was claimed.
    pub async fn dispatch_next(&self) -> bool {
        for (&job_type, handler) in &self.handlers {
            let job = match self.jobs.claim_next(job_type).await {
                Ok(Some(job)) => job,
                Ok(None) => continue,
                Err(e) => {
                    error!(
                        subsystem = "jobs",
                        component = "dispatcher",
                        op = "claim_next",
                        job_type = %job_type,
                        error = %e,
                        "Failed to claim job"
                    );
                    continue;
                }
            };

            self.execute_job(job, handler.clone()).await;
            return true;
        }
        false
    }

    /// Execute a claimed job, always finishing it with a terminal status.
    async fn execute_job(&self, job: Job, handler: Arc<dyn JobHandler>) {
        let start = Instant::now();
        let job_id = job.id;
        let job_type = job.job_type;
        let attempts = job.attempts;
        let payload = job.payload.clone();

        let ctx = JobContext::new(job);
        let request_id = ctx.request_id;

        info!(
            subsystem = "jobs",
            component = "dispatcher",
            op = "execute",
            request_id = %request_id,
            job_id,
            job_type = %job_type,
            attempts,
            "Processing job"
        );
        let _ = self
            .event_tx
            .send(DispatcherEvent::JobStarted { job_id, job_type });

        // Isolate handler panics: a JoinError still routes to `failed`.
        let result = match tokio::spawn(async move { handler.execute(ctx).await }).await {
            Ok(result) => result,
            Err(e) => JobResult::Failed(format!("handler panicked: {e}")),
        };

        match result {
            JobResult::Success => {
                if let Err(e) = self.jobs.complete(job_id).await {
                    error!(
                        subsystem = "jobs",
                        component = "dispatcher",
                        request_id = %request_id,
                        job_id,
                        error = %e,
                        "Failed to mark job as done"
                    );
                } else {
                    info!(
                        subsystem = "jobs",
                        component = "dispatcher",
                        request_id = %request_id,
                        job_id,
                        job_type = %job_type,
                        duration_ms = start.elapsed().as_millis() as u64,
                        "Job completed"
                    );
                    let _ = self
                        .event_tx
                        .send(DispatcherEvent::JobCompleted { job_id, job_type });
                }
            }
            JobResult::Failed(error) => {
                self.finish_failed(job_id, job_type, &error, start).await;
            }
            JobResult::Retry(error) => {
                self.finish_failed(job_id, job_type, &error, start).await;
                self.requeue(job_id, job_type, payload, &error).await;
            }
        }
    }

    /// Mark a job failed and emit the event.
    async fn finish_failed(&self, job_id: i64, job_type: JobType, error: &str, start: Instant) {
        if let Err(e) = self.jobs.fail(job_id, error).await {
            error!(
                subsystem = "jobs",
                component = "dispatcher",
                job_id,
                error = %e,
                "Failed to mark job as failed"
            );
            return;
        }
        warn!(
            subsystem = "jobs",
            component = "dispatcher",
            job_id,
            job_type = %job_type,
            error = %error,
            duration_ms = start.elapsed().as_millis() as u64,
            "Job failed"
        );
        let _ = self.event_tx.send(DispatcherEvent::JobFailed {
            job_id,
            job_type,
            error: error.to_string(),
        });
    }

    /// Re-enqueue a fresh job for a transient failure, bounded by the retry
    /// counter carried in the payload. The failed row stays failed.
    async fn requeue(&self, job_id: i64, job_type: JobType, payload: JsonValue, error: &str) {
        let retry = payload.get("retry").and_then(|v| v.as_i64()).unwrap_or(0);
        if retry + 1 >= self.config.max_attempts {
            warn!(
                subsystem = "jobs",
                component = "dispatcher",
                job_id,
                job_type = %job_type,
                retry,
                error = %error,
                "Attempt bound reached, not re-enqueuing"
            );
            return;
        }

        let mut next_payload = payload;
        if let Some(obj) = next_payload.as_object_mut() {
            obj.insert("retry".to_string(), JsonValue::from(retry + 1));
        }

        match self.jobs.enqueue(job_type, next_payload).await {
            Ok(new_job) => {
                info!(
                    subsystem = "jobs",
                    component = "dispatcher",
                    job_id,
                    new_job_id = new_job.id,
                    retry = retry + 1,
                    "Re-enqueued transient failure"
                );
                let _ = self.event_tx.send(DispatcherEvent::JobRequeued {
                    job_id,
                    new_job_id: new_job.id,
                });
            }
            Err(e) => {
                error!(
                    subsystem = "jobs",
                    component = "dispatcher",
                    job_id,
                    error = %e,
                    "Failed to re-enqueue transient failure"
                );
            }
        }
    }
}
