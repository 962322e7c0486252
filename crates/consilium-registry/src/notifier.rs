//! Best-effort event announcements.
//!
//! Notification is fire-and-forget by contract: a failure to record an
//! event is logged and swallowed, never surfaced to the operation that
//! triggered it.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value as JsonValue};
use tracing::{info, warn};

use consilium_core::Notifier;

/// Appends one JSON line per event to a local log file.
pub struct LogNotifier {
    path: PathBuf,
}

impl LogNotifier {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn append(&self, event: &str, payload: &JsonValue) -> std::io::Result<()> {
        let line = json!({
            "ts": Utc::now(),
            "event": event,
            "payload": payload,
        });
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: &str, payload: JsonValue) {
        match self.append(event, &payload) {
            Ok(()) => {
                info!(
                    subsystem = "registry",
                    component = "notifier",
                    event = %event,
                    "Event recorded"
                );
            }
            Err(e) => {
                warn!(
                    subsystem = "registry",
                    component = "notifier",
                    event = %event,
                    error_msg = %e,
                    "Failed to record event; dropping"
                );
            }
        }
    }
}
