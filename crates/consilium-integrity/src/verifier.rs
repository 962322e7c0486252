//! Integrity verifier loop.
//!
//! Each cycle selects a batch of eligible documents, re-hashes their stored
//! content, and appends one record per document to the audit log. Failures
//! are isolated per document and per cycle; the loop never exits on its own.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{error, info, warn};
use uuid::Uuid;

use consilium_core::{
    defaults, sha256_hex, ContentStore, Document, DocumentStore, IntegrityRecord, IntegrityResult,
    Result,
};

use crate::log::IntegrityLog;

/// Configuration for the verifier loop.
#[derive(Debug, Clone)]
pub struct VerifierConfig {
    /// Minutes between cycles.
    pub interval_min: u64,
    /// Documents verified per cycle.
    pub batch_size: i64,
    /// Document statuses eligible for verification.
    pub include_statuses: Vec<String>,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            interval_min: defaults::INTEGRITY_INTERVAL_MIN,
            batch_size: defaults::INTEGRITY_BATCH,
            include_statuses: parse_statuses(defaults::INTEGRITY_INCLUDE_STATUSES),
        }
    }
}

impl VerifierConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `INTEGRITY_INTERVAL_MIN` | `60` | Minutes between cycles |
    /// | `INTEGRITY_BATCH` | `50` | Documents per cycle |
    /// | `INTEGRITY_INCLUDE_STATUSES` | `registered,delivered` | Eligible statuses |
    pub fn from_env() -> Self {
        let interval_min = std::env::var("INTEGRITY_INTERVAL_MIN")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::INTEGRITY_INTERVAL_MIN)
            .max(1);
        let batch_size = std::env::var("INTEGRITY_BATCH")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(defaults::INTEGRITY_BATCH)
            .max(1);
        let include_statuses = std::env::var("INTEGRITY_INCLUDE_STATUSES")
            .map(|v| parse_statuses(&v))
            .unwrap_or_else(|_| parse_statuses(defaults::INTEGRITY_INCLUDE_STATUSES));

        Self {
            interval_min,
            batch_size,
            include_statuses,
        }
    }
}

fn parse_statuses(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Handle for controlling a running verifier.
pub struct VerifierHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl VerifierHandle {
    /// Signal the verifier to shut down gracefully.
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown_tx.send(()).await.map_err(|_| {
            consilium_core::Error::Internal("Failed to send shutdown signal".into())
        })?;
        Ok(())
    }
}

/// Periodic content-hash verifier.
pub struct Verifier {
    docs: Arc<dyn DocumentStore>,
    content: Arc<dyn ContentStore>,
    log: Arc<IntegrityLog>,
    config: VerifierConfig,
}

impl Verifier {
    pub fn new(
        docs: Arc<dyn DocumentStore>,
        content: Arc<dyn ContentStore>,
        log: Arc<IntegrityLog>,
        config: VerifierConfig,
    ) -> Self {
        Self {
            docs,
            content,
            log,
            config,
        }
    }

    /// Start the verifier loop and return a handle for control.
    pub fn start(self) -> VerifierHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);

        tokio::spawn(async move {
            self.run(&mut shutdown_rx).await;
        });

        VerifierHandle { shutdown_tx }
    }

    async fn run(&self, shutdown_rx: &mut mpsc::Receiver<()>) {
        info!(
            subsystem = "integrity",
            component = "verifier",
            interval_min = self.config.interval_min,
            batch_size = self.config.batch_size,
            "Verifier started"
        );

        let interval = Duration::from_secs(self.config.interval_min * 60);

        loop {
            // Cycle failures are logged and swallowed; the loop survives.
            if let Err(e) = self.run_cycle().await {
                error!(
                    subsystem = "integrity",
                    component = "verifier",
                    error = %e,
                    "Verification cycle failed"
                );
            }

            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!(
                        subsystem = "integrity",
                        component = "verifier",
                        "Verifier received shutdown signal"
                    );
                    break;
                }
                _ = sleep(interval) => {}
            }
        }

        info!(
            subsystem = "integrity",
            component = "verifier",
            "Verifier stopped"
        );
    }

    /// Run one verification cycle. Returns how many records were appended.
    pub async fn run_cycle(&self) -> Result<usize> {
        let start = Instant::now();
        let request_id = Uuid::now_v7();

        let batch = self
            .docs
            .list_for_integrity(&self.config.include_statuses, self.config.batch_size)
            .await?;

        let mut appended = 0usize;
        for doc in &batch {
            let record = self.verify_document(doc).await;
            match self.log.append(&record) {
                Ok(()) => appended += 1,
                Err(e) => {
                    // One torn append must not stop the rest of the batch.
                    error!(
                        subsystem = "integrity",
                        component = "verifier",
                        request_id = %request_id,
                        doc_id = %doc.doc_id,
                        error = %e,
                        "Failed to append audit record"
                    );
                }
            }
        }

        info!(
            subsystem = "integrity",
            component = "verifier",
            op = "verify_batch",
            request_id = %request_id,
            batch_size = batch.len(),
            result_count = appended,
            duration_ms = start.elapsed().as_millis() as u64,
            "Verification cycle finished"
        );
        Ok(appended)
    }

    /// Verify one document, always producing a record.
    async fn verify_document(&self, doc: &Document) -> IntegrityRecord {
        let base = IntegrityRecord {
            ts: Utc::now(),
            doc_id: doc.doc_id.clone(),
            matter_id: doc.matter_id.clone(),
            status: doc.status.clone(),
            result: None,
            error: None,
        };

        let Some(storage_ref) = doc.storage_ref.as_deref() else {
            return IntegrityRecord {
                error: Some("missing storage ref".to_string()),
                ..base
            };
        };
        let Some(stored) = doc.sha256.as_deref() else {
            return IntegrityRecord {
                error: Some("missing recorded hash".to_string()),
                ..base
            };
        };

        match self.content.fetch(storage_ref).await {
            Ok(bytes) => {
                let current = sha256_hex(&bytes);
                let matches = current == stored;
                if !matches {
                    warn!(
                        subsystem = "integrity",
                        component = "verifier",
                        doc_id = %doc.doc_id,
                        matter_id = %doc.matter_id,
                        hash_match = false,
                        "Content hash drift detected"
                    );
                }
                IntegrityRecord {
                    result: Some(IntegrityResult {
                        matches,
                        sha256_current: current,
                        sha256_stored: stored.to_string(),
                    }),
                    ..base
                }
            }
            Err(e) => IntegrityRecord {
                error: Some(e.to_string()),
                ..base
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::ReportFilter;
    use async_trait::async_trait;
    use consilium_core::{Error, NewDocument, ObjectInfo};
    use serde_json::{json, Value as JsonValue};
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct MemDocStore {
        docs: Vec<Document>,
    }

    #[async_trait]
    impl DocumentStore for MemDocStore {
        async fn insert(&self, _doc: NewDocument) -> Result<Document> {
            unimplemented!("not needed in verifier tests")
        }

        async fn get(&self, doc_id: &str) -> Result<Option<Document>> {
            Ok(self.docs.iter().find(|d| d.doc_id == doc_id).cloned())
        }

        async fn update_sha(&self, _doc_id: &str, _sha256: &str) -> Result<()> {
            Ok(())
        }

        async fn set_status(&self, _doc_id: &str, _status: &str) -> Result<()> {
            Ok(())
        }

        async fn set_tags(&self, _doc_id: &str, _tags: &[String]) -> Result<()> {
            Ok(())
        }

        async fn merge_origin_meta(&self, _doc_id: &str, _patch: JsonValue) -> Result<()> {
            Ok(())
        }

        async fn list_for_integrity(
            &self,
            statuses: &[String],
            limit: i64,
        ) -> Result<Vec<Document>> {
            Ok(self
                .docs
                .iter()
                .filter(|d| statuses.contains(&d.status))
                .take(limit as usize)
                .cloned()
                .collect())
        }
    }

    struct MemContentStore {
        objects: Mutex<HashMap<String, Vec<u8>>>,
    }

    impl MemContentStore {
        fn new(objects: &[(&str, &[u8])]) -> Self {
            Self {
                objects: Mutex::new(
                    objects
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_vec()))
                        .collect(),
                ),
            }
        }
    }

    #[async_trait]
    impl ContentStore for MemContentStore {
        async fn fetch(&self, storage_ref: &str) -> Result<Vec<u8>> {
            self.objects
                .lock()
                .unwrap()
                .get(storage_ref)
                .cloned()
                .ok_or_else(|| Error::ExternalService(format!("no object: {storage_ref}")))
        }

        async fn put(&self, _name: &str, _content: &[u8], _mime: &str) -> Result<String> {
            unimplemented!("not needed in verifier tests")
        }

        async fn update(&self, storage_ref: &str, content: &[u8]) -> Result<()> {
            self.objects
                .lock()
                .unwrap()
                .insert(storage_ref.to_string(), content.to_vec());
            Ok(())
        }

        async fn describe(&self, storage_ref: &str) -> Result<ObjectInfo> {
            Ok(ObjectInfo {
                name: storage_ref.to_string(),
                mime: "application/octet-stream".into(),
            })
        }
    }

    fn document(doc_id: &str, storage_ref: &str, sha256: &str) -> Document {
        Document {
            doc_id: doc_id.to_string(),
            matter_id: "M-1".into(),
            class_name: "contract".into(),
            title: format!("{doc_id}.pdf"),
            storage_ref: Some(storage_ref.to_string()),
            sha256: Some(sha256.to_string()),
            status: "registered".into(),
            tags: Vec::new(),
            origin_meta: json!({}),
            origin: None,
            owner: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn verifier(
        docs: Vec<Document>,
        content: MemContentStore,
    ) -> (tempfile::TempDir, Arc<IntegrityLog>, Verifier) {
        let dir = tempfile::tempdir().unwrap();
        let log = Arc::new(IntegrityLog::new(dir.path().join("integrity.jsonl")));
        let verifier = Verifier::new(
            Arc::new(MemDocStore { docs }),
            Arc::new(content),
            log.clone(),
            VerifierConfig::default(),
        );
        (dir, log, verifier)
    }

    #[tokio::test]
    async fn test_cycle_records_match() {
        let content = b"stable bytes";
        let sha = sha256_hex(content);
        let (_dir, log, verifier) = verifier(
            vec![document("D-1", "ref-1", &sha)],
            MemContentStore::new(&[("ref-1", content)]),
        );

        let appended = verifier.run_cycle().await.unwrap();
        assert_eq!(appended, 1);

        let report = log.report(&ReportFilter::default()).unwrap();
        let result = report[0].result.as_ref().unwrap();
        assert!(result.matches);
        assert_eq!(result.sha256_current, sha);
        assert_eq!(result.sha256_stored, sha);
    }

    #[tokio::test]
    async fn test_cycle_detects_drift() {
        // Recorded hash is over the original content; the store now holds
        // something else.
        let original_sha = sha256_hex(b"original");
        let replaced: &[u8] = b"tampered";
        let (_dir, log, verifier) = verifier(
            vec![document("D-1", "ref-1", &original_sha)],
            MemContentStore::new(&[("ref-1", replaced)]),
        );

        verifier.run_cycle().await.unwrap();

        let report = log.report(&ReportFilter::default()).unwrap();
        let result = report[0].result.as_ref().unwrap();
        assert!(!result.matches);
        assert_eq!(result.sha256_current, sha256_hex(replaced));
        assert_eq!(result.sha256_stored, original_sha);
    }

    #[tokio::test]
    async fn test_batch_isolation() {
        // Middle document's content is missing; its neighbors still get
        // records.
        let a = b"content a";
        let c = b"content c";
        let (_dir, log, verifier) = verifier(
            vec![
                document("D-a", "ref-a", &sha256_hex(a)),
                document("D-b", "ref-missing", &sha256_hex(b"content b")),
                document("D-c", "ref-c", &sha256_hex(c)),
            ],
            MemContentStore::new(&[("ref-a", a), ("ref-c", c)]),
        );

        let appended = verifier.run_cycle().await.unwrap();
        assert_eq!(appended, 3);

        let report = log.report(&ReportFilter::default()).unwrap();
        assert_eq!(report.len(), 3);

        let errored: Vec<&str> = report
            .iter()
            .filter(|r| r.error.is_some())
            .map(|r| r.doc_id.as_str())
            .collect();
        assert_eq!(errored, vec!["D-b"]);
    }

    #[tokio::test]
    async fn test_missing_storage_ref_yields_error_record() {
        // A status-eligible document with no stored object must still show
        // up in the audit trail, as an error rather than a result.
        let mut doc = document("D-noref", "unused", "unused");
        doc.storage_ref = None;
        doc.sha256 = None;
        let (_dir, log, verifier) = verifier(vec![doc], MemContentStore::new(&[]));

        let appended = verifier.run_cycle().await.unwrap();
        assert_eq!(appended, 1);

        let report = log.report(&ReportFilter::default()).unwrap();
        assert_eq!(report.len(), 1);
        assert_eq!(report[0].doc_id, "D-noref");
        assert!(report[0].result.is_none());
        assert_eq!(report[0].error.as_deref(), Some("missing storage ref"));
    }

    #[tokio::test]
    async fn test_cycle_respects_batch_size() {
        let content = b"x";
        let sha = sha256_hex(content);
        let docs: Vec<Document> = (0..5)
            .map(|i| document(&format!("D-{i}"), "ref", &sha))
            .collect();
        let dir = tempfile::tempdir().unwrap();
        let log = Arc::new(IntegrityLog::new(dir.path().join("integrity.jsonl")));
        let verifier = Verifier::new(
            Arc::new(MemDocStore { docs }),
            Arc::new(MemContentStore::new(&[("ref", content)])),
            log.clone(),
            VerifierConfig {
                batch_size: 2,
                ..Default::default()
            },
        );

        let appended = verifier.run_cycle().await.unwrap();
        assert_eq!(appended, 2);
    }

    #[test]
    fn test_config_default_statuses() {
        let config = VerifierConfig::default();
        assert_eq!(config.include_statuses, vec!["registered", "delivered"]);
    }

    #[test]
    fn test_parse_statuses_trims_and_drops_empty() {
        assert_eq!(
            parse_statuses(" registered , delivered ,, archived"),
            vec!["registered", "delivered", "archived"]
        );
    }
}
