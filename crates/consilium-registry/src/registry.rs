//! Document registration, verification, hash healing, and delivery.
//!
//! The registry owns identity rules (doc ids, content hashes, permalinks)
//! and the drift-reconciliation policy: whenever it fetches current content
//! for any reason it compares the fresh hash against the recorded one and
//! heals the record on mismatch. Healing is idempotent and never a
//! rejection.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value as JsonValue};
use tracing::{info, warn};

use consilium_core::{
    build_permalink, generate_doc_id, normalize_tags, sha256_hex, ContentStore, Document,
    DocumentStore, Error, JobStore, JobType, NewDocument, Notifier, Result, TAG_OCR_QUEUED,
};

/// Everything needed to register one document.
#[derive(Debug, Clone)]
pub struct RegisterRequest {
    pub matter_id: String,
    pub class_name: String,
    pub title: String,
    pub content: Vec<u8>,
    /// Original filename; its extension is kept on the stored object.
    pub file_name: Option<String>,
    pub mime: Option<String>,
    /// Tags as supplied by the caller, normalized before storage.
    pub tags: JsonValue,
    pub origin: Option<String>,
    pub owner: Option<String>,
    pub origin_meta: JsonValue,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisteredDocument {
    pub doc_id: String,
    pub permalink: String,
    pub sha256: String,
    pub storage_ref: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifyOutcome {
    pub doc_id: String,
    pub sha256_current: String,
    pub sha256_stored: String,
    #[serde(rename = "match")]
    pub matches: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncOutcome {
    pub doc_id: String,
    pub sha256_previous: String,
    pub sha256_updated: String,
    pub changed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeliverOutcome {
    pub ok: bool,
    pub doc_id: String,
    pub permalink: String,
}

/// The registry service.
///
/// Collaborators are injected so the service can be exercised against
/// in-memory fakes; nothing here reaches for a global.
pub struct DocumentRegistry {
    docs: Arc<dyn DocumentStore>,
    content: Arc<dyn ContentStore>,
    jobs: Arc<dyn JobStore>,
    notifier: Arc<dyn Notifier>,
    base_id_url: String,
}

impl DocumentRegistry {
    pub fn new(
        docs: Arc<dyn DocumentStore>,
        content: Arc<dyn ContentStore>,
        jobs: Arc<dyn JobStore>,
        notifier: Arc<dyn Notifier>,
        base_id_url: impl Into<String>,
    ) -> Self {
        Self {
            docs,
            content,
            jobs,
            notifier,
            base_id_url: base_id_url.into(),
        }
    }

    pub fn permalink(&self, doc_id: &str) -> String {
        build_permalink(&self.base_id_url, doc_id)
    }

    /// Register a new document.
    ///
    /// Hashes the content, assigns a doc id, stores the bytes, inserts the
    /// row with normalized tags plus the `ocr:queued` marker, enqueues the
    /// extraction job, and announces `doc_registered`.
    pub async fn register(&self, req: RegisterRequest) -> Result<RegisteredDocument> {
        if req.matter_id.trim().is_empty() {
            return Err(Error::InvalidInput("matter_id must not be empty".into()));
        }
        if req.title.trim().is_empty() {
            return Err(Error::InvalidInput("title must not be empty".into()));
        }

        let sha256 = sha256_hex(&req.content);
        let doc_id = generate_doc_id();
        let permalink = self.permalink(&doc_id);

        let name = object_name(&doc_id, &req.title, req.file_name.as_deref());
        let mime = req
            .mime
            .clone()
            .or_else(|| infer::get(&req.content).map(|k| k.mime_type().to_string()))
            .unwrap_or_else(|| "application/octet-stream".to_string());
        let storage_ref = self.content.put(&name, &req.content, &mime).await?;

        let mut tags = normalize_tags(&req.tags);
        if !tags.iter().any(|t| t == TAG_OCR_QUEUED) {
            tags.push(TAG_OCR_QUEUED.to_string());
        }

        let doc = self
            .docs
            .insert(NewDocument {
                doc_id: doc_id.clone(),
                matter_id: req.matter_id.clone(),
                class_name: req.class_name.clone(),
                title: req.title.clone(),
                storage_ref: Some(storage_ref.clone()),
                sha256: Some(sha256.clone()),
                status: "registered".to_string(),
                tags,
                origin_meta: req.origin_meta,
                origin: Some(req.origin.unwrap_or_else(|| "upload".to_string())),
                owner: req.owner,
            })
            .await?;

        let job = self
            .jobs
            .enqueue(JobType::Ocr, json!({"doc_id": doc.doc_id, "mode": "auto"}))
            .await?;

        info!(
            subsystem = "registry",
            operation = "register",
            doc_id = %doc.doc_id,
            matter_id = %doc.matter_id,
            storage_ref = %storage_ref,
            job_id = job.id,
            "Document registered"
        );

        self.notifier
            .notify(
                "doc_registered",
                json!({
                    "matter_id": doc.matter_id,
                    "class": doc.class_name,
                    "title": doc.title,
                    "doc_id": doc.doc_id,
                    "permalink": permalink,
                }),
            )
            .await;

        Ok(RegisteredDocument {
            doc_id: doc.doc_id,
            permalink,
            sha256,
            storage_ref,
        })
    }

    /// Compare the current content hash against the recorded one.
    ///
    /// Healing applies here too: on mismatch the recorded hash is updated,
    /// and the returned `sha256_stored` is the value before healing.
    pub async fn verify(&self, doc_id: &str) -> Result<VerifyOutcome> {
        let doc = self.require(doc_id).await?;
        let (current, stored) = self.heal_sha(&doc).await?;
        Ok(VerifyOutcome {
            doc_id: doc.doc_id,
            matches: current == stored,
            sha256_current: current,
            sha256_stored: stored,
        })
    }

    /// Recompute the content hash and update the record when it drifted.
    pub async fn sync_sha(&self, doc_id: &str) -> Result<SyncOutcome> {
        let doc = self.require(doc_id).await?;
        let (current, stored) = self.heal_sha(&doc).await?;
        Ok(SyncOutcome {
            doc_id: doc.doc_id,
            changed: current != stored,
            sha256_previous: stored,
            sha256_updated: current,
        })
    }

    /// Deliver a document: heal the hash, mark it delivered, announce
    /// `result_delivered`.
    ///
    /// The heal step is best-effort here; a content-store failure is logged
    /// and the delivery proceeds so the status change is not held hostage
    /// by a flaky store.
    pub async fn deliver(&self, doc_id: &str, message: Option<&str>) -> Result<DeliverOutcome> {
        let doc = self.require(doc_id).await?;

        if let Err(e) = self.heal_sha(&doc).await {
            warn!(
                subsystem = "registry",
                operation = "deliver",
                doc_id = %doc.doc_id,
                error_msg = %e,
                "Hash sync failed during delivery; continuing"
            );
        }

        self.docs.set_status(&doc.doc_id, "delivered").await?;

        let permalink = self.permalink(&doc.doc_id);
        let mut payload = json!({
            "matter_id": doc.matter_id,
            "title": doc.title,
            "doc_id": doc.doc_id,
            "permalink": permalink,
        });
        if let Some(message) = message {
            payload["message"] = json!(message);
        }
        self.notifier.notify("result_delivered", payload).await;

        info!(
            subsystem = "registry",
            operation = "deliver",
            doc_id = %doc.doc_id,
            "Document delivered"
        );

        Ok(DeliverOutcome {
            ok: true,
            doc_id: doc.doc_id,
            permalink,
        })
    }

    async fn require(&self, doc_id: &str) -> Result<Document> {
        self.docs
            .get(doc_id)
            .await?
            .ok_or_else(|| Error::DocumentNotFound(doc_id.to_string()))
    }

    /// Fetch current content, hash it, and heal the record on drift.
    ///
    /// Returns `(current, previously_recorded)`.
    async fn heal_sha(&self, doc: &Document) -> Result<(String, String)> {
        let storage_ref = doc.storage_ref.as_deref().ok_or_else(|| {
            Error::InvalidInput(format!("document has no stored content: {}", doc.doc_id))
        })?;

        let bytes = self.content.fetch(storage_ref).await?;
        let current = sha256_hex(&bytes);
        let stored = doc.sha256.clone().unwrap_or_default();

        if current != stored {
            warn!(
                subsystem = "registry",
                doc_id = %doc.doc_id,
                sha256_stored = %stored,
                sha256_current = %current,
                "Content hash drift detected; healing record"
            );
            self.docs.update_sha(&doc.doc_id, &current).await?;
        }

        Ok((current, stored))
    }
}

/// Stored object name: `{doc_id}__{title}{ext}`, with path separators in
/// the title flattened and the extension carried over from the original
/// filename.
fn object_name(doc_id: &str, title: &str, file_name: Option<&str>) -> String {
    let safe_title: String = title
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect();
    let ext = file_name
        .and_then(|n| Path::new(n).extension().and_then(|e| e.to_str()))
        .map(|e| format!(".{}", e.to_lowercase()))
        .unwrap_or_default();
    format!("{doc_id}__{safe_title}{ext}")
}
