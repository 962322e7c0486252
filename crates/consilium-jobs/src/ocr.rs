//! OCR job handler.
//!
//! Processes `ocr` jobs: fetches the document and its stored bytes, runs the
//! extraction pipeline, caps the output, and persists text + diagnostic into
//! `origin_meta` while swapping the `ocr:queued` tag for `ocr:done` or
//! `ocr:failed`.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{info, warn};

use consilium_core::{
    defaults, swap_tag, ContentStore, DocumentStore, ExtractionDiagnostic, JobType, OcrMode,
    TAG_OCR_DONE, TAG_OCR_FAILED, TAG_OCR_QUEUED,
};

use crate::extract::Extractor;
use crate::handler::{JobContext, JobHandler, JobResult};

/// Handler for `ocr` jobs. Payload: `{doc_id, mode?, retry?}`.
pub struct OcrJobHandler {
    docs: Arc<dyn DocumentStore>,
    content: Arc<dyn ContentStore>,
    extractor: Arc<Extractor>,
}

impl OcrJobHandler {
    pub fn new(
        docs: Arc<dyn DocumentStore>,
        content: Arc<dyn ContentStore>,
        extractor: Arc<Extractor>,
    ) -> Self {
        Self {
            docs,
            content,
            extractor,
        }
    }

    /// Persist extraction output onto the document: merged `origin_meta`
    /// keys plus the tag swap.
    async fn persist(
        &self,
        doc_id: &str,
        tags: &[String],
        text: &str,
        diag: &ExtractionDiagnostic,
    ) -> consilium_core::Result<()> {
        self.docs
            .merge_origin_meta(
                doc_id,
                json!({
                    "ocr_text": text,
                    "ocr_info": diag,
                }),
            )
            .await?;

        let result_tag = if diag.ok { TAG_OCR_DONE } else { TAG_OCR_FAILED };
        let new_tags = swap_tag(tags, TAG_OCR_QUEUED, result_tag);
        self.docs.set_tags(doc_id, &new_tags).await
    }
}

#[async_trait]
impl JobHandler for OcrJobHandler {
    fn job_type(&self) -> JobType {
        JobType::Ocr
    }

    async fn execute(&self, ctx: JobContext) -> JobResult {
        let Some(doc_id) = ctx.payload_str("doc_id").map(String::from) else {
            return JobResult::Failed("payload is missing doc_id".into());
        };
        let mode = match ctx.payload_str("mode") {
            Some(raw) => match raw.parse::<OcrMode>() {
                Ok(mode) => mode,
                Err(e) => return JobResult::Failed(e.to_string()),
            },
            None => OcrMode::default(),
        };

        let doc = match self.docs.get(&doc_id).await {
            Ok(Some(doc)) => doc,
            // A vanished document is permanent; don't touch the content store.
            Ok(None) => return JobResult::Failed(format!("document not found: {doc_id}")),
            Err(e) => return JobResult::Retry(format!("document lookup failed: {e}")),
        };
        let Some(storage_ref) = doc.storage_ref.as_deref() else {
            return JobResult::Failed(format!("document has no storage ref: {doc_id}"));
        };

        let name_hint = match self.content.describe(storage_ref).await {
            Ok(info) => info.name,
            Err(_) => doc.title.clone(),
        };
        let bytes = match self.content.fetch(storage_ref).await {
            Ok(bytes) => bytes,
            Err(e) => return JobResult::Retry(format!("content fetch failed: {e}")),
        };

        let (text, mut diag) = match self.extractor.extract(&bytes, &name_hint, mode).await {
            Ok(result) => result,
            Err(e) => return JobResult::Retry(format!("extraction workspace error: {e}")),
        };

        let (text, truncated) = cap_text(text, defaults::OCR_TEXT_CAP_BYTES);
        diag.truncated = truncated;

        info!(
            subsystem = "jobs",
            component = "ocr",
            request_id = %ctx.request_id,
            job_id = ctx.job.id,
            doc_id = %doc_id,
            tool = %diag.tool,
            success = diag.ok,
            truncated,
            text_len = text.len(),
            "Extraction finished"
        );

        if let Err(e) = self.persist(&doc_id, &doc.tags, &text, &diag).await {
            return JobResult::Retry(format!("failed to persist extraction: {e}"));
        }

        if diag.ok {
            JobResult::Success
        } else {
            // Diagnostic and ocr:failed tag are already persisted; the job
            // row records the extraction failure.
            warn!(
                subsystem = "jobs",
                component = "ocr",
                request_id = %ctx.request_id,
                doc_id = %doc_id,
                tool = %diag.tool,
                error = %diag.error,
                "Extraction failed"
            );
            JobResult::Failed(format!("extraction failed ({}): {}", diag.tool, diag.error))
        }
    }
}

/// Cap text at `cap` bytes, appending the truncation marker when cut.
///
/// The cut lands on the nearest char boundary at or below the cap so the
/// result stays valid UTF-8.
fn cap_text(mut text: String, cap: usize) -> (String, bool) {
    if text.len() <= cap {
        return (text, false);
    }
    let mut end = cap;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text.truncate(end);
    text.push_str(defaults::OCR_TRUNCATION_MARKER);
    (text, true)
}
