//! Core data models for the Consilium registry.
//!
//! These types are shared across all consilium crates and represent the
//! durable domain entities: jobs, documents, integrity audit records, and
//! the extraction diagnostic.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

// =============================================================================
// JOBS
// =============================================================================

/// Lifecycle status of a job.
///
/// Transitions are monotonic: pending → processing → {done, failed}. A job
/// is never returned to pending; retry happens by enqueuing a fresh job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Done,
    Failed,
}

impl JobStatus {
    /// Whether this status is terminal (done or failed).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "done" => Ok(JobStatus::Done),
            "failed" => Ok(JobStatus::Failed),
            other => Err(crate::Error::InvalidInput(format!(
                "unknown job status: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of asynchronous work a job carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    /// Text extraction for a registered document.
    Ocr,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Ocr => "ocr",
        }
    }
}

impl std::str::FromStr for JobType {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ocr" => Ok(JobType::Ocr),
            other => Err(crate::Error::InvalidInput(format!(
                "unknown job type: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A durable unit of asynchronous work.
///
/// Rows are never deleted; the job table doubles as an audit trail of
/// background processing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Monotonic id assigned on insert. Claim order is ascending by id.
    pub id: i64,
    pub job_type: JobType,
    /// Opaque, type-specific payload. For `ocr`: `{doc_id, mode, retry?}`.
    pub payload: JsonValue,
    pub status: JobStatus,
    /// Incremented on every claim.
    pub attempts: i32,
    /// Failure reason recorded when the job ends failed.
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// DOCUMENTS
// =============================================================================

/// A registered document row (the subset the core operates on).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Globally unique, immutable once assigned.
    pub doc_id: String,
    pub matter_id: String,
    pub class_name: String,
    pub title: String,
    /// Opaque reference into the content store; absent until stored.
    pub storage_ref: Option<String>,
    /// Recorded content hash: 64 lowercase hex chars. May legitimately lag
    /// the stored content between verification cycles.
    pub sha256: Option<String>,
    pub status: String,
    /// Ordered, deduplicated string labels.
    pub tags: Vec<String>,
    /// Structured bag; the core writes `ocr_text` and `ocr_info` here.
    pub origin_meta: JsonValue,
    pub origin: Option<String>,
    pub owner: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields required to insert a new document row.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub doc_id: String,
    pub matter_id: String,
    pub class_name: String,
    pub title: String,
    pub storage_ref: Option<String>,
    pub sha256: Option<String>,
    pub status: String,
    pub tags: Vec<String>,
    pub origin_meta: JsonValue,
    pub origin: Option<String>,
    pub owner: Option<String>,
}

// =============================================================================
// INTEGRITY
// =============================================================================

/// Hash comparison result for one verified document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityResult {
    /// True when the current content hash equals the recorded hash.
    #[serde(rename = "match")]
    pub matches: bool,
    pub sha256_current: String,
    pub sha256_stored: String,
}

/// One line of the append-only integrity audit log.
///
/// Exactly one of `result` / `error` is set: `result` when the content was
/// fetched and hashed, `error` when anything along the way failed. Multiple
/// records per doc accumulate over time; the report keeps the newest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrityRecord {
    pub ts: DateTime<Utc>,
    pub doc_id: String,
    pub matter_id: String,
    /// Document status at sampling time.
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<IntegrityResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IntegrityRecord {
    /// A record counts as failed when it is a mismatch or an error.
    pub fn is_failed(&self) -> bool {
        self.error.is_some() || self.result.as_ref().is_some_and(|r| !r.matches)
    }
}

// =============================================================================
// EXTRACTION
// =============================================================================

/// Strategy hint requested by the extraction caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OcrMode {
    /// Try the text layer first, fall back to rasterize + recognize.
    #[default]
    Auto,
    /// Skip the text layer and go straight to rasterize + recognize.
    Image,
    /// Same ordering as auto; explicit PDF hint.
    Pdf,
}

impl OcrMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            OcrMode::Auto => "auto",
            OcrMode::Image => "image",
            OcrMode::Pdf => "pdf",
        }
    }
}

impl std::str::FromStr for OcrMode {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(OcrMode::Auto),
            "image" => Ok(OcrMode::Image),
            "pdf" => Ok(OcrMode::Pdf),
            other => Err(crate::Error::InvalidInput(format!(
                "unknown ocr mode: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for OcrMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured record of which extraction strategy ran and how it ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionDiagnostic {
    pub ok: bool,
    /// Strategy that succeeded, or the last one attempted.
    /// One of "pdf_text", "pdf_ocr", "image_ocr", "none".
    pub tool: String,
    /// Process/strategy exit code; 0 on success.
    pub code: i32,
    /// Empty on success.
    pub error: String,
    /// Requested strategy hint.
    pub mode: OcrMode,
    /// Set by the caller when output exceeded the size cap.
    pub truncated: bool,
}

impl ExtractionDiagnostic {
    pub fn success(tool: &str, mode: OcrMode) -> Self {
        Self {
            ok: true,
            tool: tool.to_string(),
            code: 0,
            error: String::new(),
            mode,
            truncated: false,
        }
    }

    pub fn failure(tool: &str, mode: OcrMode, code: i32, error: impl Into<String>) -> Self {
        Self {
            ok: false,
            tool: tool.to_string(),
            code,
            error: error.into(),
            mode,
            truncated: false,
        }
    }
}

/// Captured output of one external tool invocation.
///
/// Spawn failures and timeouts are folded into a non-zero `code` with the
/// error text in `stderr`, so callers treat every outcome uniformly.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ToolOutput {
    pub fn ok(&self) -> bool {
        self.code == 0
    }

    pub fn stdout_utf8(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_utf8(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Name and MIME type of a stored object, as reported by the content store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectInfo {
    pub name: String,
    pub mime: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_status_round_trip() {
        for status in [
            JobStatus::Pending,
            JobStatus::Processing,
            JobStatus::Done,
            JobStatus::Failed,
        ] {
            let parsed: JobStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn job_status_terminal() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
        assert!(JobStatus::Done.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn job_type_unknown_is_validation_error() {
        let err = "frobnicate".parse::<JobType>().unwrap_err();
        assert!(matches!(err, crate::Error::InvalidInput(_)));
    }

    #[test]
    fn ocr_mode_default_is_auto() {
        assert_eq!(OcrMode::default(), OcrMode::Auto);
    }

    #[test]
    fn ocr_mode_round_trip() {
        for mode in [OcrMode::Auto, OcrMode::Image, OcrMode::Pdf] {
            let parsed: OcrMode = mode.as_str().parse().unwrap();
            assert_eq!(parsed, mode);
        }
    }

    #[test]
    fn integrity_record_failed_on_mismatch() {
        let rec = IntegrityRecord {
            ts: Utc::now(),
            doc_id: "D-1".into(),
            matter_id: "M-1".into(),
            status: "registered".into(),
            result: Some(IntegrityResult {
                matches: false,
                sha256_current: "a".repeat(64),
                sha256_stored: "b".repeat(64),
            }),
            error: None,
        };
        assert!(rec.is_failed());
    }

    #[test]
    fn integrity_record_failed_on_error() {
        let rec = IntegrityRecord {
            ts: Utc::now(),
            doc_id: "D-1".into(),
            matter_id: "M-1".into(),
            status: "registered".into(),
            result: None,
            error: Some("fetch failed".into()),
        };
        assert!(rec.is_failed());
    }

    #[test]
    fn integrity_record_ok_on_match() {
        let rec = IntegrityRecord {
            ts: Utc::now(),
            doc_id: "D-1".into(),
            matter_id: "M-1".into(),
            status: "registered".into(),
            result: Some(IntegrityResult {
                matches: true,
                sha256_current: "a".repeat(64),
                sha256_stored: "a".repeat(64),
            }),
            error: None,
        };
        assert!(!rec.is_failed());
    }

    #[test]
    fn integrity_record_serializes_match_key() {
        let rec = IntegrityRecord {
            ts: Utc::now(),
            doc_id: "D-1".into(),
            matter_id: "M-1".into(),
            status: "registered".into(),
            result: Some(IntegrityResult {
                matches: true,
                sha256_current: "a".repeat(64),
                sha256_stored: "a".repeat(64),
            }),
            error: None,
        };
        let json = serde_json::to_string(&rec).unwrap();
        assert!(json.contains("\"match\":true"));
        assert!(!json.contains("\"error\""));
    }

    #[test]
    fn diagnostic_constructors() {
        let ok = ExtractionDiagnostic::success("pdf_text", OcrMode::Auto);
        assert!(ok.ok);
        assert_eq!(ok.code, 0);
        assert!(ok.error.is_empty());

        let fail = ExtractionDiagnostic::failure("pdf_ocr", OcrMode::Auto, 1, "empty_output");
        assert!(!fail.ok);
        assert_eq!(fail.code, 1);
        assert_eq!(fail.error, "empty_output");
        assert!(!fail.truncated);
    }

    #[test]
    fn tool_output_lossy_decoding() {
        let out = ToolOutput {
            code: 0,
            stdout: vec![0x68, 0x69, 0xFF],
            stderr: Vec::new(),
        };
        assert!(out.ok());
        assert!(out.stdout_utf8().starts_with("hi"));
    }
}
