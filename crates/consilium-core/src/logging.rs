//! Structured logging schema and field name constants for consilium.
//!
//! All crates use these constants for consistent structured logging fields.
//! This keeps log aggregation queryable by standardized field names across
//! every subsystem.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, automatic fallback applied |
//! | INFO  | Lifecycle events (startup, shutdown), operation completions |
//! | DEBUG | Decision points, intermediate values, config choices |
//! | TRACE | Per-item iteration, high-volume data |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Correlation ID propagated across a job or verification cycle.
/// Format: UUIDv7 (time-ordered).
pub const REQUEST_ID: &str = "request_id";

/// Subsystem originating the log event.
/// Values: "registry", "jobs", "integrity", "db"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "dispatcher", "verifier", "pool", "fs_store"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "register", "claim_next", "extract", "verify_batch"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Document id being operated on.
pub const DOC_ID: &str = "doc_id";

/// Matter the document belongs to.
pub const MATTER_ID: &str = "matter_id";

/// Job row id being processed.
pub const JOB_ID: &str = "job_id";

/// Job type enum variant.
pub const JOB_TYPE: &str = "job_type";

/// Storage ref of the content being touched.
pub const STORAGE_REF: &str = "storage_ref";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Claim attempt counter for the current job.
pub const ATTEMPTS: &str = "attempts";

/// Byte length of extracted text.
pub const TEXT_LEN: &str = "text_len";

/// Documents examined in an integrity cycle.
pub const BATCH_SIZE: &str = "batch_size";

/// Records in an integrity report.
pub const RESULT_COUNT: &str = "result_count";

// ─── Extraction fields ─────────────────────────────────────────────────────

/// Extraction strategy attempted ("pdf_text", "pdf_ocr", "image_ocr").
pub const TOOL: &str = "tool";

/// Requested extraction mode ("auto", "image", "pdf").
pub const OCR_MODE: &str = "ocr_mode";

/// Whether the extracted text was capped.
pub const TRUNCATED: &str = "truncated";

// ─── Database fields ───────────────────────────────────────────────────────

/// Number of active connections in the pool.
pub const POOL_SIZE: &str = "pool_size";

/// Number of idle connections in the pool.
pub const POOL_IDLE: &str = "pool_idle";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Boolean success/failure indicator.
pub const SUCCESS: &str = "success";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";

/// Whether a verified document's hashes matched.
pub const HASH_MATCH: &str = "hash_match";
