//! Centralized default constants for the Consilium registry.
//!
//! **This module is the single source of truth** for all shared default
//! values. The crates and the daemon reference these constants instead of
//! defining their own magic numbers.

// =============================================================================
// JOB PROCESSING
// =============================================================================

/// Idle backoff for the dispatcher when the queue is empty (milliseconds).
pub const JOB_IDLE_BACKOFF_MS: u64 = 2_000;

/// Maximum total attempts for a job target before transient failures stop
/// being re-enqueued.
pub const JOB_MAX_ATTEMPTS: i64 = 3;

// =============================================================================
// EXTRACTION
// =============================================================================

/// Per-command timeout for external extraction tools (seconds).
pub const TOOL_TIMEOUT_SECS: u64 = 60;

/// Maximum PDF pages rendered for the raster OCR fallback.
pub const OCR_MAX_PAGES: u32 = 20;

/// Rendering resolution for the raster OCR fallback (dots per inch).
pub const OCR_DPI: u32 = 300;

/// Recognition language set passed to tesseract.
pub const OCR_LANGUAGES: &str = "eng+rus";

/// Tesseract OCR engine mode (1 = LSTM only).
pub const TESSERACT_OEM: u32 = 1;

/// Tesseract page segmentation mode (3 = fully automatic).
pub const TESSERACT_PSM: u32 = 3;

/// Size cap on stored extracted text (2 MiB). Text beyond the cap is
/// truncated by the OCR job handler and flagged in the diagnostic.
pub const OCR_TEXT_CAP_BYTES: usize = 2 * 1024 * 1024;

/// Marker appended to capped extraction output.
pub const OCR_TRUNCATION_MARKER: &str = "\n...[truncated]";

/// How many leading characters of direct-text output must themselves contain
/// an alphabetic character for the text layer to be trusted.
pub const PDF_HEAD_SAMPLE_CHARS: usize = 1000;

/// Raster image extensions the image OCR strategy accepts.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "tif", "tiff", "bmp"];

// =============================================================================
// INTEGRITY VERIFICATION
// =============================================================================

/// Minutes between integrity verification cycles.
pub const INTEGRITY_INTERVAL_MIN: u64 = 60;

/// Documents verified per cycle.
pub const INTEGRITY_BATCH: i64 = 50;

/// Comma-separated document statuses eligible for verification.
pub const INTEGRITY_INCLUDE_STATUSES: &str = "registered,delivered";

/// Default result-count limit for the integrity report aggregation.
pub const INTEGRITY_REPORT_LIMIT: usize = 100;

// =============================================================================
// IDENTITY
// =============================================================================

/// Random suffix length for generated doc ids.
pub const DOC_ID_SUFFIX_LEN: usize = 8;
