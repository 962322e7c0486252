//! # consilium-integrity
//!
//! Periodic content-hash verification for the Consilium document registry:
//! the verifier loop that re-hashes stored content against recorded hashes,
//! and the append-only JSONL audit log with its read-side report.

pub mod log;
pub mod verifier;

pub use log::{IntegrityLog, ReportFilter};
pub use verifier::{Verifier, VerifierConfig, VerifierHandle};
