//! # consilium-core
//!
//! Core types, traits, and abstractions for the Consilium document registry.
//!
//! This crate provides the foundational data structures and trait definitions
//! that the other consilium crates depend on: the job and document models,
//! the content-store / notifier / command-runner seams, identity rules
//! (doc ids, content hashes, permalinks), and tag normalization.

pub mod defaults;
pub mod error;
pub mod identity;
pub mod logging;
pub mod models;
pub mod tags;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use identity::{build_permalink, generate_doc_id, sha256_hex, sha256_hex_reader};
pub use models::*;
pub use tags::{normalize_tags, swap_tag, TAG_OCR_DONE, TAG_OCR_FAILED, TAG_OCR_QUEUED};
pub use traits::*;
