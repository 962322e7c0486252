//! # consilium-registry
//!
//! Document registration and identity for Consilium: the registry service
//! that assigns doc ids, stores content, enqueues extraction, reconciles
//! hash drift, and announces lifecycle events. Also home of the
//! `consiliumd` daemon binary that wires the whole system together.

pub mod config;
pub mod fs_store;
pub mod notifier;
pub mod registry;

pub use config::AppConfig;
pub use fs_store::FsContentStore;
pub use notifier::LogNotifier;
pub use registry::{
    DeliverOutcome, DocumentRegistry, RegisterRequest, RegisteredDocument, SyncOutcome,
    VerifyOutcome,
};
