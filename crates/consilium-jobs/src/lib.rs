//! # consilium-jobs
//!
//! Background job processing for the Consilium document registry: the
//! dispatcher loop that drains the durable job queue, the OCR job handler,
//! and the multi-strategy text extraction pipeline.

pub mod dispatcher;
pub mod extract;
pub mod handler;
pub mod ocr;

pub use dispatcher::{Dispatcher, DispatcherConfig, DispatcherEvent, DispatcherHandle};
pub use extract::{ExtractConfig, Extractor, SystemRunner};
pub use handler::{JobContext, JobHandler, JobResult};
pub use ocr::OcrJobHandler;
