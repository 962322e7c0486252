//! Multi-strategy text extraction.
//!
//! The pipeline is a pure function of its inputs and the environment's tool
//! set: PDF text-layer extraction first, rasterize + recognize as fallback,
//! direct recognition for raster images. All process execution goes through
//! the [`consilium_core::CommandRunner`] seam.

pub mod pipeline;
pub mod runner;

pub use pipeline::{ExtractConfig, Extractor};
pub use runner::SystemRunner;
