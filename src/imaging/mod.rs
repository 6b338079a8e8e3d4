//! Media inspection and scaling in pure Rust.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Identify** | `image::image_dimensions` |
//! | **Signature** | SHA-256 of the file bytes (`sha2`) |
//! | **Scale** | Lanczos3 `resize_exact` into a bounding box, no upscaling |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension math (unit testable)
//! - **Parameters**: Data structures describing image operations
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]
//! - **Analyzer**: [`MediaAnalyzer`], the per-file metadata probe used by unite

mod analyzer;
pub mod backend;
mod calculations;
mod params;
pub mod rust_backend;

pub use analyzer::{MediaAnalyzer, MediaInfo};
pub use backend::{BackendError, Dimensions, ImageBackend};
pub use calculations::{fit_within, megapixels};
pub use params::{Quality, ScaleParams};
pub use rust_backend::{RustBackend, supported_input_extensions};
