//! Parameter types for image operations.
//!
//! These structs describe *what* to do, not *how* to do it. The relocator
//! builds them from relocation records and hands them to the
//! [`backend`](super::backend), which does the actual pixel work.
//!
//! ## Types
//!
//! - [`Quality`]: lossy encoding quality (1–100, default 90). Clamped on construction.
//! - [`ScaleParams`]: source, output path, bounding box and quality for one scaled variant.

use std::path::PathBuf;

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(90)
    }
}

/// Parameters for a scale operation.
///
/// `width` × `height` is a bounding box; the output keeps the source aspect
/// ratio and is never larger than the source.
#[derive(Debug, Clone, PartialEq)]
pub struct ScaleParams {
    pub source: PathBuf,
    pub output: PathBuf,
    pub width: u32,
    pub height: u32,
    pub quality: Quality,
}
