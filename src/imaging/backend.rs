//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait defines the two operations the pipeline needs:
//! identify (read dimensions during unite) and scale (write preview and
//! thumbnail variants during relocate).
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend).

use super::params::ScaleParams;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Cannot read media {path}: {message}")]
    Unreadable { path: PathBuf, message: String },
    #[error("Cannot write {path}: {message}")]
    Unwritable { path: PathBuf, message: String },
}

impl BackendError {
    pub(crate) fn unreadable(path: &Path, e: impl std::fmt::Display) -> Self {
        BackendError::Unreadable {
            path: path.to_path_buf(),
            message: e.to_string(),
        }
    }

    pub(crate) fn unwritable(path: &Path, e: impl std::fmt::Display) -> Self {
        BackendError::Unwritable {
            path: path.to_path_buf(),
            message: e.to_string(),
        }
    }
}

/// Result of an identify operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Trait for image processing backends.
///
/// `Sync` so one backend can be shared across rayon workers.
pub trait ImageBackend: Sync {
    /// Get image dimensions.
    fn identify(&self, path: &Path) -> Result<Dimensions, BackendError>;

    /// Write a copy of the source that fits inside the requested box.
    fn scale(&self, params: &ScaleParams) -> Result<(), BackendError>;
}
