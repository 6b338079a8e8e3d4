//! Per-file media probe used while building units.
//!
//! Answers two questions about a file: is it media we know how to handle
//! (by extension), and what are its width, height, size and signature.

use super::backend::{BackendError, ImageBackend};
use super::calculations::megapixels;
use crate::cache::hash_file;
use std::collections::BTreeSet;
use std::path::Path;

/// Everything a media row records about its file.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaInfo {
    pub width: u32,
    pub height: u32,
    pub resolution: f64,
    pub size: u64,
    pub duration: u64,
    pub media_type: String,
    pub signature: String,
    pub signature_type: String,
}

pub struct MediaAnalyzer<'a> {
    backend: &'a dyn ImageBackend,
    extensions: BTreeSet<String>,
}

impl<'a> MediaAnalyzer<'a> {
    /// `extensions` are matched case-insensitively, without the dot.
    pub fn new<I, S>(backend: &'a dyn ImageBackend, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            backend,
            extensions: extensions
                .into_iter()
                .map(|e| e.as_ref().trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn is_known_media(&self, extension: &str) -> bool {
        self.extensions.contains(&extension.to_ascii_lowercase())
    }

    pub fn analyze(&self, path: &Path) -> Result<MediaInfo, BackendError> {
        let dims = self.backend.identify(path)?;
        let size = std::fs::metadata(path)?.len();
        let signature = hash_file(path)?;
        Ok(MediaInfo {
            width: dims.width,
            height: dims.height,
            resolution: megapixels(dims.width, dims.height),
            size,
            duration: 0,
            media_type: "image".to_string(),
            signature,
            signature_type: "sha256".to_string(),
        })
    }
}
