//! Relocation: physical media outputs for every media item.
//!
//! make-migrations writes a plan next to each unit (`relocation.json`), and
//! the relocate stage carries it out. Each media item gets three outputs
//! under the content folder:
//!
//! ```text
//! <content>/content/<theme_route>/<group_route>/<id>.<ext>      copy of the original
//! <content>/preview/<theme_route>/<group_route>/<id>.<ext>      scaled to preview_size
//! <content>/thumbnails/<theme_route>/<group_route>/<id>.<ext>   scaled to thumbnail_size
//! ```
//!
//! The original is read from
//! `<sources>/<branch>/<leaf>/<theme_route>/<group_route>/<filename>`.
//!
//! Outputs are independent of each other, so a leaf's plan is executed in
//! parallel with rayon. Existing outputs are left alone unless forced.

use crate::config::{Folders, MediaConfig};
use crate::identity::{IdentityError, RouteRegistry};
use crate::imaging::{BackendError, ImageBackend, Quality, ScaleParams};
use crate::types::{LeafReport, Meta, StageReport, Status, Unit};
use crate::walk::{Selection, walk};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Name of the relocation plan within a leaf's storage folder.
pub const RELOCATION_FILENAME: &str = "relocation.json";

#[derive(Error, Debug)]
pub enum RelocateError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Malformed relocation file: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Image processing failed: {0}")]
    Imaging(#[from] BackendError),
    #[error(transparent)]
    Identity(#[from] IdentityError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Copy,
    Scale,
}

/// One output file to produce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relocation {
    pub uuid: String,
    pub source_path: PathBuf,
    pub destination_path: PathBuf,
    /// Original size for copies, bounding box for scaled outputs.
    pub width: u32,
    pub height: u32,
    pub operation: Operation,
}

/// Where a stored `/content/...` style path lands on disk.
fn under_content(content_root: &Path, stored: &str) -> PathBuf {
    content_root.join(stored.trim_start_matches('/'))
}

fn original_path(source_leaf: &Path, theme_route: &str, group_route: &str, meta: &Meta) -> PathBuf {
    let filename = if meta.original_extension.is_empty() {
        meta.original_filename.clone()
    } else {
        format!("{}.{}", meta.original_filename, meta.original_extension)
    };
    source_leaf.join(theme_route).join(group_route).join(filename)
}

/// Relocations for every media item in `unit`: a copy, a preview and a
/// thumbnail, in that order.
pub fn plan(
    unit: &Unit,
    routes: &RouteRegistry,
    source_leaf: &Path,
    content_root: &Path,
    media: &MediaConfig,
) -> Result<Vec<Relocation>, IdentityError> {
    let mut relocations = Vec::with_capacity(unit.metas.len() * 3);
    for meta in &unit.metas {
        let theme_route = routes.route(&meta.theme_uuid)?;
        let group_route = routes.route(&meta.group_uuid)?;
        let source_path = original_path(source_leaf, theme_route, group_route, meta);

        let outputs = [
            (&meta.path_to_content, [meta.width, meta.height], Operation::Copy),
            (&meta.path_to_preview, media.preview_size, Operation::Scale),
            (&meta.path_to_thumbnail, media.thumbnail_size, Operation::Scale),
        ];
        for (stored, [width, height], operation) in outputs {
            relocations.push(Relocation {
                uuid: meta.uuid.clone(),
                source_path: source_path.clone(),
                destination_path: under_content(content_root, stored),
                width,
                height,
                operation,
            });
        }
    }
    Ok(relocations)
}

pub fn load_plan(leaf_storage: &Path) -> Result<Option<Vec<Relocation>>, RelocateError> {
    let path = leaf_storage.join(RELOCATION_FILENAME);
    let content = match std::fs::read_to_string(&path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => return Err(RelocateError::Io { path, source }),
    };
    Ok(Some(serde_json::from_str(&content)?))
}

/// What happened to one output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Written,
    Kept,
}

/// Produce one output file.
pub fn execute(
    backend: &impl ImageBackend,
    relocation: &Relocation,
    quality: Quality,
    force: bool,
) -> Result<Outcome, RelocateError> {
    let destination = &relocation.destination_path;
    if destination.exists() && !force {
        return Ok(Outcome::Kept);
    }
    if let Some(parent) = destination.parent() {
        std::fs::create_dir_all(parent).map_err(|source| RelocateError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    match relocation.operation {
        Operation::Copy => {
            std::fs::copy(&relocation.source_path, destination).map_err(|source| {
                RelocateError::Io {
                    path: relocation.source_path.clone(),
                    source,
                }
            })?;
        }
        Operation::Scale => backend.scale(&ScaleParams {
            source: relocation.source_path.clone(),
            output: destination.clone(),
            width: relocation.width,
            height: relocation.height,
            quality,
        })?,
    }
    debug!(uuid = %relocation.uuid, output = %destination.display(), "relocated");
    Ok(Outcome::Written)
}

/// Execute the relocation plan of every selected leaf.
///
/// A leaf without a plan is skipped. A leaf whose outputs partly fail is
/// reported failed; the other leaves still run.
pub fn relocate(
    backend: &impl ImageBackend,
    folders: &Folders,
    media: &MediaConfig,
    selection: &Selection,
) -> Result<StageReport, RelocateError> {
    let quality = Quality::new(media.quality);
    let mut report = StageReport::default();

    for location in walk(&folders.storage, &selection.branch, &selection.leaf) {
        let Some(relocations) = load_plan(&location.folder)? else {
            report.push(LeafReport::new(
                &location.branch,
                &location.leaf,
                "relocation",
                Status::Skipped("relocation file does not exist".into()),
            ));
            continue;
        };

        let results: Vec<Result<Outcome, RelocateError>> = relocations
            .par_iter()
            .map(|r| execute(backend, r, quality, selection.force))
            .collect();

        let written = results
            .iter()
            .filter(|r| matches!(r, Ok(Outcome::Written)))
            .count();
        let errors: Vec<String> = results
            .into_iter()
            .filter_map(Result::err)
            .map(|e| e.to_string())
            .collect();

        let status = if let Some(first) = errors.first() {
            warn!(
                branch = %location.branch,
                leaf = %location.leaf,
                failed = errors.len(),
                "relocation incomplete"
            );
            Status::Failed(format!("{} of {} outputs failed: {first}", errors.len(), relocations.len()))
        } else if written == 0 && !relocations.is_empty() {
            Status::AlreadyExists
        } else {
            info!(branch = %location.branch, leaf = %location.leaf, written, "relocated");
            Status::Created
        };
        report.push(LeafReport::new(&location.branch, &location.leaf, "relocation", status));
    }
    Ok(report)
}
