//! Shared test utilities for the archivist test suite.
//!
//! Row builders with fixed stamps, a temp catalog layout, tiny media files,
//! and lookup helpers that panic with a clear message on miss.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let catalog = Catalog::new();
//! let stamp = fixed_stamp();
//! let mut unit = Unit::default();
//! unit.themes.push(theme_row(&stamp, "t_1", "animals"));
//! write_leaf_db(&catalog.leaf_db("b", "l"), &unit);
//! ```

use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::config::Folders;
use crate::database;
use crate::migrations::generate;
use crate::types::{BuildStamp, Group, Meta, Provenance, Theme, Unit};

// =========================================================================
// Rows
// =========================================================================

pub fn fixed_stamp() -> BuildStamp {
    BuildStamp {
        revision: "r".repeat(crate::types::REVISION_LEN),
        last_update: "2024-05-01 12:00:00".to_string(),
    }
}

pub fn theme_row(stamp: &BuildStamp, uuid: &str, route: &str) -> Theme {
    Theme {
        revision: stamp.revision.clone(),
        last_update: stamp.last_update.clone(),
        uuid: uuid.to_string(),
        route: route.to_string(),
        label: route.to_uppercase(),
    }
}

pub fn group_row(stamp: &BuildStamp, uuid: &str, theme_uuid: &str, route: &str) -> Group {
    Group {
        revision: stamp.revision.clone(),
        last_update: stamp.last_update.clone(),
        uuid: uuid.to_string(),
        theme_uuid: theme_uuid.to_string(),
        route: route.to_string(),
        label: route.to_uppercase(),
        provenance: Provenance::default(),
    }
}

/// A media row with small fixed dimensions and empty paths.
pub fn meta_row(
    stamp: &BuildStamp,
    uuid: &str,
    theme_uuid: &str,
    group_uuid: &str,
    ordering: u32,
) -> Meta {
    Meta {
        revision: stamp.revision.clone(),
        last_update: stamp.last_update.clone(),
        uuid: uuid.to_string(),
        theme_uuid: theme_uuid.to_string(),
        group_uuid: group_uuid.to_string(),
        provenance: Provenance::default(),
        path_to_content: String::new(),
        path_to_preview: String::new(),
        path_to_thumbnail: format!("/thumbnails/{uuid}.jpg"),
        original_filename: uuid.to_string(),
        original_extension: "jpg".to_string(),
        width: 40,
        height: 30,
        resolution: 0.0,
        size: 100,
        duration: 0,
        media_type: "image".to_string(),
        ordering,
        signature: String::new(),
        signature_type: "sha256".to_string(),
        previous: String::new(),
        next: String::new(),
    }
}

// =========================================================================
// Files
// =========================================================================

/// Write a file, creating parent directories.
pub fn write_file(path: &Path, content: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

/// Write a real PNG of the given size.
pub fn write_png(path: &Path, width: u32, height: u32) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    image::RgbImage::from_fn(width, height, |x, y| image::Rgb([x as u8, y as u8, 7]))
        .save(path)
        .unwrap();
}

/// Apply a unit's migration to a fresh database at `path`.
pub fn write_leaf_db(path: &Path, unit: &Unit) {
    let conn = database::open(path).unwrap();
    for statement in generate(unit) {
        conn.execute(&statement, []).unwrap();
    }
}

// =========================================================================
// Catalog layout
// =========================================================================

/// Temp directory with the four catalog folders.
pub struct Catalog {
    _tmp: TempDir,
    pub folders: Folders,
}

impl Catalog {
    pub fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        let folders = Folders {
            sources: root.join("sources"),
            storage: root.join("storage"),
            content: root.join("content"),
            database: root.join("database"),
        };
        Self { _tmp: tmp, folders }
    }

    pub fn leaf_storage(&self, branch: &str, leaf: &str) -> PathBuf {
        self.folders.storage.join(branch).join(leaf)
    }

    pub fn leaf_db(&self, branch: &str, leaf: &str) -> PathBuf {
        self.leaf_storage(branch, leaf)
            .join(crate::migrate::LEAF_DB_FILENAME)
    }
}

// =========================================================================
// Lookup helpers
// =========================================================================

/// Find a media row by its original file stem. Panics if not found.
pub fn find_meta<'a>(unit: &'a Unit, filename: &str) -> &'a Meta {
    unit.metas
        .iter()
        .find(|m| m.original_filename == filename)
        .unwrap_or_else(|| {
            let names: Vec<&str> = unit.metas.iter().map(|m| m.original_filename.as_str()).collect();
            panic!("media '{filename}' not found. Available: {names:?}")
        })
}

/// Single string value from a query. Panics with the query on failure.
pub fn query_string(conn: &rusqlite::Connection, sql: &str) -> String {
    conn.query_row(sql, [], |row| row.get(0))
        .unwrap_or_else(|e| panic!("query failed: {sql}: {e}"))
}
