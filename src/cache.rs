//! Per-leaf identity cache.
//!
//! Identifiers are random, so a leaf rebuilt from scratch would get brand new
//! ones and every downstream database row would change. The cache records
//! enough state to replay the previous build exactly.
//!
//! # Design
//!
//! `cache.json` lives next to the unit file in storage:
//!
//! ```json
//! {
//!   "variables": { "groups": { "g1": "g_9f0c..." } },
//!   "uuids": ["4b1e...", "a03d..."],
//!   "source_hash": "c0ffee...",
//!   "stamp": { "revision": "...", "last_update": "2024-05-01 12:00:00" }
//! }
//! ```
//!
//! - **`variables`**: every `create(...)` binding of the leaf, grouped by
//!   category. Rebinding a cached name returns the cached identifier.
//! - **`uuids`**: raw suffixes of the anonymous media identifiers, in the
//!   order they were minted. They are fed to the generator's replay queue so
//!   the n-th file gets the same identifier as last time.
//! - **`source_hash`** / **`stamp`**: SHA-256 of the descriptor text and the
//!   build stamp used for it. When the descriptor is unchanged the stamp is
//!   reused, so a forced rebuild produces a byte-identical unit.
//!
//! A missing cache file is an empty cache. A cache that exists but can't be
//! parsed is an error: silently starting over would mint new identifiers for
//! entities that already have some.

use crate::identity::VariableTable;
use crate::types::BuildStamp;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the cache file within a leaf's storage folder.
pub const CACHE_FILENAME: &str = "cache.json";

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("IO error reading {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("Corrupted cache {path}: {source}")]
    Corrupted {
        path: PathBuf,
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeafCache {
    #[serde(default)]
    pub variables: VariableTable,
    #[serde(default)]
    pub uuids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stamp: Option<BuildStamp>,
}

impl LeafCache {
    /// Load from a leaf storage folder.
    pub fn load(leaf_storage: &Path) -> Result<Self, CacheError> {
        let path = leaf_storage.join(CACHE_FILENAME);
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => return Err(CacheError::Io { path, source }),
        };
        serde_json::from_str(&content).map_err(|source| CacheError::Corrupted { path, source })
    }

    /// Save to a leaf storage folder.
    pub fn save(&self, leaf_storage: &Path) -> io::Result<()> {
        let path = leaf_storage.join(CACHE_FILENAME);
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
    }

    /// The stamp to build with: the cached one if the descriptor is unchanged,
    /// otherwise `fresh`.
    pub fn stamp_for(&self, source_hash: &str, fresh: &BuildStamp) -> BuildStamp {
        match (&self.source_hash, &self.stamp) {
            (Some(hash), Some(stamp)) if hash == source_hash => stamp.clone(),
            _ => fresh.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty() && self.uuids.is_empty()
    }
}

/// SHA-256 hash of a file's contents, returned as a hex string.
pub fn hash_file(path: &Path) -> io::Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(hash_bytes(&bytes))
}

/// SHA-256 hash of descriptor text.
pub fn hash_text(text: &str) -> String {
    hash_bytes(text.as_bytes())
}

fn hash_bytes(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    format!("{:x}", digest)
}
