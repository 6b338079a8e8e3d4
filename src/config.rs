//! Catalog configuration module.
//!
//! Handles loading, validating, and merging `archivist.toml`. Stock defaults
//! are the base layer; a user file only needs the keys it wants to change,
//! and command-line folder flags override both.
//!
//! ## Config File Location
//!
//! `archivist.toml` is looked up in the working directory, or given
//! explicitly with `--config <path>`.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [folders]
//! sources = "sources"       # <branch>/<leaf>/source.json + media
//! storage = "storage"       # units, caches, migrations, leaf/branch/root databases
//! content = "content"       # relocated media (content/, preview/, thumbnails/)
//! database = "database"     # frozen static database
//!
//! [media]
//! preview_size = [1024, 1024]
//! thumbnail_size = [384, 384]
//! quality = 90
//! extensions = ["jpg", "jpeg", "png", "tif", "tiff", "webp", "bmp"]
//!
//! [processing]
//! max_processes = 4         # Max parallel workers (omit for auto = CPU cores)
//! ```
//!
//! ## Partial Configuration
//!
//! Config files are sparse. Override just the values you need:
//!
//! ```toml
//! [folders]
//! storage = "/var/lib/catalog"
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::imaging::supported_input_extensions;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the config file looked up in the working directory.
pub const CONFIG_FILENAME: &str = "archivist.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
}

/// Catalog configuration loaded from `archivist.toml`.
///
/// All fields have sensible defaults. Unknown keys are rejected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CatalogConfig {
    /// Where every stage reads and writes.
    pub folders: Folders,
    /// Media analysis and relocation sizes.
    pub media: MediaConfig,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
}

impl CatalogConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let sizes = [
            ("media.preview_size", self.media.preview_size),
            ("media.thumbnail_size", self.media.thumbnail_size),
        ];
        for (name, [w, h]) in sizes {
            if w == 0 || h == 0 {
                return Err(ConfigError::Validation(format!(
                    "{name} values must be non-zero"
                )));
            }
        }
        if !(1..=100).contains(&self.media.quality) {
            return Err(ConfigError::Validation(
                "media.quality must be 1-100".into(),
            ));
        }
        if self.media.extensions.is_empty() {
            return Err(ConfigError::Validation(
                "media.extensions must not be empty".into(),
            ));
        }
        let supported = supported_input_extensions();
        if let Some(unknown) = self
            .media
            .extensions
            .iter()
            .find(|e| !supported.contains(&e.to_ascii_lowercase().as_str()))
        {
            return Err(ConfigError::Validation(format!(
                "media.extensions: no decoder for {unknown:?} (supported: {supported:?})"
            )));
        }
        Ok(())
    }
}

/// Folder layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Folders {
    pub sources: PathBuf,
    pub storage: PathBuf,
    pub content: PathBuf,
    pub database: PathBuf,
}

impl Default for Folders {
    fn default() -> Self {
        Self {
            sources: PathBuf::from("sources"),
            storage: PathBuf::from("storage"),
            content: PathBuf::from("content"),
            database: PathBuf::from("database"),
        }
    }
}

/// Media analysis and relocation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MediaConfig {
    /// Bounding box `[width, height]` of preview images.
    pub preview_size: [u32; 2],
    /// Bounding box `[width, height]` of thumbnails.
    pub thumbnail_size: [u32; 2],
    /// Encoding quality for scaled JPEG outputs (1-100).
    pub quality: u32,
    /// File extensions picked up from group directories.
    pub extensions: Vec<String>,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            preview_size: [1024, 1024],
            thumbnail_size: [384, 384],
            quality: 90,
            extensions: ["jpg", "jpeg", "png", "tif", "tiff", "webp", "bmp"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel workers.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config
        .max_processes
        .map(|n| n.clamp(1, cores))
        .unwrap_or(cores)
}

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the canonical representation of all default values, used as the
/// base layer for merging user overrides on top.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(CatalogConfig::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Merge an optional overlay onto the stock defaults, then deserialize and
/// validate.
pub fn resolve_config(overlay: Option<toml::Value>) -> Result<CatalogConfig, ConfigError> {
    let base = stock_defaults_value();
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: CatalogConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load `archivist.toml` from a directory, falling back to stock defaults
/// when the file is absent.
pub fn load_config(dir: &Path) -> Result<CatalogConfig, ConfigError> {
    let path = dir.join(CONFIG_FILENAME);
    if !path.exists() {
        return resolve_config(None);
    }
    load_config_file(&path)
}

/// Load an explicitly named config file. A missing file is an error.
pub fn load_config_file(path: &Path) -> Result<CatalogConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    resolve_config(Some(value))
}

/// Returns a fully-commented stock `archivist.toml` with all keys and
/// explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Archivist Configuration
# =======================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Folders
# ---------------------------------------------------------------------------
[folders]
# Hand-written descriptors and media: <sources>/<branch>/<leaf>/source.json
sources = "sources"

# Build artifacts: units, caches, migrations and the leaf/branch/root databases.
storage = "storage"

# Relocated media, split into content/, preview/ and thumbnails/.
content = "content"

# Where the frozen static database is written.
database = "database"

# ---------------------------------------------------------------------------
# Media
# ---------------------------------------------------------------------------
[media]
# Bounding boxes [width, height] for scaled copies. Never upscaled.
preview_size = [1024, 1024]
thumbnail_size = [384, 384]

# JPEG encoding quality for scaled copies (1 = worst, 100 = best).
quality = 90

# File extensions picked up from group directories.
extensions = ["jpg", "jpeg", "png", "tif", "tiff", "webp", "bmp"]

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel workers for sync and relocate. Omit for auto (= CPU cores).
# max_processes = 4
"##
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_has_folders_and_sizes() {
        let config = CatalogConfig::default();
        assert_eq!(config.folders.sources, PathBuf::from("sources"));
        assert_eq!(config.folders.database, PathBuf::from("database"));
        assert_eq!(config.media.preview_size, [1024, 1024]);
        assert_eq!(config.media.thumbnail_size, [384, 384]);
        assert!(config.processing.max_processes.is_none());
    }

    #[test]
    fn default_config_is_valid() {
        CatalogConfig::default().validate().unwrap();
    }

    #[test]
    fn stock_config_toml_matches_defaults() {
        let value: toml::Value = toml::from_str(stock_config_toml()).unwrap();
        let config = resolve_config(Some(value)).unwrap();
        let default = CatalogConfig::default();
        assert_eq!(config.folders.storage, default.folders.storage);
        assert_eq!(config.media.extensions, default.media.extensions);
        assert_eq!(config.media.quality, default.media.quality);
    }

    // =========================================================================
    // merge_toml
    // =========================================================================

    #[test]
    fn merge_keeps_unset_keys() {
        let base = stock_defaults_value();
        let overlay: toml::Value = toml::from_str("[folders]\nstorage = \"/srv/x\"").unwrap();
        let merged = merge_toml(base, overlay);
        let config: CatalogConfig = merged.try_into().unwrap();
        assert_eq!(config.folders.storage, PathBuf::from("/srv/x"));
        assert_eq!(config.folders.sources, PathBuf::from("sources"));
    }

    #[test]
    fn merge_replaces_arrays_whole() {
        let base = stock_defaults_value();
        let overlay: toml::Value = toml::from_str("[media]\nextensions = [\"png\"]").unwrap();
        let config: CatalogConfig = merge_toml(base, overlay).try_into().unwrap();
        assert_eq!(config.media.extensions, vec!["png".to_string()]);
    }

    // =========================================================================
    // load_config
    // =========================================================================

    #[test]
    fn load_config_returns_default_when_no_file() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(tmp.path()).unwrap();
        assert_eq!(config.media.preview_size, [1024, 1024]);
    }

    #[test]
    fn load_config_reads_partial_file() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join(CONFIG_FILENAME),
            "[media]\nthumbnail_size = [200, 100]\n[processing]\nmax_processes = 2\n",
        )
        .unwrap();
        let config = load_config(tmp.path()).unwrap();
        assert_eq!(config.media.thumbnail_size, [200, 100]);
        assert_eq!(config.media.preview_size, [1024, 1024]);
        assert_eq!(config.processing.max_processes, Some(2));
    }

    #[test]
    fn unknown_key_is_rejected() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(CONFIG_FILENAME), "[folders]\nsauces = \"x\"\n").unwrap();
        assert!(matches!(load_config(tmp.path()), Err(ConfigError::Toml(_))));
    }

    #[test]
    fn invalid_toml_is_rejected() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(CONFIG_FILENAME), "[folders\n").unwrap();
        assert!(load_config(tmp.path()).is_err());
    }

    #[test]
    fn explicit_missing_file_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nope.toml");
        assert!(matches!(
            load_config_file(&path),
            Err(ConfigError::NotFound(_))
        ));
    }

    // =========================================================================
    // validate
    // =========================================================================

    #[test]
    fn zero_size_is_rejected() {
        let mut config = CatalogConfig::default();
        config.media.thumbnail_size = [0, 384];
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn undecodable_extension_is_rejected() {
        let mut config = CatalogConfig::default();
        config.media.extensions = vec!["mp4".into()];
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn quality_out_of_range_is_rejected() {
        let mut config = CatalogConfig::default();
        config.media.quality = 0;
        assert!(config.validate().is_err());
        config.media.quality = 101;
        assert!(config.validate().is_err());
    }

    #[test]
    fn effective_threads_clamps_to_cores() {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let config = ProcessingConfig {
            max_processes: Some(10_000),
        };
        assert_eq!(effective_threads(&config), cores);
        assert_eq!(effective_threads(&ProcessingConfig::default()), cores);
        assert_eq!(
            effective_threads(&ProcessingConfig {
                max_processes: Some(1)
            }),
            1
        );
    }
}
