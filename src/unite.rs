//! unite: leaf descriptor → unit file.
//!
//! For every selected leaf under the sources folder:
//!
//! ```text
//! source.json ──substitute──► JSON ──parse+validate──► Source
//!                                                         │
//!          group directories ──list+analyze──► media rows │
//!                                                         ▼
//!                                    unit.json + cache.json (storage)
//! ```
//!
//! ## Identity across runs
//!
//! Before any leaf is built, every cache and unit file already in storage is
//! loaded: caches seed the resolver (so identifiers minted by other leaves are
//! never drawn or replayed again) and units seed the route registry (so a
//! leaf may list media for a theme or group declared elsewhere). A unit file
//! that cannot be read contributes no routes.
//!
//! Per leaf, cached variable bindings are seeded first and the text is
//! substituted; only then are the cached media suffixes queued for replay, so
//! a newly declared variable can never take a suffix that belongs to a file.
//! Media identifiers are minted one per file, files sorted by name, so an
//! unchanged leaf replays to the same identifiers in the same places.
//!
//! ## Failures
//!
//! Validation errors (bad JSON, wrong kinds, duplicates, undeclared
//! variables, unreadable media) fail the leaf and the run moves on.
//! Consistency hazards (a replayed suffix already in use, one identifier
//! cached by two leaves) abort the run: they mean a corrupted cache.

use crate::cache::{CacheError, LeafCache, hash_text};
use crate::config::{Folders, MediaConfig};
use crate::identity::{EntityKind, IdentityError, IdentityResolver, IdentityState, RouteRegistry};
use crate::imaging::{BackendError, ImageBackend, MediaAnalyzer, MediaInfo};
use crate::preprocess::{find_leftover_variable, preprocess, unescape};
use crate::source::{
    NO_GROUP, SOURCE_FILENAME, Source, SourceError, SourceGroup, SourceMeta, SourceSynonym,
    SourceTheme, SourceUser,
};
use crate::types::{
    BuildStamp, Group, LeafReport, Meta, Provenance, StageReport, Status, Synonym, Theme, Unit,
    User,
};
use crate::walk::{Selection, list_files, walk};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Name of the unit file within a leaf's storage folder.
pub const UNIT_FILENAME: &str = "unit.json";

#[derive(Error, Debug)]
pub enum UnitFileError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Malformed unit file {path}: {source}")]
    Corrupted {
        path: PathBuf,
        source: serde_json::Error,
    },
}

#[derive(Error, Debug)]
pub enum UniteError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Identity(#[from] IdentityError),
    #[error("Cannot analyze {path}: {source}")]
    Media { path: PathBuf, source: BackendError },
    #[error("{0} is not a known media file")]
    UnknownMedia(PathBuf),
    #[error("Unresolved variable left in unit: {0}")]
    Leftover(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl UniteError {
    fn identity(&self) -> Option<&IdentityError> {
        match self {
            UniteError::Identity(e) | UniteError::Source(SourceError::Identity(e)) => Some(e),
            _ => None,
        }
    }

    /// Errors that fail one leaf without stopping the run.
    pub fn is_validation(&self) -> bool {
        if let Some(e) = self.identity() {
            return !e.is_consistency_hazard();
        }
        matches!(
            self,
            UniteError::Source(_)
                | UniteError::Media { .. }
                | UniteError::UnknownMedia(_)
                | UniteError::Leftover(_)
        )
    }

    pub fn is_consistency_hazard(&self) -> bool {
        self.identity().is_some_and(IdentityError::is_consistency_hazard)
    }
}

// ============================================================================
// Unit files
// ============================================================================

/// Read a unit file. `None` when it doesn't exist.
pub fn load_unit(path: &Path) -> Result<Option<Unit>, UnitFileError> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(UnitFileError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|source| UnitFileError::Corrupted {
            path: path.to_path_buf(),
            source,
        })
}

/// Routes of every theme and group in every readable unit file under
/// `storage`. Unreadable unit files are skipped with a warning.
pub fn gather_routes(storage: &Path) -> RouteRegistry {
    let mut routes = RouteRegistry::new();
    for location in walk(storage, &Default::default(), &Default::default()) {
        match load_unit(&location.folder.join(UNIT_FILENAME)) {
            Ok(Some(unit)) => routes.gather_from_unit(&unit),
            Ok(None) => {}
            Err(e) => {
                warn!(branch = %location.branch, leaf = %location.leaf, error = %e, "routes skipped")
            }
        }
    }
    routes
}

/// Fill `state` from everything already in storage.
pub fn gather(storage: &Path, state: &mut IdentityState) -> Result<(), UniteError> {
    state.router = gather_routes(storage);
    for location in walk(storage, &Default::default(), &Default::default()) {
        let cache = LeafCache::load(&location.folder)?;
        state.resolver.seed_cache(
            &location.branch,
            &location.leaf,
            &cache,
            &mut state.generator,
        )?;
    }
    debug!(
        routes = state.router.len(),
        bindings = state.resolver.len(),
        "storage gathered"
    );
    Ok(())
}

// ============================================================================
// Building one leaf
// ============================================================================

/// One leaf's descriptor and where its media lives.
pub struct LeafInput<'a> {
    pub branch: &'a str,
    pub leaf: &'a str,
    /// `<sources>/<branch>/<leaf>`
    pub folder: &'a Path,
    pub text: &'a str,
}

/// A built unit and the cache that reproduces it.
#[derive(Debug)]
pub struct BuiltLeaf {
    pub unit: Unit,
    pub cache: LeafCache,
}

struct UnitBuilder<'s, 'a> {
    state: &'s mut IdentityState,
    analyzer: &'s MediaAnalyzer<'a>,
    folder: &'s Path,
    stamp: BuildStamp,
    unit: Unit,
}

impl UnitBuilder<'_, '_> {
    fn add_theme(&mut self, theme: &SourceTheme) {
        let stamp = &self.stamp;
        self.state.router.register(&theme.uuid, &theme.route);
        self.unit.themes.push(Theme {
            revision: stamp.revision.clone(),
            last_update: stamp.last_update.clone(),
            uuid: theme.uuid.clone(),
            route: theme.route.clone(),
            label: theme.label.clone(),
        });
        Unit::attach(&mut self.unit.tags_themes, stamp, &theme.uuid, &theme.tags);
        Unit::attach(
            &mut self.unit.permissions_themes,
            stamp,
            &theme.uuid,
            &theme.permissions,
        );
        for synonym in &theme.synonyms {
            self.add_synonym(synonym);
        }
    }

    fn add_synonym(&mut self, synonym: &SourceSynonym) {
        let stamp = &self.stamp;
        self.unit.synonyms.push(Synonym {
            revision: stamp.revision.clone(),
            last_update: stamp.last_update.clone(),
            uuid: synonym.uuid.clone(),
            theme_uuid: synonym.theme_uuid.clone(),
            label: synonym.label.clone(),
        });
        Unit::attach(
            &mut self.unit.synonyms_values,
            stamp,
            &synonym.uuid,
            &synonym.values,
        );
    }

    fn add_group(&mut self, group: &SourceGroup) {
        let stamp = &self.stamp;
        self.state.router.register(&group.uuid, &group.route);
        self.unit.groups.push(Group {
            revision: stamp.revision.clone(),
            last_update: stamp.last_update.clone(),
            uuid: group.uuid.clone(),
            theme_uuid: group.theme_uuid.clone(),
            route: group.route.clone(),
            label: group.label.clone(),
            provenance: group.provenance.clone(),
        });
        Unit::attach(&mut self.unit.tags_groups, stamp, &group.uuid, &group.tags);
        Unit::attach(
            &mut self.unit.permissions_groups,
            stamp,
            &group.uuid,
            &group.permissions,
        );
    }

    fn add_user(&mut self, user: &SourceUser) {
        let stamp = &self.stamp;
        self.unit.users.push(User {
            revision: stamp.revision.clone(),
            last_update: stamp.last_update.clone(),
            uuid: user.uuid.clone(),
            name: user.name.clone(),
        });
        Unit::attach(
            &mut self.unit.permissions_users,
            stamp,
            &user.uuid,
            &user.permissions,
        );
    }

    /// Directory holding the files of a group.
    fn media_folder(&self, theme_uuid: &str, group_uuid: &str) -> Result<PathBuf, IdentityError> {
        let theme_route = self.state.router.route(theme_uuid)?;
        let group_route = self.state.router.route(group_uuid)?;
        Ok(self.folder.join(theme_route).join(group_route))
    }

    /// One media row for `path`, with a freshly minted (or replayed)
    /// identifier.
    fn media_row(
        &mut self,
        path: &Path,
        theme_uuid: &str,
        group_uuid: &str,
        provenance: &Provenance,
        ordering: u32,
    ) -> Result<Meta, UniteError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_string();
        if !self.analyzer.is_known_media(&extension) {
            return Err(UniteError::UnknownMedia(path.to_path_buf()));
        }
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();

        let info: MediaInfo = self
            .analyzer
            .analyze(path)
            .map_err(|source| UniteError::Media {
                path: path.to_path_buf(),
                source,
            })?;
        let uuid = self.state.generator.generate(EntityKind::Meta)?;

        let theme_route = self.state.router.route(theme_uuid)?;
        let group_route = self.state.router.route(group_uuid)?;
        let media_path = |root: &str| {
            format!(
                "/{root}/{theme_route}/{group_route}/{uuid}.{}",
                extension.to_ascii_lowercase()
            )
        };

        Ok(Meta {
            revision: self.stamp.revision.clone(),
            last_update: self.stamp.last_update.clone(),
            path_to_content: media_path("content"),
            path_to_preview: media_path("preview"),
            path_to_thumbnail: media_path("thumbnails"),
            uuid,
            theme_uuid: theme_uuid.to_string(),
            group_uuid: group_uuid.to_string(),
            provenance: provenance.clone(),
            original_filename: stem,
            original_extension: extension,
            width: info.width,
            height: info.height,
            resolution: info.resolution,
            size: info.size,
            duration: info.duration,
            media_type: info.media_type,
            ordering,
            signature: info.signature,
            signature_type: info.signature_type,
            previous: String::new(),
            next: String::new(),
        })
    }

    /// Every known media file in the group's directory, in name order.
    fn list_group(&mut self, group: &SourceGroup) -> Result<(), UniteError> {
        if group.route == NO_GROUP {
            return Ok(());
        }
        let folder = self.media_folder(&group.theme_uuid, &group.uuid)?;
        let files: Vec<PathBuf> = list_files(&folder)
            .into_iter()
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| self.analyzer.is_known_media(e))
            })
            .collect();
        if files.is_empty() {
            warn!(group = %group.uuid, folder = %folder.display(), "group has no media");
        }

        let mut metas = Vec::with_capacity(files.len());
        for (i, path) in files.iter().enumerate() {
            let ordering = u32::try_from(i + 1).unwrap_or(u32::MAX);
            metas.push(self.media_row(
                path,
                &group.theme_uuid,
                &group.uuid,
                &group.provenance,
                ordering,
            )?);
        }
        link_neighbours(&mut metas);

        for meta in &metas {
            Unit::attach(&mut self.unit.tags_metas, &self.stamp, &meta.uuid, &group.tags);
            Unit::attach(
                &mut self.unit.permissions_metas,
                &self.stamp,
                &meta.uuid,
                &group.permissions,
            );
        }
        self.unit.metas.extend(metas);
        Ok(())
    }

    /// Explicitly named files. They stand alone: ordering 0, no neighbours.
    fn add_explicit(&mut self, entry: &SourceMeta) -> Result<(), UniteError> {
        let folder = self.media_folder(&entry.theme_uuid, &entry.group_uuid)?;
        for filename in &entry.filenames {
            let meta = self.media_row(
                &folder.join(filename),
                &entry.theme_uuid,
                &entry.group_uuid,
                &entry.provenance,
                0,
            )?;
            Unit::attach(&mut self.unit.tags_metas, &self.stamp, &meta.uuid, &entry.tags);
            Unit::attach(
                &mut self.unit.permissions_metas,
                &self.stamp,
                &meta.uuid,
                &entry.permissions,
            );
            self.unit.metas.push(meta);
        }
        Ok(())
    }
}

/// Point each media row at its neighbours in listing order.
fn link_neighbours(metas: &mut [Meta]) {
    let ids: Vec<String> = metas.iter().map(|m| m.uuid.clone()).collect();
    for (i, meta) in metas.iter_mut().enumerate() {
        meta.previous = i.checked_sub(1).map(|p| ids[p].clone()).unwrap_or_default();
        meta.next = ids.get(i + 1).cloned().unwrap_or_default();
    }
}

fn assemble(
    input: &LeafInput<'_>,
    stamp: &BuildStamp,
    cache: &LeafCache,
    state: &mut IdentityState,
    analyzer: &MediaAnalyzer<'_>,
) -> Result<Unit, UniteError> {
    let text = preprocess(
        input.text,
        input.branch,
        input.leaf,
        stamp,
        &mut state.resolver,
        &mut state.generator,
    )?;
    if let Some(fragment) = find_leftover_variable(&text) {
        return Err(UniteError::Leftover(fragment));
    }
    let text = unescape(&text);
    // Variable identifiers persist through bindings, not the replay list.
    state.generator.drain_consumed();
    state
        .generator
        .insert_replay_queue(cache.uuids.iter().cloned())?;

    let source = Source::parse(&text)?;
    source.validate()?;

    let mut builder = UnitBuilder {
        state,
        analyzer,
        folder: input.folder,
        stamp: stamp.clone(),
        unit: Unit::default(),
    };
    for theme in &source.themes {
        builder.add_theme(theme);
    }
    for synonym in &source.synonyms {
        builder.add_synonym(synonym);
    }
    for group in &source.groups {
        builder.add_group(group);
    }
    for group in &source.groups {
        builder.list_group(group)?;
    }
    for entry in &source.metas {
        builder.add_explicit(entry)?;
    }
    for user in &source.users {
        builder.add_user(user);
    }

    Ok(builder.unit)
}

/// Build one leaf's unit and the cache that reproduces it.
///
/// `fresh` is used unless the cache recorded a stamp for this exact text.
/// The generator's replay queue is always emptied before returning.
pub fn build_unit(
    input: &LeafInput<'_>,
    fresh: &BuildStamp,
    cache: &LeafCache,
    state: &mut IdentityState,
    analyzer: &MediaAnalyzer<'_>,
) -> Result<BuiltLeaf, UniteError> {
    let source_hash = hash_text(input.text);
    let stamp = cache.stamp_for(&source_hash, fresh);
    state
        .resolver
        .seed_cache(input.branch, input.leaf, cache, &mut state.generator)?;
    IdentityResolver::release_media(cache, &mut state.generator);

    let outcome = assemble(input, &stamp, cache, state, analyzer);
    state.generator.clear_replay_queue();
    let uuids = state.generator.drain_consumed();
    let unit = outcome?;

    let cache = LeafCache {
        variables: state.resolver.extract(input.branch, input.leaf),
        uuids,
        source_hash: Some(source_hash),
        stamp: Some(stamp),
    };
    Ok(BuiltLeaf { unit, cache })
}

// ============================================================================
// Stage
// ============================================================================

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> UniteError + '_ {
    move |source| UniteError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Build unit files for every selected leaf.
///
/// Returns `Err` only for failures that make further leaves unsafe to build;
/// per-leaf validation failures are reported in the [`StageReport`].
pub fn unite(
    backend: &impl ImageBackend,
    folders: &Folders,
    media: &MediaConfig,
    selection: &Selection,
    fresh: &BuildStamp,
) -> Result<StageReport, UniteError> {
    let mut state = IdentityState::new();
    gather(&folders.storage, &mut state)?;
    let analyzer = MediaAnalyzer::new(backend, &media.extensions);
    let mut report = StageReport::default();

    for location in walk(&folders.sources, &selection.branch, &selection.leaf) {
        let (branch, leaf) = (location.branch.as_str(), location.leaf.as_str());
        let source_path = location.folder.join(SOURCE_FILENAME);
        if !source_path.is_file() {
            report.push(LeafReport::new(
                branch,
                leaf,
                "unit",
                Status::Skipped("source file does not exist".into()),
            ));
            continue;
        }

        let storage = folders.storage.join(branch).join(leaf);
        let unit_path = storage.join(UNIT_FILENAME);
        if unit_path.exists() && !selection.force {
            report.push(LeafReport::new(branch, leaf, "unit", Status::AlreadyExists));
            continue;
        }

        let text = std::fs::read_to_string(&source_path).map_err(io_error(&source_path))?;
        let cache = LeafCache::load(&storage)?;
        let input = LeafInput {
            branch,
            leaf,
            folder: &location.folder,
            text: &text,
        };

        let built = match build_unit(&input, fresh, &cache, &mut state, &analyzer) {
            Ok(built) => built,
            Err(e) if e.is_validation() => {
                warn!(branch, leaf, error = %e, "leaf skipped");
                report.push(LeafReport::new(branch, leaf, "unit", Status::Failed(e.to_string())));
                continue;
            }
            Err(e) => return Err(e),
        };

        std::fs::create_dir_all(&storage).map_err(io_error(&storage))?;
        let json = serde_json::to_string_pretty(&built.unit)?;
        std::fs::write(&unit_path, json).map_err(io_error(&unit_path))?;
        built.cache.save(&storage).map_err(io_error(&storage))?;

        info!(branch, leaf, metas = built.unit.metas.len(), "unit written");
        report.push(LeafReport::new(branch, leaf, "unit", Status::Created));
    }
    Ok(report)
}
