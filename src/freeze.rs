//! freeze: root database → static database with lookup tables.
//!
//! The static database is rebuilt whole on every run: the old file is deleted,
//! every catalog row is copied from root, then the derived tables are filled
//! in one transaction:
//!
//! | Table | Contents |
//! |---|---|
//! | `index_tags` | tag → media item, with tags inherited from its theme and group |
//! | `index_permissions` | permission → theme, group or media item, inherited downwards |
//! | `index_thumbnails` | media item → thumbnail path, numbered by (hierarchy, ordering) |
//! | `helpers` | `stats__<theme>` and `stats__all_themes` JSON summaries |

use crate::database::{self, DatabaseError};
use crate::sync::root_db_path;
use rusqlite::{Connection, Transaction, params};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

/// Name of the static database within the database folder.
pub const STATIC_DB_FILENAME: &str = "database.db";

/// Helper key for statistics over the whole catalog.
pub const ALL_THEMES_KEY: &str = "stats__all_themes";

#[derive(Error, Debug)]
pub enum FreezeError {
    #[error("Root database {0} does not exist; run sync first")]
    MissingRoot(PathBuf),
    #[error(transparent)]
    Database(#[from] DatabaseError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<rusqlite::Error> for FreezeError {
    fn from(e: rusqlite::Error) -> Self {
        FreezeError::Database(DatabaseError::Sqlite(e))
    }
}

/// Row counts of a finished freeze.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FreezeSummary {
    pub path: PathBuf,
    pub rows: usize,
    pub tags: usize,
    pub permissions: usize,
    pub thumbnails: usize,
    pub helpers: usize,
}

const TAG_INDEX_SQL: &str = "
    INSERT OR IGNORE INTO index_tags (tag, uuid)
        SELECT value, meta_uuid FROM tags_metas
        UNION
        SELECT t.value, m.uuid FROM metas m JOIN tags_themes t ON t.theme_uuid = m.theme_uuid
        UNION
        SELECT g.value, m.uuid FROM metas m JOIN tags_groups g ON g.group_uuid = m.group_uuid
";

const PERMISSION_INDEX_SQL: &str = "
    INSERT OR IGNORE INTO index_permissions (permission, uuid)
        SELECT value, theme_uuid FROM permissions_themes
        UNION
        SELECT value, group_uuid FROM permissions_groups
        UNION
        SELECT t.value, g.uuid FROM groups g JOIN permissions_themes t ON t.theme_uuid = g.theme_uuid
        UNION
        SELECT value, meta_uuid FROM permissions_metas
        UNION
        SELECT t.value, m.uuid FROM metas m JOIN permissions_themes t ON t.theme_uuid = m.theme_uuid
        UNION
        SELECT g.value, m.uuid FROM metas m JOIN permissions_groups g ON g.group_uuid = m.group_uuid
";

/// Number every media item in default display order.
fn build_thumbnail_index(tx: &Transaction<'_>) -> Result<usize, rusqlite::Error> {
    let thumbnails: Vec<(String, String)> = {
        let mut stmt = tx.prepare(
            "SELECT uuid, path_to_thumbnail FROM metas ORDER BY hierarchy, ordering, uuid",
        )?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        rows.collect::<Result<Vec<_>, _>>()?
    };

    let mut insert = tx.prepare(
        "INSERT INTO index_thumbnails (meta_uuid, number, path_to_thumbnail) VALUES (?1, ?2, ?3)",
    )?;
    for (number, (uuid, path)) in thumbnails.iter().enumerate() {
        insert.execute(params![uuid, number as i64 + 1, path])?;
    }
    Ok(thumbnails.len())
}

// ============================================================================
// Statistics
// ============================================================================

/// Summary stored as JSON under a `stats__` helper key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ThemeStats {
    pub total_items: u64,
    pub total_size: u64,
    pub min_date: Option<String>,
    pub max_date: Option<String>,
    /// Tag → number of media items carrying it.
    pub tags: BTreeMap<String, u64>,
}

impl ThemeStats {
    fn add_item(&mut self, size: u64, registered_on: &str) {
        self.total_items += 1;
        self.total_size += size;
        if registered_on.is_empty() {
            return;
        }
        if self.min_date.as_deref().is_none_or(|d| registered_on < d) {
            self.min_date = Some(registered_on.to_string());
        }
        if self.max_date.as_deref().is_none_or(|d| registered_on > d) {
            self.max_date = Some(registered_on.to_string());
        }
    }
}

/// Per-theme statistics plus the catalog-wide total under [`ALL_THEMES_KEY`].
fn collect_stats(tx: &Transaction<'_>) -> Result<BTreeMap<String, ThemeStats>, rusqlite::Error> {
    let mut per_theme: BTreeMap<String, ThemeStats> = BTreeMap::new();
    let mut all = ThemeStats::default();

    {
        let mut themes = tx.prepare("SELECT uuid FROM themes")?;
        for uuid in themes.query_map([], |row| row.get::<_, String>(0))? {
            per_theme.insert(uuid?, ThemeStats::default());
        }
    }

    let mut stmt = tx.prepare("SELECT theme_uuid, size, registered_on FROM metas")?;
    let items = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, String>(2)?,
        ))
    })?;
    for item in items {
        let (theme, size, registered_on) = item?;
        let size = u64::try_from(size).unwrap_or(0);
        per_theme
            .entry(theme)
            .or_default()
            .add_item(size, &registered_on);
        all.add_item(size, &registered_on);
    }

    let mut stmt = tx.prepare(
        "SELECT m.theme_uuid, i.tag FROM index_tags i JOIN metas m ON m.uuid = i.uuid",
    )?;
    let tags = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;
    for pair in tags {
        let (theme, tag) = pair?;
        *per_theme.entry(theme).or_default().tags.entry(tag.clone()).or_default() += 1;
        *all.tags.entry(tag).or_default() += 1;
    }

    let mut stats: BTreeMap<String, ThemeStats> = per_theme
        .into_iter()
        .map(|(theme, s)| (format!("stats__{theme}"), s))
        .collect();
    stats.insert(ALL_THEMES_KEY.to_string(), all);
    Ok(stats)
}

fn write_helpers(tx: &Transaction<'_>) -> Result<usize, FreezeError> {
    let stats = collect_stats(tx)?;
    let mut insert = tx.prepare("INSERT INTO helpers (key, value) VALUES (?1, ?2)")?;
    for (key, value) in &stats {
        insert.execute(params![key, serde_json::to_string(value)?])?;
    }
    Ok(stats.len())
}

/// Fill the derived tables of a static database that already holds the
/// catalog rows.
pub fn build_indexes(conn: &mut Connection) -> Result<FreezeSummary, FreezeError> {
    let tx = conn.transaction()?;
    let tags = tx.execute(TAG_INDEX_SQL, [])?;
    let permissions = tx.execute(PERMISSION_INDEX_SQL, [])?;
    let thumbnails = build_thumbnail_index(&tx)?;
    let helpers = write_helpers(&tx)?;
    tx.commit()?;
    Ok(FreezeSummary {
        tags,
        permissions,
        thumbnails,
        helpers,
        ..FreezeSummary::default()
    })
}

/// Rebuild `<database>/database.db` from `<storage>/root.db`.
pub fn freeze(storage: &Path, database_folder: &Path) -> Result<FreezeSummary, FreezeError> {
    let root = root_db_path(storage);
    if !root.exists() {
        return Err(FreezeError::MissingRoot(root));
    }
    let path = database_folder.join(STATIC_DB_FILENAME);
    database::remove(&path)?;

    let root_conn = database::open(&root)?;
    let mut conn = database::open(&path)?;
    let rows = database::synchronize(&root_conn, &mut conn)?;
    let summary = FreezeSummary {
        path: path.clone(),
        rows,
        ..build_indexes(&mut conn)?
    };
    info!(
        path = %path.display(),
        rows,
        tags = summary.tags,
        thumbnails = summary.thumbnails,
        "static database frozen"
    );
    Ok(summary)
}
