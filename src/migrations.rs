//! make-migrations: unit file → insertion statements (+ relocation plan).
//!
//! A migration is plain SQL, one `INSERT` per unit row, written in a fixed
//! order: themes, synonyms and their values, groups, media items, users, then
//! tag and permission associations. Statements are separated by `;` and a
//! newline and are only appended; nothing is updated or deleted.
//!
//! ```text
//! <storage>/<branch>/<leaf>/unit.json       (input)
//! <storage>/<branch>/<leaf>/migration.sql   (output)
//! <storage>/<branch>/<leaf>/relocation.json (output)
//! ```
//!
//! Both outputs are written only when missing, unless forced.

use crate::config::{Folders, MediaConfig};
use crate::database::schema::{self, Table};
use crate::identity::RouteRegistry;
use crate::relocate::{self, RELOCATION_FILENAME};
use crate::types::{
    Association, Group, LeafReport, Meta, StageReport, Status, Synonym, Theme, Unit, User,
};
use crate::unite::{UNIT_FILENAME, gather_routes, load_unit};
use crate::walk::{Selection, walk};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{info, warn};

/// Name of the migration within a leaf's storage folder.
pub const MIGRATION_FILENAME: &str = "migration.sql";

#[derive(Error, Debug)]
pub enum MigrationsError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A literal in an insertion statement.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Text(String),
    Integer(i64),
    Real(f64),
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Text(s) => write!(f, "'{}'", s.replace('\'', "''")),
            SqlValue::Integer(i) => write!(f, "{i}"),
            SqlValue::Real(r) => write!(f, "{r}"),
        }
    }
}

fn text(s: &str) -> SqlValue {
    SqlValue::Text(s.to_string())
}

fn theme_values(t: &Theme) -> Vec<SqlValue> {
    vec![
        text(&t.revision),
        text(&t.last_update),
        text(&t.uuid),
        text(&t.route),
        text(&t.label),
    ]
}

fn synonym_values(s: &Synonym) -> Vec<SqlValue> {
    vec![
        text(&s.revision),
        text(&s.last_update),
        text(&s.uuid),
        text(&s.theme_uuid),
        text(&s.label),
    ]
}

fn group_values(g: &Group) -> Vec<SqlValue> {
    let p = &g.provenance;
    vec![
        text(&g.revision),
        text(&g.last_update),
        text(&g.uuid),
        text(&g.theme_uuid),
        text(&g.route),
        text(&g.label),
        text(&p.registered_on),
        text(&p.registered_by),
        text(&p.author),
        text(&p.author_url),
        text(&p.origin_url),
        text(&p.comment),
        text(&p.hierarchy),
    ]
}

fn meta_values(m: &Meta) -> Vec<SqlValue> {
    let p = &m.provenance;
    vec![
        text(&m.revision),
        text(&m.last_update),
        text(&m.uuid),
        text(&m.theme_uuid),
        text(&m.group_uuid),
        text(&p.registered_on),
        text(&p.registered_by),
        text(&p.author),
        text(&p.author_url),
        text(&p.origin_url),
        text(&p.comment),
        text(&p.hierarchy),
        text(&m.path_to_content),
        text(&m.path_to_preview),
        text(&m.path_to_thumbnail),
        text(&m.original_filename),
        text(&m.original_extension),
        SqlValue::Integer(i64::from(m.width)),
        SqlValue::Integer(i64::from(m.height)),
        SqlValue::Real(m.resolution),
        SqlValue::Integer(m.size as i64),
        SqlValue::Integer(m.duration as i64),
        text(&m.media_type),
        SqlValue::Integer(i64::from(m.ordering)),
        text(&m.signature),
        text(&m.signature_type),
        text(&m.previous),
        text(&m.next),
    ]
}

fn user_values(u: &User) -> Vec<SqlValue> {
    vec![
        text(&u.revision),
        text(&u.last_update),
        text(&u.uuid),
        text(&u.name),
    ]
}

fn association_values(a: &Association) -> Vec<SqlValue> {
    vec![
        text(&a.revision),
        text(&a.last_update),
        text(&a.owner),
        text(&a.value),
    ]
}

fn insert(table: &Table, values: Vec<SqlValue>) -> String {
    let rendered: Vec<String> = values.iter().map(ToString::to_string).collect();
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table.name,
        table.column_names().join(", "),
        rendered.join(", ")
    )
}

/// Insertion statements for every row of `unit`, parents first.
pub fn generate(unit: &Unit) -> Vec<String> {
    let mut statements = Vec::new();
    let mut emit = |table: &Table, rows: Vec<Vec<SqlValue>>| {
        statements.extend(rows.into_iter().map(|values| insert(table, values)));
    };

    emit(&schema::THEMES, unit.themes.iter().map(theme_values).collect());
    emit(&schema::SYNONYMS, unit.synonyms.iter().map(synonym_values).collect());
    emit(
        &schema::SYNONYMS_VALUES,
        unit.synonyms_values.iter().map(association_values).collect(),
    );
    emit(&schema::GROUPS, unit.groups.iter().map(group_values).collect());
    emit(&schema::METAS, unit.metas.iter().map(meta_values).collect());
    emit(&schema::USERS, unit.users.iter().map(user_values).collect());

    let associations = [
        (&schema::TAGS_THEMES, &unit.tags_themes),
        (&schema::TAGS_GROUPS, &unit.tags_groups),
        (&schema::TAGS_METAS, &unit.tags_metas),
        (&schema::PERMISSIONS_THEMES, &unit.permissions_themes),
        (&schema::PERMISSIONS_GROUPS, &unit.permissions_groups),
        (&schema::PERMISSIONS_METAS, &unit.permissions_metas),
        (&schema::PERMISSIONS_USERS, &unit.permissions_users),
    ];
    for (table, rows) in associations {
        emit(table, rows.iter().map(association_values).collect());
    }
    statements
}

/// Join statements into migration file text.
pub fn render(statements: &[String]) -> String {
    statements.iter().map(|s| format!("{s};\n")).collect()
}

/// Split migration text back into statements.
///
/// Semicolons inside single-quoted literals (with `''` escapes) do not split.
pub fn split_statements(text: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut in_quote = false;

    for c in text.chars() {
        match c {
            '\'' => {
                in_quote = !in_quote;
                current.push(c);
            }
            ';' if !in_quote => {
                let statement = current.trim();
                if !statement.is_empty() {
                    statements.push(statement.to_string());
                }
                current.clear();
            }
            _ => current.push(c),
        }
    }
    let tail = current.trim();
    if !tail.is_empty() {
        statements.push(tail.to_string());
    }
    statements
}

/// Write migration and relocation files for every selected unit.
pub fn make_migrations(
    folders: &Folders,
    media: &MediaConfig,
    selection: &Selection,
) -> Result<StageReport, MigrationsError> {
    let routes: RouteRegistry = gather_routes(&folders.storage);
    let mut report = StageReport::default();

    for location in walk(&folders.storage, &selection.branch, &selection.leaf) {
        let unit_path = location.folder.join(UNIT_FILENAME);
        let unit = match load_unit(&unit_path) {
            Ok(Some(unit)) => unit,
            Ok(None) => {
                report.push(LeafReport::new(
                    &location.branch,
                    &location.leaf,
                    "migration",
                    Status::Skipped("unit file does not exist".into()),
                ));
                continue;
            }
            Err(e) => {
                warn!(branch = %location.branch, leaf = %location.leaf, error = %e, "leaf skipped");
                report.push(LeafReport::new(
                    &location.branch,
                    &location.leaf,
                    "migration",
                    Status::Failed(e.to_string()),
                ));
                continue;
            }
        };

        let migration_path = location.folder.join(MIGRATION_FILENAME);
        let relocation_path = location.folder.join(RELOCATION_FILENAME);
        if migration_path.exists() && relocation_path.exists() && !selection.force {
            report.push(LeafReport::new(
                &location.branch,
                &location.leaf,
                "migration",
                Status::AlreadyExists,
            ));
            continue;
        }

        let source_leaf = folders.sources.join(&location.branch).join(&location.leaf);
        let relocations = match relocate::plan(&unit, &routes, &source_leaf, &folders.content, media) {
            Ok(r) => r,
            Err(e) => {
                warn!(branch = %location.branch, leaf = %location.leaf, error = %e, "no relocation plan");
                report.push(LeafReport::new(
                    &location.branch,
                    &location.leaf,
                    "migration",
                    Status::Failed(e.to_string()),
                ));
                continue;
            }
        };

        let statements = generate(&unit);
        write(&migration_path, &render(&statements))?;
        let json = serde_json::to_string_pretty(&relocations)?;
        write(&relocation_path, &json)?;

        info!(
            branch = %location.branch,
            leaf = %location.leaf,
            statements = statements.len(),
            relocations = relocations.len(),
            "migration written"
        );
        report.push(LeafReport::new(
            &location.branch,
            &location.leaf,
            "migration",
            Status::Created,
        ));
    }
    Ok(report)
}

fn write(path: &std::path::Path, content: &str) -> Result<(), MigrationsError> {
    std::fs::write(path, content).map_err(|source| MigrationsError::Io {
        path: path.to_path_buf(),
        source,
    })
}
