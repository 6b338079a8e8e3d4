//! migrate: migration file → leaf database.
//!
//! Each leaf database is created from scratch and filled in one transaction.
//! If any statement fails the transaction is rolled back and the database
//! file is removed, so a leaf database is either complete or absent.

use crate::database::{self, DatabaseError};
use crate::migrations::{MIGRATION_FILENAME, split_statements};
use crate::types::{LeafReport, StageReport, Status};
use crate::walk::{Selection, walk};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Name of the leaf database within a leaf's storage folder.
pub const LEAF_DB_FILENAME: &str = "migration.db";

#[derive(Error, Debug)]
pub enum MigrateError {
    #[error(transparent)]
    Database(#[from] DatabaseError),
    #[error("Statement {index} failed: {source}\n  {statement}")]
    Statement {
        index: usize,
        statement: String,
        source: rusqlite::Error,
    },
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl From<rusqlite::Error> for MigrateError {
    fn from(e: rusqlite::Error) -> Self {
        MigrateError::Database(DatabaseError::Sqlite(e))
    }
}

/// Run every statement inside one transaction. Nothing is kept on failure.
pub fn apply_statements(conn: &mut Connection, statements: &[String]) -> Result<usize, MigrateError> {
    let tx = conn.transaction()?;
    for (index, statement) in statements.iter().enumerate() {
        tx.execute(statement, [])
            .map_err(|source| MigrateError::Statement {
                index: index + 1,
                statement: statement.clone(),
                source,
            })?;
    }
    tx.commit()?;
    Ok(statements.len())
}

/// Create a fresh leaf database at `path` and apply `statements` to it.
///
/// On failure the file is removed before the error is returned.
pub fn apply_migration(path: &Path, statements: &[String]) -> Result<usize, MigrateError> {
    let result = database::open(path)
        .map_err(MigrateError::from)
        .and_then(|mut conn| apply_statements(&mut conn, statements));
    if result.is_err() {
        database::remove(path)?;
    }
    result
}

/// Apply the migration of every selected leaf.
///
/// A leaf whose migration cannot be read or applied is reported as failed and
/// the remaining leaves are still migrated.
pub fn migrate(storage: &Path, selection: &Selection) -> Result<StageReport, MigrateError> {
    let mut report = StageReport::default();

    for location in walk(storage, &selection.branch, &selection.leaf) {
        let (branch, leaf) = (location.branch.as_str(), location.leaf.as_str());
        let status = match migrate_leaf(&location.folder, selection.force) {
            Ok(Status::Created) => {
                info!(branch, leaf, "leaf database created");
                Status::Created
            }
            Ok(status) => status,
            Err(e) => {
                warn!(branch, leaf, error = %e, "leaf database not created");
                Status::Failed(e.to_string())
            }
        };
        report.push(LeafReport::new(branch, leaf, "database", status));
    }
    Ok(report)
}

fn migrate_leaf(folder: &Path, force: bool) -> Result<Status, MigrateError> {
    let migration_path = folder.join(MIGRATION_FILENAME);
    let text = match std::fs::read_to_string(&migration_path) {
        Ok(t) => t,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(Status::Skipped("migration file does not exist".into()));
        }
        Err(source) => {
            return Err(MigrateError::Io {
                path: migration_path,
                source,
            });
        }
    };

    let db_path = folder.join(LEAF_DB_FILENAME);
    if db_path.exists() {
        if !force {
            return Ok(Status::AlreadyExists);
        }
        database::remove(&db_path)?;
    }

    let count = apply_migration(&db_path, &split_statements(&text))?;
    debug!(path = %db_path.display(), statements = count, "statements applied");
    Ok(Status::Created)
}
