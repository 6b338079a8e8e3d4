//! SQLite access shared by every database level.
//!
//! Leaf, branch, root and static databases all carry the same schema
//! ([`schema`]). Connections are opened per operation and dropped when it
//! finishes; nothing holds a connection across stages.

pub mod schema;

use rusqlite::types::Value;
use rusqlite::{Connection, params_from_iter};
use schema::{SYNC_ORDER, Table};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Open (creating if needed) the database at `path` and ensure the schema.
pub fn open(path: &Path) -> Result<Connection, DatabaseError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| DatabaseError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let conn = Connection::open(path)?;
    conn.execute_batch(&schema::schema_sql())?;
    Ok(conn)
}

/// Remove a database file if present.
pub fn remove(path: &Path) -> Result<(), DatabaseError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(DatabaseError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

pub fn count_rows(conn: &Connection, table: &Table) -> Result<i64, DatabaseError> {
    let count = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table.name), [], |row| {
        row.get(0)
    })?;
    Ok(count)
}

/// Every row of `table`, ordered by primary key.
pub fn read_rows(conn: &Connection, table: &Table) -> Result<Vec<Vec<Value>>, DatabaseError> {
    let width = table.columns.len();
    let mut stmt = conn.prepare(&table.select_sql())?;
    let rows = stmt.query_map([], |row| {
        (0..width).map(|i| row.get::<_, Value>(i)).collect::<Result<Vec<_>, _>>()
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

/// Copy every catalog row from `source` into `dest`, overwriting by primary
/// key.
///
/// Tables are merged parent-first and each one is committed on its own, so an
/// interrupted merge leaves `dest` at the last finished table. Running the
/// same merge twice leaves `dest` unchanged. Returns the number of rows read.
pub fn synchronize(source: &Connection, dest: &mut Connection) -> Result<usize, DatabaseError> {
    let mut total = 0;
    for table in SYNC_ORDER.iter() {
        let rows = read_rows(source, table)?;
        if rows.is_empty() {
            continue;
        }
        let tx = dest.transaction()?;
        {
            let mut stmt = tx.prepare(&table.upsert_sql())?;
            for row in &rows {
                stmt.execute(params_from_iter(row.iter()))?;
            }
        }
        tx.commit()?;
        debug!(table = table.name, rows = rows.len(), "merged");
        total += rows.len();
    }
    Ok(total)
}

/// [`synchronize`] between two database files.
pub fn synchronize_files(source: &Path, dest: &Path) -> Result<usize, DatabaseError> {
    let source_conn = open(source)?;
    let mut dest_conn = open(dest)?;
    synchronize(&source_conn, &mut dest_conn)
}
