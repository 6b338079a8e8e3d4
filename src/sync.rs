//! sync: leaf databases → branch databases → root database.
//!
//! ```text
//! <storage>/<branch>/<leaf>/migration.db ─┐
//! <storage>/<branch>/<leaf>/migration.db ─┴─► <storage>/<branch>/branch.db ─┐
//!                                          ...                              ├─► <storage>/root.db
//! <storage>/<other>/<leaf>/migration.db ───► <storage>/<other>/branch.db ───┘
//! ```
//!
//! Merging is an upsert by primary key, so re-running sync over unchanged
//! leaves changes nothing. Branches own disjoint files and are merged in
//! parallel; the root merge runs afterwards, one branch at a time.
//!
//! With `force`, the branch databases (and the root database, when every
//! branch is selected) are deleted first so they are rebuilt from the leaves.
//! Deleting only happens for full selections: rebuilding a branch from a
//! single leaf would drop the others.

use crate::database::{self, DatabaseError};
use crate::migrate::LEAF_DB_FILENAME;
use crate::types::{LeafReport, StageReport, Status};
use crate::walk::{LeafLocation, Selection, Selector, walk_by_branch};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const BRANCH_DB_FILENAME: &str = "branch.db";
pub const ROOT_DB_FILENAME: &str = "root.db";

#[derive(Error, Debug)]
pub enum SyncError {
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

pub fn branch_db_path(storage: &Path, branch: &str) -> PathBuf {
    storage.join(branch).join(BRANCH_DB_FILENAME)
}

pub fn root_db_path(storage: &Path) -> PathBuf {
    storage.join(ROOT_DB_FILENAME)
}

/// Merge every leaf database of one branch into its branch database.
fn sync_branch(storage: &Path, branch: &str, leaves: &[LeafLocation]) -> Vec<LeafReport> {
    let branch_db = branch_db_path(storage, branch);
    leaves
        .iter()
        .map(|location| {
            let leaf_db = location.folder.join(LEAF_DB_FILENAME);
            let status = if !leaf_db.exists() {
                Status::Skipped("leaf database does not exist".into())
            } else {
                match database::synchronize_files(&leaf_db, &branch_db) {
                    Ok(rows) => {
                        debug!(branch, leaf = %location.leaf, rows, "leaf merged");
                        Status::Created
                    }
                    Err(e) => {
                        warn!(branch, leaf = %location.leaf, error = %e, "leaf merge failed");
                        Status::Failed(e.to_string())
                    }
                }
            };
            LeafReport::new(branch, &location.leaf, "branch", status)
        })
        .collect()
}

/// Run both merge levels for the selection.
pub fn sync(storage: &Path, selection: &Selection) -> Result<StageReport, SyncError> {
    let branches = walk_by_branch(storage, &selection.branch, &selection.leaf);
    let root_db = root_db_path(storage);

    if selection.force && selection.leaf == Selector::All {
        for (branch, _) in &branches {
            database::remove(&branch_db_path(storage, branch))?;
        }
        if selection.branch == Selector::All {
            database::remove(&root_db)?;
        }
    }

    let per_branch: Vec<Vec<LeafReport>> = branches
        .par_iter()
        .map(|(branch, leaves)| sync_branch(storage, branch, leaves))
        .collect();

    let mut report = StageReport::default();
    for leaves in per_branch {
        for leaf in leaves {
            report.push(leaf);
        }
    }

    for (branch, _) in &branches {
        let branch_db = branch_db_path(storage, branch);
        if !branch_db.exists() {
            continue;
        }
        let status = match database::synchronize_files(&branch_db, &root_db) {
            Ok(rows) => {
                info!(branch = %branch, rows, "branch merged into root");
                Status::Created
            }
            Err(e) => {
                warn!(branch = %branch, error = %e, "branch merge failed");
                Status::Failed(e.to_string())
            }
        };
        report.push(LeafReport::new(branch, "", "root", status));
    }
    Ok(report)
}
