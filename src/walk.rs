//! Branch/leaf iteration over the sources and storage trees.
//!
//! Both trees share the same two-level shape:
//!
//! ```text
//! <root>/<branch>/<leaf>/
//! ```
//!
//! Every stage addresses its work by a [`Selection`]: one branch and one
//! leaf selector, each either `all` or a specific directory name. Hidden
//! entries (leading `.`) are skipped and everything is visited in name
//! order, so runs are reproducible.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use walkdir::WalkDir;

/// `all` or one specific directory name.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Selector {
    #[default]
    All,
    Named(String),
}

impl Selector {
    pub fn matches(&self, name: &str) -> bool {
        match self {
            Selector::All => true,
            Selector::Named(wanted) => wanted == name,
        }
    }
}

impl FromStr for Selector {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(if s == "all" {
            Selector::All
        } else {
            Selector::Named(s.to_string())
        })
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::All => f.write_str("all"),
            Selector::Named(name) => f.write_str(name),
        }
    }
}

/// Which leaves a stage should act on, and whether to overwrite.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Selection {
    pub branch: Selector,
    pub leaf: Selector,
    pub force: bool,
}

impl Selection {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn forced(mut self) -> Self {
        self.force = true;
        self
    }
}

/// One leaf directory found by [`walk`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafLocation {
    pub branch: String,
    pub leaf: String,
    pub folder: PathBuf,
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .is_some_and(|name| name.starts_with('.'))
}

/// Direct children of `folder` matching `keep`, sorted by name.
///
/// A missing folder has no children.
fn children(folder: &Path, keep: impl Fn(&walkdir::DirEntry) -> bool) -> Vec<PathBuf> {
    if !folder.is_dir() {
        return Vec::new();
    }
    WalkDir::new(folder)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e))
        .flatten()
        .filter(|e| keep(e))
        .map(|e| e.into_path())
        .collect()
}

/// Names of the visible subdirectories of `folder`, sorted.
pub fn list_folders(folder: &Path) -> Vec<String> {
    children(folder, |e| e.file_type().is_dir())
        .iter()
        .filter_map(|p| p.file_name().and_then(|n| n.to_str()).map(str::to_string))
        .collect()
}

/// Visible regular files directly inside `folder`, sorted by name.
pub fn list_files(folder: &Path) -> Vec<PathBuf> {
    children(folder, |e| e.file_type().is_file())
}

/// Every `<root>/<branch>/<leaf>` directory matched by the selectors.
pub fn walk(root: &Path, branch: &Selector, leaf: &Selector) -> Vec<LeafLocation> {
    let mut found = Vec::new();
    for current_branch in list_folders(root) {
        if !branch.matches(&current_branch) {
            continue;
        }
        let branch_folder = root.join(&current_branch);
        for current_leaf in list_folders(&branch_folder) {
            if !leaf.matches(&current_leaf) {
                continue;
            }
            found.push(LeafLocation {
                folder: branch_folder.join(&current_leaf),
                branch: current_branch.clone(),
                leaf: current_leaf,
            });
        }
    }
    found
}

/// Leaves grouped by branch, in walk order.
pub fn walk_by_branch(
    root: &Path,
    branch: &Selector,
    leaf: &Selector,
) -> Vec<(String, Vec<LeafLocation>)> {
    let mut grouped: Vec<(String, Vec<LeafLocation>)> = Vec::new();
    for location in walk(root, branch, leaf) {
        match grouped.last_mut() {
            Some((name, leaves)) if *name == location.branch => leaves.push(location),
            _ => grouped.push((location.branch.clone(), vec![location])),
        }
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn tree() -> TempDir {
        let tmp = TempDir::new().unwrap();
        for path in [
            "source_1/migration_1",
            "source_1/migration_2",
            "source_2/migration_3",
            "source_2/migration_4",
            "source_2/.hidden",
            ".git/objects",
        ] {
            fs::create_dir_all(tmp.path().join(path)).unwrap();
        }
        fs::write(tmp.path().join("source_1/stray.txt"), "x").unwrap();
        tmp
    }

    #[test]
    fn selector_parses_all_and_names() {
        assert_eq!("all".parse::<Selector>().unwrap(), Selector::All);
        assert_eq!(
            "trips".parse::<Selector>().unwrap(),
            Selector::Named("trips".into())
        );
        assert_eq!(Selector::Named("x".into()).to_string(), "x");
    }

    #[test]
    fn walk_all_visits_every_leaf_in_order() {
        let tmp = tree();
        let leaves: Vec<(String, String)> = walk(tmp.path(), &Selector::All, &Selector::All)
            .into_iter()
            .map(|l| (l.branch, l.leaf))
            .collect();
        assert_eq!(
            leaves,
            vec![
                ("source_1".into(), "migration_1".into()),
                ("source_1".into(), "migration_2".into()),
                ("source_2".into(), "migration_3".into()),
                ("source_2".into(), "migration_4".into()),
            ]
        );
    }

    #[test]
    fn walk_specific_branch_and_leaf() {
        let tmp = tree();
        let found = walk(
            tmp.path(),
            &Selector::Named("source_2".into()),
            &Selector::Named("migration_3".into()),
        );
        assert_eq!(
            found,
            vec![LeafLocation {
                branch: "source_2".into(),
                leaf: "migration_3".into(),
                folder: tmp.path().join("source_2").join("migration_3"),
            }]
        );
    }

    #[test]
    fn walk_missing_root_is_empty() {
        let tmp = TempDir::new().unwrap();
        assert!(walk(&tmp.path().join("nope"), &Selector::All, &Selector::All).is_empty());
    }

    #[test]
    fn walk_by_branch_groups_leaves() {
        let tmp = tree();
        let grouped = walk_by_branch(tmp.path(), &Selector::All, &Selector::All);
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[0].0, "source_1");
        assert_eq!(grouped[1].1.len(), 2);
    }

    #[test]
    fn list_files_skips_dirs_and_hidden() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("b.jpg"), "").unwrap();
        fs::write(tmp.path().join("a.jpg"), "").unwrap();
        fs::write(tmp.path().join(".DS_Store"), "").unwrap();
        fs::create_dir(tmp.path().join("sub")).unwrap();

        let names: Vec<String> = list_files(tmp.path())
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.jpg", "b.jpg"]);
    }
}
