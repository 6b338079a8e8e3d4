//! Entity kinds and the `<prefix>_<raw>` identifier format.
//!
//! Every identifier in the catalog starts with a one-letter prefix naming the
//! kind of entity it belongs to:
//!
//! | Kind | Prefix | Cache category |
//! |------|--------|----------------|
//! | Theme | `t` | `themes` |
//! | Group | `g` | `groups` |
//! | Media item | `m` | `metas` |
//! | Synonym | `s` | `synonyms` |
//! | User | `u` | `users` |
//!
//! Dispatch is by table lookup on [`EntityKind::ALL`], never by slicing
//! strings at call sites.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of entity kinds that receive identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Theme,
    Group,
    Meta,
    Synonym,
    User,
}

impl EntityKind {
    pub const ALL: [EntityKind; 5] = [
        EntityKind::Theme,
        EntityKind::Group,
        EntityKind::Meta,
        EntityKind::Synonym,
        EntityKind::User,
    ];

    /// Prefix written in front of the raw identifier.
    pub fn prefix(self) -> &'static str {
        match self {
            EntityKind::Theme => "t",
            EntityKind::Group => "g",
            EntityKind::Meta => "m",
            EntityKind::Synonym => "s",
            EntityKind::User => "u",
        }
    }

    /// Key used for this kind in the `variables` section of a leaf cache.
    pub fn category(self) -> &'static str {
        match self {
            EntityKind::Theme => "themes",
            EntityKind::Group => "groups",
            EntityKind::Meta => "metas",
            EntityKind::Synonym => "synonyms",
            EntityKind::User => "users",
        }
    }

    /// Case-insensitive lookup by prefix (`"G"` and `"g"` both give `Group`).
    pub fn from_prefix(prefix: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.prefix().eq_ignore_ascii_case(prefix))
    }

    pub fn from_category(category: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.category() == category)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.category())
    }
}

/// Build a full identifier from a kind and a raw suffix.
pub fn compose(kind: EntityKind, raw: &str) -> String {
    format!("{}_{}", kind.prefix(), raw)
}

/// Split a full identifier into its kind and raw suffix.
///
/// Returns `None` when there is no `_` separator or the prefix is unknown.
pub fn split(identifier: &str) -> Option<(EntityKind, &str)> {
    let (prefix, raw) = identifier.split_once('_')?;
    if raw.is_empty() {
        return None;
    }
    let kind = EntityKind::from_prefix(prefix)?;
    Some((kind, raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixes_are_distinct() {
        let mut prefixes: Vec<&str> = EntityKind::ALL.iter().map(|k| k.prefix()).collect();
        prefixes.sort();
        prefixes.dedup();
        assert_eq!(prefixes.len(), EntityKind::ALL.len());
    }

    #[test]
    fn prefix_lookup_ignores_case() {
        assert_eq!(EntityKind::from_prefix("g"), Some(EntityKind::Group));
        assert_eq!(EntityKind::from_prefix("G"), Some(EntityKind::Group));
        assert_eq!(EntityKind::from_prefix("x"), None);
        assert_eq!(EntityKind::from_prefix(""), None);
    }

    #[test]
    fn category_roundtrip() {
        for kind in EntityKind::ALL {
            assert_eq!(EntityKind::from_category(kind.category()), Some(kind));
        }
        assert_eq!(EntityKind::from_category("realms"), None);
    }

    #[test]
    fn compose_and_split() {
        let id = compose(EntityKind::Meta, "abc-123");
        assert_eq!(id, "m_abc-123");
        assert_eq!(split(&id), Some((EntityKind::Meta, "abc-123")));
    }

    #[test]
    fn split_rejects_malformed() {
        assert_eq!(split("nounderscore"), None);
        assert_eq!(split("q_123"), None);
        assert_eq!(split("t_"), None);
    }
}
