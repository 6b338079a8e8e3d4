//! Source descriptor format.
//!
//! Each leaf carries a `source.json` written by hand. After variable
//! substitution it deserializes into [`Source`]; structural rules that serde
//! can't express are checked afterwards by [`Source::validate`], which is a
//! plain function over the parsed records rather than something hooked into
//! deserialization.
//!
//! ```json
//! {
//!   "themes": [{ "uuid": create(t, "main"), "route": "animals", "label": "Animals",
//!                "tags": ["fauna"], "synonyms": [] }],
//!   "groups": [{ "uuid": create(g, "cats"), "theme_uuid": "$main",
//!                "route": "cats", "label": "Cats", "author": "me" }],
//!   "metas":  [{ "theme_uuid": "$main", "group_uuid": "$misc",
//!                "filenames": ["a.jpg"], "tags": ["odd"] }],
//!   "users":  [{ "uuid": create(u, "admin"), "name": "Admin",
//!                "permissions": ["all"] }]
//! }
//! ```

use crate::identity::{EntityKind, IdentityError, kind};
use crate::types::Provenance;
use serde::Deserialize;
use std::collections::HashSet;
use thiserror::Error;

/// Name of the descriptor file inside a leaf folder.
pub const SOURCE_FILENAME: &str = "source.json";

/// Route of a group that has no directory listing.
pub const NO_GROUP: &str = "no_group";

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Descriptor is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Field {field} of {owner} must have unique items, got {values:?}")]
    NotUnique {
        field: &'static str,
        owner: String,
        values: Vec<String>,
    },
    #[error("Synonym {synonym} is nested in theme {theme} but points at {points_at}")]
    ThemeMismatch {
        synonym: String,
        theme: String,
        points_at: String,
    },
    #[error(transparent)]
    Identity(#[from] IdentityError),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Source {
    pub themes: Vec<SourceTheme>,
    pub groups: Vec<SourceGroup>,
    pub metas: Vec<SourceMeta>,
    pub synonyms: Vec<SourceSynonym>,
    pub users: Vec<SourceUser>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceTheme {
    pub uuid: String,
    pub route: String,
    pub label: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub synonyms: Vec<SourceSynonym>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceSynonym {
    pub uuid: String,
    pub theme_uuid: String,
    pub label: String,
    #[serde(default)]
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceGroup {
    pub uuid: String,
    pub theme_uuid: String,
    pub route: String,
    pub label: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(flatten)]
    pub provenance: Provenance,
}

/// Explicitly named files of an existing group.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceMeta {
    pub theme_uuid: String,
    pub group_uuid: String,
    pub filenames: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(flatten)]
    pub provenance: Provenance,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceUser {
    pub uuid: String,
    pub name: String,
    #[serde(default)]
    pub permissions: Vec<String>,
}

/// Fail if `values` holds the same string twice.
pub fn assert_unique(field: &'static str, owner: &str, values: &[String]) -> Result<(), SourceError> {
    let mut seen = HashSet::new();
    if values.iter().all(|v| seen.insert(v.as_str())) {
        Ok(())
    } else {
        Err(SourceError::NotUnique {
            field,
            owner: owner.to_string(),
            values: values.to_vec(),
        })
    }
}

/// Fail unless `value` is an identifier of `expected` kind.
pub fn assert_has_prefix(
    field: &str,
    value: &str,
    expected: EntityKind,
) -> Result<(), SourceError> {
    match kind::split(value) {
        Some((found, _)) if found == expected => Ok(()),
        _ => Err(IdentityError::KindMismatch {
            field: field.to_string(),
            expected,
            found: value.to_string(),
        }
        .into()),
    }
}

fn assert_provenance(owner: &str, provenance: &Provenance) -> Result<(), SourceError> {
    if provenance.registered_by.is_empty() {
        return Ok(());
    }
    assert_has_prefix(
        &format!("{owner}.registered_by"),
        &provenance.registered_by,
        EntityKind::User,
    )
}

impl Source {
    pub fn parse(text: &str) -> Result<Self, SourceError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Check identifier kinds and uniqueness rules of every record.
    pub fn validate(&self) -> Result<(), SourceError> {
        for theme in &self.themes {
            assert_has_prefix("theme.uuid", &theme.uuid, EntityKind::Theme)?;
            assert_unique("tags", &theme.uuid, &theme.tags)?;
            assert_unique("permissions", &theme.uuid, &theme.permissions)?;
            for synonym in &theme.synonyms {
                validate_synonym(synonym)?;
                if synonym.theme_uuid != theme.uuid {
                    return Err(SourceError::ThemeMismatch {
                        synonym: synonym.uuid.clone(),
                        theme: theme.uuid.clone(),
                        points_at: synonym.theme_uuid.clone(),
                    });
                }
            }
        }

        for synonym in &self.synonyms {
            validate_synonym(synonym)?;
        }

        for group in &self.groups {
            assert_has_prefix("group.uuid", &group.uuid, EntityKind::Group)?;
            assert_has_prefix("group.theme_uuid", &group.theme_uuid, EntityKind::Theme)?;
            assert_unique("tags", &group.uuid, &group.tags)?;
            assert_unique("permissions", &group.uuid, &group.permissions)?;
            assert_provenance("group", &group.provenance)?;
        }

        for meta in &self.metas {
            assert_has_prefix("meta.theme_uuid", &meta.theme_uuid, EntityKind::Theme)?;
            assert_has_prefix("meta.group_uuid", &meta.group_uuid, EntityKind::Group)?;
            assert_unique("filenames", &meta.group_uuid, &meta.filenames)?;
            assert_unique("tags", &meta.group_uuid, &meta.tags)?;
            assert_unique("permissions", &meta.group_uuid, &meta.permissions)?;
            assert_provenance("meta", &meta.provenance)?;
        }

        for user in &self.users {
            assert_has_prefix("user.uuid", &user.uuid, EntityKind::User)?;
            assert_unique("permissions", &user.uuid, &user.permissions)?;
        }

        Ok(())
    }
}

fn validate_synonym(synonym: &SourceSynonym) -> Result<(), SourceError> {
    assert_has_prefix("synonym.uuid", &synonym.uuid, EntityKind::Synonym)?;
    assert_has_prefix("synonym.theme_uuid", &synonym.theme_uuid, EntityKind::Theme)?;
    assert_unique("values", &synonym.uuid, &synonym.values)
}
