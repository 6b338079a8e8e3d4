//! Shared types used across all pipeline stages.
//!
//! [`Unit`] is written to `unit.json` by unite and read back by
//! make-migrations, so its shape is the contract between those two stages.
//! Every row carries the [`BuildStamp`] of the run that produced it.

use chrono::Local;
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::{Deserialize, Serialize};

/// Length of the random revision string.
pub const REVISION_LEN: usize = 40;

/// Revision and timestamp stamped onto every row of a build.
///
/// Created once per run and passed down explicitly; a leaf whose descriptor
/// hasn't changed reuses the stamp recorded in its cache instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildStamp {
    pub revision: String,
    /// `YYYY-MM-DD HH:MM:SS`, local time.
    pub last_update: String,
}

impl BuildStamp {
    pub fn fresh() -> Self {
        let revision = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(REVISION_LEN)
            .map(|b| (b as char).to_ascii_lowercase())
            .collect();
        let last_update = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        Self {
            revision,
            last_update,
        }
    }

    /// Date part of `last_update`.
    pub fn today(&self) -> &str {
        self.last_update.get(..10).unwrap_or(&self.last_update)
    }
}

/// Free-form provenance shared by groups and media items.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Provenance {
    pub registered_on: String,
    /// A user identifier (`u_...`) or empty.
    pub registered_by: String,
    pub author: String,
    pub author_url: String,
    pub origin_url: String,
    pub comment: String,
    pub hierarchy: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Theme {
    pub revision: String,
    pub last_update: String,
    pub uuid: String,
    pub route: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub revision: String,
    pub last_update: String,
    pub uuid: String,
    pub theme_uuid: String,
    pub route: String,
    pub label: String,
    #[serde(flatten)]
    pub provenance: Provenance,
}

/// One media file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meta {
    pub revision: String,
    pub last_update: String,
    pub uuid: String,
    pub theme_uuid: String,
    pub group_uuid: String,
    #[serde(flatten)]
    pub provenance: Provenance,
    pub path_to_content: String,
    pub path_to_preview: String,
    pub path_to_thumbnail: String,
    pub original_filename: String,
    pub original_extension: String,
    pub width: u32,
    pub height: u32,
    /// Megapixels, two decimals.
    pub resolution: f64,
    pub size: u64,
    pub duration: u64,
    #[serde(rename = "type")]
    pub media_type: String,
    /// 1-based position within the listing; 0 for explicitly named files.
    pub ordering: u32,
    pub signature: String,
    pub signature_type: String,
    pub previous: String,
    pub next: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Synonym {
    pub revision: String,
    pub last_update: String,
    pub uuid: String,
    pub theme_uuid: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub revision: String,
    pub last_update: String,
    pub uuid: String,
    pub name: String,
}

/// A string value attached to an owning entity: a tag, a permission or a
/// synonym value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Association {
    pub revision: String,
    pub last_update: String,
    pub owner: String,
    pub value: String,
}

impl Association {
    pub fn new(stamp: &BuildStamp, owner: &str, value: &str) -> Self {
        Self {
            revision: stamp.revision.clone(),
            last_update: stamp.last_update.clone(),
            owner: owner.to_string(),
            value: value.to_string(),
        }
    }
}

/// Fully resolved output of one leaf. Append-only while it is being built.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Unit {
    pub themes: Vec<Theme>,
    pub synonyms: Vec<Synonym>,
    pub synonyms_values: Vec<Association>,
    pub groups: Vec<Group>,
    pub metas: Vec<Meta>,
    pub users: Vec<User>,

    pub tags_themes: Vec<Association>,
    pub tags_groups: Vec<Association>,
    pub tags_metas: Vec<Association>,

    pub permissions_themes: Vec<Association>,
    pub permissions_groups: Vec<Association>,
    pub permissions_metas: Vec<Association>,
    pub permissions_users: Vec<Association>,
}

impl Unit {
    /// Append one association row per value.
    pub fn attach(
        target: &mut Vec<Association>,
        stamp: &BuildStamp,
        owner: &str,
        values: &[String],
    ) {
        target.extend(values.iter().map(|v| Association::new(stamp, owner, v)));
    }
}

// ============================================================================
// Stage reports
// ============================================================================

/// What happened to one leaf (or branch) during a stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Created,
    AlreadyExists,
    /// Nothing to act on, e.g. the input file of the stage is missing.
    Skipped(String),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafReport {
    pub branch: String,
    pub leaf: String,
    pub what: &'static str,
    pub status: Status,
}

impl LeafReport {
    pub fn new(branch: &str, leaf: &str, what: &'static str, status: Status) -> Self {
        Self {
            branch: branch.to_string(),
            leaf: leaf.to_string(),
            what,
            status,
        }
    }
}

/// Per-leaf outcomes of one stage, in walk order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageReport {
    pub leaves: Vec<LeafReport>,
}

impl StageReport {
    pub fn push(&mut self, report: LeafReport) {
        self.leaves.push(report);
    }

    pub fn created(&self) -> usize {
        self.count(|s| matches!(s, Status::Created))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, Status::Failed(_)))
    }

    fn count(&self, pred: impl Fn(&Status) -> bool) -> usize {
        self.leaves.iter().filter(|r| pred(&r.status)).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_stamp_has_expected_shape() {
        let stamp = BuildStamp::fresh();
        assert_eq!(stamp.revision.len(), REVISION_LEN);
        assert!(
            stamp
                .revision
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        );
        assert_eq!(stamp.last_update.len(), 19);
        assert_eq!(stamp.today().len(), 10);
    }

    #[test]
    fn meta_type_field_is_renamed() {
        let stamp = crate::test_helpers::fixed_stamp();
        let meta = crate::test_helpers::meta_row(&stamp, "m_1", "t_1", "g_1", 1);
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["type"], "image");
        assert_eq!(json["author"], "");
        assert!(json.get("provenance").is_none());
    }

    #[test]
    fn unit_roundtrips_through_json() {
        let stamp = crate::test_helpers::fixed_stamp();
        let mut unit = Unit::default();
        unit.themes
            .push(crate::test_helpers::theme_row(&stamp, "t_1", "animals"));
        Unit::attach(
            &mut unit.tags_themes,
            &stamp,
            "t_1",
            &["cats".to_string(), "dogs".to_string()],
        );

        let text = serde_json::to_string(&unit).unwrap();
        let back: Unit = serde_json::from_str(&text).unwrap();
        assert_eq!(back, unit);
        assert_eq!(back.tags_themes[1].value, "dogs");
    }

    #[test]
    fn stage_report_counts() {
        let mut report = StageReport::default();
        report.push(LeafReport::new("b", "1", "unit", Status::Created));
        report.push(LeafReport::new("b", "2", "unit", Status::AlreadyExists));
        report.push(LeafReport::new("b", "3", "unit", Status::Failed("x".into())));
        assert_eq!(report.created(), 1);
        assert_eq!(report.failed(), 1);
    }
}
