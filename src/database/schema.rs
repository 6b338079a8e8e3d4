//! Table definitions shared by leaf, branch, root and static databases.
//!
//! Every table is described once as a [`Table`]; `CREATE TABLE` statements,
//! migration `INSERT` column lists and synchronization `SELECT`s are all
//! derived from these descriptions.
//!
//! Entity tables are keyed by identifier and association tables by
//! `(owner, value)`, so copying a row into a database that already holds it
//! overwrites it with itself.

/// SQLite column affinity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Integer,
    Real,
}

impl ColumnType {
    fn sql(self) -> &'static str {
        match self {
            ColumnType::Text => "TEXT",
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub kind: ColumnType,
}

const fn text(name: &'static str) -> Column {
    Column {
        name,
        kind: ColumnType::Text,
    }
}

const fn integer(name: &'static str) -> Column {
    Column {
        name,
        kind: ColumnType::Integer,
    }
}

const fn real(name: &'static str) -> Column {
    Column {
        name,
        kind: ColumnType::Real,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Table {
    pub name: &'static str,
    pub columns: &'static [Column],
    pub primary_key: &'static [&'static str],
}

impl Table {
    pub fn column_names(&self) -> Vec<&'static str> {
        self.columns.iter().map(|c| c.name).collect()
    }

    pub fn create_sql(&self) -> String {
        let mut parts: Vec<String> = self
            .columns
            .iter()
            .map(|c| format!("{} {} NOT NULL", c.name, c.kind.sql()))
            .collect();
        parts.push(format!("PRIMARY KEY ({})", self.primary_key.join(", ")));
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
            self.name,
            parts.join(",\n    ")
        )
    }

    /// `INSERT OR REPLACE` with one `?` placeholder per column.
    pub fn upsert_sql(&self) -> String {
        let placeholders = vec!["?"; self.columns.len()].join(", ");
        format!(
            "INSERT OR REPLACE INTO {} ({}) VALUES ({})",
            self.name,
            self.column_names().join(", "),
            placeholders
        )
    }

    pub fn select_sql(&self) -> String {
        format!(
            "SELECT {} FROM {} ORDER BY {}",
            self.column_names().join(", "),
            self.name,
            self.primary_key.join(", ")
        )
    }
}

const STAMP: [Column; 2] = [text("revision"), text("last_update")];

pub const THEMES: Table = Table {
    name: "themes",
    columns: &[STAMP[0], STAMP[1], text("uuid"), text("route"), text("label")],
    primary_key: &["uuid"],
};

pub const SYNONYMS: Table = Table {
    name: "synonyms",
    columns: &[STAMP[0], STAMP[1], text("uuid"), text("theme_uuid"), text("label")],
    primary_key: &["uuid"],
};

pub const GROUPS: Table = Table {
    name: "groups",
    columns: &[
        STAMP[0],
        STAMP[1],
        text("uuid"),
        text("theme_uuid"),
        text("route"),
        text("label"),
        text("registered_on"),
        text("registered_by"),
        text("author"),
        text("author_url"),
        text("origin_url"),
        text("comment"),
        text("hierarchy"),
    ],
    primary_key: &["uuid"],
};

pub const METAS: Table = Table {
    name: "metas",
    columns: &[
        STAMP[0],
        STAMP[1],
        text("uuid"),
        text("theme_uuid"),
        text("group_uuid"),
        text("registered_on"),
        text("registered_by"),
        text("author"),
        text("author_url"),
        text("origin_url"),
        text("comment"),
        text("hierarchy"),
        text("path_to_content"),
        text("path_to_preview"),
        text("path_to_thumbnail"),
        text("original_filename"),
        text("original_extension"),
        integer("width"),
        integer("height"),
        real("resolution"),
        integer("size"),
        integer("duration"),
        text("type"),
        integer("ordering"),
        text("signature"),
        text("signature_type"),
        text("previous"),
        text("next"),
    ],
    primary_key: &["uuid"],
};

pub const USERS: Table = Table {
    name: "users",
    columns: &[STAMP[0], STAMP[1], text("uuid"), text("name")],
    primary_key: &["uuid"],
};

macro_rules! association {
    ($ident:ident, $name:literal, $owner:literal) => {
        pub const $ident: Table = Table {
            name: $name,
            columns: &[STAMP[0], STAMP[1], text($owner), text("value")],
            primary_key: &[$owner, "value"],
        };
    };
}

association!(SYNONYMS_VALUES, "synonyms_values", "synonym_uuid");
association!(TAGS_THEMES, "tags_themes", "theme_uuid");
association!(TAGS_GROUPS, "tags_groups", "group_uuid");
association!(TAGS_METAS, "tags_metas", "meta_uuid");
association!(PERMISSIONS_THEMES, "permissions_themes", "theme_uuid");
association!(PERMISSIONS_GROUPS, "permissions_groups", "group_uuid");
association!(PERMISSIONS_METAS, "permissions_metas", "meta_uuid");
association!(PERMISSIONS_USERS, "permissions_users", "user_uuid");

/// Tag → media item, including tags inherited from group and theme.
pub const INDEX_TAGS: Table = Table {
    name: "index_tags",
    columns: &[text("tag"), text("uuid")],
    primary_key: &["tag", "uuid"],
};

/// Permission → entity, including permissions inherited from parents.
pub const INDEX_PERMISSIONS: Table = Table {
    name: "index_permissions",
    columns: &[text("permission"), text("uuid")],
    primary_key: &["permission", "uuid"],
};

/// Media item → thumbnail path, numbered in default display order.
pub const INDEX_THUMBNAILS: Table = Table {
    name: "index_thumbnails",
    columns: &[text("meta_uuid"), integer("number"), text("path_to_thumbnail")],
    primary_key: &["meta_uuid"],
};

pub const HELPERS: Table = Table {
    name: "helpers",
    columns: &[text("key"), text("value")],
    primary_key: &["key"],
};

/// Catalog tables, parents before children. Migrations insert and
/// synchronization copies in this order.
pub const SYNC_ORDER: [Table; 13] = [
    THEMES,
    SYNONYMS,
    SYNONYMS_VALUES,
    GROUPS,
    METAS,
    USERS,
    TAGS_THEMES,
    TAGS_GROUPS,
    TAGS_METAS,
    PERMISSIONS_THEMES,
    PERMISSIONS_GROUPS,
    PERMISSIONS_METAS,
    PERMISSIONS_USERS,
];

/// Tables only the static database fills.
pub const DERIVED: [Table; 4] = [INDEX_TAGS, INDEX_PERMISSIONS, INDEX_THUMBNAILS, HELPERS];

/// Full schema script.
pub fn schema_sql() -> String {
    SYNC_ORDER
        .iter()
        .chain(DERIVED.iter())
        .map(|t| format!("{};\n", t.create_sql()))
        .collect()
}
