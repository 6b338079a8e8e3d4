//! # Archivist
//!
//! Builds a searchable media catalog from hand-written leaf descriptors and
//! freezes it into one read-only SQLite database. Authors never write
//! identifiers by hand: they declare variables (`create(g, "cats")`) and refer
//! to them (`$cats`), and the pipeline turns each variable into a stable,
//! globally unique identifier such as `g_3f2a...`.
//!
//! # Architecture: Six-Stage Pipeline
//!
//! Every stage reads the previous stage's per-leaf file from storage and can be
//! run for all leaves or a single `[branch] [leaf]`:
//!
//! ```text
//! 1. Unite           source.json      →  unit.json + cache.json   (variables → identifiers)
//! 2. Make-migrations unit.json        →  migration.sql + relocation.json
//! 3. Migrate         migration.sql    →  migration.db             (one transaction per leaf)
//! 4. Relocate        relocation.json  →  content/ preview/ thumbnails/
//! 5. Sync            migration.db     →  branch.db → root.db      (upsert by primary key)
//! 6. Freeze          root.db          →  database.db              (plus derived indexes)
//! ```
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`identity`] | Identifier generator, variable resolver and route registry |
//! | [`preprocess`] | Textual substitution of `create(...)` markers, `$name` references and global variables |
//! | [`source`] | Typed source descriptor and its structural validation |
//! | [`cache`] | Per-leaf `cache.json`: variable bindings, consumed suffixes, build stamp |
//! | [`unite`] | Stage 1: builds one [`types::Unit`] per leaf |
//! | [`migrations`] | Stage 2: unit → insertion statements and relocation plan |
//! | [`migrate`] | Stage 3: applies a migration to a fresh leaf database |
//! | [`relocate`] | Stage 4: copies and scales media files |
//! | [`sync`] | Stage 5: leaf → branch → root merge |
//! | [`freeze`] | Stage 6: static database with tag, permission and thumbnail indexes |
//! | [`database`] | Shared schema and the generic table-by-table upsert |
//! | [`imaging`] | Media analysis and scaling behind the [`imaging::ImageBackend`] trait |
//! | [`walk`] | Branch/leaf selection over the sources and storage trees |
//! | [`config`] | `archivist.toml` loading, merging and validation |
//! | [`types`] | Entity rows, [`types::Unit`], build stamp, stage reports |
//! | [`output`] | CLI output formatting for every stage |
//!
//! # Design Decisions
//!
//! ## Identifiers Never Change
//!
//! Once a variable is bound, its identifier survives reruns, forced rebuilds and
//! leaf reordering. Bindings persist in each leaf's cache; media items (which
//! have no variable) persist through the cache's ordered suffix list, which is
//! replayed before any random draw. A replayed suffix that is already in use
//! means the cache is corrupt and the run stops.
//!
//! ## Merge Is an Upsert
//!
//! All four databases share one schema keyed by identifier (association tables
//! by owner and value). Synchronizing is `INSERT OR REPLACE` table by table, so
//! re-running it over unchanged data is a no-op and branches merge in parallel.
//!
//! ## Explicit State, No Globals
//!
//! The identity state is built fresh per run and passed by `&mut` through the
//! unite stage. The build stamp is a value created once in `main`.

pub mod cache;
pub mod config;
pub mod database;
pub mod freeze;
pub mod identity;
pub mod imaging;
pub mod migrate;
pub mod migrations;
pub mod output;
pub mod preprocess;
pub mod relocate;
pub mod source;
pub mod sync;
pub mod types;
pub mod unite;
pub mod walk;

#[cfg(test)]
pub(crate) mod test_helpers;
