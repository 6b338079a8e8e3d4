//! Identifier minting and variable binding.
//!
//! Three cooperating state objects, created fresh for every run and passed
//! explicitly into the stages that need them:
//!
//! - [`IdGenerator`] mints `<prefix>_<raw>` identifiers, tracks used raw
//!   suffixes per kind and replays recorded suffixes from a leaf cache.
//! - [`IdentityResolver`] binds author-chosen variable names, scoped per
//!   (branch, leaf, kind), to identifiers.
//! - [`RouteRegistry`] remembers the route segment of every theme and group.
//!
//! [`IdentityState`] bundles the three for the unite stage.

mod generator;
pub mod kind;
mod resolver;
mod router;

pub use generator::IdGenerator;
pub use kind::EntityKind;
pub use resolver::{IdentityResolver, VariableTable};
pub use router::RouteRegistry;

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum IdentityError {
    #[error("Unknown identifier prefix {prefix:?} for variable {variable:?}")]
    UnknownPrefix { prefix: String, variable: String },
    #[error("Unknown cache category {0:?}")]
    UnknownCategory(String),
    #[error("Malformed identifier {0:?}")]
    Malformed(String),
    #[error("Field {field} must hold a {expected} identifier, got {found:?}")]
    KindMismatch {
        field: String,
        expected: EntityKind,
        found: String,
    },
    #[error("Variable ${0} is referenced but never declared")]
    Undeclared(String),
    #[error("Variable ${0} is declared for more than one kind in the same leaf")]
    Ambiguous(String),
    #[error("Variable {variable:?} is already bound to {existing}, cache says {incoming}")]
    ConflictingBinding {
        variable: String,
        existing: String,
        incoming: String,
    },
    #[error("Identifier {0} is bound to more than one variable")]
    DuplicateIdentifier(String),
    #[error("Raw identifier {0} appears twice in the replay queue")]
    DuplicateInQueue(String),
    #[error("Replayed identifier {raw} is already used for {kind}; the cache is corrupted")]
    ReplayCollision { kind: EntityKind, raw: String },
    #[error("Cannot combine generators while a replay queue is pending")]
    PendingReplay,
    #[error("No route registered for {0}")]
    MissingRoute(String),
}

impl IdentityError {
    /// Errors that mean persisted identity state can no longer be trusted.
    ///
    /// These abort the whole run instead of skipping a single leaf.
    pub fn is_consistency_hazard(&self) -> bool {
        matches!(
            self,
            IdentityError::ReplayCollision { .. }
                | IdentityError::DuplicateInQueue(_)
                | IdentityError::DuplicateIdentifier(_)
                | IdentityError::ConflictingBinding { .. }
                | IdentityError::PendingReplay
        )
    }
}

/// Identity state for one unite run.
#[derive(Debug, Default)]
pub struct IdentityState {
    pub generator: IdGenerator,
    pub resolver: IdentityResolver,
    pub router: RouteRegistry,
}

impl IdentityState {
    pub fn new() -> Self {
        Self::default()
    }
}
