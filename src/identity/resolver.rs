//! Variable bindings scoped per (branch, leaf, kind).
//!
//! A descriptor declares a variable once with `create(g, "name")` and refers
//! to it with `$name` afterwards. The resolver owns the mapping from those
//! names to identifiers and keeps it stable across runs by seeding itself
//! from every leaf cache found in storage.
//!
//! ## Scoping
//!
//! Bindings are keyed by `(branch, leaf, kind, name)`. Two leaves may use the
//! same variable name for different entities without colliding, and
//! [`extract`](IdentityResolver::extract) only ever returns the bindings of
//! the leaf being persisted.
//!
//! ## Cache round trip
//!
//! ```text
//! gather:  seed_cache(branch, leaf, cache)   bindings + media suffixes marked used
//! build:   load_cache(branch, leaf, cache)   own suffixes released + replay queue
//!          bind(...)                         cached name → cached id
//!          retain_declared(...)              drop names no longer declared
//! persist: extract(branch, leaf)             this leaf's bindings only
//! ```
//!
//! Every leaf is seeded at most once per run, so one media suffix recorded
//! by two caches is reported as a duplicate instead of being handed out
//! twice.

use super::IdentityError;
use super::generator::IdGenerator;
use super::kind::{self, EntityKind};
use crate::cache::LeafCache;
use std::collections::{BTreeMap, BTreeSet};

/// Cache layout: category (`"groups"`, `"metas"`, ...) → name → identifier.
pub type VariableTable = BTreeMap<String, BTreeMap<String, String>>;

type BindingKey = (String, String, EntityKind, String);

#[derive(Debug, Default)]
pub struct IdentityResolver {
    bindings: BTreeMap<BindingKey, String>,
    seeded: BTreeSet<(String, String)>,
}

fn key(branch: &str, leaf: &str, kind: EntityKind, name: &str) -> BindingKey {
    (branch.to_string(), leaf.to_string(), kind, name.to_string())
}

impl IdentityResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the identifier bound to a variable, minting one if needed.
    ///
    /// Binding the same variable twice returns the same identifier.
    pub fn bind(
        &mut self,
        branch: &str,
        leaf: &str,
        kind: EntityKind,
        name: &str,
        generator: &mut IdGenerator,
    ) -> Result<String, IdentityError> {
        let key = key(branch, leaf, kind, name);
        if let Some(existing) = self.bindings.get(&key) {
            return Ok(existing.clone());
        }
        let identifier = generator.generate(kind)?;
        self.bindings.insert(key, identifier.clone());
        Ok(identifier)
    }

    /// Register a binding that was produced by an earlier run.
    ///
    /// Re-adding an identical binding is a no-op. The identifier must carry
    /// the prefix of `kind` and must not itself be a variable reference.
    pub fn add_binding(
        &mut self,
        branch: &str,
        leaf: &str,
        kind: EntityKind,
        name: &str,
        identifier: &str,
        generator: &mut IdGenerator,
    ) -> Result<(), IdentityError> {
        if identifier.starts_with('$') {
            return Err(IdentityError::Malformed(identifier.to_string()));
        }
        match kind::split(identifier) {
            Some((found, _)) if found == kind => {}
            Some(_) => {
                return Err(IdentityError::KindMismatch {
                    field: name.to_string(),
                    expected: kind,
                    found: identifier.to_string(),
                });
            }
            None => {
                let prefix = identifier.split('_').next().unwrap_or_default();
                return Err(IdentityError::UnknownPrefix {
                    prefix: prefix.to_string(),
                    variable: name.to_string(),
                });
            }
        }

        let key = key(branch, leaf, kind, name);
        match self.bindings.get(&key) {
            Some(existing) if existing == identifier => Ok(()),
            Some(existing) => Err(IdentityError::ConflictingBinding {
                variable: name.to_string(),
                existing: existing.clone(),
                incoming: identifier.to_string(),
            }),
            None => {
                generator.mark_used(identifier)?;
                self.bindings.insert(key, identifier.to_string());
                Ok(())
            }
        }
    }

    /// Resolve a bare `$name` reference inside one leaf.
    ///
    /// The name is looked up across every kind; it must be bound under
    /// exactly one of them.
    pub fn lookup(&self, branch: &str, leaf: &str, name: &str) -> Result<String, IdentityError> {
        let mut found = EntityKind::ALL
            .into_iter()
            .filter_map(|kind| self.bindings.get(&key(branch, leaf, kind, name)));

        match (found.next(), found.next()) {
            (Some(identifier), None) => Ok(identifier.clone()),
            (Some(_), Some(_)) => Err(IdentityError::Ambiguous(name.to_string())),
            (None, _) => Err(IdentityError::Undeclared(name.to_string())),
        }
    }

    /// Seed bindings from a leaf cache and mark its media suffixes used.
    ///
    /// Seeding the same leaf again is a no-op.
    pub fn seed_cache(
        &mut self,
        branch: &str,
        leaf: &str,
        cache: &LeafCache,
        generator: &mut IdGenerator,
    ) -> Result<(), IdentityError> {
        if !self.seeded.insert((branch.to_string(), leaf.to_string())) {
            return Ok(());
        }
        for (category, variables) in &cache.variables {
            let kind = EntityKind::from_category(category)
                .ok_or_else(|| IdentityError::UnknownCategory(category.clone()))?;
            for (name, identifier) in variables {
                self.add_binding(branch, leaf, kind, name, identifier, generator)?;
            }
        }
        for raw in &cache.uuids {
            generator.reserve(raw);
            generator.mark_used(&kind::compose(EntityKind::Meta, raw))?;
        }
        Ok(())
    }

    /// Give a leaf's own cached media suffixes back for replay.
    pub fn release_media(cache: &LeafCache, generator: &mut IdGenerator) {
        for raw in &cache.uuids {
            generator.release(EntityKind::Meta, raw);
        }
    }

    /// Prepare to rebuild a leaf: seed its bindings and queue its recorded
    /// suffixes for replay.
    pub fn load_cache(
        &mut self,
        branch: &str,
        leaf: &str,
        cache: &LeafCache,
        generator: &mut IdGenerator,
    ) -> Result<(), IdentityError> {
        self.seed_cache(branch, leaf, cache, generator)?;
        Self::release_media(cache, generator);
        generator.insert_replay_queue(cache.uuids.iter().cloned())
    }

    /// Drop this leaf's bindings whose `(kind, name)` is not in `declared`.
    ///
    /// Identifiers of dropped bindings stay used.
    pub fn retain_declared(
        &mut self,
        branch: &str,
        leaf: &str,
        declared: &BTreeSet<(EntityKind, String)>,
    ) {
        self.bindings.retain(|(b, l, kind, name), _| {
            b != branch || l != leaf || declared.contains(&(*kind, name.clone()))
        });
    }

    /// Bindings created for one leaf, grouped by cache category.
    pub fn extract(&self, branch: &str, leaf: &str) -> VariableTable {
        let mut table = VariableTable::new();
        for ((b, l, kind, name), identifier) in &self.bindings {
            if b == branch && l == leaf {
                table
                    .entry(kind.category().to_string())
                    .or_default()
                    .insert(name.clone(), identifier.clone());
            }
        }
        table
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache_with(category: &str, name: &str, identifier: &str, uuids: &[&str]) -> LeafCache {
        let mut cache = LeafCache::default();
        cache
            .variables
            .entry(category.to_string())
            .or_default()
            .insert(name.to_string(), identifier.to_string());
        cache.uuids = uuids.iter().map(|s| s.to_string()).collect();
        cache
    }

    // =========================================================================
    // bind / lookup
    // =========================================================================

    #[test]
    fn bind_is_idempotent() {
        let mut generator = IdGenerator::new();
        let mut resolver = IdentityResolver::new();
        let first = resolver
            .bind("b", "l", EntityKind::Group, "g1", &mut generator)
            .unwrap();
        let second = resolver
            .bind("b", "l", EntityKind::Group, "g1", &mut generator)
            .unwrap();
        assert_eq!(first, second);
        assert!(first.starts_with("g_"));
        assert_eq!(generator.used_count(EntityKind::Group), 1);
    }

    #[test]
    fn same_name_in_two_leaves_gets_two_identifiers() {
        let mut generator = IdGenerator::new();
        let mut resolver = IdentityResolver::new();
        let a = resolver
            .bind("b", "one", EntityKind::Theme, "main", &mut generator)
            .unwrap();
        let b = resolver
            .bind("b", "two", EntityKind::Theme, "main", &mut generator)
            .unwrap();
        assert_ne!(a, b);
        assert_eq!(resolver.lookup("b", "one", "main").unwrap(), a);
        assert_eq!(resolver.lookup("b", "two", "main").unwrap(), b);
    }

    #[test]
    fn lookup_of_undeclared_name_fails() {
        let resolver = IdentityResolver::new();
        assert_eq!(
            resolver.lookup("b", "l", "ghost").unwrap_err(),
            IdentityError::Undeclared("ghost".into())
        );
    }

    #[test]
    fn lookup_of_name_bound_under_two_kinds_is_ambiguous() {
        let mut generator = IdGenerator::new();
        let mut resolver = IdentityResolver::new();
        resolver
            .bind("b", "l", EntityKind::Theme, "x", &mut generator)
            .unwrap();
        resolver
            .bind("b", "l", EntityKind::Group, "x", &mut generator)
            .unwrap();
        assert_eq!(
            resolver.lookup("b", "l", "x").unwrap_err(),
            IdentityError::Ambiguous("x".into())
        );
    }

    // =========================================================================
    // Cached bindings
    // =========================================================================

    #[test]
    fn add_binding_rejects_wrong_prefix() {
        let mut generator = IdGenerator::new();
        let mut resolver = IdentityResolver::new();
        let err = resolver
            .add_binding("b", "l", EntityKind::Group, "g1", "t_123", &mut generator)
            .unwrap_err();
        assert!(matches!(err, IdentityError::KindMismatch { .. }));
    }

    #[test]
    fn add_binding_rejects_unknown_prefix_and_variables() {
        let mut generator = IdGenerator::new();
        let mut resolver = IdentityResolver::new();
        assert!(matches!(
            resolver.add_binding("b", "l", EntityKind::Group, "g1", "q_1", &mut generator),
            Err(IdentityError::UnknownPrefix { .. })
        ));
        assert!(matches!(
            resolver.add_binding("b", "l", EntityKind::Group, "g1", "$g1", &mut generator),
            Err(IdentityError::Malformed(_))
        ));
    }

    #[test]
    fn add_binding_twice_with_same_value_is_noop() {
        let mut generator = IdGenerator::new();
        let mut resolver = IdentityResolver::new();
        resolver
            .add_binding("b", "l", EntityKind::Group, "g1", "g_1", &mut generator)
            .unwrap();
        resolver
            .add_binding("b", "l", EntityKind::Group, "g1", "g_1", &mut generator)
            .unwrap();
        assert_eq!(resolver.len(), 1);
    }

    #[test]
    fn add_binding_with_other_value_conflicts() {
        let mut generator = IdGenerator::new();
        let mut resolver = IdentityResolver::new();
        resolver
            .add_binding("b", "l", EntityKind::Group, "g1", "g_1", &mut generator)
            .unwrap();
        let err = resolver
            .add_binding("b", "l", EntityKind::Group, "g1", "g_2", &mut generator)
            .unwrap_err();
        assert!(err.is_consistency_hazard());
    }

    #[test]
    fn cached_binding_survives_a_fresh_run() {
        let mut generator = IdGenerator::new();
        let mut resolver = IdentityResolver::new();
        let original = resolver
            .bind("b", "l", EntityKind::Group, "g1", &mut generator)
            .unwrap();

        let mut cache = LeafCache::default();
        cache.variables = resolver.extract("b", "l");

        let mut fresh_generator = IdGenerator::new();
        let mut fresh = IdentityResolver::new();
        fresh
            .load_cache("b", "l", &cache, &mut fresh_generator)
            .unwrap();
        let again = fresh
            .bind("b", "l", EntityKind::Group, "g1", &mut fresh_generator)
            .unwrap();
        assert_eq!(again, original);
    }

    #[test]
    fn seed_then_load_same_cache_is_accepted() {
        let mut generator = IdGenerator::new();
        let mut resolver = IdentityResolver::new();
        let cache = cache_with("groups", "g1", "g_1", &["m1", "m2"]);

        resolver.seed_cache("b", "l", &cache, &mut generator).unwrap();
        assert!(!generator.has_pending_replay());

        resolver.load_cache("b", "l", &cache, &mut generator).unwrap();
        assert_eq!(generator.generate(EntityKind::Meta).unwrap(), "m_m1");
        assert_eq!(generator.generate(EntityKind::Meta).unwrap(), "m_m2");
    }

    #[test]
    fn media_suffix_cached_by_two_leaves_is_a_duplicate() {
        let mut generator = IdGenerator::new();
        let mut resolver = IdentityResolver::new();
        let one = cache_with("groups", "g1", "g_1", &["shared"]);
        let two = cache_with("groups", "g1", "g_2", &["shared"]);
        resolver.seed_cache("b", "one", &one, &mut generator).unwrap();

        let err = resolver.seed_cache("b", "two", &two, &mut generator).unwrap_err();
        assert_eq!(err, IdentityError::DuplicateIdentifier("m_shared".into()));
        assert!(err.is_consistency_hazard());
    }

    #[test]
    fn load_cache_releases_only_its_own_suffixes() {
        let mut generator = IdGenerator::new();
        let mut resolver = IdentityResolver::new();
        let one = cache_with("groups", "g1", "g_1", &["theirs"]);
        let two = cache_with("groups", "g1", "g_2", &["mine"]);
        resolver.seed_cache("b", "one", &one, &mut generator).unwrap();
        resolver.seed_cache("b", "two", &two, &mut generator).unwrap();

        resolver.load_cache("b", "two", &two, &mut generator).unwrap();
        assert_eq!(generator.generate(EntityKind::Meta).unwrap(), "m_mine");

        generator
            .insert_replay_queue(vec!["theirs".to_string()])
            .unwrap();
        assert_eq!(
            generator.generate(EntityKind::Meta).unwrap_err(),
            IdentityError::ReplayCollision {
                kind: EntityKind::Meta,
                raw: "theirs".into()
            }
        );
    }

    #[test]
    fn retain_declared_drops_stale_kinds_of_one_leaf() {
        let mut generator = IdGenerator::new();
        let mut resolver = IdentityResolver::new();
        resolver
            .add_binding("b", "l", EntityKind::Theme, "x", "t_old", &mut generator)
            .unwrap();
        resolver
            .add_binding("b", "other", EntityKind::Theme, "x", "t_kept", &mut generator)
            .unwrap();
        let synonym = resolver
            .bind("b", "l", EntityKind::Synonym, "x", &mut generator)
            .unwrap();

        let declared = BTreeSet::from([(EntityKind::Synonym, "x".to_string())]);
        resolver.retain_declared("b", "l", &declared);

        assert_eq!(resolver.lookup("b", "l", "x").unwrap(), synonym);
        assert_eq!(resolver.lookup("b", "other", "x").unwrap(), "t_kept");
        assert!(generator.is_used(EntityKind::Theme, "old"));
    }

    #[test]
    fn unknown_cache_category_is_rejected() {
        let mut generator = IdGenerator::new();
        let mut resolver = IdentityResolver::new();
        let cache = cache_with("realms", "r", "t_1", &[]);
        assert_eq!(
            resolver.seed_cache("b", "l", &cache, &mut generator).unwrap_err(),
            IdentityError::UnknownCategory("realms".into())
        );
    }

    // =========================================================================
    // extract
    // =========================================================================

    #[test]
    fn extract_returns_only_the_requested_leaf() {
        let mut generator = IdGenerator::new();
        let mut resolver = IdentityResolver::new();
        let mine = resolver
            .bind("b", "mine", EntityKind::Group, "g1", &mut generator)
            .unwrap();
        resolver
            .bind("b", "other", EntityKind::Group, "g1", &mut generator)
            .unwrap();
        resolver
            .bind("c", "mine", EntityKind::Theme, "t1", &mut generator)
            .unwrap();

        let table = resolver.extract("b", "mine");
        assert_eq!(table.len(), 1);
        assert_eq!(table["groups"]["g1"], mine);
    }
}
