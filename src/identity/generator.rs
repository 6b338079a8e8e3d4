//! Identifier generator with deterministic replay.
//!
//! Raw suffixes are v4 UUIDs. A generator keeps one used-set per
//! [`EntityKind`] plus a kind-agnostic reserved set holding every suffix that
//! some leaf cache has recorded. Random draws avoid both sets; replayed
//! suffixes only need to be absent from the used-set of their kind.
//!
//! Cached media suffixes start out used. A leaf that is about to be rebuilt
//! [`release`](IdGenerator::release)s its own suffixes before queueing them,
//! so replaying a suffix owned by any other leaf is a collision.
//!
//! ```text
//! generate(kind)
//!   queue non-empty → pop front, fail if already used for kind
//!   queue empty     → draw UUIDs until one is neither used nor reserved
//!   record suffix in used[kind] and in the consumed log
//! ```

use super::IdentityError;
use super::kind::{self, EntityKind};
use std::collections::{HashMap, HashSet, VecDeque};
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct IdGenerator {
    used: HashMap<EntityKind, HashSet<String>>,
    reserved: HashSet<String>,
    queue: VecDeque<String>,
    consumed: Vec<String>,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint a new identifier of the given kind.
    pub fn generate(&mut self, kind: EntityKind) -> Result<String, IdentityError> {
        let raw = match self.queue.pop_front() {
            Some(raw) => {
                if self.is_used(kind, &raw) {
                    return Err(IdentityError::ReplayCollision { kind, raw });
                }
                raw
            }
            None => self.draw_random(kind),
        };

        self.used.entry(kind).or_default().insert(raw.clone());
        self.consumed.push(raw.clone());
        Ok(kind::compose(kind, &raw))
    }

    fn draw_random(&self, kind: EntityKind) -> String {
        loop {
            let candidate = Uuid::new_v4().to_string();
            if !self.is_used(kind, &candidate) && !self.reserved.contains(&candidate) {
                return candidate;
            }
        }
    }

    /// Queue raw suffixes to be handed out, in order, before random draws.
    ///
    /// Appends to any pending queue. A suffix appearing twice across the
    /// pending and incoming entries means a corrupted cache.
    pub fn insert_replay_queue<I>(&mut self, raw_ids: I) -> Result<(), IdentityError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut seen: HashSet<String> = self.queue.iter().cloned().collect();
        let mut incoming = Vec::new();
        for raw in raw_ids {
            if !seen.insert(raw.clone()) {
                return Err(IdentityError::DuplicateInQueue(raw));
            }
            incoming.push(raw);
        }
        self.queue.extend(incoming);
        Ok(())
    }

    /// Return the raw suffixes produced since the last drain, in order.
    pub fn drain_consumed(&mut self) -> Vec<String> {
        std::mem::take(&mut self.consumed)
    }

    /// Drop whatever is left in the replay queue.
    ///
    /// Called when a leaf finishes with fewer generations than its cache
    /// recorded, so leftovers don't leak into the next leaf.
    pub fn clear_replay_queue(&mut self) {
        self.queue.clear();
    }

    pub fn has_pending_replay(&self) -> bool {
        !self.queue.is_empty()
    }

    /// Record an identifier that already exists (e.g. a cached binding).
    pub fn mark_used(&mut self, identifier: &str) -> Result<(), IdentityError> {
        let (kind, raw) = kind::split(identifier)
            .ok_or_else(|| IdentityError::Malformed(identifier.to_string()))?;
        if !self.used.entry(kind).or_default().insert(raw.to_string()) {
            return Err(IdentityError::DuplicateIdentifier(identifier.to_string()));
        }
        Ok(())
    }

    /// Keep a raw suffix out of random draws without marking it used.
    pub fn reserve(&mut self, raw: &str) {
        self.reserved.insert(raw.to_string());
    }

    /// Forget that a suffix is used for `kind`. It stays reserved.
    pub fn release(&mut self, kind: EntityKind, raw: &str) {
        if let Some(set) = self.used.get_mut(&kind) {
            set.remove(raw);
        }
        self.reserved.insert(raw.to_string());
    }

    pub fn is_used(&self, kind: EntityKind, raw: &str) -> bool {
        self.used.get(&kind).is_some_and(|set| set.contains(raw))
    }

    pub fn used_count(&self, kind: EntityKind) -> usize {
        self.used.get(&kind).map_or(0, HashSet::len)
    }

    /// Absorb another generator's used and reserved suffixes, kind by kind.
    ///
    /// Both generators must have empty replay queues.
    pub fn merge(&mut self, other: IdGenerator) -> Result<(), IdentityError> {
        if self.has_pending_replay() || other.has_pending_replay() {
            return Err(IdentityError::PendingReplay);
        }
        for (kind, raws) in other.used {
            self.used.entry(kind).or_default().extend(raws);
        }
        self.reserved.extend(other.reserved);
        self.consumed.extend(other.consumed);
        Ok(())
    }
}
