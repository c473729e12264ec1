//! Cache entries and their shared validity flag.
//!
//! An entry's validity lives in a [`ValidityFlag`] shared between the
//! session-owned entry and the bridge's validity index. The invalidation
//! path only ever reaches the flag, so it can mark an entry stale while
//! the session holds a `&mut` handle to it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::relation::RelationId;

/// Validity bit shared by an entry and the validity index.
///
/// Starts valid. Once cleared it is never set again; a re-created entry
/// for the same relation gets a fresh flag.
#[derive(Debug)]
pub(crate) struct ValidityFlag(AtomicBool);

impl ValidityFlag {
    pub(crate) fn new() -> Self {
        Self(AtomicBool::new(true))
    }

    pub(crate) fn is_valid(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Clears the flag. Returns `true` if it was valid before.
    pub(crate) fn invalidate(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }
}

/// Cached metadata state for one relation in the current session.
///
/// `M` is the caller's session-private payload (for example a rendered
/// schema). The cache carries it but never interprets it.
#[derive(Debug)]
pub struct RelMetaEntry<M> {
    relation_id: RelationId,
    is_cached: bool,
    validity: Arc<ValidityFlag>,
    meta: M,
}

impl<M: Default> RelMetaEntry<M> {
    pub(crate) fn new(relation_id: RelationId, validity: Arc<ValidityFlag>) -> Self {
        Self {
            relation_id,
            is_cached: false,
            validity,
            meta: M::default(),
        }
    }
}

impl<M> RelMetaEntry<M> {
    /// Identity of the relation this entry describes. Equals its map key.
    #[must_use]
    pub fn relation_id(&self) -> RelationId {
        self.relation_id
    }

    /// Whether the consumer already holds a complete description.
    #[must_use]
    pub fn is_cached(&self) -> bool {
        self.is_cached
    }

    /// Record that a complete description was sent and the consumer will
    /// remember it. Later lookups may then answer "hit".
    pub fn mark_cached(&mut self) {
        self.is_cached = true;
    }

    /// Set or clear the cached flag explicitly.
    pub fn set_cached(&mut self, cached: bool) {
        self.is_cached = cached;
    }

    /// `false` once the host signalled that the relation changed.
    ///
    /// An invalid entry stays in the map until the next prune.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.validity.is_valid()
    }

    /// Caller-owned payload.
    #[must_use]
    pub fn meta(&self) -> &M {
        &self.meta
    }

    /// Mutable access to the caller-owned payload.
    pub fn meta_mut(&mut self) -> &mut M {
        &mut self.meta
    }

    pub(crate) fn validity(&self) -> &Arc<ValidityFlag> {
        &self.validity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_entry_defaults() {
        let entry: RelMetaEntry<Vec<u8>> =
            RelMetaEntry::new(RelationId(7), Arc::new(ValidityFlag::new()));
        assert_eq!(entry.relation_id(), RelationId(7));
        assert!(!entry.is_cached());
        assert!(entry.is_valid());
        assert!(entry.meta().is_empty());
    }

    #[test]
    fn test_cached_flag_and_meta() {
        let mut entry: RelMetaEntry<String> =
            RelMetaEntry::new(RelationId(7), Arc::new(ValidityFlag::new()));
        entry.mark_cached();
        assert!(entry.is_cached());
        entry.set_cached(false);
        assert!(!entry.is_cached());

        entry.meta_mut().push_str("id int4, name text");
        assert_eq!(entry.meta(), "id int4, name text");
    }

    #[test]
    fn test_shared_flag_invalidation_is_visible() {
        let flag = Arc::new(ValidityFlag::new());
        let entry: RelMetaEntry<()> = RelMetaEntry::new(RelationId(9), Arc::clone(&flag));

        assert!(flag.invalidate());
        assert!(!entry.is_valid());
        // Second invalidation reports the flag was already cleared.
        assert!(!flag.invalidate());
    }
}
