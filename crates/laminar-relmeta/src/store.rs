//! Session-scoped relation metadata cache.
//!
//! [`RelMetaCache`] answers "was this relation's metadata already sent to
//! the consumer, and is it still current?" for one decoding session.
//!
//! ## Entry lifecycle
//!
//! ```text
//! lookup_or_create ──▶ {cached: false, valid: true}
//!        │ caller sends metadata, mark_cached()
//!        ▼
//!   {cached: true, valid: true} ──▶ hit on later lookups
//!        │ host signal (InvalidationBridge)
//!        ▼
//!   {cached: *, valid: false}   ──▶ tombstone, still in the map
//!        │ prune() at a safe point
//!        ▼
//!     removed; next lookup creates a fresh entry
//! ```
//!
//! Invalidation never removes entries. Removal happens only in
//! [`RelMetaCache::prune`], which takes `&mut self` and therefore cannot
//! run while any entry handle from [`RelMetaCache::lookup_or_create`] is
//! alive.

use std::collections::hash_map::Entry;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::bridge::{self, InvalidationBridge, ValidityIndex};
use crate::entry::{RelMetaEntry, ValidityFlag};
use crate::error::RelMetaError;
use crate::error_codes;
use crate::relation::{RelationDescriptor, RelationId};

/// How a lookup decides whether an existing entry counts as a hit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HitPolicy {
    /// Hit only if the entry is cached and has not been invalidated.
    #[default]
    CachedAndValid,
    /// Hit whenever the entry is cached, even if it was invalidated
    /// since. The stale entry is still resent after the next prune.
    CachedOnly,
}

/// Configuration for [`RelMetaCache`].
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RelMetaCacheConfig {
    /// Initial map capacity (number of relations).
    pub initial_capacity: usize,
    /// Hit semantics for invalidated-but-not-yet-pruned entries.
    pub hit_policy: HitPolicy,
}

impl Default for RelMetaCacheConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 128,
            hit_policy: HitPolicy::CachedAndValid,
        }
    }
}

impl RelMetaCacheConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RelMetaError::InvalidConfig`] if `initial_capacity` is zero.
    pub fn validate(&self) -> Result<(), RelMetaError> {
        if self.initial_capacity == 0 {
            return Err(RelMetaError::InvalidConfig(
                "initial_capacity must be > 0".into(),
            ));
        }
        Ok(())
    }
}

/// Counters snapshot from [`RelMetaCache`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelMetaCacheStats {
    /// Lookups answered as a hit.
    pub hits: u64,
    /// Lookups answered as a miss (including first sightings).
    pub misses: u64,
    /// Entries marked invalid by host signals.
    pub invalidations: u64,
    /// Entries physically removed by prune.
    pub pruned: u64,
    /// Entries currently in the map, tombstones included.
    pub entries: usize,
}

impl RelMetaCacheStats {
    /// Hit ratio (0.0 – 1.0).
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Per-session relation metadata cache.
///
/// At most one cache is live per process; creating a second one fails
/// with [`RelMetaError::AlreadyInitialized`]. Dropping the cache
/// (or calling [`destroy`](Self::destroy)) frees every entry and leaves
/// the bridge dormant.
pub struct RelMetaCache<M> {
    entries: FxHashMap<RelationId, RelMetaEntry<M>>,
    index: Arc<ValidityIndex>,
    bridge: &'static InvalidationBridge,
    config: RelMetaCacheConfig,
    hits: u64,
    misses: u64,
    pruned: u64,
}

impl<M: Default> RelMetaCache<M> {
    /// Create the session cache on the process-wide bridge.
    ///
    /// # Errors
    ///
    /// Returns [`RelMetaError::AlreadyInitialized`] if a cache is already
    /// live, or [`RelMetaError::InvalidConfig`] for a zero capacity hint.
    pub fn create(capacity_hint: usize) -> Result<Self, RelMetaError> {
        Self::with_config(RelMetaCacheConfig {
            initial_capacity: capacity_hint,
            ..RelMetaCacheConfig::default()
        })
    }

    /// Create the session cache on the process-wide bridge with `config`.
    ///
    /// # Errors
    ///
    /// Returns [`RelMetaError::InvalidConfig`] if `config` fails
    /// validation, or [`RelMetaError::AlreadyInitialized`] if a cache is
    /// already live in this process.
    pub fn with_config(config: RelMetaCacheConfig) -> Result<Self, RelMetaError> {
        Self::attach_to(bridge::global(), config)
    }

    /// Create the session cache on an isolated bridge.
    ///
    /// Only for tests and benches, which need several independent caches
    /// in one process.
    ///
    /// # Errors
    ///
    /// Same as [`with_config`](Self::with_config), scoped to `bridge`.
    #[cfg(any(test, feature = "test-util"))]
    pub fn create_in(
        bridge: &'static InvalidationBridge,
        config: RelMetaCacheConfig,
    ) -> Result<Self, RelMetaError> {
        Self::attach_to(bridge, config)
    }

    fn attach_to(
        bridge: &'static InvalidationBridge,
        config: RelMetaCacheConfig,
    ) -> Result<Self, RelMetaError> {
        config.validate()?;
        let index = Arc::new(ValidityIndex::with_capacity(config.initial_capacity));
        bridge.attach(Arc::clone(&index))?;

        tracing::debug!(
            initial_capacity = config.initial_capacity,
            hit_policy = ?config.hit_policy,
            "Relation metadata cache created"
        );

        Ok(Self {
            entries: FxHashMap::with_capacity_and_hasher(
                config.initial_capacity,
                Default::default(),
            ),
            index,
            bridge,
            config,
            hits: 0,
            misses: 0,
            pruned: 0,
        })
    }

    /// Look up the entry for `relation_id`, creating it if absent.
    ///
    /// Returns the entry handle and whether it is a hit. New entries start
    /// with `is_cached == false` and `is_valid == true` and are always a
    /// miss. For existing entries the answer follows
    /// [`RelMetaCacheConfig::hit_policy`].
    ///
    /// On a miss the caller sends the metadata and then calls
    /// [`RelMetaEntry::mark_cached`]. The host may invalidate the entry
    /// while the caller holds the handle; [`RelMetaEntry::is_valid`]
    /// reflects that immediately.
    pub fn lookup_or_create(&mut self, relation_id: RelationId) -> (&mut RelMetaEntry<M>, bool) {
        match self.entries.entry(relation_id) {
            Entry::Occupied(occupied) => {
                let entry = occupied.into_mut();
                let hit = match self.config.hit_policy {
                    HitPolicy::CachedOnly => entry.is_cached(),
                    HitPolicy::CachedAndValid => {
                        let valid = entry.is_valid();
                        if entry.is_cached() && !valid {
                            tracing::debug!(
                                relation_id = %relation_id,
                                "Cached relation metadata invalidated before prune; reporting miss"
                            );
                        }
                        entry.is_cached() && valid
                    }
                };
                if hit {
                    self.hits += 1;
                } else {
                    self.misses += 1;
                }
                (entry, hit)
            }
            Entry::Vacant(vacant) => {
                let flag = Arc::new(ValidityFlag::new());
                self.index.insert(relation_id, Arc::clone(&flag));
                self.misses += 1;
                (vacant.insert(RelMetaEntry::new(relation_id, flag)), false)
            }
        }
    }

    /// [`lookup_or_create`](Self::lookup_or_create) keyed by a host
    /// relation descriptor.
    pub fn lookup_relation<R>(&mut self, relation: &R) -> (&mut RelMetaEntry<M>, bool)
    where
        R: RelationDescriptor + ?Sized,
    {
        self.lookup_or_create(relation.relation_id())
    }
}

impl<M> RelMetaCache<M> {
    /// Remove every entry marked invalid.
    ///
    /// Call only at a safe point: `&mut self` already guarantees no entry
    /// handles are alive, and the caller must not be inside a host
    /// callback that could deliver invalidations. Entries invalidated
    /// before the call are removed; valid entries are untouched.
    ///
    /// Returns the number of entries removed.
    ///
    /// # Panics
    ///
    /// Panics if an entry observed as invalid during the scan cannot be
    /// removed from the map or the validity index. The cache's structure
    /// can no longer be trusted at that point.
    pub fn prune(&mut self) -> usize {
        let stale: Vec<RelationId> = self
            .entries
            .values()
            .filter(|entry| !entry.is_valid())
            .map(RelMetaEntry::relation_id)
            .collect();

        for relation_id in &stale {
            let removed = self.entries.remove(relation_id);
            let indexed = self.index.remove(*relation_id);
            let consistent = match (&removed, &indexed) {
                (Some(entry), Some(flag)) => Arc::ptr_eq(entry.validity(), flag),
                _ => false,
            };
            assert!(
                consistent,
                "[{}] relation metadata cache corrupted: relation {relation_id} vanished during prune",
                error_codes::INTERNAL
            );
        }

        if !stale.is_empty() {
            self.pruned += stale.len() as u64;
            tracing::debug!(
                pruned = stale.len(),
                remaining = self.entries.len(),
                "Pruned invalidated relation metadata"
            );
        }
        stale.len()
    }

    /// Tear down the cache at the end of a session.
    ///
    /// Frees all entries regardless of validity and empties the bridge's
    /// live slot, after which host signals are ignored. Equivalent to
    /// dropping the cache.
    pub fn destroy(self) {
        drop(self);
    }

    /// Read-only access to an entry, if present.
    #[must_use]
    pub fn get(&self, relation_id: RelationId) -> Option<&RelMetaEntry<M>> {
        self.entries.get(&relation_id)
    }

    /// Whether an entry (valid or not) exists for `relation_id`.
    #[must_use]
    pub fn contains(&self, relation_id: RelationId) -> bool {
        self.entries.contains_key(&relation_id)
    }

    /// Number of entries, tombstones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The cache's configuration.
    #[must_use]
    pub fn config(&self) -> &RelMetaCacheConfig {
        &self.config
    }

    /// Counters snapshot.
    #[must_use]
    pub fn stats(&self) -> RelMetaCacheStats {
        RelMetaCacheStats {
            hits: self.hits,
            misses: self.misses,
            invalidations: self.index.invalidation_count(),
            pruned: self.pruned,
            entries: self.entries.len(),
        }
    }
}

impl<M> Drop for RelMetaCache<M> {
    fn drop(&mut self) {
        let detached = self.bridge.detach(&self.index);
        debug_assert!(detached, "relation metadata cache was not the live cache");
        tracing::debug!(
            entries = self.entries.len(),
            hits = self.hits,
            misses = self.misses,
            "Relation metadata cache destroyed"
        );
    }
}

impl<M> std::fmt::Debug for RelMetaCache<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelMetaCache")
            .field("entries", &self.entries.len())
            .field("hit_policy", &self.config.hit_policy)
            .field("hits", &self.hits)
            .field("misses", &self.misses)
            .field("pruned", &self.pruned)
            .finish_non_exhaustive()
    }
}
