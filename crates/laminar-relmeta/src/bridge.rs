//! Process-wide invalidation bridge.
//!
//! The host delivers "relation changed" signals through a subscription
//! that cannot be removed, so the handler outlives every session cache.
//! [`InvalidationBridge`] holds the one slot the handler dereferences:
//! empty between sessions (signals are ignored), occupied by the live
//! cache's validity index during a session.
//!
//! ```text
//! host signal ──▶ InvalidationBridge ──▶ live slot ──▶ ValidityIndex
//!                   (registered once)     (Option)      read lock +
//!                                                       flag store
//! ```
//!
//! The signal path may arrive reentrantly, from inside the caller's own
//! metadata computation. It only ever takes a read guard on the index and
//! clears one atomic flag, so it cannot insert, remove, or reallocate.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;

use crate::entry::ValidityFlag;
use crate::error::RelMetaError;
use crate::relation::RelationId;

/// Callback handed to the host on subscription.
pub type InvalidationCallback = Box<dyn Fn(RelationId) + Send + Sync>;

/// Host-side subscription primitive for relation invalidations.
///
/// There is no unsubscribe: a subscribed callback may be invoked for the
/// rest of the process lifetime, for any relation, at any point where the
/// host processes invalidations (including synchronously inside a call
/// the cache's caller is making).
pub trait InvalidationHost {
    /// Register `callback` to be invoked whenever a relation changes.
    fn subscribe_invalidation(&self, callback: InvalidationCallback);
}

/// Relation → validity flag index shared between a live cache and the
/// bridge.
///
/// Structural changes (`insert`, `remove`) are crate-private and only
/// called by the owning cache outside any host callback. The bridge only
/// calls [`mark_invalid`](Self::mark_invalid).
#[derive(Debug)]
pub(crate) struct ValidityIndex {
    flags: RwLock<FxHashMap<RelationId, Arc<ValidityFlag>>>,
    invalidations: AtomicU64,
}

impl ValidityIndex {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            flags: RwLock::new(FxHashMap::with_capacity_and_hasher(
                capacity,
                Default::default(),
            )),
            invalidations: AtomicU64::new(0),
        }
    }

    pub(crate) fn insert(&self, relation_id: RelationId, flag: Arc<ValidityFlag>) {
        let prev = self.flags.write().insert(relation_id, flag);
        debug_assert!(prev.is_none(), "relation {relation_id} indexed twice");
    }

    pub(crate) fn remove(&self, relation_id: RelationId) -> Option<Arc<ValidityFlag>> {
        self.flags.write().remove(&relation_id)
    }

    /// Clears the flag for `relation_id` if it is tracked.
    ///
    /// Returns `true` if a valid entry was marked invalid by this call.
    pub(crate) fn mark_invalid(&self, relation_id: RelationId) -> bool {
        let flags = self.flags.read();
        let Some(flag) = flags.get(&relation_id) else {
            return false;
        };
        let flipped = flag.invalidate();
        if flipped {
            self.invalidations.fetch_add(1, Ordering::Relaxed);
        }
        flipped
    }

    pub(crate) fn invalidation_count(&self) -> u64 {
        self.invalidations.load(Ordering::Relaxed)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.flags.read().len()
    }
}

/// Process-wide bridge between host invalidation signals and the live
/// session cache.
///
/// There is exactly one, reached through [`global`]. Isolated instances
/// exist only behind the `test-util` feature.
pub struct InvalidationBridge {
    registered: AtomicBool,
    live: Mutex<Option<Arc<ValidityIndex>>>,
}

impl InvalidationBridge {
    const fn unregistered() -> Self {
        Self {
            registered: AtomicBool::new(false),
            live: parking_lot::const_mutex(None),
        }
    }

    /// Create an isolated, unregistered bridge with no live cache.
    ///
    /// Only for tests and benches. Production code shares [`global`].
    #[cfg(any(test, feature = "test-util"))]
    #[must_use]
    pub const fn new() -> Self {
        Self::unregistered()
    }

    /// Subscribe this bridge's handler with `host`, once.
    ///
    /// Registration is independent of cache creation and teardown: later
    /// calls are no-ops no matter how many caches came and went.
    ///
    /// Returns `true` if this call performed the subscription.
    pub fn ensure_registered<H>(&'static self, host: &H) -> bool
    where
        H: InvalidationHost + ?Sized,
    {
        if self
            .registered
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        host.subscribe_invalidation(Box::new(move |relation_id| {
            self.invalidate(relation_id);
        }));
        tracing::info!("Relation metadata invalidation handler registered");
        true
    }

    /// Whether the handler has been subscribed with a host.
    #[must_use]
    pub fn is_registered(&self) -> bool {
        self.registered.load(Ordering::Acquire)
    }

    /// Whether a session cache is currently live on this bridge.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.live.lock().is_some()
    }

    /// Handle a host signal that `relation_id` changed.
    ///
    /// A no-op when no cache is live or the relation is not tracked.
    /// Otherwise marks the entry invalid and leaves it in place for the
    /// next prune. Safe to call reentrantly from within the caller's own
    /// lookup or metadata computation.
    pub fn invalidate(&self, relation_id: RelationId) {
        // Clone out of the slot so the slot lock is not held while the
        // index is touched.
        let live = self.live.lock().clone();
        let Some(index) = live else {
            return;
        };
        if index.mark_invalid(relation_id) {
            tracing::trace!(relation_id = %relation_id, "Relation metadata marked invalid");
        }
    }

    pub(crate) fn attach(&self, index: Arc<ValidityIndex>) -> Result<(), RelMetaError> {
        let mut live = self.live.lock();
        if live.is_some() {
            return Err(RelMetaError::AlreadyInitialized);
        }
        *live = Some(index);
        Ok(())
    }

    /// Empties the slot if it still holds `index`. Returns `true` if it did.
    pub(crate) fn detach(&self, index: &Arc<ValidityIndex>) -> bool {
        let mut live = self.live.lock();
        match live.as_ref() {
            Some(current) if Arc::ptr_eq(current, index) => {
                *live = None;
                true
            }
            _ => false,
        }
    }
}

impl std::fmt::Debug for InvalidationBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvalidationBridge")
            .field("registered", &self.is_registered())
            .field("live", &self.is_live())
            .finish()
    }
}

static GLOBAL_BRIDGE: InvalidationBridge = InvalidationBridge::unregistered();

/// The process-wide bridge.
#[must_use]
pub fn global() -> &'static InvalidationBridge {
    &GLOBAL_BRIDGE
}

/// Subscribe the process-wide bridge with `host`, once per process.
///
/// Returns `true` if this call performed the subscription.
pub fn ensure_registered<H>(host: &H) -> bool
where
    H: InvalidationHost + ?Sized,
{
    GLOBAL_BRIDGE.ensure_registered(host)
}

/// Host entry point: `relation_id` changed.
///
/// Equivalent to [`InvalidationBridge::invalidate`] on the [`global`]
/// bridge.
pub fn on_invalidation(relation_id: RelationId) {
    GLOBAL_BRIDGE.invalidate(relation_id);
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Host that records subscriptions and can fire them inline.
    #[derive(Default)]
    struct MockHost {
        callbacks: Mutex<Vec<InvalidationCallback>>,
    }

    impl InvalidationHost for MockHost {
        fn subscribe_invalidation(&self, callback: InvalidationCallback) {
            self.callbacks.lock().push(callback);
        }
    }

    impl MockHost {
        fn fire(&self, relation_id: RelationId) {
            for cb in self.callbacks.lock().iter() {
                cb(relation_id);
            }
        }

        fn subscriptions(&self) -> usize {
            self.callbacks.lock().len()
        }
    }

    fn leak_bridge() -> &'static InvalidationBridge {
        Box::leak(Box::new(InvalidationBridge::new()))
    }

    #[test]
    fn test_registers_once() {
        let bridge = leak_bridge();
        let host = MockHost::default();
        assert!(!bridge.is_registered());

        assert!(bridge.ensure_registered(&host));
        assert!(!bridge.ensure_registered(&host));
        assert!(!bridge.ensure_registered(&host));

        assert!(bridge.is_registered());
        assert_eq!(host.subscriptions(), 1);
    }

    #[test]
    fn test_registration_survives_attach_detach_cycles() {
        let bridge = leak_bridge();
        let host = MockHost::default();
        bridge.ensure_registered(&host);

        for _ in 0..3 {
            let index = Arc::new(ValidityIndex::with_capacity(4));
            bridge.attach(Arc::clone(&index)).unwrap();
            assert!(!bridge.ensure_registered(&host));
            assert!(bridge.detach(&index));
        }
        assert_eq!(host.subscriptions(), 1);
    }

    #[test]
    fn test_signal_without_live_cache_is_noop() {
        let bridge = leak_bridge();
        let host = MockHost::default();
        bridge.ensure_registered(&host);

        // Must not panic or allocate a slot.
        host.fire(RelationId(42));
        assert!(!bridge.is_live());
    }

    #[test]
    fn test_signal_marks_tracked_flag_only() {
        let bridge = leak_bridge();
        let host = MockHost::default();
        bridge.ensure_registered(&host);

        let index = Arc::new(ValidityIndex::with_capacity(4));
        let flag = Arc::new(ValidityFlag::new());
        index.insert(RelationId(1), Arc::clone(&flag));
        bridge.attach(Arc::clone(&index)).unwrap();

        host.fire(RelationId(2));
        assert!(flag.is_valid());
        assert_eq!(index.len(), 1);

        host.fire(RelationId(1));
        assert!(!flag.is_valid());
        // Marking never removes.
        assert_eq!(index.len(), 1);
        assert_eq!(index.invalidation_count(), 1);

        // Repeated signals for an already invalid entry are not counted.
        host.fire(RelationId(1));
        assert_eq!(index.invalidation_count(), 1);
    }

    #[test]
    fn test_attach_twice_fails() {
        let bridge = leak_bridge();
        let first = Arc::new(ValidityIndex::with_capacity(1));
        let second = Arc::new(ValidityIndex::with_capacity(1));

        bridge.attach(Arc::clone(&first)).unwrap();
        assert_eq!(
            bridge.attach(Arc::clone(&second)),
            Err(RelMetaError::AlreadyInitialized)
        );

        // Detaching a foreign index leaves the live one in place.
        assert!(!bridge.detach(&second));
        assert!(bridge.is_live());
        assert!(bridge.detach(&first));
        assert!(!bridge.detach(&first));
        assert!(!bridge.is_live());
    }

    #[test]
    fn test_detached_index_is_unreachable() {
        let bridge = leak_bridge();
        let index = Arc::new(ValidityIndex::with_capacity(1));
        let flag = Arc::new(ValidityFlag::new());
        index.insert(RelationId(5), Arc::clone(&flag));

        bridge.attach(Arc::clone(&index)).unwrap();
        bridge.detach(&index);

        bridge.invalidate(RelationId(5));
        assert!(flag.is_valid());
    }
}
