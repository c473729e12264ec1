//! # `LaminarDB` Relation Metadata Cache
//!
//! Per-session cache that lets a CDC output producer skip re-sending a
//! relation's schema description to a consumer that already has it.
//!
//! ## Module Overview
//!
//! - [`store`]: [`RelMetaCache`], the session-scoped map, lookup and prune
//! - [`bridge`]: [`InvalidationBridge`], the process-wide handler for host
//!   "relation changed" signals
//! - [`entry`]: [`RelMetaEntry`], one relation's cached state
//! - [`relation`]: [`RelationId`] and the host descriptor seam
//!
//! ## Session flow
//!
//! ```ignore
//! use laminar_relmeta::{bridge, RelMetaCache};
//!
//! bridge::ensure_registered(&host);
//! let mut cache: RelMetaCache<Schema> = RelMetaCache::create(128)?;
//!
//! for change in changes {
//!     let (entry, hit) = cache.lookup_relation(&change.relation);
//!     if !hit {
//!         *entry.meta_mut() = send_relation_metadata(&change.relation)?;
//!         entry.mark_cached();
//!     }
//!     send_change(&change)?;
//!     cache.prune();
//! }
//!
//! cache.destroy();
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

/// Process-wide invalidation bridge.
pub mod bridge;
/// Cache entries.
pub mod entry;
/// Error types.
pub mod error;
/// Structured `LDB-NNNN` error codes.
pub mod error_codes;
/// Relation identity.
pub mod relation;
/// Session-scoped cache store.
pub mod store;

pub use bridge::{
    InvalidationBridge, InvalidationCallback, InvalidationHost, ensure_registered,
    on_invalidation,
};
pub use entry::RelMetaEntry;
pub use error::RelMetaError;
pub use relation::{RelationDescriptor, RelationId};
pub use store::{HitPolicy, RelMetaCache, RelMetaCacheConfig, RelMetaCacheStats};
