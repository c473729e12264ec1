//! Relation identity and the host descriptor seam.

use std::fmt;

/// Host-assigned identity of a relation (table).
///
/// Stable for the relation's lifetime. Only equality and hashing are
/// meaningful; the numeric order carries no semantics and every value,
/// zero included, is an ordinary key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct RelationId(pub u32);

impl RelationId {
    /// Returns the raw identity value.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl From<u32> for RelationId {
    fn from(oid: u32) -> Self {
        Self(oid)
    }
}

impl fmt::Display for RelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A host relation descriptor, owned and versioned by the host.
///
/// The cache never looks inside a descriptor beyond its identity.
pub trait RelationDescriptor {
    /// Stable identity of the described relation.
    fn relation_id(&self) -> RelationId;
}

impl RelationDescriptor for RelationId {
    fn relation_id(&self) -> RelationId {
        *self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relation_id_basics() {
        let id = RelationId::from(16384);
        assert_eq!(id.get(), 16384);
        assert_eq!(id.to_string(), "16384");
        assert_eq!(id.relation_id(), id);
    }

    #[test]
    fn test_relation_id_serde_is_bare_number() {
        let json = serde_json::to_string(&RelationId(42)).unwrap();
        assert_eq!(json, "42");
        let back: RelationId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, RelationId(42));
    }
}
