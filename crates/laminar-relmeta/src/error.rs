//! Error types for the relation metadata cache.

use crate::error_codes;

/// Errors returned by relation metadata cache operations.
///
/// Only contract violations the caller can observe before any state is
/// touched are reported here. Map corruption found during a prune is not
/// recoverable and panics instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelMetaError {
    /// A relation metadata cache is already live in this process.
    #[error("[LDB-0005] relation metadata cache already initialized")]
    AlreadyInitialized,

    /// Configuration rejected by validation.
    #[error("[LDB-0001] invalid relation metadata cache config: {0}")]
    InvalidConfig(String),
}

impl RelMetaError {
    /// Returns the `LDB-NNNN` code for this error.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::AlreadyInitialized => error_codes::INVALID_OPERATION,
            Self::InvalidConfig(_) => error_codes::INVALID_CONFIG,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_ldb_code() {
        let err = RelMetaError::AlreadyInitialized;
        let s = err.to_string();
        assert!(s.starts_with("[LDB-0005]"), "{s}");
        assert!(s.contains("already initialized"));
        assert!(s.starts_with(&format!("[{}]", err.code())));

        let err = RelMetaError::InvalidConfig("initial_capacity must be > 0".into());
        assert_eq!(err.code(), "LDB-0001");
        assert!(err.to_string().starts_with("[LDB-0001]"));
        assert!(err.to_string().contains("initial_capacity"));
    }
}
