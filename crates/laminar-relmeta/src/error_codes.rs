//! Structured error codes used by the relation metadata cache.
//!
//! Codes follow the LaminarDB `LDB-NNNN` registry so they stay grep-able
//! in logs and stable across versions.
//!
//! | Range | Category |
//! |-------|----------|
//! | `LDB-0xxx` | General / configuration |
//! | `LDB-8xxx` | Internal / should-not-happen |

// ── General / Configuration (LDB-0xxx) ──

/// Invalid configuration value.
pub const INVALID_CONFIG: &str = "LDB-0001";
/// Invalid operation for the current state.
pub const INVALID_OPERATION: &str = "LDB-0005";

// ── Internal / Should-Not-Happen (LDB-8xxx) ──

/// Internal error — this is a bug.
pub const INTERNAL: &str = "LDB-8001";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_stable_strings() {
        assert_eq!(INVALID_CONFIG, "LDB-0001");
        assert_eq!(INVALID_OPERATION, "LDB-0005");
        assert_eq!(INTERNAL, "LDB-8001");
    }
}
