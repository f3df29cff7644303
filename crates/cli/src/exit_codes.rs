//! CLI Exit Code Registry
//!
//! This is the single source of truth for all CLI exit codes.
//! Exit codes are part of the shell contract: scripts rely on them.
//!
//! # Exit Code Ranges
//!
//! | Range   | Domain           | Description                              |
//! |---------|------------------|------------------------------------------|
//! | 0       | Universal        | Success                                  |
//! | 1       | Universal        | General error (unspecified)              |
//! | 2       | Universal        | CLI usage error (bad args, missing file) |
//! | 60-69   | resolve          | Resolution and labeling pipeline codes   |
//!
//! # Adding New Exit Codes
//!
//! 1. Add the constant in the appropriate range
//! 2. Document what triggers it
//! 3. Update the table above
//! 4. Wire it into [`resolve_exit_code`] or the command's error handling

use placefuse_resolve::ResolveError;

// =============================================================================
// Universal (0-2)
// =============================================================================

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
/// Avoid using this; prefer a specific error code.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, missing required options, a named input
/// file (config, overrides) that does not exist.
pub const EXIT_USAGE: u8 = 2;

// =============================================================================
// Resolve (60-69)
// =============================================================================

/// Config failed to parse or validate, or references an unknown source.
pub const EXIT_RESOLVE_INVALID_CONFIG: u8 = 60;

/// Input or runtime failure: unreadable source file, missing mapped column,
/// duplicate record id, checkpoint mismatch, scorer contract violation.
pub const EXIT_RESOLVE_RUNTIME: u8 = 61;

/// No match scorer: config has no `[decision.model]`.
pub const EXIT_RESOLVE_NO_SCORER: u8 = 62;

/// Map an engine error to its exit code.
pub fn resolve_exit_code(err: &ResolveError) -> u8 {
    match err {
        ResolveError::ConfigParse(_)
        | ResolveError::ConfigValidation(_)
        | ResolveError::UnknownSource(_) => EXIT_RESOLVE_INVALID_CONFIG,
        ResolveError::ScorerUnavailable => EXIT_RESOLVE_NO_SCORER,
        ResolveError::MissingField { .. }
        | ResolveError::DuplicateId { .. }
        | ResolveError::ScorerContract(_)
        | ResolveError::CheckpointMismatch(_)
        | ResolveError::Io(_) => EXIT_RESOLVE_RUNTIME,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_distinct() {
        let codes = [
            EXIT_SUCCESS,
            EXIT_ERROR,
            EXIT_USAGE,
            EXIT_RESOLVE_INVALID_CONFIG,
            EXIT_RESOLVE_RUNTIME,
            EXIT_RESOLVE_NO_SCORER,
        ];
        let unique: std::collections::HashSet<u8> = codes.iter().copied().collect();
        assert_eq!(unique.len(), codes.len());
    }

    #[test]
    fn engine_errors_map_to_codes() {
        assert_eq!(
            resolve_exit_code(&ResolveError::ConfigValidation("x".into())),
            EXIT_RESOLVE_INVALID_CONFIG
        );
        assert_eq!(resolve_exit_code(&ResolveError::ScorerUnavailable), EXIT_RESOLVE_NO_SCORER);
        assert_eq!(
            resolve_exit_code(&ResolveError::CheckpointMismatch("x".into())),
            EXIT_RESOLVE_RUNTIME
        );
    }
}
