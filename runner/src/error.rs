//! Typed failures callers need to tell apart.
//!
//! These travel inside `anyhow::Error`; use `err.downcast_ref::<SpecError>()`
//! to branch on them.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpecError {
    /// A required argument was missing or empty.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// No resolution strategy matched the given specification name.
    #[error("specification not found: '{0}'")]
    NotFound(String),

    /// More than one specification directory matched a fuzzy name.
    #[error("specification name '{name}' is ambiguous, candidates: {}", candidates.join(", "))]
    AmbiguousMatch {
        name: String,
        candidates: Vec<String>,
    },

    /// No task in the document carries this id.
    #[error("task '{0}' not found")]
    TaskNotFound(String),

    /// `mark_complete` found no unchecked line matching the id.
    #[error("no incomplete task matching '{0}' (missing or already complete)")]
    NotFoundOrAlreadyComplete(String),

    /// Strict parsing rejected a line.
    #[error("malformed checklist line {line}: '{text}'")]
    Malformed { line: usize, text: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ambiguous_match_lists_every_candidate() {
        let err = SpecError::AmbiguousMatch {
            name: "auth".to_string(),
            candidates: vec!["auth-api".to_string(), "oauth-flow".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("auth-api"));
        assert!(msg.contains("oauth-flow"));
    }

    #[test]
    fn errors_survive_anyhow_round_trip() {
        let err: anyhow::Error = SpecError::TaskNotFound("7".to_string()).into();
        assert_eq!(
            err.downcast_ref::<SpecError>(),
            Some(&SpecError::TaskNotFound("7".to_string()))
        );
    }
}
