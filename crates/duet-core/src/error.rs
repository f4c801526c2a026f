//! Crate-level error taxonomy for Duet.
//!
//! Module-specific errors (`ValidationError`, `CollaboratorError`,
//! `SkillError`, `ParseError`) roll up into [`DuetError`]. Conflicts are not
//! errors and never appear here.

use crate::orchestrator::SessionState;

/// Errors raised while constructing a [`crate::context::RequestContext`].
///
/// Always fatal: a malformed context is rejected at construction time and
/// never recovered.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("confidence must be within [0, 1], got {0}")]
    ConfidenceOutOfRange(f64),

    #[error("discovery produced no data sources")]
    NoSources,

    #[error("record count given for undiscovered source: {0}")]
    CountWithoutSource(String),

    #[error("discovered source has no record count: {0}")]
    UncountedSource(String),

    #[error("scope must name at least one source")]
    EmptyScope,

    #[error("scope references undiscovered source: {0}")]
    ScopeOutsideDiscovery(String),

    #[error("max planning iterations must be at least 1")]
    ZeroIterations,

    #[error("intent text must not be empty")]
    EmptyIntent,
}

/// Failures reported by external collaborators (discovery, knowledge, generation).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollaboratorError {
    #[error("{collaborator} unavailable: {reason}")]
    Unavailable {
        collaborator: &'static str,
        reason: String,
    },

    #[error("{collaborator} timed out after {after_ms}ms")]
    Timeout {
        collaborator: &'static str,
        after_ms: u64,
    },

    #[error("{collaborator} returned an invalid response: {reason}")]
    InvalidResponse {
        collaborator: &'static str,
        reason: String,
    },

    #[error("http error: {0}")]
    Http(String),
}

impl From<reqwest::Error> for CollaboratorError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            CollaboratorError::Timeout {
                collaborator: "http",
                after_ms: 0,
            }
        } else {
            CollaboratorError::Http(err.to_string())
        }
    }
}

/// Duet domain errors.
#[derive(Debug, thiserror::Error)]
pub enum DuetError {
    #[error("invalid request context: {0}")]
    Validation(#[from] ValidationError),

    #[error("collaborator error: {0}")]
    Collaborator(#[from] CollaboratorError),

    #[error("skill error: {0}")]
    Skill(#[from] crate::planning::SkillError),

    #[error("parse error: {0}")]
    Parse(#[from] crate::parser::ParseError),

    #[error("session aborted in state {state}: {cause}")]
    SessionAborted { state: SessionState, cause: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for Duet domain operations.
pub type Result<T> = std::result::Result<T, DuetError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::ScopeOutsideDiscovery("usgs".to_string());
        assert!(err.to_string().contains("usgs"));

        let err = ValidationError::ConfidenceOutOfRange(1.5);
        assert!(err.to_string().contains("1.5"));
    }

    #[test]
    fn test_session_aborted_carries_state_and_cause() {
        let err = DuetError::SessionAborted {
            state: SessionState::DiscoveringData,
            cause: "discovery unavailable: index offline".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("discovering_data"));
        assert!(msg.contains("index offline"));
    }

    #[test]
    fn test_validation_converts_into_duet_error() {
        let err: DuetError = ValidationError::EmptyScope.into();
        assert!(matches!(err, DuetError::Validation(ValidationError::EmptyScope)));
    }
}
