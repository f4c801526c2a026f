//! Stage failure classification and recovery decisions.
//!
//! This module provides:
//! - a coarse failure taxonomy read from the failure cause
//! - the per-attempt Retry / Fallback / Abort decision

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::orchestrator::state::SessionState;

/// A failure inside one orchestrator state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageFailure {
    pub state: SessionState,
    pub cause: String,
}

impl StageFailure {
    pub fn new(state: SessionState, cause: impl Into<String>) -> Self {
        Self {
            state,
            cause: cause.into(),
        }
    }
}

/// Coarse failure taxonomy used by [`decide_recovery`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// Worth trying again unchanged.
    Transient,
    /// The collaborator answered, but with nothing usable.
    Content,
    /// The request itself is malformed. Never recovered.
    Validation,
}

/// What to do after a stage failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryAction {
    Retry,
    Fallback,
    Abort,
}

/// Bounded recovery policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryPolicy {
    /// Retries of one state after its first failure.
    pub max_retries: u32,
    /// States that have a deterministic fallback in this session.
    pub fallbacks: BTreeSet<SessionState>,
}

impl RecoveryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            fallbacks: BTreeSet::new(),
        }
    }

    pub fn with_fallback(mut self, state: SessionState) -> Self {
        self.fallbacks.insert(state);
        self
    }

    pub fn has_fallback(&self, state: SessionState) -> bool {
        self.fallbacks.contains(&state)
    }
}

const TRANSIENT_MARKERS: &[&str] = &[
    "timeout",
    "timed out",
    "unavailable",
    "connection",
    "rate limit",
    "temporarily",
];

const VALIDATION_MARKERS: &[&str] = &["invalid request context", "validation"];

/// Classify a failure from its state and cause text.
pub fn classify_failure(failure: &StageFailure) -> FailureClass {
    let cause = failure.cause.to_lowercase();

    if failure.state == SessionState::BuildingSession
        || VALIDATION_MARKERS.iter().any(|m| cause.contains(m))
    {
        return FailureClass::Validation;
    }
    if TRANSIENT_MARKERS.iter().any(|m| cause.contains(m)) {
        return FailureClass::Transient;
    }
    FailureClass::Content
}

/// Decide the next action after the `attempts`-th consecutive failure of a
/// state (1 on the first failure).
///
/// Validation failures abort. Transient failures retry while
/// `attempts <= max_retries`. Anything else falls back if the state has a
/// fallback and aborts otherwise.
pub fn decide_recovery(
    failure: &StageFailure,
    attempts: u32,
    policy: &RecoveryPolicy,
) -> RecoveryAction {
    match classify_failure(failure) {
        FailureClass::Validation => RecoveryAction::Abort,
        FailureClass::Transient if attempts <= policy.max_retries => RecoveryAction::Retry,
        _ if policy.has_fallback(failure.state) => RecoveryAction::Fallback,
        _ => RecoveryAction::Abort,
    }
}
