//! Orchestrator states and the transition log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Top-level session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    ParsingRequest,
    DiscoveringData,
    FetchingKnowledge,
    BuildingSession,
    Designing,
    GeneratingImplementation,
    Completed,
    Error,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::ParsingRequest => "parsing_request",
            SessionState::DiscoveringData => "discovering_data",
            SessionState::FetchingKnowledge => "fetching_knowledge",
            SessionState::BuildingSession => "building_session",
            SessionState::Designing => "designing",
            SessionState::GeneratingImplementation => "generating_implementation",
            SessionState::Completed => "completed",
            SessionState::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Error)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One recorded state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub from: SessionState,
    pub to: SessionState,
    pub note: String,
    pub at: DateTime<Utc>,
}
