//! Per-role reasoning trace and status tags.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::planning::{Defect, SkillId};

/// Lifecycle tag of one role's planning loop.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(into = "String")]
pub enum RoleStatus {
    #[default]
    Idle,
    Planning,
    Executing(SkillId),
    Done,
    /// The loop ran out of steps before its artifact was satisfactory.
    /// A partial result, never a success.
    MaxStepsReached,
}

impl std::fmt::Display for RoleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoleStatus::Idle => write!(f, "idle"),
            RoleStatus::Planning => write!(f, "planning"),
            RoleStatus::Executing(skill) => write!(f, "executing-{skill}"),
            RoleStatus::Done => write!(f, "done"),
            RoleStatus::MaxStepsReached => write!(f, "max-steps-reached"),
        }
    }
}

impl From<RoleStatus> for String {
    fn from(status: RoleStatus) -> Self {
        status.to_string()
    }
}

/// What executing a skill produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillOutcome {
    pub success: bool,
    pub detail: String,
    pub error: Option<String>,
}

impl SkillOutcome {
    pub fn succeeded(detail: impl Into<String>) -> Self {
        Self {
            success: true,
            detail: detail.into(),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            success: false,
            detail: String::new(),
            error: Some(error),
        }
    }
}

/// Satisfaction check run after every action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
    pub satisfied: bool,
    pub issues: Vec<Defect>,
}

/// One planning-loop iteration, as recorded in the role's trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEntry {
    pub step: u32,
    pub skill: SkillId,
    pub rationale: String,
    pub outcome: SkillOutcome,
    pub evaluation: Evaluation,
    pub recorded_at: DateTime<Utc>,
}

impl TraceEntry {
    pub fn failed(&self) -> bool {
        !self.outcome.success
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planning::DefectKind;

    #[test]
    fn test_status_string_forms() {
        assert_eq!(RoleStatus::Planning.to_string(), "planning");
        assert_eq!(
            RoleStatus::Executing(SkillId::Fix(DefectKind::Naming)).to_string(),
            "executing-fix-naming"
        );
        assert_eq!(RoleStatus::MaxStepsReached.to_string(), "max-steps-reached");
        assert_eq!(
            serde_json::to_string(&RoleStatus::Done).unwrap(),
            "\"done\""
        );
    }

    #[test]
    fn test_outcome_constructors() {
        assert!(SkillOutcome::succeeded("ok").success);
        let failed = SkillOutcome::failed("boom");
        assert!(!failed.success);
        assert_eq!(failed.error.as_deref(), Some("boom"));
    }
}
