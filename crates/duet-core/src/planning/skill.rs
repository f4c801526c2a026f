//! Skill vocabulary and the per-role dispatch table.
//!
//! A skill is one action a planning loop can take in an iteration. Skills
//! are registered in a [`SkillTable`] keyed by [`SkillId`]; the loop looks
//! the chosen id up and invokes it with the plan's [`SkillArgs`].

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::conflict::Conflict;
use crate::error::CollaboratorError;
use crate::memory::{SharedSessionMemory, SkillOutcome};
use crate::roles::AgentRole;

/// Defect categories found by static inspection, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DefectKind {
    /// Required sub-parts are absent (no components, missing units).
    MissingParts,
    /// A component reads from a source outside the authorized scope.
    ScopeViolation,
    /// Content is suspiciously short.
    ShortContent,
    /// A name breaks the snake_case convention.
    Naming,
}

impl DefectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DefectKind::MissingParts => "missing-parts",
            DefectKind::ScopeViolation => "scope-violation",
            DefectKind::ShortContent => "short-content",
            DefectKind::Naming => "naming",
        }
    }
}

impl std::fmt::Display for DefectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One defect on a named target (component, unit or file).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Defect {
    pub kind: DefectKind,
    pub target: String,
    pub detail: String,
}

impl Defect {
    pub fn new(kind: DefectKind, target: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            kind,
            target: target.into(),
            detail: detail.into(),
        }
    }
}

impl std::fmt::Display for Defect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} on {}: {}", self.kind, self.target, self.detail)
    }
}

/// Identifier of a skill in a role's table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum SkillId {
    GenerateInitial,
    ResolveConflicts,
    Fix(DefectKind),
    Finish,
}

impl std::fmt::Display for SkillId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkillId::GenerateInitial => write!(f, "generate-initial"),
            SkillId::ResolveConflicts => write!(f, "resolve-conflicts"),
            SkillId::Fix(kind) => write!(f, "fix-{kind}"),
            SkillId::Finish => write!(f, "finish"),
        }
    }
}

impl From<SkillId> for String {
    fn from(id: SkillId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for SkillId {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.as_str() {
            "generate-initial" => Ok(SkillId::GenerateInitial),
            "resolve-conflicts" => Ok(SkillId::ResolveConflicts),
            "finish" => Ok(SkillId::Finish),
            "fix-missing-parts" => Ok(SkillId::Fix(DefectKind::MissingParts)),
            "fix-scope-violation" => Ok(SkillId::Fix(DefectKind::ScopeViolation)),
            "fix-short-content" => Ok(SkillId::Fix(DefectKind::ShortContent)),
            "fix-naming" => Ok(SkillId::Fix(DefectKind::Naming)),
            other => Err(format!("unknown skill: {other}")),
        }
    }
}

/// Arguments a plan passes to its skill.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillArgs {
    /// Open conflicts the skill should clear.
    pub conflicts: Vec<Conflict>,
    /// Defects the skill should fix.
    pub defects: Vec<Defect>,
}

impl SkillArgs {
    /// Distinct defect targets, in order of first appearance.
    pub fn targets(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for d in &self.defects {
            if !out.contains(&d.target) {
                out.push(d.target.clone());
            }
        }
        out
    }
}

/// One loop iteration's decision. Lives for a single iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub skill: SkillId,
    pub rationale: String,
    pub arguments: SkillArgs,
    pub expected_outcome: String,
}

/// Errors a skill can return. The loop records them and continues.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SkillError {
    #[error("generator failed: {0}")]
    Generator(#[from] CollaboratorError),

    #[error("{role} output could not be parsed: {reason}")]
    Unparseable { role: AgentRole, reason: String },

    #[error("skill {0} is not registered for this role")]
    NotRegistered(SkillId),

    #[error("missing input: {0}")]
    MissingInput(String),
}

/// An action a planning loop can execute.
#[async_trait]
pub trait Skill: Send + Sync {
    async fn run(
        &self,
        memory: &mut SharedSessionMemory,
        args: &SkillArgs,
    ) -> Result<SkillOutcome, SkillError>;
}

/// Dispatch table from skill id to implementation.
#[derive(Clone, Default)]
pub struct SkillTable {
    skills: BTreeMap<SkillId, Arc<dyn Skill>>,
}

impl SkillTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the skill for `id`.
    pub fn register(mut self, id: SkillId, skill: Arc<dyn Skill>) -> Self {
        self.skills.insert(id, skill);
        self
    }

    pub fn get(&self, id: SkillId) -> Option<&Arc<dyn Skill>> {
        self.skills.get(&id)
    }

    pub fn contains(&self, id: SkillId) -> bool {
        self.skills.contains_key(&id)
    }

    pub fn ids(&self) -> Vec<SkillId> {
        self.skills.keys().copied().collect()
    }
}

impl std::fmt::Debug for SkillTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SkillTable")
            .field("skills", &self.ids())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skill_id_string_round_trip_for_every_id() {
        let ids = [
            SkillId::GenerateInitial,
            SkillId::ResolveConflicts,
            SkillId::Fix(DefectKind::MissingParts),
            SkillId::Fix(DefectKind::ScopeViolation),
            SkillId::Fix(DefectKind::ShortContent),
            SkillId::Fix(DefectKind::Naming),
            SkillId::Finish,
        ];
        for id in ids {
            assert_eq!(SkillId::try_from(id.to_string()).unwrap(), id);
        }
        assert!(SkillId::try_from("fix-everything".to_string()).is_err());
    }

    #[test]
    fn test_defect_priority_order() {
        let mut kinds = vec![
            DefectKind::Naming,
            DefectKind::ShortContent,
            DefectKind::MissingParts,
            DefectKind::ScopeViolation,
        ];
        kinds.sort();
        assert_eq!(
            kinds,
            vec![
                DefectKind::MissingParts,
                DefectKind::ScopeViolation,
                DefectKind::ShortContent,
                DefectKind::Naming,
            ]
        );
    }

    #[test]
    fn test_args_targets_are_distinct() {
        let args = SkillArgs {
            conflicts: vec![],
            defects: vec![
                Defect::new(DefectKind::Naming, "A", "x"),
                Defect::new(DefectKind::Naming, "B", "y"),
                Defect::new(DefectKind::Naming, "A", "z"),
            ],
        };
        assert_eq!(args.targets(), vec!["A", "B"]);
    }
}
