//! Conflict model: one detected disagreement between artifacts, or between an
//! artifact and external knowledge.
//!
//! Conflicts are plain values. Detection tools create them, shared memory
//! holds the open set, and agents clear them once resolved. Identity is full
//! value equality, so two conflicts describing the same disagreement compare
//! equal and collapse on dedup.

use serde::{Deserialize, Serialize};

use crate::roles::AgentRole;

/// Which kind of disagreement was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictKind {
    MissingArtifact,
    SchemaMismatch,
    KnowledgeContradiction,
    IncompatibleComponents,
}

impl std::fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConflictKind::MissingArtifact => "missing-artifact",
            ConflictKind::SchemaMismatch => "schema-mismatch",
            ConflictKind::KnowledgeContradiction => "knowledge-contradiction",
            ConflictKind::IncompatibleComponents => "incompatible-components",
        };
        write!(f, "{s}")
    }
}

/// Conflict severity. Ordered so that `High` sorts last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    High,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::High => "high",
        };
        write!(f, "{s}")
    }
}

/// A single disagreement surfaced by a detection tool.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Conflict {
    pub kind: ConflictKind,
    pub severity: Severity,
    /// Role whose output has to change to clear this conflict.
    pub source_role: AgentRole,
    /// Component, field, unit or token the conflict is about.
    pub affected: String,
    pub description: String,
}

impl Conflict {
    pub fn new(
        kind: ConflictKind,
        severity: Severity,
        source_role: AgentRole,
        affected: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            severity,
            source_role,
            affected: affected.into(),
            description: description.into(),
        }
    }

    pub fn is_high(&self) -> bool {
        self.severity == Severity::High
    }

    /// One-line form used in prompts, logs and CLI output.
    pub fn summary(&self) -> String {
        format!(
            "[{}/{}] {} ({}): {}",
            self.severity, self.kind, self.affected, self.source_role, self.description
        )
    }
}

/// Sort and dedup a conflict list so that equal inputs always produce equal output.
pub fn normalize(mut conflicts: Vec<Conflict>) -> Vec<Conflict> {
    conflicts.sort();
    conflicts.dedup();
    conflicts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn missing(name: &str) -> Conflict {
        Conflict::new(
            ConflictKind::MissingArtifact,
            Severity::High,
            AgentRole::Implementation,
            name,
            format!("no implementation unit for component {name}"),
        )
    }

    #[test]
    fn test_conflict_equality_is_by_value() {
        assert_eq!(missing("well_map"), missing("well_map"));
        assert_ne!(missing("well_map"), missing("lease_table"));
    }

    #[test]
    fn test_normalize_sorts_and_dedups() {
        let out = normalize(vec![missing("b"), missing("a"), missing("b")]);
        assert_eq!(out, vec![missing("a"), missing("b")]);
    }

    #[test]
    fn test_severity_orders_high_last() {
        assert!(Severity::High > Severity::Warning);
        assert!(Severity::Warning > Severity::Info);
    }

    #[test]
    fn test_kind_serializes_kebab_case() {
        let json = serde_json::to_string(&ConflictKind::IncompatibleComponents).unwrap();
        assert_eq!(json, "\"incompatible-components\"");
        assert_eq!(
            ConflictKind::IncompatibleComponents.to_string(),
            "incompatible-components"
        );
    }

    #[test]
    fn test_summary_mentions_affected_identifier() {
        let s = missing("well_map").summary();
        assert!(s.contains("well_map"));
        assert!(s.contains("missing-artifact"));
    }
}
