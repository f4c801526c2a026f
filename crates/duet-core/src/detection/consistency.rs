//! Design/implementation consistency.

use crate::conflict::{Conflict, ConflictKind, Severity};
use crate::detection::{ConflictCheck, DetectionInput};
use crate::roles::AgentRole;

/// One `missing-artifact` conflict per design component that has no
/// implementation unit. Reports nothing else.
#[derive(Debug, Clone, Copy, Default)]
pub struct DesignImplementationConsistency;

impl ConflictCheck for DesignImplementationConsistency {
    fn name(&self) -> &'static str {
        "design-implementation-consistency"
    }

    fn run(&self, input: &DetectionInput<'_>) -> Vec<Conflict> {
        let Some(design) = input.design else {
            return Vec::new();
        };
        let mut out: Vec<Conflict> = design
            .components
            .iter()
            .filter(|c| !input.implementation.is_some_and(|imp| imp.has_unit(&c.name)))
            .map(|c| {
                Conflict::new(
                    ConflictKind::MissingArtifact,
                    Severity::High,
                    AgentRole::Implementation,
                    &c.name,
                    format!("design component {} has no implementation unit", c.name),
                )
            })
            .collect();
        out.sort();
        out.dedup();
        out
    }
}
