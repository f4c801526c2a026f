//! Contradictions between artifacts and retrieved domain knowledge.

use crate::collaborators::Guidance;
use crate::conflict::{Conflict, ConflictKind, Severity};
use crate::detection::{ConflictCheck, DetectionInput};
use crate::roles::AgentRole;

/// Applies each pattern's structured guidance.
///
/// `AvoidKind` rules match design components (Warning, design).
/// `AvoidToken` rules match implementation file content (High, implementation).
#[derive(Debug, Clone, Copy, Default)]
pub struct KnowledgeContradiction;

impl ConflictCheck for KnowledgeContradiction {
    fn name(&self) -> &'static str {
        "knowledge-contradiction"
    }

    fn run(&self, input: &DetectionInput<'_>) -> Vec<Conflict> {
        let mut out = Vec::new();

        for pattern in input.knowledge {
            for rule in &pattern.guidance {
                match rule {
                    Guidance::AvoidKind {
                        kind,
                        when_field,
                        reason,
                    } => {
                        let Some(design) = input.design else {
                            continue;
                        };
                        for c in design.components.iter().filter(|c| c.kind == *kind) {
                            if let Some(field) = when_field {
                                if !c.fields.contains(field) {
                                    continue;
                                }
                            }
                            out.push(Conflict::new(
                                ConflictKind::KnowledgeContradiction,
                                Severity::Warning,
                                AgentRole::Design,
                                &c.name,
                                format!("{} ({}): {reason}", pattern.title, pattern.id),
                            ));
                        }
                    }
                    Guidance::AvoidToken { token, reason } => {
                        let Some(imp) = input.implementation else {
                            continue;
                        };
                        if token.is_empty() {
                            continue;
                        }
                        for (path, content) in &imp.files {
                            if content.contains(token.as_str()) {
                                out.push(Conflict::new(
                                    ConflictKind::KnowledgeContradiction,
                                    Severity::High,
                                    AgentRole::Implementation,
                                    path,
                                    format!(
                                        "{} ({}): contains {token:?}: {reason}",
                                        pattern.title, pattern.id
                                    ),
                                ));
                            }
                        }
                    }
                }
            }
        }

        out.sort();
        out.dedup();
        out
    }
}
