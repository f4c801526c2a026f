//! Conflict detection.
//!
//! Four independent, side-effect-free checks read a [`DetectionInput`]
//! snapshot and return conflicts. [`ConflictDetector`] runs a configured set
//! of them, merges and normalizes the results, and is the only writer of the
//! open conflict list in session memory.
//!
//! - [`consistency`] — design components without an implementation unit
//! - [`schema`] — field references the data schema does not know
//! - [`knowledge`] — artifacts contradicting retrieved domain knowledge
//! - [`compatibility`] — broken component dependency graphs

pub mod compatibility;
pub mod consistency;
pub mod knowledge;
pub mod schema;

use crate::artifact::{DesignSpec, Implementation};
use crate::collaborators::{KnowledgePattern, SchemaCatalog};
use crate::conflict::{self, Conflict};
use crate::context::RequestContext;
use crate::events::DuetEvent;
use crate::memory::SharedSessionMemory;

pub use compatibility::ComponentCompatibility;
pub use consistency::DesignImplementationConsistency;
pub use knowledge::KnowledgeContradiction;
pub use schema::SchemaAlignment;

/// Read-only snapshot the checks inspect.
#[derive(Debug, Clone, Copy)]
pub struct DetectionInput<'a> {
    pub context: &'a RequestContext,
    pub design: Option<&'a DesignSpec>,
    pub implementation: Option<&'a Implementation>,
    pub schema: &'a SchemaCatalog,
    pub knowledge: &'a [KnowledgePattern],
}

impl<'a> DetectionInput<'a> {
    pub fn from_memory(memory: &'a SharedSessionMemory) -> Self {
        Self {
            context: memory.context().as_ref(),
            design: memory.design(),
            implementation: memory.implementation(),
            schema: memory.schema(),
            knowledge: memory.knowledge(),
        }
    }
}

/// One detection tool.
pub trait ConflictCheck: Send + Sync {
    fn name(&self) -> &'static str;

    /// Conflicts found in `input`. Must be deterministic.
    fn run(&self, input: &DetectionInput<'_>) -> Vec<Conflict>;
}

/// Runs a fixed set of checks and publishes the merged result.
pub struct ConflictDetector {
    checks: Vec<Box<dyn ConflictCheck>>,
}

impl ConflictDetector {
    pub fn new(checks: Vec<Box<dyn ConflictCheck>>) -> Self {
        Self { checks }
    }

    /// The four standard checks.
    pub fn standard() -> Self {
        Self::new(vec![
            Box::new(DesignImplementationConsistency),
            Box::new(SchemaAlignment),
            Box::new(KnowledgeContradiction),
            Box::new(ComponentCompatibility),
        ])
    }

    pub fn check_names(&self) -> Vec<&'static str> {
        self.checks.iter().map(|c| c.name()).collect()
    }

    /// Run every check and return the sorted, deduplicated union.
    pub fn detect(&self, input: &DetectionInput<'_>) -> Vec<Conflict> {
        let mut all = Vec::new();
        for check in &self.checks {
            let found = check.run(input);
            tracing::debug!(check = check.name(), found = found.len(), "conflict check");
            all.extend(found);
        }
        conflict::normalize(all)
    }

    /// Detect against `memory` and replace its open conflict list.
    pub fn run(&self, memory: &mut SharedSessionMemory) -> Vec<Conflict> {
        let conflicts = self.detect(&DetectionInput::from_memory(memory));
        let high = conflicts.iter().filter(|c| c.is_high()).count();
        memory.update_conflicts(conflicts.clone());
        crate::obs::emit_conflicts_detected(conflicts.len(), high);
        memory.events().emit(DuetEvent::ConflictsDetected {
            total: conflicts.len(),
            high,
        });
        conflicts
    }
}

impl Default for ConflictDetector {
    fn default() -> Self {
        Self::standard()
    }
}

impl std::fmt::Debug for ConflictDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConflictDetector")
            .field("checks", &self.check_names())
            .finish()
    }
}
