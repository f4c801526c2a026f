//! Duet Core Library
//!
//! A design agent and an implementation agent collaborate on one request
//! through a shared, versioned session memory. Each agent runs a bounded
//! plan / execute / evaluate loop; conflict detection between their
//! artifacts decides whether the orchestrator negotiates or finishes.

pub mod artifact;
pub mod collaborators;
pub mod config;
pub mod conflict;
pub mod context;
pub mod detection;
pub mod error;
pub mod events;
pub mod fakes;
pub mod memory;
pub mod obs;
pub mod orchestrator;
pub mod parser;
pub mod planning;
pub mod roles;
pub mod telemetry;

pub use artifact::{ComponentKind, ComponentSpec, DesignSpec, Implementation};
pub use collaborators::http::{ChatCompletionsConfig, ChatCompletionsGenerator};
pub use collaborators::{
    ArtifactGenerator, CollaboratorResult, Collaborators, DataDiscovery, DiscoveryReport,
    GenerationTask, Guidance, KnowledgePattern, KnowledgeRetrieval, PromptContext, SchemaCatalog,
};
pub use config::DuetConfig;
pub use conflict::{Conflict, ConflictKind, Severity};
pub use context::{Execution, OutputFormat, RequestContext, Requirements, TaskType};
pub use detection::{ConflictCheck, ConflictDetector, DetectionInput};
pub use error::{CollaboratorError, DuetError, Result, ValidationError};
pub use events::{ArtifactSlot, DuetEvent, EventSink};
pub use memory::{RoleStatus, SharedSessionMemory, TraceEntry, VersionRecord};
pub use orchestrator::{
    run_session, Orchestrator, SessionHints, SessionOutcome, SessionReport, SessionRequest,
    SessionState,
};
pub use planning::{
    ContextAware, Defect, DefectKind, DesignAgent, ImplementationAgent, LoopReport, PlanningLoop,
    RoleAgent, SkillId,
};
pub use roles::AgentRole;

/// Crate version, for reports and `--version` output.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
