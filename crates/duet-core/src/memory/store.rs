//! Shared session memory: the versioned store both agents read and write.
//!
//! Exactly one component holds `&mut SharedSessionMemory` at a time, so every
//! mutation below is totally ordered without locks. Each mutation stores the
//! new value, appends a [`VersionRecord`] and bumps the slot's version.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use crate::artifact::{DesignSpec, Implementation};
use crate::collaborators::{KnowledgePattern, SchemaCatalog};
use crate::conflict::{self, Conflict, Severity};
use crate::context::RequestContext;
use crate::events::{ArtifactSlot, DuetEvent, EventSink};
use crate::memory::trace::{RoleStatus, TraceEntry};
use crate::memory::version::VersionRecord;
use crate::roles::AgentRole;

/// Mutable, versioned state of one session.
#[derive(Debug)]
pub struct SharedSessionMemory {
    session_id: Uuid,
    context: Arc<RequestContext>,
    request: String,
    schema: SchemaCatalog,
    knowledge: Vec<KnowledgePattern>,

    design: Option<DesignSpec>,
    design_version: u64,
    design_history: Vec<VersionRecord<DesignSpec>>,

    implementation: Option<Implementation>,
    implementation_version: u64,
    implementation_history: Vec<VersionRecord<Implementation>>,

    conflicts: Vec<Conflict>,
    conflicts_version: u64,
    conflict_history: Vec<VersionRecord<Vec<Conflict>>>,

    status: BTreeMap<AgentRole, RoleStatus>,
    traces: BTreeMap<AgentRole, Vec<TraceEntry>>,
    events: EventSink,
}

impl SharedSessionMemory {
    pub fn new(context: Arc<RequestContext>) -> Self {
        let request = context.intent().original_request.clone();
        Self {
            session_id: Uuid::new_v4(),
            context,
            request,
            schema: SchemaCatalog::default(),
            knowledge: Vec::new(),
            design: None,
            design_version: 0,
            design_history: Vec::new(),
            implementation: None,
            implementation_version: 0,
            implementation_history: Vec::new(),
            conflicts: Vec::new(),
            conflicts_version: 0,
            conflict_history: Vec::new(),
            status: BTreeMap::new(),
            traces: BTreeMap::new(),
            events: EventSink::disabled(),
        }
    }

    pub fn with_session_id(mut self, session_id: Uuid) -> Self {
        self.session_id = session_id;
        self
    }

    pub fn with_request(mut self, request: &str) -> Self {
        self.request = request.into();
        self
    }

    pub fn with_schema(mut self, schema: SchemaCatalog) -> Self {
        self.schema = schema;
        self
    }

    pub fn with_knowledge(mut self, knowledge: Vec<KnowledgePattern>) -> Self {
        self.knowledge = knowledge;
        self
    }

    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    // -- pass-through reads ------------------------------------------------

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn context(&self) -> &Arc<RequestContext> {
        &self.context
    }

    pub fn request(&self) -> &str {
        &self.request
    }

    pub fn schema(&self) -> &SchemaCatalog {
        &self.schema
    }

    pub fn knowledge(&self) -> &[KnowledgePattern] {
        &self.knowledge
    }

    pub fn events(&self) -> &EventSink {
        &self.events
    }

    // -- design ------------------------------------------------------------

    pub fn design(&self) -> Option<&DesignSpec> {
        self.design.as_ref()
    }

    pub fn design_version(&self) -> u64 {
        self.design_version
    }

    pub fn design_history(&self) -> &[VersionRecord<DesignSpec>] {
        &self.design_history
    }

    /// Publish a new design version.
    pub fn update_design(&mut self, artifact: DesignSpec, reason: &str) -> u64 {
        self.design_version += 1;
        self.design_history.push(VersionRecord::new(
            self.design_version,
            artifact.clone(),
            reason,
        ));
        self.design = Some(artifact);
        self.published(ArtifactSlot::Design, self.design_version, reason);
        self.design_version
    }

    // -- implementation ----------------------------------------------------

    pub fn implementation(&self) -> Option<&Implementation> {
        self.implementation.as_ref()
    }

    pub fn implementation_version(&self) -> u64 {
        self.implementation_version
    }

    pub fn implementation_history(&self) -> &[VersionRecord<Implementation>] {
        &self.implementation_history
    }

    /// Publish a new implementation version.
    pub fn update_implementation(&mut self, files: BTreeMap<String, String>, reason: &str) -> u64 {
        let artifact = Implementation::new(files);
        self.implementation_version += 1;
        self.implementation_history.push(VersionRecord::new(
            self.implementation_version,
            artifact.clone(),
            reason,
        ));
        self.implementation = Some(artifact);
        self.published(
            ArtifactSlot::Implementation,
            self.implementation_version,
            reason,
        );
        self.implementation_version
    }

    // -- conflicts ---------------------------------------------------------

    /// Currently open conflicts, sorted.
    pub fn conflicts(&self) -> &[Conflict] {
        &self.conflicts
    }

    pub fn conflicts_version(&self) -> u64 {
        self.conflicts_version
    }

    pub fn conflict_history(&self) -> &[VersionRecord<Vec<Conflict>>] {
        &self.conflict_history
    }

    /// Open conflicts attributed to `role`'s output.
    pub fn conflicts_for(&self, role: AgentRole) -> Vec<Conflict> {
        self.conflicts
            .iter()
            .filter(|c| c.source_role == role)
            .cloned()
            .collect()
    }

    pub fn high_severity_count(&self) -> usize {
        self.conflicts.iter().filter(|c| c.is_high()).count()
    }

    /// Roles that own at least one open high-severity conflict.
    pub fn roles_with_high_conflicts(&self) -> BTreeSet<AgentRole> {
        self.conflicts
            .iter()
            .filter(|c| c.severity == Severity::High)
            .map(|c| c.source_role)
            .collect()
    }

    /// Replace the open conflict list with a freshly detected one.
    pub fn update_conflicts(&mut self, conflicts: Vec<Conflict>) -> u64 {
        let conflicts = conflict::normalize(conflicts);
        self.conflicts_version += 1;
        let reason = format!("detected {} conflict(s)", conflicts.len());
        self.conflict_history.push(VersionRecord::new(
            self.conflicts_version,
            conflicts.clone(),
            &reason,
        ));
        self.conflicts = conflicts;
        self.published(ArtifactSlot::Conflicts, self.conflicts_version, &reason);
        self.conflicts_version
    }

    /// Remove one open conflict equal to `conflict`.
    ///
    /// Returns `false` and leaves memory untouched when no such conflict is open.
    pub fn resolve_conflict(&mut self, conflict: &Conflict) -> bool {
        let Some(idx) = self.conflicts.iter().position(|c| c == conflict) else {
            debug!(affected = %conflict.affected, "resolve_conflict: not open, ignoring");
            return false;
        };
        self.conflicts.remove(idx);
        self.conflicts_version += 1;
        let reason = format!("resolved {} on {}", conflict.kind, conflict.affected);
        self.conflict_history.push(VersionRecord::new(
            self.conflicts_version,
            self.conflicts.clone(),
            &reason,
        ));
        self.published(ArtifactSlot::Conflicts, self.conflicts_version, &reason);
        true
    }

    // -- per-role status and trace ------------------------------------------

    pub fn status(&self, role: AgentRole) -> RoleStatus {
        self.status.get(&role).cloned().unwrap_or_default()
    }

    pub fn set_status(&mut self, role: AgentRole, status: RoleStatus) {
        debug!(role = %role, status = %status, "role status");
        self.status.insert(role, status);
    }

    pub fn trace(&self, role: AgentRole) -> &[TraceEntry] {
        self.traces.get(&role).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn record_trace(&mut self, role: AgentRole, entry: TraceEntry) {
        self.traces.entry(role).or_default().push(entry);
    }

    fn published(&self, slot: ArtifactSlot, version: u64, reason: &str) {
        crate::obs::emit_artifact_published(&self.session_id.to_string(), slot, version);
        self.events.emit(DuetEvent::ArtifactPublished {
            slot,
            version,
            reason: reason.to_string(),
        });
    }
}
