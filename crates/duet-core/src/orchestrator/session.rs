//! Session driver: sequences every stage, applies recovery decisions and
//! runs bounded negotiation over high-severity conflicts.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn, Instrument};
use uuid::Uuid;

use crate::artifact::{DesignSpec, Implementation};
use crate::collaborators::{Collaborators, DiscoveryReport, SchemaCatalog};
use crate::config::DuetConfig;
use crate::conflict::Conflict;
use crate::context::{OutputFormat, RequestContext, Requirements, TaskType};
use crate::detection::ConflictDetector;
use crate::error::{DuetError, Result};
use crate::events::{DuetEvent, EventSink};
use crate::memory::{SharedSessionMemory, TraceEntry};
use crate::orchestrator::intent::{mentioned_sources, parse_intent, ParsedIntent};
use crate::orchestrator::recovery::{decide_recovery, RecoveryAction, RecoveryPolicy, StageFailure};
use crate::orchestrator::scaffold::{scaffold_design, scaffold_implementation};
use crate::orchestrator::state::{SessionState, Transition};
use crate::planning::{ContextAware, DesignAgent, ImplementationAgent, LoopReport};
use crate::roles::AgentRole;

/// Caller-supplied hints that override or backstop collaborator answers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionHints {
    /// Known sources and record counts; also the discovery fallback.
    pub sources: BTreeMap<String, u64>,
    /// Explicit scope. Empty means "sources named in the request, else all".
    pub scope: Vec<String>,
    pub task_type: Option<TaskType>,
    pub output_format: Option<OutputFormat>,
}

/// A user request plus hints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRequest {
    pub request: String,
    #[serde(default)]
    pub hints: SessionHints,
}

impl SessionRequest {
    pub fn new(request: impl Into<String>) -> Self {
        Self {
            request: request.into(),
            hints: SessionHints::default(),
        }
    }

    pub fn with_source(mut self, name: &str, records: u64) -> Self {
        self.hints.sources.insert(name.to_string(), records);
        self
    }

    pub fn with_scope(mut self, name: &str) -> Self {
        self.hints.scope.push(name.to_string());
        self
    }

    pub fn with_task_type(mut self, task_type: TaskType) -> Self {
        self.hints.task_type = Some(task_type);
        self
    }

    pub fn with_output_format(mut self, format: OutputFormat) -> Self {
        self.hints.output_format = Some(format);
        self
    }
}

/// How a session that reached `Completed` ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOutcome {
    /// No high-severity conflict remains.
    Completed,
    /// Negotiation was exhausted (or disabled) with high-severity conflicts open.
    CompletedWithOpenConflicts,
}

impl SessionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionOutcome::Completed => "completed",
            SessionOutcome::CompletedWithOpenConflicts => "completed_with_open_conflicts",
        }
    }
}

/// Everything a finished session produced.
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub session_id: Uuid,
    pub outcome: SessionOutcome,
    pub intent_tag: String,
    pub task_type: TaskType,
    pub output_format: OutputFormat,
    pub scope: Vec<String>,
    pub design: Option<DesignSpec>,
    pub design_version: u64,
    /// The final artifact.
    pub implementation: Implementation,
    pub implementation_version: u64,
    /// Conflicts still open at the end.
    pub conflicts: Vec<Conflict>,
    /// Every planning-loop run, in order.
    pub loops: Vec<LoopReport>,
    pub negotiation_cycles: u32,
    /// States that finished through their fallback.
    pub fallbacks: Vec<SessionState>,
    pub warnings: Vec<String>,
    pub transitions: Vec<Transition>,
    pub traces: BTreeMap<AgentRole, Vec<TraceEntry>>,
    pub duration_ms: u64,
}

impl SessionReport {
    pub fn high_severity_count(&self) -> usize {
        self.conflicts.iter().filter(|c| c.is_high()).count()
    }
}

/// Top-level state machine. One instance can run several sessions in turn.
pub struct Orchestrator {
    collaborators: Collaborators,
    config: DuetConfig,
    detector: ConflictDetector,
    events: EventSink,
    state: SessionState,
    transitions: Vec<Transition>,
    fallbacks: Vec<SessionState>,
    warnings: Vec<String>,
}

impl Orchestrator {
    pub fn new(collaborators: Collaborators, config: DuetConfig) -> Self {
        Self {
            collaborators,
            config,
            detector: ConflictDetector::standard(),
            events: EventSink::disabled(),
            state: SessionState::Idle,
            transitions: Vec::new(),
            fallbacks: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn with_detector(mut self, detector: ConflictDetector) -> Self {
        self.detector = detector;
        self
    }

    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Transitions of the current (or last) session.
    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    /// Run one session to `Completed`, or fail with `SessionAborted`.
    pub async fn run(&mut self, request: &SessionRequest) -> Result<SessionReport> {
        self.config.validate()?;
        self.state = SessionState::Idle;
        self.transitions.clear();
        self.fallbacks.clear();
        self.warnings.clear();

        let session_id = Uuid::new_v4();
        let span = crate::obs::session_span(&session_id.to_string());
        self.drive(session_id, request).instrument(span).await
    }

    fn transition(&mut self, to: SessionState, note: impl Into<String>) {
        let from = self.state;
        self.state = to;
        crate::obs::emit_state_transition(from.as_str(), to.as_str());
        self.events.emit(DuetEvent::StateChanged { from, to });
        self.transitions.push(Transition {
            from,
            to,
            note: note.into(),
            at: Utc::now(),
        });
    }

    fn warn(&mut self, message: String) {
        warn!(state = %self.state, "{message}");
        self.events.emit(DuetEvent::Warning {
            message: message.clone(),
        });
        self.warnings.push(message);
    }

    /// Enter `Error`, decide, and act on the decision. Abort becomes `Err`.
    fn recover(
        &mut self,
        failure: StageFailure,
        attempts: u32,
        policy: &RecoveryPolicy,
    ) -> Result<RecoveryAction> {
        warn!(state = %failure.state, cause = %failure.cause, attempts, "stage failed");
        self.transition(SessionState::Error, failure.cause.clone());
        let action = decide_recovery(&failure, attempts, policy);
        match action {
            RecoveryAction::Retry => {
                self.transition(failure.state, format!("retry {attempts}"));
            }
            RecoveryAction::Fallback => {
                self.fallbacks.push(failure.state);
                self.warn(format!(
                    "{} fell back after: {}",
                    failure.state, failure.cause
                ));
            }
            RecoveryAction::Abort => {
                crate::obs::emit_session_finished("aborted", 0, 0);
                return Err(DuetError::SessionAborted {
                    state: failure.state,
                    cause: failure.cause,
                });
            }
        }
        Ok(action)
    }

    fn policy(&self, request: &SessionRequest) -> RecoveryPolicy {
        let mut policy = RecoveryPolicy::new(self.config.max_stage_retries)
            .with_fallback(SessionState::ParsingRequest)
            .with_fallback(SessionState::Designing)
            .with_fallback(SessionState::GeneratingImplementation);
        if !request.hints.sources.is_empty() {
            policy = policy.with_fallback(SessionState::DiscoveringData);
        }
        policy
    }

    async fn drive(&mut self, session_id: Uuid, request: &SessionRequest) -> Result<SessionReport> {
        let started = Instant::now();
        let policy = self.policy(request);
        let text = request.request.as_str();

        // -- ParsingRequest ---------------------------------------------------
        self.transition(SessionState::ParsingRequest, "request received");
        let mut attempts = 0;
        let parsed = loop {
            match parse_intent(text) {
                Ok(parsed) => break parsed,
                Err(cause) => {
                    attempts += 1;
                    let failure = StageFailure::new(SessionState::ParsingRequest, cause);
                    match self.recover(failure, attempts, &policy)? {
                        RecoveryAction::Retry => continue,
                        _ => break ParsedIntent::fallback(),
                    }
                }
            }
        };
        let task_type = request.hints.task_type.unwrap_or(parsed.task_type);
        let output_format = request.hints.output_format.unwrap_or(parsed.output_format);

        // -- DiscoveringData ----------------------------------------------------
        self.transition(SessionState::DiscoveringData, "");
        let discovery = self.collaborators.discovery.clone();
        let mut attempts = 0;
        let report = loop {
            let result = match discovery.discover(text).await {
                Ok(r) if r.sources.is_empty() => Err("discovery returned no data sources".to_string()),
                Ok(r) => Ok(r),
                Err(err) => Err(err.to_string()),
            };
            match result {
                Ok(report) => break report,
                Err(cause) => {
                    attempts += 1;
                    let failure = StageFailure::new(SessionState::DiscoveringData, cause);
                    match self.recover(failure, attempts, &policy)? {
                        RecoveryAction::Retry => continue,
                        _ => break hinted_report(request),
                    }
                }
            }
        };

        let scope: Vec<String> = if !request.hints.scope.is_empty() {
            request.hints.scope.clone()
        } else {
            let mentioned = mentioned_sources(text, &report.sources);
            if mentioned.is_empty() {
                report.sources.clone()
            } else {
                mentioned
            }
        };

        // -- FetchingKnowledge --------------------------------------------------
        self.transition(SessionState::FetchingKnowledge, "");
        let retrieval = self.collaborators.knowledge.clone();
        let category = self.config.knowledge_category.clone();
        let queried = retrieval
            .query(text, category.as_deref(), self.config.knowledge_top_k)
            .await;
        let knowledge = match queried {
            Ok(patterns) => patterns,
            Err(err) => {
                self.warn(format!("knowledge retrieval failed, continuing without: {err}"));
                Vec::new()
            }
        };

        // -- BuildingSession ----------------------------------------------------
        self.transition(SessionState::BuildingSession, "");
        let requirements = Requirements::new(scope.iter().cloned())
            .with_confidence(report.confidence)
            .with_rationale(&report.rationale)
            .with_execution(self.config.execution());
        let ctx = match RequestContext::build(
            &requirements,
            report.sources.iter().cloned(),
            report.record_counts.clone(),
            text,
            task_type,
            output_format,
        ) {
            Ok(ctx) => Arc::new(ctx),
            Err(err) => {
                let failure = StageFailure::new(
                    SessionState::BuildingSession,
                    DuetError::from(err).to_string(),
                );
                let (state, cause) = (failure.state, failure.cause.clone());
                // validation failures are never recovered
                self.recover(failure, 1, &policy)?;
                return Err(DuetError::SessionAborted { state, cause });
            }
        };
        crate::obs::emit_session_started(&ctx.intent().intent_tag);
        for source in ctx.scope() {
            if ctx.scoped_record_count(source) == Some(0) {
                self.warn(format!("scoped source {source} has no records"));
            }
        }

        let mut memory = SharedSessionMemory::new(ctx.clone())
            .with_session_id(session_id)
            .with_request(text)
            .with_schema(report.schema)
            .with_knowledge(knowledge)
            .with_events(self.events.clone());

        let generator = self.collaborators.generator.clone();
        let mut design_agent = DesignAgent::from_config(generator.clone(), &self.config);
        design_agent.with_context(ctx.clone());
        let mut implementation_agent = ImplementationAgent::from_config(generator, &self.config);
        implementation_agent.with_context(ctx.clone());
        let mut loops = Vec::new();

        // -- Designing ------------------------------------------------------------
        self.transition(SessionState::Designing, "");
        let mut attempts = 0;
        loop {
            loops.push(design_agent.execute(&mut memory).await?);
            if memory.design().is_some() {
                break;
            }
            attempts += 1;
            let cause = last_error(&memory, AgentRole::Design)
                .unwrap_or_else(|| "design loop produced no design".to_string());
            let failure = StageFailure::new(SessionState::Designing, cause);
            match self.recover(failure, attempts, &policy)? {
                RecoveryAction::Retry => continue,
                _ => {
                    let design = scaffold_design(
                        text,
                        task_type,
                        ctx.scope(),
                        memory.schema(),
                        memory.knowledge(),
                    );
                    memory.update_design(design, "fallback scaffold");
                    break;
                }
            }
        }

        // -- GeneratingImplementation ---------------------------------------------
        self.transition(SessionState::GeneratingImplementation, "");
        let mut attempts = 0;
        loop {
            loops.push(implementation_agent.execute(&mut memory).await?);
            if memory.implementation().is_some() {
                break;
            }
            attempts += 1;
            let cause = last_error(&memory, AgentRole::Implementation)
                .unwrap_or_else(|| "implementation loop produced no files".to_string());
            let failure = StageFailure::new(SessionState::GeneratingImplementation, cause);
            match self.recover(failure, attempts, &policy)? {
                RecoveryAction::Retry => continue,
                _ => {
                    let files = match memory.design() {
                        Some(design) => scaffold_implementation(design, output_format, memory.schema()),
                        None => BTreeMap::new(),
                    };
                    memory.update_implementation(files, "fallback scaffold");
                    break;
                }
            }
        }

        // -- detection and negotiation ------------------------------------------------
        self.detector.run(&mut memory);
        let mut cycles = 0;
        if ctx.execution().validation_required {
            while memory.high_severity_count() > 0 && cycles < self.config.max_negotiation_cycles {
                cycles += 1;
                let owners = memory.roles_with_high_conflicts();
                info!(
                    cycle = cycles,
                    high = memory.high_severity_count(),
                    "negotiation cycle"
                );
                let design_version = memory.design_version();
                if owners.contains(&AgentRole::Design) {
                    self.transition(SessionState::Designing, format!("negotiation cycle {cycles}"));
                    loops.push(design_agent.execute(&mut memory).await?);
                }
                // a changed design needs a matching implementation pass
                if owners.contains(&AgentRole::Implementation)
                    || memory.design_version() != design_version
                {
                    self.transition(
                        SessionState::GeneratingImplementation,
                        format!("negotiation cycle {cycles}"),
                    );
                    loops.push(implementation_agent.execute(&mut memory).await?);
                }
                self.detector.run(&mut memory);
            }
        }

        // -- Completed ------------------------------------------------------------------
        let outcome = if memory.high_severity_count() == 0 {
            SessionOutcome::Completed
        } else {
            SessionOutcome::CompletedWithOpenConflicts
        };
        self.transition(SessionState::Completed, outcome.as_str());

        let duration_ms = started.elapsed().as_millis() as u64;
        crate::obs::emit_session_finished(outcome.as_str(), duration_ms, memory.conflicts().len());

        Ok(SessionReport {
            session_id,
            outcome,
            intent_tag: ctx.intent().intent_tag.clone(),
            task_type,
            output_format,
            scope: ctx.scope().iter().cloned().collect(),
            design: memory.design().cloned(),
            design_version: memory.design_version(),
            implementation: memory.implementation().cloned().unwrap_or_default(),
            implementation_version: memory.implementation_version(),
            conflicts: memory.conflicts().to_vec(),
            loops,
            negotiation_cycles: cycles,
            fallbacks: self.fallbacks.clone(),
            warnings: self.warnings.clone(),
            transitions: self.transitions.clone(),
            traces: AgentRole::ALL
                .iter()
                .map(|role| (*role, memory.trace(*role).to_vec()))
                .collect(),
            duration_ms,
        })
    }
}

/// Most recent skill error in `role`'s trace.
fn last_error(memory: &SharedSessionMemory, role: AgentRole) -> Option<String> {
    memory
        .trace(role)
        .iter()
        .rev()
        .find_map(|e| e.outcome.error.clone())
}

/// Discovery fallback built from the caller's source hints.
fn hinted_report(request: &SessionRequest) -> DiscoveryReport {
    DiscoveryReport {
        sources: request.hints.sources.keys().cloned().collect(),
        record_counts: request.hints.sources.clone(),
        schema: SchemaCatalog::default(),
        confidence: 1.0,
        rationale: "caller-provided source hints".to_string(),
    }
}

/// Run one session with the standard detector and no observer.
pub async fn run_session(
    request: &SessionRequest,
    collaborators: Collaborators,
    config: DuetConfig,
) -> Result<SessionReport> {
    Orchestrator::new(collaborators, config).run(request).await
}
