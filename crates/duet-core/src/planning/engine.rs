//! The bounded Decide → Act → Evaluate loop shared by both roles.
//!
//! A [`PlanningLoop`] is instantiated once per role definition. Everything
//! role-specific (skill table, defect inspection, artifact presence) comes
//! from the [`RoleAgent`] it wraps; the control flow here is identical for
//! the design and implementation roles.

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info};

use crate::events::DuetEvent;
use crate::memory::{Evaluation, RoleStatus, SharedSessionMemory, SkillOutcome, TraceEntry};
use crate::planning::skill::{Defect, Plan, SkillArgs, SkillError, SkillId, SkillTable};
use crate::roles::AgentRole;

/// Role definition a [`PlanningLoop`] runs over.
pub trait RoleAgent: Send + Sync {
    fn role(&self) -> AgentRole;

    fn skills(&self) -> &SkillTable;

    /// Whether memory holds an artifact for this role.
    fn has_artifact(&self, memory: &SharedSessionMemory) -> bool;

    /// Static defects of the current artifact. Empty when there is no artifact.
    fn inspect(&self, memory: &SharedSessionMemory) -> Vec<Defect>;
}

/// Summary of one [`PlanningLoop::run`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoopReport {
    pub role: AgentRole,
    pub status: RoleStatus,
    /// Iterations run, one trace entry each.
    pub steps_executed: u32,
    pub satisfied: bool,
}

/// Bounded planning loop over a role definition.
#[derive(Debug)]
pub struct PlanningLoop<A: RoleAgent> {
    agent: A,
}

impl<A: RoleAgent> PlanningLoop<A> {
    pub fn new(agent: A) -> Self {
        Self { agent }
    }

    pub fn agent(&self) -> &A {
        &self.agent
    }

    pub fn role(&self) -> AgentRole {
        self.agent.role()
    }

    /// Run at most `max_steps` iterations.
    ///
    /// Stops early when the artifact evaluates as satisfactory or the plan is
    /// `finish`. Running out of steps yields `MaxStepsReached`; `max_steps == 0`
    /// runs nothing and reports exactly that.
    pub async fn run(&self, memory: &mut SharedSessionMemory, max_steps: u32) -> LoopReport {
        let role = self.agent.role();
        let stream = memory.context().execution().trace_reasoning;
        info!(role = %role, max_steps, "planning loop started");

        for step in 1..=max_steps {
            memory.set_status(role, RoleStatus::Planning);
            let plan = self.plan_next_action(memory);
            debug!(role = %role, step, skill = %plan.skill, rationale = %plan.rationale, "plan");
            if stream {
                memory.events().emit(DuetEvent::PlanChosen {
                    role,
                    step,
                    skill: plan.skill,
                    rationale: plan.rationale.clone(),
                });
            }

            let outcome = if plan.skill == SkillId::Finish {
                SkillOutcome::succeeded("nothing left to do")
            } else {
                memory.set_status(role, RoleStatus::Executing(plan.skill));
                self.execute_skill(memory, &plan).await
            };
            if stream {
                memory.events().emit(DuetEvent::SkillFinished {
                    role,
                    step,
                    skill: plan.skill,
                    success: outcome.success,
                    detail: outcome
                        .error
                        .clone()
                        .unwrap_or_else(|| outcome.detail.clone()),
                });
            }

            let evaluation = self.evaluate(memory);
            if stream {
                memory.events().emit(DuetEvent::Evaluated {
                    role,
                    step,
                    satisfied: evaluation.satisfied,
                    issues: evaluation.issues.iter().map(ToString::to_string).collect(),
                });
            }

            let satisfied = evaluation.satisfied;
            memory.record_trace(
                role,
                TraceEntry {
                    step,
                    skill: plan.skill,
                    rationale: plan.rationale,
                    outcome,
                    evaluation,
                    recorded_at: Utc::now(),
                },
            );

            if satisfied || plan.skill == SkillId::Finish {
                return self.finish(memory, RoleStatus::Done, step, satisfied);
            }
        }

        self.finish(memory, RoleStatus::MaxStepsReached, max_steps, false)
    }

    /// Pick the next skill from the current memory state.
    ///
    /// Rules in order: no artifact → `generate-initial`; open conflicts owned
    /// by this role → `resolve-conflicts`; defects → `fix-<kind>` for the
    /// highest-priority kind; otherwise `finish`.
    pub fn plan_next_action(&self, memory: &SharedSessionMemory) -> Plan {
        let role = self.agent.role();

        if !self.agent.has_artifact(memory) {
            return Plan {
                skill: SkillId::GenerateInitial,
                rationale: format!("no {role} artifact yet"),
                arguments: SkillArgs::default(),
                expected_outcome: format!("a first {role} artifact in memory"),
            };
        }

        let conflicts = memory.conflicts_for(role);
        if !conflicts.is_empty() {
            return Plan {
                skill: SkillId::ResolveConflicts,
                rationale: format!("{} open conflict(s) attributed to {role}", conflicts.len()),
                arguments: SkillArgs {
                    conflicts,
                    defects: Vec::new(),
                },
                expected_outcome: "attributed conflicts cleared".to_string(),
            };
        }

        let defects = self.agent.inspect(memory);
        if let Some(kind) = defects.iter().map(|d| d.kind).min() {
            let defects: Vec<Defect> = defects.into_iter().filter(|d| d.kind == kind).collect();
            return Plan {
                skill: SkillId::Fix(kind),
                rationale: format!("{} {kind} defect(s), first on {}", defects.len(), defects[0].target),
                arguments: SkillArgs {
                    conflicts: Vec::new(),
                    defects,
                },
                expected_outcome: format!("no {kind} defects"),
            };
        }

        Plan {
            skill: SkillId::Finish,
            rationale: "artifact present and inspection is clean".to_string(),
            arguments: SkillArgs::default(),
            expected_outcome: "loop exits".to_string(),
        }
    }

    /// Dispatch the plan's skill. Errors become failed outcomes.
    pub async fn execute_skill(&self, memory: &mut SharedSessionMemory, plan: &Plan) -> SkillOutcome {
        let role = self.agent.role();
        let result = match self.agent.skills().get(plan.skill) {
            Some(skill) => skill.run(memory, &plan.arguments).await,
            None => Err(SkillError::NotRegistered(plan.skill)),
        };
        match result {
            Ok(outcome) => {
                if let Some(error) = outcome.error.as_deref().filter(|_| !outcome.success) {
                    crate::obs::emit_skill_failed(role.as_str(), &plan.skill.to_string(), &error);
                }
                outcome
            }
            Err(err) => {
                crate::obs::emit_skill_failed(role.as_str(), &plan.skill.to_string(), &err);
                SkillOutcome::failed(err.to_string())
            }
        }
    }

    /// Satisfied iff an artifact exists and inspection is clean.
    pub fn evaluate(&self, memory: &SharedSessionMemory) -> Evaluation {
        if !self.agent.has_artifact(memory) {
            return Evaluation {
                satisfied: false,
                issues: Vec::new(),
            };
        }
        let issues = self.agent.inspect(memory);
        Evaluation {
            satisfied: issues.is_empty(),
            issues,
        }
    }

    fn finish(
        &self,
        memory: &mut SharedSessionMemory,
        status: RoleStatus,
        steps: u32,
        satisfied: bool,
    ) -> LoopReport {
        let role = self.agent.role();
        memory.set_status(role, status.clone());
        crate::obs::emit_loop_finished(role.as_str(), &status.to_string(), steps);
        memory.events().emit(DuetEvent::LoopFinished {
            role,
            status: status.clone(),
            steps,
        });
        LoopReport {
            role,
            status,
            steps_executed: steps,
            satisfied,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::*;
    use crate::conflict::{Conflict, ConflictKind, Severity};
    use crate::context::{OutputFormat, RequestContext, Requirements, TaskType};
    use crate::planning::skill::{DefectKind, Skill};

    /// Toy role: the artifact is the implementation slot; a file named
    /// `Bad.md` is a naming defect.
    struct ToyRole {
        skills: SkillTable,
    }

    impl RoleAgent for ToyRole {
        fn role(&self) -> AgentRole {
            AgentRole::Implementation
        }

        fn skills(&self) -> &SkillTable {
            &self.skills
        }

        fn has_artifact(&self, memory: &SharedSessionMemory) -> bool {
            memory.implementation().is_some()
        }

        fn inspect(&self, memory: &SharedSessionMemory) -> Vec<Defect> {
            memory
                .implementation()
                .map(|imp| {
                    imp.files
                        .keys()
                        .filter(|k| k.as_str() == "Bad.md")
                        .map(|k| Defect::new(DefectKind::Naming, k.clone(), "not snake_case"))
                        .collect()
                })
                .unwrap_or_default()
        }
    }

    struct WriteFile(&'static str);

    #[async_trait]
    impl Skill for WriteFile {
        async fn run(
            &self,
            memory: &mut SharedSessionMemory,
            _args: &SkillArgs,
        ) -> Result<SkillOutcome, SkillError> {
            let files = BTreeMap::from([(self.0.to_string(), "content".to_string())]);
            memory.update_implementation(files, "toy");
            Ok(SkillOutcome::succeeded("wrote"))
        }
    }

    struct CountingNoop(Arc<AtomicU32>);

    #[async_trait]
    impl Skill for CountingNoop {
        async fn run(
            &self,
            _memory: &mut SharedSessionMemory,
            _args: &SkillArgs,
        ) -> Result<SkillOutcome, SkillError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(SkillOutcome::failed("could not fix"))
        }
    }

    fn memory() -> SharedSessionMemory {
        let ctx = RequestContext::build(
            &Requirements::new(["rrc"]),
            ["rrc"],
            vec![("rrc".to_string(), 5)],
            "permit report",
            TaskType::Report,
            OutputFormat::Markdown,
        )
        .unwrap();
        SharedSessionMemory::new(Arc::new(ctx))
    }

    #[tokio::test]
    async fn test_zero_steps_reports_max_steps_reached() {
        let lp = PlanningLoop::new(ToyRole {
            skills: SkillTable::new(),
        });
        let mut mem = memory();
        let report = lp.run(&mut mem, 0).await;
        assert_eq!(report.status, RoleStatus::MaxStepsReached);
        assert_eq!(report.steps_executed, 0);
        assert!(!report.satisfied);
        assert!(mem.trace(AgentRole::Implementation).is_empty());
    }

    #[tokio::test]
    async fn test_generates_then_satisfied() {
        let lp = PlanningLoop::new(ToyRole {
            skills: SkillTable::new()
                .register(SkillId::GenerateInitial, Arc::new(WriteFile("good.md"))),
        });
        let mut mem = memory();
        let report = lp.run(&mut mem, 5).await;
        assert_eq!(report.status, RoleStatus::Done);
        assert!(report.satisfied);
        assert_eq!(report.steps_executed, 1);
        assert_eq!(mem.status(AgentRole::Implementation), RoleStatus::Done);
    }

    #[tokio::test]
    async fn test_unfixable_defect_exhausts_steps() {
        let calls = Arc::new(AtomicU32::new(0));
        let lp = PlanningLoop::new(ToyRole {
            skills: SkillTable::new()
                .register(SkillId::GenerateInitial, Arc::new(WriteFile("Bad.md")))
                .register(
                    SkillId::Fix(DefectKind::Naming),
                    Arc::new(CountingNoop(calls.clone())),
                ),
        });
        let mut mem = memory();
        let report = lp.run(&mut mem, 3).await;
        assert_eq!(report.status, RoleStatus::MaxStepsReached);
        assert!(!report.satisfied);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let trace = mem.trace(AgentRole::Implementation);
        assert_eq!(trace.len(), 3);
        assert_eq!(trace[1].skill, SkillId::Fix(DefectKind::Naming));
        assert!(trace[1].failed());
    }

    #[tokio::test]
    async fn test_missing_skill_is_recorded_not_fatal() {
        let lp = PlanningLoop::new(ToyRole {
            skills: SkillTable::new(),
        });
        let mut mem = memory();
        let report = lp.run(&mut mem, 2).await;
        assert_eq!(report.status, RoleStatus::MaxStepsReached);
        let trace = mem.trace(AgentRole::Implementation);
        assert_eq!(trace.len(), 2);
        assert!(trace
            .iter()
            .all(|e| e.outcome.error.as_deref().unwrap().contains("not registered")));
    }

    #[test]
    fn test_conflicts_take_precedence_over_defects() {
        let lp = PlanningLoop::new(ToyRole {
            skills: SkillTable::new(),
        });
        let mut mem = memory();
        mem.update_implementation(
            BTreeMap::from([("Bad.md".to_string(), "x".to_string())]),
            "seed",
        );
        assert_eq!(lp.plan_next_action(&mem).skill, SkillId::Fix(DefectKind::Naming));

        mem.update_conflicts(vec![Conflict::new(
            ConflictKind::SchemaMismatch,
            Severity::High,
            AgentRole::Implementation,
            "Bad.md",
            "unknown field",
        )]);
        let plan = lp.plan_next_action(&mem);
        assert_eq!(plan.skill, SkillId::ResolveConflicts);
        assert_eq!(plan.arguments.conflicts.len(), 1);
    }
}
