//! Implementation role: turns the current design into files.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::artifact::{is_snake_case, to_snake_case, unit_name, with_unit_name};
use crate::collaborators::{ArtifactGenerator, GenerationTask};
use crate::memory::{SharedSessionMemory, SkillOutcome};
use crate::parser::{parse_files, require_files};
use crate::planning::engine::RoleAgent;
use crate::planning::prompt::{generate, prompt_for};
use crate::planning::skill::{Defect, DefectKind, Skill, SkillArgs, SkillError, SkillId, SkillTable};
use crate::roles::AgentRole;

/// Role definition for the implementation agent.
#[derive(Debug)]
pub struct ImplementationRole {
    skills: SkillTable,
    min_chars: usize,
}

impl ImplementationRole {
    pub fn new(generator: Arc<dyn ArtifactGenerator>, min_chars: usize) -> Self {
        let regenerate = |task: GenerationTask| -> Arc<dyn Skill> {
            Arc::new(RegenerateImplementation {
                generator: generator.clone(),
                task,
            })
        };
        let skills = SkillTable::new()
            .register(SkillId::GenerateInitial, regenerate(GenerationTask::Initial))
            .register(
                SkillId::ResolveConflicts,
                regenerate(GenerationTask::ResolveConflicts),
            )
            .register(
                SkillId::Fix(DefectKind::MissingParts),
                Arc::new(GenerateMissingUnits {
                    generator: generator.clone(),
                }),
            )
            .register(
                SkillId::Fix(DefectKind::ShortContent),
                regenerate(GenerationTask::Fix {
                    defect: DefectKind::ShortContent.to_string(),
                }),
            )
            .register(SkillId::Fix(DefectKind::Naming), Arc::new(RenameUnits));
        Self { skills, min_chars }
    }

    /// Replace one skill in the table.
    pub fn with_skill(mut self, id: SkillId, skill: Arc<dyn Skill>) -> Self {
        self.skills = self.skills.register(id, skill);
        self
    }
}

impl RoleAgent for ImplementationRole {
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
        let Some(imp) = memory.implementation() else {
            return Vec::new();
        };
        let mut defects = Vec::new();

        if imp.is_empty() {
            defects.push(Defect::new(
                DefectKind::MissingParts,
                "implementation",
                "no files",
            ));
        }
        if let Some(design) = memory.design() {
            let units = imp.units();
            for c in &design.components {
                if !units.contains_key(&c.name) {
                    defects.push(Defect::new(
                        DefectKind::MissingParts,
                        &c.name,
                        "design component has no implementation unit",
                    ));
                }
            }
        }

        for (path, content) in &imp.files {
            let len = content.trim().len();
            if len < self.min_chars {
                defects.push(Defect::new(
                    DefectKind::ShortContent,
                    path,
                    format!("{len} chars, expected at least {}", self.min_chars),
                ));
            }
        }

        for path in imp.files.keys() {
            let unit = unit_name(path);
            if !is_snake_case(unit) {
                defects.push(Defect::new(
                    DefectKind::Naming,
                    path,
                    format!("unit {unit} should be {}", to_snake_case(unit)),
                ));
            }
        }

        defects
    }
}

fn reason_for(task: &GenerationTask) -> String {
    match task {
        GenerationTask::Initial => "generate-initial".to_string(),
        GenerationTask::ResolveConflicts => "resolve-conflicts".to_string(),
        GenerationTask::Fix { defect } => format!("fix-{defect}"),
        GenerationTask::Component { name } => format!("component {name}"),
    }
}

/// Ask the generator for the whole implementation.
struct RegenerateImplementation {
    generator: Arc<dyn ArtifactGenerator>,
    task: GenerationTask,
}

#[async_trait]
impl Skill for RegenerateImplementation {
    async fn run(
        &self,
        memory: &mut SharedSessionMemory,
        args: &SkillArgs,
    ) -> Result<SkillOutcome, SkillError> {
        if memory.design().is_none() {
            return Err(SkillError::MissingInput("design".to_string()));
        }
        let mut issues: Vec<String> = args.defects.iter().map(ToString::to_string).collect();
        issues.extend(args.conflicts.iter().map(|c| c.summary()));

        let prompt = prompt_for(memory, AgentRole::Implementation, self.task.clone(), issues);
        let text = generate(self.generator.as_ref(), &prompt).await?;
        let files = require_files(&text).map_err(|e| SkillError::Unparseable {
            role: AgentRole::Implementation,
            reason: e.to_string(),
        })?;

        let count = files.len();
        let version = memory.update_implementation(files, &reason_for(&self.task));

        let mut resolved = 0;
        for conflict in &args.conflicts {
            if memory.resolve_conflict(conflict) {
                resolved += 1;
            }
        }

        Ok(SkillOutcome::succeeded(format!(
            "implementation v{version} with {count} file(s), {resolved} conflict(s) resolved"
        )))
    }
}

/// Generate only the units the design needs but the implementation lacks,
/// one generator call per component, merged into the existing files.
struct GenerateMissingUnits {
    generator: Arc<dyn ArtifactGenerator>,
}

#[async_trait]
impl Skill for GenerateMissingUnits {
    async fn run(
        &self,
        memory: &mut SharedSessionMemory,
        args: &SkillArgs,
    ) -> Result<SkillOutcome, SkillError> {
        let design = memory
            .design()
            .cloned()
            .ok_or_else(|| SkillError::MissingInput("design".to_string()))?;
        let mut files: BTreeMap<String, String> = memory
            .implementation()
            .map(|i| i.files.clone())
            .unwrap_or_default();

        let missing: Vec<String> = args
            .targets()
            .into_iter()
            .filter(|t| design.component(t).is_some())
            .collect();
        if missing.is_empty() {
            return Err(SkillError::MissingInput(
                "no missing design component to generate".to_string(),
            ));
        }

        let mut generated = Vec::new();
        let mut failed = Vec::new();
        for name in &missing {
            let issues = vec![format!("implement only the unit for component {name}")];
            let prompt = prompt_for(
                memory,
                AgentRole::Implementation,
                GenerationTask::Component { name: name.clone() },
                issues,
            );
            match generate(self.generator.as_ref(), &prompt).await {
                Ok(text) => {
                    let parsed = parse_files(&text);
                    if parsed.is_empty() {
                        warn!(component = %name, "component generation returned no file sections");
                        failed.push(name.clone());
                    } else {
                        files.extend(parsed);
                        generated.push(name.clone());
                    }
                }
                Err(err) => {
                    warn!(component = %name, error = %err, "component generation failed");
                    failed.push(name.clone());
                }
            }
        }

        if generated.is_empty() {
            return Err(SkillError::Unparseable {
                role: AgentRole::Implementation,
                reason: format!("no unit generated for {}", failed.join(", ")),
            });
        }

        let version = memory.update_implementation(files, "fix-missing-parts");
        let mut detail = format!(
            "implementation v{version}: generated {}",
            generated.join(", ")
        );
        if !failed.is_empty() {
            detail.push_str(&format!("; still missing {}", failed.join(", ")));
        }
        Ok(SkillOutcome::succeeded(detail))
    }
}

/// Rename files whose unit stem is not snake_case. A rename that would
/// collide with an existing file drops the misnamed copy instead.
struct RenameUnits;

#[async_trait]
impl Skill for RenameUnits {
    async fn run(
        &self,
        memory: &mut SharedSessionMemory,
        _args: &SkillArgs,
    ) -> Result<SkillOutcome, SkillError> {
        let files = memory
            .implementation()
            .map(|i| i.files.clone())
            .ok_or_else(|| SkillError::MissingInput("implementation".to_string()))?;

        let mut renamed = 0;
        let mut dropped = Vec::new();
        let mut out: BTreeMap<String, String> = BTreeMap::new();
        let (good, bad): (Vec<_>, Vec<_>) = files
            .into_iter()
            .partition(|(path, _)| is_snake_case(unit_name(path)));
        out.extend(good);
        for (path, content) in bad {
            let target = with_unit_name(&path, &to_snake_case(unit_name(&path)));
            renamed += 1;
            if out.contains_key(&target) {
                warn!(file = %path, target = %target, "dropping misnamed duplicate");
                dropped.push(format!("{path} (kept {target})"));
            } else {
                out.insert(target, content);
            }
        }

        if renamed == 0 {
            return Ok(SkillOutcome::succeeded("all unit names already snake_case"));
        }
        let version = memory.update_implementation(out, "fix-naming");
        let mut detail = format!("implementation v{version}: renamed {renamed} file(s)");
        if !dropped.is_empty() {
            detail.push_str(&format!("; dropped duplicate(s) {}", dropped.join(", ")));
        }
        Ok(SkillOutcome::succeeded(detail))
    }
}
