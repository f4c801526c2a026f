//! Design role: produces and repairs the [`DesignSpec`].

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::artifact::{is_snake_case, to_snake_case, DesignSpec};
use crate::collaborators::{ArtifactGenerator, GenerationTask};
use crate::memory::{SharedSessionMemory, SkillOutcome};
use crate::parser::parse_design;
use crate::planning::engine::RoleAgent;
use crate::planning::prompt::{generate, prompt_for};
use crate::planning::skill::{Defect, DefectKind, Skill, SkillArgs, SkillError, SkillId, SkillTable};
use crate::roles::AgentRole;

/// Role definition for the design agent.
#[derive(Debug)]
pub struct DesignRole {
    skills: SkillTable,
    min_chars: usize,
}

impl DesignRole {
    /// Default skill table: generator-backed skills for generation,
    /// conflict resolution, missing parts and short content; local fixes
    /// for scope violations and naming.
    pub fn new(generator: Arc<dyn ArtifactGenerator>, min_chars: usize) -> Self {
        let regenerate = |task: GenerationTask| -> Arc<dyn Skill> {
            Arc::new(RegenerateDesign {
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
                regenerate(GenerationTask::Fix {
                    defect: DefectKind::MissingParts.to_string(),
                }),
            )
            .register(
                SkillId::Fix(DefectKind::ShortContent),
                regenerate(GenerationTask::Fix {
                    defect: DefectKind::ShortContent.to_string(),
                }),
            )
            .register(SkillId::Fix(DefectKind::ScopeViolation), Arc::new(RepointSources))
            .register(SkillId::Fix(DefectKind::Naming), Arc::new(RenameComponents));
        Self { skills, min_chars }
    }

    /// Replace one skill in the table.
    pub fn with_skill(mut self, id: SkillId, skill: Arc<dyn Skill>) -> Self {
        self.skills = self.skills.register(id, skill);
        self
    }
}

impl RoleAgent for DesignRole {
    fn role(&self) -> AgentRole {
        AgentRole::Design
    }

    fn skills(&self) -> &SkillTable {
        &self.skills
    }

    fn has_artifact(&self, memory: &SharedSessionMemory) -> bool {
        memory.design().is_some()
    }

    fn inspect(&self, memory: &SharedSessionMemory) -> Vec<Defect> {
        let Some(design) = memory.design() else {
            return Vec::new();
        };
        let ctx = memory.context();
        let mut defects = Vec::new();

        if design.components.is_empty() {
            defects.push(Defect::new(
                DefectKind::MissingParts,
                &design.title,
                "design declares no components",
            ));
        }

        for c in &design.components {
            match &c.source {
                Some(source) if !ctx.in_scope(source) => defects.push(Defect::new(
                    DefectKind::ScopeViolation,
                    &c.name,
                    format!("source {source} is outside the authorized scope"),
                )),
                None if c.needs_source() => defects.push(Defect::new(
                    DefectKind::ScopeViolation,
                    &c.name,
                    format!("{} component has no data source", c.kind),
                )),
                _ => {}
            }
        }

        let len = design.raw.trim().len();
        if len < self.min_chars {
            defects.push(Defect::new(
                DefectKind::ShortContent,
                &design.title,
                format!("design text is {len} chars, expected at least {}", self.min_chars),
            ));
        }

        for c in &design.components {
            if !is_snake_case(&c.name) {
                defects.push(Defect::new(
                    DefectKind::Naming,
                    &c.name,
                    format!("rename to {}", to_snake_case(&c.name)),
                ));
            }
        }

        defects
    }
}

/// Ask the generator for a whole new design.
struct RegenerateDesign {
    generator: Arc<dyn ArtifactGenerator>,
    task: GenerationTask,
}

#[async_trait]
impl Skill for RegenerateDesign {
    async fn run(
        &self,
        memory: &mut SharedSessionMemory,
        args: &SkillArgs,
    ) -> Result<SkillOutcome, SkillError> {
        let mut issues: Vec<String> = args.defects.iter().map(ToString::to_string).collect();
        issues.extend(args.conflicts.iter().map(|c| c.summary()));

        let prompt = prompt_for(memory, AgentRole::Design, self.task.clone(), issues);
        let text = generate(self.generator.as_ref(), &prompt).await?;
        let design = parse_design(&text).ok_or_else(|| SkillError::Unparseable {
            role: AgentRole::Design,
            reason: "no title or component lines".to_string(),
        })?;

        let components = design.components.len();
        let reason = match &self.task {
            GenerationTask::Initial => "generate-initial".to_string(),
            GenerationTask::ResolveConflicts => "resolve-conflicts".to_string(),
            GenerationTask::Fix { defect } => format!("fix-{defect}"),
            GenerationTask::Component { name } => format!("component {name}"),
        };
        let version = memory.update_design(design, &reason);

        let mut resolved = 0;
        for conflict in &args.conflicts {
            if memory.resolve_conflict(conflict) {
                resolved += 1;
            }
        }

        Ok(SkillOutcome::succeeded(format!(
            "design v{version} with {components} component(s), {resolved} conflict(s) resolved"
        )))
    }
}

/// Re-point out-of-scope or missing sources at the first scoped source.
struct RepointSources;

#[async_trait]
impl Skill for RepointSources {
    async fn run(
        &self,
        memory: &mut SharedSessionMemory,
        _args: &SkillArgs,
    ) -> Result<SkillOutcome, SkillError> {
        let ctx = memory.context().clone();
        let target = ctx
            .scope()
            .iter()
            .next()
            .cloned()
            .ok_or_else(|| SkillError::MissingInput("scoped source".to_string()))?;
        let mut design = memory
            .design()
            .cloned()
            .ok_or_else(|| SkillError::MissingInput("design".to_string()))?;
        let known = memory.schema().fields(&target).cloned();

        let mut changed = Vec::new();
        for c in design.components.iter_mut() {
            let violates = match &c.source {
                Some(s) => !ctx.in_scope(s),
                None => c.needs_source(),
            };
            if !violates {
                continue;
            }
            c.source = Some(target.clone());
            if let Some(known) = &known {
                c.fields.retain(|f| known.contains(f));
                if c.fields.is_empty() {
                    c.fields.extend(known.iter().next().cloned());
                }
            }
            changed.push(c.name.clone());
        }

        if changed.is_empty() {
            return Ok(SkillOutcome::succeeded("no component needed re-pointing"));
        }
        design.raw = design.render();
        let version = memory.update_design(design, "fix-scope-violation");
        Ok(SkillOutcome::succeeded(format!(
            "design v{version}: {} re-pointed to {target}",
            changed.join(", ")
        )))
    }
}

/// Rename components to snake_case and rewrite dependency references.
struct RenameComponents;

#[async_trait]
impl Skill for RenameComponents {
    async fn run(
        &self,
        memory: &mut SharedSessionMemory,
        _args: &SkillArgs,
    ) -> Result<SkillOutcome, SkillError> {
        let mut design: DesignSpec = memory
            .design()
            .cloned()
            .ok_or_else(|| SkillError::MissingInput("design".to_string()))?;

        let renames: BTreeMap<String, String> = design
            .components
            .iter()
            .filter(|c| !is_snake_case(&c.name))
            .map(|c| (c.name.clone(), to_snake_case(&c.name)))
            .collect();
        if renames.is_empty() {
            return Ok(SkillOutcome::succeeded("all component names already snake_case"));
        }

        for c in design.components.iter_mut() {
            if let Some(new) = renames.get(&c.name) {
                c.name = new.clone();
            }
            for dep in c.depends_on.iter_mut() {
                if let Some(new) = renames.get(dep.as_str()) {
                    *dep = new.clone();
                }
            }
        }
        design.raw = design.render();
        let version = memory.update_design(design, "fix-naming");
        Ok(SkillOutcome::succeeded(format!(
            "design v{version}: renamed {} component(s)",
            renames.len()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{ComponentKind, ComponentSpec};
    use crate::collaborators::SchemaCatalog;
    use crate::context::{OutputFormat, RequestContext, Requirements, TaskType};
    use crate::fakes::TemplateGenerator;
    use crate::planning::engine::PlanningLoop;

    fn memory() -> SharedSessionMemory {
        let ctx = RequestContext::build(
            &Requirements::new(["fracfocus"]),
            ["fracfocus", "rrc"],
            vec![("fracfocus".to_string(), 100), ("rrc".to_string(), 50)],
            "frac water dashboard",
            TaskType::Dashboard,
            OutputFormat::Tsx,
        )
        .unwrap();
        SharedSessionMemory::new(Arc::new(ctx)).with_schema(
            SchemaCatalog::default()
                .with_source("fracfocus", &["state", "total_base_water_volume"])
                .with_source("rrc", &["lease_name"]),
        )
    }

    fn role() -> DesignRole {
        DesignRole::new(Arc::new(TemplateGenerator::new()), 60)
    }

    fn seeded(components: Vec<ComponentSpec>) -> SharedSessionMemory {
        let mut mem = memory();
        let mut design = DesignSpec {
            title: "Frac water".to_string(),
            summary: "Water use across fracfocus disclosures by state.".to_string(),
            components,
            raw: String::new(),
        };
        design.raw = design.render();
        mem.update_design(design, "seed");
        mem
    }

    #[test]
    fn test_inspect_orders_and_finds_each_defect() {
        let mem = seeded(vec![
            ComponentSpec::new("WaterByState", ComponentKind::Chart)
                .with_source("rrc")
                .with_fields(&["state"]),
            ComponentSpec::new("water_total", ComponentKind::Kpi),
        ]);
        let defects = role().inspect(&mem);
        let kinds: Vec<DefectKind> = defects.iter().map(|d| d.kind).collect();
        assert!(kinds.contains(&DefectKind::ScopeViolation));
        assert!(kinds.contains(&DefectKind::Naming));
        assert_eq!(
            defects
                .iter()
                .filter(|d| d.kind == DefectKind::ScopeViolation)
                .count(),
            2
        );
    }

    #[test]
    fn test_empty_design_is_missing_parts() {
        let mem = seeded(vec![]);
        let defects = role().inspect(&mem);
        assert_eq!(defects[0].kind, DefectKind::MissingParts);
    }

    #[tokio::test]
    async fn test_repoint_sources_fixes_scope() {
        let mut mem = seeded(vec![ComponentSpec::new("lease_table", ComponentKind::Table)
            .with_source("rrc")
            .with_fields(&["lease_name"])]);
        let outcome = RepointSources
            .run(&mut mem, &SkillArgs::default())
            .await
            .unwrap();
        assert!(outcome.success);
        let c = mem.design().unwrap().component("lease_table").unwrap().clone();
        assert_eq!(c.source.as_deref(), Some("fracfocus"));
        assert_eq!(c.fields, vec!["state"]);
        assert!(mem.design().unwrap().raw.contains("source: fracfocus"));
    }

    #[tokio::test]
    async fn test_rename_rewrites_dependencies() {
        let mut mem = seeded(vec![
            ComponentSpec::new("StateFilter", ComponentKind::Filter),
            ComponentSpec::new("water_chart", ComponentKind::Chart)
                .with_source("fracfocus")
                .with_dependency("StateFilter"),
        ]);
        RenameComponents
            .run(&mut mem, &SkillArgs::default())
            .await
            .unwrap();
        let design = mem.design().unwrap();
        assert!(design.component("state_filter").is_some());
        assert_eq!(
            design.component("water_chart").unwrap().depends_on,
            vec!["state_filter"]
        );
        assert_eq!(mem.design_version(), 2);
    }

    #[tokio::test]
    async fn test_loop_produces_clean_design() {
        let mut mem = memory();
        let lp = PlanningLoop::new(role());
        let report = lp.run(&mut mem, 5).await;
        assert!(report.satisfied, "trace: {:?}", mem.trace(AgentRole::Design));
        let design = mem.design().unwrap();
        assert!(!design.components.is_empty());
        assert!(design
            .components
            .iter()
            .all(|c| c.source.as_deref().map_or(true, |s| s == "fracfocus")));
    }
}
