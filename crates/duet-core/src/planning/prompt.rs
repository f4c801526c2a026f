//! Prompt assembly shared by the generation skills of both roles.

use crate::collaborators::{ArtifactGenerator, GenerationTask, PromptContext};
use crate::memory::SharedSessionMemory;
use crate::parser::render_files;
use crate::planning::skill::SkillError;
use crate::roles::AgentRole;

/// Build the generator input for `role` from the current memory state.
pub(crate) fn prompt_for(
    memory: &SharedSessionMemory,
    role: AgentRole,
    task: GenerationTask,
    issues: Vec<String>,
) -> PromptContext {
    let ctx = memory.context();
    let intent = ctx.intent();
    let current = match role {
        AgentRole::Design => memory.design().map(|d| d.raw.clone()),
        AgentRole::Implementation => memory.implementation().map(|i| render_files(&i.files)),
    };
    PromptContext {
        role,
        task,
        request: memory.request().to_string(),
        intent_tag: intent.intent_tag.clone(),
        task_type: intent.task_type,
        output_format: intent.output_format,
        scope: ctx.scope().iter().cloned().collect(),
        schema: memory.schema().restricted_to(ctx.scope()),
        knowledge: memory.knowledge().to_vec(),
        design: memory.design().cloned(),
        current,
        conflicts: memory
            .conflicts_for(role)
            .iter()
            .map(|c| c.summary())
            .collect(),
        issues,
    }
}

/// One generator call, with collaborator errors mapped into the skill taxonomy.
pub(crate) async fn generate(
    generator: &dyn ArtifactGenerator,
    prompt: &PromptContext,
) -> Result<String, SkillError> {
    let text = generator.generate(prompt).await?;
    tracing::debug!(role = %prompt.role, bytes = text.len(), "generator responded");
    Ok(text)
}
