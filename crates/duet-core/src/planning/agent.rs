//! Context-aware agents wrapping a configured [`PlanningLoop`].

use std::sync::Arc;

use async_trait::async_trait;

use crate::collaborators::ArtifactGenerator;
use crate::config::DuetConfig;
use crate::context::RequestContext;
use crate::error::{DuetError, Result};
use crate::memory::SharedSessionMemory;
use crate::planning::design::DesignRole;
use crate::planning::engine::{LoopReport, PlanningLoop, RoleAgent};
use crate::planning::implementation::ImplementationRole;
use crate::roles::AgentRole;

/// An agent that is handed the session's request context before it runs.
#[async_trait]
pub trait ContextAware: Send + Sync {
    fn with_context(&mut self, context: Arc<RequestContext>);

    fn context(&self) -> Option<&Arc<RequestContext>>;

    /// Run one bounded planning loop against `memory`.
    async fn execute(&self, memory: &mut SharedSessionMemory) -> Result<LoopReport>;
}

/// A role definition plus the context it was given.
#[derive(Debug)]
pub struct Agent<A: RoleAgent> {
    planning: PlanningLoop<A>,
    context: Option<Arc<RequestContext>>,
}

pub type DesignAgent = Agent<DesignRole>;
pub type ImplementationAgent = Agent<ImplementationRole>;

impl<A: RoleAgent> Agent<A> {
    pub fn new(role: A) -> Self {
        Self {
            planning: PlanningLoop::new(role),
            context: None,
        }
    }

    pub fn role(&self) -> AgentRole {
        self.planning.role()
    }

    pub fn planning(&self) -> &PlanningLoop<A> {
        &self.planning
    }
}

impl DesignAgent {
    pub fn from_config(generator: Arc<dyn ArtifactGenerator>, config: &DuetConfig) -> Self {
        Agent::new(DesignRole::new(generator, config.min_design_chars))
    }
}

impl ImplementationAgent {
    pub fn from_config(generator: Arc<dyn ArtifactGenerator>, config: &DuetConfig) -> Self {
        Agent::new(ImplementationRole::new(generator, config.min_file_chars))
    }
}

#[async_trait]
impl<A: RoleAgent> ContextAware for Agent<A> {
    fn with_context(&mut self, context: Arc<RequestContext>) {
        self.context = Some(context);
    }

    fn context(&self) -> Option<&Arc<RequestContext>> {
        self.context.as_ref()
    }

    async fn execute(&self, memory: &mut SharedSessionMemory) -> Result<LoopReport> {
        let role = self.role();
        let ctx = self
            .context
            .as_ref()
            .ok_or_else(|| DuetError::Config(format!("{role} agent has no request context")))?;
        if ctx.as_ref() != memory.context().as_ref() {
            return Err(DuetError::Config(format!(
                "{role} agent context does not match the session"
            )));
        }
        let max_steps = ctx.execution().max_iterations;
        Ok(self.planning.run(memory, max_steps).await)
    }
}
