//! Runtime limits and knobs for a Duet session.
//!
//! Defaults are usable as-is; [`DuetConfig::from_env`] overrides them from
//! `DUET_*` environment variables. The CLI layers its own flags on top.

use serde::{Deserialize, Serialize};

use crate::context::Execution;
use crate::error::{DuetError, Result};

/// Session configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuetConfig {
    /// Planning-loop iterations per role per negotiation cycle
    pub max_planning_steps: u32,
    /// Extra design/implementation rounds spent on high-severity conflicts
    pub max_negotiation_cycles: u32,
    /// Retries of one orchestrator state before falling back or aborting
    pub max_stage_retries: u32,
    /// Patterns requested from knowledge retrieval
    pub knowledge_top_k: usize,
    /// Optional knowledge category filter
    pub knowledge_category: Option<String>,
    /// Designs with shorter raw text are flagged `short-content`
    pub min_design_chars: usize,
    /// Implementation files with shorter content are flagged `short-content`
    pub min_file_chars: usize,
    /// Run negotiation cycles on high-severity conflicts
    pub validation_required: bool,
    /// Stream per-iteration planning events to observers
    pub trace_reasoning: bool,
}

impl Default for DuetConfig {
    fn default() -> Self {
        DuetConfig {
            max_planning_steps: 5,
            max_negotiation_cycles: 2,
            max_stage_retries: 2,
            knowledge_top_k: 5,
            knowledge_category: None,
            min_design_chars: 60,
            min_file_chars: 40,
            validation_required: true,
            trace_reasoning: true,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, current: T) -> Result<T> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| DuetError::Config(format!("{key}: cannot parse {raw:?}"))),
        Err(_) => Ok(current),
    }
}

impl DuetConfig {
    /// Defaults overridden by `DUET_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let d = DuetConfig::default();
        let cfg = DuetConfig {
            max_planning_steps: env_parse("DUET_MAX_STEPS", d.max_planning_steps)?,
            max_negotiation_cycles: env_parse(
                "DUET_MAX_NEGOTIATION_CYCLES",
                d.max_negotiation_cycles,
            )?,
            max_stage_retries: env_parse("DUET_MAX_STAGE_RETRIES", d.max_stage_retries)?,
            knowledge_top_k: env_parse("DUET_KNOWLEDGE_TOP_K", d.knowledge_top_k)?,
            knowledge_category: std::env::var("DUET_KNOWLEDGE_CATEGORY").ok(),
            min_design_chars: env_parse("DUET_MIN_DESIGN_CHARS", d.min_design_chars)?,
            min_file_chars: env_parse("DUET_MIN_FILE_CHARS", d.min_file_chars)?,
            validation_required: env_parse("DUET_VALIDATION_REQUIRED", d.validation_required)?,
            trace_reasoning: env_parse("DUET_TRACE_REASONING", d.trace_reasoning)?,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_planning_steps == 0 {
            return Err(DuetError::Config(
                "max_planning_steps must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Execution knobs carried into the request context.
    pub fn execution(&self) -> Execution {
        Execution {
            max_iterations: self.max_planning_steps,
            validation_required: self.validation_required,
            trace_reasoning: self.trace_reasoning,
        }
    }
}
