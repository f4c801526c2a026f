//! Generic bounded planning loop and its two role instantiations.
//!
//! # Module layout
//!
//! - [`skill`] — `SkillId`, `Skill`, `SkillTable`, `Defect`, `Plan`, `SkillError`
//! - [`engine`] — `RoleAgent`, `PlanningLoop`, `LoopReport`
//! - [`design`] — `DesignRole`
//! - [`implementation`] — `ImplementationRole`
//! - [`agent`] — `ContextAware`, `DesignAgent`, `ImplementationAgent`

pub mod agent;
pub mod design;
pub mod engine;
pub mod implementation;
mod prompt;
pub mod skill;

pub use agent::{Agent, ContextAware, DesignAgent, ImplementationAgent};
pub use design::DesignRole;
pub use engine::{LoopReport, PlanningLoop, RoleAgent};
pub use implementation::ImplementationRole;
pub use skill::{Defect, DefectKind, Plan, Skill, SkillArgs, SkillError, SkillId, SkillTable};
