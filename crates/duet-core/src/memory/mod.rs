//! Shared session memory.
//!
//! - [`store`] — `SharedSessionMemory`, the versioned per-session store
//! - [`version`] — `VersionRecord`, append-only artifact history
//! - [`trace`] — `RoleStatus`, `TraceEntry`, `SkillOutcome`, `Evaluation`

pub mod store;
pub mod trace;
pub mod version;

pub use store::SharedSessionMemory;
pub use trace::{Evaluation, RoleStatus, SkillOutcome, TraceEntry};
pub use version::{content_digest, VersionRecord};
