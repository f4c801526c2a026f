//! Session orchestration.
//!
//! - [`state`] — `SessionState`, `Transition`
//! - [`intent`] — keyword request parsing
//! - [`recovery`] — failure classification and Retry / Fallback / Abort
//! - [`scaffold`] — deterministic fallback artifacts
//! - [`session`] — `Orchestrator`, `run_session`

pub mod intent;
pub mod recovery;
pub mod scaffold;
pub mod session;
pub mod state;

pub use intent::{mentioned_sources, parse_intent, ParsedIntent};
pub use recovery::{
    classify_failure, decide_recovery, FailureClass, RecoveryAction, RecoveryPolicy, StageFailure,
};
pub use scaffold::{scaffold_design, scaffold_implementation, scaffold_unit};
pub use session::{
    run_session, Orchestrator, SessionHints, SessionOutcome, SessionReport, SessionRequest,
};
pub use state::{SessionState, Transition};
