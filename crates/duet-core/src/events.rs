//! Structured observer events.
//!
//! The core reports progress through an [`EventSink`]; presentation layers
//! (the CLI, a dashboard, tests) subscribe to the receiving half of the
//! channel. Sending never blocks and never fails the session: a dropped
//! receiver just means nobody is listening.

use serde::Serialize;
use tokio::sync::mpsc;

use crate::memory::RoleStatus;
use crate::orchestrator::SessionState;
use crate::planning::SkillId;
use crate::roles::AgentRole;

/// Which versioned slot of session memory changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactSlot {
    Design,
    Implementation,
    Conflicts,
}

/// One observable step of a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DuetEvent {
    StateChanged {
        from: SessionState,
        to: SessionState,
    },
    PlanChosen {
        role: AgentRole,
        step: u32,
        skill: SkillId,
        rationale: String,
    },
    SkillFinished {
        role: AgentRole,
        step: u32,
        skill: SkillId,
        success: bool,
        detail: String,
    },
    Evaluated {
        role: AgentRole,
        step: u32,
        satisfied: bool,
        issues: Vec<String>,
    },
    LoopFinished {
        role: AgentRole,
        status: RoleStatus,
        steps: u32,
    },
    ArtifactPublished {
        slot: ArtifactSlot,
        version: u64,
        reason: String,
    },
    ConflictsDetected {
        total: usize,
        high: usize,
    },
    Warning {
        message: String,
    },
}

/// Sending half of the observer channel. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<DuetEvent>>,
}

impl EventSink {
    /// A sink that drops every event.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// A connected sink and its receiver.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<DuetEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    pub fn is_enabled(&self) -> bool {
        self.tx.is_some()
    }

    pub fn emit(&self, event: DuetEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}
