//! Structured observability hooks for Duet session lifecycle events.
//!
//! This module provides:
//! - Session-scoped tracing spans via [`session_span`]
//! - Emission functions for key lifecycle events: session start/finish,
//!   state transitions, artifact publication, loop completion, detection
//!
//! Events are emitted at `info!` level with an `event` field naming the
//! lifecycle point, so log pipelines can filter on it.

use tracing::{info, warn};

use crate::events::ArtifactSlot;

/// Session-scoped span. Attach it with `tracing::Instrument::instrument` so
/// every event inside the session carries `session_id`.
///
/// # Example
///
/// ```ignore
/// orchestrator.drive(request).instrument(session_span(&id)).await
/// ```
pub fn session_span(session_id: &str) -> tracing::Span {
    tracing::info_span!("duet.session", session_id = %session_id)
}

/// Emit event: session started for a request.
pub fn emit_session_started(intent_tag: &str) {
    info!(event = "session.started", intent_tag = %intent_tag);
}

/// Emit event: session reached a terminal state.
pub fn emit_session_finished(outcome: &str, duration_ms: u64, open_conflicts: usize) {
    info!(
        event = "session.finished",
        outcome = %outcome,
        duration_ms = duration_ms,
        open_conflicts = open_conflicts,
    );
}

/// Emit event: orchestrator moved between states.
pub fn emit_state_transition(from: &str, to: &str) {
    info!(event = "session.transition", from = %from, to = %to);
}

/// Emit event: a new artifact version was published to session memory.
pub fn emit_artifact_published(session_id: &str, slot: ArtifactSlot, version: u64) {
    info!(
        event = "memory.published",
        session_id = %session_id,
        slot = ?slot,
        version = version,
    );
}

/// Emit event: one role's planning loop returned.
pub fn emit_loop_finished(role: &str, status: &str, steps: u32) {
    info!(event = "loop.finished", role = %role, status = %status, steps = steps);
}

/// Emit event: a conflict-detection pass completed.
pub fn emit_conflicts_detected(total: usize, high: usize) {
    info!(event = "detection.completed", total = total, high = high);
}

/// Emit event: a skill failed and the loop moved on (warning level).
pub fn emit_skill_failed(role: &str, skill: &str, error: &dyn std::fmt::Display) {
    warn!(event = "skill.failed", role = %role, skill = %skill, error = %error);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_span_create() {
        let span = session_span("test-session-id");
        let _guard = span.enter();
        emit_state_transition("idle", "parsing_request");
    }
}
