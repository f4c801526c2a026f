//! Request context validation and shared session memory contracts.

use std::collections::BTreeMap;
use std::sync::Arc;

use duet_core::{
    AgentRole, ArtifactSlot, ComponentKind, ComponentSpec, Conflict, ConflictKind, DesignSpec,
    DuetEvent, EventSink, OutputFormat, RequestContext, Requirements, Severity,
    SharedSessionMemory, TaskType, ValidationError,
};

fn counts() -> Vec<(String, u64)> {
    vec![("fracfocus".to_string(), 1200), ("rrc".to_string(), 800)]
}

fn build(requirements: Requirements, text: &str) -> Result<RequestContext, ValidationError> {
    RequestContext::build(
        &requirements,
        ["fracfocus", "rrc"],
        counts(),
        text,
        TaskType::Dashboard,
        OutputFormat::Tsx,
    )
}

fn design(names: &[&str]) -> DesignSpec {
    let mut d = DesignSpec {
        title: "Water".to_string(),
        summary: "water use".to_string(),
        components: names
            .iter()
            .map(|n| ComponentSpec::new(n, ComponentKind::Table).with_source("fracfocus"))
            .collect(),
        raw: String::new(),
    };
    d.raw = d.render();
    d
}

#[test]
fn context_carries_discovery_intent_and_execution() {
    let ctx = build(
        Requirements::new(["fracfocus"]).with_confidence(0.8),
        "  Frac water dashboard ",
    )
    .unwrap();

    assert_eq!(ctx.discovery().sources.len(), 2);
    assert_eq!(ctx.discovery().confidence, 0.8);
    assert_eq!(ctx.intent().original_request, "Frac water dashboard");
    assert!(!ctx.intent().intent_tag.is_empty());
    assert!(ctx.in_scope("fracfocus"));
    assert!(!ctx.in_scope("rrc"));
    assert_eq!(ctx.scoped_record_count("fracfocus"), Some(1200));
    assert_eq!(ctx.scoped_record_count("rrc"), None);
    assert_eq!(ctx.execution().max_iterations, 5);
}

#[test]
fn context_rejects_scope_outside_discovery() {
    let err = build(Requirements::new(["usgs"]), "dashboard").unwrap_err();
    assert_eq!(err, ValidationError::ScopeOutsideDiscovery("usgs".to_string()));
}

#[test]
fn context_rejects_bad_confidence_and_blank_intent() {
    let err = build(
        Requirements::new(["rrc"]).with_confidence(1.2),
        "dashboard",
    )
    .unwrap_err();
    assert!(matches!(err, ValidationError::ConfidenceOutOfRange(_)));

    let err = build(Requirements::new(["rrc"]), "   ").unwrap_err();
    assert_eq!(err, ValidationError::EmptyIntent);
}

#[test]
fn context_rejects_counts_without_sources() {
    let err = RequestContext::build(
        &Requirements::new(["rrc"]),
        ["rrc"],
        counts(),
        "dashboard",
        TaskType::Dashboard,
        OutputFormat::Markdown,
    )
    .unwrap_err();
    assert_eq!(err, ValidationError::CountWithoutSource("fracfocus".to_string()));
}

#[test]
fn memory_versions_are_monotonic_and_history_is_kept() {
    let ctx = Arc::new(build(Requirements::new(["fracfocus"]), "dashboard").unwrap());
    let mut memory = SharedSessionMemory::new(ctx);

    assert_eq!(memory.design_version(), 0);
    assert!(memory.design().is_none());

    assert_eq!(memory.update_design(design(&["a"]), "initial"), 1);
    assert_eq!(memory.update_design(design(&["a", "b"]), "grow"), 2);
    assert_eq!(memory.design().unwrap().components.len(), 2);

    let history = memory.design_history();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].reason, "initial");
    assert_eq!(history[0].value.components.len(), 1);
    assert_ne!(history[0].digest, history[1].digest);

    let files = BTreeMap::from([("components/a.md".to_string(), "# a".to_string())]);
    assert_eq!(memory.update_implementation(files.clone(), "first"), 1);
    assert_eq!(memory.update_implementation(files, "same content"), 2);
    let imp = memory.implementation_history();
    assert_eq!(imp[0].digest, imp[1].digest);
}

#[test]
fn memory_conflicts_resolve_by_equality() {
    let ctx = Arc::new(build(Requirements::new(["fracfocus"]), "dashboard").unwrap());
    let mut memory = SharedSessionMemory::new(ctx);

    let high = Conflict::new(
        ConflictKind::MissingArtifact,
        Severity::High,
        AgentRole::Implementation,
        "well_map",
        "no unit",
    );
    let warning = Conflict::new(
        ConflictKind::SchemaMismatch,
        Severity::Warning,
        AgentRole::Design,
        "well_map.depth",
        "unknown field",
    );
    memory.update_conflicts(vec![high.clone(), warning.clone(), high.clone()]);
    assert_eq!(memory.conflicts().len(), 2);
    assert_eq!(memory.high_severity_count(), 1);
    assert_eq!(memory.conflicts_for(AgentRole::Design), vec![warning]);
    assert!(memory
        .roles_with_high_conflicts()
        .contains(&AgentRole::Implementation));

    let version = memory.conflicts_version();
    assert!(memory.resolve_conflict(&high));
    assert_eq!(memory.conflicts_version(), version + 1);
    assert!(!memory.resolve_conflict(&high));
    assert_eq!(memory.conflicts_version(), version + 1);
    assert_eq!(memory.high_severity_count(), 0);
}

#[test]
fn memory_publishes_artifact_events() {
    let ctx = Arc::new(build(Requirements::new(["fracfocus"]), "dashboard").unwrap());
    let (sink, mut rx) = EventSink::channel();
    let mut memory = SharedSessionMemory::new(ctx).with_events(sink);

    memory.update_design(design(&["a"]), "initial");

    match rx.try_recv().unwrap() {
        DuetEvent::ArtifactPublished {
            slot,
            version,
            reason,
        } => {
            assert_eq!(slot, ArtifactSlot::Design);
            assert_eq!(version, 1);
            assert_eq!(reason, "initial");
        }
        other => panic!("unexpected event {other:?}"),
    }
}
