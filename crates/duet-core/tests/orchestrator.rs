//! End-to-end sessions over the in-memory collaborators.
//!
//! Covers the happy path, each recovery action, validation aborts, and the
//! negotiation bound.

use std::sync::Arc;

use duet_core::fakes::{
    FailingDiscovery, InMemoryKnowledgeBase, ScriptedGenerator, StaticDiscovery, TemplateGenerator,
};
use duet_core::{
    run_session, AgentRole, CollaboratorError, Collaborators, DataDiscovery, DuetConfig,
    DuetError, DuetEvent, EventSink, Guidance, KnowledgePattern, Orchestrator, OutputFormat,
    SessionOutcome, SessionRequest, SessionState,
};

fn discovery() -> StaticDiscovery {
    StaticDiscovery::new()
        .with_source(
            "fracfocus",
            1200,
            &["state", "total_base_water_volume", "operator_name"],
        )
        .with_source("rrc", 800, &["lease_name", "county"])
}

fn collaborators(discovery: Arc<dyn DataDiscovery>) -> Collaborators {
    Collaborators::new(
        discovery,
        Arc::new(InMemoryKnowledgeBase::default()),
        Arc::new(TemplateGenerator::new()),
    )
}

fn states(report_transitions: &[duet_core::orchestrator::Transition]) -> Vec<SessionState> {
    report_transitions.iter().map(|t| t.to).collect()
}

#[tokio::test]
async fn session_completes_without_conflicts() {
    let request = SessionRequest::new("Build a react dashboard of fracfocus water volumes");
    let report = run_session(
        &request,
        collaborators(Arc::new(discovery())),
        DuetConfig::default(),
    )
    .await
    .unwrap();

    assert_eq!(report.outcome, SessionOutcome::Completed);
    assert_eq!(report.output_format, OutputFormat::Tsx);
    assert_eq!(report.scope, vec!["fracfocus"]);
    assert_eq!(report.negotiation_cycles, 0);
    assert_eq!(report.high_severity_count(), 0);
    assert_eq!(report.design_version, 1);
    assert_eq!(report.implementation_version, 1);
    assert_eq!(report.loops.len(), 2);
    assert!(report.loops.iter().all(|l| l.satisfied));
    assert!(!report.traces[&AgentRole::Design].is_empty());
    assert_eq!(
        states(&report.transitions).last(),
        Some(&SessionState::Completed)
    );
}

#[tokio::test]
async fn transient_discovery_failures_are_retried() {
    let failing = Arc::new(FailingDiscovery::transient(Arc::new(discovery()), 2));
    let request = SessionRequest::new("fracfocus dashboard");
    let report = run_session(&request, collaborators(failing.clone()), DuetConfig::default())
        .await
        .unwrap();

    assert_eq!(failing.calls(), 3);
    assert!(report.fallbacks.is_empty());
    assert_eq!(report.outcome, SessionOutcome::Completed);

    let seen = states(&report.transitions);
    let errors = seen.iter().filter(|s| **s == SessionState::Error).count();
    assert_eq!(errors, 2);
    let rediscoveries = seen
        .iter()
        .filter(|s| **s == SessionState::DiscoveringData)
        .count();
    assert_eq!(rediscoveries, 3);
}

#[tokio::test]
async fn exhausted_retries_fall_back_to_source_hints() {
    let failing = Arc::new(FailingDiscovery::always(CollaboratorError::Timeout {
        collaborator: "discovery",
        after_ms: 5_000,
    }));
    let request = SessionRequest::new("well report").with_source("wells", 40);
    let report = run_session(&request, collaborators(failing.clone()), DuetConfig::default())
        .await
        .unwrap();

    assert_eq!(failing.calls(), 3);
    assert_eq!(report.fallbacks, vec![SessionState::DiscoveringData]);
    assert_eq!(report.scope, vec!["wells"]);
    assert!(report.warnings.iter().any(|w| w.contains("discovering_data")));
    assert_eq!(report.outcome, SessionOutcome::Completed);
}

#[tokio::test]
async fn discovery_failure_without_hints_aborts() {
    let failing = Arc::new(FailingDiscovery::always(CollaboratorError::InvalidResponse {
        collaborator: "discovery",
        reason: "catalog corrupted".to_string(),
    }));
    let request = SessionRequest::new("fracfocus dashboard");
    let mut orchestrator = Orchestrator::new(collaborators(failing.clone()), DuetConfig::default());

    let err = orchestrator.run(&request).await.unwrap_err();

    match err {
        DuetError::SessionAborted { state, cause } => {
            assert_eq!(state, SessionState::DiscoveringData);
            assert!(cause.contains("catalog corrupted"));
        }
        other => panic!("unexpected error {other}"),
    }
    assert_eq!(failing.calls(), 1);
    assert_eq!(orchestrator.state(), SessionState::Error);
}

#[tokio::test]
async fn scope_outside_discovery_aborts_while_building_the_session() {
    let request = SessionRequest::new("usgs dashboard").with_scope("usgs");
    let err = run_session(
        &request,
        collaborators(Arc::new(discovery())),
        DuetConfig::default(),
    )
    .await
    .unwrap_err();

    match err {
        DuetError::SessionAborted { state, cause } => {
            assert_eq!(state, SessionState::BuildingSession);
            assert!(cause.contains("usgs"));
        }
        other => panic!("unexpected error {other}"),
    }
}

#[tokio::test]
async fn unusable_generator_output_falls_back_to_scaffolds() {
    let garbage = Arc::new(ScriptedGenerator::new(vec![
        Ok("I cannot help with that.".to_string()),
        Ok("".to_string()),
    ]));
    let collaborators = Collaborators::new(
        Arc::new(discovery()),
        Arc::new(InMemoryKnowledgeBase::default()),
        garbage.clone(),
    );
    let request = SessionRequest::new("rrc lease report in html");
    let report = run_session(&request, collaborators, DuetConfig::default())
        .await
        .unwrap();

    assert_eq!(
        report.fallbacks,
        vec![SessionState::Designing, SessionState::GeneratingImplementation]
    );
    let design = report.design.as_ref().unwrap();
    assert!(!design.components.is_empty());
    for c in &design.components {
        assert!(report.implementation.has_unit(&c.name));
    }
    assert!(report
        .implementation
        .files
        .keys()
        .all(|p| p.ends_with(".html")));
    assert_eq!(report.outcome, SessionOutcome::Completed);
}

#[tokio::test]
async fn negotiation_stops_at_the_cycle_bound() {
    let knowledge = InMemoryKnowledgeBase::new(vec![KnowledgePattern {
        id: "kp-1".to_string(),
        category: None,
        title: "No field accessor".to_string(),
        summary: "Field access helpers are deprecated.".to_string(),
        guidance: vec![Guidance::AvoidToken {
            token: "field(".to_string(),
            reason: "deprecated helper".to_string(),
        }],
    }]);
    let collaborators = Collaborators::new(
        Arc::new(discovery()),
        Arc::new(knowledge),
        Arc::new(TemplateGenerator::new()),
    );
    let config = DuetConfig {
        max_negotiation_cycles: 3,
        ..DuetConfig::default()
    };
    let (events, mut rx) = EventSink::channel();
    let mut orchestrator = Orchestrator::new(collaborators, config).with_events(events);

    let report = orchestrator
        .run(&SessionRequest::new("fracfocus dashboard"))
        .await
        .unwrap();

    assert_eq!(report.outcome, SessionOutcome::CompletedWithOpenConflicts);
    assert_eq!(report.negotiation_cycles, 3);
    assert!(report.high_severity_count() > 0);
    assert!(report
        .conflicts
        .iter()
        .all(|c| c.source_role == AgentRole::Implementation));

    let mut detections = 0;
    while let Ok(event) = rx.try_recv() {
        if matches!(event, DuetEvent::ConflictsDetected { .. }) {
            detections += 1;
        }
    }
    assert_eq!(detections, 4);
}

#[tokio::test]
async fn negotiation_is_skipped_when_validation_is_disabled() {
    let knowledge = InMemoryKnowledgeBase::new(vec![KnowledgePattern {
        id: "kp-1".to_string(),
        category: None,
        title: "No field accessor".to_string(),
        summary: String::new(),
        guidance: vec![Guidance::AvoidToken {
            token: "field(".to_string(),
            reason: "deprecated helper".to_string(),
        }],
    }]);
    let collaborators = Collaborators::new(
        Arc::new(discovery()),
        Arc::new(knowledge),
        Arc::new(TemplateGenerator::new()),
    );
    let config = DuetConfig {
        validation_required: false,
        ..DuetConfig::default()
    };

    let report = run_session(&SessionRequest::new("fracfocus dashboard"), collaborators, config)
        .await
        .unwrap();

    assert_eq!(report.negotiation_cycles, 0);
    assert_eq!(report.outcome, SessionOutcome::CompletedWithOpenConflicts);
}

#[tokio::test]
async fn knowledge_outage_is_only_a_warning() {
    let collaborators = Collaborators::new(
        Arc::new(discovery()),
        Arc::new(InMemoryKnowledgeBase::unavailable("index rebuilding")),
        Arc::new(TemplateGenerator::new()),
    );
    let report = run_session(
        &SessionRequest::new("fracfocus dashboard"),
        collaborators,
        DuetConfig::default(),
    )
    .await
    .unwrap();

    assert!(report.fallbacks.is_empty());
    assert!(report.warnings.iter().any(|w| w.contains("index rebuilding")));
    assert_eq!(report.outcome, SessionOutcome::Completed);
}

#[tokio::test]
async fn orchestrator_can_run_sessions_back_to_back() {
    let mut orchestrator = Orchestrator::new(
        collaborators(Arc::new(discovery())),
        DuetConfig::default(),
    );
    let first = orchestrator
        .run(&SessionRequest::new("fracfocus dashboard"))
        .await
        .unwrap();
    let second = orchestrator
        .run(&SessionRequest::new("rrc report"))
        .await
        .unwrap();

    assert_ne!(first.session_id, second.session_id);
    assert_eq!(second.scope, vec!["rrc"]);
    assert_eq!(
        orchestrator.transitions().first().map(|t| t.from),
        Some(SessionState::Idle)
    );
}

#[tokio::test]
async fn empty_scoped_source_is_reported() {
    let discovery = StaticDiscovery::new().with_source("fracfocus", 0, &["state", "operator_name"]);
    let request = SessionRequest::new("fracfocus dashboard");
    let report = run_session(&request, collaborators(Arc::new(discovery)), DuetConfig::default())
        .await
        .unwrap();

    assert_eq!(report.scope, vec!["fracfocus"]);
    assert!(report
        .warnings
        .iter()
        .any(|w| w == "scoped source fracfocus has no records"));
}
