//! In-memory fakes for the collaborator traits
//!
//! Provides `StaticDiscovery`, `FailingDiscovery`, `InMemoryKnowledgeBase`,
//! `TemplateGenerator` and `ScriptedGenerator`. They satisfy the trait
//! contracts without any network access and are deterministic, which makes
//! them usable both in tests and for offline CLI runs.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::collaborators::{
    ArtifactGenerator, CollaboratorResult, DataDiscovery, DiscoveryReport, GenerationTask,
    KnowledgePattern, KnowledgeRetrieval, PromptContext, SchemaCatalog,
};
use crate::error::CollaboratorError;
use crate::orchestrator::scaffold::{scaffold_design, scaffold_implementation, scaffold_unit};
use crate::parser::render_files;
use crate::roles::AgentRole;

// ---------------------------------------------------------------------------
// StaticDiscovery
// ---------------------------------------------------------------------------

/// Discovery that always answers with the same report.
#[derive(Debug, Clone)]
pub struct StaticDiscovery {
    report: DiscoveryReport,
}

impl StaticDiscovery {
    pub fn new() -> Self {
        Self {
            report: DiscoveryReport {
                sources: Vec::new(),
                record_counts: BTreeMap::new(),
                schema: SchemaCatalog::default(),
                confidence: 1.0,
                rationale: "static catalog".to_string(),
            },
        }
    }

    pub fn from_report(report: DiscoveryReport) -> Self {
        Self { report }
    }

    /// Add a source with its record count and schema fields.
    pub fn with_source(mut self, name: &str, records: u64, fields: &[&str]) -> Self {
        if !self.report.sources.iter().any(|s| s == name) {
            self.report.sources.push(name.to_string());
        }
        self.report.record_counts.insert(name.to_string(), records);
        self.report.schema = std::mem::take(&mut self.report.schema).with_source(name, fields);
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.report.confidence = confidence;
        self
    }
}

impl Default for StaticDiscovery {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DataDiscovery for StaticDiscovery {
    async fn discover(&self, _query: &str) -> CollaboratorResult<DiscoveryReport> {
        Ok(self.report.clone())
    }
}

// ---------------------------------------------------------------------------
// FailingDiscovery
// ---------------------------------------------------------------------------

/// Discovery that fails a fixed number of times before delegating.
pub struct FailingDiscovery {
    inner: Option<Arc<dyn DataDiscovery>>,
    failures_left: AtomicU32,
    error: CollaboratorError,
    calls: AtomicU32,
}

impl FailingDiscovery {
    /// Fail the first `failures` calls with a transient error, then delegate.
    pub fn transient(inner: Arc<dyn DataDiscovery>, failures: u32) -> Self {
        Self {
            inner: Some(inner),
            failures_left: AtomicU32::new(failures),
            error: CollaboratorError::Unavailable {
                collaborator: "discovery",
                reason: "service temporarily down".to_string(),
            },
            calls: AtomicU32::new(0),
        }
    }

    /// Fail every call with `error`.
    pub fn always(error: CollaboratorError) -> Self {
        Self {
            inner: None,
            failures_left: AtomicU32::new(u32::MAX),
            error,
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DataDiscovery for FailingDiscovery {
    async fn discover(&self, query: &str) -> CollaboratorResult<DiscoveryReport> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        match (&self.inner, failing) {
            (Some(inner), false) => inner.discover(query).await,
            _ => Err(self.error.clone()),
        }
    }
}

// ---------------------------------------------------------------------------
// InMemoryKnowledgeBase
// ---------------------------------------------------------------------------

/// Knowledge store ranking patterns by word overlap with the query.
#[derive(Debug, Default)]
pub struct InMemoryKnowledgeBase {
    patterns: Vec<KnowledgePattern>,
    error: Option<CollaboratorError>,
}

impl InMemoryKnowledgeBase {
    pub fn new(patterns: Vec<KnowledgePattern>) -> Self {
        Self {
            patterns,
            error: None,
        }
    }

    /// Patterns from a JSON array of [`KnowledgePattern`]s.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        Ok(Self::new(serde_json::from_str(json)?))
    }

    /// A store whose every query fails.
    pub fn unavailable(reason: &str) -> Self {
        Self {
            patterns: Vec::new(),
            error: Some(CollaboratorError::Unavailable {
                collaborator: "knowledge",
                reason: reason.to_string(),
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

fn tokens(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| w.len() > 2)
        .map(|w| w.to_ascii_lowercase())
        .collect()
}

#[async_trait]
impl KnowledgeRetrieval for InMemoryKnowledgeBase {
    async fn query(
        &self,
        text: &str,
        category: Option<&str>,
        top_k: usize,
    ) -> CollaboratorResult<Vec<KnowledgePattern>> {
        if let Some(err) = &self.error {
            return Err(err.clone());
        }
        let query = tokens(text);
        let mut scored: Vec<(usize, &KnowledgePattern)> = self
            .patterns
            .iter()
            .filter(|p| category.map_or(true, |c| p.category.as_deref() == Some(c)))
            .map(|p| {
                let body = tokens(&format!("{} {}", p.title, p.summary));
                let score = query.iter().filter(|w| body.contains(w)).count();
                (score, p)
            })
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.id.cmp(&b.1.id)));
        Ok(scored
            .into_iter()
            .take(top_k)
            .map(|(_, p)| p.clone())
            .collect())
    }
}

// ---------------------------------------------------------------------------
// TemplateGenerator
// ---------------------------------------------------------------------------

/// Offline generator producing scaffold artifacts from the prompt context.
#[derive(Debug, Default)]
pub struct TemplateGenerator {
    calls: AtomicU32,
}

impl TemplateGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ArtifactGenerator for TemplateGenerator {
    async fn generate(&self, prompt: &PromptContext) -> CollaboratorResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match prompt.role {
            AgentRole::Design => Ok(scaffold_design(
                &prompt.request,
                prompt.task_type,
                &prompt.scope,
                &prompt.schema,
                &prompt.knowledge,
            )
            .raw),
            AgentRole::Implementation => {
                let design = prompt.design.as_ref().ok_or_else(|| {
                    CollaboratorError::InvalidResponse {
                        collaborator: "generator",
                        reason: "implementation requested without a design".to_string(),
                    }
                })?;
                let files = match &prompt.task {
                    GenerationTask::Component { name } => {
                        let component = design.component(name).ok_or_else(|| {
                            CollaboratorError::InvalidResponse {
                                collaborator: "generator",
                                reason: format!("design has no component {name}"),
                            }
                        })?;
                        BTreeMap::from([(
                            crate::artifact::unit_path(name, prompt.output_format.extension()),
                            scaffold_unit(component, prompt.output_format, &prompt.schema),
                        )])
                    }
                    _ => scaffold_implementation(design, prompt.output_format, &prompt.schema),
                };
                Ok(render_files(&files))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// ScriptedGenerator
// ---------------------------------------------------------------------------

/// Generator replaying a queue of canned responses, then delegating to an
/// optional fallback. Records every prompt it receives.
#[derive(Default)]
pub struct ScriptedGenerator {
    script: Mutex<VecDeque<CollaboratorResult<String>>>,
    fallback: Option<Arc<dyn ArtifactGenerator>>,
    prompts: Mutex<Vec<PromptContext>>,
}

impl ScriptedGenerator {
    pub fn new(script: Vec<CollaboratorResult<String>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Delegate to `fallback` once the script is exhausted.
    pub fn with_fallback(mut self, fallback: Arc<dyn ArtifactGenerator>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Every prompt received so far, in call order.
    pub fn prompts(&self) -> Vec<PromptContext> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn remaining(&self) -> usize {
        self.script.lock().unwrap().len()
    }
}

#[async_trait]
impl ArtifactGenerator for ScriptedGenerator {
    async fn generate(&self, prompt: &PromptContext) -> CollaboratorResult<String> {
        self.prompts.lock().unwrap().push(prompt.clone());
        let next = self.script.lock().unwrap().pop_front();
        match (next, &self.fallback) {
            (Some(response), _) => response,
            (None, Some(fallback)) => fallback.generate(prompt).await,
            (None, None) => Err(CollaboratorError::InvalidResponse {
                collaborator: "generator",
                reason: "script exhausted".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::Guidance;
    use crate::context::{OutputFormat, TaskType};
    use crate::parser::{parse_design, parse_files};

    fn prompt(role: AgentRole) -> PromptContext {
        PromptContext {
            role,
            task: GenerationTask::Initial,
            request: "Frac water dashboard".to_string(),
            intent_tag: "frac-water-dashboard".to_string(),
            task_type: TaskType::Dashboard,
            output_format: OutputFormat::Tsx,
            scope: vec!["fracfocus".to_string()],
            schema: SchemaCatalog::default().with_source("fracfocus", &["state"]),
            knowledge: vec![],
            design: None,
            current: None,
            conflicts: vec![],
            issues: vec![],
        }
    }

    #[tokio::test]
    async fn test_failing_discovery_recovers_after_budget() {
        let inner = Arc::new(StaticDiscovery::new().with_source("rrc", 3, &["lease_name"]));
        let d = FailingDiscovery::transient(inner, 2);
        assert!(d.discover("q").await.is_err());
        assert!(d.discover("q").await.is_err());
        let report = d.discover("q").await.unwrap();
        assert_eq!(report.sources, vec!["rrc"]);
        assert_eq!(d.calls(), 3);
    }

    #[tokio::test]
    async fn test_knowledge_ranks_and_filters() {
        let p = |id: &str, cat: &str, title: &str| KnowledgePattern {
            id: id.to_string(),
            category: Some(cat.to_string()),
            title: title.to_string(),
            summary: String::new(),
            guidance: vec![Guidance::AvoidToken {
                token: "x".to_string(),
                reason: "r".to_string(),
            }],
        };
        let kb = InMemoryKnowledgeBase::new(vec![
            p("a", "viz", "Pie charts"),
            p("b", "viz", "Water volume by state charts"),
            p("c", "data", "Water volume units"),
        ]);
        let all = kb.query("water volume by state", None, 2).await.unwrap();
        assert_eq!(all.iter().map(|p| p.id.as_str()).collect::<Vec<_>>(), vec!["b", "c"]);
        let viz = kb.query("water", Some("viz"), 5).await.unwrap();
        assert_eq!(viz.len(), 2);
        assert!(InMemoryKnowledgeBase::unavailable("down")
            .query("x", None, 1)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_template_generator_outputs_parse() {
        let gen = TemplateGenerator::new();
        let design_text = gen.generate(&prompt(AgentRole::Design)).await.unwrap();
        let design = parse_design(&design_text).unwrap();
        assert!(!design.components.is_empty());

        let mut impl_prompt = prompt(AgentRole::Implementation);
        impl_prompt.design = Some(design.clone());
        let files = parse_files(&gen.generate(&impl_prompt).await.unwrap());
        assert_eq!(files.len(), design.components.len());

        impl_prompt.task = GenerationTask::Component {
            name: design.components[0].name.clone(),
        };
        assert_eq!(parse_files(&gen.generate(&impl_prompt).await.unwrap()).len(), 1);
        assert_eq!(gen.calls(), 3);
    }

    #[tokio::test]
    async fn test_scripted_generator_replays_then_falls_back() {
        let gen = ScriptedGenerator::new(vec![Err(CollaboratorError::Timeout {
            collaborator: "generator",
            after_ms: 10,
        })])
        .with_fallback(Arc::new(TemplateGenerator::new()));
        assert!(gen.generate(&prompt(AgentRole::Design)).await.is_err());
        assert!(gen.generate(&prompt(AgentRole::Design)).await.is_ok());
        assert_eq!(gen.prompts().len(), 2);
        assert_eq!(gen.remaining(), 0);
    }
}
