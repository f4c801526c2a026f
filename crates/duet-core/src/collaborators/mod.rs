//! External collaborators consumed by the core.
//!
//! These traits are the only seams through which the core reaches the outside
//! world. They are async and backend-agnostic; the core awaits them one at a
//! time. Deterministic in-memory implementations live in [`crate::fakes`];
//! an OpenAI-compatible generator lives in [`http`].

pub mod http;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::artifact::{ComponentKind, DesignSpec};
use crate::context::{OutputFormat, TaskType};
use crate::error::CollaboratorError;
use crate::roles::AgentRole;

/// Result type for collaborator calls.
pub type CollaboratorResult<T> = std::result::Result<T, CollaboratorError>;

// ---------------------------------------------------------------------------
// Data discovery
// ---------------------------------------------------------------------------

/// Field names available in each data source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaCatalog {
    pub sources: BTreeMap<String, BTreeSet<String>>,
}

impl SchemaCatalog {
    pub fn with_source(mut self, source: &str, fields: &[&str]) -> Self {
        self.sources.insert(
            source.to_string(),
            fields.iter().map(|f| f.to_string()).collect(),
        );
        self
    }

    pub fn fields(&self, source: &str) -> Option<&BTreeSet<String>> {
        self.sources.get(source)
    }

    pub fn has_field(&self, source: &str, field: &str) -> bool {
        self.sources
            .get(source)
            .map(|fields| fields.contains(field))
            .unwrap_or(false)
    }

    /// Catalog restricted to the given sources.
    pub fn restricted_to(&self, scope: &BTreeSet<String>) -> SchemaCatalog {
        SchemaCatalog {
            sources: self
                .sources
                .iter()
                .filter(|(k, _)| scope.contains(*k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }
}

/// What a discovery pass found for a query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryReport {
    pub sources: Vec<String>,
    pub record_counts: BTreeMap<String, u64>,
    #[serde(default)]
    pub schema: SchemaCatalog,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default)]
    pub rationale: String,
}

fn default_confidence() -> f64 {
    1.0
}

/// Upstream data provider.
#[async_trait]
pub trait DataDiscovery: Send + Sync {
    async fn discover(&self, query: &str) -> CollaboratorResult<DiscoveryReport>;
}

// ---------------------------------------------------------------------------
// Knowledge retrieval
// ---------------------------------------------------------------------------

/// Structured guidance a knowledge pattern carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum Guidance {
    /// Components of `kind` should not be used, optionally only when they
    /// show `when_field`.
    AvoidKind {
        kind: ComponentKind,
        #[serde(default)]
        when_field: Option<String>,
        reason: String,
    },
    /// Implementation content must not contain `token`.
    AvoidToken { token: String, reason: String },
}

/// One retrieved domain-knowledge pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgePattern {
    pub id: String,
    #[serde(default)]
    pub category: Option<String>,
    pub title: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub guidance: Vec<Guidance>,
}

/// Domain-knowledge store (vector search or otherwise).
#[async_trait]
pub trait KnowledgeRetrieval: Send + Sync {
    async fn query(
        &self,
        text: &str,
        category: Option<&str>,
        top_k: usize,
    ) -> CollaboratorResult<Vec<KnowledgePattern>>;
}

// ---------------------------------------------------------------------------
// Artifact generation
// ---------------------------------------------------------------------------

/// What a generation call is asked to produce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "task", rename_all = "snake_case")]
pub enum GenerationTask {
    /// A complete first artifact.
    Initial,
    /// A complete artifact that clears the listed conflicts.
    ResolveConflicts,
    /// A complete artifact with the named defect fixed.
    Fix { defect: String },
    /// A single implementation unit for one design component.
    Component { name: String },
}

/// Everything a generator needs for one call. Rendering it into prompt text
/// is the generator's business.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptContext {
    pub role: AgentRole,
    pub task: GenerationTask,
    pub request: String,
    pub intent_tag: String,
    pub task_type: TaskType,
    pub output_format: OutputFormat,
    pub scope: Vec<String>,
    pub schema: SchemaCatalog,
    pub knowledge: Vec<KnowledgePattern>,
    pub design: Option<DesignSpec>,
    /// Serialized current artifact of this role, if one exists.
    pub current: Option<String>,
    pub conflicts: Vec<String>,
    pub issues: Vec<String>,
}

impl PromptContext {
    /// Plain-text rendering for text-completion backends.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "role: {}\ntask: {}\nrequest: {}\ntask_type: {}\noutput_format: {}\nscope: {}\n",
            self.role,
            serde_json::to_string(&self.task).unwrap_or_default(),
            self.request,
            self.task_type,
            self.output_format,
            self.scope.join(", ")
        ));
        for (source, fields) in &self.schema.sources {
            let fields: Vec<&str> = fields.iter().map(String::as_str).collect();
            out.push_str(&format!("schema {source}: {}\n", fields.join(", ")));
        }
        for pattern in &self.knowledge {
            out.push_str(&format!("knowledge {}: {}\n", pattern.title, pattern.summary));
        }
        if let Some(design) = &self.design {
            out.push_str("design:\n");
            out.push_str(&design.render());
        }
        if let Some(current) = &self.current {
            out.push_str("current:\n");
            out.push_str(current);
            out.push('\n');
        }
        for conflict in &self.conflicts {
            out.push_str(&format!("conflict: {conflict}\n"));
        }
        for issue in &self.issues {
            out.push_str(&format!("issue: {issue}\n"));
        }
        out
    }
}

/// Artifact content producer (typically an LLM call).
#[async_trait]
pub trait ArtifactGenerator: Send + Sync {
    async fn generate(&self, prompt: &PromptContext) -> CollaboratorResult<String>;
}

/// The set of collaborators a session runs against.
#[derive(Clone)]
pub struct Collaborators {
    pub discovery: Arc<dyn DataDiscovery>,
    pub knowledge: Arc<dyn KnowledgeRetrieval>,
    pub generator: Arc<dyn ArtifactGenerator>,
}

impl Collaborators {
    pub fn new(
        discovery: Arc<dyn DataDiscovery>,
        knowledge: Arc<dyn KnowledgeRetrieval>,
        generator: Arc<dyn ArtifactGenerator>,
    ) -> Self {
        Self {
            discovery,
            knowledge,
            generator,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_catalog_restriction() {
        let catalog = SchemaCatalog::default()
            .with_source("fracfocus", &["api_number", "total_base_water_volume"])
            .with_source("rrc", &["lease_name"]);
        let scope = BTreeSet::from(["rrc".to_string()]);
        let restricted = catalog.restricted_to(&scope);
        assert!(restricted.has_field("rrc", "lease_name"));
        assert!(restricted.fields("fracfocus").is_none());
    }

    #[test]
    fn test_guidance_deserializes_from_tagged_json() {
        let json = r#"{"rule":"avoid_kind","kind":"pie_chart","reason":"hard to compare"}"#;
        let g: Guidance = serde_json::from_str(json).unwrap();
        assert_eq!(
            g,
            Guidance::AvoidKind {
                kind: ComponentKind::PieChart,
                when_field: None,
                reason: "hard to compare".to_string(),
            }
        );
    }

    #[test]
    fn test_discovery_report_defaults() {
        let json = r#"{"sources":["rrc"],"record_counts":{"rrc":3}}"#;
        let report: DiscoveryReport = serde_json::from_str(json).unwrap();
        assert_eq!(report.confidence, 1.0);
        assert!(report.schema.sources.is_empty());
    }
}
