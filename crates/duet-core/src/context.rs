//! Context protocol: the validated, immutable request descriptor handed to
//! every agent.
//!
//! A [`RequestContext`] is built exactly once per session by the orchestrator.
//! All cross-field invariants are checked in [`RequestContext::build`]; once a
//! value exists it is known to satisfy `scope ⊆ discovery.sources` and the
//! count/source bijection, so downstream code never re-validates.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// What kind of artifact the request asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Dashboard,
    Analysis,
    Report,
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskType::Dashboard => "dashboard",
            TaskType::Analysis => "analysis",
            TaskType::Report => "report",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for TaskType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dashboard" => Ok(TaskType::Dashboard),
            "analysis" => Ok(TaskType::Analysis),
            "report" => Ok(TaskType::Report),
            other => Err(format!("unknown task type: {other}")),
        }
    }
}

/// Output format of the implementation artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    Markdown,
    Json,
    Html,
    Tsx,
}

impl OutputFormat {
    /// File extension used for implementation units in this format.
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Markdown => "md",
            OutputFormat::Json => "json",
            OutputFormat::Html => "html",
            OutputFormat::Tsx => "tsx",
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OutputFormat::Markdown => "markdown",
            OutputFormat::Json => "json",
            OutputFormat::Html => "html",
            OutputFormat::Tsx => "tsx",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            "json" => Ok(OutputFormat::Json),
            "html" => Ok(OutputFormat::Html),
            "tsx" | "react" => Ok(OutputFormat::Tsx),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}

/// Discovered data sources and how much data each holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Discovery {
    pub sources: BTreeSet<String>,
    pub record_counts: BTreeMap<String, u64>,
    pub confidence: f64,
    pub rationale: String,
}

/// The parsed user intent, including the authorized scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    pub original_request: String,
    pub intent_tag: String,
    pub task_type: TaskType,
    pub output_format: OutputFormat,
    /// Subset of `Discovery::sources` the agents may reference.
    pub scope: BTreeSet<String>,
}

/// Execution knobs for the planning loops.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Execution {
    pub max_iterations: u32,
    pub validation_required: bool,
    pub trace_reasoning: bool,
}

impl Default for Execution {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            validation_required: true,
            trace_reasoning: true,
        }
    }
}

/// Caller-side requirements that are not produced by discovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Requirements {
    pub scope: BTreeSet<String>,
    pub confidence: f64,
    pub rationale: String,
    pub execution: Execution,
}

impl Requirements {
    pub fn new<I, S>(scope: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            scope: scope.into_iter().map(Into::into).collect(),
            confidence: 1.0,
            rationale: String::new(),
            execution: Execution::default(),
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_rationale(mut self, rationale: &str) -> Self {
        self.rationale = rationale.into();
        self
    }

    pub fn with_execution(mut self, execution: Execution) -> Self {
        self.execution = execution;
        self
    }
}

/// Immutable request descriptor passed to every agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestContext {
    discovery: Discovery,
    intent: Intent,
    execution: Execution,
}

impl RequestContext {
    /// Validate and construct a context.
    ///
    /// Fails when confidence is outside `[0, 1]`, no source was discovered,
    /// counts and sources disagree in either direction, scope is empty or
    /// names an undiscovered source, `max_iterations` is zero, or the intent
    /// text is blank.
    pub fn build<S, C>(
        requirements: &Requirements,
        discovered_sources: S,
        record_counts: C,
        intent_text: &str,
        task_type: TaskType,
        output_format: OutputFormat,
    ) -> Result<Self, ValidationError>
    where
        S: IntoIterator,
        S::Item: Into<String>,
        C: IntoIterator<Item = (String, u64)>,
    {
        let confidence = requirements.confidence;
        if !(0.0..=1.0).contains(&confidence) {
            return Err(ValidationError::ConfidenceOutOfRange(confidence));
        }

        let sources: BTreeSet<String> = discovered_sources.into_iter().map(Into::into).collect();
        if sources.is_empty() {
            return Err(ValidationError::NoSources);
        }

        let record_counts: BTreeMap<String, u64> = record_counts.into_iter().collect();
        if let Some(extra) = record_counts.keys().find(|k| !sources.contains(*k)) {
            return Err(ValidationError::CountWithoutSource(extra.clone()));
        }
        if let Some(uncounted) = sources.iter().find(|s| !record_counts.contains_key(*s)) {
            return Err(ValidationError::UncountedSource(uncounted.clone()));
        }

        if requirements.scope.is_empty() {
            return Err(ValidationError::EmptyScope);
        }
        if let Some(outside) = requirements.scope.iter().find(|s| !sources.contains(*s)) {
            return Err(ValidationError::ScopeOutsideDiscovery(outside.clone()));
        }

        if requirements.execution.max_iterations == 0 {
            return Err(ValidationError::ZeroIterations);
        }

        let original_request = intent_text.trim();
        if original_request.is_empty() {
            return Err(ValidationError::EmptyIntent);
        }

        Ok(Self {
            discovery: Discovery {
                sources,
                record_counts,
                confidence,
                rationale: requirements.rationale.clone(),
            },
            intent: Intent {
                original_request: original_request.to_string(),
                intent_tag: intent_tag(original_request),
                task_type,
                output_format,
                scope: requirements.scope.clone(),
            },
            execution: requirements.execution.clone(),
        })
    }

    pub fn discovery(&self) -> &Discovery {
        &self.discovery
    }

    pub fn intent(&self) -> &Intent {
        &self.intent
    }

    pub fn execution(&self) -> &Execution {
        &self.execution
    }

    pub fn scope(&self) -> &BTreeSet<String> {
        &self.intent.scope
    }

    pub fn in_scope(&self, source: &str) -> bool {
        self.intent.scope.contains(source)
    }

    /// Record count of a scoped source, `None` if the source is out of scope.
    pub fn scoped_record_count(&self, source: &str) -> Option<u64> {
        if !self.in_scope(source) {
            return None;
        }
        self.discovery.record_counts.get(source).copied()
    }
}

const STOPWORDS: &[&str] = &[
    "a", "an", "the", "of", "for", "to", "and", "with", "me", "please", "i", "want", "need", "on",
    "in", "from", "that", "show",
];

/// Normalized slug of the first meaningful words of a request.
fn intent_tag(text: &str) -> String {
    let words: Vec<String> = text
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_ascii_lowercase())
        .filter(|w| !STOPWORDS.contains(&w.as_str()))
        .take(4)
        .collect();
    if words.is_empty() {
        "general".to_string()
    } else {
        words.join("-")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(pairs: &[(&str, u64)]) -> Vec<(String, u64)> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn build(scope: &[&str]) -> Result<RequestContext, ValidationError> {
        RequestContext::build(
            &Requirements::new(scope.iter().copied()),
            ["fracfocus", "rrc"],
            counts(&[("fracfocus", 1000), ("rrc", 2000)]),
            "Build a dashboard of frac jobs",
            TaskType::Dashboard,
            OutputFormat::Tsx,
        )
    }

    #[test]
    fn test_scope_subset_of_discovery_succeeds() {
        let ctx = build(&["fracfocus"]).unwrap();
        assert!(ctx.scope().is_subset(&ctx.discovery().sources));
        assert!(ctx.in_scope("fracfocus"));
        assert!(!ctx.in_scope("rrc"));
    }

    #[test]
    fn test_scope_outside_discovery_fails() {
        let err = build(&["fracfocus", "usgs"]).unwrap_err();
        assert_eq!(err, ValidationError::ScopeOutsideDiscovery("usgs".to_string()));
    }

    #[test]
    fn test_empty_scope_fails() {
        assert_eq!(build(&[]).unwrap_err(), ValidationError::EmptyScope);
    }

    #[test]
    fn test_confidence_out_of_range_fails() {
        let req = Requirements::new(["rrc"]).with_confidence(1.2);
        let err = RequestContext::build(
            &req,
            ["rrc"],
            counts(&[("rrc", 1)]),
            "report",
            TaskType::Report,
            OutputFormat::Markdown,
        )
        .unwrap_err();
        assert_eq!(err, ValidationError::ConfidenceOutOfRange(1.2));

        let req = Requirements::new(["rrc"]).with_confidence(f64::NAN);
        let err = RequestContext::build(
            &req,
            ["rrc"],
            counts(&[("rrc", 1)]),
            "report",
            TaskType::Report,
            OutputFormat::Markdown,
        );
        assert!(matches!(err, Err(ValidationError::ConfidenceOutOfRange(_))));
    }

    #[test]
    fn test_empty_discovery_fails() {
        let err = RequestContext::build(
            &Requirements::new(["rrc"]),
            Vec::<String>::new(),
            Vec::new(),
            "report",
            TaskType::Report,
            OutputFormat::Markdown,
        )
        .unwrap_err();
        assert_eq!(err, ValidationError::NoSources);
    }

    #[test]
    fn test_count_source_mismatch_fails_both_ways() {
        let err = RequestContext::build(
            &Requirements::new(["rrc"]),
            ["rrc"],
            counts(&[("rrc", 1), ("usgs", 4)]),
            "report",
            TaskType::Report,
            OutputFormat::Markdown,
        )
        .unwrap_err();
        assert_eq!(err, ValidationError::CountWithoutSource("usgs".to_string()));

        let err = RequestContext::build(
            &Requirements::new(["rrc"]),
            ["rrc", "usgs"],
            counts(&[("rrc", 1)]),
            "report",
            TaskType::Report,
            OutputFormat::Markdown,
        )
        .unwrap_err();
        assert_eq!(err, ValidationError::UncountedSource("usgs".to_string()));
    }

    #[test]
    fn test_zero_iterations_fails() {
        let req = Requirements::new(["rrc"]).with_execution(Execution {
            max_iterations: 0,
            ..Execution::default()
        });
        let err = RequestContext::build(
            &req,
            ["rrc"],
            counts(&[("rrc", 1)]),
            "report",
            TaskType::Report,
            OutputFormat::Markdown,
        )
        .unwrap_err();
        assert_eq!(err, ValidationError::ZeroIterations);
    }

    #[test]
    fn test_intent_tag_is_normalized() {
        let ctx = build(&["rrc"]).unwrap();
        assert_eq!(ctx.intent().intent_tag, "build-dashboard-frac-jobs");
    }

    #[test]
    fn test_scoped_record_count() {
        let ctx = build(&["fracfocus"]).unwrap();
        assert_eq!(ctx.scoped_record_count("fracfocus"), Some(1000));
        assert_eq!(ctx.scoped_record_count("rrc"), None);
    }

    #[test]
    fn test_format_and_task_type_parse() {
        assert_eq!("React".parse::<OutputFormat>().unwrap(), OutputFormat::Tsx);
        assert_eq!("md".parse::<OutputFormat>().unwrap(), OutputFormat::Markdown);
        assert_eq!("Analysis".parse::<TaskType>().unwrap(), TaskType::Analysis);
        assert!("chart".parse::<TaskType>().is_err());
    }
}
