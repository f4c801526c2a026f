//! Keyword-based request parsing.

use serde::{Deserialize, Serialize};

use crate::context::{OutputFormat, TaskType};

/// What the orchestrator reads out of the free-text request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedIntent {
    pub task_type: TaskType,
    pub output_format: OutputFormat,
}

impl ParsedIntent {
    /// Keyword-free default used when parsing fails.
    pub fn fallback() -> Self {
        Self {
            task_type: TaskType::Dashboard,
            output_format: OutputFormat::Markdown,
        }
    }
}

const TASK_KEYWORDS: &[(&str, TaskType)] = &[
    ("dashboard", TaskType::Dashboard),
    ("analysis", TaskType::Analysis),
    ("analyze", TaskType::Analysis),
    ("analyse", TaskType::Analysis),
    ("compare", TaskType::Analysis),
    ("report", TaskType::Report),
    ("summary", TaskType::Report),
    ("summarize", TaskType::Report),
];

const FORMAT_KEYWORDS: &[(&str, OutputFormat)] = &[
    ("json", OutputFormat::Json),
    ("html", OutputFormat::Html),
    ("tsx", OutputFormat::Tsx),
    ("react", OutputFormat::Tsx),
    ("markdown", OutputFormat::Markdown),
    ("md", OutputFormat::Markdown),
];

fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_ascii_lowercase())
        .collect()
}

fn lookup<T: Copy>(words: &[String], table: &[(&str, T)]) -> Option<T> {
    words
        .iter()
        .find_map(|w| table.iter().find(|(k, _)| *k == w.as_str()).map(|(_, v)| *v))
}

/// Read task type and output format from request keywords.
///
/// The first matching keyword wins. A missing format keyword defaults to
/// markdown; a request with no task keyword is an error.
pub fn parse_intent(text: &str) -> Result<ParsedIntent, String> {
    let words = words(text);
    if words.is_empty() {
        return Err("request has no words".to_string());
    }

    let task_type = lookup(&words, TASK_KEYWORDS)
        .ok_or_else(|| "no task keyword in request".to_string())?;
    let output_format = lookup(&words, FORMAT_KEYWORDS).unwrap_or(OutputFormat::Markdown);

    Ok(ParsedIntent {
        task_type,
        output_format,
    })
}

/// Candidate sources named in the request text, in `candidates` order.
pub fn mentioned_sources<'a, I>(text: &str, candidates: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a String>,
{
    let words = words(text);
    candidates
        .into_iter()
        .filter(|c| words.iter().any(|w| w == &c.to_ascii_lowercase()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_task_and_format() {
        let p = parse_intent("Build a React dashboard of frac water use").unwrap();
        assert_eq!(p.task_type, TaskType::Dashboard);
        assert_eq!(p.output_format, OutputFormat::Tsx);
    }

    #[test]
    fn test_format_defaults_to_markdown() {
        let p = parse_intent("summary of RRC permits").unwrap();
        assert_eq!(p.task_type, TaskType::Report);
        assert_eq!(p.output_format, OutputFormat::Markdown);
    }

    #[test]
    fn test_no_task_keyword_fails() {
        assert!(parse_intent("water by state").is_err());
        assert!(parse_intent("   ").is_err());
    }

    #[test]
    fn test_mentioned_sources() {
        let candidates = vec!["fracfocus".to_string(), "rrc".to_string()];
        assert_eq!(
            mentioned_sources("Compare FracFocus volumes", &candidates),
            vec!["fracfocus"]
        );
        assert!(mentioned_sources("water use", &candidates).is_empty());
    }
}
