//! Narrow-grammar parsers for generator output.
//!
//! Generators return free text. Only the shapes below are recognized; anything
//! else parses to `None` or an empty collection rather than an error.
//!
//! Design text:
//!
//! ```text
//! # Frac Water Dashboard
//! Optional summary line(s).
//! - component: water_by_state; kind: chart; source: fracfocus; fields: state, total_base_water_volume; depends: state_filter
//! ```
//!
//! Implementation text:
//!
//! ```text
//! === file: components/water_by_state.tsx ===
//! ...content referencing field("state")...
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

use regex::Regex;

use crate::artifact::{ComponentKind, ComponentSpec, DesignSpec};

/// Parse failures for callers that need an error instead of an empty result.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("no design title or component lines found")]
    NoDesign,

    #[error("no `=== file: ... ===` sections found")]
    NoFiles,
}

fn component_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*[-*]\s*component\s*:\s*(.+?)\s*$").expect("component regex is valid")
    })
}

fn file_header() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*===\s*file\s*:\s*(\S+)\s*===\s*$").expect("file header regex is valid")
    })
}

fn field_reference() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"field\(\s*\\?"([A-Za-z_][A-Za-z0-9_]*)\\?"\s*\)"#)
            .expect("field reference regex is valid")
    })
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Parse one `component:` line body (`name; kind: k; source: s; ...`).
fn parse_component(body: &str) -> Option<ComponentSpec> {
    let mut parts = body.split(';').map(str::trim);
    let name = parts.next().filter(|n| !n.is_empty())?;

    let mut kind = None;
    let mut source = None;
    let mut fields = Vec::new();
    let mut depends_on = Vec::new();

    for part in parts {
        let Some((key, value)) = part.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key.trim().to_ascii_lowercase().as_str() {
            "kind" | "type" => kind = value.parse::<ComponentKind>().ok(),
            "source" => {
                if !value.is_empty() && value != "none" {
                    source = Some(value.to_string());
                }
            }
            "fields" => fields = split_list(value),
            "depends" | "depends_on" => depends_on = split_list(value),
            _ => {}
        }
    }

    Some(ComponentSpec {
        name: name.to_string(),
        kind: kind?,
        source,
        fields,
        depends_on,
    })
}

/// Parse every well-formed component line. Malformed lines are skipped.
pub fn parse_components(text: &str) -> Vec<ComponentSpec> {
    text.lines()
        .filter_map(|line| component_line().captures(line))
        .filter_map(|caps| caps.get(1).and_then(|m| parse_component(m.as_str())))
        .collect()
}

/// Parse a design. Returns `None` when the text has neither a title nor a
/// component line. A titled design without components parses to an empty
/// component list.
pub fn parse_design(text: &str) -> Option<DesignSpec> {
    let mut title = None;
    let mut summary = Vec::new();

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || component_line().is_match(line) {
            continue;
        }
        if let Some(heading) = trimmed.strip_prefix('#') {
            if title.is_none() {
                title = Some(heading.trim_start_matches('#').trim().to_string());
            }
            continue;
        }
        summary.push(trimmed);
    }

    let components = parse_components(text);
    if title.is_none() && components.is_empty() {
        return None;
    }

    Some(DesignSpec {
        title: title.unwrap_or_else(|| "Untitled design".to_string()),
        summary: summary.join(" "),
        components,
        raw: text.to_string(),
    })
}

/// Like [`parse_design`], but with an error for the no-match case.
pub fn require_design(text: &str) -> Result<DesignSpec, ParseError> {
    parse_design(text).ok_or(ParseError::NoDesign)
}

/// Split implementation text into `logical name → content`. Text before the
/// first header is ignored; a repeated name keeps the last section. Sections
/// whose name is not a plain relative path are dropped with their body.
pub fn parse_files(text: &str) -> BTreeMap<String, String> {
    let mut files = BTreeMap::new();
    let mut current: Option<(String, Vec<&str>)> = None;

    for line in text.lines() {
        if let Some(caps) = file_header().captures(line) {
            if let Some((name, body)) = current.take() {
                files.insert(name, finish_body(&body));
            }
            let name = &caps[1];
            if is_relative_file_name(name) {
                current = Some((name.to_string(), Vec::new()));
            } else {
                tracing::warn!(file = %name, "skipping file section with unsafe name");
            }
        } else if let Some((_, body)) = current.as_mut() {
            body.push(line);
        }
    }
    if let Some((name, body)) = current {
        files.insert(name, finish_body(&body));
    }
    files
}

/// True for names that stay below whatever directory they are joined onto:
/// relative, no drive prefix, and every segment a plain name.
pub fn is_relative_file_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with(['/', '\\'])
        && !name.contains(':')
        && name
            .split(['/', '\\'])
            .all(|segment| !segment.is_empty() && segment != "." && segment != "..")
}

fn finish_body(lines: &[&str]) -> String {
    let joined = lines.join("\n");
    let trimmed = joined.trim_matches('\n');
    format!("{trimmed}\n")
}

/// Like [`parse_files`], but with an error for the no-match case.
pub fn require_files(text: &str) -> Result<BTreeMap<String, String>, ParseError> {
    let files = parse_files(text);
    if files.is_empty() {
        Err(ParseError::NoFiles)
    } else {
        Ok(files)
    }
}

/// Render files back into the grammar [`parse_files`] accepts.
pub fn render_files(files: &BTreeMap<String, String>) -> String {
    let mut out = String::new();
    for (name, content) in files {
        out.push_str(&format!("=== file: {name} ===\n"));
        out.push_str(content);
        if !content.ends_with('\n') {
            out.push('\n');
        }
    }
    out
}

/// Field names referenced as `field("name")` in implementation content.
/// JSON-escaped quotes (`field(\"name\")`) are accepted too.
pub fn referenced_fields(content: &str) -> BTreeSet<String> {
    field_reference()
        .captures_iter(content)
        .map(|caps| caps[1].to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const DESIGN: &str = "# Frac Water Dashboard\n\
        Water use by state.\n\
        \n\
        - component: state_filter; kind: filter\n\
        - component: water_by_state; kind: bar chart; source: fracfocus; fields: state, total_base_water_volume; depends: state_filter\n\
        - component: broken line without kind\n";

    #[test]
    fn test_parse_design_extracts_title_summary_components() {
        let design = parse_design(DESIGN).unwrap();
        assert_eq!(design.title, "Frac Water Dashboard");
        assert_eq!(design.summary, "Water use by state.");
        assert_eq!(design.components.len(), 2);

        let chart = design.component("water_by_state").unwrap();
        assert_eq!(chart.kind, ComponentKind::Chart);
        assert_eq!(chart.source.as_deref(), Some("fracfocus"));
        assert_eq!(chart.fields, vec!["state", "total_base_water_volume"]);
        assert_eq!(chart.depends_on, vec!["state_filter"]);
        assert_eq!(design.component("state_filter").unwrap().source, None);
    }

    #[test]
    fn test_parse_design_no_match_is_none() {
        assert!(parse_design("just some prose\nwithout structure").is_none());
        assert_eq!(require_design(""), Err(ParseError::NoDesign));
    }

    #[test]
    fn test_parse_design_title_only_has_no_components() {
        let design = parse_design("# Empty\n").unwrap();
        assert!(design.components.is_empty());
    }

    #[test]
    fn test_rendered_design_parses_back() {
        let design = parse_design(DESIGN).unwrap();
        let reparsed = parse_design(&design.render()).unwrap();
        assert_eq!(design.components, reparsed.components);
        assert_eq!(design.title, reparsed.title);
    }

    #[test]
    fn test_parse_files_splits_sections() {
        let text = "preamble ignored\n\
            === file: components/a.tsx ===\n\
            export const A = () => field(\"x\");\n\
            === file: components/b.tsx ===\n\
            \n\
            export const B = 1;\n";
        let files = parse_files(text);
        assert_eq!(files.len(), 2);
        assert_eq!(files["components/a.tsx"], "export const A = () => field(\"x\");\n");
        assert_eq!(files["components/b.tsx"], "export const B = 1;\n");
        assert_eq!(parse_files(&render_files(&files)), files);
    }

    #[test]
    fn test_parse_files_no_match_is_empty() {
        assert!(parse_files("no headers here").is_empty());
        assert_eq!(require_files("nothing"), Err(ParseError::NoFiles));
    }

    #[test]
    fn test_parse_files_drops_escaping_names() {
        let text = "=== file: ../../escape.md ===\n\
            body\n\
            === file: /tmp/abs.md ===\n\
            x\n\
            === file: components/ok.md ===\n\
            kept\n\
            === file: components/../../up.md ===\n\
            y\n\
            === file: C:\\temp\\win.md ===\n\
            z\n";
        let files = parse_files(text);
        assert_eq!(files.keys().collect::<Vec<_>>(), vec!["components/ok.md"]);
        assert_eq!(files["components/ok.md"], "kept\n");

        assert!(is_relative_file_name("components/a.tsx"));
        assert!(!is_relative_file_name("./a.tsx"));
        assert!(!is_relative_file_name("a//b.tsx"));
        assert!(!is_relative_file_name("..\\a.tsx"));
    }

    #[test]
    fn test_referenced_fields() {
        let fields =
            referenced_fields(r#"row[field("state")] + field( "api_number" ) + field(bad) + "field(\"state\")""#);
        assert_eq!(
            fields,
            BTreeSet::from(["api_number".to_string(), "state".to_string()])
        );
    }
}
