//! Artifacts produced by the two agent roles.
//!
//! - [`DesignSpec`]: the UI specification, a list of named components.
//! - [`Implementation`]: logical file name → content. The file stem of each
//!   logical name is the implementation *unit* matched against components.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Kind of UI component a design declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    Kpi,
    Chart,
    PieChart,
    Table,
    Map,
    Filter,
    Text,
}

impl ComponentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentKind::Kpi => "kpi",
            ComponentKind::Chart => "chart",
            ComponentKind::PieChart => "pie_chart",
            ComponentKind::Table => "table",
            ComponentKind::Map => "map",
            ComponentKind::Filter => "filter",
            ComponentKind::Text => "text",
        }
    }
}

impl std::fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ComponentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "kpi" | "metric" => Ok(ComponentKind::Kpi),
            "chart" | "line_chart" | "bar_chart" => Ok(ComponentKind::Chart),
            "pie_chart" | "pie" => Ok(ComponentKind::PieChart),
            "table" | "grid" => Ok(ComponentKind::Table),
            "map" => Ok(ComponentKind::Map),
            "filter" => Ok(ComponentKind::Filter),
            "text" | "markdown" => Ok(ComponentKind::Text),
            other => Err(format!("unknown component kind: {other}")),
        }
    }
}

/// One named component required by the design.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentSpec {
    pub name: String,
    pub kind: ComponentKind,
    /// Data source the component reads from. Filters and text may have none.
    pub source: Option<String>,
    pub fields: Vec<String>,
    /// Names of other components this one requires.
    pub depends_on: Vec<String>,
}

impl ComponentSpec {
    pub fn new(name: &str, kind: ComponentKind) -> Self {
        Self {
            name: name.into(),
            kind,
            source: None,
            fields: Vec::new(),
            depends_on: Vec::new(),
        }
    }

    pub fn with_source(mut self, source: &str) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_fields(mut self, fields: &[&str]) -> Self {
        self.fields = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn with_dependency(mut self, name: &str) -> Self {
        self.depends_on.push(name.into());
        self
    }

    /// Whether this kind of component needs a data source.
    pub fn needs_source(&self) -> bool {
        !matches!(self.kind, ComponentKind::Filter | ComponentKind::Text)
    }
}

/// The design agent's artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesignSpec {
    pub title: String,
    pub summary: String,
    pub components: Vec<ComponentSpec>,
    /// Text the design was parsed from (or rendered to, for local edits).
    pub raw: String,
}

impl DesignSpec {
    pub fn component(&self, name: &str) -> Option<&ComponentSpec> {
        self.components.iter().find(|c| c.name == name)
    }

    pub fn component_names(&self) -> BTreeSet<&str> {
        self.components.iter().map(|c| c.name.as_str()).collect()
    }

    /// Re-render `raw` from the structured fields, in the grammar the parser accepts.
    pub fn render(&self) -> String {
        let mut out = format!("# {}\n", self.title);
        if !self.summary.is_empty() {
            out.push_str(&format!("\n{}\n", self.summary));
        }
        out.push('\n');
        for c in &self.components {
            out.push_str(&format!("- component: {}; kind: {}", c.name, c.kind));
            if let Some(source) = &c.source {
                out.push_str(&format!("; source: {source}"));
            }
            if !c.fields.is_empty() {
                out.push_str(&format!("; fields: {}", c.fields.join(", ")));
            }
            if !c.depends_on.is_empty() {
                out.push_str(&format!("; depends: {}", c.depends_on.join(", ")));
            }
            out.push('\n');
        }
        out
    }
}

/// The implementation agent's artifact.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Implementation {
    pub files: BTreeMap<String, String>,
}

impl Implementation {
    pub fn new(files: BTreeMap<String, String>) -> Self {
        Self { files }
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Unit name → logical file name.
    pub fn units(&self) -> BTreeMap<String, &str> {
        self.files
            .keys()
            .map(|path| (unit_name(path).to_string(), path.as_str()))
            .collect()
    }

    pub fn has_unit(&self, unit: &str) -> bool {
        self.files.keys().any(|path| unit_name(path) == unit)
    }

    /// Content of the file backing `unit`, if any.
    pub fn unit_content(&self, unit: &str) -> Option<&str> {
        self.files
            .iter()
            .find(|(path, _)| unit_name(path) == unit)
            .map(|(_, content)| content.as_str())
    }
}

/// File stem of a logical file name: `components/well_map.tsx` → `well_map`.
pub fn unit_name(path: &str) -> &str {
    let file = path.rsplit('/').next().unwrap_or(path);
    match file.find('.') {
        Some(0) | None => file,
        Some(idx) => &file[..idx],
    }
}

/// Logical file name for a component's unit: `components/<name>.<ext>`.
pub fn unit_path(name: &str, extension: &str) -> String {
    format!("components/{name}.{extension}")
}

/// `path` with its file stem replaced by `stem`, keeping directory and extension.
pub fn with_unit_name(path: &str, stem: &str) -> String {
    let (dir, file) = match path.rfind('/') {
        Some(idx) => (&path[..=idx], &path[idx + 1..]),
        None => ("", path),
    };
    let ext = match file.find('.') {
        Some(0) | None => "",
        Some(idx) => &file[idx..],
    };
    format!("{dir}{stem}{ext}")
}

/// `true` for lowercase ASCII identifiers with underscores, not starting with a digit.
pub fn is_snake_case(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        && !name.ends_with('_')
        && !name.contains("__")
}

/// Best-effort snake_case conversion of an arbitrary name.
pub fn to_snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    for c in name.chars() {
        if c.is_ascii_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
            prev_lower = false;
        } else if c.is_ascii_alphanumeric() {
            out.push(c);
            prev_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
        } else {
            if !out.ends_with('_') {
                out.push('_');
            }
            prev_lower = false;
        }
    }
    let trimmed = out.trim_matches('_');
    let mut collapsed = String::with_capacity(trimmed.len());
    for c in trimmed.chars() {
        if c == '_' && collapsed.ends_with('_') {
            continue;
        }
        collapsed.push(c);
    }
    if collapsed.starts_with(|c: char| c.is_ascii_digit()) {
        collapsed.insert_str(0, "c_");
    }
    if collapsed.is_empty() {
        "component".to_string()
    } else {
        collapsed
    }
}
