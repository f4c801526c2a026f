//! Deterministic scaffolds built from scope and schema alone.
//!
//! Used as fallbacks when generation fails, and by the offline template
//! generator. Output depends only on the inputs, so two calls with equal
//! inputs produce equal artifacts.

use std::collections::BTreeMap;

use crate::artifact::{to_snake_case, unit_path, ComponentKind, ComponentSpec, DesignSpec};
use crate::collaborators::{Guidance, KnowledgePattern, SchemaCatalog};
use crate::context::{OutputFormat, TaskType};

/// Whether any `AvoidKind` rule in `knowledge` matches `component`.
fn avoided(component: &ComponentSpec, knowledge: &[KnowledgePattern]) -> bool {
    knowledge
        .iter()
        .flat_map(|p| p.guidance.iter())
        .any(|g| match g {
            Guidance::AvoidKind {
                kind, when_field, ..
            } => {
                *kind == component.kind
                    && when_field
                        .as_ref()
                        .map_or(true, |f| component.fields.contains(f))
            }
            Guidance::AvoidToken { .. } => false,
        })
}

/// A design with a filter, a headline figure and a record table per
/// scoped source. Components contradicting `knowledge` are left out.
pub fn scaffold_design<'a, I>(
    title: &str,
    task_type: TaskType,
    scope: I,
    schema: &SchemaCatalog,
    knowledge: &[KnowledgePattern],
) -> DesignSpec
where
    I: IntoIterator<Item = &'a String>,
{
    let mut components = Vec::new();
    let mut sources = Vec::new();

    for source in scope {
        sources.push(source.as_str());
        let prefix = to_snake_case(source);
        let fields: Vec<&str> = schema
            .fields(source)
            .map(|f| f.iter().map(String::as_str).collect())
            .unwrap_or_default();

        let filter = format!("{prefix}_filter");
        let mut candidates = vec![ComponentSpec::new(&filter, ComponentKind::Filter)
            .with_fields(&fields[..fields.len().min(1)])];
        let headline = match task_type {
            TaskType::Dashboard => ComponentKind::Kpi,
            TaskType::Analysis => ComponentKind::Chart,
            TaskType::Report => ComponentKind::Text,
        };
        candidates.push(
            ComponentSpec::new(&format!("{prefix}_overview"), headline)
                .with_source(source)
                .with_fields(&fields[..fields.len().min(2)])
                .with_dependency(&filter),
        );
        candidates.push(
            ComponentSpec::new(&format!("{prefix}_records"), ComponentKind::Table)
                .with_source(source)
                .with_fields(&fields[..fields.len().min(3)])
                .with_dependency(&filter),
        );

        components.extend(candidates.into_iter().filter(|c| !avoided(c, knowledge)));
    }

    // a dependency on a dropped filter would be undeclared
    let names: Vec<String> = components.iter().map(|c| c.name.clone()).collect();
    for c in components.iter_mut() {
        c.depends_on.retain(|d| names.contains(d));
    }

    let mut design = DesignSpec {
        title: title.trim().to_string(),
        summary: format!(
            "{task_type} scaffold over {} with filters, headline figures and record tables.",
            sources.join(", ")
        ),
        components,
        raw: String::new(),
    };
    design.raw = design.render();
    design
}

fn pascal_case(name: &str) -> String {
    name.split('_')
        .filter(|p| !p.is_empty())
        .map(|p| {
            let mut chars = p.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

/// Source text for one component's unit.
///
/// Only fields the schema knows for the component's source are referenced;
/// components on sources without a schema entry reference all their fields.
pub fn scaffold_unit(
    component: &ComponentSpec,
    format: OutputFormat,
    schema: &SchemaCatalog,
) -> String {
    let fields: Vec<&str> = component
        .fields
        .iter()
        .filter(|f| match component.source.as_deref().and_then(|s| schema.fields(s)) {
            Some(known) => known.contains(*f),
            None => true,
        })
        .map(String::as_str)
        .collect();
    let refs: Vec<String> = fields.iter().map(|f| format!("field(\"{f}\")")).collect();
    let source = component.source.as_deref().unwrap_or("user input");
    let deps = if component.depends_on.is_empty() {
        "none".to_string()
    } else {
        component.depends_on.join(", ")
    };
    let name = &component.name;
    let kind = component.kind;

    match format {
        OutputFormat::Tsx => format!(
            "// Renders the {kind} component {name} from {source}.\n\
             export function {pascal}({{ rows }}) {{\n\
             \x20 const columns = [{cols}];\n\
             \x20 return <{tag} title=\"{name}\" columns={{columns}} rows={{rows}} />;\n\
             }}\n",
            pascal = pascal_case(name),
            cols = refs.join(", "),
            tag = pascal_case(kind.as_str()),
        ),
        OutputFormat::Html => format!(
            "<section id=\"{name}\" data-kind=\"{kind}\" data-source=\"{source}\">\n\
             \x20 <!-- columns: {cols} -->\n\
             \x20 <!-- depends on: {deps} -->\n\
             </section>\n",
            cols = refs.join(" "),
        ),
        OutputFormat::Json => {
            let value = serde_json::json!({
                "component": name,
                "kind": kind.as_str(),
                "source": source,
                "columns": refs,
                "depends_on": component.depends_on,
            });
            format!("{value:#}\n")
        }
        OutputFormat::Markdown => format!(
            "## {name}\n\n\
             Renders a {kind} component from {source}.\n\n\
             - columns: {cols}\n\
             - depends on: {deps}\n",
            cols = if refs.is_empty() {
                "none".to_string()
            } else {
                refs.join(", ")
            },
        ),
    }
}

/// One unit per design component at `components/<name>.<ext>`.
pub fn scaffold_implementation(
    design: &DesignSpec,
    format: OutputFormat,
    schema: &SchemaCatalog,
) -> BTreeMap<String, String> {
    design
        .components
        .iter()
        .map(|c| {
            (
                unit_path(&c.name, format.extension()),
                scaffold_unit(c, format, schema),
            )
        })
        .collect()
}
