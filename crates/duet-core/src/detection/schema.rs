//! Schema alignment between artifacts and the discovered data schema.

use std::collections::BTreeSet;

use crate::artifact::unit_name;
use crate::conflict::{Conflict, ConflictKind, Severity};
use crate::detection::{ConflictCheck, DetectionInput};
use crate::parser::referenced_fields;
use crate::roles::AgentRole;

/// Flags field references the schema does not know.
///
/// Implementation units are checked against the schema of their design
/// component's source, or the union of all scoped sources when the unit has
/// no matching component (High, implementation). Design component fields are
/// checked against their own source (Warning, design). Sources without a
/// schema entry are not checked.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaAlignment;

impl SchemaAlignment {
    fn allowed_fields(input: &DetectionInput<'_>, unit: &str) -> Option<BTreeSet<String>> {
        let source = input
            .design
            .and_then(|d| d.component(unit))
            .and_then(|c| c.source.as_deref());
        match source {
            Some(source) => input.schema.fields(source).cloned(),
            None => {
                let union: BTreeSet<String> = input
                    .context
                    .scope()
                    .iter()
                    .filter_map(|s| input.schema.fields(s))
                    .flatten()
                    .cloned()
                    .collect();
                (!union.is_empty()).then_some(union)
            }
        }
    }
}

impl ConflictCheck for SchemaAlignment {
    fn name(&self) -> &'static str {
        "schema-alignment"
    }

    fn run(&self, input: &DetectionInput<'_>) -> Vec<Conflict> {
        let mut out = Vec::new();

        if let Some(imp) = input.implementation {
            for (path, content) in &imp.files {
                let unit = unit_name(path);
                let Some(allowed) = Self::allowed_fields(input, unit) else {
                    continue;
                };
                for field in referenced_fields(content) {
                    if !allowed.contains(&field) {
                        out.push(Conflict::new(
                            ConflictKind::SchemaMismatch,
                            Severity::High,
                            AgentRole::Implementation,
                            format!("{unit}.{field}"),
                            format!("{path} references unknown field {field}"),
                        ));
                    }
                }
            }
        }

        if let Some(design) = input.design {
            for c in &design.components {
                let Some(source) = c.source.as_deref() else {
                    continue;
                };
                if input.schema.fields(source).is_none() {
                    continue;
                }
                for field in c.fields.iter().filter(|f| !input.schema.has_field(source, f)) {
                    out.push(Conflict::new(
                        ConflictKind::SchemaMismatch,
                        Severity::Warning,
                        AgentRole::Design,
                        format!("{}.{field}", c.name),
                        format!("component {} uses field {field} unknown to {source}", c.name),
                    ));
                }
            }
        }

        out.sort();
        out.dedup();
        out
    }
}
