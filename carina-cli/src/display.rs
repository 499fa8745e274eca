//! Plan rendering

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write;

use colored::Colorize;
use similar::{ChangeTag, TextDiff};

use carina_core::effect::Effect;
use carina_core::plan::Plan;
use carina_core::resource::Value;
use carina_core::schema::ResourceSchema;

const SENSITIVE: &str = "(sensitive value)";
const KNOWN_AFTER_APPLY: &str = "(known after apply)";

pub fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => format!("\"{}\"", s),
        Value::Int(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::List(items) => {
            let inner: Vec<String> = items.iter().map(format_value).collect();
            format!("[{}]", inner.join(", "))
        }
        Value::Map(map) => {
            let sorted: BTreeMap<&String, &Value> = map.iter().collect();
            let inner: Vec<String> = sorted
                .into_iter()
                .map(|(k, v)| format!("{} = {}", k, format_value(v)))
                .collect();
            format!("{{{}}}", inner.join(", "))
        }
        Value::ResourceRef(_, _) => KNOWN_AFTER_APPLY.to_string(),
    }
}

/// Render an attribute value, hiding sensitive attributes and sensitive
/// block fields
fn shown(schema: Option<&ResourceSchema>, key: &str, value: &Value) -> String {
    let Some(attr) = schema.and_then(|s| s.attributes.get(key)) else {
        return format_value(value);
    };
    if attr.sensitive {
        return SENSITIVE.to_string();
    }
    if let (Some(fields), Value::Map(block)) = (attr.attr_type.block_fields(), value) {
        let mut masked = block.clone();
        for field in fields.iter().filter(|f| f.sensitive) {
            if let Some(v) = masked.get_mut(&field.name) {
                *v = Value::from(SENSITIVE);
            }
        }
        return format_value(&Value::Map(masked));
    }
    format_value(value)
}

fn is_sensitive(schema: Option<&ResourceSchema>, key: &str) -> bool {
    schema
        .and_then(|s| s.attributes.get(key))
        .is_some_and(|a| a.sensitive)
}

/// Sorted user-facing attributes
fn visible(attributes: &HashMap<String, Value>) -> Vec<(&String, &Value)> {
    let mut attrs: Vec<_> = attributes
        .iter()
        .filter(|(k, _)| !k.starts_with('_'))
        .collect();
    attrs.sort_by(|a, b| a.0.cmp(b.0));
    attrs
}

/// Multi-line documents (table mappings, task settings) diffed line by line
fn document_diff(out: &mut String, from: &str, to: &str) {
    let pretty = |s: &str| {
        serde_json::from_str::<serde_json::Value>(s)
            .ok()
            .and_then(|v| serde_json::to_string_pretty(&v).ok())
            .unwrap_or_else(|| s.to_string())
    };
    let (from, to) = (pretty(from), pretty(to));
    let diff = TextDiff::from_lines(&from, &to);
    for change in diff.iter_all_changes() {
        let line = change.to_string();
        let line = line.trim_end_matches('\n');
        let _ = match change.tag() {
            ChangeTag::Delete => writeln!(out, "        {}", format!("- {}", line).red()),
            ChangeTag::Insert => writeln!(out, "        {}", format!("+ {}", line).green()),
            ChangeTag::Equal => writeln!(out, "          {}", line),
        };
    }
}

fn looks_like_document(value: &str) -> bool {
    let trimmed = value.trim_start();
    trimmed.starts_with('{') || trimmed.starts_with('[')
}

pub fn render_effect(effect: &Effect, schemas: &HashMap<String, ResourceSchema>) -> String {
    let mut out = String::new();
    let schema = schemas.get(&effect.resource_id().resource_type);

    match effect {
        Effect::Read { resource } => {
            let _ = writeln!(
                out,
                "  {} {} (data source)",
                "<=".cyan().bold(),
                resource.id.to_string().cyan()
            );
        }
        Effect::Create(resource) => {
            let _ = writeln!(
                out,
                "  {} {}",
                "+".green().bold(),
                resource.id.to_string().green()
            );
            for (key, value) in visible(&resource.attributes) {
                let _ = writeln!(out, "      {}: {}", key, shown(schema, key, value));
            }
        }
        Effect::Update {
            id,
            from,
            to,
            changed_attributes,
        }
        | Effect::Replace {
            id,
            from,
            to,
            changed_attributes,
        } => {
            let replace = matches!(effect, Effect::Replace { .. });
            let marker = if replace {
                "-/+".magenta().bold()
            } else {
                "~".yellow().bold()
            };
            let title = if replace {
                id.to_string().magenta()
            } else {
                id.to_string().yellow()
            };
            let _ = writeln!(out, "  {} {}", marker, title);

            let mut changed: Vec<&String> = changed_attributes.iter().collect();
            changed.sort();
            for key in changed {
                let old = from.attributes.get(key);
                let new = to.attributes.get(key);
                let note = match schema.and_then(|s| s.attributes.get(key.as_str())) {
                    Some(a) if replace && a.force_new => " (forces replacement)".red().to_string(),
                    _ => String::new(),
                };

                if !is_sensitive(schema, key)
                    && let (Some(Value::String(a)), Some(Value::String(b))) = (old, new)
                    && looks_like_document(a)
                    && looks_like_document(b)
                {
                    let _ = writeln!(out, "      {}:{}", key, note);
                    document_diff(&mut out, a, b);
                    continue;
                }

                let old = old.map_or_else(|| "(none)".to_string(), |v| shown(schema, key, v));
                let new = new.map_or_else(|| "(none)".to_string(), |v| shown(schema, key, v));
                let _ = writeln!(out, "      {}: {} → {}{}", key, old, new, note);
            }
        }
        Effect::Delete { id, identifier, .. } => {
            let _ = writeln!(
                out,
                "  {} {} ({})",
                "-".red().bold(),
                id.to_string().red(),
                identifier
            );
        }
    }
    out
}

pub fn print_plan(plan: &Plan, schemas: &HashMap<String, ResourceSchema>) {
    if plan.mutation_count() == 0 {
        println!("{}", "No changes. Infrastructure is up-to-date.".green());
        return;
    }

    println!("{}", "Execution Plan:".cyan().bold());
    println!();
    for effect in plan.effects() {
        print!("{}", render_effect(effect, schemas));
    }
    println!();
    println!("{}", plan.summary().to_string().bold());
}

#[cfg(test)]
mod tests {
    use carina_core::resource::{Resource, ResourceId, State};
    use carina_core::schema::{AttributeSchema, AttributeType};

    use super::*;

    fn endpoint_schemas() -> HashMap<String, ResourceSchema> {
        let schema = ResourceSchema::new("dms_endpoint")
            .attribute(AttributeSchema::new("endpoint_id", AttributeType::String).force_new())
            .attribute(AttributeSchema::new("password", AttributeType::String).sensitive())
            .attribute(AttributeSchema::new("port", AttributeType::Int))
            .attribute(AttributeSchema::new("settings", AttributeType::String));
        HashMap::from([("dms_endpoint".to_string(), schema)])
    }

    #[test]
    fn references_are_known_after_apply() {
        let value = Value::List(vec![
            Value::from("subnet-1"),
            Value::ResourceRef("net".into(), "subnet_id".into()),
        ]);
        assert_eq!(format_value(&value), "[\"subnet-1\", (known after apply)]");
    }

    #[test]
    fn create_masks_sensitive_values() {
        colored::control::set_override(false);
        let resource = Resource::new("dms_endpoint", "source")
            .with_attribute("endpoint_id", Value::from("orders-src"))
            .with_attribute("password", Value::from("hunter2"))
            .with_attribute("_binding", Value::from("source"));
        let out = render_effect(&Effect::Create(resource), &endpoint_schemas());
        assert!(out.contains("+ dms_endpoint.source"));
        assert!(out.contains("endpoint_id: \"orders-src\""));
        assert!(out.contains("password: (sensitive value)"));
        assert!(!out.contains("hunter2"));
        assert!(!out.contains("_binding"));
    }

    #[test]
    fn replace_marks_forcing_attribute() {
        colored::control::set_override(false);
        let id = ResourceId::new("dms_endpoint", "source");
        let from = State::existing(
            id.clone(),
            HashMap::from([("endpoint_id".to_string(), Value::from("old"))]),
        )
        .with_identifier("old");
        let to = Resource::new("dms_endpoint", "source")
            .with_attribute("endpoint_id", Value::from("new"));
        let effect = Effect::Replace {
            id,
            from,
            to,
            changed_attributes: vec!["endpoint_id".to_string()],
        };
        let out = render_effect(&effect, &endpoint_schemas());
        assert!(out.contains("-/+ dms_endpoint.source"));
        assert!(out.contains("endpoint_id: \"old\" → \"new\" (forces replacement)"));
    }

    #[test]
    fn documents_are_diffed_by_line() {
        colored::control::set_override(false);
        let id = ResourceId::new("dms_endpoint", "source");
        let from = State::existing(
            id.clone(),
            HashMap::from([(
                "settings".to_string(),
                Value::from(r#"{"a":1,"b":2}"#),
            )]),
        );
        let to = Resource::new("dms_endpoint", "source")
            .with_attribute("settings", Value::from(r#"{"a":1,"b":3}"#));
        let effect = Effect::Update {
            id,
            from,
            to,
            changed_attributes: vec!["settings".to_string()],
        };
        let out = render_effect(&effect, &endpoint_schemas());
        assert!(out.contains("-   \"b\": 2"));
        assert!(out.contains("+   \"b\": 3"));
        assert!(out.contains("  \"a\": 1,"));
    }
}
