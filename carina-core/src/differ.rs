//! Differ - Compare desired state with current state to generate a Plan
//!
//! Compares the desired state declared in configuration with the current
//! state fetched from the Provider, and generates the list of Effects
//! (Plan) needed to converge. Comparison is schema-aware: computed
//! attributes the configuration leaves out are ignored, sets compare
//! without regard to order, diff-suppress functions are honored, and any
//! changed `force_new` attribute turns an update into a replacement.

use std::collections::HashMap;

use crate::effect::Effect;
use crate::plan::Plan;
use crate::resource::{Resource, ResourceId, State, Value};
use crate::schema::{AttributeSchema, AttributeType, ResourceSchema};
use crate::waiter::Timeouts;

/// Result of a diff operation
#[derive(Debug, Clone, PartialEq)]
pub enum Diff {
    /// Resource does not exist -> needs creation
    Create(Resource),
    /// Resource exists with differences -> needs update
    Update {
        id: ResourceId,
        from: State,
        to: Resource,
        changed_attributes: Vec<String>,
    },
    /// Resource exists but a force-new attribute changed -> delete and create
    Replace {
        id: ResourceId,
        from: State,
        to: Resource,
        changed_attributes: Vec<String>,
    },
    /// Resource exists with no differences -> no action needed
    NoChange(ResourceId),
}

/// Compare desired state with current state to compute a Diff
pub fn diff(desired: &Resource, current: &State, schema: Option<&ResourceSchema>) -> Diff {
    if !current.exists {
        return Diff::Create(desired.clone());
    }

    let changes = find_changed_attributes(schema, &desired.attributes, &current.attributes);

    if changes.is_empty() {
        return Diff::NoChange(desired.id.clone());
    }

    let replace = changes.iter().any(|c| c.force_new);
    let changed_attributes: Vec<String> = changes.into_iter().map(|c| c.key).collect();

    if replace {
        Diff::Replace {
            id: desired.id.clone(),
            from: current.clone(),
            to: desired.clone(),
            changed_attributes,
        }
    } else {
        Diff::Update {
            id: desired.id.clone(),
            from: current.clone(),
            to: desired.clone(),
            changed_attributes,
        }
    }
}

#[derive(Debug)]
struct Change {
    key: String,
    force_new: bool,
}

/// Find changed attributes between desired and current state
fn find_changed_attributes(
    schema: Option<&ResourceSchema>,
    desired: &HashMap<String, Value>,
    current: &HashMap<String, Value>,
) -> Vec<Change> {
    let Some(schema) = schema else {
        // Without a schema, fall back to plain equality of configured keys
        return desired
            .iter()
            .filter(|(key, _)| !key.starts_with('_'))
            .filter(|(key, value)| current.get(*key) != Some(*value))
            .map(|(key, _)| Change {
                key: key.clone(),
                force_new: false,
            })
            .collect();
    };

    let fields: Vec<&AttributeSchema> = schema.attributes.values().collect();
    let mut changes = compare_fields(&fields, desired, current, desired);
    changes.sort_by(|a, b| a.key.cmp(&b.key));
    changes
}

fn compare_fields(
    fields: &[&AttributeSchema],
    desired: &HashMap<String, Value>,
    current: &HashMap<String, Value>,
    root: &HashMap<String, Value>,
) -> Vec<Change> {
    let mut changes = Vec::new();

    for field in fields {
        // Read-only values are compared only when the provider planned one
        if field.read_only && !desired.contains_key(field.name.as_str()) {
            continue;
        }
        let key = field.name.as_str();
        let new = desired.get(key).filter(|v| !v.is_empty());
        let old = current.get(key).filter(|v| !v.is_empty());

        let (force_new, changed) = match (old, new) {
            (None, None) => (false, false),
            // Left out of the configuration and owned by the remote side
            (Some(_), None) if field.computed => (false, false),
            (Some(old), Some(new)) => match &field.attr_type {
                AttributeType::Block(nested) => {
                    let nested: Vec<&AttributeSchema> = nested.iter().collect();
                    match (old.as_map(), new.as_map()) {
                        (Some(old_block), Some(new_block)) => {
                            let inner = compare_fields(&nested, new_block, old_block, root);
                            (inner.iter().any(|c| c.force_new), !inner.is_empty())
                        }
                        _ => (false, old != new),
                    }
                }
                attr_type => (false, !values_equal(attr_type, old, new)),
            },
            // A block added or removed as a whole still honors its nested force_new fields
            (old, new) => match &field.attr_type {
                AttributeType::Block(nested) => {
                    let empty = HashMap::new();
                    let nested: Vec<&AttributeSchema> = nested.iter().collect();
                    let old_block = old.and_then(Value::as_map).unwrap_or(&empty);
                    let new_block = new.and_then(Value::as_map).unwrap_or(&empty);
                    let inner = compare_fields(&nested, new_block, old_block, root);
                    (inner.iter().any(|c| c.force_new), true)
                }
                _ => (false, true),
            },
        };

        if !changed {
            continue;
        }

        if let Some(suppress) = field.diff_suppress {
            let empty = Value::String(String::new());
            if suppress(key, old.unwrap_or(&empty), new.unwrap_or(&empty), root) {
                continue;
            }
        }

        changes.push(Change {
            key: key.to_string(),
            force_new: force_new || field.force_new,
        });
    }

    changes
}

/// Type-aware equality between a stored and a desired value
fn values_equal(attr_type: &AttributeType, old: &Value, new: &Value) -> bool {
    match attr_type {
        AttributeType::Int => old.as_int().is_some() && old.as_int() == new.as_int(),
        AttributeType::Bool => old.as_bool().is_some() && old.as_bool() == new.as_bool(),
        AttributeType::Custom { base, .. } => values_equal(base, old, new),
        AttributeType::Set(_) => match (old.as_list(), new.as_list()) {
            (Some(a), Some(b)) => {
                a.iter().all(|item| b.contains(item)) && b.iter().all(|item| a.contains(item))
            }
            _ => old == new,
        },
        _ => old == new,
    }
}

/// Fill attributes a refresh cannot report (sensitive and write-only
/// attributes, at the top level and inside blocks, plus internal `_` keys)
/// with their previously stored values. Anything else missing from the
/// refresh was cleared remotely and stays missing.
pub fn merge_prior_state(
    schema: Option<&ResourceSchema>,
    refreshed: &mut HashMap<String, Value>,
    prior: &HashMap<String, Value>,
) {
    for (key, prior_value) in prior {
        let attr = schema.and_then(|s| s.attributes.get(key));
        if attr.is_some_and(|a| a.read_only) {
            continue;
        }
        let unreported = key.starts_with('_') || attr.is_none_or(|a| a.is_unreported());

        match refreshed.get_mut(key) {
            None if unreported => {
                refreshed.insert(key.clone(), prior_value.clone());
            }
            None => {}
            Some(Value::Map(block)) => {
                let (Some(fields), Some(prior_block)) = (
                    attr.and_then(|a| a.attr_type.block_fields()),
                    prior_value.as_map(),
                ) else {
                    continue;
                };
                for field in fields.iter().filter(|f| f.is_unreported()) {
                    if let Some(v) = prior_block.get(&field.name)
                        && !block.contains_key(&field.name)
                    {
                        block.insert(field.name.clone(), v.clone());
                    }
                }
            }
            Some(_) => {}
        }
    }
}

/// Compute Diff for multiple resources and generate a Plan.
///
/// Managed resources present in `current_states` but not in `desired` are
/// deleted, after every create/update, in reverse order of their ids.
pub fn create_plan(
    desired: &[Resource],
    current_states: &HashMap<ResourceId, State>,
    schemas: &HashMap<String, ResourceSchema>,
) -> Plan {
    let mut plan = Plan::new();

    for resource in desired.iter().filter(|r| !r.is_data_source()) {
        let current = current_states
            .get(&resource.id)
            .cloned()
            .unwrap_or_else(|| State::not_found(resource.id.clone()));

        let d = diff(resource, &current, schemas.get(&resource.id.resource_type));

        match d {
            Diff::Create(r) => plan.add(Effect::Create(r)),
            Diff::Update {
                id,
                from,
                to,
                changed_attributes,
            } => {
                plan.add(Effect::Update {
                    id,
                    from,
                    to,
                    changed_attributes,
                });
            }
            Diff::Replace {
                id,
                from,
                to,
                changed_attributes,
            } => {
                plan.add(Effect::Replace {
                    id,
                    from,
                    to,
                    changed_attributes,
                });
            }
            Diff::NoChange(_) => {}
        }
    }

    let mut orphans: Vec<&State> = current_states
        .values()
        .filter(|s| s.exists && !desired.iter().any(|r| r.id == s.id))
        .collect();
    orphans.sort_by(|a, b| {
        (&b.id.resource_type, &b.id.name).cmp(&(&a.id.resource_type, &a.id.name))
    });
    for state in orphans {
        plan.add(Effect::Delete {
            id: state.id.clone(),
            identifier: state.identifier.clone().unwrap_or_default(),
            // Recorded timeouts were validated when the resource was configured
            timeouts: Timeouts::from_attributes(&state.attributes).unwrap_or_default(),
        });
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::types;

    fn endpoint_schema() -> ResourceSchema {
        ResourceSchema::new("endpoint")
            .attribute(
                AttributeSchema::new("endpoint_id", AttributeType::String)
                    .required()
                    .force_new(),
            )
            .attribute(AttributeSchema::new("port", AttributeType::Int))
            .attribute(AttributeSchema::new("ssl_mode", AttributeType::String).computed())
            .attribute(AttributeSchema::new("arn", AttributeType::String).read_only())
            .attribute(AttributeSchema::new("password", AttributeType::String).sensitive())
            .attribute(AttributeSchema::new("tags_all", types::string_map()).read_only())
            .attribute(AttributeSchema::new("subnet_ids", types::string_set()))
            .attribute(
                AttributeSchema::new("table_mappings", AttributeType::String)
                    .with_diff_suppress(|_, old, new, _| {
                        old.as_str().map(str::trim) == new.as_str().map(str::trim)
                    }),
            )
            .attribute(AttributeSchema::new(
                "kafka_settings",
                AttributeType::Block(vec![
                    AttributeSchema::new("broker", AttributeType::String),
                    AttributeSchema::new("sasl_password", AttributeType::String).sensitive(),
                    AttributeSchema::new("topic", AttributeType::String)
                        .computed()
                        .force_new(),
                ]),
            ))
    }

    fn attrs(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn state(pairs: &[(&str, Value)]) -> State {
        State::existing(ResourceId::new("endpoint", "test"), attrs(pairs))
            .with_identifier("test")
    }

    fn resource(pairs: &[(&str, Value)]) -> Resource {
        let mut r = Resource::new("endpoint", "test");
        r.attributes = attrs(pairs);
        r
    }

    #[test]
    fn diff_create_when_not_exists() {
        let desired = Resource::new("endpoint", "test");
        let current = State::not_found(ResourceId::new("endpoint", "test"));

        let result = diff(&desired, &current, None);
        assert!(matches!(result, Diff::Create(_)));
    }

    #[test]
    fn diff_no_change_when_same() {
        let desired = resource(&[("endpoint_id", Value::from("test")), ("port", Value::Int(5432))]);
        let current = state(&[
            ("endpoint_id", Value::from("test")),
            ("port", Value::Int(5432)),
            ("ssl_mode", Value::from("none")),
            ("arn", Value::from("arn:aws:dms:us-east-1:123:endpoint:X")),
        ]);

        let schema = endpoint_schema();
        assert!(matches!(
            diff(&desired, &current, Some(&schema)),
            Diff::NoChange(_)
        ));
    }

    #[test]
    fn diff_update_when_different() {
        let desired = resource(&[("endpoint_id", Value::from("test")), ("port", Value::Int(5433))]);
        let current = state(&[("endpoint_id", Value::from("test")), ("port", Value::Int(5432))]);

        let schema = endpoint_schema();
        match diff(&desired, &current, Some(&schema)) {
            Diff::Update {
                changed_attributes, ..
            } => assert_eq!(changed_attributes, vec!["port".to_string()]),
            other => panic!("Expected Update, got {:?}", other),
        }
    }

    #[test]
    fn force_new_change_requires_replace() {
        let desired = resource(&[("endpoint_id", Value::from("renamed"))]);
        let current = state(&[("endpoint_id", Value::from("test"))]);

        let schema = endpoint_schema();
        assert!(matches!(
            diff(&desired, &current, Some(&schema)),
            Diff::Replace { .. }
        ));
    }

    #[test]
    fn removed_optional_attribute_is_a_change() {
        let desired = resource(&[("endpoint_id", Value::from("test"))]);
        let current = state(&[("endpoint_id", Value::from("test")), ("port", Value::Int(5432))]);

        let schema = endpoint_schema();
        assert!(matches!(
            diff(&desired, &current, Some(&schema)),
            Diff::Update { .. }
        ));
    }

    #[test]
    fn sets_ignore_order_and_strings_compare_as_ints() {
        let desired = resource(&[
            ("endpoint_id", Value::from("test")),
            ("port", Value::from("5432")),
            (
                "subnet_ids",
                Value::List(vec![Value::from("subnet-b"), Value::from("subnet-a")]),
            ),
        ]);
        let current = state(&[
            ("endpoint_id", Value::from("test")),
            ("port", Value::Int(5432)),
            (
                "subnet_ids",
                Value::List(vec![Value::from("subnet-a"), Value::from("subnet-b")]),
            ),
        ]);

        let schema = endpoint_schema();
        assert!(matches!(
            diff(&desired, &current, Some(&schema)),
            Diff::NoChange(_)
        ));
    }

    #[test]
    fn diff_suppress_is_honored() {
        let desired = resource(&[
            ("endpoint_id", Value::from("test")),
            ("table_mappings", Value::from("{\"rules\":[]}\n")),
        ]);
        let current = state(&[
            ("endpoint_id", Value::from("test")),
            ("table_mappings", Value::from("{\"rules\":[]}")),
        ]);

        let schema = endpoint_schema();
        assert!(matches!(
            diff(&desired, &current, Some(&schema)),
            Diff::NoChange(_)
        ));
    }

    #[test]
    fn block_fields_compare_individually() {
        let block = |broker: &str, topic: Option<&str>| {
            let mut m = HashMap::new();
            m.insert("broker".to_string(), Value::from(broker));
            if let Some(topic) = topic {
                m.insert("topic".to_string(), Value::from(topic));
            }
            Value::Map(m)
        };
        let schema = endpoint_schema();

        let current = state(&[
            ("endpoint_id", Value::from("test")),
            ("kafka_settings", block("b-1:9092", Some("kafka-default-topic"))),
        ]);

        // Computed topic omitted from config: no change
        let same = resource(&[
            ("endpoint_id", Value::from("test")),
            ("kafka_settings", block("b-1:9092", None)),
        ]);
        assert!(matches!(
            diff(&same, &current, Some(&schema)),
            Diff::NoChange(_)
        ));

        let broker = resource(&[
            ("endpoint_id", Value::from("test")),
            ("kafka_settings", block("b-2:9092", None)),
        ]);
        assert!(matches!(
            diff(&broker, &current, Some(&schema)),
            Diff::Update { .. }
        ));

        let topic = resource(&[
            ("endpoint_id", Value::from("test")),
            ("kafka_settings", block("b-1:9092", Some("orders"))),
        ]);
        assert!(matches!(
            diff(&topic, &current, Some(&schema)),
            Diff::Replace { .. }
        ));
    }

    #[test]
    fn added_block_with_force_new_field_requires_replace() {
        let schema = endpoint_schema();
        let current = state(&[("endpoint_id", Value::from("test"))]);
        let desired = resource(&[
            ("endpoint_id", Value::from("test")),
            (
                "kafka_settings",
                Value::Map(HashMap::from([
                    ("broker".to_string(), Value::from("b-1:9092")),
                    ("topic".to_string(), Value::from("orders")),
                ])),
            ),
        ]);
        assert!(matches!(
            diff(&desired, &current, Some(&schema)),
            Diff::Replace { .. }
        ));

        let broker_only = resource(&[
            ("endpoint_id", Value::from("test")),
            (
                "kafka_settings",
                Value::Map(HashMap::from([(
                    "broker".to_string(),
                    Value::from("b-1:9092"),
                )])),
            ),
        ]);
        assert!(matches!(
            diff(&broker_only, &current, Some(&schema)),
            Diff::Update { .. }
        ));
    }

    #[test]
    fn planned_read_only_value_is_compared() {
        let schema = endpoint_schema();
        let tags = |pairs: &[(&str, &str)]| {
            Value::Map(
                pairs
                    .iter()
                    .map(|(k, v)| (k.to_string(), Value::from(*v)))
                    .collect(),
            )
        };
        let current = state(&[
            ("endpoint_id", Value::from("test")),
            ("tags_all", tags(&[("a", "1")])),
        ]);

        let planned = resource(&[
            ("endpoint_id", Value::from("test")),
            ("tags_all", tags(&[("a", "1"), ("b", "2")])),
        ]);
        match diff(&planned, &current, Some(&schema)) {
            Diff::Update {
                changed_attributes, ..
            } => assert_eq!(changed_attributes, vec!["tags_all".to_string()]),
            other => panic!("Expected Update, got {:?}", other),
        }

        let unplanned = resource(&[("endpoint_id", Value::from("test"))]);
        assert!(matches!(
            diff(&unplanned, &current, Some(&schema)),
            Diff::NoChange(_)
        ));
    }

    #[test]
    fn merge_prior_state_carries_unreported_values() {
        let schema = endpoint_schema();
        let mut prior_block = HashMap::new();
        prior_block.insert("broker".to_string(), Value::from("b-1:9092"));
        prior_block.insert("sasl_password".to_string(), Value::from("secret"));
        let timeouts = Value::Map(HashMap::from([(
            "create".to_string(),
            Value::from("30m"),
        )]));
        let prior = attrs(&[
            ("port", Value::Int(5432)),
            ("password", Value::from("hunter2")),
            ("arn", Value::from("arn:old")),
            ("kafka_settings", Value::Map(prior_block)),
            (Timeouts::ATTRIBUTE, timeouts.clone()),
        ]);

        let mut refreshed_block = HashMap::new();
        refreshed_block.insert("broker".to_string(), Value::from("b-1:9092"));
        let mut refreshed = attrs(&[("kafka_settings", Value::Map(refreshed_block))]);

        merge_prior_state(Some(&schema), &mut refreshed, &prior);

        assert!(!refreshed.contains_key("port"));
        assert!(!refreshed.contains_key("arn"));
        assert_eq!(refreshed["password"], Value::from("hunter2"));
        assert_eq!(refreshed[Timeouts::ATTRIBUTE], timeouts);
        let block = refreshed["kafka_settings"].as_map().unwrap();
        assert_eq!(block["sasl_password"], Value::from("secret"));
    }

    #[test]
    fn attribute_cleared_remotely_shows_as_drift() {
        let schema = endpoint_schema();
        let prior = attrs(&[("endpoint_id", Value::from("test")), ("port", Value::Int(5432))]);
        let mut refreshed = attrs(&[("endpoint_id", Value::from("test"))]);

        merge_prior_state(Some(&schema), &mut refreshed, &prior);
        let current = State::existing(ResourceId::new("endpoint", "test"), refreshed)
            .with_identifier("test");

        let desired = resource(&[("endpoint_id", Value::from("test")), ("port", Value::Int(5432))]);
        match diff(&desired, &current, Some(&schema)) {
            Diff::Update {
                changed_attributes, ..
            } => assert_eq!(changed_attributes, vec!["port".to_string()]),
            other => panic!("Expected Update, got {:?}", other),
        }
    }

    #[test]
    fn create_plan_from_resources() {
        let resources = vec![
            Resource::new("bucket", "new-bucket"),
            Resource::new("bucket", "existing-bucket")
                .with_attribute("versioning", Value::Bool(true)),
            Resource::new("bucket", "lookup").with_read_only(true),
        ];

        let mut current_states = HashMap::new();
        let mut attrs = HashMap::new();
        attrs.insert("versioning".to_string(), Value::Bool(false));
        current_states.insert(
            ResourceId::new("bucket", "existing-bucket"),
            State::existing(ResourceId::new("bucket", "existing-bucket"), attrs),
        );
        current_states.insert(
            ResourceId::new("bucket", "orphan"),
            State::existing(
                ResourceId::new("bucket", "orphan"),
                HashMap::from([(
                    Timeouts::ATTRIBUTE.to_string(),
                    Value::Map([("delete".to_string(), Value::from("5m"))].into()),
                )]),
            )
            .with_identifier("orphan-id"),
        );

        let plan = create_plan(&resources, &current_states, &HashMap::new());

        assert_eq!(plan.effects().len(), 3);
        assert!(matches!(plan.effects()[0], Effect::Create(_)));
        assert!(matches!(plan.effects()[1], Effect::Update { .. }));
        assert!(matches!(
            &plan.effects()[2],
            Effect::Delete { identifier, timeouts, .. }
                if identifier == "orphan-id"
                    && timeouts.delete == Some(std::time::Duration::from_secs(300))
        ));
    }
}
