//! Typed access to attribute maps
//!
//! Getters follow "set means non-empty": an empty string, list or map reads
//! as absent. `AttributeMap` is the write side used by the flatteners; it
//! silently skips `None`, mirroring an unset response field.

use std::collections::HashMap;

use carina_core::provider::{ProviderError, ProviderResult};
use carina_core::resource::{ResourceId, Value};
use carina_core::schema::{AttributeSchema, ResourceSchema};
use carina_core::waiter::Timeouts;

pub type Attributes = HashMap<String, Value>;

fn get<'a>(attrs: &'a Attributes, key: &str) -> Option<&'a Value> {
    attrs.get(key).filter(|v| !v.is_empty())
}

pub fn get_str<'a>(attrs: &'a Attributes, key: &str) -> Option<&'a str> {
    get(attrs, key).and_then(Value::as_str)
}

pub fn get_string(attrs: &Attributes, key: &str) -> Option<String> {
    get_str(attrs, key).map(str::to_string)
}

/// String value or `""`, for request fields that are always sent
pub fn str_or_empty(attrs: &Attributes, key: &str) -> String {
    get_string(attrs, key).unwrap_or_default()
}

pub fn get_i32(attrs: &Attributes, key: &str) -> Option<i32> {
    get(attrs, key)
        .and_then(Value::as_int)
        .and_then(|n| i32::try_from(n).ok())
}

pub fn get_bool(attrs: &Attributes, key: &str) -> Option<bool> {
    get(attrs, key).and_then(Value::as_bool)
}

pub fn bool_or_false(attrs: &Attributes, key: &str) -> bool {
    get_bool(attrs, key).unwrap_or(false)
}

pub fn get_block<'a>(attrs: &'a Attributes, key: &str) -> Option<&'a Attributes> {
    get(attrs, key).and_then(Value::as_map)
}

pub fn get_string_list(attrs: &Attributes, key: &str) -> Option<Vec<String>> {
    get(attrs, key).and_then(Value::as_list).map(|items| {
        items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect()
    })
}

pub fn get_string_map(attrs: &Attributes, key: &str) -> HashMap<String, String> {
    get(attrs, key)
        .and_then(Value::as_map)
        .map(|map| {
            map.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

/// Structural equality treating empty values as absent and comparing
/// scalars through their string form, so `Int(5)` equals `String("5")`.
fn same(old: Option<&Value>, new: Option<&Value>) -> bool {
    let old = old.filter(|v| !v.is_empty());
    let new = new.filter(|v| !v.is_empty());
    match (old, new) {
        (None, None) => true,
        (Some(Value::Map(a)), Some(Value::Map(b))) => a
            .keys()
            .chain(b.keys())
            .all(|k| same(a.get(k), b.get(k))),
        (Some(Value::List(a)), Some(Value::List(b))) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| same(Some(x), Some(y)))
        }
        (Some(Value::Int(a)), Some(b)) | (Some(b), Some(Value::Int(a))) => b.as_int() == Some(*a),
        (Some(Value::Bool(a)), Some(b)) | (Some(b), Some(Value::Bool(a))) => {
            b.as_bool() == Some(*a)
        }
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// Whether `key` differs between the prior state and the planned attributes
pub fn has_change(from: &Attributes, to: &Attributes, key: &str) -> bool {
    !same(from.get(key), to.get(key))
}

pub fn has_changes(from: &Attributes, to: &Attributes, keys: &[&str]) -> bool {
    keys.iter().any(|k| has_change(from, to, k))
}

/// Like `has_change` but for a single field of a nested block
pub fn has_block_change(from: &Attributes, to: &Attributes, block: &str, field: &str) -> bool {
    let old = from.get(block).and_then(Value::as_map).and_then(|m| m.get(field));
    let new = to.get(block).and_then(Value::as_map).and_then(|m| m.get(field));
    !same(old, new)
}

/// Any user attribute other than `except` (and internal `_` keys) changed
pub fn has_changes_except(from: &Attributes, to: &Attributes, except: &[&str]) -> bool {
    from.keys()
        .chain(to.keys())
        .filter(|k| !k.starts_with('_') && !except.contains(&k.as_str()))
        .any(|k| has_change(from, to, k))
}

/// Operation timeouts configured on a resource
pub fn configured_timeouts(id: &ResourceId, attrs: &Attributes) -> ProviderResult<Timeouts> {
    Timeouts::from_attributes(attrs).map_err(|e| ProviderError::new(e).for_resource(id.clone()))
}

/// Planned attribute map for an update: the desired attributes, with
/// computed attributes the configuration leaves out taken from the prior
/// state. Read-only attributes always come from the prior state.
/// Nested blocks are filled the same way, field by field.
pub fn planned(schema: &ResourceSchema, from: &Attributes, to: &Attributes) -> Attributes {
    let mut planned = schema.normalize(to);
    fill_unconfigured(schema.attributes.values(), &mut planned, from);
    planned
}

fn fill_unconfigured<'a>(
    fields: impl IntoIterator<Item = &'a AttributeSchema>,
    planned: &mut Attributes,
    prior: &Attributes,
) {
    for attr in fields {
        let name = &attr.name;
        let Some(prior_value) = prior.get(name) else {
            continue;
        };
        let configured = planned.get(name).is_some_and(|v| !v.is_empty());
        if attr.read_only || (attr.computed && !configured) {
            planned.insert(name.clone(), prior_value.clone());
        } else if let (Some(nested), Some(prior_block), Some(Value::Map(block))) = (
            attr.attr_type.block_fields(),
            prior_value.as_map(),
            planned.get_mut(name),
        ) {
            fill_unconfigured(nested, block, prior_block);
        }
    }
}

// =============================================================================
// Flatten helpers
// =============================================================================

/// Conversion of SDK response fields into attribute values
pub trait IntoValue {
    fn into_value(self) -> Option<Value>;
}

impl IntoValue for &str {
    fn into_value(self) -> Option<Value> {
        Some(Value::String(self.to_string()))
    }
}

impl IntoValue for String {
    fn into_value(self) -> Option<Value> {
        Some(Value::String(self))
    }
}

impl IntoValue for i32 {
    fn into_value(self) -> Option<Value> {
        Some(Value::Int(i64::from(self)))
    }
}

impl IntoValue for i64 {
    fn into_value(self) -> Option<Value> {
        Some(Value::Int(self))
    }
}

impl IntoValue for bool {
    fn into_value(self) -> Option<Value> {
        Some(Value::Bool(self))
    }
}

impl IntoValue for Value {
    fn into_value(self) -> Option<Value> {
        Some(self)
    }
}

impl IntoValue for &[String] {
    fn into_value(self) -> Option<Value> {
        Some(Value::List(self.iter().cloned().map(Value::String).collect()))
    }
}

impl IntoValue for Vec<String> {
    fn into_value(self) -> Option<Value> {
        Some(Value::List(self.into_iter().map(Value::String).collect()))
    }
}

impl<T: IntoValue> IntoValue for Option<T> {
    fn into_value(self) -> Option<Value> {
        self.and_then(IntoValue::into_value)
    }
}

/// Attribute map under construction
#[derive(Debug, Default, Clone)]
pub struct AttributeMap(Attributes);

impl AttributeMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: &str, value: impl IntoValue) -> &mut Self {
        if let Some(value) = value.into_value() {
            self.0.insert(key.to_string(), value);
        }
        self
    }

    /// Store a nested block; an empty block is stored as absent
    pub fn set_block(&mut self, key: &str, block: Option<AttributeMap>) -> &mut Self {
        if let Some(block) = block.filter(|b| !b.0.is_empty()) {
            self.0.insert(key.to_string(), Value::Map(block.0));
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn into_inner(self) -> Attributes {
        self.0
    }
}

impl From<AttributeMap> for Attributes {
    fn from(map: AttributeMap) -> Self {
        map.0
    }
}

#[cfg(test)]
mod tests {
    use carina_core::schema::{AttributeSchema, AttributeType};

    use super::*;

    fn attrs(pairs: &[(&str, Value)]) -> Attributes {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn getters_treat_empty_as_unset() {
        let a = attrs(&[
            ("server_name", Value::from("")),
            ("port", Value::Int(5432)),
            ("subnet_ids", Value::List(vec![Value::from("subnet-1")])),
        ]);
        assert_eq!(get_str(&a, "server_name"), None);
        assert_eq!(str_or_empty(&a, "server_name"), "");
        assert_eq!(get_i32(&a, "port"), Some(5432));
        assert_eq!(
            get_string_list(&a, "subnet_ids"),
            Some(vec!["subnet-1".to_string()])
        );
        assert!(!bool_or_false(&a, "pause_replication_tasks"));
    }

    #[test]
    fn change_detection() {
        let from = attrs(&[
            ("port", Value::Int(5432)),
            ("password", Value::from("")),
            ("tags", Value::Map(HashMap::new())),
        ]);
        let to = attrs(&[("port", Value::from("5432")), ("username", Value::from("dms"))]);
        assert!(!has_change(&from, &to, "port"));
        assert!(!has_change(&from, &to, "password"));
        assert!(has_change(&from, &to, "username"));
        assert!(has_changes_except(&from, &to, &["tags"]));
        assert!(!has_changes_except(&from, &to, &["username"]));
    }

    #[test]
    fn block_field_changes() {
        let mut old = HashMap::new();
        old.insert("topic".to_string(), Value::from("a"));
        let mut new = old.clone();
        new.insert("broker".to_string(), Value::from("b-1:9092"));
        let from = attrs(&[("kafka_settings", Value::Map(old))]);
        let to = attrs(&[("kafka_settings", Value::Map(new))]);
        assert!(has_change(&from, &to, "kafka_settings"));
        assert!(has_block_change(&from, &to, "kafka_settings", "broker"));
        assert!(!has_block_change(&from, &to, "kafka_settings", "topic"));
    }

    #[test]
    fn planned_keeps_unconfigured_computed_attributes() {
        let schema = ResourceSchema::new("dms_endpoint")
            .attribute(AttributeSchema::new("ssl_mode", AttributeType::String).computed())
            .attribute(AttributeSchema::new("endpoint_arn", AttributeType::String).read_only())
            .attribute(AttributeSchema::new("username", AttributeType::String));
        let from = attrs(&[
            ("ssl_mode", Value::from("require")),
            ("endpoint_arn", Value::from("arn:aws:dms:us-east-1:123456789012:endpoint:X")),
            ("username", Value::from("old")),
        ]);
        let to = attrs(&[]);
        let planned = planned(&schema, &from, &to);
        assert_eq!(planned["ssl_mode"], Value::from("require"));
        assert!(planned.contains_key("endpoint_arn"));
        assert!(!planned.contains_key("username"));
    }

    #[test]
    fn planned_fills_computed_block_fields() {
        let schema = ResourceSchema::new("dms_endpoint").attribute(AttributeSchema::new(
            "kafka_settings",
            AttributeType::Block(vec![
                AttributeSchema::new("broker", AttributeType::String),
                AttributeSchema::new("topic", AttributeType::String).computed(),
            ]),
        ));
        let block = |pairs: &[(&str, &str)]| {
            Value::Map(
                pairs
                    .iter()
                    .map(|(k, v)| (k.to_string(), Value::from(*v)))
                    .collect(),
            )
        };
        let from = attrs(&[(
            "kafka_settings",
            block(&[("broker", "b-1:9092"), ("topic", "kafka-default-topic")]),
        )]);
        let to = attrs(&[("kafka_settings", block(&[("broker", "b-2:9092")]))]);

        let planned = planned(&schema, &from, &to);
        let settings = planned["kafka_settings"].as_map().unwrap();
        assert_eq!(settings["broker"], Value::from("b-2:9092"));
        assert_eq!(settings["topic"], Value::from("kafka-default-topic"));
    }

    #[test]
    fn attribute_map_skips_missing_values() {
        let mut map = AttributeMap::new();
        map.set("port", Some(3306))
            .set("server_name", None::<&str>)
            .set("multi_az", false)
            .set_block("s3_settings", Some(AttributeMap::new()));
        let map = map.into_inner();
        assert_eq!(map.get("port"), Some(&Value::Int(3306)));
        assert!(!map.contains_key("server_name"));
        assert!(!map.contains_key("s3_settings"));
        assert_eq!(map.get("multi_az"), Some(&Value::Bool(false)));
    }
}
