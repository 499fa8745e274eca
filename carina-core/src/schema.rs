//! Schema - Define type schemas for resources
//!
//! Providers define schemas for each resource type. A schema drives three
//! things: validation of the configuration, normalization (defaults and
//! state functions) and the attribute-level behavior the differ relies on
//! (`force_new`, `computed`, `sensitive`, diff suppression).

use std::collections::HashMap;
use std::fmt;

use crate::resource::Value;

/// Decides whether a difference between the stored and desired value of an
/// attribute should be ignored. Receives the attribute key, old value, new
/// value and the complete desired attribute map.
pub type DiffSuppressFn = fn(&str, &Value, &Value, &HashMap<String, Value>) -> bool;

/// Rewrites a configured value into the form the remote API reports
pub type StateFn = fn(&Value) -> Value;

/// Cross-attribute validation over the complete desired attribute map
pub type ResourceValidator = fn(&HashMap<String, Value>) -> Result<(), String>;

/// Attribute type
#[derive(Debug, Clone)]
pub enum AttributeType {
    /// String
    String,
    /// Integer
    Int,
    /// Boolean
    Bool,
    /// Enum (list of allowed values)
    Enum(Vec<String>),
    /// Custom type (with validation function)
    Custom {
        name: String,
        base: Box<AttributeType>,
        validate: fn(&Value) -> Result<(), String>,
    },
    /// List
    List(Box<AttributeType>),
    /// Unordered collection of unique values
    Set(Box<AttributeType>),
    /// Map
    Map(Box<AttributeType>),
    /// Nested configuration block holding at most one object
    Block(Vec<AttributeSchema>),
}

impl AttributeType {
    /// Check if a value conforms to this type
    pub fn validate(&self, value: &Value) -> Result<(), TypeError> {
        match (self, value) {
            // References resolve at apply time; their type is checked then.
            (_, Value::ResourceRef(_, _)) => Ok(()),
            (AttributeType::String, Value::String(_)) => Ok(()),
            (AttributeType::Int, Value::Int(_)) => Ok(()),
            (AttributeType::Bool, Value::Bool(_)) => Ok(()),

            (AttributeType::Enum(variants), Value::String(s)) => {
                if variants.iter().any(|v| v == s) {
                    Ok(())
                } else {
                    Err(TypeError::InvalidEnumVariant {
                        value: s.clone(),
                        expected: variants.clone(),
                    })
                }
            }

            (AttributeType::Custom { validate, base, .. }, v) => {
                base.validate(v)?;
                validate(v).map_err(|msg| TypeError::ValidationFailed { message: msg })
            }

            (AttributeType::List(inner) | AttributeType::Set(inner), Value::List(items)) => {
                for (i, item) in items.iter().enumerate() {
                    inner.validate(item).map_err(|e| TypeError::ListItemError {
                        index: i,
                        inner: Box::new(e),
                    })?;
                }
                Ok(())
            }

            (AttributeType::Map(inner), Value::Map(map)) => {
                for (k, v) in map {
                    inner.validate(v).map_err(|e| TypeError::MapValueError {
                        key: k.clone(),
                        inner: Box::new(e),
                    })?;
                }
                Ok(())
            }

            (AttributeType::Block(fields), Value::Map(map)) => {
                let errors = validate_fields(fields, map);
                match errors.into_iter().next() {
                    None => Ok(()),
                    Some(e) => Err(e),
                }
            }

            _ => Err(TypeError::TypeMismatch {
                expected: self.type_name(),
                got: value.type_name(),
            }),
        }
    }

    fn type_name(&self) -> String {
        match self {
            AttributeType::String => "String".to_string(),
            AttributeType::Int => "Int".to_string(),
            AttributeType::Bool => "Bool".to_string(),
            AttributeType::Enum(variants) => format!("Enum({})", variants.join(" | ")),
            AttributeType::Custom { name, .. } => name.clone(),
            AttributeType::List(inner) => format!("List<{}>", inner.type_name()),
            AttributeType::Set(inner) => format!("Set<{}>", inner.type_name()),
            AttributeType::Map(inner) => format!("Map<{}>", inner.type_name()),
            AttributeType::Block(_) => "Block".to_string(),
        }
    }

    /// Nested field schemas when this is a block type
    pub fn block_fields(&self) -> Option<&[AttributeSchema]> {
        match self {
            AttributeType::Block(fields) => Some(fields),
            _ => None,
        }
    }

    pub fn is_set(&self) -> bool {
        matches!(self, AttributeType::Set(_))
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_name())
    }
}

/// Type error
#[derive(Debug, Clone, thiserror::Error)]
pub enum TypeError {
    #[error("Type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: String, got: String },

    #[error("Invalid enum variant '{value}', expected one of: {}", expected.join(", "))]
    InvalidEnumVariant {
        value: String,
        expected: Vec<String>,
    },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    #[error("Required attribute '{name}' is missing")]
    MissingRequired { name: String },

    #[error("Unknown attribute '{name}'")]
    UnknownAttribute { name: String },

    #[error("Attribute '{name}' is read-only and cannot be configured")]
    ReadOnly { name: String },

    #[error("Attribute '{name}' conflicts with '{other}'")]
    Conflict { name: String, other: String },

    #[error("Attribute '{name}' requires '{other}' to be set")]
    RequiredWith { name: String, other: String },

    #[error("List item at index {index}: {inner}")]
    ListItemError { index: usize, inner: Box<TypeError> },

    #[error("Map value for key '{key}': {inner}")]
    MapValueError { key: String, inner: Box<TypeError> },

    #[error("In '{name}': {inner}")]
    AttributeError { name: String, inner: Box<TypeError> },

    #[error("{message}")]
    Invalid { message: String },
}

impl Value {
    fn type_name(&self) -> String {
        match self {
            Value::String(_) => "String".to_string(),
            Value::Int(_) => "Int".to_string(),
            Value::Bool(_) => "Bool".to_string(),
            Value::List(_) => "List".to_string(),
            Value::Map(_) => "Map".to_string(),
            Value::ResourceRef(binding, attr) => format!("ResourceRef({}.{})", binding, attr),
        }
    }
}

/// Attribute schema
#[derive(Debug, Clone)]
pub struct AttributeSchema {
    pub name: String,
    pub attr_type: AttributeType,
    pub required: bool,
    /// Value may be reported by the remote side when not configured
    pub computed: bool,
    /// Value is only ever reported by the remote side
    pub read_only: bool,
    /// Changing this attribute requires replacing the resource
    pub force_new: bool,
    /// Value is masked in plan output
    pub sensitive: bool,
    /// Value is sent to the remote side but never reported back
    pub write_only: bool,
    pub default: Option<Value>,
    pub description: Option<String>,
    pub conflicts_with: Vec<String>,
    pub required_with: Vec<String>,
    pub diff_suppress: Option<DiffSuppressFn>,
    pub state_func: Option<StateFn>,
}

impl AttributeSchema {
    pub fn new(name: impl Into<String>, attr_type: AttributeType) -> Self {
        Self {
            name: name.into(),
            attr_type,
            required: false,
            computed: false,
            read_only: false,
            force_new: false,
            sensitive: false,
            write_only: false,
            default: None,
            description: None,
            conflicts_with: Vec::new(),
            required_with: Vec::new(),
            diff_suppress: None,
            state_func: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn computed(mut self) -> Self {
        self.computed = true;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.computed = true;
        self.read_only = true;
        self
    }

    pub fn force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    pub fn write_only(mut self) -> Self {
        self.write_only = true;
        self
    }

    /// Whether a refresh can never report this attribute
    pub fn is_unreported(&self) -> bool {
        self.sensitive || self.write_only
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn conflicts_with(mut self, others: &[&str]) -> Self {
        self.conflicts_with
            .extend(others.iter().map(|s| s.to_string()));
        self
    }

    pub fn required_with(mut self, others: &[&str]) -> Self {
        self.required_with.extend(others.iter().map(|s| s.to_string()));
        self
    }

    pub fn with_diff_suppress(mut self, f: DiffSuppressFn) -> Self {
        self.diff_suppress = Some(f);
        self
    }

    pub fn with_state_func(mut self, f: StateFn) -> Self {
        self.state_func = Some(f);
        self
    }
}

/// Resource schema
#[derive(Debug, Clone)]
pub struct ResourceSchema {
    pub resource_type: String,
    pub attributes: HashMap<String, AttributeSchema>,
    pub description: Option<String>,
    pub validators: Vec<ResourceValidator>,
}

impl ResourceSchema {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            attributes: HashMap::new(),
            description: None,
            validators: Vec::new(),
        }
    }

    pub fn attribute(mut self, schema: AttributeSchema) -> Self {
        self.attributes.insert(schema.name.clone(), schema);
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn with_validator(mut self, validator: ResourceValidator) -> Self {
        self.validators.push(validator);
        self
    }

    /// Validate resource attributes. Keys starting with `_` are internal
    /// and skipped.
    pub fn validate(&self, attributes: &HashMap<String, Value>) -> Result<(), Vec<TypeError>> {
        let fields: Vec<AttributeSchema> = self.attributes.values().cloned().collect();
        let user: HashMap<String, Value> = attributes
            .iter()
            .filter(|(k, _)| !k.starts_with('_'))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let mut errors = validate_fields(&fields, &user);

        // Cross-attribute rules only make sense on an otherwise valid map
        if errors.is_empty() {
            for validator in &self.validators {
                if let Err(message) = validator(&user) {
                    errors.push(TypeError::Invalid { message });
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Fill in defaults and apply state functions, recursing into blocks
    pub fn normalize(&self, attributes: &HashMap<String, Value>) -> HashMap<String, Value> {
        let fields: Vec<&AttributeSchema> = self.attributes.values().collect();
        normalize_fields(&fields, attributes)
    }
}

fn is_set(attributes: &HashMap<String, Value>, name: &str) -> bool {
    attributes.get(name).is_some_and(|v| !v.is_empty())
}

fn validate_fields(
    fields: &[AttributeSchema],
    attributes: &HashMap<String, Value>,
) -> Vec<TypeError> {
    let mut errors = Vec::new();

    for schema in fields {
        let name = &schema.name;
        if schema.required && !attributes.contains_key(name) && schema.default.is_none() {
            errors.push(TypeError::MissingRequired { name: name.clone() });
        }
        if !is_set(attributes, name) {
            continue;
        }
        for other in &schema.conflicts_with {
            if is_set(attributes, other) {
                errors.push(TypeError::Conflict {
                    name: name.clone(),
                    other: other.clone(),
                });
            }
        }
        for other in &schema.required_with {
            if !is_set(attributes, other) {
                errors.push(TypeError::RequiredWith {
                    name: name.clone(),
                    other: other.clone(),
                });
            }
        }
    }

    for (name, value) in attributes {
        match fields.iter().find(|f| &f.name == name) {
            Some(schema) if schema.read_only => {
                errors.push(TypeError::ReadOnly { name: name.clone() })
            }
            Some(schema) => {
                if let Err(e) = schema.attr_type.validate(value) {
                    errors.push(match schema.attr_type {
                        AttributeType::Block(_) => TypeError::AttributeError {
                            name: name.clone(),
                            inner: Box::new(e),
                        },
                        _ => e,
                    });
                }
            }
            None => errors.push(TypeError::UnknownAttribute { name: name.clone() }),
        }
    }

    errors
}

fn normalize_fields(
    fields: &[&AttributeSchema],
    attributes: &HashMap<String, Value>,
) -> HashMap<String, Value> {
    let mut result = attributes.clone();
    for schema in fields {
        match attributes.get(&schema.name) {
            None => {
                if let Some(default) = &schema.default {
                    result.insert(schema.name.clone(), default.clone());
                }
            }
            Some(Value::Map(block)) => {
                if let AttributeType::Block(nested) = &schema.attr_type {
                    let nested: Vec<&AttributeSchema> = nested.iter().collect();
                    let normalized = normalize_fields(&nested, block);
                    result.insert(schema.name.clone(), Value::Map(normalized));
                }
            }
            Some(value) => {
                if let Some(state_func) = schema.state_func
                    && !value.is_unresolved()
                {
                    let normalized = state_func(value);
                    result.insert(schema.name.clone(), normalized);
                }
            }
        }
    }
    result
}

/// Helper functions for common types
pub mod types {
    use super::*;

    /// Positive integer type
    pub fn positive_int() -> AttributeType {
        AttributeType::Custom {
            name: "PositiveInt".to_string(),
            base: Box::new(AttributeType::Int),
            validate: |value| {
                if let Value::Int(n) = value {
                    if *n > 0 {
                        Ok(())
                    } else {
                        Err("Value must be positive".to_string())
                    }
                } else {
                    Err("Expected integer".to_string())
                }
            },
        }
    }

    /// String holding a JSON document
    pub fn json() -> AttributeType {
        AttributeType::Custom {
            name: "Json".to_string(),
            base: Box::new(AttributeType::String),
            validate: |value| match value {
                Value::String(s) => serde_json::from_str::<serde_json::Value>(s)
                    .map(|_| ())
                    .map_err(|e| format!("invalid JSON: {}", e)),
                _ => Err("Expected string".to_string()),
            },
        }
    }

    pub fn string_list() -> AttributeType {
        AttributeType::List(Box::new(AttributeType::String))
    }

    pub fn string_set() -> AttributeType {
        AttributeType::Set(Box::new(AttributeType::String))
    }

    pub fn string_map() -> AttributeType {
        AttributeType::Map(Box::new(AttributeType::String))
    }

    pub fn string_enum(values: &[&str]) -> AttributeType {
        AttributeType::Enum(values.iter().map(|s| s.to_string()).collect())
    }

    /// Inclusive integer range check for use inside `Custom` validators
    pub fn check_int_between(value: &Value, min: i64, max: i64) -> Result<(), String> {
        match value {
            Value::Int(n) if (min..=max).contains(n) => Ok(()),
            Value::Int(n) => Err(format!("expected value in range {}-{}, got {}", min, max, n)),
            _ => Err("Expected integer".to_string()),
        }
    }

    pub fn check_int_at_least(value: &Value, min: i64) -> Result<(), String> {
        match value {
            Value::Int(n) if *n >= min => Ok(()),
            Value::Int(n) => Err(format!("expected value of at least {}, got {}", min, n)),
            _ => Err("Expected integer".to_string()),
        }
    }

    pub fn check_int_in(value: &Value, allowed: &[i64]) -> Result<(), String> {
        match value {
            Value::Int(n) if allowed.contains(n) => Ok(()),
            Value::Int(n) => Err(format!(
                "expected one of {}, got {}",
                allowed
                    .iter()
                    .map(|a| a.to_string())
                    .collect::<Vec<_>>()
                    .join(", "),
                n
            )),
            _ => Err("Expected integer".to_string()),
        }
    }

    /// Case-insensitive membership check for string enums
    pub fn check_string_in_fold(value: &Value, allowed: &[&str]) -> Result<(), String> {
        match value {
            Value::String(s) if allowed.iter().any(|a| a.eq_ignore_ascii_case(s)) => Ok(()),
            Value::String(s) => Err(format!(
                "expected one of {}, got '{}'",
                allowed.join(", "),
                s
            )),
            _ => Err("Expected string".to_string()),
        }
    }

    /// State function lower-casing string values
    pub fn lowercase(value: &Value) -> Value {
        match value {
            Value::String(s) => Value::String(s.to_lowercase()),
            other => other.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_string_type() {
        let t = AttributeType::String;
        assert!(t.validate(&Value::String("hello".to_string())).is_ok());
        assert!(t.validate(&Value::Int(42)).is_err());
        assert!(
            t.validate(&Value::ResourceRef("src".into(), "endpoint_arn".into()))
                .is_ok()
        );
    }

    #[test]
    fn validate_enum_type() {
        let t = types::string_enum(&["source", "target"]);
        assert!(t.validate(&Value::from("source")).is_ok());
        assert!(t.validate(&Value::from("SOURCE")).is_err());
    }

    #[test]
    fn validate_positive_int() {
        let t = types::positive_int();
        assert!(t.validate(&Value::Int(1)).is_ok());
        assert!(t.validate(&Value::Int(100)).is_ok());
        assert!(t.validate(&Value::Int(0)).is_err());
        assert!(t.validate(&Value::Int(-1)).is_err());
        assert!(t.validate(&Value::from("1")).is_err());
    }

    #[test]
    fn validate_json_type() {
        let t = types::json();
        assert!(t.validate(&Value::from(r#"{"rules":[]}"#)).is_ok());
        assert!(t.validate(&Value::from("{rules")).is_err());
    }

    #[test]
    fn validate_resource_schema() {
        let schema = ResourceSchema::new("resource")
            .attribute(AttributeSchema::new("name", AttributeType::String).required())
            .attribute(AttributeSchema::new("count", types::positive_int()))
            .attribute(AttributeSchema::new("enabled", AttributeType::Bool));

        let mut attrs = HashMap::new();
        attrs.insert("name".to_string(), Value::String("my-resource".to_string()));
        attrs.insert("count".to_string(), Value::Int(5));
        attrs.insert("enabled".to_string(), Value::Bool(true));
        attrs.insert("_binding".to_string(), Value::from("res"));

        assert!(schema.validate(&attrs).is_ok());
    }

    #[test]
    fn missing_required_attribute() {
        let schema = ResourceSchema::new("bucket")
            .attribute(AttributeSchema::new("name", AttributeType::String).required());

        let attrs = HashMap::new();
        let result = schema.validate(&attrs);
        assert!(matches!(
            result.unwrap_err().as_slice(),
            [TypeError::MissingRequired { .. }]
        ));
    }

    #[test]
    fn unknown_and_read_only_attributes_are_rejected() {
        let schema = ResourceSchema::new("thing")
            .attribute(AttributeSchema::new("arn", AttributeType::String).read_only());

        let mut attrs = HashMap::new();
        attrs.insert("arn".to_string(), Value::from("arn:aws:dms:x"));
        attrs.insert("bogus".to_string(), Value::Int(1));

        let errors = schema.validate(&attrs).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().any(|e| matches!(e, TypeError::ReadOnly { .. })));
        assert!(
            errors
                .iter()
                .any(|e| matches!(e, TypeError::UnknownAttribute { .. }))
        );
    }

    #[test]
    fn conflicting_and_required_with_attributes() {
        let schema = ResourceSchema::new("endpoint")
            .attribute(
                AttributeSchema::new("secrets_manager_arn", AttributeType::String)
                    .conflicts_with(&["password"])
                    .required_with(&["secrets_manager_access_role_arn"]),
            )
            .attribute(AttributeSchema::new(
                "secrets_manager_access_role_arn",
                AttributeType::String,
            ))
            .attribute(AttributeSchema::new("password", AttributeType::String));

        let mut attrs = HashMap::new();
        attrs.insert("secrets_manager_arn".to_string(), Value::from("arn:secret"));
        attrs.insert("password".to_string(), Value::from("hunter2"));

        let errors = schema.validate(&attrs).unwrap_err();
        assert!(errors.iter().any(|e| matches!(e, TypeError::Conflict { .. })));
        assert!(
            errors
                .iter()
                .any(|e| matches!(e, TypeError::RequiredWith { .. }))
        );
    }

    #[test]
    fn block_fields_are_validated() {
        let schema = ResourceSchema::new("endpoint").attribute(AttributeSchema::new(
            "kafka_settings",
            AttributeType::Block(vec![
                AttributeSchema::new("broker", AttributeType::String).required(),
                AttributeSchema::new("topic", AttributeType::String),
            ]),
        ));

        let mut block = HashMap::new();
        block.insert("topic".to_string(), Value::from("t"));
        let mut attrs = HashMap::new();
        attrs.insert("kafka_settings".to_string(), Value::Map(block));

        let errors = schema.validate(&attrs).unwrap_err();
        assert!(matches!(
            &errors[0],
            TypeError::AttributeError { name, .. } if name == "kafka_settings"
        ));
    }

    #[test]
    fn resource_validators_run_after_type_checks() {
        let schema = ResourceSchema::new("endpoint")
            .attribute(AttributeSchema::new("engine_name", AttributeType::String))
            .with_validator(|attrs| {
                if attrs.get("engine_name").and_then(Value::as_str) == Some("kafka") {
                    Err("kafka_settings must be set".to_string())
                } else {
                    Ok(())
                }
            });

        let mut attrs = HashMap::new();
        attrs.insert("engine_name".to_string(), Value::from("kafka"));
        let errors = schema.validate(&attrs).unwrap_err();
        assert_eq!(errors[0].to_string(), "kafka_settings must be set");
    }

    #[test]
    fn normalize_applies_defaults_and_state_functions() {
        let schema = ResourceSchema::new("endpoint")
            .attribute(
                AttributeSchema::new("pause", AttributeType::Bool).with_default(Value::Bool(false)),
            )
            .attribute(AttributeSchema::new(
                "s3_settings",
                AttributeType::Block(vec![
                    AttributeSchema::new("canned_acl", AttributeType::String)
                        .with_state_func(types::lowercase),
                    AttributeSchema::new("csv_delimiter", AttributeType::String)
                        .with_default(Value::from(",")),
                ]),
            ));

        let mut block = HashMap::new();
        block.insert("canned_acl".to_string(), Value::from("BUCKET-OWNER-READ"));
        let mut attrs = HashMap::new();
        attrs.insert("s3_settings".to_string(), Value::Map(block));

        let normalized = schema.normalize(&attrs);
        assert_eq!(normalized["pause"], Value::Bool(false));
        let s3 = normalized["s3_settings"].as_map().unwrap();
        assert_eq!(s3["canned_acl"], Value::from("bucket-owner-read"));
        assert_eq!(s3["csv_delimiter"], Value::from(","));
    }

    #[test]
    fn range_helpers() {
        assert!(types::check_int_between(&Value::Int(5), 5, 6144).is_ok());
        assert!(types::check_int_between(&Value::Int(6145), 5, 6144).is_err());
        assert!(types::check_int_in(&Value::Int(192), &[1, 2, 192]).is_ok());
        assert!(types::check_int_in(&Value::Int(3), &[1, 2, 192]).is_err());
        assert!(types::check_string_in_fold(&Value::from("YYYYMMDD"), &["yyyymmdd"]).is_ok());
    }
}
