//! Config - Load infrastructure configuration from JSON
//!
//! A configuration file declares the provider, the state backend,
//! variables, managed resources and data sources:
//!
//! ```json
//! {
//!   "provider": { "name": "dms", "region": "us-east-1" },
//!   "backend": { "type": "local", "path": "carina.state.json" },
//!   "variables": { "password": "${env.DB_PASSWORD}" },
//!   "resources": [
//!     { "type": "dms_endpoint", "name": "source",
//!       "attributes": { "endpoint_id": "source", "password": "${var.password}" },
//!       "timeouts": { "delete": "15m" } }
//!   ],
//!   "data": [
//!     { "type": "dms_certificate", "name": "ca",
//!       "attributes": { "certificate_id": "rds-ca" } }
//!   ]
//! }
//! ```
//!
//! String values may interpolate `${var.NAME}`, `${env.NAME}` and, as a
//! whole value, `${binding.attribute}` to reference another resource.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::Deserialize;

use crate::resource::{Resource, Value};
use crate::waiter::Timeouts;

/// Attribute holding the binding name used in references
pub const BINDING_ATTRIBUTE: &str = "_binding";

/// Parse error
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Syntax error: {0}")]
    Syntax(#[from] serde_json::Error),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Invalid expression at {path}: {message}")]
    InvalidExpression { path: String, message: String },

    #[error("Invalid timeouts at {path}: {message}")]
    InvalidTimeouts { path: String, message: String },

    #[error("Undefined variable: {0}")]
    UndefinedVariable(String),

    #[error("Environment variable not set: {0}")]
    EnvVarNotSet(String),

    #[error("Duplicate resource definition: {0}")]
    DuplicateResource(String),

    #[error("Undefined reference: {0}")]
    UndefinedReference(String),
}

/// Provider configuration
#[derive(Debug, Clone, Default)]
pub struct ProviderConfig {
    pub name: String,
    pub attributes: HashMap<String, Value>,
}

/// Backend configuration for state storage
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Backend type (e.g., "local")
    pub backend_type: String,
    /// Backend-specific attributes
    pub attributes: HashMap<String, Value>,
}

/// Parse result
#[derive(Debug, Clone, Default)]
pub struct ParsedFile {
    pub provider: ProviderConfig,
    /// Managed resources followed by data sources (`read_only`)
    pub resources: Vec<Resource>,
    pub variables: HashMap<String, Value>,
    /// Backend configuration for state storage
    pub backend: Option<BackendConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawFile {
    provider: Option<RawProvider>,
    backend: Option<RawBackend>,
    #[serde(default)]
    variables: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    resources: Vec<RawResource>,
    #[serde(default)]
    data: Vec<RawResource>,
}

#[derive(Debug, Deserialize)]
struct RawProvider {
    name: String,
    #[serde(flatten)]
    attributes: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RawBackend {
    #[serde(rename = "type")]
    backend_type: String,
    #[serde(flatten)]
    attributes: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawResource {
    #[serde(rename = "type")]
    resource_type: String,
    name: String,
    #[serde(default)]
    attributes: serde_json::Map<String, serde_json::Value>,
    timeouts: Option<HashMap<String, String>>,
}

/// Interpolation context (variable scope)
struct ParseContext<'a> {
    variables: HashMap<String, Value>,
    env: &'a dyn Fn(&str) -> Option<String>,
}

impl ParseContext<'_> {
    fn convert(&self, json: &serde_json::Value, path: &str) -> Result<Option<Value>, ParseError> {
        match json {
            serde_json::Value::String(s) => self.interpolate(s, path).map(Some),
            serde_json::Value::Array(items) => {
                let mut values = Vec::new();
                for (i, item) in items.iter().enumerate() {
                    if let Some(v) = self.convert(item, &format!("{}[{}]", path, i))? {
                        values.push(v);
                    }
                }
                Ok(Some(Value::List(values)))
            }
            serde_json::Value::Object(map) => {
                let mut values = HashMap::new();
                for (k, v) in map {
                    if let Some(v) = self.convert(v, &format!("{}.{}", path, k))? {
                        values.insert(k.clone(), v);
                    }
                }
                Ok(Some(Value::Map(values)))
            }
            other => Ok(Value::from_json(other)),
        }
    }

    fn interpolate(&self, s: &str, path: &str) -> Result<Value, ParseError> {
        // A lone expression keeps the referenced value's type
        if let Some(expr) = s.strip_prefix("${").and_then(|rest| rest.strip_suffix('}'))
            && !expr.contains("${")
        {
            return self.evaluate(expr.trim(), path);
        }

        let mut out = String::new();
        let mut rest = s;
        while let Some(start) = rest.find("${") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let end = after.find('}').ok_or_else(|| ParseError::InvalidExpression {
                path: path.to_string(),
                message: format!("unterminated interpolation in '{}'", s),
            })?;
            match self.evaluate(after[..end].trim(), path)? {
                Value::String(v) => out.push_str(&v),
                Value::Int(i) => out.push_str(&i.to_string()),
                Value::Bool(b) => out.push_str(&b.to_string()),
                _ => {
                    return Err(ParseError::InvalidExpression {
                        path: path.to_string(),
                        message: format!(
                            "'{}' cannot be embedded in a string",
                            &after[..end]
                        ),
                    });
                }
            }
            rest = &after[end + 1..];
        }
        out.push_str(rest);
        Ok(Value::String(out))
    }

    fn evaluate(&self, expr: &str, path: &str) -> Result<Value, ParseError> {
        let (scope, name) = expr.split_once('.').ok_or_else(|| ParseError::InvalidExpression {
            path: path.to_string(),
            message: format!("expected 'scope.name', got '{}'", expr),
        })?;
        match scope {
            "var" => self
                .variables
                .get(name)
                .cloned()
                .ok_or_else(|| ParseError::UndefinedVariable(name.to_string())),
            "env" => (self.env)(name)
                .map(Value::String)
                .ok_or_else(|| ParseError::EnvVarNotSet(name.to_string())),
            binding => Ok(Value::ResourceRef(binding.to_string(), name.to_string())),
        }
    }
}

/// Parse a configuration document, reading `${env.X}` from the process environment
pub fn parse(input: &str) -> Result<ParsedFile, ParseError> {
    parse_with_env(input, &|name| std::env::var(name).ok())
}

/// Parse a configuration document with a custom environment lookup
pub fn parse_with_env(
    input: &str,
    env: &dyn Fn(&str) -> Option<String>,
) -> Result<ParsedFile, ParseError> {
    let raw: RawFile = serde_json::from_str(input)?;

    let mut ctx = ParseContext {
        variables: HashMap::new(),
        env,
    };

    // Variables may use env lookups but not each other
    let mut variables = HashMap::new();
    for (name, json) in &raw.variables {
        if let Some(value) = ctx.convert(json, &format!("variables.{}", name))? {
            if value.is_unresolved() {
                return Err(ParseError::InvalidExpression {
                    path: format!("variables.{}", name),
                    message: "variables cannot reference resources".to_string(),
                });
            }
            variables.insert(name.clone(), value);
        }
    }
    ctx.variables = variables.clone();

    let provider = match &raw.provider {
        Some(p) => ProviderConfig {
            name: p.name.clone(),
            attributes: convert_map(&ctx, &p.attributes, "provider")?,
        },
        None => ProviderConfig::default(),
    };

    let backend = match &raw.backend {
        Some(b) => Some(BackendConfig {
            backend_type: b.backend_type.clone(),
            attributes: convert_map(&ctx, &b.attributes, "backend")?,
        }),
        None => None,
    };

    let mut resources = Vec::new();
    let mut names = HashSet::new();
    let entries = raw
        .resources
        .iter()
        .map(|r| (r, false))
        .chain(raw.data.iter().map(|r| (r, true)));
    for (raw_resource, read_only) in entries {
        if !names.insert(raw_resource.name.clone()) {
            return Err(ParseError::DuplicateResource(raw_resource.name.clone()));
        }
        let path = format!("{}.{}", raw_resource.resource_type, raw_resource.name);
        let mut attributes = convert_map(&ctx, &raw_resource.attributes, &path)?;
        attributes.insert(
            BINDING_ATTRIBUTE.to_string(),
            Value::String(raw_resource.name.clone()),
        );
        if let Some(timeouts) = &raw_resource.timeouts {
            attributes.insert(
                Timeouts::ATTRIBUTE.to_string(),
                Value::Map(
                    timeouts
                        .iter()
                        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                        .collect(),
                ),
            );
            Timeouts::from_attributes(&attributes).map_err(|message| {
                ParseError::InvalidTimeouts {
                    path: path.clone(),
                    message,
                }
            })?;
        }
        let mut resource = Resource::new(&raw_resource.resource_type, &raw_resource.name)
            .with_read_only(read_only);
        resource.attributes = attributes;
        resources.push(resource);
    }

    Ok(ParsedFile {
        provider,
        resources,
        variables,
        backend,
    })
}

fn convert_map(
    ctx: &ParseContext<'_>,
    map: &serde_json::Map<String, serde_json::Value>,
    path: &str,
) -> Result<HashMap<String, Value>, ParseError> {
    let mut result = HashMap::new();
    for (key, json) in map {
        if let Some(value) = ctx.convert(json, &format!("{}.{}", path, key))? {
            result.insert(key.clone(), value);
        }
    }
    Ok(result)
}

/// Resolve resource references in a ParsedFile
/// This replaces ResourceRef values with the referenced resource's configured
/// attribute when it is known; references to computed attributes stay in
/// place and are resolved from state at apply time.
pub fn resolve_resource_refs(parsed: &mut ParsedFile) -> Result<(), ParseError> {
    let mut binding_map: HashMap<String, HashMap<String, Value>> = HashMap::new();
    for resource in &parsed.resources {
        if let Some(Value::String(binding_name)) = resource.attributes.get(BINDING_ATTRIBUTE) {
            binding_map.insert(binding_name.clone(), resource.attributes.clone());
        }
    }

    for resource in &mut parsed.resources {
        let mut resolved_attrs: HashMap<String, Value> = HashMap::new();
        for (key, value) in &resource.attributes {
            let resolved = resolve_value(value, &binding_map, 0)?;
            resolved_attrs.insert(key.clone(), resolved);
        }
        resource.attributes = resolved_attrs;
    }

    Ok(())
}

fn resolve_value(
    value: &Value,
    binding_map: &HashMap<String, HashMap<String, Value>>,
    depth: usize,
) -> Result<Value, ParseError> {
    match value {
        Value::ResourceRef(binding_name, attr_name) => match binding_map.get(binding_name) {
            Some(attributes) => match attributes.get(attr_name) {
                // Bounded to stop reference cycles
                Some(attr_value) if depth < 16 => resolve_value(attr_value, binding_map, depth + 1),
                _ => Ok(value.clone()),
            },
            None => Err(ParseError::UndefinedReference(format!(
                "{}.{}",
                binding_name, attr_name
            ))),
        },
        Value::List(items) => {
            let resolved: Result<Vec<Value>, ParseError> = items
                .iter()
                .map(|item| resolve_value(item, binding_map, depth))
                .collect();
            Ok(Value::List(resolved?))
        }
        Value::Map(map) => {
            let mut resolved = HashMap::new();
            for (k, v) in map {
                resolved.insert(k.clone(), resolve_value(v, binding_map, depth)?);
            }
            Ok(Value::Map(resolved))
        }
        _ => Ok(value.clone()),
    }
}

/// Parse a configuration document and resolve resource references
pub fn parse_and_resolve(input: &str) -> Result<ParsedFile, ParseError> {
    let mut parsed = parse(input)?;
    resolve_resource_refs(&mut parsed)?;
    Ok(parsed)
}

/// Read, parse and resolve a configuration file
pub fn load(path: &Path) -> Result<ParsedFile, ParseError> {
    let input = std::fs::read_to_string(path).map_err(|source| ParseError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_and_resolve(&input)
}
