//! dms_certificate schema

use std::collections::HashMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use carina_core::resource::Value;
use carina_core::schema::{AttributeSchema, AttributeType, ResourceSchema};

use super::types as dms_types;
use super::with_tags;

pub const RESOURCE_TYPE: &str = "dms_certificate";
pub const LOOKUP: &str = "certificate_id";

fn base64_string() -> AttributeType {
    AttributeType::Custom {
        name: "Base64".to_string(),
        base: Box::new(AttributeType::String),
        validate: |value| match value {
            Value::String(s) => STANDARD
                .decode(s)
                .map(|_| ())
                .map_err(|e| format!("expected base64 encoded value: {}", e)),
            _ => Err("Expected string".to_string()),
        },
    }
}

pub fn schema() -> ResourceSchema {
    let schema = ResourceSchema::new(RESOURCE_TYPE)
        .with_description("Certificate used by DMS endpoints for SSL connections")
        .attribute(AttributeSchema::new("certificate_arn", AttributeType::String).read_only())
        .attribute(
            AttributeSchema::new("certificate_id", dms_types::endpoint_id())
                .required()
                .force_new(),
        )
        .attribute(
            AttributeSchema::new("certificate_pem", AttributeType::String)
                .force_new()
                .sensitive()
                .conflicts_with(&["certificate_wallet"]),
        )
        .attribute(
            AttributeSchema::new("certificate_wallet", base64_string())
                .force_new()
                .sensitive()
                .conflicts_with(&["certificate_pem"])
                .with_description("Base64 encoded Oracle wallet"),
        )
        .attribute(
            AttributeSchema::new("certificate_creation_date", AttributeType::String).read_only(),
        )
        .attribute(AttributeSchema::new("certificate_owner", AttributeType::String).read_only())
        .attribute(AttributeSchema::new("key_length", AttributeType::Int).read_only())
        .attribute(AttributeSchema::new("signing_algorithm", AttributeType::String).read_only())
        .attribute(AttributeSchema::new("valid_from_date", AttributeType::String).read_only())
        .attribute(AttributeSchema::new("valid_to_date", AttributeType::String).read_only())
        .with_validator(require_certificate_body);

    with_tags(schema)
}

pub fn data_source_schema() -> ResourceSchema {
    super::data_source_schema(schema(), LOOKUP)
}

fn require_certificate_body(attrs: &HashMap<String, Value>) -> Result<(), String> {
    let set = |k: &str| attrs.get(k).is_some_and(|v| !v.is_empty());
    if set("certificate_pem") || set("certificate_wallet") {
        Ok(())
    } else {
        Err("one of certificate_pem or certificate_wallet must be set".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exactly_one_certificate_body() {
        let schema = schema();
        let mut attrs = HashMap::new();
        attrs.insert("certificate_id".to_string(), Value::from("dms-cert"));
        assert!(schema.validate(&attrs).is_err());

        attrs.insert("certificate_pem".to_string(), Value::from("-----BEGIN CERTIFICATE-----"));
        assert!(schema.validate(&attrs).is_ok());

        attrs.insert("certificate_wallet".to_string(), Value::from("d2FsbGV0"));
        assert!(schema.validate(&attrs).is_err());
    }

    #[test]
    fn wallet_must_be_base64() {
        assert!(base64_string().validate(&Value::from("d2FsbGV0")).is_ok());
        assert!(base64_string().validate(&Value::from("not base64!")).is_err());
    }
}
