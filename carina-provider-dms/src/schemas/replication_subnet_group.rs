//! dms_replication_subnet_group schema

use std::collections::HashMap;

use carina_core::resource::Value;
use carina_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};

use super::types as dms_types;
use super::with_tags;

pub const RESOURCE_TYPE: &str = "dms_replication_subnet_group";
pub const LOOKUP: &str = "replication_subnet_group_id";

const MIN_SUBNETS: usize = 2;

pub fn schema() -> ResourceSchema {
    let schema = ResourceSchema::new(RESOURCE_TYPE)
        .with_description("Subnets a replication instance may be placed in")
        .attribute(
            AttributeSchema::new("replication_subnet_group_arn", AttributeType::String)
                .read_only(),
        )
        .attribute(
            AttributeSchema::new("replication_subnet_group_description", AttributeType::String)
                .required(),
        )
        .attribute(
            AttributeSchema::new(
                "replication_subnet_group_id",
                dms_types::replication_subnet_group_id(),
            )
            .required()
            .force_new()
            .with_state_func(types::lowercase),
        )
        .attribute(AttributeSchema::new("subnet_ids", types::string_set()).required())
        .attribute(AttributeSchema::new("vpc_id", AttributeType::String).read_only())
        .with_validator(validate_subnet_count);

    with_tags(schema)
}

pub fn data_source_schema() -> ResourceSchema {
    super::data_source_schema(schema(), LOOKUP)
}

fn validate_subnet_count(attrs: &HashMap<String, Value>) -> Result<(), String> {
    match attrs.get("subnet_ids").and_then(Value::as_list) {
        Some(ids) if ids.len() < MIN_SUBNETS => Err(format!(
            "subnet_ids must contain at least {} subnets, got {}",
            MIN_SUBNETS,
            ids.len()
        )),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subnets(ids: &[&str]) -> Value {
        Value::List(ids.iter().map(|s| Value::from(*s)).collect())
    }

    #[test]
    fn requires_two_subnets() {
        let schema = schema();
        let mut attrs = HashMap::new();
        attrs.insert("replication_subnet_group_id".to_string(), Value::from("dms-subnets"));
        attrs.insert(
            "replication_subnet_group_description".to_string(),
            Value::from("DMS subnets"),
        );
        attrs.insert("subnet_ids".to_string(), subnets(&["subnet-1"]));
        let errors = schema.validate(&attrs).unwrap_err();
        assert_eq!(
            errors[0].to_string(),
            "subnet_ids must contain at least 2 subnets, got 1"
        );

        attrs.insert("subnet_ids".to_string(), subnets(&["subnet-1", "subnet-2"]));
        assert!(schema.validate(&attrs).is_ok());
    }

    #[test]
    fn default_name_is_reserved() {
        let mut attrs = HashMap::new();
        attrs.insert("replication_subnet_group_id".to_string(), Value::from("default"));
        attrs.insert(
            "replication_subnet_group_description".to_string(),
            Value::from("d"),
        );
        attrs.insert("subnet_ids".to_string(), subnets(&["subnet-1", "subnet-2"]));
        assert!(schema().validate(&attrs).is_err());
    }
}
