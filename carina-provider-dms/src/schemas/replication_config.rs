//! dms_replication_config schema

use carina_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};

use super::replication_task::{suppress_equivalent_json, suppress_equivalent_task_settings};
use super::types as dms_types;
use super::with_tags;

pub const RESOURCE_TYPE: &str = "dms_replication_config";

fn compute_config() -> AttributeType {
    AttributeType::Block(vec![
        AttributeSchema::new("availability_zone", AttributeType::String)
            .computed()
            .force_new(),
        AttributeSchema::new("dns_name_servers", AttributeType::String)
            .computed()
            .force_new(),
        AttributeSchema::new("kms_key_id", dms_types::arn())
            .computed()
            .force_new(),
        AttributeSchema::new("max_capacity_units", dms_types::capacity_units()),
        AttributeSchema::new("min_capacity_units", dms_types::capacity_units()),
        AttributeSchema::new("multi_az", AttributeType::Bool).computed(),
        AttributeSchema::new("preferred_maintenance_window", dms_types::maintenance_window())
            .computed()
            .with_state_func(types::lowercase),
        AttributeSchema::new("replication_subnet_group_id", AttributeType::String).required(),
        AttributeSchema::new("vpc_security_group_ids", types::string_set()).computed(),
    ])
}

pub fn schema() -> ResourceSchema {
    let schema = ResourceSchema::new(RESOURCE_TYPE)
        .with_description("Serverless DMS replication")
        .attribute(
            AttributeSchema::new("compute_config", compute_config())
                .required()
                .with_description("Capacity and placement of the serverless replication"),
        )
        .attribute(
            AttributeSchema::new("replication_config_arn", AttributeType::String).read_only(),
        )
        .attribute(
            AttributeSchema::new("replication_config_identifier", AttributeType::String)
                .required()
                .force_new(),
        )
        .attribute(
            AttributeSchema::new("replication_settings", types::json())
                .computed()
                .with_diff_suppress(suppress_equivalent_task_settings),
        )
        .attribute(AttributeSchema::new("replication_type", dms_types::migration_type()).required())
        .attribute(
            AttributeSchema::new("resource_identifier", AttributeType::String)
                .computed()
                .force_new()
                .write_only(),
        )
        .attribute(
            AttributeSchema::new("source_endpoint_arn", dms_types::arn())
                .required()
                .force_new(),
        )
        .attribute(AttributeSchema::new("start_replication", AttributeType::Bool).write_only())
        .attribute(
            AttributeSchema::new("supplemental_settings", types::json())
                .with_diff_suppress(suppress_equivalent_json),
        )
        .attribute(
            AttributeSchema::new("table_mappings", types::json())
                .required()
                .with_diff_suppress(suppress_equivalent_json),
        )
        .attribute(
            AttributeSchema::new("target_endpoint_arn", dms_types::arn())
                .required()
                .force_new(),
        );

    with_tags(schema)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use carina_core::resource::Value;

    use super::*;

    fn config(compute: &[(&str, Value)]) -> HashMap<String, Value> {
        let mut attrs = HashMap::new();
        for (k, v) in [
            ("replication_config_identifier", "serverless-cdc"),
            ("replication_type", "cdc"),
            ("source_endpoint_arn", "arn:aws:dms:us-east-1:123456789012:endpoint:SRC"),
            ("target_endpoint_arn", "arn:aws:dms:us-east-1:123456789012:endpoint:TGT"),
            ("table_mappings", r#"{"rules":[]}"#),
        ] {
            attrs.insert(k.to_string(), Value::from(v));
        }
        attrs.insert(
            "compute_config".to_string(),
            Value::Map(
                compute
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.clone()))
                    .collect(),
            ),
        );
        attrs
    }

    #[test]
    fn compute_config_requires_subnet_group() {
        let schema = schema();
        assert!(schema.validate(&config(&[])).is_err());
        assert!(
            schema
                .validate(&config(&[
                    ("replication_subnet_group_id", Value::from("dms-subnets")),
                    ("max_capacity_units", Value::Int(128)),
                ]))
                .is_ok()
        );
    }

    #[test]
    fn capacity_units_are_restricted() {
        let errors = schema()
            .validate(&config(&[
                ("replication_subnet_group_id", Value::from("dms-subnets")),
                ("max_capacity_units", Value::Int(3)),
            ]))
            .unwrap_err();
        assert!(errors[0].to_string().contains("compute_config"));
    }
}
