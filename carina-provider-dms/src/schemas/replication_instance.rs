//! dms_replication_instance schema

use carina_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};

use super::types as dms_types;
use super::with_tags;
use crate::consts::NETWORK_TYPES;

pub const RESOURCE_TYPE: &str = "dms_replication_instance";
pub const LOOKUP: &str = "replication_instance_id";

pub fn schema() -> ResourceSchema {
    let schema = ResourceSchema::new(RESOURCE_TYPE)
        .with_description("DMS replication instance")
        .attribute(
            AttributeSchema::new("allocated_storage", dms_types::allocated_storage()).computed(),
        )
        .attribute(
            AttributeSchema::new("allow_major_version_upgrade", AttributeType::Bool).write_only(),
        )
        .attribute(
            AttributeSchema::new("apply_immediately", AttributeType::Bool)
                .write_only()
                .with_description("Apply modifications now instead of in the maintenance window"),
        )
        .attribute(
            AttributeSchema::new("auto_minor_version_upgrade", AttributeType::Bool).computed(),
        )
        .attribute(
            AttributeSchema::new("availability_zone", AttributeType::String)
                .computed()
                .force_new(),
        )
        .attribute(AttributeSchema::new("engine_version", AttributeType::String).computed())
        .attribute(
            AttributeSchema::new("kms_key_arn", dms_types::arn())
                .computed()
                .force_new(),
        )
        .attribute(AttributeSchema::new("multi_az", AttributeType::Bool).computed())
        .attribute(
            AttributeSchema::new("network_type", types::string_enum(NETWORK_TYPES)).computed(),
        )
        .attribute(
            AttributeSchema::new("preferred_maintenance_window", dms_types::maintenance_window())
                .computed()
                .with_state_func(carina_core::schema::types::lowercase),
        )
        .attribute(
            AttributeSchema::new("publicly_accessible", AttributeType::Bool)
                .computed()
                .force_new(),
        )
        .attribute(
            AttributeSchema::new("replication_instance_arn", AttributeType::String).read_only(),
        )
        .attribute(
            AttributeSchema::new("replication_instance_class", AttributeType::String)
                .required()
                .with_description("Compute class, e.g. dms.t3.micro"),
        )
        .attribute(
            AttributeSchema::new("replication_instance_id", dms_types::replication_instance_id())
                .required()
                .force_new()
                .with_state_func(carina_core::schema::types::lowercase),
        )
        .attribute(
            AttributeSchema::new("replication_instance_private_ips", types::string_list())
                .read_only(),
        )
        .attribute(
            AttributeSchema::new("replication_instance_public_ips", types::string_list())
                .read_only(),
        )
        .attribute(
            AttributeSchema::new("replication_subnet_group_id", AttributeType::String)
                .computed()
                .force_new(),
        )
        .attribute(
            AttributeSchema::new("vpc_security_group_ids", types::string_set()).computed(),
        );

    with_tags(schema)
}

pub fn data_source_schema() -> ResourceSchema {
    super::data_source_schema(schema(), LOOKUP)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use carina_core::resource::Value;

    use super::*;

    #[test]
    fn storage_range_and_identifier() {
        let schema = schema();
        let mut attrs = HashMap::new();
        attrs.insert("replication_instance_id".to_string(), Value::from("test-dms-instance"));
        attrs.insert("replication_instance_class".to_string(), Value::from("dms.t3.micro"));
        attrs.insert("allocated_storage".to_string(), Value::Int(50));
        assert!(schema.validate(&attrs).is_ok());

        attrs.insert("allocated_storage".to_string(), Value::Int(7000));
        assert!(schema.validate(&attrs).is_err());

        attrs.insert("allocated_storage".to_string(), Value::Int(50));
        attrs.insert("replication_instance_id".to_string(), Value::from("ends-with-"));
        assert!(schema.validate(&attrs).is_err());
    }

    #[test]
    fn maintenance_window_is_lowercased() {
        let mut attrs = HashMap::new();
        attrs.insert(
            "preferred_maintenance_window".to_string(),
            Value::from("Sun:23:45-Mon:00:30"),
        );
        let normalized = schema().normalize(&attrs);
        assert_eq!(
            normalized["preferred_maintenance_window"],
            Value::from("sun:23:45-mon:00:30")
        );
    }

    #[test]
    fn network_type_enum() {
        let mut attrs = HashMap::new();
        attrs.insert("replication_instance_id".to_string(), Value::from("dms"));
        attrs.insert("replication_instance_class".to_string(), Value::from("dms.t3.micro"));
        attrs.insert("network_type".to_string(), Value::from("IPV6"));
        assert!(schema().validate(&attrs).is_err());
    }
}
