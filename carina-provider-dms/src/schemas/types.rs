//! DMS-specific attribute types

use carina_core::resource::Value;
use carina_core::schema::{AttributeType, types};

use crate::consts;
use crate::validation;

fn with_str(value: &Value, check: fn(&str) -> Result<(), String>) -> Result<(), String> {
    match value {
        Value::String(s) => check(s),
        _ => Err("Expected string".to_string()),
    }
}

pub fn arn() -> AttributeType {
    AttributeType::Custom {
        name: "Arn".to_string(),
        base: Box::new(AttributeType::String),
        validate: |value| with_str(value, validation::validate_arn),
    }
}

/// Endpoint, certificate and replication task identifier
pub fn endpoint_id() -> AttributeType {
    AttributeType::Custom {
        name: "EndpointId".to_string(),
        base: Box::new(AttributeType::String),
        validate: |value| with_str(value, validation::validate_endpoint_id),
    }
}

pub fn replication_instance_id() -> AttributeType {
    AttributeType::Custom {
        name: "ReplicationInstanceId".to_string(),
        base: Box::new(AttributeType::String),
        validate: |value| with_str(value, validation::validate_replication_instance_id),
    }
}

pub fn replication_subnet_group_id() -> AttributeType {
    AttributeType::Custom {
        name: "ReplicationSubnetGroupId".to_string(),
        base: Box::new(AttributeType::String),
        validate: |value| with_str(value, validation::validate_replication_subnet_group_id),
    }
}

pub fn maintenance_window() -> AttributeType {
    AttributeType::Custom {
        name: "MaintenanceWindow".to_string(),
        base: Box::new(AttributeType::String),
        validate: |value| with_str(value, validation::validate_maintenance_window),
    }
}

pub fn cdc_start_time() -> AttributeType {
    AttributeType::Custom {
        name: "CdcStartTime".to_string(),
        base: Box::new(AttributeType::String),
        validate: |value| with_str(value, validation::validate_cdc_start_time),
    }
}

pub fn engine_name() -> AttributeType {
    types::string_enum(consts::ENGINE_NAMES)
}

pub fn migration_type() -> AttributeType {
    types::string_enum(consts::MIGRATION_TYPES)
}

/// Integer that must not be negative
pub fn non_negative_int() -> AttributeType {
    AttributeType::Custom {
        name: "NonNegativeInt".to_string(),
        base: Box::new(AttributeType::Int),
        validate: |value| types::check_int_at_least(value, 0),
    }
}

pub fn percentage() -> AttributeType {
    AttributeType::Custom {
        name: "Percentage".to_string(),
        base: Box::new(AttributeType::Int),
        validate: |value| types::check_int_between(value, 0, 100),
    }
}

/// Replication instance storage in GiB
pub fn allocated_storage() -> AttributeType {
    AttributeType::Custom {
        name: "AllocatedStorage".to_string(),
        base: Box::new(AttributeType::Int),
        validate: |value| types::check_int_between(value, 5, 6144),
    }
}

pub fn capacity_units() -> AttributeType {
    AttributeType::Custom {
        name: "CapacityUnits".to_string(),
        base: Box::new(AttributeType::Int),
        validate: |value| types::check_int_in(value, consts::CAPACITY_UNITS),
    }
}

pub fn s3_ignore_header_rows() -> AttributeType {
    AttributeType::Custom {
        name: "IgnoreHeaderRows".to_string(),
        base: Box::new(AttributeType::Int),
        validate: |value| types::check_int_in(value, &[0, 1]),
    }
}

pub fn s3_max_file_size() -> AttributeType {
    AttributeType::Custom {
        name: "MaxFileSize".to_string(),
        base: Box::new(AttributeType::Int),
        validate: |value| types::check_int_between(value, 1, 1_048_576),
    }
}

pub fn s3_canned_acl() -> AttributeType {
    AttributeType::Custom {
        name: "CannedAcl".to_string(),
        base: Box::new(AttributeType::String),
        validate: |value| types::check_string_in_fold(value, consts::S3_CANNED_ACLS),
    }
}

pub fn s3_date_partition_delimiter() -> AttributeType {
    AttributeType::Custom {
        name: "DatePartitionDelimiter".to_string(),
        base: Box::new(AttributeType::String),
        validate: |value| types::check_string_in_fold(value, consts::S3_DATE_PARTITION_DELIMITERS),
    }
}

pub fn s3_date_partition_sequence() -> AttributeType {
    AttributeType::Custom {
        name: "DatePartitionSequence".to_string(),
        base: Box::new(AttributeType::String),
        validate: |value| types::check_string_in_fold(value, consts::S3_DATE_PARTITION_SEQUENCES),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arn_type() {
        let t = arn();
        assert!(
            t.validate(&Value::from("arn:aws:iam::123456789012:role/dms-vpc-role"))
                .is_ok()
        );
        assert!(t.validate(&Value::from("role/dms-vpc-role")).is_err());
        assert!(t.validate(&Value::Int(1)).is_err());
    }

    #[test]
    fn ranges() {
        assert!(allocated_storage().validate(&Value::Int(50)).is_ok());
        assert!(allocated_storage().validate(&Value::Int(4)).is_err());
        assert!(capacity_units().validate(&Value::Int(192)).is_ok());
        assert!(capacity_units().validate(&Value::Int(3)).is_err());
        assert!(s3_ignore_header_rows().validate(&Value::Int(2)).is_err());
        assert!(percentage().validate(&Value::Int(101)).is_err());
        assert!(non_negative_int().validate(&Value::Int(-1)).is_err());
    }

    #[test]
    fn case_insensitive_enums() {
        assert!(s3_canned_acl().validate(&Value::from("BUCKET-OWNER-READ")).is_ok());
        assert!(s3_canned_acl().validate(&Value::from("everyone")).is_err());
        assert!(s3_date_partition_sequence().validate(&Value::from("YYYYMMDDHH")).is_ok());
    }
}
