//! dms_replication_task schema

use std::collections::HashMap;

use carina_core::resource::Value;
use carina_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};

use super::types as dms_types;
use super::with_tags;

pub const RESOURCE_TYPE: &str = "dms_replication_task";
pub const LOOKUP: &str = "replication_task_id";

/// Task settings keys the service fills in on its own
const SERVICE_LOGGING_KEYS: &[&str] = &["CloudWatchLogGroup", "CloudWatchLogStream"];

pub fn schema() -> ResourceSchema {
    let schema = ResourceSchema::new(RESOURCE_TYPE)
        .with_description("DMS replication task")
        .attribute(
            AttributeSchema::new("cdc_start_position", AttributeType::String)
                .computed()
                .conflicts_with(&["cdc_start_time"]),
        )
        .attribute(
            AttributeSchema::new("cdc_start_time", dms_types::cdc_start_time())
                .conflicts_with(&["cdc_start_position"])
                .write_only()
                .with_description("RFC3339 timestamp or Unix seconds"),
        )
        .attribute(AttributeSchema::new("migration_type", dms_types::migration_type()).required())
        .attribute(
            AttributeSchema::new("replication_instance_arn", dms_types::arn())
                .required()
                .with_description("Changing this moves the task to another instance"),
        )
        .attribute(AttributeSchema::new("replication_task_arn", AttributeType::String).read_only())
        .attribute(
            AttributeSchema::new("replication_task_id", dms_types::endpoint_id())
                .required()
                .force_new(),
        )
        .attribute(
            AttributeSchema::new("replication_task_settings", types::json())
                .computed()
                .with_diff_suppress(suppress_equivalent_task_settings),
        )
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
        .attribute(AttributeSchema::new("start_replication_task", AttributeType::Bool).write_only())
        .attribute(AttributeSchema::new("status", AttributeType::String).read_only())
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

pub fn data_source_schema() -> ResourceSchema {
    super::data_source_schema(schema(), LOOKUP)
}

fn parse_json(value: &Value) -> Option<serde_json::Value> {
    value
        .as_str()
        .filter(|s| !s.is_empty())
        .and_then(|s| serde_json::from_str(s).ok())
}

/// JSON documents that differ only in formatting or key order
pub fn suppress_equivalent_json(
    _key: &str,
    old: &Value,
    new: &Value,
    _desired: &HashMap<String, Value>,
) -> bool {
    match (parse_json(old), parse_json(new)) {
        (Some(old), Some(new)) => old == new,
        _ => false,
    }
}

fn strip_service_logging_keys(settings: &mut serde_json::Value) {
    if let Some(logging) = settings.get_mut("Logging").and_then(|l| l.as_object_mut()) {
        for key in SERVICE_LOGGING_KEYS {
            logging.remove(*key);
        }
    }
}

/// Task settings equivalence ignoring the log group and stream the service
/// assigns when logging is enabled
pub fn suppress_equivalent_task_settings(
    _key: &str,
    old: &Value,
    new: &Value,
    _desired: &HashMap<String, Value>,
) -> bool {
    match (parse_json(old), parse_json(new)) {
        (Some(mut old), Some(mut new)) => {
            strip_service_logging_keys(&mut old);
            strip_service_logging_keys(&mut new);
            old == new
        }
        _ => false,
    }
}

/// Task settings JSON with the service-assigned logging keys removed
pub fn normalize_task_settings(settings: &str) -> Option<String> {
    let mut json: serde_json::Value = serde_json::from_str(settings).ok()?;
    strip_service_logging_keys(&mut json);
    serde_json::to_string(&json).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equivalent_table_mappings() {
        let old = Value::from(r#"{"rules":[{"rule-type":"selection","rule-id":"1"}]}"#);
        let new = Value::from(
            r#"{
                "rules": [ { "rule-id": "1", "rule-type": "selection" } ]
            }"#,
        );
        assert!(suppress_equivalent_json("table_mappings", &old, &new, &HashMap::new()));
        let changed = Value::from(r#"{"rules":[]}"#);
        assert!(!suppress_equivalent_json("table_mappings", &old, &changed, &HashMap::new()));
    }

    #[test]
    fn task_settings_ignore_cloudwatch_names() {
        let old = Value::from(concat!(
            r#"{"Logging":{"EnableLogging":true,"CloudWatchLogGroup":"dms-tasks-x","#,
            r#""CloudWatchLogStream":"dms-task-y"},"FullLoadSettings":{"CommitRate":10000}}"#,
        ));
        let new = Value::from(
            r#"{"FullLoadSettings":{"CommitRate":10000},"Logging":{"EnableLogging":true}}"#,
        );
        assert!(suppress_equivalent_task_settings(
            "replication_task_settings",
            &old,
            &new,
            &HashMap::new()
        ));

        let new = Value::from(r#"{"Logging":{"EnableLogging":false}}"#);
        assert!(!suppress_equivalent_task_settings(
            "replication_task_settings",
            &old,
            &new,
            &HashMap::new()
        ));
    }

    #[test]
    fn normalized_settings_drop_log_names() {
        let settings = r#"{"Logging":{"CloudWatchLogGroup":"g","EnableLogging":true}}"#;
        let normalized = normalize_task_settings(settings).unwrap();
        assert_eq!(normalized, r#"{"Logging":{"EnableLogging":true}}"#);
        assert!(normalize_task_settings("not json").is_none());
    }

    #[test]
    fn cdc_start_conflicts() {
        let mut attrs = HashMap::new();
        for (k, v) in [
            ("replication_task_id", "test-dms-task"),
            ("migration_type", "cdc"),
            ("replication_instance_arn", "arn:aws:dms:us-east-1:123456789012:rep:ABC"),
            ("source_endpoint_arn", "arn:aws:dms:us-east-1:123456789012:endpoint:SRC"),
            ("target_endpoint_arn", "arn:aws:dms:us-east-1:123456789012:endpoint:TGT"),
            ("table_mappings", r#"{"rules":[]}"#),
            ("cdc_start_time", "2024-01-02T03:04:05Z"),
        ] {
            attrs.insert(k.to_string(), Value::from(v));
        }
        assert!(schema().validate(&attrs).is_ok());

        attrs.insert("cdc_start_position".to_string(), Value::from("checkpoint:V1#27"));
        assert!(schema().validate(&attrs).is_err());
    }
}
