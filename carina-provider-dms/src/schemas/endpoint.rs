//! dms_endpoint schema

use std::collections::{BTreeSet, HashMap};
use std::sync::LazyLock;

use carina_core::resource::Value;
use carina_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};
use regex::Regex;

use super::types as dms_types;
use super::with_tags;
use crate::consts::*;

pub const RESOURCE_TYPE: &str = "dms_endpoint";
pub const LOOKUP: &str = "endpoint_id";

const SECRETS_MANAGER: &[&str] = &["secrets_manager_access_role_arn", "secrets_manager_arn"];
const CONNECTION: &[&str] = &["username", "password", "server_name", "port"];

pub fn schema() -> ResourceSchema {
    let schema = ResourceSchema::new(RESOURCE_TYPE)
        .with_description("DMS endpoint describing a source or target data store")
        .attribute(
            AttributeSchema::new("certificate_arn", dms_types::arn())
                .computed()
                .with_description("ARN of the certificate used for SSL connections"),
        )
        .attribute(AttributeSchema::new("database_name", AttributeType::String))
        .attribute(
            AttributeSchema::new("elasticsearch_settings", elasticsearch_settings()).computed(),
        )
        .attribute(AttributeSchema::new("endpoint_arn", AttributeType::String).read_only())
        .attribute(
            AttributeSchema::new("endpoint_id", dms_types::endpoint_id())
                .required()
                .force_new(),
        )
        .attribute(
            AttributeSchema::new("endpoint_type", types::string_enum(ENDPOINT_TYPES)).required(),
        )
        .attribute(AttributeSchema::new("engine_name", dms_types::engine_name()).required())
        .attribute(
            AttributeSchema::new("extra_connection_attributes", AttributeType::String)
                .computed()
                .with_diff_suppress(suppress_extra_connection_attributes),
        )
        .attribute(AttributeSchema::new("kafka_settings", kafka_settings()).computed())
        .attribute(AttributeSchema::new("kinesis_settings", kinesis_settings()).computed())
        .attribute(
            AttributeSchema::new("kms_key_arn", dms_types::arn())
                .computed()
                .force_new(),
        )
        .attribute(AttributeSchema::new("mongodb_settings", mongodb_settings()).computed())
        .attribute(
            AttributeSchema::new("password", AttributeType::String)
                .sensitive()
                .conflicts_with(SECRETS_MANAGER),
        )
        .attribute(
            AttributeSchema::new("pause_replication_tasks", AttributeType::Bool)
                .write_only()
                .with_description("Stop running tasks that use this endpoint while it is modified"),
        )
        .attribute(AttributeSchema::new("port", AttributeType::Int).conflicts_with(SECRETS_MANAGER))
        .attribute(AttributeSchema::new("postgres_settings", postgres_settings()).computed())
        .attribute(AttributeSchema::new("redis_settings", redis_settings()).computed())
        .attribute(AttributeSchema::new("redshift_settings", redshift_settings()).computed())
        .attribute(AttributeSchema::new("s3_settings", s3_settings()).computed())
        .attribute(
            AttributeSchema::new("secrets_manager_access_role_arn", dms_types::arn())
                .required_with(&["secrets_manager_arn"])
                .conflicts_with(CONNECTION),
        )
        .attribute(
            AttributeSchema::new("secrets_manager_arn", dms_types::arn())
                .required_with(&["secrets_manager_access_role_arn"])
                .conflicts_with(CONNECTION),
        )
        .attribute(
            AttributeSchema::new("server_name", AttributeType::String)
                .conflicts_with(SECRETS_MANAGER),
        )
        .attribute(AttributeSchema::new("service_access_role", AttributeType::String))
        .attribute(AttributeSchema::new("ssl_mode", types::string_enum(SSL_MODES)).computed())
        .attribute(
            AttributeSchema::new("username", AttributeType::String)
                .conflicts_with(SECRETS_MANAGER),
        )
        .with_validator(require_engine_settings)
        .with_validator(validate_kms_key_engine)
        .with_validator(validate_sse_kms_key);

    with_tags(schema)
}

pub fn data_source_schema() -> ResourceSchema {
    super::data_source_schema(schema(), LOOKUP)
}

fn field(name: &str, attr_type: AttributeType) -> AttributeSchema {
    AttributeSchema::new(name, attr_type)
}

fn flag(name: &str) -> AttributeSchema {
    field(name, AttributeType::Bool).with_default(Value::Bool(false))
}

fn elasticsearch_settings() -> AttributeType {
    AttributeType::Block(vec![
        field("endpoint_uri", AttributeType::String)
            .required()
            .force_new(),
        field("error_retry_duration", dms_types::non_negative_int())
            .with_default(Value::Int(300))
            .force_new(),
        field("full_load_error_percentage", dms_types::percentage())
            .with_default(Value::Int(10))
            .force_new(),
        field("service_access_role_arn", dms_types::arn())
            .required()
            .force_new(),
        flag("use_new_mapping_type").force_new(),
    ])
}

fn kafka_settings() -> AttributeType {
    AttributeType::Block(vec![
        field("broker", AttributeType::String).required(),
        flag("include_control_details"),
        flag("include_null_and_empty"),
        flag("include_partition_value"),
        flag("include_table_alter_operations"),
        flag("include_transaction_details"),
        field("message_format", types::string_enum(MESSAGE_FORMATS))
            .with_default(Value::from(MESSAGE_FORMAT_JSON)),
        field("message_max_bytes", AttributeType::Int).with_default(Value::Int(1_000_000)),
        field("no_hex_prefix", AttributeType::Bool),
        flag("partition_include_schema_table"),
        field("sasl_password", AttributeType::String).sensitive(),
        field("sasl_username", AttributeType::String),
        field("security_protocol", types::string_enum(KAFKA_SECURITY_PROTOCOLS)),
        field("ssl_ca_certificate_arn", dms_types::arn()),
        field("ssl_client_certificate_arn", dms_types::arn()),
        field("ssl_client_key_arn", dms_types::arn()),
        field("ssl_client_key_password", AttributeType::String).sensitive(),
        field("topic", AttributeType::String).with_default(Value::from("kafka-default-topic")),
    ])
}

fn kinesis_settings() -> AttributeType {
    AttributeType::Block(vec![
        flag("include_control_details"),
        flag("include_null_and_empty"),
        flag("include_partition_value"),
        flag("include_table_alter_operations"),
        flag("include_transaction_details"),
        field("message_format", types::string_enum(MESSAGE_FORMATS))
            .with_default(Value::from(MESSAGE_FORMAT_JSON))
            .force_new(),
        flag("partition_include_schema_table"),
        field("service_access_role_arn", dms_types::arn()),
        field("stream_arn", dms_types::arn()),
    ])
}

fn mongodb_settings() -> AttributeType {
    AttributeType::Block(vec![
        field("auth_mechanism", types::string_enum(MONGODB_AUTH_MECHANISMS))
            .with_default(Value::from("default")),
        field("auth_source", AttributeType::String).with_default(Value::from("admin")),
        field("auth_type", types::string_enum(MONGODB_AUTH_TYPES))
            .with_default(Value::from("password")),
        field("docs_to_investigate", AttributeType::String).with_default(Value::from("1000")),
        field("extract_doc_id", AttributeType::String).with_default(Value::from("false")),
        field("nesting_level", types::string_enum(MONGODB_NESTING_LEVELS))
            .with_default(Value::from("none")),
    ])
}

fn postgres_settings() -> AttributeType {
    AttributeType::Block(vec![
        field("after_connect_script", AttributeType::String),
        field("babelfish_database_name", AttributeType::String),
        field("capture_ddls", AttributeType::Bool),
        field("database_mode", types::string_enum(POSTGRES_DATABASE_MODES)),
        field("ddl_artifacts_schema", AttributeType::String),
        field("execute_timeout", AttributeType::Int),
        field("fail_tasks_on_lob_truncation", AttributeType::Bool),
        field("heartbeat_enable", AttributeType::Bool),
        field("heartbeat_frequency", AttributeType::Int),
        field("heartbeat_schema", AttributeType::String),
        field("map_boolean_as_boolean", AttributeType::Bool),
        field("map_jsonb_as_clob", AttributeType::Bool),
        field("map_long_varchar_as", types::string_enum(POSTGRES_LONG_VARCHAR_MAPPINGS)),
        field("max_file_size", AttributeType::Int),
        field("plugin_name", types::string_enum(POSTGRES_PLUGIN_NAMES)),
        field("slot_name", AttributeType::String),
    ])
}

fn redis_settings() -> AttributeType {
    AttributeType::Block(vec![
        field("auth_password", AttributeType::String).sensitive(),
        field("auth_type", types::string_enum(REDIS_AUTH_TYPES)).required(),
        field("auth_user_name", AttributeType::String),
        field("port", dms_types::non_negative_int()).required(),
        field("server_name", AttributeType::String).required(),
        field("ssl_ca_certificate_arn", AttributeType::String),
        field("ssl_security_protocol", types::string_enum(REDIS_SSL_PROTOCOLS))
            .with_default(Value::from("ssl-encryption")),
    ])
}

fn redshift_settings() -> AttributeType {
    AttributeType::Block(vec![
        field("bucket_folder", AttributeType::String),
        field("bucket_name", AttributeType::String),
        field("encryption_mode", types::string_enum(ENCRYPTION_MODES))
            .with_default(Value::from(ENCRYPTION_MODE_SSE_S3)),
        field("server_side_encryption_kms_key_id", AttributeType::String),
        field("service_access_role_arn", dms_types::arn()),
    ])
}

fn s3_settings() -> AttributeType {
    let string = |name: &str, default: &str| {
        field(name, AttributeType::String).with_default(Value::from(default))
    };
    let int = |name: &str, attr_type: AttributeType, default: i64| {
        field(name, attr_type).with_default(Value::Int(default))
    };

    AttributeType::Block(vec![
        flag("add_column_name"),
        string("bucket_folder", ""),
        string("bucket_name", ""),
        field("canned_acl_for_objects", dms_types::s3_canned_acl())
            .with_default(Value::from("none"))
            .with_state_func(types::lowercase),
        flag("cdc_inserts_and_updates"),
        flag("cdc_inserts_only"),
        int("cdc_max_batch_interval", dms_types::non_negative_int(), 60),
        int("cdc_min_file_size", dms_types::non_negative_int(), 32000),
        string("cdc_path", ""),
        field("compression_type", types::string_enum(S3_COMPRESSION_TYPES))
            .with_default(Value::from("NONE")),
        string("csv_delimiter", ","),
        string("csv_no_sup_value", ""),
        string("csv_null_value", "NULL"),
        string("csv_row_delimiter", "\\n"),
        field("data_format", types::string_enum(S3_DATA_FORMATS)).with_default(Value::from("csv")),
        int("data_page_size", dms_types::non_negative_int(), 1_048_576),
        field("date_partition_delimiter", dms_types::s3_date_partition_delimiter())
            .with_default(Value::from("slash"))
            .with_state_func(types::lowercase),
        flag("date_partition_enabled"),
        field("date_partition_sequence", dms_types::s3_date_partition_sequence())
            .with_default(Value::from("yyyymmdd"))
            .with_state_func(types::lowercase),
        int("dict_page_size_limit", dms_types::non_negative_int(), 1_048_576),
        field("enable_statistics", AttributeType::Bool).with_default(Value::Bool(true)),
        field("encoding_type", types::string_enum(S3_ENCODING_TYPES))
            .with_default(Value::from("rle-dictionary")),
        field("encryption_mode", types::string_enum(ENCRYPTION_MODES))
            .with_default(Value::from(ENCRYPTION_MODE_SSE_S3)),
        string("external_table_definition", ""),
        flag("glue_catalog_generation"),
        int("ignore_header_rows", dms_types::s3_ignore_header_rows(), 0),
        flag("include_op_for_full_load"),
        int("max_file_size", dms_types::s3_max_file_size(), 1_048_576),
        flag("parquet_timestamp_in_millisecond"),
        field("parquet_version", types::string_enum(S3_PARQUET_VERSIONS))
            .with_default(Value::from("parquet-1-0")),
        flag("preserve_transactions"),
        field("rfc_4180", AttributeType::Bool).with_default(Value::Bool(true)),
        int("row_group_length", dms_types::non_negative_int(), 10000),
        field("server_side_encryption_kms_key_id", AttributeType::String),
        field("service_access_role_arn", dms_types::arn()).with_default(Value::from("")),
        string("timestamp_column_name", ""),
        flag("use_csv_no_sup_value"),
        flag("use_task_start_time_for_full_load_timestamp"),
    ])
}

// =============================================================================
// Cross-attribute validation
// =============================================================================

fn engine(attrs: &HashMap<String, Value>) -> &str {
    attrs
        .get("engine_name")
        .and_then(Value::as_str)
        .unwrap_or_default()
}

fn block_set(attrs: &HashMap<String, Value>, name: &str) -> bool {
    attrs
        .get(name)
        .and_then(Value::as_map)
        .is_some_and(|m| !m.is_empty())
}

/// Engines whose connection details live entirely in a settings block
fn require_engine_settings(attrs: &HashMap<String, Value>) -> Result<(), String> {
    let engine_name = engine(attrs);
    let settings = match engine_name {
        ENGINE_ELASTICSEARCH | ENGINE_OPENSEARCH => "elasticsearch_settings",
        ENGINE_KAFKA => "kafka_settings",
        ENGINE_KINESIS => "kinesis_settings",
        ENGINE_MONGODB => "mongodb_settings",
        ENGINE_REDIS => "redis_settings",
        ENGINE_S3 => "s3_settings",
        _ => return Ok(()),
    };
    if block_set(attrs, settings) {
        Ok(())
    } else {
        Err(format!(
            "{} must be set when engine_name = \"{}\"",
            settings, engine_name
        ))
    }
}

fn validate_kms_key_engine(attrs: &HashMap<String, Value>) -> Result<(), String> {
    let kms_key_set = attrs.get("kms_key_arn").is_some_and(|v| !v.is_empty());
    if engine(attrs) == ENGINE_S3 && kms_key_set {
        return Err(format!(
            "kms_key_arn must not be set when engine is \"{}\". \
             Use s3_settings.server_side_encryption_kms_key_id instead",
            ENGINE_S3
        ));
    }
    Ok(())
}

fn validate_sse_kms_key(attrs: &HashMap<String, Value>) -> Result<(), String> {
    let settings = match engine(attrs) {
        ENGINE_S3 => "s3_settings",
        ENGINE_REDSHIFT => "redshift_settings",
        _ => return Ok(()),
    };
    let Some(block) = attrs.get(settings).and_then(Value::as_map) else {
        return Ok(());
    };
    let kms_key_id = match block.get("server_side_encryption_kms_key_id") {
        Some(Value::ResourceRef(..)) => return Ok(()),
        Some(v) => v.as_str().unwrap_or_default(),
        None => "",
    };
    match block.get("encryption_mode").and_then(Value::as_str) {
        Some(ENCRYPTION_MODE_SSE_S3) if !kms_key_id.is_empty() => Err(format!(
            "{}.server_side_encryption_kms_key_id must not be set when encryption_mode is \"{}\"",
            settings, ENCRYPTION_MODE_SSE_S3
        )),
        Some(ENCRYPTION_MODE_SSE_KMS) if kms_key_id.is_empty() => Err(format!(
            "{}.server_side_encryption_kms_key_id is required when encryption_mode is \"{}\"",
            settings, ENCRYPTION_MODE_SSE_KMS
        )),
        _ => Ok(()),
    }
}

// =============================================================================
// extra_connection_attributes
// =============================================================================

static CAMEL_BOUNDARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("([a-z])([A-Z])").expect("invalid camel case regex"));

fn normalize_setting_value(value: &str) -> String {
    value.to_lowercase().replace('-', "_")
}

/// `key=value;key2=value2` as a set of normalized `snake_key=value` pairs
fn extra_connection_attributes_to_set(extra: &str) -> Option<BTreeSet<String>> {
    if extra.is_empty() {
        return None;
    }
    let set = extra
        .split(';')
        .filter_map(|part| {
            let mut kv = part.split('=');
            match (kv.next(), kv.next(), kv.next()) {
                (Some(k), Some(v), None) => {
                    let key = CAMEL_BOUNDARY.replace_all(k, "${1}_${2}").to_lowercase();
                    Some(format!("{}={}", key, normalize_setting_value(v)))
                }
                _ => None,
            }
        })
        .collect();
    Some(set)
}

fn engine_settings_to_set(block: &HashMap<String, Value>) -> Option<BTreeSet<String>> {
    if block.is_empty() {
        return None;
    }
    let set = block
        .iter()
        .map(|(k, v)| match v {
            Value::String(s) => format!("{}={}", k, normalize_setting_value(s)),
            Value::Int(n) => format!("{}={}", k, n),
            Value::Bool(b) => format!("{}={}", k, b),
            other => format!("{}={:?}", k, other),
        })
        .collect();
    Some(set)
}

/// The service reports `extra_connection_attributes` derived from the
/// mongodb/s3 settings block. Differences explained by the block are
/// ignored.
pub fn suppress_extra_connection_attributes(
    _key: &str,
    old: &Value,
    new: &Value,
    desired: &HashMap<String, Value>,
) -> bool {
    let old = extra_connection_attributes_to_set(old.as_str().unwrap_or_default());
    let new =
        extra_connection_attributes_to_set(new.as_str().unwrap_or_default()).unwrap_or_default();

    let config = ["mongodb_settings", "s3_settings"]
        .iter()
        .find_map(|name| desired.get(*name).and_then(Value::as_map).filter(|m| !m.is_empty()))
        .and_then(engine_settings_to_set);

    match (old, config) {
        (Some(old), Some(config)) => {
            let old_extra: BTreeSet<String> = old.difference(&config).cloned().collect();
            let new_extra: BTreeSet<String> = new.difference(&config).cloned().collect();
            (old_extra.is_empty() && new_extra.is_empty()) || old_extra == new
        }
        _ => false,
    }
}
