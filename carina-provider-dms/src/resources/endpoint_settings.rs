//! Engine-specific endpoint settings
//!
//! Connection details travel in a per-engine settings structure. The
//! `expand_*` functions build those structures from attribute blocks and
//! the `flatten_*` functions turn API responses back into blocks.

use aws_sdk_databasemigration::types::{
    AuthMechanismValue, AuthTypeValue, CannedAclForObjectsValue, CompressionTypeValue,
    DataFormatValue, DatabaseMode, DatePartitionDelimiterValue, DatePartitionSequenceValue,
    DynamoDbSettings, ElasticsearchSettings, EncodingTypeValue, EncryptionModeValue, Endpoint,
    IbmDb2Settings, KafkaSecurityProtocol, KafkaSettings, KinesisSettings, LongVarcharMappingType,
    MessageFormatValue, MicrosoftSqlServerSettings, MongoDbSettings, MySqlSettings,
    NestingLevelValue, OracleSettings, ParquetVersionValue, PluginNameValue, PostgreSqlSettings,
    RedisAuthTypeValue, RedisSettings, RedshiftSettings, S3Settings, SslSecurityProtocolValue,
    SybaseSettings,
};
use carina_core::resource::Value;

use crate::attributes::{
    AttributeMap, Attributes, get_block, get_bool, get_i32, get_str, get_string, str_or_empty,
};
use crate::consts::*;

/// Attributes describing how to reach the data store
pub(crate) const CONNECTION_FIELDS: &[&str] = &[
    "username",
    "password",
    "server_name",
    "port",
    "database_name",
    "secrets_manager_access_role_arn",
    "secrets_manager_arn",
];

/// Which settings structure an engine uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EngineFamily {
    MySql,
    PostgreSql,
    DynamoDb,
    Elasticsearch,
    Kafka,
    Kinesis,
    MongoDb,
    Oracle,
    Redis,
    Redshift,
    SqlServer,
    Sybase,
    Db2,
    S3,
    Other,
}

impl EngineFamily {
    pub fn of(engine_name: &str) -> Self {
        match engine_name {
            ENGINE_AURORA | ENGINE_MARIADB | ENGINE_MYSQL => Self::MySql,
            ENGINE_AURORA_POSTGRESQL | ENGINE_POSTGRES => Self::PostgreSql,
            ENGINE_DYNAMODB => Self::DynamoDb,
            ENGINE_ELASTICSEARCH | ENGINE_OPENSEARCH => Self::Elasticsearch,
            ENGINE_KAFKA => Self::Kafka,
            ENGINE_KINESIS => Self::Kinesis,
            ENGINE_MONGODB => Self::MongoDb,
            ENGINE_ORACLE => Self::Oracle,
            ENGINE_REDIS => Self::Redis,
            ENGINE_REDSHIFT => Self::Redshift,
            ENGINE_SQLSERVER | ENGINE_BABELFISH => Self::SqlServer,
            ENGINE_SYBASE => Self::Sybase,
            ENGINE_DB2 | ENGINE_DB2_ZOS => Self::Db2,
            ENGINE_S3 => Self::S3,
            _ => Self::Other,
        }
    }

    /// Families whose settings structure carries username, server and port
    pub fn has_connection_settings(self) -> bool {
        matches!(
            self,
            Self::MySql
                | Self::PostgreSql
                | Self::MongoDb
                | Self::Oracle
                | Self::Redshift
                | Self::SqlServer
                | Self::Sybase
                | Self::Db2
        )
    }

    /// Attributes whose change requires the settings structure to be resent
    pub fn settings_fields(self) -> Vec<&'static str> {
        let mut fields = match self {
            Self::DynamoDb => return vec!["service_access_role"],
            Self::Elasticsearch => return vec!["elasticsearch_settings"],
            Self::Kafka => return vec!["kafka_settings"],
            Self::Kinesis => return vec!["kinesis_settings"],
            Self::Redis => return vec!["redis_settings"],
            Self::S3 => return vec!["s3_settings"],
            Self::PostgreSql => vec!["postgres_settings"],
            Self::MongoDb => vec!["mongodb_settings"],
            Self::Redshift => vec!["redshift_settings"],
            _ => Vec::new(),
        };
        fields.extend_from_slice(CONNECTION_FIELDS);
        fields
    }
}

// =============================================================================
// Connection info
// =============================================================================

/// Top-level connection attributes of an endpoint
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct ConnectionInfo {
    pub username: Option<String>,
    pub password: Option<String>,
    pub server_name: Option<String>,
    pub port: Option<i32>,
    pub database_name: Option<String>,
    pub secrets_manager_access_role_arn: Option<String>,
    pub secrets_manager_arn: Option<String>,
}

impl ConnectionInfo {
    pub fn from_attributes(attrs: &Attributes) -> Self {
        Self {
            username: get_string(attrs, "username"),
            password: get_string(attrs, "password"),
            server_name: get_string(attrs, "server_name"),
            port: get_i32(attrs, "port"),
            database_name: get_string(attrs, "database_name"),
            secrets_manager_access_role_arn: get_string(attrs, "secrets_manager_access_role_arn"),
            secrets_manager_arn: get_string(attrs, "secrets_manager_arn"),
        }
    }

    pub fn uses_secrets_manager(&self) -> bool {
        self.secrets_manager_arn.is_some()
    }
}

/// Applies either the Secrets Manager reference or the plain credentials
/// to any settings builder exposing the common connection setters.
macro_rules! with_connection {
    ($builder:expr, $conn:expr) => {{
        let conn: &ConnectionInfo = $conn;
        let builder = $builder.set_database_name(conn.database_name.clone());
        if conn.uses_secrets_manager() {
            builder
                .set_secrets_manager_access_role_arn(conn.secrets_manager_access_role_arn.clone())
                .set_secrets_manager_secret_id(conn.secrets_manager_arn.clone())
        } else {
            builder
                .set_username(conn.username.clone())
                .set_password(conn.password.clone())
                .set_server_name(conn.server_name.clone())
                .set_port(conn.port)
        }
    }};
}

macro_rules! flatten_connection {
    ($map:expr, $settings:expr) => {{
        let settings = $settings;
        $map.set("username", settings.username())
            .set("server_name", settings.server_name())
            .set("port", settings.port())
            .set("database_name", settings.database_name())
            .set(
                "secrets_manager_access_role_arn",
                settings.secrets_manager_access_role_arn(),
            )
            .set("secrets_manager_arn", settings.secrets_manager_secret_id());
    }};
}

// =============================================================================
// Expand
// =============================================================================

/// Settings structure sent with CreateEndpoint/ModifyEndpoint
#[derive(Debug, Clone)]
pub(crate) enum EngineSettings {
    MySql(MySqlSettings),
    PostgreSql(PostgreSqlSettings),
    DynamoDb(DynamoDbSettings),
    Elasticsearch(ElasticsearchSettings),
    Kafka(KafkaSettings),
    Kinesis(KinesisSettings),
    MongoDb(MongoDbSettings),
    Oracle(OracleSettings),
    Redis(RedisSettings),
    Redshift(RedshiftSettings),
    SqlServer(MicrosoftSqlServerSettings),
    Sybase(SybaseSettings),
    Db2(IbmDb2Settings),
    S3(S3Settings),
}

/// Sets the matching settings field on a CreateEndpoint or ModifyEndpoint
/// request builder.
macro_rules! apply_engine_settings {
    ($request:expr, $settings:expr) => {
        match $settings {
            EngineSettings::MySql(s) => $request.my_sql_settings(s),
            EngineSettings::PostgreSql(s) => $request.postgre_sql_settings(s),
            EngineSettings::DynamoDb(s) => $request.dynamo_db_settings(s),
            EngineSettings::Elasticsearch(s) => $request.elasticsearch_settings(s),
            EngineSettings::Kafka(s) => $request.kafka_settings(s),
            EngineSettings::Kinesis(s) => $request.kinesis_settings(s),
            EngineSettings::MongoDb(s) => $request.mongo_db_settings(s),
            EngineSettings::Oracle(s) => $request.oracle_settings(s),
            EngineSettings::Redis(s) => $request.redis_settings(s),
            EngineSettings::Redshift(s) => $request.redshift_settings(s),
            EngineSettings::SqlServer(s) => $request.microsoft_sql_server_settings(s),
            EngineSettings::Sybase(s) => $request.sybase_settings(s),
            EngineSettings::Db2(s) => $request.ibm_db2_settings(s),
            EngineSettings::S3(s) => $request.s3_settings(s),
        }
    };
}
pub(crate) use apply_engine_settings;

fn block<'a>(attrs: &'a Attributes, name: &str) -> Result<&'a Attributes, String> {
    get_block(attrs, name).ok_or_else(|| format!("{} must be set", name))
}

/// Builds the settings structure for the endpoint's engine. `None` means the
/// engine takes its connection details at the top level of the request.
pub(crate) fn expand_engine_settings(
    attrs: &Attributes,
) -> Result<Option<EngineSettings>, String> {
    let conn = ConnectionInfo::from_attributes(attrs);
    let settings = match EngineFamily::of(get_str(attrs, "engine_name").unwrap_or_default()) {
        EngineFamily::MySql => EngineSettings::MySql(if conn.uses_secrets_manager() {
            MySqlSettings::builder()
                .set_secrets_manager_access_role_arn(conn.secrets_manager_access_role_arn.clone())
                .set_secrets_manager_secret_id(conn.secrets_manager_arn.clone())
                .build()
        } else {
            with_connection!(MySqlSettings::builder(), &conn).build()
        }),
        EngineFamily::PostgreSql => {
            let settings = get_block(attrs, "postgres_settings")
                .map(expand_postgres_settings)
                .unwrap_or_default();
            EngineSettings::PostgreSql(with_connection!(settings, &conn).build())
        }
        EngineFamily::DynamoDb => EngineSettings::DynamoDb(
            DynamoDbSettings::builder()
                .service_access_role_arn(str_or_empty(attrs, "service_access_role"))
                .build()
                .map_err(|e| format!("dynamodb settings: {}", e))?,
        ),
        EngineFamily::Elasticsearch => EngineSettings::Elasticsearch(
            expand_elasticsearch_settings(block(attrs, "elasticsearch_settings")?)?,
        ),
        EngineFamily::Kafka => {
            EngineSettings::Kafka(expand_kafka_settings(block(attrs, "kafka_settings")?))
        }
        EngineFamily::Kinesis => {
            EngineSettings::Kinesis(expand_kinesis_settings(block(attrs, "kinesis_settings")?))
        }
        EngineFamily::MongoDb => {
            let settings = expand_mongodb_settings(
                get_block(attrs, "mongodb_settings").unwrap_or(&Attributes::new()),
            )
            .set_kms_key_id(get_string(attrs, "kms_key_arn"));
            EngineSettings::MongoDb(with_connection!(settings, &conn).build())
        }
        EngineFamily::Oracle => {
            EngineSettings::Oracle(with_connection!(OracleSettings::builder(), &conn).build())
        }
        EngineFamily::Redis => {
            EngineSettings::Redis(expand_redis_settings(block(attrs, "redis_settings")?)?)
        }
        EngineFamily::Redshift => {
            let settings = get_block(attrs, "redshift_settings")
                .map(expand_redshift_settings)
                .unwrap_or_default();
            EngineSettings::Redshift(with_connection!(settings, &conn).build())
        }
        EngineFamily::SqlServer => EngineSettings::SqlServer(
            with_connection!(MicrosoftSqlServerSettings::builder(), &conn).build(),
        ),
        EngineFamily::Sybase => {
            EngineSettings::Sybase(with_connection!(SybaseSettings::builder(), &conn).build())
        }
        EngineFamily::Db2 => {
            EngineSettings::Db2(with_connection!(IbmDb2Settings::builder(), &conn).build())
        }
        EngineFamily::S3 => EngineSettings::S3(expand_s3_settings(block(attrs, "s3_settings")?)),
        EngineFamily::Other => return Ok(None),
    };
    Ok(Some(settings))
}

pub(crate) fn expand_elasticsearch_settings(
    block: &Attributes,
) -> Result<ElasticsearchSettings, String> {
    ElasticsearchSettings::builder()
        .endpoint_uri(str_or_empty(block, "endpoint_uri"))
        .service_access_role_arn(str_or_empty(block, "service_access_role_arn"))
        .set_error_retry_duration(get_i32(block, "error_retry_duration"))
        .set_full_load_error_percentage(get_i32(block, "full_load_error_percentage"))
        .use_new_mapping_type(get_bool(block, "use_new_mapping_type").unwrap_or(false))
        .build()
        .map_err(|e| format!("elasticsearch_settings: {}", e))
}

pub(crate) fn expand_kafka_settings(block: &Attributes) -> KafkaSettings {
    let flag = |key: &str| get_bool(block, key).unwrap_or(false);
    KafkaSettings::builder()
        .set_broker(get_string(block, "broker"))
        .include_control_details(flag("include_control_details"))
        .include_null_and_empty(flag("include_null_and_empty"))
        .include_partition_value(flag("include_partition_value"))
        .include_table_alter_operations(flag("include_table_alter_operations"))
        .include_transaction_details(flag("include_transaction_details"))
        .set_message_format(get_str(block, "message_format").map(MessageFormatValue::from))
        .set_message_max_bytes(get_i32(block, "message_max_bytes").filter(|n| *n != 0))
        .no_hex_prefix(flag("no_hex_prefix"))
        .partition_include_schema_table(flag("partition_include_schema_table"))
        .set_sasl_password(get_string(block, "sasl_password"))
        .set_sasl_username(get_string(block, "sasl_username"))
        .set_security_protocol(get_str(block, "security_protocol").map(KafkaSecurityProtocol::from))
        .set_ssl_ca_certificate_arn(get_string(block, "ssl_ca_certificate_arn"))
        .set_ssl_client_certificate_arn(get_string(block, "ssl_client_certificate_arn"))
        .set_ssl_client_key_arn(get_string(block, "ssl_client_key_arn"))
        .set_ssl_client_key_password(get_string(block, "ssl_client_key_password"))
        .set_topic(get_string(block, "topic"))
        .build()
}

pub(crate) fn expand_kinesis_settings(block: &Attributes) -> KinesisSettings {
    let flag = |key: &str| get_bool(block, key).unwrap_or(false);
    KinesisSettings::builder()
        .include_control_details(flag("include_control_details"))
        .include_null_and_empty(flag("include_null_and_empty"))
        .include_partition_value(flag("include_partition_value"))
        .include_table_alter_operations(flag("include_table_alter_operations"))
        .include_transaction_details(flag("include_transaction_details"))
        .set_message_format(get_str(block, "message_format").map(MessageFormatValue::from))
        .partition_include_schema_table(flag("partition_include_schema_table"))
        .set_service_access_role_arn(get_string(block, "service_access_role_arn"))
        .set_stream_arn(get_string(block, "stream_arn"))
        .build()
}

fn expand_mongodb_settings(
    block: &Attributes,
) -> aws_sdk_databasemigration::types::builders::MongoDbSettingsBuilder {
    MongoDbSettings::builder()
        .set_auth_type(get_str(block, "auth_type").map(AuthTypeValue::from))
        .set_auth_mechanism(get_str(block, "auth_mechanism").map(AuthMechanismValue::from))
        .set_nesting_level(get_str(block, "nesting_level").map(NestingLevelValue::from))
        .set_extract_doc_id(get_string(block, "extract_doc_id"))
        .set_docs_to_investigate(get_string(block, "docs_to_investigate"))
        .set_auth_source(get_string(block, "auth_source"))
}

fn expand_postgres_settings(
    block: &Attributes,
) -> aws_sdk_databasemigration::types::builders::PostgreSqlSettingsBuilder {
    PostgreSqlSettings::builder()
        .set_after_connect_script(get_string(block, "after_connect_script"))
        .set_babelfish_database_name(get_string(block, "babelfish_database_name"))
        .set_capture_ddls(get_bool(block, "capture_ddls"))
        .set_database_mode(get_str(block, "database_mode").map(DatabaseMode::from))
        .set_ddl_artifacts_schema(get_string(block, "ddl_artifacts_schema"))
        .set_execute_timeout(get_i32(block, "execute_timeout"))
        .set_fail_tasks_on_lob_truncation(get_bool(block, "fail_tasks_on_lob_truncation"))
        .set_heartbeat_enable(get_bool(block, "heartbeat_enable"))
        .set_heartbeat_frequency(get_i32(block, "heartbeat_frequency"))
        .set_heartbeat_schema(get_string(block, "heartbeat_schema"))
        .set_map_boolean_as_boolean(get_bool(block, "map_boolean_as_boolean"))
        .set_map_jsonb_as_clob(get_bool(block, "map_jsonb_as_clob"))
        .set_map_long_varchar_as(
            get_str(block, "map_long_varchar_as").map(LongVarcharMappingType::from),
        )
        .set_max_file_size(get_i32(block, "max_file_size"))
        .set_plugin_name(get_str(block, "plugin_name").map(PluginNameValue::from))
        .set_slot_name(get_string(block, "slot_name"))
}

pub(crate) fn expand_redis_settings(block: &Attributes) -> Result<RedisSettings, String> {
    RedisSettings::builder()
        .set_auth_password(get_string(block, "auth_password"))
        .set_auth_type(get_str(block, "auth_type").map(RedisAuthTypeValue::from))
        .set_auth_user_name(get_string(block, "auth_user_name"))
        .port(get_i32(block, "port").unwrap_or_default())
        .server_name(str_or_empty(block, "server_name"))
        .set_ssl_ca_certificate_arn(get_string(block, "ssl_ca_certificate_arn"))
        .set_ssl_security_protocol(
            get_str(block, "ssl_security_protocol").map(SslSecurityProtocolValue::from),
        )
        .build()
        .map_err(|e| format!("redis_settings: {}", e))
}

fn expand_redshift_settings(
    block: &Attributes,
) -> aws_sdk_databasemigration::types::builders::RedshiftSettingsBuilder {
    RedshiftSettings::builder()
        .set_bucket_folder(get_string(block, "bucket_folder"))
        .set_bucket_name(get_string(block, "bucket_name"))
        .set_encryption_mode(get_str(block, "encryption_mode").map(EncryptionModeValue::from))
        .set_server_side_encryption_kms_key_id(get_string(
            block,
            "server_side_encryption_kms_key_id",
        ))
        .set_service_access_role_arn(get_string(block, "service_access_role_arn"))
}

/// S3 fields are sent even when empty so that clearing one takes effect
pub(crate) fn expand_s3_settings(block: &Attributes) -> S3Settings {
    let string = |key: &str| block.get(key).and_then(Value::as_str).map(str::to_string);
    let int = |key: &str| get_i32(block, key);
    let flag = |key: &str| get_bool(block, key);
    let upper = |key: &str| block.get(key).and_then(Value::as_str).map(str::to_uppercase);

    S3Settings::builder()
        .set_add_column_name(flag("add_column_name"))
        .set_bucket_folder(string("bucket_folder"))
        .set_bucket_name(string("bucket_name"))
        .set_canned_acl_for_objects(
            string("canned_acl_for_objects").map(|v| CannedAclForObjectsValue::from(v.as_str())),
        )
        .set_cdc_inserts_and_updates(flag("cdc_inserts_and_updates"))
        .set_cdc_inserts_only(flag("cdc_inserts_only"))
        .set_cdc_max_batch_interval(int("cdc_max_batch_interval"))
        .set_cdc_min_file_size(int("cdc_min_file_size"))
        .set_cdc_path(string("cdc_path"))
        .set_compression_type(
            string("compression_type").map(|v| CompressionTypeValue::from(v.as_str())),
        )
        .set_csv_delimiter(string("csv_delimiter"))
        .set_csv_no_sup_value(string("csv_no_sup_value"))
        .set_csv_null_value(string("csv_null_value"))
        .set_csv_row_delimiter(string("csv_row_delimiter"))
        .set_data_format(string("data_format").map(|v| DataFormatValue::from(v.as_str())))
        .set_data_page_size(int("data_page_size"))
        .set_date_partition_delimiter(
            upper("date_partition_delimiter")
                .map(|v| DatePartitionDelimiterValue::from(v.as_str())),
        )
        .set_date_partition_enabled(flag("date_partition_enabled"))
        .set_date_partition_sequence(
            upper("date_partition_sequence").map(|v| DatePartitionSequenceValue::from(v.as_str())),
        )
        .set_dict_page_size_limit(int("dict_page_size_limit"))
        .set_enable_statistics(flag("enable_statistics"))
        .set_encoding_type(string("encoding_type").map(|v| EncodingTypeValue::from(v.as_str())))
        .set_encryption_mode(
            string("encryption_mode").map(|v| EncryptionModeValue::from(v.as_str())),
        )
        .set_external_table_definition(string("external_table_definition"))
        .set_glue_catalog_generation(flag("glue_catalog_generation"))
        .set_ignore_header_rows(int("ignore_header_rows"))
        .set_include_op_for_full_load(flag("include_op_for_full_load"))
        .set_max_file_size(int("max_file_size"))
        .set_parquet_timestamp_in_millisecond(flag("parquet_timestamp_in_millisecond"))
        .set_parquet_version(
            string("parquet_version").map(|v| ParquetVersionValue::from(v.as_str())),
        )
        .set_preserve_transactions(flag("preserve_transactions"))
        .set_rfc4180(flag("rfc_4180"))
        .set_row_group_length(int("row_group_length"))
        .set_server_side_encryption_kms_key_id(string("server_side_encryption_kms_key_id"))
        .set_service_access_role_arn(string("service_access_role_arn"))
        .set_timestamp_column_name(string("timestamp_column_name"))
        .set_use_csv_no_sup_value(flag("use_csv_no_sup_value"))
        .set_use_task_start_time_for_full_load_timestamp(flag(
            "use_task_start_time_for_full_load_timestamp",
        ))
        .build()
}

// =============================================================================
// Flatten
// =============================================================================

/// Connection attributes as reported by the engine's settings structure,
/// falling back to the endpoint's top-level fields.
pub(crate) fn flatten_connection_info(map: &mut AttributeMap, endpoint: &Endpoint) {
    let family = EngineFamily::of(endpoint.engine_name().unwrap_or_default());
    let reported = match family {
        EngineFamily::MySql => endpoint.my_sql_settings().map(|s| flatten_connection!(map, s)),
        EngineFamily::PostgreSql => {
            endpoint.postgre_sql_settings().map(|s| flatten_connection!(map, s))
        }
        EngineFamily::MongoDb => endpoint.mongo_db_settings().map(|s| flatten_connection!(map, s)),
        EngineFamily::Oracle => endpoint.oracle_settings().map(|s| flatten_connection!(map, s)),
        EngineFamily::Redshift => endpoint.redshift_settings().map(|s| flatten_connection!(map, s)),
        EngineFamily::SqlServer => endpoint
            .microsoft_sql_server_settings()
            .map(|s| flatten_connection!(map, s)),
        EngineFamily::Sybase => endpoint.sybase_settings().map(|s| flatten_connection!(map, s)),
        EngineFamily::Db2 => endpoint.ibm_db2_settings().map(|s| flatten_connection!(map, s)),
        EngineFamily::Other => None,
        _ => return,
    };
    if reported.is_none() {
        map.set("username", endpoint.username())
            .set("server_name", endpoint.server_name())
            .set("port", endpoint.port())
            .set("database_name", endpoint.database_name());
    }
}

pub(crate) fn flatten_elasticsearch_settings(
    settings: Option<&ElasticsearchSettings>,
) -> Option<AttributeMap> {
    let settings = settings?;
    let mut map = AttributeMap::new();
    map.set("endpoint_uri", settings.endpoint_uri())
        .set("error_retry_duration", settings.error_retry_duration())
        .set("full_load_error_percentage", settings.full_load_error_percentage())
        .set("service_access_role_arn", settings.service_access_role_arn())
        .set("use_new_mapping_type", settings.use_new_mapping_type());
    Some(map)
}

/// `sasl_password` and `ssl_client_key_password` are never returned
pub(crate) fn flatten_kafka_settings(settings: Option<&KafkaSettings>) -> Option<AttributeMap> {
    let settings = settings?;
    let mut map = AttributeMap::new();
    map.set("broker", settings.broker())
        .set("include_control_details", settings.include_control_details())
        .set("include_null_and_empty", settings.include_null_and_empty())
        .set("include_partition_value", settings.include_partition_value())
        .set(
            "include_table_alter_operations",
            settings.include_table_alter_operations(),
        )
        .set(
            "include_transaction_details",
            settings.include_transaction_details(),
        )
        .set(
            "message_format",
            settings.message_format().map(|v| v.as_str()).unwrap_or_default(),
        )
        .set("message_max_bytes", settings.message_max_bytes())
        .set("no_hex_prefix", settings.no_hex_prefix())
        .set(
            "partition_include_schema_table",
            settings.partition_include_schema_table(),
        )
        .set("sasl_username", settings.sasl_username())
        .set(
            "security_protocol",
            settings.security_protocol().map(|v| v.as_str()).unwrap_or_default(),
        )
        .set("ssl_ca_certificate_arn", settings.ssl_ca_certificate_arn())
        .set("ssl_client_certificate_arn", settings.ssl_client_certificate_arn())
        .set("ssl_client_key_arn", settings.ssl_client_key_arn())
        .set("topic", settings.topic());
    Some(map)
}

pub(crate) fn flatten_kinesis_settings(settings: Option<&KinesisSettings>) -> Option<AttributeMap> {
    let settings = settings?;
    let mut map = AttributeMap::new();
    map.set("include_control_details", settings.include_control_details())
        .set("include_null_and_empty", settings.include_null_and_empty())
        .set("include_partition_value", settings.include_partition_value())
        .set(
            "include_table_alter_operations",
            settings.include_table_alter_operations(),
        )
        .set(
            "include_transaction_details",
            settings.include_transaction_details(),
        )
        .set(
            "message_format",
            settings.message_format().map(|v| v.as_str()).unwrap_or_default(),
        )
        .set(
            "partition_include_schema_table",
            settings.partition_include_schema_table(),
        )
        .set("service_access_role_arn", settings.service_access_role_arn())
        .set("stream_arn", settings.stream_arn());
    Some(map)
}

pub(crate) fn flatten_mongodb_settings(settings: Option<&MongoDbSettings>) -> Option<AttributeMap> {
    let settings = settings?;
    let mut map = AttributeMap::new();
    map.set("auth_type", settings.auth_type().map(|v| v.as_str()))
        .set("auth_mechanism", settings.auth_mechanism().map(|v| v.as_str()))
        .set("nesting_level", settings.nesting_level().map(|v| v.as_str()))
        .set("extract_doc_id", settings.extract_doc_id())
        .set("docs_to_investigate", settings.docs_to_investigate())
        .set("auth_source", settings.auth_source());
    Some(map)
}

pub(crate) fn flatten_postgres_settings(
    settings: Option<&PostgreSqlSettings>,
) -> Option<AttributeMap> {
    let settings = settings?;
    let mut map = AttributeMap::new();
    map.set("after_connect_script", settings.after_connect_script())
        .set("babelfish_database_name", settings.babelfish_database_name())
        .set("capture_ddls", settings.capture_ddls())
        .set(
            "database_mode",
            settings.database_mode().map(|v| v.as_str()).unwrap_or_default(),
        )
        .set("ddl_artifacts_schema", settings.ddl_artifacts_schema())
        .set("execute_timeout", settings.execute_timeout())
        .set(
            "fail_tasks_on_lob_truncation",
            settings.fail_tasks_on_lob_truncation(),
        )
        .set("heartbeat_enable", settings.heartbeat_enable())
        .set("heartbeat_frequency", settings.heartbeat_frequency())
        .set("heartbeat_schema", settings.heartbeat_schema())
        .set("map_boolean_as_boolean", settings.map_boolean_as_boolean())
        .set("map_jsonb_as_clob", settings.map_jsonb_as_clob())
        .set(
            "map_long_varchar_as",
            settings.map_long_varchar_as().map(|v| v.as_str()).unwrap_or_default(),
        )
        .set("max_file_size", settings.max_file_size())
        .set(
            "plugin_name",
            settings.plugin_name().map(|v| v.as_str()).unwrap_or_default(),
        )
        .set("slot_name", settings.slot_name());
    Some(map)
}

/// `auth_password` is never returned
pub(crate) fn flatten_redis_settings(settings: Option<&RedisSettings>) -> Option<AttributeMap> {
    let settings = settings?;
    let mut map = AttributeMap::new();
    map.set(
        "auth_type",
        settings.auth_type().map(|v| v.as_str()).unwrap_or_default(),
    )
    .set("auth_user_name", settings.auth_user_name())
    .set("port", settings.port())
    .set("server_name", settings.server_name())
    .set("ssl_ca_certificate_arn", settings.ssl_ca_certificate_arn())
    .set(
        "ssl_security_protocol",
        settings.ssl_security_protocol().map(|v| v.as_str()).unwrap_or_default(),
    );
    Some(map)
}

pub(crate) fn flatten_redshift_settings(
    settings: Option<&RedshiftSettings>,
) -> Option<AttributeMap> {
    let settings = settings?;
    let mut map = AttributeMap::new();
    map.set("bucket_folder", settings.bucket_folder())
        .set("bucket_name", settings.bucket_name())
        .set("encryption_mode", settings.encryption_mode().map(|v| v.as_str()))
        .set(
            "server_side_encryption_kms_key_id",
            settings.server_side_encryption_kms_key_id(),
        )
        .set("service_access_role_arn", settings.service_access_role_arn());
    Some(map)
}

/// Enumerated values are reported in the case the configuration uses:
/// compression type upper, date partitioning and ACL lower.
pub(crate) fn flatten_s3_settings(settings: Option<&S3Settings>) -> Option<AttributeMap> {
    let settings = settings?;
    let lower = |v: Option<&str>| v.unwrap_or_default().to_lowercase();
    let mut map = AttributeMap::new();
    map.set("add_column_name", settings.add_column_name())
        .set("bucket_folder", settings.bucket_folder())
        .set("bucket_name", settings.bucket_name())
        .set(
            "canned_acl_for_objects",
            lower(settings.canned_acl_for_objects().map(|v| v.as_str())),
        )
        .set("cdc_inserts_and_updates", settings.cdc_inserts_and_updates())
        .set("cdc_inserts_only", settings.cdc_inserts_only())
        .set("cdc_max_batch_interval", settings.cdc_max_batch_interval())
        .set("cdc_min_file_size", settings.cdc_min_file_size())
        .set("cdc_path", settings.cdc_path())
        .set(
            "compression_type",
            settings
                .compression_type()
                .map(|v| v.as_str())
                .unwrap_or_default()
                .to_uppercase(),
        )
        .set("csv_delimiter", settings.csv_delimiter())
        .set("csv_no_sup_value", settings.csv_no_sup_value())
        .set("csv_null_value", settings.csv_null_value())
        .set("csv_row_delimiter", settings.csv_row_delimiter())
        .set(
            "data_format",
            settings.data_format().map(|v| v.as_str()).unwrap_or_default(),
        )
        .set("data_page_size", settings.data_page_size())
        .set(
            "date_partition_delimiter",
            lower(settings.date_partition_delimiter().map(|v| v.as_str())),
        )
        .set("date_partition_enabled", settings.date_partition_enabled())
        .set(
            "date_partition_sequence",
            lower(settings.date_partition_sequence().map(|v| v.as_str())),
        )
        .set("dict_page_size_limit", settings.dict_page_size_limit())
        .set("enable_statistics", settings.enable_statistics())
        .set(
            "encoding_type",
            settings.encoding_type().map(|v| v.as_str()).unwrap_or_default(),
        )
        .set(
            "encryption_mode",
            settings.encryption_mode().map(|v| v.as_str()).unwrap_or_default(),
        )
        .set("external_table_definition", settings.external_table_definition())
        .set("glue_catalog_generation", settings.glue_catalog_generation())
        .set("ignore_header_rows", settings.ignore_header_rows())
        .set("include_op_for_full_load", settings.include_op_for_full_load())
        .set("max_file_size", settings.max_file_size())
        .set(
            "parquet_timestamp_in_millisecond",
            settings.parquet_timestamp_in_millisecond(),
        )
        .set(
            "parquet_version",
            settings.parquet_version().map(|v| v.as_str()).unwrap_or_default(),
        )
        .set("preserve_transactions", settings.preserve_transactions())
        .set("rfc_4180", settings.rfc4180())
        .set("row_group_length", settings.row_group_length())
        .set(
            "server_side_encryption_kms_key_id",
            settings.server_side_encryption_kms_key_id(),
        )
        .set("service_access_role_arn", settings.service_access_role_arn())
        .set("timestamp_column_name", settings.timestamp_column_name())
        .set("use_csv_no_sup_value", settings.use_csv_no_sup_value())
        .set(
            "use_task_start_time_for_full_load_timestamp",
            settings.use_task_start_time_for_full_load_timestamp(),
        );
    Some(map)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn attrs(pairs: &[(&str, Value)]) -> Attributes {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn block(pairs: &[(&str, Value)]) -> Value {
        Value::Map(attrs(pairs))
    }

    #[test]
    fn engine_families() {
        assert_eq!(EngineFamily::of("aurora"), EngineFamily::MySql);
        assert_eq!(EngineFamily::of("aurora-postgresql"), EngineFamily::PostgreSql);
        assert_eq!(EngineFamily::of("opensearch"), EngineFamily::Elasticsearch);
        assert_eq!(EngineFamily::of("babelfish"), EngineFamily::SqlServer);
        assert_eq!(EngineFamily::of("db2-zos"), EngineFamily::Db2);
        assert_eq!(EngineFamily::of("docdb"), EngineFamily::Other);
        assert!(EngineFamily::MongoDb.has_connection_settings());
        assert!(!EngineFamily::Kafka.has_connection_settings());
    }

    #[test]
    fn settings_fields_include_connection_for_databases() {
        let fields = EngineFamily::Redshift.settings_fields();
        assert!(fields.contains(&"redshift_settings"));
        assert!(fields.contains(&"password"));
        assert_eq!(EngineFamily::Kafka.settings_fields(), vec!["kafka_settings"]);
    }

    #[test]
    fn mysql_with_credentials() {
        let attrs = attrs(&[
            ("engine_name", Value::from("mysql")),
            ("username", Value::from("admin")),
            ("password", Value::from("secret")),
            ("server_name", Value::from("db.example.com")),
            ("port", Value::Int(3306)),
            ("database_name", Value::from("app")),
        ]);
        let Some(EngineSettings::MySql(settings)) = expand_engine_settings(&attrs).unwrap() else {
            panic!("expected mysql settings");
        };
        assert_eq!(settings.username(), Some("admin"));
        assert_eq!(settings.port(), Some(3306));
        assert_eq!(settings.database_name(), Some("app"));
        assert_eq!(settings.secrets_manager_secret_id(), None);
    }

    #[test]
    fn postgres_with_secrets_manager() {
        let attrs = attrs(&[
            ("engine_name", Value::from("postgres")),
            ("database_name", Value::from("app")),
            (
                "secrets_manager_access_role_arn",
                Value::from("arn:aws:iam::123456789012:role/dms"),
            ),
            (
                "secrets_manager_arn",
                Value::from("arn:aws:secretsmanager:us-east-1:123456789012:secret:db"),
            ),
            (
                "postgres_settings",
                block(&[
                    ("heartbeat_enable", Value::Bool(true)),
                    ("plugin_name", Value::from("pglogical")),
                ]),
            ),
        ]);
        let Some(EngineSettings::PostgreSql(settings)) = expand_engine_settings(&attrs).unwrap()
        else {
            panic!("expected postgres settings");
        };
        assert_eq!(settings.username(), None);
        assert_eq!(settings.database_name(), Some("app"));
        assert_eq!(
            settings.secrets_manager_secret_id(),
            Some("arn:aws:secretsmanager:us-east-1:123456789012:secret:db")
        );
        assert_eq!(settings.heartbeat_enable(), Some(true));
        assert_eq!(settings.plugin_name(), Some(&PluginNameValue::Pglogical));
    }

    #[test]
    fn other_engines_use_top_level_fields() {
        let attrs = attrs(&[("engine_name", Value::from("docdb"))]);
        assert!(expand_engine_settings(&attrs).unwrap().is_none());
    }

    #[test]
    fn missing_required_block_is_an_error() {
        let attrs = attrs(&[("engine_name", Value::from("kafka"))]);
        let err = expand_engine_settings(&attrs).unwrap_err();
        assert_eq!(err, "kafka_settings must be set");
    }

    #[test]
    fn kafka_skips_zero_message_max_bytes() {
        let block = attrs(&[
            ("broker", Value::from("b-1.kafka:9092")),
            ("message_max_bytes", Value::Int(0)),
            ("security_protocol", Value::from("sasl-ssl")),
        ]);
        let settings = expand_kafka_settings(&block);
        assert_eq!(settings.message_max_bytes(), None);
        assert_eq!(settings.include_null_and_empty(), Some(false));
        assert_eq!(
            settings.security_protocol(),
            Some(&KafkaSecurityProtocol::SaslSsl)
        );
    }

    #[test]
    fn s3_sends_empty_strings_and_uppercases_partitioning() {
        let block = attrs(&[
            ("bucket_folder", Value::from("")),
            ("bucket_name", Value::from("dms-target")),
            ("date_partition_sequence", Value::from("yyyymmddhh")),
            ("rfc_4180", Value::Bool(false)),
        ]);
        let settings = expand_s3_settings(&block);
        assert_eq!(settings.bucket_folder(), Some(""));
        assert_eq!(
            settings.date_partition_sequence(),
            Some(&DatePartitionSequenceValue::Yyyymmddhh)
        );
        assert_eq!(settings.rfc4180(), Some(false));
    }

    #[test]
    fn redis_requires_server_name() {
        let block = attrs(&[
            ("auth_type", Value::from("auth-token")),
            ("port", Value::Int(6379)),
            ("server_name", Value::from("redis.example.com")),
        ]);
        let settings = expand_redis_settings(&block).unwrap();
        assert_eq!(settings.port(), 6379);
        assert_eq!(settings.auth_type(), Some(&RedisAuthTypeValue::AuthToken));
    }

    #[test]
    fn flattens_s3_case() {
        let settings = S3Settings::builder()
            .compression_type(CompressionTypeValue::Gzip)
            .date_partition_delimiter(DatePartitionDelimiterValue::Dash)
            .canned_acl_for_objects(CannedAclForObjectsValue::BucketOwnerFullControl)
            .build();
        let map = flatten_s3_settings(Some(&settings)).unwrap().into_inner();
        assert_eq!(map["compression_type"], Value::from("GZIP"));
        assert_eq!(map["date_partition_delimiter"], Value::from("dash"));
        assert_eq!(
            map["canned_acl_for_objects"],
            Value::from("bucket-owner-full-control")
        );
        assert!(flatten_s3_settings(None).is_none());
    }

    #[test]
    fn kafka_flatten_omits_secrets() {
        let settings = KafkaSettings::builder()
            .broker("b-1.kafka:9092")
            .sasl_password("hunter2")
            .build();
        let map: HashMap<String, Value> =
            flatten_kafka_settings(Some(&settings)).unwrap().into_inner();
        assert_eq!(map["broker"], Value::from("b-1.kafka:9092"));
        assert!(!map.contains_key("sasl_password"));
    }

    #[test]
    fn connection_info_prefers_settings_structure() {
        let endpoint = Endpoint::builder()
            .engine_name("oracle")
            .username("top")
            .oracle_settings(
                OracleSettings::builder()
                    .username("nested")
                    .port(1521)
                    .build(),
            )
            .build();
        let mut map = AttributeMap::new();
        flatten_connection_info(&mut map, &endpoint);
        let map = map.into_inner();
        assert_eq!(map["username"], Value::from("nested"));
        assert_eq!(map["port"], Value::Int(1521));

        let endpoint = Endpoint::builder()
            .engine_name("docdb")
            .username("top")
            .port(27017)
            .build();
        let mut map = AttributeMap::new();
        flatten_connection_info(&mut map, &endpoint);
        assert_eq!(map.into_inner()["username"], Value::from("top"));
    }
}
