//! Engine names, enumerated API values and status strings

// =============================================================================
// Engines
// =============================================================================

pub const ENGINE_AURORA: &str = "aurora";
pub const ENGINE_AURORA_POSTGRESQL: &str = "aurora-postgresql";
pub const ENGINE_AURORA_POSTGRESQL_SERVERLESS: &str = "aurora-postgresql-serverless";
pub const ENGINE_AURORA_SERVERLESS: &str = "aurora-serverless";
pub const ENGINE_AZURE_SQL_MANAGED_INSTANCE: &str = "azure-sql-managed-instance";
pub const ENGINE_AZUREDB: &str = "azuredb";
pub const ENGINE_BABELFISH: &str = "babelfish";
pub const ENGINE_DB2: &str = "db2";
pub const ENGINE_DB2_ZOS: &str = "db2-zos";
pub const ENGINE_DOCDB: &str = "docdb";
pub const ENGINE_DYNAMODB: &str = "dynamodb";
pub const ENGINE_ELASTICSEARCH: &str = "elasticsearch";
pub const ENGINE_KAFKA: &str = "kafka";
pub const ENGINE_KINESIS: &str = "kinesis";
pub const ENGINE_MARIADB: &str = "mariadb";
pub const ENGINE_MONGODB: &str = "mongodb";
pub const ENGINE_MYSQL: &str = "mysql";
pub const ENGINE_OPENSEARCH: &str = "opensearch";
pub const ENGINE_ORACLE: &str = "oracle";
pub const ENGINE_POSTGRES: &str = "postgres";
pub const ENGINE_REDIS: &str = "redis";
pub const ENGINE_REDSHIFT: &str = "redshift";
pub const ENGINE_REDSHIFT_SERVERLESS: &str = "redshift-serverless";
pub const ENGINE_S3: &str = "s3";
pub const ENGINE_SQLSERVER: &str = "sqlserver";
pub const ENGINE_SYBASE: &str = "sybase";

pub const ENGINE_NAMES: &[&str] = &[
    ENGINE_AURORA,
    ENGINE_AURORA_POSTGRESQL,
    ENGINE_AURORA_POSTGRESQL_SERVERLESS,
    ENGINE_AURORA_SERVERLESS,
    ENGINE_AZURE_SQL_MANAGED_INSTANCE,
    ENGINE_AZUREDB,
    ENGINE_BABELFISH,
    ENGINE_DB2,
    ENGINE_DB2_ZOS,
    ENGINE_DOCDB,
    ENGINE_DYNAMODB,
    ENGINE_ELASTICSEARCH,
    ENGINE_KAFKA,
    ENGINE_KINESIS,
    ENGINE_MARIADB,
    ENGINE_MONGODB,
    ENGINE_MYSQL,
    ENGINE_OPENSEARCH,
    ENGINE_ORACLE,
    ENGINE_POSTGRES,
    ENGINE_REDIS,
    ENGINE_REDSHIFT,
    ENGINE_REDSHIFT_SERVERLESS,
    ENGINE_S3,
    ENGINE_SQLSERVER,
    ENGINE_SYBASE,
];

// =============================================================================
// Endpoint enums
// =============================================================================

pub const ENDPOINT_TYPES: &[&str] = &["source", "target"];

pub const SSL_MODES: &[&str] = &["none", "require", "verify-ca", "verify-full"];

pub const KAFKA_SECURITY_PROTOCOLS: &[&str] = &[
    "plaintext",
    "ssl-authentication",
    "ssl-encryption",
    "sasl-ssl",
];

pub const MESSAGE_FORMAT_JSON: &str = "json";
pub const MESSAGE_FORMATS: &[&str] = &[MESSAGE_FORMAT_JSON, "json-unformatted"];

pub const MONGODB_AUTH_TYPES: &[&str] = &["no", "password"];
pub const MONGODB_AUTH_MECHANISMS: &[&str] = &["default", "mongodb_cr", "scram_sha_1"];
pub const MONGODB_NESTING_LEVELS: &[&str] = &["none", "one"];

pub const REDIS_AUTH_TYPES: &[&str] = &["none", "auth-role", "auth-token"];
pub const REDIS_SSL_PROTOCOLS: &[&str] = &["plaintext", "ssl-encryption"];

pub const ENCRYPTION_MODE_SSE_S3: &str = "SSE_S3";
pub const ENCRYPTION_MODE_SSE_KMS: &str = "SSE_KMS";
pub const ENCRYPTION_MODES: &[&str] = &[ENCRYPTION_MODE_SSE_S3, ENCRYPTION_MODE_SSE_KMS];

pub const S3_COMPRESSION_TYPES: &[&str] = &["NONE", "GZIP"];
pub const S3_DATA_FORMATS: &[&str] = &["csv", "parquet"];
pub const S3_ENCODING_TYPES: &[&str] = &["plain", "plain-dictionary", "rle-dictionary"];
pub const S3_PARQUET_VERSIONS: &[&str] = &["parquet-1-0", "parquet-2-0"];
pub const S3_DATE_PARTITION_DELIMITERS: &[&str] = &["slash", "underscore", "dash", "none"];
pub const S3_DATE_PARTITION_SEQUENCES: &[&str] =
    &["yyyymmdd", "yyyymmddhh", "yyyymm", "mmyyyydd", "ddmmyyyy"];
pub const S3_CANNED_ACLS: &[&str] = &[
    "none",
    "private",
    "public-read",
    "public-read-write",
    "authenticated-read",
    "aws-exec-read",
    "bucket-owner-read",
    "bucket-owner-full-control",
];

pub const POSTGRES_DATABASE_MODES: &[&str] = &["default", "babelfish"];
pub const POSTGRES_LONG_VARCHAR_MAPPINGS: &[&str] = &["wstring", "clob", "nclob"];
pub const POSTGRES_PLUGIN_NAMES: &[&str] = &["no-preference", "test-decoding", "pglogical"];

// =============================================================================
// Replication enums
// =============================================================================

pub const MIGRATION_TYPES: &[&str] = &["full-load", "cdc", "full-load-and-cdc"];

pub const NETWORK_TYPES: &[&str] = &["IPV4", "DUAL"];

pub const START_TYPE_START_REPLICATION: &str = "start-replication";
pub const START_TYPE_RESUME_PROCESSING: &str = "resume-processing";

/// Allowed `compute_config.max_capacity_units` values for serverless replication
pub const CAPACITY_UNITS: &[i64] = &[1, 2, 4, 8, 16, 32, 64, 128, 192, 256, 384];

// =============================================================================
// Status strings
// =============================================================================

pub const ENDPOINT_STATUS_ACTIVE: &str = "active";
pub const ENDPOINT_STATUS_CREATING: &str = "creating";
pub const ENDPOINT_STATUS_DELETING: &str = "deleting";

pub const INSTANCE_STATUS_AVAILABLE: &str = "available";
pub const INSTANCE_STATUS_CREATING: &str = "creating";
pub const INSTANCE_STATUS_DELETING: &str = "deleting";
pub const INSTANCE_STATUS_MAINTENANCE: &str = "maintenance";
pub const INSTANCE_STATUS_MODIFYING: &str = "modifying";
pub const INSTANCE_STATUS_REBOOTING: &str = "rebooting";
pub const INSTANCE_STATUS_UPGRADING: &str = "upgrading";

pub const TASK_STATUS_CREATING: &str = "creating";
pub const TASK_STATUS_DELETING: &str = "deleting";
pub const TASK_STATUS_FAILED: &str = "failed";
pub const TASK_STATUS_MODIFYING: &str = "modifying";
pub const TASK_STATUS_MOVING: &str = "moving";
pub const TASK_STATUS_READY: &str = "ready";
pub const TASK_STATUS_RUNNING: &str = "running";
pub const TASK_STATUS_STARTING: &str = "starting";
pub const TASK_STATUS_STOPPED: &str = "stopped";
pub const TASK_STATUS_STOPPING: &str = "stopping";
pub const TASK_STATUS_TESTING: &str = "testing";

pub const REPLICATION_STATUS_CALCULATING_CAPACITY: &str = "calculating_capacity";
pub const REPLICATION_STATUS_CREATED: &str = "created";
pub const REPLICATION_STATUS_DELETING: &str = "deleting";
pub const REPLICATION_STATUS_FAILED: &str = "failed";
pub const REPLICATION_STATUS_FETCHING_METADATA: &str = "fetching_metadata";
pub const REPLICATION_STATUS_INITIALIZING: &str = "initializing";
pub const REPLICATION_STATUS_PREPARING_METADATA_RESOURCES: &str = "preparing_metadata_resources";
pub const REPLICATION_STATUS_PROVISIONING_CAPACITY: &str = "provisioning_capacity";
pub const REPLICATION_STATUS_REPLICATION_STARTING: &str = "replication_starting";
pub const REPLICATION_STATUS_RUNNING: &str = "running";
pub const REPLICATION_STATUS_STOPPED: &str = "stopped";
pub const REPLICATION_STATUS_STOPPING: &str = "stopping";
pub const REPLICATION_STATUS_TESTING_CONNECTION: &str = "testing_connection";

pub const CONNECTION_STATUS_SUCCESSFUL: &str = "successful";
pub const CONNECTION_STATUS_TESTING: &str = "testing";

// =============================================================================
// Filter names
// =============================================================================

pub const FILTER_CERTIFICATE_ID: &str = "certificate-id";
pub const FILTER_ENDPOINT_ARN: &str = "endpoint-arn";
pub const FILTER_ENDPOINT_ID: &str = "endpoint-id";
pub const FILTER_REPLICATION_CONFIG_ARN: &str = "replication-config-arn";
pub const FILTER_REPLICATION_INSTANCE_ARN: &str = "replication-instance-arn";
pub const FILTER_REPLICATION_INSTANCE_ID: &str = "replication-instance-id";
pub const FILTER_REPLICATION_SUBNET_GROUP_ID: &str = "replication-subnet-group-id";
pub const FILTER_REPLICATION_TASK_ID: &str = "replication-task-id";
