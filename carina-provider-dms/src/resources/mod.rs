//! Resource type definitions and CRUD shared by the DMS resources
//!
//! Each submodule adds `read_*`/`create_*`/`update_*`/`delete_*` methods to
//! [`DmsProvider`](crate::DmsProvider).

mod certificate;
mod endpoint;
mod endpoint_settings;
mod replication_config;
mod replication_instance;
mod replication_subnet_group;
mod replication_task;

use std::fmt::Debug;
use std::time::Duration;

use aws_sdk_databasemigration::error::ProvideErrorMetadata;
use aws_sdk_databasemigration::primitives::{DateTime, DateTimeFormat};
use carina_core::provider::{ProviderError, ResourceType};
use carina_core::resource::ResourceId;
use carina_core::schema::ResourceSchema;
use carina_core::waiter::WaitError;

use crate::error::{FindError, describe};
use crate::schemas;

macro_rules! define_resource_type {
    ($name:ident, $module:ident) => {
        pub struct $name;
        impl ResourceType for $name {
            fn name(&self) -> &'static str {
                schemas::$module::RESOURCE_TYPE
            }
            fn schema(&self) -> ResourceSchema {
                schemas::$module::schema()
            }
        }
    };
}

macro_rules! define_data_source_type {
    ($name:ident, $module:ident) => {
        pub struct $name;
        impl ResourceType for $name {
            fn name(&self) -> &'static str {
                schemas::$module::RESOURCE_TYPE
            }
            fn schema(&self) -> ResourceSchema {
                schemas::$module::data_source_schema()
            }
        }
    };
}

define_resource_type!(CertificateType, certificate);
define_resource_type!(EndpointType, endpoint);
define_resource_type!(ReplicationConfigType, replication_config);
define_resource_type!(ReplicationInstanceType, replication_instance);
define_resource_type!(ReplicationSubnetGroupType, replication_subnet_group);
define_resource_type!(ReplicationTaskType, replication_task);

define_data_source_type!(CertificateDataSource, certificate);
define_data_source_type!(EndpointDataSource, endpoint);
define_data_source_type!(ReplicationInstanceDataSource, replication_instance);
define_data_source_type!(ReplicationSubnetGroupDataSource, replication_subnet_group);
define_data_source_type!(ReplicationTaskDataSource, replication_task);

/// Returns all managed resource types
pub fn resource_types() -> Vec<Box<dyn ResourceType>> {
    vec![
        Box::new(CertificateType),
        Box::new(EndpointType),
        Box::new(ReplicationConfigType),
        Box::new(ReplicationInstanceType),
        Box::new(ReplicationSubnetGroupType),
        Box::new(ReplicationTaskType),
    ]
}

/// Returns all data source types
pub fn data_source_types() -> Vec<Box<dyn ResourceType>> {
    vec![
        Box::new(CertificateDataSource),
        Box::new(EndpointDataSource),
        Box::new(ReplicationInstanceDataSource),
        Box::new(ReplicationSubnetGroupDataSource),
        Box::new(ReplicationTaskDataSource),
    ]
}

// =============================================================================
// Default timeouts
// =============================================================================

pub(crate) const ENDPOINT_DELETE_TIMEOUT: Duration = Duration::from_secs(10 * 60);
pub(crate) const ENDPOINT_PROPAGATION_TIMEOUT: Duration = Duration::from_secs(2 * 60);
pub(crate) const CONNECTION_TEST_TIMEOUT: Duration = Duration::from_secs(2 * 60);
pub(crate) const INSTANCE_CREATE_TIMEOUT: Duration = Duration::from_secs(40 * 60);
pub(crate) const INSTANCE_UPDATE_TIMEOUT: Duration = Duration::from_secs(30 * 60);
pub(crate) const INSTANCE_DELETE_TIMEOUT: Duration = Duration::from_secs(30 * 60);
pub(crate) const SUBNET_GROUP_TIMEOUT: Duration = Duration::from_secs(15 * 60);
pub(crate) const TASK_TIMEOUT: Duration = Duration::from_secs(15 * 60);
pub(crate) const REPLICATION_CONFIG_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// RFC3339 rendering of a response timestamp
pub(crate) fn timestamp(time: Option<&DateTime>) -> Option<String> {
    time.and_then(|t| t.fmt(DateTimeFormat::DateTime).ok())
}

// =============================================================================
// Error helpers
// =============================================================================

/// Provider error for a failed API call
pub(crate) fn api_error<E>(action: &str, err: &E, id: &ResourceId) -> ProviderError
where
    E: ProvideErrorMetadata + Debug,
{
    ProviderError::new(format!("Failed to {}: {}", action, describe(err))).for_resource(id.clone())
}

pub(crate) fn find_failed(action: &str, err: FindError, id: &ResourceId) -> ProviderError {
    ProviderError::new(format!("Failed to {}: {}", action, err)).for_resource(id.clone())
}

pub(crate) fn wait_failed(
    action: &str,
    err: WaitError<FindError>,
    id: &ResourceId,
) -> ProviderError {
    ProviderError::new(format!("Failed waiting for {}: {}", action, err)).for_resource(id.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_type_names() {
        let names: Vec<&str> = resource_types().iter().map(|t| t.name()).collect();
        assert_eq!(
            names,
            vec![
                "dms_certificate",
                "dms_endpoint",
                "dms_replication_config",
                "dms_replication_instance",
                "dms_replication_subnet_group",
                "dms_replication_task",
            ]
        );
    }

    #[test]
    fn data_sources_share_resource_names() {
        let resources: Vec<&str> = resource_types().iter().map(|t| t.name()).collect();
        for ds in data_source_types() {
            assert!(resources.contains(&ds.name()));
            assert!(ds.schema().validators.is_empty());
        }
    }

    #[test]
    fn schemas_match_type_names() {
        for t in resource_types() {
            assert_eq!(t.schema().resource_type, t.name());
        }
    }
}
