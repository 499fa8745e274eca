//! Carina DMS Provider
//!
//! AWS Database Migration Service resources and data sources: certificates,
//! endpoints, replication instances, subnet groups, replication tasks and
//! serverless replication configs.

pub mod attributes;
pub mod consts;
pub mod error;
pub mod find;
pub mod resources;
pub mod schemas;
pub mod status;
pub mod tags;
pub mod validation;

use aws_config::{BehaviorVersion, Region};
use aws_sdk_databasemigration::Client;
use carina_core::config::ProviderConfig;
use carina_core::provider::{BoxFuture, Provider, ProviderError, ProviderResult, ResourceType};
use carina_core::resource::{Resource, ResourceId, State};
use carina_core::waiter::Timeouts;
use log::debug;

use crate::attributes::{get_str, get_string, get_string_map};
use crate::error::describe;
use crate::schemas::{
    certificate, endpoint, replication_config, replication_instance, replication_subnet_group,
    replication_task,
};
use crate::tags::{Tags, plan_tags_all};

const DEFAULT_REGION: &str = "us-east-1";
const DEFAULT_PARTITION: &str = "aws";

/// DMS Provider
pub struct DmsProvider {
    pub(crate) client: Client,
    pub(crate) region: String,
    pub(crate) partition: String,
    pub(crate) account_id: String,
    pub(crate) default_tags: Tags,
}

impl DmsProvider {
    /// Create a provider from the `provider` block of a configuration.
    ///
    /// Resolves the caller's account and partition through STS so that
    /// ARNs the API does not return can be derived.
    pub async fn new(config: &ProviderConfig) -> ProviderResult<Self> {
        let attrs = &config.attributes;
        let region = get_string(attrs, "region").unwrap_or_else(|| DEFAULT_REGION.to_string());

        let mut loader =
            aws_config::defaults(BehaviorVersion::latest()).region(Region::new(region.clone()));
        if let Some(profile) = get_str(attrs, "profile") {
            loader = loader.profile_name(profile);
        }
        if let Some(url) = get_str(attrs, "endpoint_url") {
            loader = loader.endpoint_url(url);
        }
        let sdk_config = loader.load().await;

        let identity = aws_sdk_sts::Client::new(&sdk_config)
            .get_caller_identity()
            .send()
            .await
            .map_err(|e| {
                ProviderError::new(format!("Failed to get caller identity: {}", describe(&e)))
            })?;
        let account_id = identity.account().unwrap_or_default().to_string();
        let partition = identity
            .arn()
            .and_then(partition_of)
            .unwrap_or(DEFAULT_PARTITION)
            .to_string();
        debug!(
            "DMS provider for account {} in {} ({})",
            account_id, region, partition
        );

        Ok(Self {
            client: Client::new(&sdk_config),
            region,
            partition,
            account_id,
            default_tags: Tags::new(get_string_map(attrs, "default_tags")),
        })
    }

    /// Create with a specific client (for testing)
    pub fn with_client(
        client: Client,
        region: impl Into<String>,
        partition: impl Into<String>,
        account_id: impl Into<String>,
        default_tags: Tags,
    ) -> Self {
        Self {
            client,
            region: region.into(),
            partition: partition.into(),
            account_id: account_id.into(),
            default_tags,
        }
    }

    async fn read_by_type(&self, id: &ResourceId, identifier: &str) -> ProviderResult<State> {
        match id.resource_type.as_str() {
            certificate::RESOURCE_TYPE => self.read_certificate(id, identifier).await,
            endpoint::RESOURCE_TYPE => self.read_endpoint(id, identifier).await,
            replication_config::RESOURCE_TYPE => {
                self.read_replication_config(id, identifier).await
            }
            replication_instance::RESOURCE_TYPE => {
                self.read_replication_instance(id, identifier).await
            }
            replication_subnet_group::RESOURCE_TYPE => {
                self.read_replication_subnet_group(id, identifier).await
            }
            replication_task::RESOURCE_TYPE => self.read_replication_task(id, identifier).await,
            _ => Err(unknown_type(id)),
        }
    }
}

/// `arn:<partition>:...`
fn partition_of(arn: &str) -> Option<&str> {
    arn.split(':').nth(1).filter(|p| !p.is_empty())
}

fn unknown_type(id: &ResourceId) -> ProviderError {
    ProviderError::new(format!("Unknown resource type: {}", id.resource_type))
        .for_resource(id.clone())
}

/// Attribute a data source of the given type is looked up by
fn lookup_attribute(resource_type: &str) -> Option<&'static str> {
    match resource_type {
        certificate::RESOURCE_TYPE => Some(certificate::LOOKUP),
        endpoint::RESOURCE_TYPE => Some(endpoint::LOOKUP),
        replication_instance::RESOURCE_TYPE => Some(replication_instance::LOOKUP),
        replication_subnet_group::RESOURCE_TYPE => Some(replication_subnet_group::LOOKUP),
        replication_task::RESOURCE_TYPE => Some(replication_task::LOOKUP),
        _ => None,
    }
}

impl Provider for DmsProvider {
    fn name(&self) -> &'static str {
        "dms"
    }

    fn resource_types(&self) -> Vec<Box<dyn ResourceType>> {
        resources::resource_types()
    }

    fn data_source_types(&self) -> Vec<Box<dyn ResourceType>> {
        resources::data_source_types()
    }

    fn plan_resource(&self, resource: &Resource) -> Resource {
        let mut planned = resource.clone();
        if let Some(schema) = schemas::all_schemas()
            .into_iter()
            .find(|s| s.resource_type == resource.id.resource_type)
        {
            plan_tags_all(&schema, &mut planned.attributes, &self.default_tags);
        }
        planned
    }

    fn read(
        &self,
        id: &ResourceId,
        identifier: Option<&str>,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.map(str::to_string);
        Box::pin(async move {
            match identifier {
                Some(identifier) => self.read_by_type(&id, &identifier).await,
                None => Ok(State::not_found(id)),
            }
        })
    }

    fn read_data_source(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        let resource = resource.clone();
        Box::pin(async move {
            let id = &resource.id;
            let lookup = lookup_attribute(&id.resource_type).ok_or_else(|| {
                ProviderError::new(format!("{} has no data source", id.resource_type))
                    .for_resource(id.clone())
            })?;
            let key = get_string(&resource.attributes, lookup).ok_or_else(|| {
                ProviderError::new(format!("{} is required", lookup)).for_resource(id.clone())
            })?;

            let state = self.read_by_type(id, &key).await?;
            if !state.exists {
                return Err(ProviderError::new(format!(
                    "no {} found with {} {}",
                    id.resource_type, lookup, key
                ))
                .for_resource(id.clone()));
            }
            Ok(state)
        })
    }

    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        let resource = resource.clone();
        Box::pin(async move {
            match resource.id.resource_type.as_str() {
                certificate::RESOURCE_TYPE => self.create_certificate(resource).await,
                endpoint::RESOURCE_TYPE => self.create_endpoint(resource).await,
                replication_config::RESOURCE_TYPE => self.create_replication_config(resource).await,
                replication_instance::RESOURCE_TYPE => {
                    self.create_replication_instance(resource).await
                }
                replication_subnet_group::RESOURCE_TYPE => {
                    self.create_replication_subnet_group(resource).await
                }
                replication_task::RESOURCE_TYPE => self.create_replication_task(resource).await,
                _ => Err(unknown_type(&resource.id)),
            }
        })
    }

    fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        let from = from.clone();
        let to = to.clone();
        Box::pin(async move {
            let identifier = identifier.as_str();
            match id.resource_type.as_str() {
                certificate::RESOURCE_TYPE => {
                    self.update_certificate(id, identifier, &from, to).await
                }
                endpoint::RESOURCE_TYPE => self.update_endpoint(id, identifier, &from, to).await,
                replication_config::RESOURCE_TYPE => {
                    self.update_replication_config(id, identifier, &from, to)
                        .await
                }
                replication_instance::RESOURCE_TYPE => {
                    self.update_replication_instance(id, identifier, &from, to)
                        .await
                }
                replication_subnet_group::RESOURCE_TYPE => {
                    self.update_replication_subnet_group(id, identifier, &from, to)
                        .await
                }
                replication_task::RESOURCE_TYPE => {
                    self.update_replication_task(id, identifier, &from, to)
                        .await
                }
                _ => Err(unknown_type(&id)),
            }
        })
    }

    fn delete(
        &self,
        id: &ResourceId,
        identifier: &str,
        timeouts: Timeouts,
    ) -> BoxFuture<'_, ProviderResult<()>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        Box::pin(async move {
            let identifier = identifier.as_str();
            match id.resource_type.as_str() {
                certificate::RESOURCE_TYPE => self.delete_certificate(id, identifier).await,
                endpoint::RESOURCE_TYPE => self.delete_endpoint(id, identifier, timeouts).await,
                replication_config::RESOURCE_TYPE => {
                    self.delete_replication_config(id, identifier, timeouts).await
                }
                replication_instance::RESOURCE_TYPE => {
                    self.delete_replication_instance(id, identifier, timeouts).await
                }
                replication_subnet_group::RESOURCE_TYPE => {
                    self.delete_replication_subnet_group(id, identifier, timeouts)
                        .await
                }
                replication_task::RESOURCE_TYPE => {
                    self.delete_replication_task(id, identifier, timeouts).await
                }
                _ => Err(unknown_type(&id)),
            }
        })
    }
}

/// Client that never reaches the network; only request building is exercised
#[cfg(test)]
pub(crate) fn test_client() -> Client {
    let config = aws_sdk_databasemigration::Config::builder()
        .behavior_version(BehaviorVersion::latest())
        .region(Region::new(DEFAULT_REGION))
        .build();
    Client::from_conf(config)
}

#[cfg(test)]
pub(crate) fn test_provider() -> DmsProvider {
    DmsProvider::with_client(
        test_client(),
        DEFAULT_REGION,
        DEFAULT_PARTITION,
        "123456789012",
        Tags::default(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_from_caller_arn() {
        assert_eq!(
            partition_of("arn:aws-us-gov:iam::123456789012:user/ci"),
            Some("aws-us-gov")
        );
        assert_eq!(partition_of("arn::iam"), None);
        assert_eq!(partition_of("garbage"), None);
    }

    #[test]
    fn every_data_source_has_lookup() {
        for ds in resources::data_source_types() {
            assert!(lookup_attribute(ds.name()).is_some(), "{}", ds.name());
        }
        assert_eq!(lookup_attribute(replication_config::RESOURCE_TYPE), None);
    }

    #[tokio::test]
    async fn read_without_identifier_is_not_found() {
        let provider = test_provider();
        let id = ResourceId::new(endpoint::RESOURCE_TYPE, "source");
        let state = provider.read(&id, None).await.unwrap();
        assert!(!state.exists);
    }

    #[tokio::test]
    async fn unknown_type_is_rejected() {
        let provider = test_provider();
        let id = ResourceId::new("dms_unknown", "x");
        let err = provider.read(&id, Some("x")).await.unwrap_err();
        assert!(err.message.contains("Unknown resource type"));
    }

    #[tokio::test]
    async fn data_source_requires_lookup() {
        let provider = test_provider();
        let resource = Resource::new(certificate::RESOURCE_TYPE, "ca").with_read_only(true);
        let err = provider.read_data_source(&resource).await.unwrap_err();
        assert_eq!(err.message, "certificate_id is required");
    }
}
