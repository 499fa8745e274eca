//! dms_replication_config
//!
//! Serverless replications are identified by their ARN. Starting one
//! provisions capacity, so create and update can take up to an hour.

use std::time::Duration;

use aws_sdk_databasemigration::Client;
use aws_sdk_databasemigration::types::{ComputeConfig, MigrationTypeValue, ReplicationConfig};
use carina_core::provider::{ProviderError, ProviderResult};
use carina_core::resource::{Resource, ResourceId, State};
use carina_core::waiter::Timeouts;
use log::{debug, info, warn};

use super::{REPLICATION_CONFIG_TIMEOUT, api_error, find_failed, wait_failed};
use crate::DmsProvider;
use crate::attributes::{
    AttributeMap, Attributes, bool_or_false, configured_timeouts, get_block, get_bool, get_i32,
    get_string, get_string_list, has_change, has_changes_except, planned, str_or_empty,
};
use crate::consts::*;
use crate::error::{describe, is_not_found};
use crate::find::{find_replication_by_config_arn, find_replication_config_by_arn};
use crate::schemas::replication_config::schema;
use crate::schemas::replication_task::normalize_task_settings;
use crate::status::{wait_replication_deleted, wait_replication_running, wait_replication_stopped};
use crate::tags::{TAGS, TAGS_ALL, list_tags, set_tags, tags_in, update_tags_from};

const START_FLAG: &str = "start_replication";

fn expand_compute_config(block: &Attributes) -> ComputeConfig {
    ComputeConfig::builder()
        .set_availability_zone(get_string(block, "availability_zone"))
        .set_dns_name_servers(get_string(block, "dns_name_servers"))
        .set_kms_key_id(get_string(block, "kms_key_id"))
        .set_max_capacity_units(get_i32(block, "max_capacity_units"))
        .set_min_capacity_units(get_i32(block, "min_capacity_units"))
        .set_multi_az(get_bool(block, "multi_az"))
        .set_preferred_maintenance_window(get_string(block, "preferred_maintenance_window"))
        .set_replication_subnet_group_id(get_string(block, "replication_subnet_group_id"))
        .set_vpc_security_group_ids(get_string_list(block, "vpc_security_group_ids"))
        .build()
}

fn flatten_compute_config(config: &ComputeConfig) -> AttributeMap {
    let mut map = AttributeMap::new();
    map.set("availability_zone", config.availability_zone())
        .set("dns_name_servers", config.dns_name_servers())
        .set("kms_key_id", config.kms_key_id())
        .set("max_capacity_units", config.max_capacity_units())
        .set("min_capacity_units", config.min_capacity_units())
        .set("multi_az", config.multi_az())
        .set(
            "preferred_maintenance_window",
            config.preferred_maintenance_window(),
        )
        .set(
            "replication_subnet_group_id",
            config.replication_subnet_group_id(),
        )
        .set("vpc_security_group_ids", config.vpc_security_group_ids());
    map
}

fn flatten_replication_config(config: &ReplicationConfig) -> AttributeMap {
    let mut map = AttributeMap::new();
    map.set_block(
        "compute_config",
        config.compute_config().map(flatten_compute_config),
    )
    .set("replication_config_arn", config.replication_config_arn())
    .set(
        "replication_config_identifier",
        config.replication_config_identifier(),
    )
    .set(
        "replication_settings",
        config.replication_settings().and_then(normalize_task_settings),
    )
    .set("replication_type", config.replication_type().map(|t| t.as_str()))
    .set("source_endpoint_arn", config.source_endpoint_arn())
    .set("supplemental_settings", config.supplemental_settings())
    .set("table_mappings", config.table_mappings())
    .set("target_endpoint_arn", config.target_endpoint_arn());
    map
}

/// Start the replication unless it is already running. A replication
/// that has never run starts from scratch; a stopped one resumes.
async fn start_replication(client: &Client, arn: &str, timeout: Duration) -> Result<(), String> {
    let status = match find_replication_by_config_arn(client, arn).await {
        Ok(replication) => replication.status().unwrap_or_default().to_string(),
        Err(e) if e.is_not_found() => String::new(),
        Err(e) => return Err(e.to_string()),
    };
    if status == REPLICATION_STATUS_RUNNING {
        return Ok(());
    }

    let start_type = if status.is_empty() || status == REPLICATION_STATUS_CREATED {
        START_TYPE_START_REPLICATION
    } else {
        START_TYPE_RESUME_PROCESSING
    };
    debug!("starting DMS Replication ({}) with {}", arn, start_type);
    client
        .start_replication()
        .replication_config_arn(arn)
        .start_replication_type(start_type)
        .send()
        .await
        .map_err(|e| format!("starting DMS Replication ({}): {}", arn, describe(&e)))?;

    wait_replication_running(client, arn, timeout)
        .await
        .map_err(|e| format!("waiting for DMS Replication ({}) start: {}", arn, e))?;
    Ok(())
}

async fn stop_replication(client: &Client, arn: &str, timeout: Duration) -> Result<(), String> {
    let replication = match find_replication_by_config_arn(client, arn).await {
        Ok(replication) => replication,
        Err(e) if e.is_not_found() => return Ok(()),
        Err(e) => return Err(e.to_string()),
    };
    if replication.status() != Some(REPLICATION_STATUS_RUNNING) {
        return Ok(());
    }

    debug!("stopping DMS Replication ({})", arn);
    client
        .stop_replication()
        .replication_config_arn(arn)
        .send()
        .await
        .map_err(|e| format!("stopping DMS Replication ({}): {}", arn, describe(&e)))?;

    wait_replication_stopped(client, arn, timeout)
        .await
        .map_err(|e| format!("waiting for DMS Replication ({}) stop: {}", arn, e))?;
    Ok(())
}

impl DmsProvider {
    pub(crate) async fn read_replication_config(
        &self,
        id: &ResourceId,
        arn: &str,
    ) -> ProviderResult<State> {
        let config = match find_replication_config_by_arn(&self.client, arn).await {
            Ok(config) => config,
            Err(e) if e.is_not_found() => {
                warn!("DMS Replication Config ({}) not found", arn);
                return Ok(State::not_found(id.clone()));
            }
            Err(e) => return Err(find_failed("read DMS Replication Config", e, id)),
        };

        let mut map = flatten_replication_config(&config);
        let tags = list_tags(&self.client, arn)
            .await
            .map_err(|e| ProviderError::new(e).for_resource(id.clone()))?;
        set_tags(&mut map, tags, &self.default_tags);

        Ok(State::existing(id.clone(), map.into_inner()).with_identifier(arn))
    }

    pub(crate) async fn create_replication_config(
        &self,
        resource: Resource,
    ) -> ProviderResult<State> {
        let id = &resource.id;
        let timeouts = configured_timeouts(id, &resource.attributes)?;
        let attrs = schema().normalize(&resource.attributes);
        let compute_config = get_block(&attrs, "compute_config").ok_or_else(|| {
            ProviderError::new("compute_config is required").for_resource(id.clone())
        })?;

        let output = self
            .client
            .create_replication_config()
            .replication_config_identifier(str_or_empty(&attrs, "replication_config_identifier"))
            .compute_config(expand_compute_config(compute_config))
            .replication_type(MigrationTypeValue::from(
                str_or_empty(&attrs, "replication_type").as_str(),
            ))
            .source_endpoint_arn(str_or_empty(&attrs, "source_endpoint_arn"))
            .target_endpoint_arn(str_or_empty(&attrs, "target_endpoint_arn"))
            .table_mappings(str_or_empty(&attrs, "table_mappings"))
            .set_replication_settings(get_string(&attrs, "replication_settings"))
            .set_supplemental_settings(get_string(&attrs, "supplemental_settings"))
            .set_resource_identifier(get_string(&attrs, "resource_identifier"))
            .set_tags(tags_in(&attrs, &self.default_tags))
            .send()
            .await
            .map_err(|e| api_error("create DMS Replication Config", &e, id))?;

        let arn = output
            .replication_config()
            .and_then(|c| c.replication_config_arn())
            .map(str::to_string)
            .ok_or_else(|| {
                ProviderError::new("CreateReplicationConfig returned no ARN")
                    .for_resource(id.clone())
            })?;
        info!("created DMS Replication Config {}", arn);

        if bool_or_false(&attrs, START_FLAG) {
            start_replication(
                &self.client,
                &arn,
                timeouts.create_or(REPLICATION_CONFIG_TIMEOUT),
            )
            .await
            .map_err(|e| ProviderError::new(e).for_resource(id.clone()))?;
        }

        self.read_replication_config(id, &arn).await
    }

    pub(crate) async fn update_replication_config(
        &self,
        id: ResourceId,
        arn: &str,
        from: &State,
        to: Resource,
    ) -> ProviderResult<State> {
        let timeout =
            configured_timeouts(&id, &to.attributes)?.update_or(REPLICATION_CONFIG_TIMEOUT);
        let to_attrs = planned(&schema(), &from.attributes, &to.attributes);
        let start = bool_or_false(&to_attrs, START_FLAG);
        let task_error = |e: String| ProviderError::new(e).for_resource(id.clone());

        if has_changes_except(&from.attributes, &to_attrs, &[TAGS, TAGS_ALL, START_FLAG]) {
            stop_replication(&self.client, arn, timeout)
                .await
                .map_err(task_error)?;

            let changed = |key: &str| has_change(&from.attributes, &to_attrs, key);
            let mut request = self
                .client
                .modify_replication_config()
                .replication_config_arn(arn);
            if changed("compute_config")
                && let Some(block) = get_block(&to_attrs, "compute_config")
            {
                request = request.compute_config(expand_compute_config(block));
            }
            if changed("replication_type") {
                request = request.replication_type(MigrationTypeValue::from(
                    str_or_empty(&to_attrs, "replication_type").as_str(),
                ));
            }
            if changed("replication_settings") {
                request = request
                    .set_replication_settings(get_string(&to_attrs, "replication_settings"));
            }
            if changed("supplemental_settings") {
                request = request
                    .set_supplemental_settings(get_string(&to_attrs, "supplemental_settings"));
            }
            if changed("table_mappings") {
                request = request.set_table_mappings(get_string(&to_attrs, "table_mappings"));
            }

            request
                .send()
                .await
                .map_err(|e| api_error("update DMS Replication Config", &e, &id))?;
            info!("modified DMS Replication Config {}", arn);

            if start {
                start_replication(&self.client, arn, timeout)
                    .await
                    .map_err(task_error)?;
            }
        } else if has_change(&from.attributes, &to_attrs, START_FLAG) {
            let toggled = if start {
                start_replication(&self.client, arn, timeout).await
            } else {
                stop_replication(&self.client, arn, timeout).await
            };
            toggled.map_err(task_error)?;
        }

        update_tags_from(
            &self.client,
            arn,
            &from.attributes,
            &to_attrs,
            &self.default_tags,
        )
        .await
        .map_err(task_error)?;

        self.read_replication_config(&id, arn).await
    }

    pub(crate) async fn delete_replication_config(
        &self,
        id: ResourceId,
        arn: &str,
        timeouts: Timeouts,
    ) -> ProviderResult<()> {
        let timeout = timeouts.delete_or(REPLICATION_CONFIG_TIMEOUT);
        stop_replication(&self.client, arn, timeout)
            .await
            .map_err(|e| ProviderError::new(e).for_resource(id.clone()))?;

        match self
            .client
            .delete_replication_config()
            .replication_config_arn(arn)
            .send()
            .await
        {
            Ok(_) => {}
            Err(e) if is_not_found(&e) => return Ok(()),
            Err(e) => return Err(api_error("delete DMS Replication Config", &e, &id)),
        }

        wait_replication_deleted(&self.client, arn, timeout)
            .await
            .map_err(|e| wait_failed("DMS Replication Config delete", e, &id))?;
        info!("deleted DMS Replication Config {}", arn);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use carina_core::resource::Value;

    use super::*;

    fn block(pairs: &[(&str, Value)]) -> Attributes {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn expands_compute_config() {
        let config = expand_compute_config(&block(&[
            ("replication_subnet_group_id", Value::from("dms-subnets")),
            ("max_capacity_units", Value::Int(16)),
            ("min_capacity_units", Value::Int(2)),
            (
                "vpc_security_group_ids",
                Value::List(vec![Value::from("sg-1")]),
            ),
        ]));
        assert_eq!(config.replication_subnet_group_id(), Some("dms-subnets"));
        assert_eq!(config.max_capacity_units(), Some(16));
        assert_eq!(config.min_capacity_units(), Some(2));
        assert_eq!(config.multi_az(), None);
        assert_eq!(config.vpc_security_group_ids(), ["sg-1".to_string()]);
    }

    #[test]
    fn flattens_replication_config() {
        let config = ReplicationConfig::builder()
            .replication_config_arn("arn:aws:dms:us-east-1:123456789012:replication-config:ABC")
            .replication_config_identifier("orders-cdc")
            .replication_type(MigrationTypeValue::Cdc)
            .compute_config(
                ComputeConfig::builder()
                    .replication_subnet_group_id("dms-subnets")
                    .max_capacity_units(8)
                    .build(),
            )
            .build();
        let map = flatten_replication_config(&config).into_inner();
        assert_eq!(map["replication_type"], Value::from("cdc"));
        let compute = map["compute_config"].as_map().unwrap();
        assert_eq!(compute["replication_subnet_group_id"], Value::from("dms-subnets"));
        assert_eq!(compute["max_capacity_units"], Value::Int(8));
        assert!(!map.contains_key("replication_settings"));
    }
}
