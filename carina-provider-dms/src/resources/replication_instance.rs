//! dms_replication_instance

use aws_sdk_databasemigration::Client;
use aws_sdk_databasemigration::operation::modify_replication_instance::builders as modify;
use aws_sdk_databasemigration::types::ReplicationInstance;
use carina_core::provider::{ProviderError, ProviderResult};
use carina_core::resource::{Resource, ResourceId, State};
use carina_core::waiter::Timeouts;
use log::{info, warn};

use super::{
    INSTANCE_CREATE_TIMEOUT, INSTANCE_DELETE_TIMEOUT, INSTANCE_UPDATE_TIMEOUT, api_error,
    find_failed, wait_failed,
};
use crate::DmsProvider;
use crate::attributes::{
    AttributeMap, Attributes, bool_or_false, configured_timeouts, get_bool, get_i32, get_string,
    get_string_list, has_change, has_changes_except, planned, str_or_empty,
};
use crate::error::is_not_found;
use crate::find::find_replication_instance_by_id;
use crate::schemas::replication_instance::schema;
use crate::status::{
    wait_replication_instance_created, wait_replication_instance_deleted,
    wait_replication_instance_updated,
};
use crate::tags::{TAGS, TAGS_ALL, list_tags, set_tags, tags_in, update_tags_from};

/// Request-only flags that never show up in a diff on their own
const MODIFY_OPTIONS: &[&str] = &["allow_major_version_upgrade", "apply_immediately"];

fn flatten_replication_instance(instance: &ReplicationInstance) -> AttributeMap {
    let security_groups: Vec<String> = instance
        .vpc_security_groups()
        .iter()
        .filter_map(|g| g.vpc_security_group_id().map(str::to_string))
        .collect();

    let mut map = AttributeMap::new();
    map.set("allocated_storage", instance.allocated_storage())
        .set("auto_minor_version_upgrade", instance.auto_minor_version_upgrade())
        .set("availability_zone", instance.availability_zone())
        .set("engine_version", instance.engine_version())
        .set("kms_key_arn", instance.kms_key_id())
        .set("multi_az", instance.multi_az())
        .set("network_type", instance.network_type())
        .set(
            "preferred_maintenance_window",
            instance.preferred_maintenance_window(),
        )
        .set("publicly_accessible", instance.publicly_accessible())
        .set("replication_instance_arn", instance.replication_instance_arn())
        .set("replication_instance_class", instance.replication_instance_class())
        .set(
            "replication_instance_id",
            instance.replication_instance_identifier(),
        )
        .set(
            "replication_instance_private_ips",
            instance.replication_instance_private_ip_addresses(),
        )
        .set(
            "replication_instance_public_ips",
            instance.replication_instance_public_ip_addresses(),
        )
        .set(
            "replication_subnet_group_id",
            instance
                .replication_subnet_group()
                .and_then(|g| g.replication_subnet_group_identifier()),
        )
        .set("vpc_security_group_ids", security_groups);
    map
}

pub(crate) fn modify_replication_instance_request(
    client: &Client,
    arn: &str,
    from: &Attributes,
    to: &Attributes,
) -> modify::ModifyReplicationInstanceFluentBuilder {
    let changed = |key: &str| has_change(from, to, key);

    let mut request = client
        .modify_replication_instance()
        .replication_instance_arn(arn)
        .apply_immediately(bool_or_false(to, "apply_immediately"))
        .allow_major_version_upgrade(bool_or_false(to, "allow_major_version_upgrade"));

    if changed("allocated_storage") {
        request = request.set_allocated_storage(get_i32(to, "allocated_storage"));
    }
    if changed("auto_minor_version_upgrade") {
        request =
            request.set_auto_minor_version_upgrade(get_bool(to, "auto_minor_version_upgrade"));
    }
    if changed("engine_version") {
        request = request.set_engine_version(get_string(to, "engine_version"));
    }
    if changed("multi_az") {
        request = request.set_multi_az(get_bool(to, "multi_az"));
    }
    if changed("network_type") {
        request = request.set_network_type(get_string(to, "network_type"));
    }
    if changed("preferred_maintenance_window") {
        request = request
            .set_preferred_maintenance_window(get_string(to, "preferred_maintenance_window"));
    }
    if changed("replication_instance_class") {
        request =
            request.replication_instance_class(str_or_empty(to, "replication_instance_class"));
    }
    if changed("vpc_security_group_ids") {
        request = request.set_vpc_security_group_ids(get_string_list(to, "vpc_security_group_ids"));
    }
    request
}

impl DmsProvider {
    pub(crate) async fn read_replication_instance(
        &self,
        id: &ResourceId,
        instance_id: &str,
    ) -> ProviderResult<State> {
        let instance = match find_replication_instance_by_id(&self.client, instance_id).await {
            Ok(instance) => instance,
            Err(e) if e.is_not_found() => {
                warn!("DMS Replication Instance ({}) not found", instance_id);
                return Ok(State::not_found(id.clone()));
            }
            Err(e) => return Err(find_failed("read DMS Replication Instance", e, id)),
        };

        let mut map = flatten_replication_instance(&instance);
        if let Some(arn) = instance.replication_instance_arn() {
            let tags = list_tags(&self.client, arn)
                .await
                .map_err(|e| ProviderError::new(e).for_resource(id.clone()))?;
            set_tags(&mut map, tags, &self.default_tags);
        }

        Ok(State::existing(id.clone(), map.into_inner()).with_identifier(instance_id))
    }

    pub(crate) async fn create_replication_instance(
        &self,
        resource: Resource,
    ) -> ProviderResult<State> {
        let id = &resource.id;
        let timeouts = configured_timeouts(id, &resource.attributes)?;
        let attrs = schema().normalize(&resource.attributes);
        let instance_id = get_string(&attrs, "replication_instance_id").ok_or_else(|| {
            ProviderError::new("replication_instance_id is required").for_resource(id.clone())
        })?;

        self.client
            .create_replication_instance()
            .replication_instance_identifier(&instance_id)
            .replication_instance_class(str_or_empty(&attrs, "replication_instance_class"))
            .set_allocated_storage(get_i32(&attrs, "allocated_storage"))
            .set_auto_minor_version_upgrade(get_bool(&attrs, "auto_minor_version_upgrade"))
            .set_availability_zone(get_string(&attrs, "availability_zone"))
            .set_engine_version(get_string(&attrs, "engine_version"))
            .set_kms_key_id(get_string(&attrs, "kms_key_arn"))
            .set_multi_az(get_bool(&attrs, "multi_az"))
            .set_network_type(get_string(&attrs, "network_type"))
            .set_preferred_maintenance_window(get_string(&attrs, "preferred_maintenance_window"))
            .set_publicly_accessible(get_bool(&attrs, "publicly_accessible"))
            .set_replication_subnet_group_identifier(get_string(
                &attrs,
                "replication_subnet_group_id",
            ))
            .set_vpc_security_group_ids(get_string_list(&attrs, "vpc_security_group_ids"))
            .set_tags(tags_in(&attrs, &self.default_tags))
            .send()
            .await
            .map_err(|e| api_error("create DMS Replication Instance", &e, id))?;

        wait_replication_instance_created(
            &self.client,
            &instance_id,
            timeouts.create_or(INSTANCE_CREATE_TIMEOUT),
        )
        .await
        .map_err(|e| wait_failed("DMS Replication Instance create", e, id))?;
        info!("created DMS Replication Instance {}", instance_id);

        self.read_replication_instance(id, &instance_id).await
    }

    pub(crate) async fn update_replication_instance(
        &self,
        id: ResourceId,
        instance_id: &str,
        from: &State,
        to: Resource,
    ) -> ProviderResult<State> {
        let timeout = configured_timeouts(&id, &to.attributes)?.update_or(INSTANCE_UPDATE_TIMEOUT);
        let to_attrs = planned(&schema(), &from.attributes, &to.attributes);
        let arn = get_string(&from.attributes, "replication_instance_arn").ok_or_else(|| {
            ProviderError::new("replication_instance_arn missing from state")
                .for_resource(id.clone())
        })?;

        let mut except = vec![TAGS, TAGS_ALL];
        except.extend_from_slice(MODIFY_OPTIONS);
        if has_changes_except(&from.attributes, &to_attrs, &except) {
            modify_replication_instance_request(&self.client, &arn, &from.attributes, &to_attrs)
                .send()
                .await
                .map_err(|e| api_error("update DMS Replication Instance", &e, &id))?;

            if bool_or_false(&to_attrs, "apply_immediately") {
                wait_replication_instance_updated(&self.client, instance_id, timeout)
                    .await
                    .map_err(|e| wait_failed("DMS Replication Instance update", e, &id))?;
                info!("modified DMS Replication Instance {}", instance_id);
            } else {
                info!(
                    "DMS Replication Instance {} changes pending the maintenance window",
                    instance_id
                );
            }
        }

        update_tags_from(
            &self.client,
            &arn,
            &from.attributes,
            &to_attrs,
            &self.default_tags,
        )
        .await
        .map_err(|e| ProviderError::new(e).for_resource(id.clone()))?;

        self.read_replication_instance(&id, instance_id).await
    }

    pub(crate) async fn delete_replication_instance(
        &self,
        id: ResourceId,
        instance_id: &str,
        timeouts: Timeouts,
    ) -> ProviderResult<()> {
        let instance = match find_replication_instance_by_id(&self.client, instance_id).await {
            Ok(instance) => instance,
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(find_failed("read DMS Replication Instance", e, &id)),
        };
        let arn = instance.replication_instance_arn().unwrap_or_default();

        match self
            .client
            .delete_replication_instance()
            .replication_instance_arn(arn)
            .send()
            .await
        {
            Ok(_) => {}
            Err(e) if is_not_found(&e) => return Ok(()),
            Err(e) => return Err(api_error("delete DMS Replication Instance", &e, &id)),
        }

        let timeout = timeouts.delete_or(INSTANCE_DELETE_TIMEOUT);
        wait_replication_instance_deleted(&self.client, instance_id, timeout)
            .await
            .map_err(|e| wait_failed("DMS Replication Instance delete", e, &id))?;
        info!("deleted DMS Replication Instance {}", instance_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use aws_sdk_databasemigration::types::{ReplicationSubnetGroup, VpcSecurityGroupMembership};
    use carina_core::resource::Value;

    use super::*;
    use crate::test_client;

    fn attrs(pairs: &[(&str, Value)]) -> Attributes {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn flattens_instance() {
        let instance = ReplicationInstance::builder()
            .replication_instance_identifier("dms-main")
            .replication_instance_class("dms.t3.micro")
            .allocated_storage(50)
            .multi_az(false)
            .replication_instance_private_ip_addresses("10.0.1.15")
            .vpc_security_groups(
                VpcSecurityGroupMembership::builder()
                    .vpc_security_group_id("sg-0123")
                    .status("active")
                    .build(),
            )
            .replication_subnet_group(
                ReplicationSubnetGroup::builder()
                    .replication_subnet_group_identifier("dms-subnets")
                    .build(),
            )
            .build();
        let map = flatten_replication_instance(&instance).into_inner();
        assert_eq!(map["allocated_storage"], Value::Int(50));
        assert_eq!(map["multi_az"], Value::Bool(false));
        assert_eq!(
            map["replication_instance_private_ips"],
            Value::List(vec![Value::from("10.0.1.15")])
        );
        assert_eq!(
            map["vpc_security_group_ids"],
            Value::List(vec![Value::from("sg-0123")])
        );
        assert_eq!(map["replication_subnet_group_id"], Value::from("dms-subnets"));
    }

    #[test]
    fn modify_carries_changed_fields_and_flags() {
        let client = test_client();
        let from = attrs(&[
            ("replication_instance_class", Value::from("dms.t3.micro")),
            ("allocated_storage", Value::Int(50)),
            ("engine_version", Value::from("3.5.2")),
        ]);
        let to = attrs(&[
            ("replication_instance_class", Value::from("dms.c5.large")),
            ("allocated_storage", Value::Int(50)),
            ("engine_version", Value::from("3.5.3")),
            ("apply_immediately", Value::Bool(true)),
            ("allow_major_version_upgrade", Value::Bool(true)),
        ]);
        let request = modify_replication_instance_request(&client, "arn:ri", &from, &to);
        assert_eq!(
            request.get_replication_instance_class().as_deref(),
            Some("dms.c5.large")
        );
        assert_eq!(request.get_engine_version().as_deref(), Some("3.5.3"));
        assert_eq!(request.get_allocated_storage(), &None);
        assert_eq!(request.get_apply_immediately(), &Some(true));
        assert_eq!(request.get_allow_major_version_upgrade(), &Some(true));
    }
}
