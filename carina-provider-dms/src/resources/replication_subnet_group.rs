//! dms_replication_subnet_group

use aws_sdk_databasemigration::types::ReplicationSubnetGroup;
use carina_core::provider::{ProviderError, ProviderResult};
use carina_core::resource::{Resource, ResourceId, State};
use carina_core::waiter::{Timeouts, retry_when};
use log::{info, warn};

use super::{SUBNET_GROUP_TIMEOUT, api_error, find_failed};
use crate::DmsProvider;
use crate::attributes::{
    AttributeMap, configured_timeouts, get_string, get_string_list, has_changes, planned,
    str_or_empty,
};
use crate::error::{
    CODE_ACCESS_DENIED, CODE_INVALID_RESOURCE_STATE, is_error_code, is_not_found,
};
use crate::find::find_replication_subnet_group_by_id;
use crate::schemas::replication_subnet_group::schema;
use crate::tags::{list_tags, set_tags, tags_in, update_tags_from};

fn flatten_replication_subnet_group(group: &ReplicationSubnetGroup) -> AttributeMap {
    let subnet_ids: Vec<String> = group
        .subnets()
        .iter()
        .filter_map(|s| s.subnet_identifier().map(str::to_string))
        .collect();

    let mut map = AttributeMap::new();
    map.set(
        "replication_subnet_group_description",
        group.replication_subnet_group_description(),
    )
    .set(
        "replication_subnet_group_id",
        group.replication_subnet_group_identifier(),
    )
    .set("subnet_ids", subnet_ids)
    .set("vpc_id", group.vpc_id());
    map
}

impl DmsProvider {
    /// Subnet groups are addressed by name; the ARN is derived
    fn subnet_group_arn(&self, group_id: &str) -> String {
        format!(
            "arn:{}:dms:{}:{}:subgrp:{}",
            self.partition, self.region, self.account_id, group_id
        )
    }

    pub(crate) async fn read_replication_subnet_group(
        &self,
        id: &ResourceId,
        group_id: &str,
    ) -> ProviderResult<State> {
        let group = match find_replication_subnet_group_by_id(&self.client, group_id).await {
            Ok(group) => group,
            Err(e) if e.is_not_found() => {
                warn!("DMS Replication Subnet Group ({}) not found", group_id);
                return Ok(State::not_found(id.clone()));
            }
            Err(e) => return Err(find_failed("read DMS Replication Subnet Group", e, id)),
        };

        let arn = self.subnet_group_arn(group_id);
        let mut map = flatten_replication_subnet_group(&group);
        map.set("replication_subnet_group_arn", arn.as_str());

        let tags = list_tags(&self.client, &arn)
            .await
            .map_err(|e| ProviderError::new(e).for_resource(id.clone()))?;
        set_tags(&mut map, tags, &self.default_tags);

        Ok(State::existing(id.clone(), map.into_inner()).with_identifier(group_id))
    }

    pub(crate) async fn create_replication_subnet_group(
        &self,
        resource: Resource,
    ) -> ProviderResult<State> {
        let id = &resource.id;
        let timeouts = configured_timeouts(id, &resource.attributes)?;
        let attrs = schema().normalize(&resource.attributes);
        let group_id = get_string(&attrs, "replication_subnet_group_id").ok_or_else(|| {
            ProviderError::new("replication_subnet_group_id is required").for_resource(id.clone())
        })?;

        let request = self
            .client
            .create_replication_subnet_group()
            .replication_subnet_group_identifier(&group_id)
            .replication_subnet_group_description(str_or_empty(
                &attrs,
                "replication_subnet_group_description",
            ))
            .set_subnet_ids(get_string_list(&attrs, "subnet_ids"))
            .set_tags(tags_in(&attrs, &self.default_tags));

        // dms-vpc-role can take a while to become usable after it is created
        retry_when(
            timeouts.create_or(SUBNET_GROUP_TIMEOUT),
            || request.clone().send(),
            |e| is_error_code(e, CODE_ACCESS_DENIED),
        )
        .await
        .map_err(|e| api_error("create DMS Replication Subnet Group", &e, id))?;

        info!("created DMS Replication Subnet Group {}", group_id);
        self.read_replication_subnet_group(id, &group_id).await
    }

    pub(crate) async fn update_replication_subnet_group(
        &self,
        id: ResourceId,
        group_id: &str,
        from: &State,
        to: Resource,
    ) -> ProviderResult<State> {
        let to_attrs = planned(&schema(), &from.attributes, &to.attributes);

        if has_changes(
            &from.attributes,
            &to_attrs,
            &["replication_subnet_group_description", "subnet_ids"],
        ) {
            // Both fields are sent every time; the API replaces the subnet list wholesale
            self.client
                .modify_replication_subnet_group()
                .replication_subnet_group_identifier(group_id)
                .replication_subnet_group_description(str_or_empty(
                    &to_attrs,
                    "replication_subnet_group_description",
                ))
                .set_subnet_ids(get_string_list(&to_attrs, "subnet_ids"))
                .send()
                .await
                .map_err(|e| api_error("update DMS Replication Subnet Group", &e, &id))?;
            info!("modified DMS Replication Subnet Group {}", group_id);
        }

        update_tags_from(
            &self.client,
            &self.subnet_group_arn(group_id),
            &from.attributes,
            &to_attrs,
            &self.default_tags,
        )
        .await
        .map_err(|e| ProviderError::new(e).for_resource(id.clone()))?;

        self.read_replication_subnet_group(&id, group_id).await
    }

    pub(crate) async fn delete_replication_subnet_group(
        &self,
        id: ResourceId,
        group_id: &str,
        timeouts: Timeouts,
    ) -> ProviderResult<()> {
        let request = self
            .client
            .delete_replication_subnet_group()
            .replication_subnet_group_identifier(group_id);

        // Still in use while a replication instance in it is being deleted
        match retry_when(
            timeouts.delete_or(SUBNET_GROUP_TIMEOUT),
            || request.clone().send(),
            |e| is_error_code(e, CODE_INVALID_RESOURCE_STATE),
        )
        .await
        {
            Ok(_) => {
                info!("deleted DMS Replication Subnet Group {}", group_id);
                Ok(())
            }
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(api_error("delete DMS Replication Subnet Group", &e, &id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use aws_sdk_databasemigration::types::Subnet;
    use carina_core::resource::Value;

    use super::*;
    use crate::test_provider;

    #[test]
    fn flattens_subnet_ids() {
        let group = ReplicationSubnetGroup::builder()
            .replication_subnet_group_identifier("dms-subnets")
            .replication_subnet_group_description("private subnets")
            .vpc_id("vpc-0abc")
            .subnets(Subnet::builder().subnet_identifier("subnet-a").build())
            .subnets(Subnet::builder().subnet_identifier("subnet-b").build())
            .build();
        let map = flatten_replication_subnet_group(&group).into_inner();
        assert_eq!(
            map["subnet_ids"],
            Value::List(vec![Value::from("subnet-a"), Value::from("subnet-b")])
        );
        assert_eq!(map["vpc_id"], Value::from("vpc-0abc"));
    }

    #[test]
    fn arn_uses_provider_partition() {
        let provider = test_provider();
        assert_eq!(
            provider.subnet_group_arn("dms-subnets"),
            "arn:aws:dms:us-east-1:123456789012:subgrp:dms-subnets"
        );
    }
}
