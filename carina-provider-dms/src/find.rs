//! Find-by-id lookups
//!
//! Each finder issues the paginated `Describe*` call with a single filter and
//! expects exactly one match.

use aws_sdk_databasemigration::Client;
use aws_sdk_databasemigration::types::{
    Certificate, Connection, Endpoint, Filter, Replication, ReplicationConfig, ReplicationInstance,
    ReplicationSubnetGroup, ReplicationTask,
};

use crate::consts::*;
use crate::error::{FindError, find_error};

pub fn filter(name: &str, values: &[&str]) -> Result<Filter, FindError> {
    Filter::builder()
        .name(name)
        .set_values(Some(values.iter().map(|v| v.to_string()).collect()))
        .build()
        .map_err(|e| FindError::Api(format!("building filter {}: {}", name, e)))
}

fn single<T>(mut found: Vec<T>, kind: &str, id: &str) -> Result<T, FindError> {
    match found.len() {
        0 => Err(FindError::NotFound(format!("{} ({})", kind, id))),
        1 => Ok(found.remove(0)),
        count => Err(FindError::TooManyResults {
            kind: kind.to_string(),
            count,
        }),
    }
}

pub async fn find_certificate_by_id(client: &Client, id: &str) -> Result<Certificate, FindError> {
    const KIND: &str = "DMS Certificate";
    let mut pages = client
        .describe_certificates()
        .filters(filter(FILTER_CERTIFICATE_ID, &[id])?)
        .into_paginator()
        .send();
    let mut found = Vec::new();
    while let Some(page) = pages.next().await {
        let page = page.map_err(|e| find_error(&e, &format!("{} ({})", KIND, id)))?;
        found.extend(page.certificates.unwrap_or_default());
    }
    single(found, KIND, id)
}

pub async fn find_endpoint_by_id(client: &Client, id: &str) -> Result<Endpoint, FindError> {
    const KIND: &str = "DMS Endpoint";
    let mut pages = client
        .describe_endpoints()
        .filters(filter(FILTER_ENDPOINT_ID, &[id])?)
        .into_paginator()
        .send();
    let mut found = Vec::new();
    while let Some(page) = pages.next().await {
        let page = page.map_err(|e| find_error(&e, &format!("{} ({})", KIND, id)))?;
        found.extend(page.endpoints.unwrap_or_default());
    }
    single(found, KIND, id)
}

pub async fn find_replication_instance_by_id(
    client: &Client,
    id: &str,
) -> Result<ReplicationInstance, FindError> {
    const KIND: &str = "DMS Replication Instance";
    let mut pages = client
        .describe_replication_instances()
        .filters(filter(FILTER_REPLICATION_INSTANCE_ID, &[id])?)
        .into_paginator()
        .send();
    let mut found = Vec::new();
    while let Some(page) = pages.next().await {
        let page = page.map_err(|e| find_error(&e, &format!("{} ({})", KIND, id)))?;
        found.extend(page.replication_instances.unwrap_or_default());
    }
    single(found, KIND, id)
}

pub async fn find_replication_subnet_group_by_id(
    client: &Client,
    id: &str,
) -> Result<ReplicationSubnetGroup, FindError> {
    const KIND: &str = "DMS Replication Subnet Group";
    let mut pages = client
        .describe_replication_subnet_groups()
        .filters(filter(FILTER_REPLICATION_SUBNET_GROUP_ID, &[id])?)
        .into_paginator()
        .send();
    let mut found = Vec::new();
    while let Some(page) = pages.next().await {
        let page = page.map_err(|e| find_error(&e, &format!("{} ({})", KIND, id)))?;
        found.extend(page.replication_subnet_groups.unwrap_or_default());
    }
    single(found, KIND, id)
}

async fn find_replication_tasks(
    client: &Client,
    filter: Filter,
    what: &str,
) -> Result<Vec<ReplicationTask>, FindError> {
    let mut pages = client
        .describe_replication_tasks()
        .filters(filter)
        .without_settings(false)
        .into_paginator()
        .send();
    let mut found = Vec::new();
    while let Some(page) = pages.next().await {
        let page = page.map_err(|e| find_error(&e, what))?;
        found.extend(page.replication_tasks.unwrap_or_default());
    }
    Ok(found)
}

pub async fn find_replication_task_by_id(
    client: &Client,
    id: &str,
) -> Result<ReplicationTask, FindError> {
    const KIND: &str = "DMS Replication Task";
    let what = format!("{} ({})", KIND, id);
    let found =
        find_replication_tasks(client, filter(FILTER_REPLICATION_TASK_ID, &[id])?, &what).await?;
    single(found, KIND, id)
}

/// Every task using the endpoint as its source or target. An unknown
/// endpoint yields an empty list.
pub async fn find_replication_tasks_by_endpoint_arn(
    client: &Client,
    arn: &str,
) -> Result<Vec<ReplicationTask>, FindError> {
    let what = format!("DMS Replication Tasks for endpoint ({})", arn);
    match find_replication_tasks(client, filter(FILTER_ENDPOINT_ARN, &[arn])?, &what).await {
        Err(e) if e.is_not_found() => Ok(Vec::new()),
        result => result,
    }
}

pub async fn find_replication_config_by_arn(
    client: &Client,
    arn: &str,
) -> Result<ReplicationConfig, FindError> {
    const KIND: &str = "DMS Replication Config";
    let mut pages = client
        .describe_replication_configs()
        .filters(filter(FILTER_REPLICATION_CONFIG_ARN, &[arn])?)
        .into_paginator()
        .send();
    let mut found = Vec::new();
    while let Some(page) = pages.next().await {
        let page = page.map_err(|e| find_error(&e, &format!("{} ({})", KIND, arn)))?;
        found.extend(page.replication_configs.unwrap_or_default());
    }
    single(found, KIND, arn)
}

/// The replication run belonging to a serverless replication config
pub async fn find_replication_by_config_arn(
    client: &Client,
    arn: &str,
) -> Result<Replication, FindError> {
    const KIND: &str = "DMS Replication";
    let mut pages = client
        .describe_replications()
        .filters(filter(FILTER_REPLICATION_CONFIG_ARN, &[arn])?)
        .into_paginator()
        .send();
    let mut found = Vec::new();
    while let Some(page) = pages.next().await {
        let page = page.map_err(|e| find_error(&e, &format!("{} ({})", KIND, arn)))?;
        found.extend(page.replications.unwrap_or_default());
    }
    single(found, KIND, arn)
}

/// Connection test result between an endpoint and a replication instance
pub async fn find_connection(
    client: &Client,
    endpoint_arn: &str,
    instance_arn: &str,
) -> Result<Connection, FindError> {
    const KIND: &str = "DMS Connection";
    let id = format!("{}, {}", endpoint_arn, instance_arn);
    let mut pages = client
        .describe_connections()
        .filters(filter(FILTER_ENDPOINT_ARN, &[endpoint_arn])?)
        .filters(filter(FILTER_REPLICATION_INSTANCE_ARN, &[instance_arn])?)
        .into_paginator()
        .send();
    let mut found = Vec::new();
    while let Some(page) = pages.next().await {
        let page = page.map_err(|e| find_error(&e, &format!("{} ({})", KIND, id)))?;
        found.extend(page.connections.unwrap_or_default());
    }
    single(found, KIND, &id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_result_assertion() {
        assert_eq!(single(vec![1], "DMS Endpoint", "src").unwrap(), 1);

        let err = single(Vec::<i32>::new(), "DMS Endpoint", "src").unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "DMS Endpoint (src) not found");

        let err = single(vec![1, 2], "DMS Endpoint", "src").unwrap_err();
        assert_eq!(err.to_string(), "expected 1 DMS Endpoint, found 2");
    }

    #[test]
    fn builds_filters() {
        let f = filter(FILTER_ENDPOINT_ID, &["src"]).unwrap();
        assert_eq!(f.name(), FILTER_ENDPOINT_ID);
        assert_eq!(f.values(), ["src".to_string()]);
    }
}
