//! dms_endpoint

use aws_sdk_databasemigration::Client;
use aws_sdk_databasemigration::operation::modify_endpoint::builders::ModifyEndpointFluentBuilder;
use aws_sdk_databasemigration::types::{
    DmsSslModeValue, Endpoint, ReplicationEndpointTypeValue, ReplicationTask,
};
use carina_core::provider::{ProviderError, ProviderResult};
use carina_core::resource::{Resource, ResourceId, State};
use carina_core::waiter::{Timeouts, retry_when};
use log::{debug, info, warn};

use super::endpoint_settings::{
    ConnectionInfo, EngineFamily, EngineSettings, apply_engine_settings, expand_engine_settings,
    flatten_connection_info, flatten_elasticsearch_settings, flatten_kafka_settings,
    flatten_kinesis_settings, flatten_mongodb_settings, flatten_postgres_settings,
    flatten_redis_settings, flatten_redshift_settings, flatten_s3_settings,
};
use super::replication_task::{start_task, stop_task};
use super::{
    CONNECTION_TEST_TIMEOUT, ENDPOINT_DELETE_TIMEOUT, ENDPOINT_PROPAGATION_TIMEOUT, TASK_TIMEOUT,
    api_error, find_failed, wait_failed,
};
use crate::DmsProvider;
use crate::attributes::{
    AttributeMap, Attributes, bool_or_false, configured_timeouts, get_i32, get_str, get_string,
    has_change, has_changes, has_changes_except, planned, str_or_empty,
};
use crate::consts::*;
use crate::error::{
    CODE_ACCESS_DENIED, CODE_INVALID_RESOURCE_STATE, describe, is_error_code, is_error_message,
    is_not_found,
};
use crate::find::{find_endpoint_by_id, find_replication_tasks_by_endpoint_arn};
use crate::schemas::endpoint::schema;
use crate::status::{wait_connection_succeeded, wait_endpoint_deleted, wait_replication_task_steady};
use crate::tags::{TAGS, TAGS_ALL, list_tags, set_tags, tags_in, update_tags_from};

pub(crate) fn flatten_endpoint(endpoint: &Endpoint) -> AttributeMap {
    let mut map = AttributeMap::new();
    map.set("certificate_arn", endpoint.certificate_arn())
        .set("endpoint_arn", endpoint.endpoint_arn())
        .set("endpoint_id", endpoint.endpoint_identifier())
        // accepted in lower case, reported in upper case
        .set(
            "endpoint_type",
            endpoint.endpoint_type().map(|t| t.as_str().to_lowercase()),
        )
        .set("engine_name", endpoint.engine_name())
        .set("extra_connection_attributes", endpoint.extra_connection_attributes())
        .set("kms_key_arn", endpoint.kms_key_id())
        .set("ssl_mode", endpoint.ssl_mode().map(|m| m.as_str()));

    flatten_connection_info(&mut map, endpoint);

    match EngineFamily::of(endpoint.engine_name().unwrap_or_default()) {
        EngineFamily::DynamoDb => {
            map.set(
                "service_access_role",
                endpoint
                    .dynamo_db_settings()
                    .map(|s| s.service_access_role_arn()),
            );
        }
        EngineFamily::Elasticsearch => {
            map.set_block(
                "elasticsearch_settings",
                flatten_elasticsearch_settings(endpoint.elasticsearch_settings()),
            );
        }
        EngineFamily::Kafka => {
            map.set_block("kafka_settings", flatten_kafka_settings(endpoint.kafka_settings()));
        }
        EngineFamily::Kinesis => {
            map.set_block(
                "kinesis_settings",
                flatten_kinesis_settings(endpoint.kinesis_settings()),
            );
        }
        EngineFamily::MongoDb => {
            map.set_block(
                "mongodb_settings",
                flatten_mongodb_settings(endpoint.mongo_db_settings()),
            );
        }
        EngineFamily::PostgreSql => {
            map.set_block(
                "postgres_settings",
                flatten_postgres_settings(endpoint.postgre_sql_settings()),
            );
        }
        EngineFamily::Redis => {
            map.set_block("redis_settings", flatten_redis_settings(endpoint.redis_settings()));
        }
        EngineFamily::Redshift => {
            map.set_block(
                "redshift_settings",
                flatten_redshift_settings(endpoint.redshift_settings()),
            );
        }
        EngineFamily::S3 => {
            map.set_block("s3_settings", flatten_s3_settings(endpoint.s3_settings()));
        }
        _ => {}
    }

    map
}

/// Whether the plain connection fields are also sent at the top level of
/// the request
fn mirrors_top_level(family: EngineFamily, conn: &ConnectionInfo) -> bool {
    family == EngineFamily::Other
        || (family.has_connection_settings() && !conn.uses_secrets_manager())
}

/// ModifyEndpoint request carrying only what changed between `from` and `to`
pub(crate) fn modify_endpoint_request(
    client: &Client,
    arn: &str,
    from: &Attributes,
    to: &Attributes,
) -> Result<ModifyEndpointFluentBuilder, String> {
    let changed = |key: &str| has_change(from, to, key);
    let engine_name = str_or_empty(to, "engine_name");
    let family = EngineFamily::of(&engine_name);

    let mut request = client.modify_endpoint().endpoint_arn(arn);
    if changed("certificate_arn") {
        request = request.certificate_arn(str_or_empty(to, "certificate_arn"));
    }
    if changed("endpoint_type") {
        request = request.endpoint_type(ReplicationEndpointTypeValue::from(
            str_or_empty(to, "endpoint_type").as_str(),
        ));
    }
    if changed("engine_name") {
        request = request.engine_name(&engine_name);
    }
    if changed("extra_connection_attributes") {
        request = request
            .extra_connection_attributes(str_or_empty(to, "extra_connection_attributes"));
    }
    if changed("ssl_mode") {
        request = request.set_ssl_mode(get_str(to, "ssl_mode").map(DmsSslModeValue::from));
    }

    if family == EngineFamily::Other {
        if changed("database_name") {
            request = request.database_name(str_or_empty(to, "database_name"));
        }
        if changed("password") {
            request = request.password(str_or_empty(to, "password"));
        }
        if changed("port") {
            request = request.set_port(get_i32(to, "port"));
        }
        if changed("server_name") {
            request = request.server_name(str_or_empty(to, "server_name"));
        }
        if changed("username") {
            request = request.username(str_or_empty(to, "username"));
        }
        return Ok(request);
    }

    if !has_changes(from, to, &family.settings_fields()) {
        return Ok(request);
    }

    // The settings structure is only accepted together with the engine name
    if let Some(settings) = expand_engine_settings(to)? {
        request = apply_engine_settings!(request, settings);
    }
    request = request.engine_name(&engine_name);

    let conn = ConnectionInfo::from_attributes(to);
    if family.has_connection_settings() && mirrors_top_level(family, &conn) {
        request = request
            .set_username(conn.username)
            .set_password(conn.password)
            .set_server_name(conn.server_name)
            .set_port(conn.port)
            .set_database_name(conn.database_name);
    }

    Ok(request)
}

impl DmsProvider {
    pub(crate) async fn read_endpoint(
        &self,
        id: &ResourceId,
        endpoint_id: &str,
    ) -> ProviderResult<State> {
        let endpoint = match find_endpoint_by_id(&self.client, endpoint_id).await {
            Ok(endpoint) => endpoint,
            Err(e) if e.is_not_found() => {
                warn!("DMS Endpoint ({}) not found", endpoint_id);
                return Ok(State::not_found(id.clone()));
            }
            Err(e) => return Err(find_failed("read DMS Endpoint", e, id)),
        };

        let mut map = flatten_endpoint(&endpoint);
        if let Some(arn) = endpoint.endpoint_arn() {
            let tags = list_tags(&self.client, arn)
                .await
                .map_err(|e| ProviderError::new(e).for_resource(id.clone()))?;
            set_tags(&mut map, tags, &self.default_tags);
        }

        Ok(State::existing(id.clone(), map.into_inner()).with_identifier(endpoint_id))
    }

    pub(crate) async fn create_endpoint(&self, resource: Resource) -> ProviderResult<State> {
        let id = &resource.id;
        let timeouts = configured_timeouts(id, &resource.attributes)?;
        let attrs = schema().normalize(&resource.attributes);
        let endpoint_id = get_string(&attrs, "endpoint_id").ok_or_else(|| {
            ProviderError::new("endpoint_id is required").for_resource(id.clone())
        })?;
        let engine_name = str_or_empty(&attrs, "engine_name");
        let family = EngineFamily::of(&engine_name);
        let conn = ConnectionInfo::from_attributes(&attrs);

        let settings = expand_engine_settings(&attrs)
            .map_err(|e| ProviderError::new(e).for_resource(id.clone()))?;

        let mut request = self
            .client
            .create_endpoint()
            .endpoint_identifier(&endpoint_id)
            .endpoint_type(ReplicationEndpointTypeValue::from(
                str_or_empty(&attrs, "endpoint_type").as_str(),
            ))
            .engine_name(&engine_name)
            .set_certificate_arn(get_string(&attrs, "certificate_arn"))
            .set_extra_connection_attributes(get_string(&attrs, "extra_connection_attributes"))
            .set_kms_key_id(get_string(&attrs, "kms_key_arn"))
            .set_ssl_mode(get_str(&attrs, "ssl_mode").map(DmsSslModeValue::from))
            .set_tags(tags_in(&attrs, &self.default_tags));

        if mirrors_top_level(family, &conn) {
            request = request
                .set_username(conn.username.clone())
                .set_password(conn.password.clone())
                .set_server_name(conn.server_name.clone())
                .set_port(conn.port)
                .set_database_name(conn.database_name.clone());
        }
        if let Some(settings) = settings {
            request = apply_engine_settings!(request, settings);
        }

        // The service role may not have propagated yet
        retry_when(
            timeouts.create_or(ENDPOINT_PROPAGATION_TIMEOUT),
            || request.clone().send(),
            |e| is_error_code(e, CODE_ACCESS_DENIED),
        )
        .await
        .map_err(|e| api_error("create DMS Endpoint", &e, id))?;

        info!("created DMS Endpoint {} ({})", endpoint_id, engine_name);
        self.read_endpoint(id, &endpoint_id).await
    }

    pub(crate) async fn update_endpoint(
        &self,
        id: ResourceId,
        endpoint_id: &str,
        from: &State,
        to: Resource,
    ) -> ProviderResult<State> {
        let to_attrs = planned(&schema(), &from.attributes, &to.attributes);
        let arn = get_string(&from.attributes, "endpoint_arn").ok_or_else(|| {
            ProviderError::new("endpoint_arn missing from state").for_resource(id.clone())
        })?;

        if has_changes_except(&from.attributes, &to_attrs, &[TAGS, TAGS_ALL]) {
            let pause = bool_or_false(&to_attrs, "pause_replication_tasks");
            let mut stopped = Vec::new();
            if pause {
                stopped = self
                    .stop_endpoint_replication_tasks(&arn)
                    .await
                    .map_err(|e| {
                        ProviderError::new(format!(
                            "Failed to stop replication tasks before updating DMS Endpoint: {}",
                            e
                        ))
                        .for_resource(id.clone())
                    })?;
            }

            if has_changes_except(
                &from.attributes,
                &to_attrs,
                &[TAGS, TAGS_ALL, "pause_replication_tasks"],
            ) {
                let request =
                    modify_endpoint_request(&self.client, &arn, &from.attributes, &to_attrs)
                        .map_err(|e| ProviderError::new(e).for_resource(id.clone()))?;
                request
                    .send()
                    .await
                    .map_err(|e| api_error("update DMS Endpoint", &e, &id))?;
                info!("modified DMS Endpoint {}", endpoint_id);
            }

            if pause && !stopped.is_empty() {
                self.start_endpoint_replication_tasks(&arn, &stopped)
                    .await
                    .map_err(|e| {
                        ProviderError::new(format!(
                            "Failed to start replication tasks after updating DMS Endpoint: {}",
                            e
                        ))
                        .for_resource(id.clone())
                    })?;
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

        self.read_endpoint(&id, endpoint_id).await
    }

    pub(crate) async fn delete_endpoint(
        &self,
        id: ResourceId,
        endpoint_id: &str,
        timeouts: Timeouts,
    ) -> ProviderResult<()> {
        let arn = match find_endpoint_by_id(&self.client, endpoint_id).await {
            Ok(endpoint) => endpoint.endpoint_arn().unwrap_or_default().to_string(),
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(find_failed("read DMS Endpoint", e, &id)),
        };

        debug!("deleting DMS Endpoint {}", endpoint_id);
        match self.client.delete_endpoint().endpoint_arn(&arn).send().await {
            Ok(_) => {}
            Err(e) if is_not_found(&e) => return Ok(()),
            Err(e) => return Err(api_error("delete DMS Endpoint", &e, &id)),
        }

        let timeout = timeouts.delete_or(ENDPOINT_DELETE_TIMEOUT);
        wait_endpoint_deleted(&self.client, endpoint_id, timeout)
            .await
            .map_err(|e| wait_failed("DMS Endpoint delete", e, &id))
    }

    /// Waits for every task using the endpoint to leave its transitional
    /// state
    async fn steady_endpoint_replication_tasks(&self, arn: &str) -> Result<(), String> {
        let tasks = find_replication_tasks_by_endpoint_arn(&self.client, arn)
            .await
            .map_err(|e| e.to_string())?;
        for task in tasks {
            let task_id = task.replication_task_identifier().unwrap_or_default();
            match task.status().unwrap_or_default() {
                TASK_STATUS_CREATING | TASK_STATUS_DELETING | TASK_STATUS_MODIFYING
                | TASK_STATUS_STOPPING | TASK_STATUS_STARTING => {
                    debug!("waiting for DMS Replication Task {} to settle", task_id);
                    wait_replication_task_steady(&self.client, task_id, TASK_TIMEOUT)
                        .await
                        .map_err(|e| e.to_string())?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Stops the running tasks that use the endpoint and returns them
    async fn stop_endpoint_replication_tasks(
        &self,
        arn: &str,
    ) -> Result<Vec<ReplicationTask>, String> {
        self.steady_endpoint_replication_tasks(arn).await?;

        let tasks = find_replication_tasks_by_endpoint_arn(&self.client, arn)
            .await
            .map_err(|e| e.to_string())?;
        let mut stopped = Vec::new();
        for task in tasks {
            if task.status() != Some(TASK_STATUS_RUNNING) {
                continue;
            }
            let task_id = task.replication_task_identifier().unwrap_or_default();
            stop_task(&self.client, task_id, TASK_TIMEOUT).await?;
            info!("stopped DMS Replication Task {} for endpoint update", task_id);
            stopped.push(task);
        }
        Ok(stopped)
    }

    async fn start_endpoint_replication_tasks(
        &self,
        arn: &str,
        tasks: &[ReplicationTask],
    ) -> Result<(), String> {
        self.steady_endpoint_replication_tasks(arn).await?;

        for task in tasks {
            let instance_arn = task.replication_instance_arn().unwrap_or_default();
            let task_id = task.replication_task_identifier().unwrap_or_default();

            match self
                .client
                .test_connection()
                .endpoint_arn(arn)
                .replication_instance_arn(instance_arn)
                .send()
                .await
            {
                Ok(_) => {}
                Err(e)
                    if is_error_message(&e, CODE_INVALID_RESOURCE_STATE, "already being tested") =>
                {
                    continue;
                }
                Err(e) => return Err(format!("testing connection: {}", describe(&e))),
            }

            wait_connection_succeeded(&self.client, arn, instance_arn, CONNECTION_TEST_TIMEOUT)
                .await
                .map_err(|e| format!("waiting until test connection succeeds: {}", e))?;

            start_task(&self.client, task_id, TASK_TIMEOUT)
                .await
                .map_err(|e| format!("starting replication task: {}", e))?;
            info!("restarted DMS Replication Task {}", task_id);
        }
        Ok(())
    }
}
