//! dms_replication_task

use std::time::Duration;

use aws_sdk_databasemigration::Client;
use aws_sdk_databasemigration::operation::modify_replication_task::builders as modify;
use aws_sdk_databasemigration::types::{
    MigrationTypeValue, ReplicationTask, StartReplicationTaskTypeValue,
};
use carina_core::provider::{ProviderError, ProviderResult};
use carina_core::resource::{Resource, ResourceId, State};
use carina_core::waiter::Timeouts;
use log::{debug, info, warn};

use super::{TASK_TIMEOUT, api_error, find_failed, wait_failed};
use crate::DmsProvider;
use crate::attributes::{
    AttributeMap, Attributes, bool_or_false, configured_timeouts, get_str, get_string, has_change,
    has_changes, has_changes_except, planned, str_or_empty,
};
use crate::consts::*;
use crate::error::{CODE_INVALID_RESOURCE_STATE, describe, is_error_message, is_not_found};
use crate::find::find_replication_task_by_id;
use crate::schemas::replication_task::{normalize_task_settings, schema};
use crate::status::{
    wait_replication_task_deleted, wait_replication_task_modified, wait_replication_task_moved,
    wait_replication_task_ready, wait_replication_task_running, wait_replication_task_stopped,
};
use crate::tags::{TAGS, TAGS_ALL, list_tags, set_tags, tags_in, update_tags_from};
use crate::validation::parse_cdc_start_time;

const START_FLAG: &str = "start_replication_task";

/// Fields applied with ModifyReplicationTask
const MODIFIABLE: &[&str] = &[
    "cdc_start_position",
    "cdc_start_time",
    "migration_type",
    "replication_task_settings",
    "table_mappings",
];

fn flatten_replication_task(task: &ReplicationTask) -> AttributeMap {
    let mut map = AttributeMap::new();
    map.set("cdc_start_position", task.cdc_start_position())
        .set("migration_type", task.migration_type().map(|m| m.as_str()))
        .set("replication_instance_arn", task.replication_instance_arn())
        .set("replication_task_arn", task.replication_task_arn())
        .set("replication_task_id", task.replication_task_identifier())
        .set(
            "replication_task_settings",
            task.replication_task_settings()
                .and_then(normalize_task_settings),
        )
        .set("source_endpoint_arn", task.source_endpoint_arn())
        .set("status", task.status())
        .set("table_mappings", task.table_mappings())
        .set("target_endpoint_arn", task.target_endpoint_arn());
    map
}

/// Whether an update touches more than tags and the start flag, in which
/// case the task is stopped first
fn requires_stop(from: &Attributes, to: &Attributes) -> bool {
    has_changes_except(from, to, &[TAGS, TAGS_ALL, START_FLAG])
}

/// ModifyReplicationTask request carrying only what changed between `from`
/// and `to`, plus the migration type the API always expects. `None` when no
/// modifiable field changed.
pub(crate) fn modify_replication_task_request(
    client: &Client,
    arn: &str,
    from: &Attributes,
    to: &Attributes,
) -> Result<Option<modify::ModifyReplicationTaskFluentBuilder>, String> {
    if !has_changes(from, to, MODIFIABLE) {
        return Ok(None);
    }
    let changed = |key: &str| has_change(from, to, key);

    let mut request = client
        .modify_replication_task()
        .replication_task_arn(arn)
        .migration_type(MigrationTypeValue::from(
            str_or_empty(to, "migration_type").as_str(),
        ));
    if changed("table_mappings") {
        request = request.table_mappings(str_or_empty(to, "table_mappings"));
    }
    if changed("replication_task_settings") {
        request =
            request.set_replication_task_settings(get_string(to, "replication_task_settings"));
    }
    if changed("cdc_start_position") {
        request = request.set_cdc_start_position(get_string(to, "cdc_start_position"));
    }
    if changed("cdc_start_time") {
        let time = get_str(to, "cdc_start_time")
            .map(parse_cdc_start_time)
            .transpose()?;
        request = request.set_cdc_start_time(time);
    }
    Ok(Some(request))
}

/// Start a task unless it is already running. A task that has never run
/// starts from scratch; any other resumes.
pub(crate) async fn start_task(
    client: &Client,
    task_id: &str,
    timeout: Duration,
) -> Result<(), String> {
    let task = find_replication_task_by_id(client, task_id)
        .await
        .map_err(|e| e.to_string())?;
    let status = task.status().unwrap_or_default();
    if status == TASK_STATUS_RUNNING {
        return Ok(());
    }

    let start_type = if status == TASK_STATUS_READY {
        START_TYPE_START_REPLICATION
    } else {
        START_TYPE_RESUME_PROCESSING
    };
    debug!("starting DMS Replication Task {} ({})", task_id, start_type);
    client
        .start_replication_task()
        .replication_task_arn(task.replication_task_arn().unwrap_or_default())
        .start_replication_task_type(StartReplicationTaskTypeValue::from(start_type))
        .send()
        .await
        .map_err(|e| describe(&e))?;

    wait_replication_task_running(client, task_id, timeout)
        .await
        .map_err(|e| e.to_string())?;
    Ok(())
}

/// Stop a running task; anything else is left alone
pub(crate) async fn stop_task(
    client: &Client,
    task_id: &str,
    timeout: Duration,
) -> Result<(), String> {
    let task = match find_replication_task_by_id(client, task_id).await {
        Ok(task) => task,
        Err(e) if e.is_not_found() => return Ok(()),
        Err(e) => return Err(e.to_string()),
    };
    if task.status() != Some(TASK_STATUS_RUNNING) {
        return Ok(());
    }

    debug!("stopping DMS Replication Task {}", task_id);
    match client
        .stop_replication_task()
        .replication_task_arn(task.replication_task_arn().unwrap_or_default())
        .send()
        .await
    {
        Ok(_) => {}
        Err(e) if is_error_message(&e, CODE_INVALID_RESOURCE_STATE, "is currently not running") => {
            return Ok(());
        }
        Err(e) => return Err(describe(&e)),
    }

    wait_replication_task_stopped(client, task_id, timeout)
        .await
        .map_err(|e| e.to_string())?;
    Ok(())
}

fn cdc_start_time(
    attrs: &Attributes,
    id: &ResourceId,
) -> ProviderResult<Option<aws_sdk_databasemigration::primitives::DateTime>> {
    get_str(attrs, "cdc_start_time")
        .map(parse_cdc_start_time)
        .transpose()
        .map_err(|e| ProviderError::new(e).for_resource(id.clone()))
}

impl DmsProvider {
    pub(crate) async fn read_replication_task(
        &self,
        id: &ResourceId,
        task_id: &str,
    ) -> ProviderResult<State> {
        let task = match find_replication_task_by_id(&self.client, task_id).await {
            Ok(task) => task,
            Err(e) if e.is_not_found() => {
                warn!("DMS Replication Task ({}) not found", task_id);
                return Ok(State::not_found(id.clone()));
            }
            Err(e) => return Err(find_failed("read DMS Replication Task", e, id)),
        };

        let mut map = flatten_replication_task(&task);
        if let Some(arn) = task.replication_task_arn() {
            let tags = list_tags(&self.client, arn)
                .await
                .map_err(|e| ProviderError::new(e).for_resource(id.clone()))?;
            set_tags(&mut map, tags, &self.default_tags);
        }

        Ok(State::existing(id.clone(), map.into_inner()).with_identifier(task_id))
    }

    pub(crate) async fn create_replication_task(
        &self,
        resource: Resource,
    ) -> ProviderResult<State> {
        let id = &resource.id;
        let timeouts = configured_timeouts(id, &resource.attributes)?;
        let attrs = schema().normalize(&resource.attributes);
        let task_id = get_string(&attrs, "replication_task_id").ok_or_else(|| {
            ProviderError::new("replication_task_id is required").for_resource(id.clone())
        })?;

        self.client
            .create_replication_task()
            .replication_task_identifier(&task_id)
            .migration_type(MigrationTypeValue::from(
                str_or_empty(&attrs, "migration_type").as_str(),
            ))
            .replication_instance_arn(str_or_empty(&attrs, "replication_instance_arn"))
            .source_endpoint_arn(str_or_empty(&attrs, "source_endpoint_arn"))
            .target_endpoint_arn(str_or_empty(&attrs, "target_endpoint_arn"))
            .table_mappings(str_or_empty(&attrs, "table_mappings"))
            .set_replication_task_settings(get_string(&attrs, "replication_task_settings"))
            .set_cdc_start_position(get_string(&attrs, "cdc_start_position"))
            .set_cdc_start_time(cdc_start_time(&attrs, id)?)
            .set_resource_identifier(get_string(&attrs, "resource_identifier"))
            .set_tags(tags_in(&attrs, &self.default_tags))
            .send()
            .await
            .map_err(|e| api_error("create DMS Replication Task", &e, id))?;

        let timeout = timeouts.create_or(TASK_TIMEOUT);
        wait_replication_task_ready(&self.client, &task_id, timeout)
            .await
            .map_err(|e| wait_failed("DMS Replication Task create", e, id))?;
        info!("created DMS Replication Task {}", task_id);

        if bool_or_false(&attrs, START_FLAG) {
            start_task(&self.client, &task_id, timeout)
                .await
                .map_err(|e| {
                    ProviderError::new(format!("Failed to start DMS Replication Task: {}", e))
                        .for_resource(id.clone())
                })?;
            info!("started DMS Replication Task {}", task_id);
        }

        self.read_replication_task(id, &task_id).await
    }

    pub(crate) async fn update_replication_task(
        &self,
        id: ResourceId,
        task_id: &str,
        from: &State,
        to: Resource,
    ) -> ProviderResult<State> {
        let timeout = configured_timeouts(&id, &to.attributes)?.update_or(TASK_TIMEOUT);
        let to_attrs = planned(&schema(), &from.attributes, &to.attributes);
        let from_attrs = &from.attributes;
        let start = bool_or_false(&to_attrs, START_FLAG);
        let task_error = |action: &str, e: String| {
            ProviderError::new(format!("Failed to {} DMS Replication Task: {}", action, e))
                .for_resource(id.clone())
        };

        if requires_stop(from_attrs, &to_attrs) {
            stop_task(&self.client, task_id, timeout)
                .await
                .map_err(|e| task_error("stop", e))?;

            let arn = get_string(from_attrs, "replication_task_arn").ok_or_else(|| {
                ProviderError::new("replication_task_arn missing from state")
                    .for_resource(id.clone())
            })?;

            if has_change(from_attrs, &to_attrs, "replication_instance_arn") {
                self.client
                    .move_replication_task()
                    .replication_task_arn(&arn)
                    .target_replication_instance_arn(str_or_empty(
                        &to_attrs,
                        "replication_instance_arn",
                    ))
                    .send()
                    .await
                    .map_err(|e| api_error("move DMS Replication Task", &e, &id))?;
                wait_replication_task_moved(&self.client, task_id, timeout)
                    .await
                    .map_err(|e| wait_failed("DMS Replication Task move", e, &id))?;
                info!("moved DMS Replication Task {}", task_id);
            }

            let modify = modify_replication_task_request(&self.client, &arn, from_attrs, &to_attrs)
                .map_err(|e| ProviderError::new(e).for_resource(id.clone()))?;
            if let Some(request) = modify {
                request
                    .send()
                    .await
                    .map_err(|e| api_error("update DMS Replication Task", &e, &id))?;
                wait_replication_task_modified(&self.client, task_id, timeout)
                    .await
                    .map_err(|e| wait_failed("DMS Replication Task update", e, &id))?;
                info!("modified DMS Replication Task {}", task_id);
            }

            if start {
                start_task(&self.client, task_id, timeout)
                    .await
                    .map_err(|e| task_error("start", e))?;
            }
        } else if has_change(from_attrs, &to_attrs, START_FLAG) {
            if start {
                start_task(&self.client, task_id, timeout)
                    .await
                    .map_err(|e| task_error("start", e))?;
            } else {
                stop_task(&self.client, task_id, timeout)
                    .await
                    .map_err(|e| task_error("stop", e))?;
            }
        }

        if let Some(arn) = get_str(from_attrs, "replication_task_arn") {
            update_tags_from(&self.client, arn, from_attrs, &to_attrs, &self.default_tags)
                .await
                .map_err(|e| ProviderError::new(e).for_resource(id.clone()))?;
        }

        self.read_replication_task(&id, task_id).await
    }

    pub(crate) async fn delete_replication_task(
        &self,
        id: ResourceId,
        task_id: &str,
        timeouts: Timeouts,
    ) -> ProviderResult<()> {
        let timeout = timeouts.delete_or(TASK_TIMEOUT);
        stop_task(&self.client, task_id, timeout)
            .await
            .map_err(|e| {
                ProviderError::new(format!("Failed to stop DMS Replication Task: {}", e))
                    .for_resource(id.clone())
            })?;

        let arn = match find_replication_task_by_id(&self.client, task_id).await {
            Ok(task) => task.replication_task_arn().unwrap_or_default().to_string(),
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(find_failed("read DMS Replication Task", e, &id)),
        };

        match self
            .client
            .delete_replication_task()
            .replication_task_arn(&arn)
            .send()
            .await
        {
            Ok(_) => {}
            Err(e) if is_not_found(&e) => return Ok(()),
            Err(e) => return Err(api_error("delete DMS Replication Task", &e, &id)),
        }

        wait_replication_task_deleted(&self.client, task_id, timeout)
            .await
            .map_err(|e| wait_failed("DMS Replication Task delete", e, &id))
    }
}
