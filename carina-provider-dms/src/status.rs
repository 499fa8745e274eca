//! Status waiters
//!
//! Each `*_conf` function describes one transition (pending and target
//! statuses, delay); the `wait_*` functions poll the matching finder.

use std::time::Duration;

use aws_sdk_databasemigration::Client;
use aws_sdk_databasemigration::types::{
    Connection, Endpoint, Replication, ReplicationInstance, ReplicationTask,
};
use carina_core::waiter::{StateChangeConf, WaitError};

use crate::consts::*;
use crate::error::FindError;
use crate::find;

pub type WaitResult<T> = Result<T, WaitError<FindError>>;

const INSTANCE_DELAY: Duration = Duration::from_secs(30);
const TASK_DELAY: Duration = Duration::from_secs(30);
const TASK_POLL_INTERVAL: Duration = Duration::from_secs(10);
const REPLICATION_DELAY: Duration = Duration::from_secs(60);

/// Not-found becomes `None` so the waiter can tell "gone" from a failure
fn optional<T>(result: Result<T, FindError>) -> Result<Option<T>, FindError> {
    match result {
        Ok(found) => Ok(Some(found)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

fn with_status<T>(found: Option<T>, status: impl Fn(&T) -> Option<&str>) -> Option<(T, String)> {
    found.map(|found| {
        let status = status(&found).unwrap_or_default().to_string();
        (found, status)
    })
}

async fn endpoint_status(
    client: &Client,
    id: &str,
) -> Result<Option<(Endpoint, String)>, FindError> {
    let found = optional(find::find_endpoint_by_id(client, id).await)?;
    Ok(with_status(found, |e| e.status()))
}

async fn instance_status(
    client: &Client,
    id: &str,
) -> Result<Option<(ReplicationInstance, String)>, FindError> {
    let found = optional(find::find_replication_instance_by_id(client, id).await)?;
    Ok(with_status(found, |i| i.replication_instance_status()))
}

async fn task_status(
    client: &Client,
    id: &str,
) -> Result<Option<(ReplicationTask, String)>, FindError> {
    let found = optional(find::find_replication_task_by_id(client, id).await)?;
    Ok(with_status(found, |t| t.status()))
}

async fn replication_status(
    client: &Client,
    config_arn: &str,
) -> Result<Option<(Replication, String)>, FindError> {
    let found = optional(find::find_replication_by_config_arn(client, config_arn).await)?;
    Ok(with_status(found, |r| r.status()))
}

async fn connection_status(
    client: &Client,
    endpoint_arn: &str,
    instance_arn: &str,
) -> Result<Option<(Connection, String)>, FindError> {
    let found = optional(find::find_connection(client, endpoint_arn, instance_arn).await)?;
    Ok(with_status(found, |c| c.status()))
}

// =============================================================================
// Transitions
// =============================================================================

pub fn endpoint_deleted_conf(timeout: Duration) -> StateChangeConf {
    StateChangeConf::new(&[ENDPOINT_STATUS_DELETING], &[], timeout)
}

pub fn instance_created_conf(timeout: Duration) -> StateChangeConf {
    StateChangeConf::new(
        &[INSTANCE_STATUS_CREATING, INSTANCE_STATUS_MODIFYING],
        &[INSTANCE_STATUS_AVAILABLE],
        timeout,
    )
    .with_delay(INSTANCE_DELAY)
}

pub fn instance_updated_conf(timeout: Duration) -> StateChangeConf {
    StateChangeConf::new(
        &[
            INSTANCE_STATUS_MODIFYING,
            INSTANCE_STATUS_UPGRADING,
            INSTANCE_STATUS_REBOOTING,
            INSTANCE_STATUS_MAINTENANCE,
        ],
        &[INSTANCE_STATUS_AVAILABLE],
        timeout,
    )
    .with_delay(INSTANCE_DELAY)
}

pub fn instance_deleted_conf(timeout: Duration) -> StateChangeConf {
    StateChangeConf::new(
        &[INSTANCE_STATUS_AVAILABLE, INSTANCE_STATUS_DELETING],
        &[],
        timeout,
    )
    .with_delay(INSTANCE_DELAY)
}

pub fn task_created_conf(timeout: Duration) -> StateChangeConf {
    StateChangeConf::new(&[TASK_STATUS_CREATING], &[TASK_STATUS_READY], timeout)
        .with_delay(TASK_DELAY)
        .with_poll_interval(TASK_POLL_INTERVAL)
}

pub fn task_updated_conf(timeout: Duration) -> StateChangeConf {
    StateChangeConf::new(
        &[TASK_STATUS_MODIFYING],
        &[TASK_STATUS_READY, TASK_STATUS_STOPPED, TASK_STATUS_FAILED],
        timeout,
    )
    .with_delay(TASK_DELAY)
    .with_poll_interval(TASK_POLL_INTERVAL)
}

pub fn task_moved_conf(timeout: Duration) -> StateChangeConf {
    StateChangeConf::new(
        &[TASK_STATUS_MODIFYING, TASK_STATUS_MOVING],
        &[TASK_STATUS_FAILED, TASK_STATUS_READY, TASK_STATUS_STOPPED],
        timeout,
    )
    .with_delay(TASK_DELAY)
    .with_poll_interval(TASK_POLL_INTERVAL)
}

pub fn task_running_conf(timeout: Duration) -> StateChangeConf {
    StateChangeConf::new(&[TASK_STATUS_STARTING], &[TASK_STATUS_RUNNING], timeout)
        .with_delay(TASK_DELAY)
        .with_poll_interval(TASK_POLL_INTERVAL)
}

pub fn task_stopped_conf(timeout: Duration) -> StateChangeConf {
    StateChangeConf::new(
        &[TASK_STATUS_STOPPING, TASK_STATUS_RUNNING],
        &[TASK_STATUS_STOPPED],
        timeout,
    )
    .with_delay(TASK_DELAY)
    .with_poll_interval(TASK_POLL_INTERVAL)
    .with_continuous_target_occurence(2)
}

/// Any status a task can rest in
pub fn task_steady_conf(timeout: Duration) -> StateChangeConf {
    StateChangeConf::new(
        &[
            TASK_STATUS_CREATING,
            TASK_STATUS_DELETING,
            TASK_STATUS_MODIFYING,
            TASK_STATUS_MOVING,
            TASK_STATUS_STARTING,
            TASK_STATUS_STOPPING,
            TASK_STATUS_TESTING,
        ],
        &[
            TASK_STATUS_FAILED,
            TASK_STATUS_READY,
            TASK_STATUS_RUNNING,
            TASK_STATUS_STOPPED,
        ],
        timeout,
    )
    .with_poll_interval(TASK_POLL_INTERVAL)
}

pub fn task_deleted_conf(timeout: Duration) -> StateChangeConf {
    StateChangeConf::new(&[TASK_STATUS_DELETING], &[], timeout)
        .with_poll_interval(TASK_POLL_INTERVAL)
}

pub fn replication_running_conf(timeout: Duration) -> StateChangeConf {
    StateChangeConf::new(
        &[
            REPLICATION_STATUS_CREATED,
            REPLICATION_STATUS_INITIALIZING,
            REPLICATION_STATUS_PREPARING_METADATA_RESOURCES,
            REPLICATION_STATUS_TESTING_CONNECTION,
            REPLICATION_STATUS_FETCHING_METADATA,
            REPLICATION_STATUS_CALCULATING_CAPACITY,
            REPLICATION_STATUS_PROVISIONING_CAPACITY,
            REPLICATION_STATUS_REPLICATION_STARTING,
        ],
        &[REPLICATION_STATUS_RUNNING, REPLICATION_STATUS_STOPPED],
        timeout,
    )
    .with_delay(REPLICATION_DELAY)
}

pub fn replication_stopped_conf(timeout: Duration) -> StateChangeConf {
    StateChangeConf::new(
        &[REPLICATION_STATUS_STOPPING, REPLICATION_STATUS_RUNNING],
        &[REPLICATION_STATUS_STOPPED, REPLICATION_STATUS_FAILED],
        timeout,
    )
    .with_delay(REPLICATION_DELAY)
}

pub fn replication_deleted_conf(timeout: Duration) -> StateChangeConf {
    StateChangeConf::new(
        &[REPLICATION_STATUS_DELETING, REPLICATION_STATUS_STOPPED],
        &[],
        timeout,
    )
}

pub fn connection_succeeded_conf(timeout: Duration) -> StateChangeConf {
    StateChangeConf::new(
        &[CONNECTION_STATUS_TESTING],
        &[CONNECTION_STATUS_SUCCESSFUL],
        timeout,
    )
}

// =============================================================================
// Waiters
// =============================================================================

pub async fn wait_endpoint_deleted(client: &Client, id: &str, timeout: Duration) -> WaitResult<()> {
    endpoint_deleted_conf(timeout)
        .wait_for_state(|| endpoint_status(client, id))
        .await
        .map(|_| ())
}

pub async fn wait_replication_instance_created(
    client: &Client,
    id: &str,
    timeout: Duration,
) -> WaitResult<Option<ReplicationInstance>> {
    instance_created_conf(timeout)
        .wait_for_state(|| instance_status(client, id))
        .await
}

pub async fn wait_replication_instance_updated(
    client: &Client,
    id: &str,
    timeout: Duration,
) -> WaitResult<Option<ReplicationInstance>> {
    instance_updated_conf(timeout)
        .wait_for_state(|| instance_status(client, id))
        .await
}

pub async fn wait_replication_instance_deleted(
    client: &Client,
    id: &str,
    timeout: Duration,
) -> WaitResult<()> {
    instance_deleted_conf(timeout)
        .wait_for_state(|| instance_status(client, id))
        .await
        .map(|_| ())
}

pub async fn wait_replication_task_ready(
    client: &Client,
    id: &str,
    timeout: Duration,
) -> WaitResult<Option<ReplicationTask>> {
    task_created_conf(timeout)
        .wait_for_state(|| task_status(client, id))
        .await
}

pub async fn wait_replication_task_modified(
    client: &Client,
    id: &str,
    timeout: Duration,
) -> WaitResult<Option<ReplicationTask>> {
    task_updated_conf(timeout)
        .wait_for_state(|| task_status(client, id))
        .await
}

pub async fn wait_replication_task_moved(
    client: &Client,
    id: &str,
    timeout: Duration,
) -> WaitResult<Option<ReplicationTask>> {
    task_moved_conf(timeout)
        .wait_for_state(|| task_status(client, id))
        .await
}

pub async fn wait_replication_task_running(
    client: &Client,
    id: &str,
    timeout: Duration,
) -> WaitResult<Option<ReplicationTask>> {
    task_running_conf(timeout)
        .wait_for_state(|| task_status(client, id))
        .await
}

pub async fn wait_replication_task_stopped(
    client: &Client,
    id: &str,
    timeout: Duration,
) -> WaitResult<Option<ReplicationTask>> {
    task_stopped_conf(timeout)
        .wait_for_state(|| task_status(client, id))
        .await
}

pub async fn wait_replication_task_steady(
    client: &Client,
    id: &str,
    timeout: Duration,
) -> WaitResult<Option<ReplicationTask>> {
    task_steady_conf(timeout)
        .wait_for_state(|| task_status(client, id))
        .await
}

pub async fn wait_replication_task_deleted(
    client: &Client,
    id: &str,
    timeout: Duration,
) -> WaitResult<()> {
    task_deleted_conf(timeout)
        .wait_for_state(|| task_status(client, id))
        .await
        .map(|_| ())
}

pub async fn wait_replication_running(
    client: &Client,
    config_arn: &str,
    timeout: Duration,
) -> WaitResult<Option<Replication>> {
    replication_running_conf(timeout)
        .wait_for_state(|| replication_status(client, config_arn))
        .await
}

pub async fn wait_replication_stopped(
    client: &Client,
    config_arn: &str,
    timeout: Duration,
) -> WaitResult<Option<Replication>> {
    replication_stopped_conf(timeout)
        .wait_for_state(|| replication_status(client, config_arn))
        .await
}

pub async fn wait_replication_deleted(
    client: &Client,
    config_arn: &str,
    timeout: Duration,
) -> WaitResult<()> {
    replication_deleted_conf(timeout)
        .wait_for_state(|| replication_status(client, config_arn))
        .await
        .map(|_| ())
}

pub async fn wait_connection_succeeded(
    client: &Client,
    endpoint_arn: &str,
    instance_arn: &str,
    timeout: Duration,
) -> WaitResult<Option<Connection>> {
    connection_succeeded_conf(timeout)
        .wait_for_state(|| connection_status(client, endpoint_arn, instance_arn))
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_to_none() {
        let gone: Result<i32, FindError> = Err(FindError::NotFound("DMS Endpoint (x)".into()));
        assert_eq!(optional(gone).unwrap(), None);

        let failed: Result<i32, FindError> = Err(FindError::Api("throttled".into()));
        assert!(optional(failed).is_err());
    }

    #[test]
    fn missing_status_reads_as_empty() {
        let found = with_status(Some(("task", None::<&str>)), |(_, s)| *s);
        assert_eq!(found.map(|(_, s)| s), Some(String::new()));
    }

    #[test]
    fn deletion_waiters_target_absence() {
        let timeout = Duration::from_secs(600);
        for conf in [
            endpoint_deleted_conf(timeout),
            instance_deleted_conf(timeout),
            task_deleted_conf(timeout),
            replication_deleted_conf(timeout),
        ] {
            assert!(conf.target.is_empty());
        }
    }

    #[test]
    fn stopped_waiter_requires_two_observations() {
        let conf = task_stopped_conf(Duration::from_secs(60));
        assert_eq!(conf.continuous_target_occurence, 2);
        assert_eq!(conf.target, vec![TASK_STATUS_STOPPED.to_string()]);
    }

    #[tokio::test]
    async fn steady_waiter_accepts_resting_states() {
        tokio::time::pause();
        let mut statuses = vec![TASK_STATUS_RUNNING, TASK_STATUS_MODIFYING].into_iter().rev();
        let result = task_steady_conf(Duration::from_secs(60))
            .wait_for_state(|| {
                let status = statuses.next().unwrap_or(TASK_STATUS_RUNNING);
                async move { Ok::<_, FindError>(Some(((), status.to_string()))) }
            })
            .await;
        assert!(result.is_ok());
    }
}
