//! S3 backend
//!
//! The state object is written with `If-Match` on the ETag that was read,
//! and the lock object is created with `If-None-Match: *`, so concurrent
//! writers are rejected by S3 itself.

use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ServerSideEncryption;
use carina_core::config::BackendConfig;
use log::{debug, warn};

use crate::backend::{
    BackendError, BackendResult, StateBackend, config_bool, config_str, lock_timeout,
};
use crate::lock::LockInfo;
use crate::state::StateFile;

pub struct S3Backend {
    client: Client,
    bucket: String,
    key: String,
    encrypt: bool,
    lock_timeout: Duration,
}

/// Object body plus the ETag it was read with
struct Object {
    body: Vec<u8>,
    etag: Option<String>,
}

impl S3Backend {
    pub async fn from_config(config: &BackendConfig) -> BackendResult<Self> {
        let bucket = config_str(config, "bucket")
            .ok_or_else(|| BackendError::configuration("Missing required attribute: bucket"))?;
        let key = config_str(config, "key")
            .ok_or_else(|| BackendError::configuration("Missing required attribute: key"))?;

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = config_str(config, "region") {
            loader = loader.region(Region::new(region.to_string()));
        }
        if let Some(profile) = config_str(config, "profile") {
            loader = loader.profile_name(profile);
        }
        let sdk_config = loader.load().await;

        Ok(Self {
            client: Client::new(&sdk_config),
            bucket: bucket.to_string(),
            key: key.to_string(),
            encrypt: config_bool(config, "encrypt", true),
            lock_timeout: lock_timeout(config)?,
        })
    }

    fn lock_key(&self) -> String {
        format!("{}.lock", self.key)
    }

    async fn get(&self, key: &str) -> BackendResult<Option<Object>> {
        let output = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(output) => output,
            Err(e) if is_status(&e, 404) => return Ok(None),
            Err(e) => return Err(aws_error("GetObject", key, &e)),
        };
        let etag = output.e_tag().map(str::to_string);
        let body = output
            .body
            .collect()
            .await
            .map_err(|e| BackendError::Io(e.to_string()))?
            .into_bytes()
            .to_vec();
        Ok(Some(Object { body, etag }))
    }

    async fn read_lock(&self) -> BackendResult<Option<LockInfo>> {
        match self.get(&self.lock_key()).await? {
            Some(object) => Ok(Some(serde_json::from_slice(&object.body)?)),
            None => Ok(None),
        }
    }

    /// `false` when another lock object already exists
    async fn create_lock(&self, lock: &LockInfo) -> BackendResult<bool> {
        let key = self.lock_key();
        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .if_none_match("*")
            .content_type("application/json")
            .body(ByteStream::from(serde_json::to_vec_pretty(lock)?));
        if self.encrypt {
            request = request.server_side_encryption(ServerSideEncryption::Aes256);
        }
        match request.send().await {
            Ok(_) => Ok(true),
            Err(e) if is_status(&e, 412) || is_status(&e, 409) => Ok(false),
            Err(e) => Err(aws_error("PutObject", &key, &e)),
        }
    }

    async fn delete_lock(&self) -> BackendResult<()> {
        let key = self.lock_key();
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| aws_error("DeleteObject", &key, &e))?;
        Ok(())
    }
}

fn is_status<E>(err: &SdkError<E>, status: u16) -> bool {
    err.raw_response()
        .is_some_and(|r| r.status().as_u16() == status)
}

fn aws_error<E>(operation: &str, key: &str, err: &SdkError<E>) -> BackendError
where
    E: std::error::Error + 'static,
{
    BackendError::Aws(format!(
        "{} {} failed: {}",
        operation,
        key,
        DisplayErrorContext(err)
    ))
}

#[async_trait]
impl StateBackend for S3Backend {
    fn location(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.key)
    }

    async fn init(&self) -> BackendResult<()> {
        match self.client.head_bucket().bucket(&self.bucket).send().await {
            Ok(_) => Ok(()),
            Err(e) if is_status(&e, 404) => Err(BackendError::BucketNotFound(self.bucket.clone())),
            Err(e) => Err(aws_error("HeadBucket", &self.bucket, &e)),
        }
    }

    async fn read_state(&self) -> BackendResult<Option<StateFile>> {
        match self.get(&self.key).await? {
            Some(object) => serde_json::from_slice(&object.body)
                .map(Some)
                .map_err(|e| BackendError::InvalidState(format!("{}: {}", self.location(), e))),
            None => Ok(None),
        }
    }

    async fn write_state(&self, state: &StateFile) -> BackendResult<()> {
        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(&self.key)
            .content_type("application/json")
            .body(ByteStream::from(serde_json::to_vec_pretty(state)?));

        match self.get(&self.key).await? {
            Some(object) => {
                let stored: StateFile = serde_json::from_slice(&object.body)
                    .map_err(|e| BackendError::InvalidState(e.to_string()))?;
                stored.check_successor(state)?;
                if let Some(etag) = object.etag {
                    request = request.if_match(etag);
                }
            }
            None => request = request.if_none_match("*"),
        }
        if self.encrypt {
            request = request.server_side_encryption(ServerSideEncryption::Aes256);
        }

        match request.send().await {
            Ok(_) => {
                debug!("wrote state serial {} to {}", state.serial, self.location());
                Ok(())
            }
            Err(e) if is_status(&e, 412) => Err(BackendError::InvalidState(format!(
                "{} changed while serial {} was being written",
                self.location(),
                state.serial
            ))),
            Err(e) => Err(aws_error("PutObject", &self.key, &e)),
        }
    }

    async fn acquire_lock(&self, operation: &str) -> BackendResult<LockInfo> {
        let lock = LockInfo::new(operation, self.lock_timeout);
        if self.create_lock(&lock).await? {
            return Ok(lock);
        }

        match self.read_lock().await? {
            Some(existing) if !existing.is_expired() => Err(BackendError::locked(&existing)),
            existing => {
                if let Some(expired) = existing {
                    warn!(
                        "taking over expired lock {} held by {}",
                        expired.id, expired.who
                    );
                }
                self.delete_lock().await?;
                if self.create_lock(&lock).await? {
                    Ok(lock)
                } else {
                    let holder = self.read_lock().await?;
                    Err(holder
                        .map(|h| BackendError::locked(&h))
                        .unwrap_or_else(|| BackendError::LockNotFound(lock.id.clone())))
                }
            }
        }
    }

    async fn release_lock(&self, lock: &LockInfo) -> BackendResult<()> {
        self.force_unlock(&lock.id).await
    }

    async fn force_unlock(&self, lock_id: &str) -> BackendResult<()> {
        let existing = self
            .read_lock()
            .await?
            .ok_or_else(|| BackendError::LockNotFound(lock_id.to_string()))?;
        if existing.id != lock_id {
            return Err(BackendError::LockMismatch {
                expected: lock_id.to_string(),
                actual: existing.id,
            });
        }
        self.delete_lock().await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use carina_core::resource::Value;

    use super::*;

    fn config(pairs: &[(&str, &str)]) -> BackendConfig {
        BackendConfig {
            backend_type: "s3".to_string(),
            attributes: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), Value::from(*v)))
                .collect::<HashMap<_, _>>(),
        }
    }

    #[tokio::test]
    async fn requires_bucket_and_key() {
        let err = S3Backend::from_config(&config(&[("key", "dms/state.json")]))
            .await
            .err()
            .unwrap();
        assert!(err.to_string().contains("bucket"));

        let err = S3Backend::from_config(&config(&[("bucket", "infra-state")]))
            .await
            .err()
            .unwrap();
        assert!(err.to_string().contains("key"));
    }

    #[tokio::test]
    async fn location_and_lock_key() {
        let backend = S3Backend::from_config(&config(&[
            ("bucket", "infra-state"),
            ("key", "dms/state.json"),
            ("region", "eu-west-1"),
            ("encrypt", "false"),
        ]))
        .await
        .unwrap();
        assert_eq!(backend.location(), "s3://infra-state/dms/state.json");
        assert_eq!(backend.lock_key(), "dms/state.json.lock");
        assert!(!backend.encrypt);
    }
}
