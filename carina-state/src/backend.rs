//! State backend trait and error types

use std::time::Duration;

use async_trait::async_trait;
use carina_core::config::BackendConfig;
use carina_core::waiter::parse_duration;
use thiserror::Error;

use crate::lock::{DEFAULT_LOCK_TIMEOUT, LockInfo};
use crate::state::StateFile;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("State is locked by {who} (lock ID: {lock_id}, operation: {operation})")]
    Locked {
        lock_id: String,
        who: String,
        operation: String,
    },

    #[error("Lock not found: {0}")]
    LockNotFound(String),

    #[error("Lock ID mismatch: expected {expected}, got {actual}")]
    LockMismatch { expected: String, actual: String },

    #[error("Unsupported backend type: {0}")]
    UnsupportedBackend(String),

    #[error("Backend configuration error: {0}")]
    Configuration(String),

    #[error("Bucket not found: {0}")]
    BucketNotFound(String),

    #[error("Invalid state file: {0}")]
    InvalidState(String),

    #[error("State lineage mismatch: expected {expected}, got {actual}")]
    LineageMismatch { expected: String, actual: String },

    #[error("State serial {attempted} is not newer than stored serial {stored}")]
    StaleSerial { stored: u64, attempted: u64 },

    #[error("I/O error: {0}")]
    Io(String),

    #[error("AWS error: {0}")]
    Aws(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BackendError {
    pub fn locked(lock: &LockInfo) -> Self {
        Self::Locked {
            lock_id: lock.id.clone(),
            who: lock.who.clone(),
            operation: lock.operation.clone(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Storage for the state file and its lock
#[async_trait]
pub trait StateBackend: Send + Sync {
    /// Human readable location, for messages
    fn location(&self) -> String;

    /// Check that the storage is reachable
    async fn init(&self) -> BackendResult<()>;

    /// `None` before the first apply
    async fn read_state(&self) -> BackendResult<Option<StateFile>>;

    /// Store `state`. Fails when the stored state belongs to another
    /// lineage or is not older than `state`.
    async fn write_state(&self, state: &StateFile) -> BackendResult<()>;

    /// Take the lock for `operation`, replacing an expired one
    async fn acquire_lock(&self, operation: &str) -> BackendResult<LockInfo>;

    /// Release a lock this process holds
    async fn release_lock(&self, lock: &LockInfo) -> BackendResult<()>;

    /// Remove the lock with `lock_id` regardless of who holds it
    async fn force_unlock(&self, lock_id: &str) -> BackendResult<()>;
}

pub(crate) fn config_str<'a>(config: &'a BackendConfig, key: &str) -> Option<&'a str> {
    config
        .attributes
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
}

pub(crate) fn config_bool(config: &BackendConfig, key: &str, default: bool) -> bool {
    config
        .attributes
        .get(key)
        .and_then(|v| v.as_bool())
        .unwrap_or(default)
}

/// `lock_timeout` accepts the same durations as resource timeouts ("30m")
pub(crate) fn lock_timeout(config: &BackendConfig) -> BackendResult<Duration> {
    match config_str(config, "lock_timeout") {
        Some(raw) => parse_duration(raw)
            .map_err(|e| BackendError::configuration(format!("lock_timeout: {}", e))),
        None => Ok(DEFAULT_LOCK_TIMEOUT),
    }
}

#[cfg(test)]
mod tests {
    use carina_core::resource::Value;

    use super::*;

    fn config(pairs: &[(&str, Value)]) -> BackendConfig {
        BackendConfig {
            backend_type: "local".to_string(),
            attributes: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        }
    }

    #[test]
    fn locked_error_names_holder() {
        let lock = LockInfo::new("apply", DEFAULT_LOCK_TIMEOUT);
        let message = BackendError::locked(&lock).to_string();
        assert!(message.contains(&lock.id));
        assert!(message.contains("operation: apply"));
    }

    #[test]
    fn lock_timeout_parses_duration() {
        let cfg = config(&[("lock_timeout", Value::from("30m"))]);
        assert_eq!(lock_timeout(&cfg).unwrap(), Duration::from_secs(1800));
        assert_eq!(lock_timeout(&config(&[])).unwrap(), DEFAULT_LOCK_TIMEOUT);

        let bad = config(&[("lock_timeout", Value::from("soon"))]);
        assert!(matches!(lock_timeout(&bad), Err(BackendError::Configuration(_))));
    }

    #[test]
    fn config_helpers_treat_empty_as_unset() {
        let cfg = config(&[
            ("path", Value::from("")),
            ("encrypt", Value::from("false")),
        ]);
        assert_eq!(config_str(&cfg, "path"), None);
        assert!(!config_bool(&cfg, "encrypt", true));
        assert!(config_bool(&cfg, "missing", true));
    }
}
