//! Local file backend
//!
//! State lives in a JSON file (default `carina.state.json`); the lock is a
//! sibling `.lock` file created exclusively, so two processes cannot both
//! take it.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use carina_core::config::BackendConfig;
use log::{debug, warn};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::backend::{BackendError, BackendResult, StateBackend, config_str, lock_timeout};
use crate::lock::{DEFAULT_LOCK_TIMEOUT, LockInfo};
use crate::state::StateFile;

pub struct LocalBackend {
    state_path: PathBuf,
    lock_path: PathBuf,
    lock_timeout: Duration,
}

impl LocalBackend {
    pub const DEFAULT_STATE_FILE: &'static str = "carina.state.json";

    pub fn with_path(state_path: impl Into<PathBuf>) -> Self {
        let state_path = state_path.into();
        let lock_path = state_path.with_extension("lock");
        Self {
            state_path,
            lock_path,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    pub fn from_config(config: &BackendConfig) -> BackendResult<Self> {
        let path = config_str(config, "path").unwrap_or(Self::DEFAULT_STATE_FILE);
        let mut backend = Self::with_path(path);
        backend.lock_timeout = lock_timeout(config)?;
        Ok(backend)
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    async fn read_lock(&self) -> BackendResult<Option<LockInfo>> {
        match fs::read(&self.lock_path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error("read lock file", &self.lock_path, e)),
        }
    }

    /// Create the lock file, failing if it already exists
    async fn create_lock(&self, lock: &LockInfo) -> BackendResult<bool> {
        let body = serde_json::to_vec_pretty(lock)?;
        let file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.lock_path)
            .await;
        let mut file = match file {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(false),
            Err(e) => return Err(io_error("create lock file", &self.lock_path, e)),
        };
        file.write_all(&body)
            .await
            .map_err(|e| io_error("write lock file", &self.lock_path, e))?;
        Ok(true)
    }

    async fn remove_lock(&self) -> BackendResult<()> {
        fs::remove_file(&self.lock_path)
            .await
            .map_err(|e| io_error("remove lock file", &self.lock_path, e))
    }
}

fn io_error(action: &str, path: &Path, err: std::io::Error) -> BackendError {
    BackendError::Io(format!("Failed to {} {}: {}", action, path.display(), err))
}

#[async_trait]
impl StateBackend for LocalBackend {
    fn location(&self) -> String {
        self.state_path.display().to_string()
    }

    async fn init(&self) -> BackendResult<()> {
        if let Some(dir) = self.state_path.parent()
            && !dir.as_os_str().is_empty()
        {
            fs::create_dir_all(dir)
                .await
                .map_err(|e| io_error("create state directory", dir, e))?;
        }
        Ok(())
    }

    async fn read_state(&self) -> BackendResult<Option<StateFile>> {
        let bytes = match fs::read(&self.state_path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error("read state file", &self.state_path, e)),
        };
        let state = serde_json::from_slice(&bytes).map_err(|e| {
            BackendError::InvalidState(format!("{}: {}", self.state_path.display(), e))
        })?;
        Ok(Some(state))
    }

    async fn write_state(&self, state: &StateFile) -> BackendResult<()> {
        if let Some(stored) = self.read_state().await? {
            stored.check_successor(state)?;
        }

        // Write beside the target and rename so a crash never leaves a torn file
        let body = serde_json::to_vec_pretty(state)?;
        let tmp = self.state_path.with_extension("json.tmp");
        fs::write(&tmp, body)
            .await
            .map_err(|e| io_error("write state file", &tmp, e))?;
        fs::rename(&tmp, &self.state_path)
            .await
            .map_err(|e| io_error("replace state file", &self.state_path, e))?;
        debug!("wrote state serial {} to {}", state.serial, self.location());
        Ok(())
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
                self.remove_lock().await?;
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
        self.remove_lock().await
    }
}
