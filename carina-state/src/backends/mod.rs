//! Backend implementations

mod local;
mod s3;

pub use local::LocalBackend;
pub use s3::S3Backend;

use carina_core::config::BackendConfig;

use crate::backend::{BackendError, BackendResult, StateBackend};

/// Backend for a `backend` block; without one, state goes to the local file
pub async fn create_backend(
    config: Option<&BackendConfig>,
) -> BackendResult<Box<dyn StateBackend>> {
    let Some(config) = config else {
        return Ok(Box::new(LocalBackend::with_path(
            LocalBackend::DEFAULT_STATE_FILE,
        )));
    };
    match config.backend_type.as_str() {
        "local" => Ok(Box::new(LocalBackend::from_config(config)?)),
        "s3" => Ok(Box::new(S3Backend::from_config(config).await?)),
        other => Err(BackendError::UnsupportedBackend(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[tokio::test]
    async fn defaults_to_local_file() {
        let backend = create_backend(None).await.unwrap();
        assert_eq!(backend.location(), LocalBackend::DEFAULT_STATE_FILE);
    }

    #[tokio::test]
    async fn rejects_unknown_type() {
        let config = BackendConfig {
            backend_type: "consul".to_string(),
            attributes: HashMap::new(),
        };
        let err = create_backend(Some(&config)).await.err().unwrap();
        assert!(matches!(err, BackendError::UnsupportedBackend(ref t) if t == "consul"));
    }
}
