//! Carina State Management
//!
//! Persists what `apply` created so later runs can refresh, update and
//! destroy it. A backend stores one [`StateFile`] plus a lock object:
//!
//! - `local`: a JSON file and a sibling `.lock` file
//! - `s3`: an object in an existing bucket, guarded by conditional writes
//!
//! ```ignore
//! let backend = create_backend(parsed.backend.as_ref()).await?;
//! backend.init().await?;
//! let lock = backend.acquire_lock("apply").await?;
//! let mut state = backend.read_state().await?.unwrap_or_default();
//! // ... apply ...
//! state.bump();
//! backend.write_state(&state).await?;
//! backend.release_lock(&lock).await?;
//! ```

pub mod backend;
pub mod backends;
pub mod lock;
pub mod state;

pub use backend::{BackendError, BackendResult, StateBackend};
pub use backends::create_backend;
pub use lock::LockInfo;
pub use state::{ResourceState, StateFile};
