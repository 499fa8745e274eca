//! State lock records

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Locks older than this are considered abandoned and may be taken over
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(2 * 60 * 60);

/// Written next to the state while an operation holds it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockInfo {
    pub id: String,
    /// Command holding the lock ("apply", "destroy", ...)
    pub operation: String,
    /// user@host
    pub who: String,
    pub carina_version: String,
    pub created: DateTime<Utc>,
    pub expires: DateTime<Utc>,
}

impl LockInfo {
    pub fn new(operation: impl Into<String>, timeout: Duration) -> Self {
        let created = Utc::now();
        let ttl = chrono::Duration::from_std(timeout)
            .unwrap_or_else(|_| chrono::Duration::seconds(DEFAULT_LOCK_TIMEOUT.as_secs() as i64));
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            operation: operation.into(),
            who: lock_owner(),
            carina_version: env!("CARGO_PKG_VERSION").to_string(),
            created,
            expires: created + ttl,
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires
    }
}

impl fmt::Display for LockInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  ID:        {}", self.id)?;
        writeln!(f, "  Operation: {}", self.operation)?;
        writeln!(f, "  Who:       {}", self.who)?;
        writeln!(f, "  Version:   {}", self.carina_version)?;
        write!(f, "  Created:   {}", self.created.to_rfc3339())
    }
}

fn lock_owner() -> String {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string());
    let host = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());
    format!("{}@{}", user, host)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_lock_expires_after_timeout() {
        let lock = LockInfo::new("apply", Duration::from_secs(60));
        assert_eq!(lock.operation, "apply");
        assert!(lock.who.contains('@'));
        assert_eq!((lock.expires - lock.created).num_seconds(), 60);
        assert!(!lock.is_expired());
    }

    #[test]
    fn zero_timeout_expires_immediately() {
        let mut lock = LockInfo::new("destroy", Duration::ZERO);
        lock.expires -= chrono::Duration::seconds(1);
        assert!(lock.is_expired());
    }

    #[test]
    fn display_lists_holder() {
        let lock = LockInfo::new("apply", DEFAULT_LOCK_TIMEOUT);
        let shown = lock.to_string();
        assert!(shown.contains(&lock.id));
        assert!(shown.contains("Operation: apply"));
    }
}
