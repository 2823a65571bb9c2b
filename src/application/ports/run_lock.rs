use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::app_error::AppResult;

/// Proof of holding the run lock; only the holder's token can release it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunLease {
    pub token: Uuid,
}

/// Mutual exclusion across billing runs (processes and hosts).
#[async_trait]
pub trait RunLock: Send + Sync {
    /// `None` when another run holds the lock.
    async fn try_acquire(&self, ttl: Duration) -> AppResult<Option<RunLease>>;

    async fn release(&self, lease: RunLease) -> AppResult<()>;
}
