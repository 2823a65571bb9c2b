use async_trait::async_trait;

use crate::app_error::AppResult;

/// School-scoped cache of enabled features.
#[async_trait]
pub trait FeatureCache: Send + Sync {
    /// Drop the cached feature set. Safe to call repeatedly.
    async fn invalidate_school_features(&self, school_id: i64) -> AppResult<()>;
}
