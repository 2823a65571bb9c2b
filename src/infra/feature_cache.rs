use async_trait::async_trait;
use redis::{AsyncCommands, aio::ConnectionManager};

use super::InfraError;
use crate::{
    app_error::{AppError, AppResult},
    application::ports::feature_cache::FeatureCache,
};

fn feature_cache_key(prefix: &str, school_id: i64) -> String {
    format!("{prefix}:{school_id}:features")
}

/// Drops the per-school feature set the web app caches in Redis.
#[derive(Clone)]
pub struct RedisFeatureCache {
    manager: ConnectionManager,
    prefix: String,
}

impl RedisFeatureCache {
    pub async fn new(redis_url: &str, prefix: String) -> Result<Self, InfraError> {
        let client = redis::Client::open(redis_url).map_err(InfraError::RedisConnection)?;
        let manager = ConnectionManager::new(client)
            .await
            .map_err(InfraError::RedisConnection)?;
        Ok(Self { manager, prefix })
    }
}

#[async_trait]
impl FeatureCache for RedisFeatureCache {
    async fn invalidate_school_features(&self, school_id: i64) -> AppResult<()> {
        let mut conn = self.manager.clone();
        let removed: i64 = conn
            .del(feature_cache_key(&self.prefix, school_id))
            .await
            .map_err(|e| AppError::Cache(e.to_string()))?;
        tracing::debug!(school_id, removed, "School feature cache invalidated");
        Ok(())
    }
}
