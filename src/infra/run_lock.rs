use std::time::Duration;

use async_trait::async_trait;
use redis::{Script, aio::ConnectionManager};
use uuid::Uuid;

use super::InfraError;
use crate::{
    app_error::{AppError, AppResult},
    application::ports::run_lock::{RunLease, RunLock},
};

pub const RUN_LOCK_KEY: &str = "cron:subscription_bill:lock";

/// Deletes the key only if it still holds the caller's token.
const RELEASE_IF_OWNER_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
"#;

/// `SET NX PX` lock; the TTL frees it if the holder dies mid-run.
#[derive(Clone)]
pub struct RedisRunLock {
    manager: ConnectionManager,
    key: String,
    release_script: Script,
}

impl RedisRunLock {
    pub async fn new(redis_url: &str, key: &str) -> Result<Self, InfraError> {
        let client = redis::Client::open(redis_url).map_err(InfraError::RedisConnection)?;
        let manager = ConnectionManager::new(client)
            .await
            .map_err(InfraError::RedisConnection)?;
        Ok(Self {
            manager,
            key: key.to_string(),
            release_script: Script::new(RELEASE_IF_OWNER_SCRIPT),
        })
    }
}

#[async_trait]
impl RunLock for RedisRunLock {
    async fn try_acquire(&self, ttl: Duration) -> AppResult<Option<RunLease>> {
        let mut conn = self.manager.clone();
        let token = Uuid::new_v4();
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);

        let reply: Option<String> = redis::cmd("SET")
            .arg(&self.key)
            .arg(token.to_string())
            .arg("NX")
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await
            .map_err(|e| AppError::Cache(e.to_string()))?;

        Ok(reply.map(|_| RunLease { token }))
    }

    async fn release(&self, lease: RunLease) -> AppResult<()> {
        let mut conn = self.manager.clone();
        let released: i64 = self
            .release_script
            .key(&self.key)
            .arg(lease.token.to_string())
            .invoke_async(&mut conn)
            .await
            .map_err(|e| AppError::Cache(e.to_string()))?;

        if released == 0 {
            tracing::warn!(key = %self.key, "Run lock expired before release");
        }
        Ok(())
    }
}
