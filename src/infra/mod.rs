use crate::{
    adapters::persistence::PostgresPersistence,
    infra::db::{init_db, run_migrations},
};

pub mod billing_engine;
pub mod config;
pub mod db;
pub mod error;
pub mod feature_cache;
pub mod run_lock;
pub mod scheduler;
pub mod setup;
pub mod stripe_client;

pub use error::InfraError;

pub async fn postgres_persistence(
    database_url: &str,
    max_connections: u32,
) -> Result<PostgresPersistence, InfraError> {
    let pool = init_db(database_url, max_connections).await?;
    run_migrations(&pool).await?;
    Ok(PostgresPersistence::new(pool))
}
