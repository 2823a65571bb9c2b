pub mod billing_engine;
pub mod billing_store;
pub mod feature_cache;
pub mod payment_gateway;
pub mod run_lock;
