use std::sync::Arc;

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::{
    application::use_cases::payment_refresh::PaymentTransactionRepo,
    infra::{
        billing_engine::StoreBillingEngine,
        config::AppConfig,
        feature_cache::RedisFeatureCache,
        postgres_persistence,
        run_lock::{RUN_LOCK_KEY, RedisRunLock},
        stripe_client::StripePaymentGateway,
    },
    use_cases::{
        billing_run::{BillingRunConfig, BillingRunUseCases},
        payment_refresh::PaymentRefreshUseCases,
    },
};

pub async fn init_billing_run(config: &AppConfig) -> anyhow::Result<BillingRunUseCases> {
    let postgres_arc =
        Arc::new(postgres_persistence(&config.database_url, config.database_max_connections).await?);

    let cache = Arc::new(
        RedisFeatureCache::new(&config.redis_url, config.feature_cache_prefix.clone()).await?,
    );
    let lock = Arc::new(RedisRunLock::new(&config.redis_url, RUN_LOCK_KEY).await?);

    if config.stripe_secret_key.is_none() {
        tracing::warn!("STRIPE_SECRET_KEY not set, pending payments will not be refreshed");
    }
    let gateway = Arc::new(StripePaymentGateway::new(
        config.stripe_secret_key.clone(),
        config.stripe_api_base.clone(),
    )?);

    let transaction_repo_arc = postgres_arc.clone() as Arc<dyn PaymentTransactionRepo>;
    let payments = PaymentRefreshUseCases::new(transaction_repo_arc, gateway);

    Ok(BillingRunUseCases::new(
        postgres_arc,
        Arc::new(StoreBillingEngine::new()),
        cache,
        lock,
        Some(payments),
        BillingRunConfig {
            lock_ttl: config.run_lock_ttl,
            refresh_pending_payments: config.refresh_pending_payments,
            pending_payment_window_days: config.pending_payment_window_days,
        },
    ))
}

pub fn init_tracing(log_json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| "school_billing=info".into());

    // Console (human-readable)
    let console_layer = (!log_json).then(|| fmt::layer().with_target(false).with_level(true));

    // Structured JSON on stdout for log shippers
    let json_layer = log_json.then(|| {
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(json_layer)
        .try_init()
        .ok();
}
