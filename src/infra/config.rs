use std::time::Duration;

use chrono::NaiveTime;
use env_helpers::{get_env, get_env_default};
use secrecy::SecretString;
use url::Url;

use super::error::InfraError;

const DEFAULT_STRIPE_API_BASE: &str = "https://api.stripe.com/v1";

pub struct AppConfig {
    pub database_url: String,
    pub database_max_connections: u32,
    pub redis_url: String,
    /// Feature cache keys are `{prefix}:{school_id}:features`.
    pub feature_cache_prefix: String,
    pub run_lock_ttl: Duration,
    /// Local wall-clock time of the daily run in `serve` mode.
    pub run_at: NaiveTime,
    pub refresh_pending_payments: bool,
    pub pending_payment_window_days: Option<i64>,
    /// Without a key every transaction is reported as unsupported and left pending.
    pub stripe_secret_key: Option<SecretString>,
    pub stripe_api_base: Url,
    pub log_json: bool,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, InfraError> {
        let database_url: String = get_env("DATABASE_URL");
        let database_max_connections: u32 = get_env_default("DATABASE_MAX_CONNECTIONS", 5);
        let redis_url: String = get_env_default("REDIS_URL", "redis://127.0.0.1:6379".to_string());
        let feature_cache_prefix: String =
            get_env_default("FEATURE_CACHE_PREFIX", "school".to_string());
        let run_lock_ttl_secs: u64 = get_env_default("RUN_LOCK_TTL_SECS", 3600);
        let run_at = parse_run_at(&get_env_default("RUN_AT", "00:05".to_string()))?;
        let refresh_pending_payments: bool = get_env_default("REFRESH_PENDING_PAYMENTS", true);
        let pending_payment_window_days = parse_window_days(
            std::env::var("PENDING_PAYMENT_WINDOW_DAYS").ok().as_deref(),
        )?;
        let stripe_secret_key: Option<SecretString> = std::env::var("STRIPE_SECRET_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())
            .map(|key| SecretString::new(key.into()));
        let stripe_api_base_raw: String =
            get_env_default("STRIPE_API_BASE", DEFAULT_STRIPE_API_BASE.to_string());
        let stripe_api_base =
            Url::parse(&stripe_api_base_raw).map_err(|_| InfraError::ConfigInvalid {
                var: "STRIPE_API_BASE",
                value: stripe_api_base_raw.clone(),
            })?;
        let log_json: bool = get_env_default("LOG_JSON", false);

        Ok(Self {
            database_url,
            database_max_connections,
            redis_url,
            feature_cache_prefix,
            run_lock_ttl: Duration::from_secs(run_lock_ttl_secs),
            run_at,
            refresh_pending_payments,
            pending_payment_window_days,
            stripe_secret_key,
            stripe_api_base,
            log_json,
        })
    }
}

/// Accepts `HH:MM` or `HH:MM:SS`.
fn parse_run_at(raw: &str) -> Result<NaiveTime, InfraError> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .map_err(|_| InfraError::ConfigInvalid {
            var: "RUN_AT",
            value: raw.to_string(),
        })
}

/// Unset or blank means no window; anything else must be a non-negative day count.
fn parse_window_days(raw: Option<&str>) -> Result<Option<i64>, InfraError> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    match raw.parse::<i64>() {
        Ok(days) if days >= 0 => Ok(Some(days)),
        _ => Err(InfraError::ConfigInvalid {
            var: "PENDING_PAYMENT_WINDOW_DAYS",
            value: raw.to_string(),
        }),
    }
}
