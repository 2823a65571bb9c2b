use async_trait::async_trait;

use crate::{
    app_error::AppResult,
    application::ports::billing_store::BillingUnit,
    domain::entities::{
        run_clock::RunClock,
        school_setting::SystemSettings,
        subscription::{CycleFlag, Subscription},
        subscription_bill::SubscriptionBill,
    },
};

/// Run-wide inputs the engine prices against.
#[derive(Debug, Clone, Copy)]
pub struct BillingContext<'a> {
    pub clock: &'a RunClock,
    pub settings: &'a SystemSettings,
}

/// Computes bills and subscription cycles inside the caller's unit of work.
#[async_trait]
pub trait BillingEngine: Send + Sync {
    /// Bill reflecting the subscription's package price and billing cycle.
    async fn create_subscription_bill(
        &self,
        unit: &mut dyn BillingUnit,
        ctx: BillingContext<'_>,
        subscription: &Subscription,
        cycle: CycleFlag,
    ) -> AppResult<SubscriptionBill>;

    /// Insert a new cycle, or re-price `existing_subscription_id` in place.
    async fn create_subscription(
        &self,
        unit: &mut dyn BillingUnit,
        ctx: BillingContext<'_>,
        package_id: i64,
        school_id: i64,
        existing_subscription_id: Option<i64>,
        cycle: CycleFlag,
    ) -> AppResult<Subscription>;
}
