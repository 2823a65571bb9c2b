use async_trait::async_trait;
use chrono::Duration;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::{
        billing_engine::{BillingContext, BillingEngine},
        billing_store::BillingUnit,
    },
    domain::entities::{
        subscription::{CycleFlag, NewSubscription, Subscription},
        subscription_bill::{NewSubscriptionBill, SubscriptionBill},
    },
};

/// Prices bills and cycles from the rows visible in the caller's unit.
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreBillingEngine;

impl StoreBillingEngine {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl BillingEngine for StoreBillingEngine {
    async fn create_subscription_bill(
        &self,
        unit: &mut dyn BillingUnit,
        ctx: BillingContext<'_>,
        subscription: &Subscription,
        cycle: CycleFlag,
    ) -> AppResult<SubscriptionBill> {
        if let Some(existing) = unit.bill_for_subscription(subscription.id).await? {
            tracing::debug!(
                subscription_id = subscription.id,
                bill_id = existing.id,
                "Subscription already billed"
            );
            return Ok(existing);
        }

        let addon_total = unit.active_addon_total(subscription.id).await?;
        let due_date = subscription
            .end_date
            .checked_add_signed(Duration::days(ctx.settings.additional_billing_days))
            .ok_or(AppError::InvalidDate(subscription.end_date))?;

        let bill = unit
            .insert_bill(&NewSubscriptionBill {
                school_id: subscription.school_id,
                subscription_id: subscription.id,
                amount_cents: subscription.charges_cents + addon_total,
                due_date,
                cycle: cycle.as_i16(),
            })
            .await?;

        tracing::debug!(
            school_id = subscription.school_id,
            subscription_id = subscription.id,
            bill_id = bill.id,
            amount_cents = bill.amount_cents,
            %cycle,
            "Bill created"
        );
        Ok(bill)
    }

    async fn create_subscription(
        &self,
        unit: &mut dyn BillingUnit,
        ctx: BillingContext<'_>,
        package_id: i64,
        school_id: i64,
        existing_subscription_id: Option<i64>,
        cycle: CycleFlag,
    ) -> AppResult<Subscription> {
        let package = unit
            .get_package(package_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("package {package_id}")))?;

        if let Some(id) = existing_subscription_id {
            return unit
                .update_subscription_package(id, package.id, package.charges_cents)
                .await;
        }

        let today = ctx.clock.today();
        let cycle_days = ctx.settings.billing_cycle_in_days;
        let end_date = today
            .checked_add_signed(Duration::days(cycle_days - 1))
            .ok_or(AppError::InvalidDate(today))?;
        let billing_cycle_days = i32::try_from(cycle_days)
            .map_err(|_| AppError::InvalidInput(format!("billing cycle of {cycle_days} days")))?;

        let subscription = unit
            .insert_subscription(&NewSubscription {
                school_id,
                package_id: package.id,
                start_date: today,
                end_date,
                charges_cents: package.charges_cents,
                billing_cycle_days,
            })
            .await?;

        tracing::debug!(
            school_id,
            subscription_id = subscription.id,
            package = %package.name,
            %cycle,
            "Subscription cycle created"
        );
        Ok(subscription)
    }
}
