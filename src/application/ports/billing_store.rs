use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};

use crate::{
    app_error::AppResult,
    domain::entities::{
        addon_subscription::{ActiveAddon, AddonKey, AddonSubscription, AddonWrite},
        school_setting::{SchoolSetting, SystemSettings},
        subscription::{NewSubscription, Package, Subscription},
        subscription_bill::{NewSubscriptionBill, SubscriptionBill},
        user_status::UserStatusForNextCycle,
    },
};

/// Overdue bill with no successful payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnclearBill {
    pub bill_id: i64,
    pub school_id: i64,
    pub subscription_id: i64,
    pub due_date: NaiveDate,
}

/// Entry point to the billing tables. Reads here run outside any unit.
#[async_trait]
pub trait BillingStore: Send + Sync {
    /// Read-only snapshot of the global billing settings.
    async fn system_settings(&self) -> AppResult<SystemSettings>;

    /// Bills with `due_date < due_before`, no payment record, and no succeeded transaction.
    async fn list_unclear_bills(&self, due_before: NaiveDate) -> AppResult<Vec<UnclearBill>>;

    /// Subscriptions ending exactly on `end_date` that have no bill yet, ordered by id.
    async fn list_unbilled_subscriptions_ending_on(
        &self,
        end_date: NaiveDate,
    ) -> AppResult<Vec<Subscription>>;

    /// Start a unit of work. Nothing it writes is visible until `commit`.
    async fn begin_unit(&self) -> AppResult<Box<dyn BillingUnit>>;
}

/// Transactional view of the billing tables for one school.
#[async_trait]
pub trait BillingUnit: Send {
    // ------------------------------------------------------------------
    // Subscriptions
    // ------------------------------------------------------------------

    /// Subscriptions of the school with `start_date <= today <= end_date`, ordered by id.
    async fn current_subscriptions(
        &mut self,
        school_id: i64,
        today: NaiveDate,
    ) -> AppResult<Vec<Subscription>>;

    async fn set_subscription_end_date(&mut self, id: i64, end_date: NaiveDate) -> AppResult<()>;

    /// Hard-deletes subscriptions with `start_date > today`. Returns the number removed.
    async fn delete_future_subscriptions(&mut self, school_id: i64, today: NaiveDate)
    -> AppResult<u64>;

    /// Most recent (by end_date) subscription of the school on a non-trial package.
    async fn latest_non_trial_subscription(
        &mut self,
        school_id: i64,
    ) -> AppResult<Option<Subscription>>;

    async fn insert_subscription(&mut self, input: &NewSubscription) -> AppResult<Subscription>;

    async fn update_subscription_package(
        &mut self,
        id: i64,
        package_id: i64,
        charges_cents: i64,
    ) -> AppResult<Subscription>;

    async fn delete_subscription_features(&mut self, subscription_id: i64) -> AppResult<u64>;

    async fn get_package(&mut self, package_id: i64) -> AppResult<Option<Package>>;

    // ------------------------------------------------------------------
    // Bills
    // ------------------------------------------------------------------

    async fn bill_for_subscription(
        &mut self,
        subscription_id: i64,
    ) -> AppResult<Option<SubscriptionBill>>;

    async fn insert_bill(&mut self, input: &NewSubscriptionBill) -> AppResult<SubscriptionBill>;

    // ------------------------------------------------------------------
    // Add-ons
    // ------------------------------------------------------------------

    async fn current_addons(
        &mut self,
        school_id: i64,
        today: NaiveDate,
    ) -> AppResult<Vec<AddonSubscription>>;

    async fn set_addon_end_date(&mut self, id: i64, end_date: NaiveDate) -> AppResult<()>;

    async fn delete_future_addons(&mut self, school_id: i64, today: NaiveDate) -> AppResult<u64>;

    async fn addon_ids_ending_on(&mut self, school_id: i64, end_date: NaiveDate)
    -> AppResult<Vec<i64>>;

    /// Active add-ons of a subscription with the current catalog price of each feature.
    async fn active_addons_of_subscription(
        &mut self,
        school_id: i64,
        subscription_id: i64,
    ) -> AppResult<Vec<ActiveAddon>>;

    /// Sum of the active add-on prices attached to a subscription.
    async fn active_addon_total(&mut self, subscription_id: i64) -> AppResult<i64>;

    async fn addons_by_keys(&mut self, keys: &[AddonKey]) -> AppResult<Vec<AddonSubscription>>;

    /// Apply one merge result. Returns the id of the written row.
    async fn write_addon(&mut self, write: &AddonWrite) -> AppResult<i64>;

    async fn delete_addons(&mut self, ids: &[i64]) -> AppResult<u64>;

    // ------------------------------------------------------------------
    // Settings
    // ------------------------------------------------------------------

    async fn school_setting(&mut self, school_id: i64, name: &str)
    -> AppResult<Option<SchoolSetting>>;

    async fn update_school_setting(&mut self, school_id: i64, name: &str, data: &str)
    -> AppResult<()>;

    // ------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------

    async fn user_statuses_for_next_cycle(
        &mut self,
        school_id: i64,
    ) -> AppResult<Vec<UserStatusForNextCycle>>;

    /// Clears `deleted_at` and sets status 1, including soft-deleted users.
    async fn enable_users(&mut self, ids: &[i64]) -> AppResult<u64>;

    /// Sets `deleted_at` and status 0, including already soft-deleted users.
    async fn disable_users(&mut self, ids: &[i64], deleted_at: NaiveDateTime) -> AppResult<u64>;

    async fn clear_user_statuses_for_next_cycle(&mut self, school_id: i64) -> AppResult<u64>;

    // ------------------------------------------------------------------
    // Unit lifecycle
    // ------------------------------------------------------------------

    async fn commit(self: Box<Self>) -> AppResult<()>;

    async fn rollback(self: Box<Self>) -> AppResult<()>;
}
