use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use sqlx::{Postgres, Transaction};

use crate::{
    adapters::persistence::{
        PostgresPersistence, addon_subscription, school_setting, subscription, subscription_bill,
        user_status,
    },
    app_error::AppResult,
    application::ports::billing_store::{BillingStore, BillingUnit, UnclearBill},
    domain::entities::{
        addon_subscription::{ActiveAddon, AddonKey, AddonSubscription, AddonWrite},
        school_setting::{SchoolSetting, SystemSettings},
        subscription::{NewSubscription, Package, Subscription},
        subscription_bill::{NewSubscriptionBill, SubscriptionBill},
        user_status::UserStatusForNextCycle,
    },
};

#[async_trait]
impl BillingStore for PostgresPersistence {
    async fn system_settings(&self) -> AppResult<SystemSettings> {
        let mut conn = self.pool().acquire().await?;
        school_setting::system_settings(&mut conn).await
    }

    async fn list_unclear_bills(&self, due_before: NaiveDate) -> AppResult<Vec<UnclearBill>> {
        let mut conn = self.pool().acquire().await?;
        subscription_bill::list_unclear(&mut conn, due_before).await
    }

    async fn list_unbilled_subscriptions_ending_on(
        &self,
        end_date: NaiveDate,
    ) -> AppResult<Vec<Subscription>> {
        let mut conn = self.pool().acquire().await?;
        subscription::list_unbilled_ending_on(&mut conn, end_date).await
    }

    async fn begin_unit(&self) -> AppResult<Box<dyn BillingUnit>> {
        let tx = self.pool().begin().await?;
        Ok(Box::new(PostgresBillingUnit { tx }))
    }
}

/// One database transaction; dropping it without `commit` rolls back.
pub struct PostgresBillingUnit {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl BillingUnit for PostgresBillingUnit {
    async fn current_subscriptions(
        &mut self,
        school_id: i64,
        today: NaiveDate,
    ) -> AppResult<Vec<Subscription>> {
        subscription::current_for_school(&mut self.tx, school_id, today).await
    }

    async fn set_subscription_end_date(&mut self, id: i64, end_date: NaiveDate) -> AppResult<()> {
        subscription::set_end_date(&mut self.tx, id, end_date).await
    }

    async fn delete_future_subscriptions(
        &mut self,
        school_id: i64,
        today: NaiveDate,
    ) -> AppResult<u64> {
        subscription::delete_future(&mut self.tx, school_id, today).await
    }

    async fn latest_non_trial_subscription(
        &mut self,
        school_id: i64,
    ) -> AppResult<Option<Subscription>> {
        subscription::latest_non_trial(&mut self.tx, school_id).await
    }

    async fn insert_subscription(&mut self, input: &NewSubscription) -> AppResult<Subscription> {
        subscription::insert(&mut self.tx, input).await
    }

    async fn update_subscription_package(
        &mut self,
        id: i64,
        package_id: i64,
        charges_cents: i64,
    ) -> AppResult<Subscription> {
        subscription::update_package(&mut self.tx, id, package_id, charges_cents).await
    }

    async fn delete_subscription_features(&mut self, subscription_id: i64) -> AppResult<u64> {
        subscription::delete_features(&mut self.tx, subscription_id).await
    }

    async fn get_package(&mut self, package_id: i64) -> AppResult<Option<Package>> {
        subscription::get_package(&mut self.tx, package_id).await
    }

    async fn bill_for_subscription(
        &mut self,
        subscription_id: i64,
    ) -> AppResult<Option<SubscriptionBill>> {
        subscription_bill::for_subscription(&mut self.tx, subscription_id).await
    }

    async fn insert_bill(&mut self, input: &NewSubscriptionBill) -> AppResult<SubscriptionBill> {
        subscription_bill::insert(&mut self.tx, input).await
    }

    async fn current_addons(
        &mut self,
        school_id: i64,
        today: NaiveDate,
    ) -> AppResult<Vec<AddonSubscription>> {
        addon_subscription::current_for_school(&mut self.tx, school_id, today).await
    }

    async fn set_addon_end_date(&mut self, id: i64, end_date: NaiveDate) -> AppResult<()> {
        addon_subscription::set_end_date(&mut self.tx, id, end_date).await
    }

    async fn delete_future_addons(&mut self, school_id: i64, today: NaiveDate) -> AppResult<u64> {
        addon_subscription::delete_future(&mut self.tx, school_id, today).await
    }

    async fn addon_ids_ending_on(
        &mut self,
        school_id: i64,
        end_date: NaiveDate,
    ) -> AppResult<Vec<i64>> {
        addon_subscription::ids_ending_on(&mut self.tx, school_id, end_date).await
    }

    async fn active_addons_of_subscription(
        &mut self,
        school_id: i64,
        subscription_id: i64,
    ) -> AppResult<Vec<ActiveAddon>> {
        addon_subscription::active_of_subscription(&mut self.tx, school_id, subscription_id).await
    }

    async fn active_addon_total(&mut self, subscription_id: i64) -> AppResult<i64> {
        addon_subscription::active_total(&mut self.tx, subscription_id).await
    }

    async fn addons_by_keys(&mut self, keys: &[AddonKey]) -> AppResult<Vec<AddonSubscription>> {
        addon_subscription::by_keys(&mut self.tx, keys).await
    }

    async fn write_addon(&mut self, write: &AddonWrite) -> AppResult<i64> {
        addon_subscription::write(&mut self.tx, write).await
    }

    async fn delete_addons(&mut self, ids: &[i64]) -> AppResult<u64> {
        addon_subscription::delete_many(&mut self.tx, ids).await
    }

    async fn school_setting(
        &mut self,
        school_id: i64,
        name: &str,
    ) -> AppResult<Option<SchoolSetting>> {
        school_setting::get(&mut self.tx, school_id, name).await
    }

    async fn update_school_setting(
        &mut self,
        school_id: i64,
        name: &str,
        data: &str,
    ) -> AppResult<()> {
        school_setting::update(&mut self.tx, school_id, name, data).await
    }

    async fn user_statuses_for_next_cycle(
        &mut self,
        school_id: i64,
    ) -> AppResult<Vec<UserStatusForNextCycle>> {
        user_status::for_school(&mut self.tx, school_id).await
    }

    async fn enable_users(&mut self, ids: &[i64]) -> AppResult<u64> {
        user_status::enable_users(&mut self.tx, ids).await
    }

    async fn disable_users(&mut self, ids: &[i64], deleted_at: NaiveDateTime) -> AppResult<u64> {
        user_status::disable_users(&mut self.tx, ids, deleted_at).await
    }

    async fn clear_user_statuses_for_next_cycle(&mut self, school_id: i64) -> AppResult<u64> {
        user_status::clear_for_school(&mut self.tx, school_id).await
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> AppResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
