//! In-memory implementation of the billing store.
//!
//! A unit works on a private copy of the tables and swaps it in on commit, so
//! rolled-back units leave no trace.

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use crate::{
    app_error::{AppError, AppResult},
    application::{
        ports::billing_store::{BillingStore, BillingUnit, UnclearBill},
        use_cases::payment_refresh::PaymentTransactionRepo,
    },
    domain::entities::{
        addon_subscription::{ActiveAddon, AddonKey, AddonSubscription, AddonWrite},
        payment_status::{PaymentStatus, PaymentTransaction},
        school_setting::{SchoolSetting, SystemSettings},
        subscription::{NewSubscription, Package, Subscription},
        subscription_bill::{NewSubscriptionBill, SubscriptionBill},
        user_status::{User, UserStatusForNextCycle},
    },
};

const GENERATED_ID_BASE: i64 = 1_000_000;

#[derive(Debug, Clone, Default)]
pub struct BillingTables {
    pub subscriptions: BTreeMap<i64, Subscription>,
    pub packages: BTreeMap<i64, Package>,
    /// (subscription_id, feature_id)
    pub subscription_features: Vec<(i64, i64)>,
    pub bills: BTreeMap<i64, SubscriptionBill>,
    /// Bill ids with a recorded payment.
    pub bill_payments: BTreeSet<i64>,
    pub transactions: BTreeMap<i64, PaymentTransaction>,
    /// Catalog price per feature id.
    pub addon_prices: BTreeMap<i64, i64>,
    pub addons: BTreeMap<i64, AddonSubscription>,
    pub school_settings: BTreeMap<(i64, String), SchoolSetting>,
    pub system_settings: SystemSettings,
    pub users: BTreeMap<i64, User>,
    pub user_statuses: BTreeMap<i64, UserStatusForNextCycle>,
    generated: i64,
}

impl BillingTables {
    fn allocate_id(&mut self) -> i64 {
        self.generated += 1;
        GENERATED_ID_BASE + self.generated
    }
}

// ============================================================================
// InMemoryBillingStore
// ============================================================================

#[derive(Default)]
pub struct InMemoryBillingStore {
    tables: Arc<Mutex<BillingTables>>,
    failing_school: Mutex<Option<i64>>,
}

impl InMemoryBillingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_system_settings(self, settings: SystemSettings) -> Self {
        self.tables.lock().unwrap().system_settings = settings;
        self
    }

    /// Make the closing writes of every unit touching `school_id` fail.
    pub fn fail_writes_for_school(&self, school_id: i64) {
        *self.failing_school.lock().unwrap() = Some(school_id);
    }

    // ------------------------------------------------------------------
    // Seeding
    // ------------------------------------------------------------------

    pub fn insert_subscription(&self, subscription: Subscription) {
        self.tables
            .lock()
            .unwrap()
            .subscriptions
            .insert(subscription.id, subscription);
    }

    pub fn insert_package(&self, package: Package) {
        self.tables
            .lock()
            .unwrap()
            .packages
            .insert(package.id, package);
    }

    pub fn insert_subscription_feature(&self, subscription_id: i64, feature_id: i64) {
        self.tables
            .lock()
            .unwrap()
            .subscription_features
            .push((subscription_id, feature_id));
    }

    pub fn insert_bill(&self, bill: SubscriptionBill) {
        self.tables.lock().unwrap().bills.insert(bill.id, bill);
    }

    pub fn insert_bill_payment(&self, bill_id: i64) {
        self.tables.lock().unwrap().bill_payments.insert(bill_id);
    }

    pub fn insert_transaction(&self, transaction: PaymentTransaction) {
        self.tables
            .lock()
            .unwrap()
            .transactions
            .insert(transaction.id, transaction);
    }

    pub fn set_catalog_price(&self, feature_id: i64, price_cents: i64) {
        self.tables
            .lock()
            .unwrap()
            .addon_prices
            .insert(feature_id, price_cents);
    }

    pub fn insert_addon(&self, addon: AddonSubscription) {
        self.tables.lock().unwrap().addons.insert(addon.id, addon);
    }

    pub fn set_school_setting(&self, school_id: i64, name: &str, data: &str) {
        let mut tables = self.tables.lock().unwrap();
        let id = tables.allocate_id();
        tables.school_settings.insert(
            (school_id, name.to_string()),
            SchoolSetting {
                id,
                school_id,
                name: name.to_string(),
                data: data.to_string(),
            },
        );
    }

    pub fn remove_school_setting(&self, school_id: i64, name: &str) {
        self.tables
            .lock()
            .unwrap()
            .school_settings
            .remove(&(school_id, name.to_string()));
    }

    pub fn insert_user(&self, user: User) {
        self.tables.lock().unwrap().users.insert(user.id, user);
    }

    pub fn insert_user_status(&self, school_id: i64, user_id: i64, status: i16) {
        let mut tables = self.tables.lock().unwrap();
        let id = tables.allocate_id();
        tables.user_statuses.insert(
            id,
            UserStatusForNextCycle {
                id,
                school_id,
                user_id,
                status,
            },
        );
    }

    // ------------------------------------------------------------------
    // Assertions
    // ------------------------------------------------------------------

    pub fn subscription(&self, id: i64) -> Option<Subscription> {
        self.tables.lock().unwrap().subscriptions.get(&id).cloned()
    }

    pub fn subscriptions_for(&self, school_id: i64) -> Vec<Subscription> {
        self.tables
            .lock()
            .unwrap()
            .subscriptions
            .values()
            .filter(|s| s.school_id == school_id)
            .cloned()
            .collect()
    }

    pub fn subscription_features(&self, subscription_id: i64) -> Vec<i64> {
        self.tables
            .lock()
            .unwrap()
            .subscription_features
            .iter()
            .filter(|(sub, _)| *sub == subscription_id)
            .map(|(_, feature)| *feature)
            .collect()
    }

    pub fn bills_for_subscription(&self, subscription_id: i64) -> Vec<SubscriptionBill> {
        self.tables
            .lock()
            .unwrap()
            .bills
            .values()
            .filter(|b| b.subscription_id == subscription_id)
            .cloned()
            .collect()
    }

    pub fn transaction(&self, id: i64) -> Option<PaymentTransaction> {
        self.tables.lock().unwrap().transactions.get(&id).cloned()
    }

    pub fn addon(&self, id: i64) -> Option<AddonSubscription> {
        self.tables.lock().unwrap().addons.get(&id).cloned()
    }

    pub fn addons_for(&self, school_id: i64) -> Vec<AddonSubscription> {
        self.tables
            .lock()
            .unwrap()
            .addons
            .values()
            .filter(|a| a.school_id == school_id)
            .cloned()
            .collect()
    }

    pub fn school_setting_data(&self, school_id: i64, name: &str) -> Option<String> {
        self.tables
            .lock()
            .unwrap()
            .school_settings
            .get(&(school_id, name.to_string()))
            .map(|s| s.data.clone())
    }

    pub fn user(&self, id: i64) -> Option<User> {
        self.tables.lock().unwrap().users.get(&id).cloned()
    }

    pub fn user_statuses_for(&self, school_id: i64) -> Vec<UserStatusForNextCycle> {
        self.tables
            .lock()
            .unwrap()
            .user_statuses
            .values()
            .filter(|s| s.school_id == school_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl BillingStore for InMemoryBillingStore {
    async fn system_settings(&self) -> AppResult<SystemSettings> {
        Ok(self.tables.lock().unwrap().system_settings)
    }

    async fn list_unclear_bills(&self, due_before: NaiveDate) -> AppResult<Vec<UnclearBill>> {
        let tables = self.tables.lock().unwrap();
        let mut bills: Vec<UnclearBill> = tables
            .bills
            .values()
            .filter(|b| b.due_date < due_before)
            .filter(|b| !tables.bill_payments.contains(&b.id))
            .filter(|b| {
                !b.payment_transaction_id
                    .and_then(|tx| tables.transactions.get(&tx))
                    .is_some_and(|tx| tx.payment_status.is_successful())
            })
            .map(|b| UnclearBill {
                bill_id: b.id,
                school_id: b.school_id,
                subscription_id: b.subscription_id,
                due_date: b.due_date,
            })
            .collect();
        bills.sort_by_key(|b| (b.school_id, b.bill_id));
        Ok(bills)
    }

    async fn list_unbilled_subscriptions_ending_on(
        &self,
        end_date: NaiveDate,
    ) -> AppResult<Vec<Subscription>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .subscriptions
            .values()
            .filter(|s| s.deleted_at.is_none() && s.end_date == end_date)
            .filter(|s| !tables.bills.values().any(|b| b.subscription_id == s.id))
            .cloned()
            .collect())
    }

    async fn begin_unit(&self) -> AppResult<Box<dyn BillingUnit>> {
        let working = self.tables.lock().unwrap().clone();
        Ok(Box::new(InMemoryBillingUnit {
            shared: self.tables.clone(),
            working,
            failing_school: *self.failing_school.lock().unwrap(),
        }))
    }
}

#[async_trait]
impl PaymentTransactionRepo for InMemoryBillingStore {
    async fn list_pending(
        &self,
        since: Option<NaiveDateTime>,
    ) -> AppResult<Vec<PaymentTransaction>> {
        let mut pending: Vec<PaymentTransaction> = self
            .tables
            .lock()
            .unwrap()
            .transactions
            .values()
            .filter(|t| t.payment_status == PaymentStatus::Pending)
            .filter(|t| match (since, t.created_at) {
                (Some(since), Some(created_at)) => created_at >= since,
                _ => true,
            })
            .cloned()
            .collect();
        pending.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(pending)
    }

    async fn update_status(&self, id: i64, status: PaymentStatus) -> AppResult<()> {
        let mut tables = self.tables.lock().unwrap();
        let transaction = tables
            .transactions
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("payment transaction {id}")))?;
        transaction.payment_status = status;
        Ok(())
    }
}

// ============================================================================
// InMemoryBillingUnit
// ============================================================================

pub struct InMemoryBillingUnit {
    shared: Arc<Mutex<BillingTables>>,
    working: BillingTables,
    failing_school: Option<i64>,
}

impl InMemoryBillingUnit {
    fn check_writable(&self, school_id: i64) -> AppResult<()> {
        if self.failing_school == Some(school_id) {
            return Err(AppError::Database(format!(
                "injected write failure for school {school_id}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl BillingUnit for InMemoryBillingUnit {
    async fn current_subscriptions(
        &mut self,
        school_id: i64,
        today: NaiveDate,
    ) -> AppResult<Vec<Subscription>> {
        Ok(self
            .working
            .subscriptions
            .values()
            .filter(|s| s.school_id == school_id && s.deleted_at.is_none() && s.is_current(today))
            .cloned()
            .collect())
    }

    async fn set_subscription_end_date(&mut self, id: i64, end_date: NaiveDate) -> AppResult<()> {
        let subscription = self
            .working
            .subscriptions
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("subscription {id}")))?;
        subscription.end_date = end_date;
        Ok(())
    }

    async fn delete_future_subscriptions(
        &mut self,
        school_id: i64,
        today: NaiveDate,
    ) -> AppResult<u64> {
        let billed = self.working.bills.values().find(|b| {
            self.working
                .subscriptions
                .get(&b.subscription_id)
                .is_some_and(|s| s.school_id == school_id && s.is_future(today))
        });
        if let Some(bill) = billed {
            return Err(AppError::DataIntegrity(format!(
                "subscription {} is referenced by bill {}",
                bill.subscription_id, bill.id
            )));
        }
        let before = self.working.subscriptions.len();
        self.working
            .subscriptions
            .retain(|_, s| !(s.school_id == school_id && s.is_future(today)));
        Ok((before - self.working.subscriptions.len()) as u64)
    }

    async fn latest_non_trial_subscription(
        &mut self,
        school_id: i64,
    ) -> AppResult<Option<Subscription>> {
        let packages = &self.working.packages;
        Ok(self
            .working
            .subscriptions
            .values()
            .filter(|s| s.school_id == school_id && s.deleted_at.is_none())
            .filter(|s| packages.get(&s.package_id).is_some_and(|p| !p.is_trial))
            .max_by_key(|s| (s.end_date, s.id))
            .cloned())
    }

    async fn insert_subscription(&mut self, input: &NewSubscription) -> AppResult<Subscription> {
        let id = self.working.allocate_id();
        let subscription = Subscription {
            id,
            school_id: input.school_id,
            package_id: input.package_id,
            start_date: input.start_date,
            end_date: input.end_date,
            charges_cents: input.charges_cents,
            billing_cycle_days: input.billing_cycle_days,
            deleted_at: None,
            created_at: None,
            updated_at: None,
        };
        self.working.subscriptions.insert(id, subscription.clone());
        Ok(subscription)
    }

    async fn update_subscription_package(
        &mut self,
        id: i64,
        package_id: i64,
        charges_cents: i64,
    ) -> AppResult<Subscription> {
        let subscription = self
            .working
            .subscriptions
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("subscription {id}")))?;
        subscription.package_id = package_id;
        subscription.charges_cents = charges_cents;
        Ok(subscription.clone())
    }

    async fn delete_subscription_features(&mut self, subscription_id: i64) -> AppResult<u64> {
        let before = self.working.subscription_features.len();
        self.working
            .subscription_features
            .retain(|(sub, _)| *sub != subscription_id);
        Ok((before - self.working.subscription_features.len()) as u64)
    }

    async fn get_package(&mut self, package_id: i64) -> AppResult<Option<Package>> {
        Ok(self.working.packages.get(&package_id).cloned())
    }

    async fn bill_for_subscription(
        &mut self,
        subscription_id: i64,
    ) -> AppResult<Option<SubscriptionBill>> {
        Ok(self
            .working
            .bills
            .values()
            .find(|b| b.subscription_id == subscription_id)
            .cloned())
    }

    async fn insert_bill(&mut self, input: &NewSubscriptionBill) -> AppResult<SubscriptionBill> {
        if self
            .working
            .bills
            .values()
            .any(|b| b.subscription_id == input.subscription_id)
        {
            return Err(AppError::DataIntegrity(format!(
                "subscription {} already billed",
                input.subscription_id
            )));
        }
        let id = self.working.allocate_id();
        let bill = SubscriptionBill {
            id,
            school_id: input.school_id,
            subscription_id: input.subscription_id,
            amount_cents: input.amount_cents,
            due_date: input.due_date,
            payment_transaction_id: None,
            created_at: None,
        };
        self.working.bills.insert(id, bill.clone());
        Ok(bill)
    }

    async fn current_addons(
        &mut self,
        school_id: i64,
        today: NaiveDate,
    ) -> AppResult<Vec<AddonSubscription>> {
        Ok(self
            .working
            .addons
            .values()
            .filter(|a| a.school_id == school_id && a.is_current(today))
            .cloned()
            .collect())
    }

    async fn set_addon_end_date(&mut self, id: i64, end_date: NaiveDate) -> AppResult<()> {
        let addon = self
            .working
            .addons
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("addon subscription {id}")))?;
        addon.end_date = end_date;
        Ok(())
    }

    async fn delete_future_addons(&mut self, school_id: i64, today: NaiveDate) -> AppResult<u64> {
        let before = self.working.addons.len();
        self.working
            .addons
            .retain(|_, a| !(a.school_id == school_id && a.is_future(today)));
        Ok((before - self.working.addons.len()) as u64)
    }

    async fn addon_ids_ending_on(
        &mut self,
        school_id: i64,
        end_date: NaiveDate,
    ) -> AppResult<Vec<i64>> {
        Ok(self
            .working
            .addons
            .values()
            .filter(|a| a.school_id == school_id && a.end_date == end_date)
            .map(|a| a.id)
            .collect())
    }

    async fn active_addons_of_subscription(
        &mut self,
        school_id: i64,
        subscription_id: i64,
    ) -> AppResult<Vec<ActiveAddon>> {
        let prices = &self.working.addon_prices;
        self.working
            .addons
            .values()
            .filter(|a| {
                a.school_id == school_id
                    && a.subscription_id == Some(subscription_id)
                    && a.is_active()
            })
            .map(|a| {
                let price = prices.get(&a.feature_id).ok_or_else(|| {
                    AppError::DataIntegrity(format!(
                        "add-on subscription {} has no catalog price for feature {}",
                        a.id, a.feature_id
                    ))
                })?;
                Ok(ActiveAddon {
                    addon_subscription_id: a.id,
                    feature_id: a.feature_id,
                    current_price_cents: *price,
                })
            })
            .collect()
    }

    async fn active_addon_total(&mut self, subscription_id: i64) -> AppResult<i64> {
        Ok(self
            .working
            .addons
            .values()
            .filter(|a| a.subscription_id == Some(subscription_id) && a.is_active())
            .map(|a| a.price_cents)
            .sum())
    }

    async fn addons_by_keys(&mut self, keys: &[AddonKey]) -> AppResult<Vec<AddonSubscription>> {
        Ok(self
            .working
            .addons
            .values()
            .filter(|a| keys.contains(&a.key()))
            .cloned()
            .collect())
    }

    async fn write_addon(&mut self, write: &AddonWrite) -> AppResult<i64> {
        match write {
            AddonWrite::Insert(row) => {
                let key = row.key();
                if self.working.addons.values().any(|a| a.key() == key) {
                    return Err(AppError::DataIntegrity(format!(
                        "duplicate add-on key for feature {}",
                        row.feature_id
                    )));
                }
                let id = self.working.allocate_id();
                self.working.addons.insert(
                    id,
                    AddonSubscription {
                        id,
                        school_id: row.school_id,
                        subscription_id: Some(row.subscription_id),
                        feature_id: row.feature_id,
                        price_cents: row.price_cents,
                        start_date: row.start_date,
                        end_date: row.end_date,
                        status: row.status,
                        created_at: None,
                    },
                );
                Ok(id)
            }
            AddonWrite::Update { id, row } => {
                let addon = self
                    .working
                    .addons
                    .get_mut(id)
                    .ok_or_else(|| AppError::NotFound(format!("addon subscription {id}")))?;
                addon.price_cents = row.price_cents;
                addon.start_date = row.start_date;
                addon.status = row.status;
                addon.subscription_id = Some(row.subscription_id);
                Ok(*id)
            }
        }
    }

    async fn delete_addons(&mut self, ids: &[i64]) -> AppResult<u64> {
        let mut removed = 0;
        for id in ids {
            if self.working.addons.remove(id).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn school_setting(
        &mut self,
        school_id: i64,
        name: &str,
    ) -> AppResult<Option<SchoolSetting>> {
        Ok(self
            .working
            .school_settings
            .get(&(school_id, name.to_string()))
            .cloned())
    }

    async fn update_school_setting(
        &mut self,
        school_id: i64,
        name: &str,
        data: &str,
    ) -> AppResult<()> {
        self.check_writable(school_id)?;
        if let Some(setting) = self
            .working
            .school_settings
            .get_mut(&(school_id, name.to_string()))
        {
            setting.data = data.to_string();
        }
        Ok(())
    }

    async fn user_statuses_for_next_cycle(
        &mut self,
        school_id: i64,
    ) -> AppResult<Vec<UserStatusForNextCycle>> {
        Ok(self
            .working
            .user_statuses
            .values()
            .filter(|s| s.school_id == school_id)
            .cloned()
            .collect())
    }

    async fn enable_users(&mut self, ids: &[i64]) -> AppResult<u64> {
        let mut updated = 0;
        for id in ids {
            if let Some(user) = self.working.users.get_mut(id) {
                user.deleted_at = None;
                user.status = 1;
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn disable_users(&mut self, ids: &[i64], deleted_at: NaiveDateTime) -> AppResult<u64> {
        let mut updated = 0;
        for id in ids {
            if let Some(user) = self.working.users.get_mut(id) {
                user.deleted_at = Some(deleted_at);
                user.status = 0;
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn clear_user_statuses_for_next_cycle(&mut self, school_id: i64) -> AppResult<u64> {
        self.check_writable(school_id)?;
        let before = self.working.user_statuses.len();
        self.working
            .user_statuses
            .retain(|_, s| s.school_id != school_id);
        Ok((before - self.working.user_statuses.len()) as u64)
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        let unit = *self;
        *unit.shared.lock().unwrap() = unit.working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> AppResult<()> {
        Ok(())
    }
}
