use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, NaiveTime};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::instrument;
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::{
        ports::{
            billing_engine::{BillingContext, BillingEngine},
            billing_store::{BillingStore, BillingUnit},
            feature_cache::FeatureCache,
            run_lock::RunLock,
        },
        use_cases::payment_refresh::{PaymentRefreshUseCases, RefreshSummary},
    },
    domain::entities::{
        addon_subscription::{AddonKey, AddonUpsert, merge_addon_upserts},
        run_clock::RunClock,
        school_setting::AUTO_RENEWAL_PLAN,
        subscription::{CycleFlag, Subscription},
        subscription_bill::SubscriptionBill,
        user_status::UserToggles,
    },
};

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Clone)]
pub struct BillingRunConfig {
    pub lock_ttl: Duration,
    pub refresh_pending_payments: bool,
    /// Only pending transactions created within this many days are re-checked.
    pub pending_payment_window_days: Option<i64>,
}

impl Default for BillingRunConfig {
    fn default() -> Self {
        Self {
            lock_ttl: Duration::from_secs(3600),
            refresh_pending_payments: true,
            pending_payment_window_days: None,
        }
    }
}

/// Outcome counts of the school units of one phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PhaseSummary {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub as_of: NaiveDate,
    /// Another run held the lock; nothing was done.
    pub skipped_locked: bool,
    pub cancelled: bool,
    #[serde(skip)]
    pub payments: Option<RefreshSummary>,
    pub reconciliation: PhaseSummary,
    pub renewal: PhaseSummary,
    pub sweep: PhaseSummary,
    pub bills_generated: usize,
    pub subscriptions_renewed: usize,
    pub payments_refreshed: usize,
}

impl RunSummary {
    fn new(run_id: Uuid, as_of: NaiveDate) -> Self {
        Self {
            run_id,
            as_of,
            skipped_locked: false,
            cancelled: false,
            payments: None,
            reconciliation: PhaseSummary::default(),
            renewal: PhaseSummary::default(),
            sweep: PhaseSummary::default(),
            bills_generated: 0,
            subscriptions_renewed: 0,
            payments_refreshed: 0,
        }
    }

    pub fn failed_units(&self) -> usize {
        self.reconciliation.failed + self.renewal.failed + self.sweep.failed
    }
}

/// Ids carried from the reconciliation phase into the renewal phase of one run.
#[derive(Debug, Default)]
pub struct RunState {
    terminated_subscription_ids: BTreeSet<i64>,
    unclear_addon_ids: BTreeMap<i64, BTreeSet<i64>>,
    deleted_addon_ids: HashSet<i64>,
}

impl RunState {
    fn record_termination(&mut self, school_id: i64, termination: &Termination) {
        self.terminated_subscription_ids
            .extend(termination.subscription_ids.iter().copied());
        if !termination.addon_ids.is_empty() {
            self.unclear_addon_ids
                .entry(school_id)
                .or_default()
                .extend(termination.addon_ids.iter().copied());
        }
    }

    fn record_deleted(&mut self, ids: &[i64]) {
        self.deleted_addon_ids.extend(ids.iter().copied());
    }

    fn was_terminated(&self, subscription_id: i64) -> bool {
        self.terminated_subscription_ids.contains(&subscription_id)
    }

    /// Unclear-bill add-ons of the school not deleted yet in this run.
    pub fn pending_unclear_addons(&self, school_id: i64) -> Vec<i64> {
        self.unclear_addon_ids
            .get(&school_id)
            .map(|ids| {
                ids.iter()
                    .copied()
                    .filter(|id| !self.deleted_addon_ids.contains(id))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn schools_with_pending_unclear_addons(&self) -> Vec<i64> {
        self.unclear_addon_ids
            .keys()
            .copied()
            .filter(|school_id| !self.pending_unclear_addons(*school_id).is_empty())
            .collect()
    }
}

#[derive(Debug, Default)]
struct Termination {
    subscription_ids: Vec<i64>,
    addon_ids: Vec<i64>,
    future_subscriptions_deleted: u64,
    future_addons_deleted: u64,
}

#[derive(Debug)]
struct RenewalOutcome {
    bill: SubscriptionBill,
    renewed: Option<Subscription>,
    deleted_addon_ids: Vec<i64>,
    toggles: UserToggles,
}

// ============================================================================
// Use Cases
// ============================================================================

#[derive(Clone)]
pub struct BillingRunUseCases {
    store: Arc<dyn BillingStore>,
    engine: Arc<dyn BillingEngine>,
    cache: Arc<dyn FeatureCache>,
    lock: Arc<dyn RunLock>,
    payments: Option<PaymentRefreshUseCases>,
    config: BillingRunConfig,
}

impl BillingRunUseCases {
    pub fn new(
        store: Arc<dyn BillingStore>,
        engine: Arc<dyn BillingEngine>,
        cache: Arc<dyn FeatureCache>,
        lock: Arc<dyn RunLock>,
        payments: Option<PaymentRefreshUseCases>,
        config: BillingRunConfig,
    ) -> Self {
        Self {
            store,
            engine,
            cache,
            lock,
            payments,
            config,
        }
    }

    /// Execute one billing run as of `as_of`.
    ///
    /// School units that fail or are skipped are counted in the summary; only a
    /// failure to list the work of a phase aborts the run.
    #[instrument(skip(self, cancel))]
    pub async fn run(&self, as_of: NaiveDate, cancel: &CancellationToken) -> AppResult<RunSummary> {
        let clock = RunClock::new(as_of).ok_or(AppError::InvalidDate(as_of))?;
        let mut summary = RunSummary::new(Uuid::new_v4(), as_of);

        let Some(lease) = self.lock.try_acquire(self.config.lock_ttl).await? else {
            tracing::warn!(
                run_id = %summary.run_id,
                "Another billing run holds the lock, skipping"
            );
            summary.skipped_locked = true;
            return Ok(summary);
        };

        tracing::info!(run_id = %summary.run_id, %as_of, "Billing run started");

        let result = self.run_locked(&clock, cancel, &mut summary).await;

        if let Err(e) = self.lock.release(lease).await {
            tracing::warn!(run_id = %summary.run_id, error = %e, "Failed to release run lock");
        }
        result?;

        tracing::info!(
            run_id = %summary.run_id,
            %as_of,
            cancelled = summary.cancelled,
            reconciled = summary.reconciliation.processed,
            reconcile_skipped = summary.reconciliation.skipped,
            reconcile_failed = summary.reconciliation.failed,
            renewed_units = summary.renewal.processed,
            renewal_skipped = summary.renewal.skipped,
            renewal_failed = summary.renewal.failed,
            swept = summary.sweep.processed,
            sweep_failed = summary.sweep.failed,
            bills_generated = summary.bills_generated,
            subscriptions_renewed = summary.subscriptions_renewed,
            payments_refreshed = summary.payments_refreshed,
            "Billing run finished"
        );

        Ok(summary)
    }

    async fn run_locked(
        &self,
        clock: &RunClock,
        cancel: &CancellationToken,
        summary: &mut RunSummary,
    ) -> AppResult<()> {
        let payments = self
            .payments
            .as_ref()
            .filter(|_| self.config.refresh_pending_payments);
        if let Some(payments) = payments {
            let since = self
                .config
                .pending_payment_window_days
                .and_then(|days| clock.today().checked_sub_signed(chrono::Duration::days(days)))
                .map(|day| day.and_time(NaiveTime::MIN));
            let refreshed = payments.refresh_pending(since).await?;
            tracing::info!(
                checked = refreshed.checked,
                updated = refreshed.updated,
                failed_lookups = refreshed.failed_lookups,
                "Pending payments refreshed"
            );
            summary.payments_refreshed = refreshed.updated;
            summary.payments = Some(refreshed);
        }

        let settings = self.store.system_settings().await?;
        let ctx = BillingContext {
            clock,
            settings: &settings,
        };
        let mut state = RunState::default();

        self.reconcile_unpaid_bills(ctx, &mut state, cancel, summary)
            .await?;
        if summary.cancelled {
            return Ok(());
        }

        self.renew_expiring_subscriptions(ctx, &mut state, cancel, summary)
            .await?;
        if summary.cancelled {
            return Ok(());
        }

        self.sweep_unclear_addons(&mut state, cancel, summary).await;
        Ok(())
    }

    // ========================================================================
    // Phase 1: unpaid-bill reconciliation
    // ========================================================================

    async fn reconcile_unpaid_bills(
        &self,
        ctx: BillingContext<'_>,
        state: &mut RunState,
        cancel: &CancellationToken,
        summary: &mut RunSummary,
    ) -> AppResult<()> {
        // Grace days are already part of the bill's due date.
        let due_before = ctx.clock.today();

        let bills = self.store.list_unclear_bills(due_before).await?;
        let schools: BTreeSet<i64> = bills.iter().map(|b| b.school_id).collect();
        tracing::info!(
            bills = bills.len(),
            schools = schools.len(),
            %due_before,
            "Reconciling unclear bills"
        );

        for school_id in schools {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }

            let mut unit = match self.store.begin_unit().await {
                Ok(unit) => unit,
                Err(e) => {
                    tracing::error!(school_id, error = %e, "Failed to open reconciliation unit");
                    summary.reconciliation.failed += 1;
                    continue;
                }
            };
            let result = Self::terminate_school_plan(unit.as_mut(), ctx.clock, school_id).await;

            if let Some(termination) = self
                .finish_unit("reconciliation", school_id, unit, result, &mut summary.reconciliation)
                .await
            {
                tracing::info!(
                    school_id,
                    terminated_subscriptions = termination.subscription_ids.len(),
                    terminated_addons = termination.addon_ids.len(),
                    future_subscriptions_deleted = termination.future_subscriptions_deleted,
                    future_addons_deleted = termination.future_addons_deleted,
                    "School plan terminated for unclear bill"
                );
                state.record_termination(school_id, &termination);
            }
        }

        Ok(())
    }

    async fn terminate_school_plan(
        unit: &mut dyn BillingUnit,
        clock: &RunClock,
        school_id: i64,
    ) -> AppResult<Termination> {
        if unit
            .school_setting(school_id, AUTO_RENEWAL_PLAN)
            .await?
            .is_none()
        {
            return Err(AppError::MissingConfiguration {
                school_id,
                name: AUTO_RENEWAL_PLAN,
            });
        }

        let today = clock.today();
        let yesterday = clock.yesterday();
        let mut termination = Termination::default();

        for subscription in unit.current_subscriptions(school_id, today).await? {
            unit.set_subscription_end_date(subscription.id, yesterday)
                .await?;
            termination.subscription_ids.push(subscription.id);
        }
        termination.future_subscriptions_deleted =
            unit.delete_future_subscriptions(school_id, today).await?;

        for addon in unit.current_addons(school_id, today).await? {
            unit.set_addon_end_date(addon.id, yesterday).await?;
            termination.addon_ids.push(addon.id);
        }
        termination.future_addons_deleted = unit.delete_future_addons(school_id, today).await?;

        unit.update_school_setting(school_id, AUTO_RENEWAL_PLAN, "0")
            .await?;

        Ok(termination)
    }

    // ========================================================================
    // Phase 2: renewal & bill generation
    // ========================================================================

    async fn renew_expiring_subscriptions(
        &self,
        ctx: BillingContext<'_>,
        state: &mut RunState,
        cancel: &CancellationToken,
        summary: &mut RunSummary,
    ) -> AppResult<()> {
        let subscriptions = self
            .store
            .list_unbilled_subscriptions_ending_on(ctx.clock.yesterday())
            .await?;
        tracing::info!(
            subscriptions = subscriptions.len(),
            ending_on = %ctx.clock.yesterday(),
            "Generating bills for expired subscriptions"
        );

        for subscription in subscriptions {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }

            let school_id = subscription.school_id;
            let unclear_addons = state.pending_unclear_addons(school_id);

            let mut unit = match self.store.begin_unit().await {
                Ok(unit) => unit,
                Err(e) => {
                    tracing::error!(school_id, error = %e, "Failed to open renewal unit");
                    summary.renewal.failed += 1;
                    continue;
                }
            };
            let result = self
                .renew_subscription(unit.as_mut(), ctx, &subscription, &unclear_addons)
                .await;

            if let Some(outcome) = self
                .finish_unit("renewal", school_id, unit, result, &mut summary.renewal)
                .await
            {
                state.record_deleted(&outcome.deleted_addon_ids);
                summary.bills_generated += 1;
                if outcome.renewed.is_some() {
                    summary.subscriptions_renewed += 1;
                }
                tracing::info!(
                    school_id,
                    subscription_id = subscription.id,
                    bill_id = outcome.bill.id,
                    renewed_subscription_id = outcome.renewed.as_ref().map(|s| s.id),
                    early_terminated = state.was_terminated(subscription.id),
                    deleted_addons = outcome.deleted_addon_ids.len(),
                    users_enabled = outcome.toggles.enable.len(),
                    users_disabled = outcome.toggles.disable.len(),
                    "Subscription billed"
                );
            }
        }

        Ok(())
    }

    async fn renew_subscription(
        &self,
        unit: &mut dyn BillingUnit,
        ctx: BillingContext<'_>,
        expired: &Subscription,
        unclear_addons: &[i64],
    ) -> AppResult<RenewalOutcome> {
        let school_id = expired.school_id;
        let today = ctx.clock.today();

        let bill = self
            .engine
            .create_subscription_bill(unit, ctx, expired, CycleFlag::Renewal)
            .await?;

        let candidates = unit.addon_ids_ending_on(school_id, expired.end_date).await?;
        unit.delete_subscription_features(expired.id).await?;

        let auto_renewal = unit
            .school_setting(school_id, AUTO_RENEWAL_PLAN)
            .await?
            .is_some_and(|setting| setting.is_enabled());

        let mut migrated = HashSet::new();
        let mut renewed = None;
        if auto_renewal {
            let next_cycle = unit
                .current_subscriptions(school_id, today)
                .await?
                .into_iter()
                .next();

            let target = match next_cycle {
                None => match unit.latest_non_trial_subscription(school_id).await? {
                    Some(template) => {
                        let created = self
                            .engine
                            .create_subscription(
                                unit,
                                ctx,
                                template.package_id,
                                school_id,
                                None,
                                CycleFlag::Renewal,
                            )
                            .await?;
                        Some((created, today))
                    }
                    None => {
                        tracing::info!(school_id, "No paid subscription to renew from");
                        None
                    }
                },
                Some(next) => {
                    tracing::debug!(
                        school_id,
                        next_subscription_id = next.id,
                        "Next cycle already selected, updating its charges"
                    );
                    let updated = self
                        .engine
                        .create_subscription(
                            unit,
                            ctx,
                            next.package_id,
                            school_id,
                            Some(next.id),
                            CycleFlag::Renewal,
                        )
                        .await?;
                    let start = updated.start_date;
                    Some((updated, start))
                }
            };

            if let Some((target, start_date)) = target {
                migrated = Self::migrate_addons(unit, expired, &target, start_date).await?;
                renewed = Some(target);
            }
        }

        let mut deleted_addon_ids: Vec<i64> = candidates
            .into_iter()
            .filter(|id| !migrated.contains(id))
            .collect();
        if !deleted_addon_ids.is_empty() {
            unit.delete_addons(&deleted_addon_ids).await?;
        }

        let toggles = Self::apply_user_toggles(unit, ctx.clock, school_id).await?;

        let leftover: Vec<i64> = unclear_addons
            .iter()
            .copied()
            .filter(|id| !deleted_addon_ids.contains(id) && !migrated.contains(id))
            .collect();
        if !leftover.is_empty() {
            unit.delete_addons(&leftover).await?;
            deleted_addon_ids.extend(leftover);
        }

        Ok(RenewalOutcome {
            bill,
            renewed,
            deleted_addon_ids,
            toggles,
        })
    }

    /// Upsert the expired subscription's active add-ons into `target`.
    /// Returns the ids of the rows written.
    async fn migrate_addons(
        unit: &mut dyn BillingUnit,
        expired: &Subscription,
        target: &Subscription,
        start_date: NaiveDate,
    ) -> AppResult<HashSet<i64>> {
        let school_id = expired.school_id;
        let active = unit
            .active_addons_of_subscription(school_id, expired.id)
            .await?;
        if active.is_empty() {
            return Ok(HashSet::new());
        }

        let incoming: Vec<AddonUpsert> = active
            .iter()
            .map(|addon| {
                AddonUpsert::migrate(school_id, addon, target.id, start_date, target.end_date)
            })
            .collect();
        let keys: Vec<AddonKey> = incoming.iter().map(AddonUpsert::key).collect();
        let existing = unit.addons_by_keys(&keys).await?;
        let writes = merge_addon_upserts(&existing, incoming)?;

        let mut written = HashSet::with_capacity(writes.len());
        for write in &writes {
            written.insert(unit.write_addon(write).await?);
        }
        Ok(written)
    }

    /// Apply and consume the school's deferred enable/disable directives.
    async fn apply_user_toggles(
        unit: &mut dyn BillingUnit,
        clock: &RunClock,
        school_id: i64,
    ) -> AppResult<UserToggles> {
        let rows = unit.user_statuses_for_next_cycle(school_id).await?;
        let toggles = UserToggles::partition(&rows);

        if !toggles.enable.is_empty() {
            unit.enable_users(&toggles.enable).await?;
        }
        if !toggles.disable.is_empty() {
            unit.disable_users(&toggles.disable, clock.disable_cutoff())
                .await?;
        }
        unit.clear_user_statuses_for_next_cycle(school_id).await?;

        Ok(toggles)
    }

    // ========================================================================
    // Unclear add-on sweep
    // ========================================================================

    /// Delete unclear-bill add-ons of schools the renewal phase did not reach.
    async fn sweep_unclear_addons(
        &self,
        state: &mut RunState,
        cancel: &CancellationToken,
        summary: &mut RunSummary,
    ) {
        for school_id in state.schools_with_pending_unclear_addons() {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }

            let ids = state.pending_unclear_addons(school_id);
            let mut unit = match self.store.begin_unit().await {
                Ok(unit) => unit,
                Err(e) => {
                    tracing::error!(school_id, error = %e, "Failed to open sweep unit");
                    summary.sweep.failed += 1;
                    continue;
                }
            };
            let result = unit.delete_addons(&ids).await;

            if self
                .finish_unit("unclear_addon_sweep", school_id, unit, result, &mut summary.sweep)
                .await
                .is_some()
            {
                state.record_deleted(&ids);
            }
        }
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// Commit on success, roll back on error, then count the outcome.
    /// The school's feature cache is invalidated after every commit.
    async fn finish_unit<T>(
        &self,
        phase: &'static str,
        school_id: i64,
        unit: Box<dyn BillingUnit>,
        result: AppResult<T>,
        counts: &mut PhaseSummary,
    ) -> Option<T> {
        match result {
            Ok(value) => match unit.commit().await {
                Ok(()) => {
                    counts.processed += 1;
                    self.invalidate_features(school_id).await;
                    Some(value)
                }
                Err(e) => {
                    tracing::error!(phase, school_id, error = %e, "Failed to commit school unit");
                    counts.failed += 1;
                    None
                }
            },
            Err(e) => {
                if let Err(rollback_err) = unit.rollback().await {
                    tracing::warn!(phase, school_id, error = %rollback_err, "Rollback failed");
                }
                if e.is_skip() {
                    tracing::warn!(phase, school_id, error = %e, "Skipping school unit");
                    counts.skipped += 1;
                } else {
                    tracing::error!(
                        phase,
                        school_id,
                        error = %e,
                        error_code = e.code().as_str(),
                        "School unit failed, changes rolled back"
                    );
                    counts.failed += 1;
                }
                None
            }
        }
    }

    async fn invalidate_features(&self, school_id: i64) {
        if let Err(e) = self.cache.invalidate_school_features(school_id).await {
            tracing::warn!(school_id, error = %e, "Failed to invalidate school feature cache");
        }
    }
}
