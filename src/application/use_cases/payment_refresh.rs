use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use tracing::instrument;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::payment_gateway::PaymentGateway,
    domain::entities::payment_status::{PaymentStatus, PaymentTransaction},
};

// ============================================================================
// Repository Traits
// ============================================================================

#[async_trait]
pub trait PaymentTransactionRepo: Send + Sync {
    /// Pending transactions, newest first. `since` limits to rows created after it.
    async fn list_pending(&self, since: Option<NaiveDateTime>)
    -> AppResult<Vec<PaymentTransaction>>;

    async fn update_status(&self, id: i64, status: PaymentStatus) -> AppResult<()>;
}

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    pub checked: usize,
    pub updated: usize,
    pub failed_lookups: usize,
    pub unsupported: usize,
    pub store_errors: usize,
}

// ============================================================================
// Use Cases
// ============================================================================

#[derive(Clone)]
pub struct PaymentRefreshUseCases {
    repo: Arc<dyn PaymentTransactionRepo>,
    gateway: Arc<dyn PaymentGateway>,
}

impl PaymentRefreshUseCases {
    pub fn new(repo: Arc<dyn PaymentTransactionRepo>, gateway: Arc<dyn PaymentGateway>) -> Self {
        Self { repo, gateway }
    }

    /// Re-check every pending transaction against the gateway.
    ///
    /// A failed lookup degrades the transaction to `failed`; one bad row never
    /// stops the others.
    #[instrument(skip(self))]
    pub async fn refresh_pending(&self, since: Option<NaiveDateTime>) -> AppResult<RefreshSummary> {
        let pending = self.repo.list_pending(since).await?;
        let mut summary = RefreshSummary::default();

        for transaction in pending {
            summary.checked += 1;

            let new_status = match self.gateway.retrieve_payment_status(&transaction).await {
                Ok(PaymentStatus::Pending) => continue,
                Ok(status) => status,
                Err(AppError::UnsupportedGateway(gateway)) => {
                    tracing::debug!(
                        transaction_id = transaction.id,
                        gateway = %gateway,
                        "Skipping transaction on unsupported gateway"
                    );
                    summary.unsupported += 1;
                    continue;
                }
                Err(e) => {
                    tracing::warn!(
                        transaction_id = transaction.id,
                        school_id = transaction.school_id,
                        error = %e,
                        "Payment status lookup failed, marking transaction failed"
                    );
                    summary.failed_lookups += 1;
                    PaymentStatus::Failed
                }
            };

            match self.repo.update_status(transaction.id, new_status).await {
                Ok(()) => summary.updated += 1,
                Err(e) => {
                    tracing::error!(
                        transaction_id = transaction.id,
                        error = %e,
                        "Failed to store refreshed payment status"
                    );
                    summary.store_errors += 1;
                }
            }
        }

        Ok(summary)
    }
}
