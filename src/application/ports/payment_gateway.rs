use async_trait::async_trait;

use crate::{
    app_error::AppResult,
    domain::entities::payment_status::{PaymentStatus, PaymentTransaction},
};

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Current status of the transaction's payment intent at the gateway.
    ///
    /// Returns `AppError::UnsupportedGateway` for transactions this gateway cannot look up,
    /// and `AppError::PaymentGateway` when the lookup itself failed.
    async fn retrieve_payment_status(
        &self,
        transaction: &PaymentTransaction,
    ) -> AppResult<PaymentStatus>;
}
