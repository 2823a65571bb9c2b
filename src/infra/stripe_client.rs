use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use url::Url;

use super::InfraError;
use crate::{
    app_error::{AppError, AppResult},
    application::ports::payment_gateway::PaymentGateway,
    domain::entities::payment_status::{PaymentStatus, PaymentTransaction},
};

pub const STRIPE_GATEWAY: &str = "stripe";

#[derive(Debug, Deserialize)]
pub struct StripePaymentIntent {
    pub id: String,
    pub status: String,
}

#[derive(Debug, Deserialize)]
struct StripeErrorResponse {
    error: StripeError,
}

#[derive(Debug, Deserialize)]
struct StripeError {
    message: Option<String>,
    #[serde(rename = "type")]
    error_type: String,
}

/// Looks up payment intents with the platform's secret key.
#[derive(Clone)]
pub struct StripePaymentGateway {
    client: Client,
    secret_key: Option<SecretString>,
    api_base: Url,
}

impl StripePaymentGateway {
    pub fn new(secret_key: Option<SecretString>, api_base: Url) -> Result<Self, InfraError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(InfraError::HttpClient)?;
        Ok(Self {
            client,
            secret_key,
            api_base,
        })
    }

    fn auth_header(secret_key: &SecretString) -> String {
        use base64::Engine;
        let encoded = base64::engine::general_purpose::STANDARD
            .encode(format!("{}:", secret_key.expose_secret()));
        format!("Basic {}", encoded)
    }

    pub async fn retrieve_payment_intent(
        &self,
        secret_key: &SecretString,
        payment_intent_id: &str,
    ) -> AppResult<StripePaymentIntent> {
        let response = self
            .client
            .get(format!(
                "{}/payment_intents/{}",
                self.api_base.as_str().trim_end_matches('/'),
                payment_intent_id
            ))
            .header("Authorization", Self::auth_header(secret_key))
            .send()
            .await
            .map_err(|e| AppError::PaymentGateway(format!("Stripe request failed: {}", e)))?;

        self.handle_response(response).await
    }

    async fn handle_response<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
    ) -> AppResult<T> {
        let status = response.status();
        let body = response.text().await.map_err(|e| {
            AppError::PaymentGateway(format!("Failed to read Stripe response: {}", e))
        })?;

        if !status.is_success() {
            tracing::warn!(status = %status, "Stripe API error");

            if let Ok(error) = serde_json::from_str::<StripeErrorResponse>(&body) {
                return Err(AppError::PaymentGateway(format!(
                    "Stripe error: {}",
                    error.error.message.unwrap_or(error.error.error_type)
                )));
            }

            return Err(AppError::PaymentGateway(format!(
                "Stripe API error: {} - {}",
                status, body
            )));
        }

        serde_json::from_str(&body).map_err(|e| {
            tracing::error!(error = %e, "Failed to parse Stripe response");
            AppError::PaymentGateway(format!("Failed to parse Stripe response: {}", e))
        })
    }
}

#[async_trait]
impl PaymentGateway for StripePaymentGateway {
    async fn retrieve_payment_status(
        &self,
        transaction: &PaymentTransaction,
    ) -> AppResult<PaymentStatus> {
        if !transaction
            .payment_gateway
            .eq_ignore_ascii_case(STRIPE_GATEWAY)
        {
            return Err(AppError::UnsupportedGateway(
                transaction.payment_gateway.clone(),
            ));
        }
        let Some(secret_key) = &self.secret_key else {
            return Err(AppError::UnsupportedGateway(format!(
                "{} (no secret key configured)",
                transaction.payment_gateway
            )));
        };
        let order_id = transaction
            .order_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| {
                AppError::PaymentGateway(format!(
                    "transaction {} has no payment intent id",
                    transaction.id
                ))
            })?;

        let intent = self.retrieve_payment_intent(secret_key, order_id).await?;
        Ok(PaymentStatus::from_stripe_intent_status(&intent.status))
    }
}
