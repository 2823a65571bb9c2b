use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Status of a gateway payment attempt.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    sqlx::Type,
    AsRefStr,
    Display,
    EnumString,
)]
#[sqlx(type_name = "payment_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum PaymentStatus {
    #[default]
    Pending,
    Succeed,
    Failed,
}

impl PaymentStatus {
    /// Convert from a Stripe PaymentIntent status string
    pub fn from_stripe_intent_status(s: &str) -> Self {
        match s {
            "succeeded" => PaymentStatus::Succeed,
            "canceled" => PaymentStatus::Failed,
            // processing, requires_payment_method, requires_confirmation,
            // requires_action, requires_capture
            _ => PaymentStatus::Pending,
        }
    }

    pub fn is_successful(&self) -> bool {
        matches!(self, PaymentStatus::Succeed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentTransaction {
    pub id: i64,
    pub school_id: i64,
    pub payment_gateway: String,
    pub order_id: Option<String>,
    pub payment_status: PaymentStatus,
    pub created_at: Option<NaiveDateTime>,
}
