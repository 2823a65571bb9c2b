use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionBill {
    pub id: i64,
    pub school_id: i64,
    pub subscription_id: i64,
    pub amount_cents: i64,
    pub due_date: NaiveDate,
    pub payment_transaction_id: Option<i64>,
    pub created_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone)]
pub struct NewSubscriptionBill {
    pub school_id: i64,
    pub subscription_id: i64,
    pub amount_cents: i64,
    pub due_date: NaiveDate,
    pub cycle: i16,
}
