use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Distinguishes a fresh purchase from a cycle generated by the billing run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CycleFlag {
    Purchase,
    Renewal,
}

impl CycleFlag {
    /// Integer form stored next to generated bills.
    pub fn as_i16(&self) -> i16 {
        match self {
            CycleFlag::Purchase => 0,
            CycleFlag::Renewal => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Subscription {
    pub id: i64,
    pub school_id: i64,
    pub package_id: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub charges_cents: i64,
    pub billing_cycle_days: i32,
    pub deleted_at: Option<NaiveDateTime>,
    pub created_at: Option<NaiveDateTime>,
    pub updated_at: Option<NaiveDateTime>,
}

impl Subscription {
    /// start_date <= today <= end_date
    pub fn is_current(&self, today: NaiveDate) -> bool {
        self.start_date <= today && today <= self.end_date
    }

    /// Upcoming plan that has not started yet.
    pub fn is_future(&self, today: NaiveDate) -> bool {
        self.start_date > today
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Package {
    pub id: i64,
    pub name: String,
    pub charges_cents: i64,
    pub is_trial: bool,
}

/// Input for inserting a new subscription cycle.
#[derive(Debug, Clone)]
pub struct NewSubscription {
    pub school_id: i64,
    pub package_id: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub charges_cents: i64,
    pub billing_cycle_days: i32,
}
