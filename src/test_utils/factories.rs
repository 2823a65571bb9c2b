//! Test data factories.
//!
//! Each factory returns a complete, valid row with a fresh id. Use the closure
//! parameter to override specific fields.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{NaiveDate, NaiveDateTime};

use crate::domain::entities::{
    addon_subscription::{ADDON_STATUS_ACTIVE, AddonSubscription},
    payment_status::{PaymentStatus, PaymentTransaction},
    subscription::{Package, Subscription},
    subscription_bill::SubscriptionBill,
    user_status::User,
};

/// Ids handed out by factories. The in-memory store allocates far above this range.
fn next_id() -> i64 {
    static NEXT: AtomicI64 = AtomicI64::new(1);
    NEXT.fetch_add(1, Ordering::Relaxed)
}

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid test date")
}

fn test_datetime() -> NaiveDateTime {
    NaiveDateTime::parse_from_str("2024-01-01 08:00:00", "%Y-%m-%d %H:%M:%S").unwrap()
}

/// Create a test subscription covering January 2024.
pub fn create_test_subscription(
    school_id: i64,
    overrides: impl FnOnce(&mut Subscription),
) -> Subscription {
    let mut subscription = Subscription {
        id: next_id(),
        school_id,
        package_id: 1,
        start_date: date(2024, 1, 1),
        end_date: date(2024, 1, 31),
        charges_cents: 5_000,
        billing_cycle_days: 30,
        deleted_at: None,
        created_at: Some(test_datetime()),
        updated_at: Some(test_datetime()),
    };
    overrides(&mut subscription);
    subscription
}

/// Create a paid, non-trial package.
pub fn create_test_package(overrides: impl FnOnce(&mut Package)) -> Package {
    let mut package = Package {
        id: next_id(),
        name: "Standard".to_string(),
        charges_cents: 5_000,
        is_trial: false,
    };
    overrides(&mut package);
    package
}

/// Create an active add-on covering January 2024.
pub fn create_test_addon(
    school_id: i64,
    overrides: impl FnOnce(&mut AddonSubscription),
) -> AddonSubscription {
    let mut addon = AddonSubscription {
        id: next_id(),
        school_id,
        subscription_id: None,
        feature_id: 1,
        price_cents: 500,
        start_date: date(2024, 1, 1),
        end_date: date(2024, 1, 31),
        status: ADDON_STATUS_ACTIVE,
        created_at: Some(test_datetime()),
    };
    overrides(&mut addon);
    addon
}

/// Create an unpaid bill with no transaction attached.
pub fn create_test_bill(
    school_id: i64,
    subscription_id: i64,
    overrides: impl FnOnce(&mut SubscriptionBill),
) -> SubscriptionBill {
    let mut bill = SubscriptionBill {
        id: next_id(),
        school_id,
        subscription_id,
        amount_cents: 5_000,
        due_date: date(2024, 1, 31),
        payment_transaction_id: None,
        created_at: Some(test_datetime()),
    };
    overrides(&mut bill);
    bill
}

/// Create a pending Stripe transaction.
pub fn create_test_transaction(
    school_id: i64,
    overrides: impl FnOnce(&mut PaymentTransaction),
) -> PaymentTransaction {
    let id = next_id();
    let mut transaction = PaymentTransaction {
        id,
        school_id,
        payment_gateway: "stripe".to_string(),
        order_id: Some(format!("pi_test_{id}")),
        payment_status: PaymentStatus::Pending,
        created_at: Some(test_datetime()),
    };
    overrides(&mut transaction);
    transaction
}

/// Create an enabled user of the school.
pub fn create_test_user(school_id: i64, overrides: impl FnOnce(&mut User)) -> User {
    let mut user = User {
        id: next_id(),
        school_id: Some(school_id),
        status: 1,
        deleted_at: None,
    };
    overrides(&mut user);
    user
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factories_hand_out_distinct_ids() {
        let a = create_test_subscription(1, |_| {});
        let b = create_test_subscription(1, |_| {});
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn overrides_are_applied() {
        let addon = create_test_addon(3, |a| {
            a.feature_id = 9;
            a.status = 0;
        });
        assert_eq!(addon.school_id, 3);
        assert_eq!(addon.feature_id, 9);
        assert!(!addon.is_active());
    }
}
