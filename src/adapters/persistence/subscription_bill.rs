use chrono::NaiveDate;
use sqlx::{PgConnection, Row};

use crate::{
    app_error::AppResult,
    application::ports::billing_store::UnclearBill,
    domain::entities::subscription_bill::{NewSubscriptionBill, SubscriptionBill},
};

const SELECT_COLS: &str = r#"
    id, school_id, subscription_id, amount_cents, due_date, payment_transaction_id, created_at
"#;

fn row_to_bill(row: sqlx::postgres::PgRow) -> SubscriptionBill {
    SubscriptionBill {
        id: row.get("id"),
        school_id: row.get("school_id"),
        subscription_id: row.get("subscription_id"),
        amount_cents: row.get("amount_cents"),
        due_date: row.get("due_date"),
        payment_transaction_id: row.get("payment_transaction_id"),
        created_at: row.get("created_at"),
    }
}

/// Overdue bills with neither a payment record nor a succeeded transaction.
pub(super) async fn list_unclear(
    conn: &mut PgConnection,
    due_before: NaiveDate,
) -> AppResult<Vec<UnclearBill>> {
    let rows = sqlx::query(
        r#"
        SELECT sb.id, sb.school_id, sb.subscription_id, sb.due_date
        FROM subscription_bills sb
        LEFT JOIN payment_transactions pt ON pt.id = sb.payment_transaction_id
        WHERE sb.due_date < $1
          AND NOT EXISTS (
              SELECT 1 FROM subscription_bill_payments sbp
              WHERE sbp.subscription_bill_id = sb.id
          )
          AND (pt.id IS NULL OR pt.payment_status <> 'succeed')
        ORDER BY sb.school_id, sb.id
        "#,
    )
    .bind(due_before)
    .fetch_all(conn)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| UnclearBill {
            bill_id: row.get("id"),
            school_id: row.get("school_id"),
            subscription_id: row.get("subscription_id"),
            due_date: row.get("due_date"),
        })
        .collect())
}

pub(super) async fn for_subscription(
    conn: &mut PgConnection,
    subscription_id: i64,
) -> AppResult<Option<SubscriptionBill>> {
    let row = sqlx::query(&format!(
        "SELECT {SELECT_COLS} FROM subscription_bills WHERE subscription_id = $1"
    ))
    .bind(subscription_id)
    .fetch_optional(conn)
    .await?;

    Ok(row.map(row_to_bill))
}

pub(super) async fn insert(
    conn: &mut PgConnection,
    input: &NewSubscriptionBill,
) -> AppResult<SubscriptionBill> {
    let row = sqlx::query(&format!(
        r#"
        INSERT INTO subscription_bills (school_id, subscription_id, amount_cents, due_date, cycle)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING {SELECT_COLS}
        "#
    ))
    .bind(input.school_id)
    .bind(input.subscription_id)
    .bind(input.amount_cents)
    .bind(input.due_date)
    .bind(input.cycle)
    .fetch_one(conn)
    .await?;

    Ok(row_to_bill(row))
}
