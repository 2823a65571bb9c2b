use chrono::NaiveDate;
use sqlx::{PgConnection, Row};

use crate::{
    app_error::AppResult,
    domain::entities::subscription::{NewSubscription, Package, Subscription},
};

const SELECT_COLS: &str = r#"
    s.id, s.school_id, s.package_id, s.start_date, s.end_date,
    s.charges_cents, s.billing_cycle_days, s.deleted_at, s.created_at, s.updated_at
"#;

fn row_to_subscription(row: sqlx::postgres::PgRow) -> Subscription {
    Subscription {
        id: row.get("id"),
        school_id: row.get("school_id"),
        package_id: row.get("package_id"),
        start_date: row.get("start_date"),
        end_date: row.get("end_date"),
        charges_cents: row.get("charges_cents"),
        billing_cycle_days: row.get("billing_cycle_days"),
        deleted_at: row.get("deleted_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

pub(super) async fn list_unbilled_ending_on(
    conn: &mut PgConnection,
    end_date: NaiveDate,
) -> AppResult<Vec<Subscription>> {
    let rows = sqlx::query(&format!(
        r#"
        SELECT {SELECT_COLS}
        FROM subscriptions s
        WHERE s.end_date = $1
          AND s.deleted_at IS NULL
          AND NOT EXISTS (
              SELECT 1 FROM subscription_bills sb WHERE sb.subscription_id = s.id
          )
        ORDER BY s.id
        "#
    ))
    .bind(end_date)
    .fetch_all(conn)
    .await?;

    Ok(rows.into_iter().map(row_to_subscription).collect())
}

pub(super) async fn current_for_school(
    conn: &mut PgConnection,
    school_id: i64,
    today: NaiveDate,
) -> AppResult<Vec<Subscription>> {
    let rows = sqlx::query(&format!(
        r#"
        SELECT {SELECT_COLS}
        FROM subscriptions s
        WHERE s.school_id = $1
          AND s.start_date <= $2
          AND s.end_date >= $2
          AND s.deleted_at IS NULL
        ORDER BY s.id
        FOR UPDATE
        "#
    ))
    .bind(school_id)
    .bind(today)
    .fetch_all(conn)
    .await?;

    Ok(rows.into_iter().map(row_to_subscription).collect())
}

pub(super) async fn set_end_date(
    conn: &mut PgConnection,
    id: i64,
    end_date: NaiveDate,
) -> AppResult<()> {
    sqlx::query("UPDATE subscriptions SET end_date = $2, updated_at = NOW() WHERE id = $1")
        .bind(id)
        .bind(end_date)
        .execute(conn)
        .await?;
    Ok(())
}

pub(super) async fn delete_future(
    conn: &mut PgConnection,
    school_id: i64,
    today: NaiveDate,
) -> AppResult<u64> {
    let result = sqlx::query("DELETE FROM subscriptions WHERE school_id = $1 AND start_date > $2")
        .bind(school_id)
        .bind(today)
        .execute(conn)
        .await?;
    Ok(result.rows_affected())
}

pub(super) async fn latest_non_trial(
    conn: &mut PgConnection,
    school_id: i64,
) -> AppResult<Option<Subscription>> {
    let row = sqlx::query(&format!(
        r#"
        SELECT {SELECT_COLS}
        FROM subscriptions s
        JOIN packages p ON p.id = s.package_id
        WHERE s.school_id = $1
          AND s.deleted_at IS NULL
          AND p.is_trial = FALSE
        ORDER BY s.end_date DESC, s.id DESC
        LIMIT 1
        "#
    ))
    .bind(school_id)
    .fetch_optional(conn)
    .await?;

    Ok(row.map(row_to_subscription))
}

pub(super) async fn insert(
    conn: &mut PgConnection,
    input: &NewSubscription,
) -> AppResult<Subscription> {
    let row = sqlx::query(&format!(
        r#"
        INSERT INTO subscriptions AS s (
            school_id, package_id, start_date, end_date, charges_cents, billing_cycle_days
        )
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING {SELECT_COLS}
        "#
    ))
    .bind(input.school_id)
    .bind(input.package_id)
    .bind(input.start_date)
    .bind(input.end_date)
    .bind(input.charges_cents)
    .bind(input.billing_cycle_days)
    .fetch_one(conn)
    .await?;

    Ok(row_to_subscription(row))
}

pub(super) async fn update_package(
    conn: &mut PgConnection,
    id: i64,
    package_id: i64,
    charges_cents: i64,
) -> AppResult<Subscription> {
    let row = sqlx::query(&format!(
        r#"
        UPDATE subscriptions AS s
        SET package_id = $2, charges_cents = $3, updated_at = NOW()
        WHERE s.id = $1
        RETURNING {SELECT_COLS}
        "#
    ))
    .bind(id)
    .bind(package_id)
    .bind(charges_cents)
    .fetch_one(conn)
    .await?;

    Ok(row_to_subscription(row))
}

pub(super) async fn delete_features(
    conn: &mut PgConnection,
    subscription_id: i64,
) -> AppResult<u64> {
    let result = sqlx::query("DELETE FROM subscription_features WHERE subscription_id = $1")
        .bind(subscription_id)
        .execute(conn)
        .await?;
    Ok(result.rows_affected())
}

pub(super) async fn get_package(
    conn: &mut PgConnection,
    package_id: i64,
) -> AppResult<Option<Package>> {
    let row = sqlx::query("SELECT id, name, charges_cents, is_trial FROM packages WHERE id = $1")
        .bind(package_id)
        .fetch_optional(conn)
        .await?;

    Ok(row.map(|row| Package {
        id: row.get("id"),
        name: row.get("name"),
        charges_cents: row.get("charges_cents"),
        is_trial: row.get("is_trial"),
    }))
}
