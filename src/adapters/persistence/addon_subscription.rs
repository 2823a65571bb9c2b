use chrono::NaiveDate;
use sqlx::{PgConnection, Postgres, QueryBuilder, Row};

use crate::{
    app_error::{AppError, AppResult},
    domain::entities::addon_subscription::{
        ADDON_STATUS_ACTIVE, ActiveAddon, AddonKey, AddonSubscription, AddonWrite,
    },
};

const SELECT_COLS: &str = r#"
    id, school_id, subscription_id, feature_id, price_cents,
    start_date, end_date, status, created_at
"#;

fn row_to_addon(row: sqlx::postgres::PgRow) -> AddonSubscription {
    AddonSubscription {
        id: row.get("id"),
        school_id: row.get("school_id"),
        subscription_id: row.get("subscription_id"),
        feature_id: row.get("feature_id"),
        price_cents: row.get("price_cents"),
        start_date: row.get("start_date"),
        end_date: row.get("end_date"),
        status: row.get("status"),
        created_at: row.get("created_at"),
    }
}

pub(super) async fn current_for_school(
    conn: &mut PgConnection,
    school_id: i64,
    today: NaiveDate,
) -> AppResult<Vec<AddonSubscription>> {
    let rows = sqlx::query(&format!(
        r#"
        SELECT {SELECT_COLS}
        FROM addon_subscriptions
        WHERE school_id = $1 AND start_date <= $2 AND end_date >= $2
        ORDER BY id
        FOR UPDATE
        "#
    ))
    .bind(school_id)
    .bind(today)
    .fetch_all(conn)
    .await?;

    Ok(rows.into_iter().map(row_to_addon).collect())
}

pub(super) async fn set_end_date(
    conn: &mut PgConnection,
    id: i64,
    end_date: NaiveDate,
) -> AppResult<()> {
    sqlx::query("UPDATE addon_subscriptions SET end_date = $2, updated_at = NOW() WHERE id = $1")
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
    let result =
        sqlx::query("DELETE FROM addon_subscriptions WHERE school_id = $1 AND start_date > $2")
            .bind(school_id)
            .bind(today)
            .execute(conn)
            .await?;
    Ok(result.rows_affected())
}

pub(super) async fn ids_ending_on(
    conn: &mut PgConnection,
    school_id: i64,
    end_date: NaiveDate,
) -> AppResult<Vec<i64>> {
    let rows = sqlx::query(
        "SELECT id FROM addon_subscriptions WHERE school_id = $1 AND end_date = $2 ORDER BY id",
    )
    .bind(school_id)
    .bind(end_date)
    .fetch_all(conn)
    .await?;

    Ok(rows.into_iter().map(|row| row.get("id")).collect())
}

/// Joined with the add-on catalog so the migrated price is the current one.
/// An active add-on without a catalog price is a data-integrity error.
pub(super) async fn active_of_subscription(
    conn: &mut PgConnection,
    school_id: i64,
    subscription_id: i64,
) -> AppResult<Vec<ActiveAddon>> {
    let rows = sqlx::query(
        r#"
        SELECT a_s.id, a_s.feature_id, a.price_cents AS current_price_cents
        FROM addon_subscriptions a_s
        LEFT JOIN addons a ON a.feature_id = a_s.feature_id
        WHERE a_s.school_id = $1
          AND a_s.subscription_id = $2
          AND a_s.status = $3
        ORDER BY a_s.feature_id
        "#,
    )
    .bind(school_id)
    .bind(subscription_id)
    .bind(ADDON_STATUS_ACTIVE)
    .fetch_all(conn)
    .await?;

    rows.into_iter()
        .map(|row| {
            let addon_subscription_id: i64 = row.get("id");
            let feature_id: i64 = row.get("feature_id");
            let price: Option<i64> = row.get("current_price_cents");
            let current_price_cents = price.ok_or_else(|| {
                AppError::DataIntegrity(format!(
                    "add-on subscription {} has no catalog price for feature {}",
                    addon_subscription_id, feature_id
                ))
            })?;
            Ok(ActiveAddon {
                addon_subscription_id,
                feature_id,
                current_price_cents,
            })
        })
        .collect()
}

pub(super) async fn active_total(conn: &mut PgConnection, subscription_id: i64) -> AppResult<i64> {
    let row = sqlx::query(
        r#"
        SELECT COALESCE(SUM(price_cents), 0)::BIGINT AS total
        FROM addon_subscriptions
        WHERE subscription_id = $1 AND status = $2
        "#,
    )
    .bind(subscription_id)
    .bind(ADDON_STATUS_ACTIVE)
    .fetch_one(conn)
    .await?;

    Ok(row.get("total"))
}

pub(super) async fn by_keys(
    conn: &mut PgConnection,
    keys: &[AddonKey],
) -> AppResult<Vec<AddonSubscription>> {
    if keys.is_empty() {
        return Ok(Vec::new());
    }

    let mut builder: QueryBuilder<'_, Postgres> = QueryBuilder::new(format!(
        "SELECT {SELECT_COLS} FROM addon_subscriptions WHERE (school_id, feature_id, end_date) IN "
    ));
    builder.push_tuples(keys, |mut tuple, key| {
        tuple
            .push_bind(key.school_id)
            .push_bind(key.feature_id)
            .push_bind(key.end_date);
    });
    builder.push(" ORDER BY id FOR UPDATE");

    let rows = builder.build().fetch_all(conn).await?;
    Ok(rows.into_iter().map(row_to_addon).collect())
}

pub(super) async fn write(conn: &mut PgConnection, write: &AddonWrite) -> AppResult<i64> {
    let row = match write {
        AddonWrite::Insert(row) => {
            sqlx::query(
                r#"
                INSERT INTO addon_subscriptions (
                    school_id, feature_id, price_cents, start_date, end_date, status, subscription_id
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                RETURNING id
                "#,
            )
            .bind(row.school_id)
            .bind(row.feature_id)
            .bind(row.price_cents)
            .bind(row.start_date)
            .bind(row.end_date)
            .bind(row.status)
            .bind(row.subscription_id)
            .fetch_one(conn)
            .await?
        }
        AddonWrite::Update { id, row } => {
            sqlx::query(
                r#"
                UPDATE addon_subscriptions
                SET price_cents = $2, start_date = $3, status = $4, subscription_id = $5,
                    updated_at = NOW()
                WHERE id = $1
                RETURNING id
                "#,
            )
            .bind(id)
            .bind(row.price_cents)
            .bind(row.start_date)
            .bind(row.status)
            .bind(row.subscription_id)
            .fetch_one(conn)
            .await?
        }
    };

    Ok(row.get("id"))
}

pub(super) async fn delete_many(conn: &mut PgConnection, ids: &[i64]) -> AppResult<u64> {
    if ids.is_empty() {
        return Ok(0);
    }
    let result = sqlx::query("DELETE FROM addon_subscriptions WHERE id = ANY($1)")
        .bind(ids)
        .execute(conn)
        .await?;
    Ok(result.rows_affected())
}
