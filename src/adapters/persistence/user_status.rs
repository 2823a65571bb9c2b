use chrono::NaiveDateTime;
use sqlx::{PgConnection, Row};

use crate::{app_error::AppResult, domain::entities::user_status::UserStatusForNextCycle};

pub(super) async fn for_school(
    conn: &mut PgConnection,
    school_id: i64,
) -> AppResult<Vec<UserStatusForNextCycle>> {
    let rows = sqlx::query(
        r#"
        SELECT id, school_id, user_id, status
        FROM user_status_for_next_cycles
        WHERE school_id = $1
        ORDER BY id
        FOR UPDATE
        "#,
    )
    .bind(school_id)
    .fetch_all(conn)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| UserStatusForNextCycle {
            id: row.get("id"),
            school_id: row.get("school_id"),
            user_id: row.get("user_id"),
            status: row.get("status"),
        })
        .collect())
}

pub(super) async fn enable_users(conn: &mut PgConnection, ids: &[i64]) -> AppResult<u64> {
    let result = sqlx::query(
        "UPDATE users SET deleted_at = NULL, status = 1, updated_at = NOW() WHERE id = ANY($1)",
    )
    .bind(ids)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}

pub(super) async fn disable_users(
    conn: &mut PgConnection,
    ids: &[i64],
    deleted_at: NaiveDateTime,
) -> AppResult<u64> {
    let result = sqlx::query(
        "UPDATE users SET deleted_at = $2, status = 0, updated_at = NOW() WHERE id = ANY($1)",
    )
    .bind(ids)
    .bind(deleted_at)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}

pub(super) async fn clear_for_school(conn: &mut PgConnection, school_id: i64) -> AppResult<u64> {
    let result = sqlx::query("DELETE FROM user_status_for_next_cycles WHERE school_id = $1")
        .bind(school_id)
        .execute(conn)
        .await?;
    Ok(result.rows_affected())
}
