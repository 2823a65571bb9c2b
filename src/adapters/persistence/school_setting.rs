use sqlx::{PgConnection, Row};

use crate::{
    app_error::AppResult,
    domain::entities::school_setting::{SchoolSetting, SystemSettings},
};

pub(super) async fn system_settings(conn: &mut PgConnection) -> AppResult<SystemSettings> {
    let rows = sqlx::query("SELECT name, data FROM system_settings WHERE name = ANY($1)")
        .bind(
            &[
                SystemSettings::ADDITIONAL_BILLING_DAYS,
                SystemSettings::BILLING_CYCLE_IN_DAYS,
            ][..],
        )
        .fetch_all(conn)
        .await?;

    let pairs: Vec<(String, String)> = rows
        .into_iter()
        .map(|row| (row.get("name"), row.get("data")))
        .collect();
    Ok(SystemSettings::from_rows(
        pairs.iter().map(|(name, data)| (name.as_str(), data.as_str())),
    ))
}

pub(super) async fn get(
    conn: &mut PgConnection,
    school_id: i64,
    name: &str,
) -> AppResult<Option<SchoolSetting>> {
    let row = sqlx::query(
        "SELECT id, school_id, name, data FROM school_settings WHERE school_id = $1 AND name = $2",
    )
    .bind(school_id)
    .bind(name)
    .fetch_optional(conn)
    .await?;

    Ok(row.map(|row| SchoolSetting {
        id: row.get("id"),
        school_id: row.get("school_id"),
        name: row.get("name"),
        data: row.get("data"),
    }))
}

pub(super) async fn update(
    conn: &mut PgConnection,
    school_id: i64,
    name: &str,
    data: &str,
) -> AppResult<()> {
    sqlx::query("UPDATE school_settings SET data = $3 WHERE school_id = $1 AND name = $2")
        .bind(school_id)
        .bind(name)
        .bind(data)
        .execute(conn)
        .await?;
    Ok(())
}
