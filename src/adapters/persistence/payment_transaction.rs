use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::Row;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::payment_refresh::PaymentTransactionRepo,
    domain::entities::payment_status::{PaymentStatus, PaymentTransaction},
};

fn row_to_transaction(row: sqlx::postgres::PgRow) -> PaymentTransaction {
    PaymentTransaction {
        id: row.get("id"),
        school_id: row.get("school_id"),
        payment_gateway: row.get("payment_gateway"),
        order_id: row.get("order_id"),
        payment_status: row.get("payment_status"),
        created_at: row.get("created_at"),
    }
}

#[async_trait]
impl PaymentTransactionRepo for PostgresPersistence {
    async fn list_pending(
        &self,
        since: Option<NaiveDateTime>,
    ) -> AppResult<Vec<PaymentTransaction>> {
        let rows = sqlx::query(
            r#"
            SELECT id, school_id, payment_gateway, order_id, payment_status, created_at
            FROM payment_transactions
            WHERE payment_status = $1
              AND ($2::TIMESTAMP IS NULL OR created_at >= $2)
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(PaymentStatus::Pending)
        .bind(since)
        .fetch_all(self.pool())
        .await?;

        Ok(rows.into_iter().map(row_to_transaction).collect())
    }

    async fn update_status(&self, id: i64, status: PaymentStatus) -> AppResult<()> {
        let result = sqlx::query(
            "UPDATE payment_transactions SET payment_status = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(status)
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("payment transaction {id}")));
        }
        Ok(())
    }
}
