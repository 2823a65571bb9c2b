use sqlx::PgPool;

use crate::app_error::AppError;

pub mod addon_subscription;
pub mod billing_store;
pub mod payment_transaction;
pub mod school_setting;
pub mod subscription;
pub mod subscription_bill;
pub mod user_status;

#[derive(Clone)]
pub struct PostgresPersistence {
    pool: PgPool,
}

impl PostgresPersistence {
    pub fn new(pool: PgPool) -> Self {
        PostgresPersistence { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => AppError::NotFound("Row not found".into()),
            sqlx::Error::Database(db_err) => {
                if db_err.is_unique_violation() {
                    AppError::DataIntegrity(format!(
                        "Duplicate key ({})",
                        db_err.constraint().unwrap_or("unknown constraint")
                    ))
                } else if db_err.is_foreign_key_violation() {
                    AppError::DataIntegrity(format!(
                        "Referenced record not found ({})",
                        db_err.constraint().unwrap_or("unknown constraint")
                    ))
                } else {
                    tracing::error!(error = ?err, "Database error");
                    AppError::Database("Database operation failed".into())
                }
            }
            _ => {
                tracing::error!(error = ?err, "Database error");
                AppError::Database("Database operation failed".into())
            }
        }
    }
}
