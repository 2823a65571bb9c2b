use chrono::NaiveDate;
use thiserror::Error;

use crate::domain::entities::addon_subscription::AddonMergeError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Missing configuration: school {school_id} has no '{name}' setting")]
    MissingConfiguration { school_id: i64, name: &'static str },

    #[error("Data integrity violation: {0}")]
    DataIntegrity(String),

    #[error("Payment gateway error: {0}")]
    PaymentGateway(String),

    #[error("Payment gateway '{0}' is not supported")]
    UnsupportedGateway(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid billing date {0}")]
    InvalidDate(NaiveDate),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCode {
    DatabaseError,
    MissingConfiguration,
    DataIntegrity,
    PaymentGatewayError,
    UnsupportedGateway,
    CacheError,
    InvalidInput,
    NotFound,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::DatabaseError => "DATABASE_ERROR",
            ErrorCode::MissingConfiguration => "MISSING_CONFIGURATION",
            ErrorCode::DataIntegrity => "DATA_INTEGRITY",
            ErrorCode::PaymentGatewayError => "PAYMENT_GATEWAY_ERROR",
            ErrorCode::UnsupportedGateway => "UNSUPPORTED_GATEWAY",
            ErrorCode::CacheError => "CACHE_ERROR",
            ErrorCode::InvalidInput => "INVALID_INPUT",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl AppError {
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Database(_) => ErrorCode::DatabaseError,
            AppError::MissingConfiguration { .. } => ErrorCode::MissingConfiguration,
            AppError::DataIntegrity(_) => ErrorCode::DataIntegrity,
            AppError::PaymentGateway(_) => ErrorCode::PaymentGatewayError,
            AppError::UnsupportedGateway(_) => ErrorCode::UnsupportedGateway,
            AppError::Cache(_) => ErrorCode::CacheError,
            AppError::InvalidInput(_) => ErrorCode::InvalidInput,
            AppError::NotFound(_) => ErrorCode::NotFound,
            AppError::InvalidDate(_) | AppError::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// Errors that skip a school's unit instead of failing it.
    pub fn is_skip(&self) -> bool {
        matches!(self, AppError::MissingConfiguration { .. })
    }
}

impl From<AddonMergeError> for AppError {
    fn from(err: AddonMergeError) -> Self {
        AppError::DataIntegrity(err.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;
