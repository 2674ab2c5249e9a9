//! Error types for the lending server

use axum::{
    extract::rejection::{JsonRejection, PathRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Stable error codes returned to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    Failure = 1,
    NotAuthenticated = 2,
    Forbidden = 3,
    DbFailure = 4,
    NoSuchResource = 5,
    BadValue = 6,
    Duplicate = 7,
    AlreadyBorrowed = 8,
    OutOfStock = 9,
    NoActiveLoan = 10,
    AlreadyReturned = 11,
    RuleViolation = 12,
    Unavailable = 13,
}

/// Expected outcomes of the loan workflow that refuse the request.
///
/// None of these leave side effects behind: the enclosing transaction is
/// rolled back before the error reaches the caller.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoanError {
    #[error("user already holds an active loan for this book")]
    AlreadyBorrowed,

    #[error("no copies of this book are in stock")]
    OutOfStock,

    #[error("no active loan exists for this book")]
    NoActiveLoan,

    #[error("loan was already returned")]
    AlreadyReturned,
}

impl LoanError {
    /// Message suitable for showing to the borrower
    pub fn user_message(&self) -> &'static str {
        match self {
            LoanError::AlreadyBorrowed => "You already have this book on loan.",
            LoanError::OutOfStock => "There are no copies of this book available right now.",
            LoanError::NoActiveLoan => "No active loan was found for this book.",
            LoanError::AlreadyReturned => "This loan has already been returned.",
        }
    }

    fn code(&self) -> ErrorCode {
        match self {
            LoanError::AlreadyBorrowed => ErrorCode::AlreadyBorrowed,
            LoanError::OutOfStock => ErrorCode::OutOfStock,
            LoanError::NoActiveLoan => ErrorCode::NoActiveLoan,
            LoanError::AlreadyReturned => ErrorCode::AlreadyReturned,
        }
    }
}

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Authorization failed: {0}")]
    Authorization(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Business rule violation: {0}")]
    BusinessRule(String),

    #[error("Loan refused: {0}")]
    Loan(#[from] LoanError),
}

pub const INVALID_CREDENTIALS: &str = "Invalid username or password";
pub const ACCOUNT_REMOVED: &str = "Account no longer exists";

impl AppError {
    /// The single error returned for unknown users and wrong passwords alike
    pub fn invalid_credentials() -> Self {
        AppError::Authentication(INVALID_CREDENTIALS.to_string())
    }

    /// A session whose user was deleted after it was issued
    pub fn account_removed() -> Self {
        AppError::Authentication(ACCOUNT_REMOVED.to_string())
    }

    /// Storage failures may succeed when the caller tries again
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Database(_) | AppError::Unavailable(_))
    }

    /// PostgreSQL SQLSTATE of the underlying database error, if any
    pub fn sql_state(&self) -> Option<String> {
        match self {
            AppError::Database(e) => e
                .as_database_error()
                .and_then(|db| db.code())
                .map(|code| code.into_owned()),
            _ => None,
        }
    }

    pub fn is_unique_violation(&self) -> bool {
        self.sql_state().as_deref() == Some("23505")
    }

    pub fn is_foreign_key_violation(&self) -> bool {
        self.sql_state().as_deref() == Some("23503")
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

/// Error response body
#[derive(Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub code: u32,
    pub error: String,
    pub message: String,
    /// Whether repeating the request may succeed
    pub retryable: bool,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Authentication(msg) => {
                (StatusCode::UNAUTHORIZED, ErrorCode::NotAuthenticated, msg.clone())
            }
            AppError::Authorization(msg) => {
                (StatusCode::FORBIDDEN, ErrorCode::Forbidden, msg.clone())
            }
            AppError::NotFound(msg) => {
                (StatusCode::NOT_FOUND, ErrorCode::NoSuchResource, msg.clone())
            }
            AppError::Validation(msg) | AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, ErrorCode::BadValue, msg.clone())
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorCode::DbFailure,
                    "Database error".to_string(),
                )
            }
            AppError::Conflict(msg) => {
                (StatusCode::CONFLICT, ErrorCode::Duplicate, msg.clone())
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorCode::Failure,
                    "Internal server error".to_string(),
                )
            }
            AppError::Unavailable(msg) => {
                tracing::error!("Service unavailable: {}", msg);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    ErrorCode::Unavailable,
                    "Service temporarily unavailable".to_string(),
                )
            }
            AppError::BusinessRule(msg) => {
                (StatusCode::UNPROCESSABLE_ENTITY, ErrorCode::RuleViolation, msg.clone())
            }
            AppError::Loan(e) => {
                (StatusCode::CONFLICT, e.code(), e.user_message().to_string())
            }
        };

        let body = Json(ErrorResponse {
            code: code as u32,
            error: format!("{:?}", code),
            message,
            retryable: self.is_retryable(),
        });

        (status, body).into_response()
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loan_refusals_map_to_conflict_with_distinct_codes() {
        let outcomes = [
            (LoanError::AlreadyBorrowed, ErrorCode::AlreadyBorrowed),
            (LoanError::OutOfStock, ErrorCode::OutOfStock),
            (LoanError::NoActiveLoan, ErrorCode::NoActiveLoan),
            (LoanError::AlreadyReturned, ErrorCode::AlreadyReturned),
        ];
        for (error, code) in outcomes {
            assert_eq!(error.code(), code);
            let response = AppError::from(error).into_response();
            assert_eq!(response.status(), StatusCode::CONFLICT);
        }
    }

    #[test]
    fn storage_errors_are_retryable_but_rule_errors_are_not() {
        assert!(AppError::Database(sqlx::Error::PoolTimedOut).is_retryable());
        assert!(AppError::Unavailable("timeout".into()).is_retryable());
        assert!(!AppError::Loan(LoanError::OutOfStock).is_retryable());
        assert!(!AppError::invalid_credentials().is_retryable());
    }

    #[test]
    fn status_codes_follow_error_taxonomy() {
        let cases = [
            (AppError::invalid_credentials(), StatusCode::UNAUTHORIZED),
            (AppError::Authorization("admin".into()), StatusCode::FORBIDDEN),
            (AppError::Validation("id".into()), StatusCode::BAD_REQUEST),
            (AppError::Database(sqlx::Error::PoolTimedOut), StatusCode::INTERNAL_SERVER_ERROR),
            (AppError::Unavailable("slow".into()), StatusCode::SERVICE_UNAVAILABLE),
            (AppError::BusinessRule("self".into()), StatusCode::UNPROCESSABLE_ENTITY),
        ];
        for (error, status) in cases {
            assert_eq!(error.into_response().status(), status);
        }
    }
}
