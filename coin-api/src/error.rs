use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use common::StoreError;
use serde_json::json;
use thiserror::Error;
use tracing::error;
use validator::ValidationErrors;

pub const CONFLICT_MESSAGE: &str = "Request conflicted with a concurrent update, try again";

/// Every handler failure; the message is shown to the player verbatim.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    /// Claim or purchase refused; `coins` echoes the untouched balance.
    #[error("{message}")]
    Ineligible { message: String, coins: Option<i64> },

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    RateLimited(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn ineligible(message: impl Into<String>, coins: i64) -> Self {
        ApiError::Ineligible {
            message: message.into(),
            coins: Some(coins),
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::Ineligible { .. } => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = match self {
            ApiError::Internal(detail) => {
                error!("Request failed: {}", detail);
                json!({ "message": "Server error" })
            }
            ApiError::Ineligible {
                message,
                coins: Some(coins),
            } => json!({ "message": message, "coins": coins }),
            other => json!({ "message": other.to_string() }),
        };
        HttpResponse::build(self.status_code()).json(body)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => ApiError::NotFound(format!("{} not found", what)),
            StoreError::Conflict(_) => ApiError::Conflict(CONFLICT_MESSAGE.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        let message = errors
            .field_errors()
            .values()
            .flat_map(|errs| errs.iter())
            .find_map(|e| e.message.as_ref().map(|m| m.to_string()))
            .unwrap_or_else(|| "Invalid request".to_string());
        ApiError::Validation(message)
    }
}

impl From<bcrypt::BcryptError> for ApiError {
    fn from(err: bcrypt::BcryptError) -> Self {
        ApiError::Internal(format!("password hashing: {}", err))
    }
}

impl From<actix_web::error::BlockingError> for ApiError {
    fn from(err: actix_web::error::BlockingError) -> Self {
        ApiError::Internal(format!("blocking task: {}", err))
    }
}

impl From<prometheus::Error> for ApiError {
    fn from(err: prometheus::Error) -> Self {
        ApiError::Internal(format!("metrics: {}", err))
    }
}
