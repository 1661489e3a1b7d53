//! Common error types for the emoji gallery service

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// The image-generation provider failed or returned unusable output
    #[error("Image provider error: {0}")]
    Upstream(String),

    /// Fetching generated image bytes failed
    #[error("Transport error: {0}")]
    Transport(String),

    /// Object storage rejected an upload
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error response body
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub message: String,
    pub r#type: String,
    pub code: Option<String>,
}

impl AppError {
    /// HTTP status, error class and optional machine code for this error
    pub fn classify(&self) -> (StatusCode, &'static str, Option<&'static str>) {
        match self {
            AppError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "server_error", None),
            AppError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "server_error", None),
            AppError::HttpClient(_) => (StatusCode::BAD_GATEWAY, "transport_error", None),
            AppError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "persistence_error", None),
            AppError::Migration(_) => (StatusCode::INTERNAL_SERVER_ERROR, "persistence_error", Some("migration_failed")),
            AppError::Upstream(_) => (StatusCode::BAD_GATEWAY, "provider_error", None),
            AppError::Transport(_) => (StatusCode::BAD_GATEWAY, "transport_error", None),
            AppError::Storage(_) => (StatusCode::BAD_GATEWAY, "storage_error", None),
            AppError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "authentication_error", Some("unauthorized")),
            AppError::RateLimitExceeded => (StatusCode::TOO_MANY_REQUESTS, "rate_limit_error", Some("rate_limit_exceeded")),
            AppError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request_error", None),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found_error", Some("item_not_found")),
            AppError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "timeout_error", None),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "server_error", None),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, code) = self.classify();

        let body = Json(ErrorResponse {
            error: ErrorDetail {
                message: self.to_string(),
                r#type: error_type.to_string(),
                code: code.map(|c| c.to_string()),
            },
        });

        (status, body).into_response()
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;
