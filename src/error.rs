//! Error types for the statistics service.
//!
//! All errors are explicitly typed using thiserror. No panics in production code.

use axum::http::StatusCode;
use thiserror::Error;

/// Central error type for all statistics and migration operations.
#[derive(Debug, Error)]
pub enum StatsError {
    /// Malformed `start`/`end` query parameters.
    #[error("{0}")]
    InvalidTimeRange(String),

    /// Unknown IANA timezone name.
    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    /// Caller identity missing or unknown.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// App missing, owned by another tenant, or of an unsupported mode.
    #[error("{0}")]
    AppNotFound(String),

    /// Configuration error (invalid env values).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Database error.
    #[error("Database error: {0}")]
    Database(String),

    /// Schema migration error.
    #[error("Migration error: {0}")]
    Migration(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StatsError {
    /// Log error with full context using tracing.
    ///
    /// Client errors are expected traffic and log at `info`. Critical errors
    /// carry an `alert` field for log-based alerting.
    pub fn log_with_context(&self, context: &ErrorContext) {
        if self.is_client_error() {
            tracing::info!(
                error = %self,
                request_id = %context.request_id,
                account_id = ?context.account_id,
                app_id = ?context.app_id,
                operation = %context.operation,
                "Rejected request"
            );
            return;
        }

        if self.is_critical() {
            tracing::error!(
                error = %self,
                alert = true,
                request_id = %context.request_id,
                account_id = ?context.account_id,
                app_id = ?context.app_id,
                operation = %context.operation,
                "Critical error occurred"
            );
            return;
        }

        match self {
            Self::Config(_) => {
                tracing::error!(
                    error = %self,
                    request_id = %context.request_id,
                    operation = %context.operation,
                    "Configuration error"
                );
            }
            _ => {
                tracing::error!(
                    error = %self,
                    request_id = %context.request_id,
                    app_id = ?context.app_id,
                    operation = %context.operation,
                    "Data processing error"
                );
            }
        }
    }

    /// Check if this error is critical and requires alerting
    pub fn is_critical(&self) -> bool {
        matches!(self, Self::Database(_) | Self::Migration(_))
    }

    /// Whether the caller caused the error.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidTimeRange(_)
                | Self::InvalidTimezone(_)
                | Self::Unauthorized(_)
                | Self::AppNotFound(_)
        )
    }

    /// HTTP status for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidTimeRange(_) | Self::InvalidTimezone(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::AppNotFound(_) => StatusCode::NOT_FOUND,
            Self::Database(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Config(_) | Self::Migration(_) | Self::Json(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Get user-facing error message.
    ///
    /// Client errors carry their validation message; everything else is replaced
    /// with a generic text so internal details never leak.
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidTimeRange(_)
            | Self::InvalidTimezone(_)
            | Self::Unauthorized(_)
            | Self::AppNotFound(_) => self.to_string(),
            Self::Config(_) => "Service configuration error".to_string(),
            Self::Database(_) => "Database service temporarily unavailable".to_string(),
            Self::Migration(_) => "Schema migration error".to_string(),
            Self::Json(_) => "Data format error".to_string(),
        }
    }
}

/// Context information for error logging
#[derive(Debug, Clone)]
pub struct ErrorContext {
    /// Unique request identifier for correlation
    pub request_id: String,
    /// Authenticated account, if resolved
    pub account_id: Option<String>,
    /// Target application, if known
    pub app_id: Option<String>,
    /// Operation being performed
    pub operation: String,
}

impl ErrorContext {
    /// Create a new error context
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            account_id: None,
            app_id: None,
            operation: operation.into(),
        }
    }

    pub fn with_account_id(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = Some(account_id.into());
        self
    }

    pub fn with_app_id(mut self, app_id: impl Into<String>) -> Self {
        self.app_id = Some(app_id.into());
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }
}

/// Result type alias for statistics operations.
pub type Result<T> = std::result::Result<T, StatsError>;
