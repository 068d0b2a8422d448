use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::error::{ConnAcquireErr, DbErr};
use serde::{Deserialize, Serialize};

/// Error payload returned to the controller layer.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Bad Request", "Internal Server Error")
    pub error: String,
    /// Human-readable error description
    pub message: String,
    /// ISO 8601 timestamp when the error occurred
    pub timestamp: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The cart contained no valid line items after normalization. This is
    /// the one client error the order core distinguishes; everything else
    /// surfaces as a generic persistence failure.
    #[error("No items in cart")]
    NoItems,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    DatabaseError(DbErr),

    #[error("Schema introspection failed: {0}")]
    SchemaIntrospection(String),

    /// The bounded connection pool timed out on acquire. Retryable.
    #[error("Connection pool exhausted")]
    PoolExhausted,

    #[error("Event error: {0}")]
    EventError(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl From<DbErr> for ServiceError {
    fn from(err: DbErr) -> Self {
        match err {
            DbErr::ConnectionAcquire(ConnAcquireErr::Timeout) => ServiceError::PoolExhausted,
            other => ServiceError::DatabaseError(other),
        }
    }
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    /// Returns the HTTP status code for this error.
    /// This is the single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NoItems | Self::ValidationError(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::PoolExhausted => StatusCode::SERVICE_UNAVAILABLE,
            Self::DatabaseError(_)
            | Self::SchemaIntrospection(_)
            | Self::EventError(_)
            | Self::InternalError(_)
            | Self::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the error message suitable for HTTP responses.
    /// Server-side failures return a generic message so schema and
    /// connection details never leak to customers.
    pub fn response_message(&self) -> String {
        match self {
            Self::NoItems => "No items in cart".to_string(),
            Self::ValidationError(msg) => msg.clone(),
            Self::NotFound(msg) => msg.clone(),
            Self::PoolExhausted => "Service busy, please retry".to_string(),
            Self::DatabaseError(_)
            | Self::SchemaIntrospection(_)
            | Self::EventError(_)
            | Self::InternalError(_)
            | Self::Other(_) => "Could not complete order".to_string(),
        }
    }

    /// True when the caller may safely resubmit the same request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::PoolExhausted)
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let err = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: self.response_message(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(err)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_items_is_a_client_error() {
        assert_eq!(ServiceError::NoItems.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ServiceError::NoItems.response_message(), "No items in cart");
    }

    #[test]
    fn database_errors_do_not_leak_details() {
        let err = ServiceError::DatabaseError(DbErr::Custom(
            "duplicate key value violates unique constraint".to_string(),
        ));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.response_message(), "Could not complete order");
    }

    #[test]
    fn acquire_timeout_maps_to_pool_exhausted() {
        let err: ServiceError = DbErr::ConnectionAcquire(ConnAcquireErr::Timeout).into();
        assert!(matches!(err, ServiceError::PoolExhausted));
        assert!(err.is_retryable());
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
