//! Error types for axcess.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::delegate::DelegationError;
use crate::providers::ProviderError;
use crate::router::RoutingError;

/// Result type alias for axcess operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for axcess.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Routing error: {0}")]
    Routing(#[from] RoutingError),

    #[error("Delegation failed: {0}")]
    Delegation(#[from] DelegationError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("{tool}: {message}")]
    InvalidOutput { tool: &'static str, message: String },
}

impl Error {
    /// HTTP status used when this error reaches the API surface.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Routing(_) => StatusCode::BAD_REQUEST,
            Error::Delegation(_) => StatusCode::BAD_GATEWAY,
            Error::Provider(_) => StatusCode::BAD_GATEWAY,
            Error::BadRequest(_) => StatusCode::BAD_REQUEST,
            Error::InvalidOutput { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Error::Config(_) => "config_error",
            Error::Routing(_) => "routing_error",
            Error::Delegation(_) => "delegation_error",
            Error::Provider(_) => "provider_error",
            Error::BadRequest(_) => "invalid_request_error",
            Error::InvalidOutput { .. } => "invalid_output_error",
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let mut error = serde_json::json!({
            "message": self.to_string(),
            "type": self.kind(),
            "code": status.as_u16()
        });

        // Attempt trail lets callers diagnose an exhausted fallback chain
        if let Error::Delegation(DelegationError::Exhausted { attempts }) = &self {
            error["attempts"] = serde_json::to_value(attempts).unwrap_or_default();
        }

        (status, axum::Json(serde_json::json!({ "error": error }))).into_response()
    }
}
