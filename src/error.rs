use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::context::Action;
use crate::model::{ErrorCode, ProtocolError};

pub type Result<T> = std::result::Result<T, BecknError>;

#[derive(Error, Debug)]
pub enum BecknError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Registry lookup failed: {0}")]
    Registry(String),

    #[error("Store unavailable: {0}")]
    Store(String),

    #[error("Invalid action: expected {expected}, got {found}")]
    ActionMismatch { expected: Action, found: String },

    #[error("Service is shutting down")]
    ShuttingDown,

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl BecknError {
    /// Converts an internal failure into the error carried by a callback.
    pub fn to_protocol_error(&self) -> ProtocolError {
        let code = match self {
            BecknError::Validation(_) | BecknError::InvalidInput(_) | BecknError::ActionMismatch { .. } => {
                ErrorCode::InvalidRequest
            }
            _ => ErrorCode::InternalServerError,
        };
        ProtocolError::new(code, self.to_string())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            BecknError::ActionMismatch { .. } | BecknError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            BecknError::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
            BecknError::Registry(_) | BecknError::Network(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<serde_json::Error> for BecknError {
    fn from(err: serde_json::Error) -> Self {
        BecknError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for BecknError {
    fn from(err: std::io::Error) -> Self {
        BecknError::Io(err.to_string())
    }
}

impl IntoResponse for BecknError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        }
        let body = serde_json::json!({ "error": self.to_protocol_error() });
        (status, Json(body)).into_response()
    }
}
