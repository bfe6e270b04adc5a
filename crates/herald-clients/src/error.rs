//! Error types for the HTTP clients.

use herald_pipeline::CollaboratorError;
use thiserror::Error;

/// Errors that can occur when talking to an external service.
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The service answered with a non-success status.
    #[error("request failed ({status}): {body}")]
    Status { status: u16, body: String },

    /// Rate limited.
    #[error("rate limited{}", match retry_after_secs {
        Some(secs) => format!(" (retry after {}s)", secs),
        None => String::new(),
    })]
    RateLimited {
        /// Seconds to wait before retrying (from Retry-After header, optional).
        retry_after_secs: Option<u64>,
    },

    /// JSON-RPC error object.
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// Response parsed but did not contain what we need.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Client could not be constructed.
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<ClientError> for CollaboratorError {
    fn from(e: ClientError) -> Self {
        match e {
            ClientError::Http(_) | ClientError::Status { .. } | ClientError::RateLimited { .. } => {
                CollaboratorError::Unavailable(e.to_string())
            }
            ClientError::Json(_) | ClientError::Rpc { .. } | ClientError::InvalidResponse(_) => {
                CollaboratorError::InvalidResponse(e.to_string())
            }
            ClientError::Config(_) => CollaboratorError::Other(Box::new(e)),
        }
    }
}
