//! Service-level error type and HTTP status mapping.

use http::StatusCode;
use thiserror::Error;

use sentinel_common::config::OverrideError;

use super::store::StoreError;

/// Errors surfaced by the config service.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("failed to decode JSON: {0}")]
    Decode(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Override(#[from] OverrideError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to add API routes: {0}")]
    Routes(String),

    #[error("config service is not open")]
    NotOpen,

    #[error("config update channel closed")]
    ChannelClosed,
}

impl ServiceError {
    /// HTTP status for this error. User mistakes are client errors; the
    /// persistence layer and internal invariants are server errors.
    pub fn status(&self) -> StatusCode {
        match self {
            ServiceError::Decode(_) | ServiceError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ServiceError::Override(e) if e.is_client_error() => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
