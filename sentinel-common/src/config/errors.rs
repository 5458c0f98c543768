//! Error type for the override engine.

use thiserror::Error;

use super::coerce::CoerceError;
use super::schema::ValidationError;

/// Errors surfaced while applying configuration overrides.
///
/// Every variant except [`OverrideError::Internal`] is caused by the
/// caller's request and maps to a client error at the HTTP layer.
#[derive(Debug, Error)]
pub enum OverrideError {
    #[error("invalid override request: {0}")]
    InvalidRequest(String),

    #[error("unknown section {0}")]
    UnknownSection(String),

    #[error("unknown element {element} in section {section}")]
    UnknownElement { section: String, element: String },

    #[error("unknown options {options:?} in section {section}")]
    UnknownOptions {
        section: String,
        options: Vec<String>,
    },

    #[error("cannot set option {name}: {source}")]
    CannotSetOption {
        name: String,
        #[source]
        source: CoerceError,
    },

    #[error("invalid value for section {section}: {message}")]
    Decode { section: String, message: String },

    #[error("validation failed for section {section}: {source}")]
    Validation {
        section: String,
        #[source]
        source: ValidationError,
    },

    #[error("internal override error: {0}")]
    Internal(String),
}

impl OverrideError {
    pub(crate) fn internal(message: impl Into<String>) -> Self {
        OverrideError::Internal(message.into())
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        OverrideError::InvalidRequest(message.into())
    }

    /// True when the error was caused by the request rather than by a
    /// schema/tree inconsistency.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, OverrideError::Internal(_))
    }
}
