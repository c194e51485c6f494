//! Error types for the booking and payment service clients

use thiserror::Error;

/// Errors returned by the booking and payment services
///
/// `NotFound`, `Unauthorized` and `BackendRejected` display the server's
/// message verbatim so callers can show it as-is.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// 404 from the service
    #[error("{0}")]
    NotFound(String),

    /// 401 from the service (missing or expired token)
    #[error("{0}")]
    Unauthorized(String),

    /// The request never produced an HTTP response
    #[error("Network error: {0}")]
    Network(String),

    /// Any other non-success status, with the message from the `error` field
    #[error("{message}")]
    BackendRejected {
        /// HTTP status code
        status: u16,
        /// Error message from the service
        message: String,
    },

    /// Response body did not match the expected shape
    #[error("Response parsing failed: {0}")]
    Decode(String),
}

impl ApiError {
    /// HTTP status associated with the error, if the service answered
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::NotFound(_) => Some(404),
            Self::Unauthorized(_) => Some(401),
            Self::BackendRejected { status, .. } => Some(*status),
            Self::Network(_) | Self::Decode(_) => None,
        }
    }

    /// Whether the request failed before reaching the service
    #[must_use]
    pub const fn is_network(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}
