//! Error types for the transport module.

use streamer_ipc::InvalidTarget;
use thiserror::Error;

/// Errors that can occur during transport operations.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The service does not know the session (HTTP 404).
    #[error("Session not found: {0}")]
    NotFound(String),

    /// The session was stopped or superseded (HTTP 409).
    #[error("Session conflict: {0}")]
    Conflict(String),

    /// Any other non-success status.
    #[error("Request failed with status {status}: {message}")]
    Status { status: u16, message: String },

    /// The request never produced a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Invalid service URL.
    #[error("Invalid service URL: {0}")]
    InvalidUrl(String),

    /// The capture target was rejected before sending.
    #[error("Invalid capture target: {0}")]
    InvalidTarget(#[from] InvalidTarget),

    /// The response body could not be understood.
    #[error("Invalid response: {0}")]
    Decode(String),
}

impl TransportError {
    /// HTTP status behind this error, if there was a response.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::NotFound(_) => Some(404),
            Self::Conflict(_) => Some(409),
            Self::Status { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Returns true for 404.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Returns true if the service no longer accepts frames for the session.
    pub fn is_session_invalidated(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::Conflict(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalidation_classification() {
        assert!(TransportError::NotFound("gone".into()).is_session_invalidated());
        assert!(TransportError::Conflict("stopped".into()).is_session_invalidated());
        assert!(!TransportError::Status {
            status: 500,
            message: "boom".into()
        }
        .is_session_invalidated());
        assert!(!TransportError::Decode("bad json".into()).is_session_invalidated());
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(TransportError::NotFound(String::new()).status_code(), Some(404));
        assert_eq!(TransportError::Conflict(String::new()).status_code(), Some(409));
        assert_eq!(
            TransportError::Status {
                status: 413,
                message: String::new()
            }
            .status_code(),
            Some(413)
        );
        assert_eq!(TransportError::InvalidUrl(String::new()).status_code(), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(
            TransportError::Status {
                status: 503,
                message: "unavailable".into()
            }
            .to_string(),
            "Request failed with status 503: unavailable"
        );
    }
}
