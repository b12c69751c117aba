//! Classified request failures

use thiserror::Error;

/// Terminal outcome of a failed request, classified for callers.
///
/// Permanent classes are surfaced immediately and never retried;
/// transient classes are retried up to the configured budget.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RequestError {
    /// The request never left the client (origin/redirect policy). Permanent.
    #[error("request blocked by origin policy: {0}")]
    BlockedByPolicy(String),

    /// HTTP 403. Permanent.
    #[error("forbidden (HTTP 403)")]
    Forbidden,

    /// HTTP 404. Permanent.
    #[error("not found (HTTP 404)")]
    NotFound,

    /// Other 4xx. Permanent.
    #[error("client error (HTTP {status})")]
    Client { status: u16 },

    /// 5xx. Transient.
    #[error("server error (HTTP {status})")]
    Server { status: u16 },

    /// No response received. Transient.
    #[error("network error: {0}")]
    Network(String),
}

impl RequestError {
    /// Classify an HTTP status code. Returns None for success statuses.
    pub fn from_status(status: u16) -> Option<Self> {
        match status {
            200..=399 => None,
            403 => Some(Self::Forbidden),
            404 => Some(Self::NotFound),
            400..=499 => Some(Self::Client { status }),
            _ => Some(Self::Server { status }),
        }
    }

    /// Whether the failure may resolve on retry
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Server { .. } | Self::Network(_))
    }

    /// Human-readable message suitable for showing to the user
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BlockedByPolicy(_) => "The browser or origin policy blocked the request.",
            Self::Forbidden => "Access to the assistant was denied.",
            Self::NotFound => "The assistant endpoint was not found.",
            Self::Client { .. } => "The request was rejected by the server.",
            Self::Server { .. } => "The server is temporarily unavailable. Please try again.",
            Self::Network(_) => "Network issue detected, working offline.",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert_eq!(RequestError::from_status(200), None);
        assert_eq!(RequestError::from_status(204), None);
        assert_eq!(RequestError::from_status(301), None);
        assert_eq!(RequestError::from_status(403), Some(RequestError::Forbidden));
        assert_eq!(RequestError::from_status(404), Some(RequestError::NotFound));
        assert_eq!(
            RequestError::from_status(422),
            Some(RequestError::Client { status: 422 })
        );
        assert_eq!(
            RequestError::from_status(500),
            Some(RequestError::Server { status: 500 })
        );
        assert_eq!(
            RequestError::from_status(503),
            Some(RequestError::Server { status: 503 })
        );
    }

    #[test]
    fn test_transience() {
        assert!(RequestError::Server { status: 500 }.is_transient());
        assert!(RequestError::Network("connection refused".into()).is_transient());
        assert!(!RequestError::NotFound.is_transient());
        assert!(!RequestError::Forbidden.is_transient());
        assert!(!RequestError::Client { status: 400 }.is_transient());
        assert!(!RequestError::BlockedByPolicy("cross-origin".into()).is_transient());
    }

    #[test]
    fn test_user_messages_distinguish_classes() {
        let blocked = RequestError::BlockedByPolicy("x".into()).user_message();
        let server = RequestError::Server { status: 500 }.user_message();
        let network = RequestError::Network("x".into()).user_message();
        assert_ne!(blocked, server);
        assert_ne!(server, network);
        assert_ne!(blocked, network);
    }
}
