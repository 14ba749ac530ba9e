//! Port Interfaces
//!
//! Contracts between the application services and the outside world,
//! following the Hexagonal Architecture pattern.
//!
//! ## Driven Ports (Outbound)
//!
//! - [`DataTransport`]: one GET against the market data API, returning the
//!   decoded JSON body. The pagination engine is written against this port;
//!   the reqwest client in `infrastructure::http` implements it.

use async_trait::async_trait;
use thiserror::Error;

/// Query string as ordered key/value pairs.
pub type QueryParams = Vec<(String, String)>;

// =============================================================================
// Error Type
// =============================================================================

/// Errors returned by the HTTP transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// Server answered with a non-2xx status.
    #[error("code: {status}, message: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Application error code from the response body, if any.
        code: Option<i64>,
        /// Message from the response body, or the raw body.
        message: String,
    },

    /// Request could not be sent or the response could not be read.
    #[error("network error: {0}")]
    Network(String),

    /// Response body was not the expected JSON.
    #[error("JSON parsing error: {0}")]
    JsonParse(String),

    /// Request could not be built (bad URL, bad header value).
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl ApiError {
    /// HTTP status if the server responded.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Check if the server rejected the credentials.
    #[must_use]
    pub const fn is_auth_error(&self) -> bool {
        matches!(self.status(), Some(401 | 403))
    }

    /// Check if the request was rate limited.
    #[must_use]
    pub const fn is_rate_limited(&self) -> bool {
        matches!(self.status(), Some(429))
    }
}

// =============================================================================
// Driven Ports
// =============================================================================

/// Read-only access to a page-oriented JSON API.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DataTransport: Send + Sync {
    /// Issue a GET for `path` (relative to the data API base) with `query`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] on transport failure or a non-2xx response.
    async fn get_json(&self, path: &str, query: &QueryParams)
    -> Result<serde_json::Value, ApiError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_error_display_matches_upstream_format() {
        let err = ApiError::Status {
            status: 422,
            code: Some(40_010_001),
            message: "invalid symbol".to_string(),
        };
        assert_eq!(err.to_string(), "code: 422, message: invalid symbol");
        assert_eq!(err.status(), Some(422));
    }

    #[test]
    fn categorization() {
        let auth = ApiError::Status {
            status: 403,
            code: None,
            message: "forbidden".to_string(),
        };
        assert!(auth.is_auth_error());
        assert!(!auth.is_rate_limited());

        let limited = ApiError::Status {
            status: 429,
            code: None,
            message: "too many requests".to_string(),
        };
        assert!(limited.is_rate_limited());

        assert_eq!(ApiError::Network("refused".to_string()).status(), None);
    }
}
