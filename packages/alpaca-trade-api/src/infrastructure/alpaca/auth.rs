//! Stream and REST Authentication
//!
//! # Market Data Stream
//! 1. Connect (OAuth tokens travel as an `Authorization: Bearer` handshake
//!    header instead of an auth frame)
//! 2. Receive `{"T":"success","msg":"connected"}`
//! 3. Send `{"action":"auth","key":"...","secret":"..."}`
//! 4. Receive `{"T":"success","msg":"authenticated"}` or an error
//!
//! # Trading Stream
//! 1. Connect
//! 2. Send `{"action":"authenticate","data":{"key_id":"...","secret_key":"..."}}`
//!    or `{"action":"authenticate","data":{"oauth_token":"..."}}`
//! 3. Receive `{"stream":"authorization","data":{"status":"authorized",...}}`
//!
//! # Error Codes
//!
//! - 401: Not authenticated
//! - 402: Authentication failed (invalid credentials)
//! - 403: Already authenticated
//! - 404: Authentication timeout (>10 seconds)
//! - 406: Connection limit exceeded

use std::time::Duration;

use thiserror::Error;

use super::messages::{AuthRequest, ErrorMessage, TradeAuthData, TradeAuthRequest};

/// Server closes sessions that have not authenticated within this window.
pub const AUTH_TIMEOUT: Duration = Duration::from_secs(10);

/// REST header carrying the API key ID.
pub const KEY_ID_HEADER: &str = "APCA-API-KEY-ID";

/// REST header carrying the API secret.
pub const SECRET_KEY_HEADER: &str = "APCA-API-SECRET-KEY";

// =============================================================================
// Error Types
// =============================================================================

/// Authentication errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// Not authenticated (must authenticate before subscribing).
    #[error("not authenticated: must authenticate before making requests")]
    NotAuthenticated,

    /// Invalid credentials.
    #[error("authentication failed: invalid API key or secret")]
    InvalidCredentials,

    /// Connection was already authenticated.
    #[error("already authenticated: connection is already authenticated")]
    AlreadyAuthenticated,

    /// No authentication within [`AUTH_TIMEOUT`].
    #[error("authentication timeout: must authenticate within 10 seconds")]
    Timeout,

    /// Too many concurrent connections for this account.
    #[error("connection limit exceeded: too many concurrent connections")]
    ConnectionLimitExceeded,

    /// Trading stream answered `unauthorized`.
    #[error("access key verification failed")]
    Unauthorized,

    /// Credentials rejected before use.
    #[error("missing credentials: {0}")]
    MissingCredentials(&'static str),

    /// Any other server error during authentication.
    #[error("server error ({code}): {message}")]
    ServerError {
        /// Error code from server
        code: i32,
        /// Error message from server
        message: String,
    },
}

impl From<&ErrorMessage> for AuthError {
    fn from(err: &ErrorMessage) -> Self {
        match err.code {
            401 => Self::NotAuthenticated,
            402 => Self::InvalidCredentials,
            403 => Self::AlreadyAuthenticated,
            404 => Self::Timeout,
            406 => Self::ConnectionLimitExceeded,
            code => Self::ServerError {
                code,
                message: err.msg.clone(),
            },
        }
    }
}

// =============================================================================
// Credentials
// =============================================================================

/// Account credentials: an API key pair or an OAuth access token.
///
/// `Debug` redacts the secret parts.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// API key ID and secret.
    KeyPair {
        /// API key ID.
        key_id: String,
        /// API secret.
        secret_key: String,
    },
    /// OAuth access token.
    OAuth {
        /// Token.
        token: String,
    },
}

impl Credentials {
    /// Create key pair credentials.
    ///
    /// # Errors
    ///
    /// Returns an error if either part is empty.
    pub fn key_pair(
        key_id: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Result<Self, AuthError> {
        let key_id = key_id.into();
        let secret_key = secret_key.into();

        if key_id.is_empty() {
            return Err(AuthError::MissingCredentials("API key ID cannot be empty"));
        }
        if secret_key.is_empty() {
            return Err(AuthError::MissingCredentials("API secret cannot be empty"));
        }

        Ok(Self::KeyPair { key_id, secret_key })
    }

    /// Create OAuth credentials.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is empty.
    pub fn oauth(token: impl Into<String>) -> Result<Self, AuthError> {
        let token = token.into();
        if token.is_empty() {
            return Err(AuthError::MissingCredentials("OAuth token cannot be empty"));
        }
        Ok(Self::OAuth { token })
    }

    /// Check if these are OAuth credentials.
    #[must_use]
    pub const fn is_oauth(&self) -> bool {
        matches!(self, Self::OAuth { .. })
    }

    /// Headers to attach to every REST request and to the market data
    /// handshake when using OAuth.
    #[must_use]
    pub fn auth_headers(&self) -> Vec<(&'static str, String)> {
        match self {
            Self::KeyPair { key_id, secret_key } => vec![
                (KEY_ID_HEADER, key_id.clone()),
                (SECRET_KEY_HEADER, secret_key.clone()),
            ],
            Self::OAuth { token } => vec![("Authorization", format!("Bearer {token}"))],
        }
    }

    /// Market data auth frame. `None` for OAuth, which authenticates through
    /// the handshake header.
    #[must_use]
    pub fn to_market_data_auth(&self) -> Option<AuthRequest> {
        match self {
            Self::KeyPair { key_id, secret_key } => {
                Some(AuthRequest::new(key_id.clone(), secret_key.clone()))
            }
            Self::OAuth { .. } => None,
        }
    }

    /// Trading stream auth frame.
    #[must_use]
    pub fn to_trading_auth(&self) -> TradeAuthRequest {
        let data = match self {
            Self::KeyPair { key_id, secret_key } => TradeAuthData::KeyPair {
                key_id: key_id.clone(),
                secret_key: secret_key.clone(),
            },
            Self::OAuth { token } => TradeAuthData::OAuth {
                oauth_token: token.clone(),
            },
        };
        TradeAuthRequest::new(data)
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::KeyPair { key_id, .. } => f
                .debug_struct("Credentials::KeyPair")
                .field("key_id", key_id)
                .field("secret_key", &"[REDACTED]")
                .finish(),
            Self::OAuth { .. } => f
                .debug_struct("Credentials::OAuth")
                .field("token", &"[REDACTED]")
                .finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use test_case::test_case;

    #[test]
    fn key_pair_rejects_empty_parts() {
        assert_eq!(
            Credentials::key_pair("", "secret"),
            Err(AuthError::MissingCredentials("API key ID cannot be empty"))
        );
        assert!(Credentials::key_pair("key", "").is_err());
        assert!(Credentials::oauth("").is_err());
    }

    #[test]
    fn debug_redacts_secrets() {
        let creds = Credentials::key_pair("my_key", "super_secret").unwrap();
        let debug = format!("{creds:?}");
        assert!(debug.contains("my_key"));
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("super_secret"));

        let oauth = format!("{:?}", Credentials::oauth("tok123").unwrap());
        assert!(!oauth.contains("tok123"));
    }

    #[test]
    fn rest_headers_per_credential_kind() {
        let pair = Credentials::key_pair("k", "s").unwrap();
        assert_eq!(
            pair.auth_headers(),
            vec![(KEY_ID_HEADER, "k".to_string()), (SECRET_KEY_HEADER, "s".to_string())]
        );

        let oauth = Credentials::oauth("tok").unwrap();
        assert_eq!(
            oauth.auth_headers(),
            vec![("Authorization", "Bearer tok".to_string())]
        );
    }

    #[test]
    fn market_data_frame_only_for_key_pair() {
        let pair = Credentials::key_pair("key1", "secret1").unwrap();
        let frame = serde_json::to_value(pair.to_market_data_auth().unwrap()).unwrap();
        assert_eq!(frame, json!({ "action": "auth", "key": "key1", "secret": "secret1" }));

        assert!(Credentials::oauth("tok").unwrap().to_market_data_auth().is_none());
    }

    #[test]
    fn trading_frame_shapes() {
        let pair = Credentials::key_pair("k", "s").unwrap();
        assert_eq!(
            serde_json::to_value(pair.to_trading_auth()).unwrap(),
            json!({ "action": "authenticate", "data": { "key_id": "k", "secret_key": "s" } })
        );

        let oauth = Credentials::oauth("tok").unwrap();
        assert_eq!(
            serde_json::to_value(oauth.to_trading_auth()).unwrap(),
            json!({ "action": "authenticate", "data": { "oauth_token": "tok" } })
        );
    }

    #[test_case(401 => AuthError::NotAuthenticated)]
    #[test_case(402 => AuthError::InvalidCredentials)]
    #[test_case(403 => AuthError::AlreadyAuthenticated)]
    #[test_case(404 => AuthError::Timeout)]
    #[test_case(406 => AuthError::ConnectionLimitExceeded)]
    #[test_case(500 => AuthError::ServerError { code: 500, message: "boom".into() })]
    fn auth_error_from_server_code(code: i32) -> AuthError {
        AuthError::from(&ErrorMessage {
            code,
            msg: "boom".to_string(),
        })
    }
}
