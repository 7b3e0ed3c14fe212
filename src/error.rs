// Error handling module
// Session-ending causes and the caller-facing API error

use thiserror::Error;

use crate::auth::SESSION_EXPIRED;

/// Why a session ended. Only logged; callers see [`SessionEnded`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AuthError {
    /// Refresh token expired locally, nothing to refresh with
    #[error("Refresh token expired")]
    ExpiredRefresh,

    /// Backend refused the refresh token (revoked, blacklisted, invalid)
    #[error("Refresh rejected: {status}{}", fmt_detail(.detail))]
    RefreshRejected { status: u16, detail: Option<String> },

    /// Network-level failure during refresh
    #[error("Refresh transport error: {0}")]
    RefreshTransport(String),

    /// A response reported the access token as not authenticated
    #[error("Unauthorized response{}", fmt_detail(.detail))]
    Unauthorized { detail: Option<String> },
}

fn fmt_detail(detail: &Option<String>) -> String {
    detail
        .as_ref()
        .map(|d| format!(" - {}", d))
        .unwrap_or_default()
}

impl AuthError {
    /// Human-readable reason shown on the login view
    pub fn logout_reason(&self) -> String {
        match self {
            AuthError::RefreshRejected {
                detail: Some(detail),
                ..
            }
            | AuthError::Unauthorized {
                detail: Some(detail),
            } => detail.clone(),
            _ => SESSION_EXPIRED.to_string(),
        }
    }

    pub fn into_session_ended(self) -> SessionEnded {
        SessionEnded::new(self.logout_reason())
    }
}

/// The generic abort every caller above the interceptors receives when the
/// session is gone
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Session ended: {reason}")]
pub struct SessionEnded {
    pub reason: String,
}

impl SessionEnded {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    pub fn expired() -> Self {
        Self::new(SESSION_EXPIRED)
    }
}

/// Errors surfaced by the API client
#[derive(Error, Debug)]
pub enum ApiError {
    /// The call did not complete because the session ended
    #[error(transparent)]
    SessionEnded(#[from] SessionEnded),

    /// Non-success response other than 401
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Network failure on an ordinary request
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Credential store failure
    #[error("Credential store error: {0}")]
    Store(#[source] anyhow::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn is_session_ended(&self) -> bool {
        matches!(self, ApiError::SessionEnded(_))
    }

    /// HTTP status for `Api` errors
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Result type alias for API operations
pub type Result<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(AuthError::ExpiredRefresh.to_string(), "Refresh token expired");

        let err = AuthError::RefreshRejected {
            status: 401,
            detail: Some("Token is blacklisted".to_string()),
        };
        assert_eq!(err.to_string(), "Refresh rejected: 401 - Token is blacklisted");

        let err = AuthError::RefreshRejected {
            status: 502,
            detail: None,
        };
        assert_eq!(err.to_string(), "Refresh rejected: 502");

        let err = AuthError::Unauthorized { detail: None };
        assert_eq!(err.to_string(), "Unauthorized response");
    }

    #[test]
    fn test_logout_reason_prefers_backend_detail() {
        let err = AuthError::Unauthorized {
            detail: Some("Given token not valid for any token type".to_string()),
        };
        assert_eq!(err.logout_reason(), "Given token not valid for any token type");

        let err = AuthError::RefreshRejected {
            status: 401,
            detail: Some("Token is blacklisted".to_string()),
        };
        assert_eq!(err.into_session_ended().reason, "Token is blacklisted");
    }

    #[test]
    fn test_logout_reason_defaults_to_session_expired() {
        for err in [
            AuthError::ExpiredRefresh,
            AuthError::RefreshTransport("connection reset".to_string()),
            AuthError::RefreshRejected {
                status: 500,
                detail: None,
            },
            AuthError::Unauthorized { detail: None },
        ] {
            assert_eq!(err.logout_reason(), "session expired");
        }
    }

    #[test]
    fn test_api_error_messages() {
        let err = ApiError::from(SessionEnded::expired());
        assert_eq!(err.to_string(), "Session ended: session expired");
        assert!(err.is_session_ended());
        assert_eq!(err.status(), None);

        let err = ApiError::Api {
            status: 429,
            message: "Rate limit exceeded".to_string(),
        };
        assert_eq!(err.to_string(), "API error: 429 - Rate limit exceeded");
        assert_eq!(err.status(), Some(429));

        let err = ApiError::Internal(anyhow::anyhow!("Something went wrong"));
        assert_eq!(err.to_string(), "Internal error: Something went wrong");
    }
}
