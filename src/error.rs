//! Error types for the client core.
//!
//! `PlatformError` is what the backend client produces. The auth gateway
//! reclassifies it into `AuthError`; the repositories wrap it into a flat
//! `ServiceError`. Raw transport errors never leave those layers.

use reqwest::StatusCode;
use tracing::{debug, error};

/// Failure talking to the hosted backend.
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{message} (HTTP {status})")]
    Api {
        status: StatusCode,
        code: Option<String>,
        message: String,
    },

    #[error("unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("request cancelled")]
    Cancelled,
}

impl PlatformError {
    /// Human-readable message, without the status suffix for API errors.
    pub fn message(&self) -> String {
        match self {
            PlatformError::Api { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    /// Structured error code, when the backend sent one.
    pub fn code(&self) -> Option<&str> {
        match self {
            PlatformError::Api { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            PlatformError::Api { status, .. } => Some(*status),
            PlatformError::Transport(e) => e.status(),
            _ => None,
        }
    }
}

/// Which input an auth failure should be shown against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorKind {
    Email,
    Password,
    DisplayName,
    General,
    Cancelled,
}

#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct AuthError {
    pub kind: AuthErrorKind,
    pub message: String,
    #[source]
    pub source: Option<PlatformError>,
}

impl AuthError {
    pub fn new(kind: AuthErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    pub fn general(message: impl Into<String>) -> Self {
        Self::new(AuthErrorKind::General, message)
    }

    pub fn cancelled() -> Self {
        Self {
            kind: AuthErrorKind::Cancelled,
            message: "Request cancelled".to_string(),
            source: Some(PlatformError::Cancelled),
        }
    }

    pub fn with_source(mut self, source: PlatformError) -> Self {
        self.source = Some(source);
        self
    }

    /// True when the error belongs next to a form field rather than in a banner.
    pub fn is_field_error(&self) -> bool {
        matches!(
            self.kind,
            AuthErrorKind::Email | AuthErrorKind::Password | AuthErrorKind::DisplayName
        )
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind == AuthErrorKind::Cancelled
    }

    /// The backend refused the request outright (4xx), as opposed to being
    /// unreachable or failing on its side.
    pub fn is_rejected(&self) -> bool {
        self.source
            .as_ref()
            .and_then(PlatformError::status)
            .is_some_and(|s| s.is_client_error())
    }
}

/// Failure of a topic, news or profile repository call.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{message}")]
    Backend {
        message: String,
        #[source]
        source: PlatformError,
    },

    #[error("{0}")]
    Invalid(String),

    #[error("Not signed in")]
    NotSignedIn,

    #[error("Request cancelled")]
    Cancelled,
}

impl ServiceError {
    /// Wrap a backend failure under a stable message, keeping it as the cause.
    pub fn wrap(message: impl Into<String>, source: PlatformError) -> Self {
        let message = message.into();
        match source {
            PlatformError::Cancelled => {
                debug!("{} (cancelled by caller)", message);
                ServiceError::Cancelled
            }
            source => {
                error!(error = %source, "{}", message);
                ServiceError::Backend { message, source }
            }
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ServiceError::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    fn api_error(code: Option<&str>, message: &str) -> PlatformError {
        PlatformError::Api {
            status: StatusCode::BAD_REQUEST,
            code: code.map(|c| c.to_string()),
            message: message.to_string(),
        }
    }

    #[test]
    fn test_platform_error_message_strips_status() {
        let err = api_error(Some("PGRST116"), "No rows found");
        assert_eq!(err.message(), "No rows found");
        assert_eq!(err.to_string(), "No rows found (HTTP 400 Bad Request)");
        assert_eq!(err.code(), Some("PGRST116"));
        assert_eq!(err.status(), Some(StatusCode::BAD_REQUEST));
    }

    #[test]
    fn test_cancelled_has_no_code() {
        let err = PlatformError::Cancelled;
        assert_eq!(err.code(), None);
        assert_eq!(err.status(), None);
    }

    #[test]
    fn test_wrap_keeps_cause() {
        let err = ServiceError::wrap("Failed to fetch news articles", api_error(None, "boom"));

        assert_eq!(err.to_string(), "Failed to fetch news articles");
        let cause = err.source().expect("cause should be kept");
        assert!(cause.to_string().contains("boom"));
        assert!(!err.is_cancelled());
    }

    #[test]
    fn test_wrap_cancelled_becomes_cancelled() {
        let err = ServiceError::wrap("Failed to fetch news articles", PlatformError::Cancelled);
        assert!(err.is_cancelled());
    }

    #[test]
    fn test_auth_error_field_kinds() {
        assert!(AuthError::new(AuthErrorKind::Email, "bad").is_field_error());
        assert!(AuthError::new(AuthErrorKind::Password, "bad").is_field_error());
        assert!(AuthError::new(AuthErrorKind::DisplayName, "bad").is_field_error());
        assert!(!AuthError::general("bad").is_field_error());
        assert!(!AuthError::cancelled().is_field_error());
        assert!(AuthError::cancelled().is_cancelled());
    }

    #[test]
    fn test_rejected_only_for_client_errors() {
        let rejected = AuthError::general("bad token")
            .with_source(api_error(None, "Invalid Refresh Token"));
        assert!(rejected.is_rejected());

        let outage = AuthError::general("down").with_source(PlatformError::Api {
            status: StatusCode::SERVICE_UNAVAILABLE,
            code: None,
            message: "Service Unavailable".to_string(),
        });
        assert!(!outage.is_rejected());
        assert!(!AuthError::general("no cause").is_rejected());
        assert!(!AuthError::cancelled().is_rejected());
    }

    #[test]
    fn test_auth_error_display_is_message() {
        let err = AuthError::general("Incorrect email or password. Please try again.")
            .with_source(api_error(Some("invalid_credentials"), "Invalid login credentials"));
        assert_eq!(
            err.to_string(),
            "Incorrect email or password. Please try again."
        );
        assert!(err.source().is_some());
    }
}
