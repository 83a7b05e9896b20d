// Error handling module
// Defines credential/store error types and their structured failure records

use thiserror::Error;

use crate::auth::{FailureRecord, Slot, BOOTSTRAP_HINT};

/// Errors raised by a credential store backend
#[derive(Error, Debug)]
pub enum StoreError {
    /// Adapter misuse: every read and write must name a service scope
    #[error("Credential store scope must not be blank")]
    InvalidScope,

    /// Keychain or secret service failure
    #[error("Credential store backend error: {0}")]
    Backend(String),

    /// Credential file could not be written
    #[error("Credential file I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Credential file could not be encoded
    #[error("Credential file encoding error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Errors from the token lifecycle
#[derive(Error, Debug)]
pub enum AuthError {
    /// Username or password blank for a login attempt
    #[error("Missing login credentials: {0}")]
    MissingCredentials(String),

    /// Token endpoint reachable but login produced no usable access token
    #[error("Login failed{}: {message}", status_suffix(.status))]
    LoginFailed { status: Option<u16>, message: String },

    /// Token endpoint reachable but refresh produced no usable access token
    #[error("Refresh failed{}: {message}", status_suffix(.status))]
    RefreshFailed { status: Option<u16>, message: String },

    /// Transport-level failure (timeout, connect, TLS, body)
    #[error("Network error ({kind}) @ {url}: {message}")]
    NetworkError {
        kind: &'static str,
        url: String,
        message: String,
    },

    /// A credential was obtained but could not be persisted
    #[error("Failed to persist {slot} to credential store: {source}")]
    StoreWriteFailed {
        slot: Slot,
        #[source]
        source: StoreError,
    },

    /// Credential store misuse on read
    #[error(transparent)]
    Store(#[from] StoreError),
}

fn status_suffix(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!(" (HTTP {})", code),
        None => String::new(),
    }
}

impl AuthError {
    /// Stable machine-readable kind
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::MissingCredentials(_) => "missing_credentials",
            AuthError::LoginFailed { .. } => "login_failed",
            AuthError::RefreshFailed { .. } => "refresh_failed",
            AuthError::NetworkError { .. } => "network_error",
            AuthError::StoreWriteFailed { .. } => "store_write_failed",
            AuthError::Store(_) => "store_error",
        }
    }

    /// HTTP status returned by the token endpoint, when there was one
    pub fn status_code(&self) -> Option<u16> {
        match self {
            AuthError::LoginFailed { status, .. } | AuthError::RefreshFailed { status, .. } => {
                *status
            }
            _ => None,
        }
    }

    /// What an operator should do next
    pub fn remediation(&self) -> &'static str {
        match self {
            AuthError::MissingCredentials(_) => BOOTSTRAP_HINT,
            AuthError::LoginFailed { .. } => {
                "Check LOCALLINE_USERNAME/LOCALLINE_PASSWORD and the API base URL, then rerun: localline auth-bootstrap"
            }
            AuthError::RefreshFailed { .. } => {
                "The stored refresh token was rejected. Run: localline auth-bootstrap"
            }
            AuthError::NetworkError { .. } => {
                "Check network access to the backoffice API and retry"
            }
            AuthError::StoreWriteFailed { .. } => {
                "Check credential store access (or use --store-backend file), then rerun: localline auth-bootstrap"
            }
            AuthError::Store(_) => "Set a non-blank LOCAL_LINE_KEYCHAIN_SERVICE",
        }
    }

    /// Structured record for rendering to the operator
    pub fn to_record(&self) -> FailureRecord {
        let status = match self {
            AuthError::StoreWriteFailed { .. } => "STORE_WRITE_FAILED",
            _ => "AUTH_FAILED",
        };

        FailureRecord {
            ok: false,
            status,
            error_kind: Some(self.kind()),
            status_code: self.status_code(),
            error: Some(self.to_string()),
            reason: None,
            fix: self.remediation(),
        }
    }
}

/// Errors from the fulfillment-week guard and date helpers
#[derive(Error, Debug, PartialEq)]
pub enum GuardError {
    #[error("Invalid date {0:?}: expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error(
        "Guard blocked run: expected current-week range {expected_start}..{expected_end}, got {start}..{end}. Use --allow-outside-current-week to override intentionally."
    )]
    OutsideCurrentWeek {
        expected_start: String,
        expected_end: String,
        start: String,
        end: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = AuthError::MissingCredentials("password".to_string());
        assert_eq!(err.to_string(), "Missing login credentials: password");

        let err = AuthError::LoginFailed {
            status: Some(401),
            message: "bad creds".to_string(),
        };
        assert_eq!(err.to_string(), "Login failed (HTTP 401): bad creds");

        let err = AuthError::RefreshFailed {
            status: None,
            message: "no access token returned".to_string(),
        };
        assert_eq!(err.to_string(), "Refresh failed: no access token returned");
    }

    #[test]
    fn test_network_error_message() {
        let err = AuthError::NetworkError {
            kind: "timeout",
            url: "http://api/token/".to_string(),
            message: "operation timed out".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Network error (timeout) @ http://api/token/: operation timed out"
        );
        assert_eq!(err.kind(), "network_error");
        assert_eq!(err.status_code(), None);
    }

    #[test]
    fn test_store_write_failed_is_distinct() {
        let err = AuthError::StoreWriteFailed {
            slot: Slot::RefreshToken,
            source: StoreError::Backend("locked".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "Failed to persist refresh_token to credential store: Credential store backend error: locked"
        );

        let record = err.to_record();
        assert_eq!(record.status, "STORE_WRITE_FAILED");
        assert_eq!(record.error_kind, Some("store_write_failed"));
        assert!(!record.ok);
    }

    #[test]
    fn test_failure_record_carries_status_code() {
        let err = AuthError::LoginFailed {
            status: Some(400),
            message: "{\"detail\":\"No active account\"}".to_string(),
        };
        let record = err.to_record();
        assert_eq!(record.status, "AUTH_FAILED");
        assert_eq!(record.status_code, Some(400));
        assert_eq!(record.error_kind, Some("login_failed"));
        assert!(record.error.unwrap().contains("No active account"));
    }

    #[test]
    fn test_store_misuse_converts() {
        let err: AuthError = StoreError::InvalidScope.into();
        assert_eq!(err.kind(), "store_error");
        assert_eq!(err.to_string(), "Credential store scope must not be blank");
    }

    #[test]
    fn test_guard_error_message() {
        let err = GuardError::OutsideCurrentWeek {
            expected_start: "2026-10-09".to_string(),
            expected_end: "2026-10-15".to_string(),
            start: "2026-10-01".to_string(),
            end: "2026-10-07".to_string(),
        };
        assert!(err
            .to_string()
            .starts_with("Guard blocked run: expected current-week range 2026-10-09..2026-10-15"));
    }
}
