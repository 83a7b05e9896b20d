// Authentication types

use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;

use crate::error::AuthError;

/// Reason reported when no credential source produced a token
pub const MISSING_REFRESH_TOKEN: &str = "missing_refresh_token";

/// Remediation hint for operators when credentials must be re-established
pub const BOOTSTRAP_HINT: &str =
    "Run: LOCALLINE_USERNAME=... LOCALLINE_PASSWORD=... localline auth-bootstrap";

/// Short, log-safe prefix of a secret
pub fn redact(secret: &str) -> String {
    if secret.is_empty() {
        return "<empty>".to_string();
    }
    let prefix: String = secret.chars().take(6).collect();
    format!("{}...", prefix)
}

/// Access/refresh credential pair returned by login and refresh calls
#[derive(Clone, PartialEq, Eq)]
pub struct TokenPair {
    /// Short-lived bearer credential, never empty once returned
    pub access: String,
    /// Longer-lived credential; empty when the server issued none
    pub refresh: String,
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access", &redact(&self.access))
            .field("refresh", &redact(&self.refresh))
            .finish()
    }
}

/// Named slot inside a credential store scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Slot {
    AccessToken,
    RefreshToken,
}

impl Slot {
    pub fn as_str(&self) -> &'static str {
        match self {
            Slot::AccessToken => "access_token",
            Slot::RefreshToken => "refresh_token",
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provenance of the access token handed to the caller.
/// Diagnostic only: nothing branches on it for authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CredentialSource {
    /// Direct override token from the environment
    EnvDirect,
    /// Fresh access token obtained with the stored refresh token
    StoreRefresh,
    /// Cached access token from the store, not validated
    StoreAccess,
    /// Nothing usable was found
    None,
}

impl CredentialSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialSource::EnvDirect => "env-direct",
            CredentialSource::StoreRefresh => "store-refresh",
            CredentialSource::StoreAccess => "store-access",
            CredentialSource::None => "none",
        }
    }
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a single credential resolution
#[derive(Clone, PartialEq)]
pub struct TokenResolution {
    pub token: Option<String>,
    pub source: CredentialSource,
    /// Refresh failure that was downgraded to a fallback, if any
    pub refresh_error: Option<String>,
}

impl TokenResolution {
    pub fn resolved(token: String, source: CredentialSource) -> Self {
        Self {
            token: Some(token),
            source,
            refresh_error: None,
        }
    }

    pub fn missing() -> Self {
        Self {
            token: None,
            source: CredentialSource::None,
            refresh_error: None,
        }
    }

    pub fn with_refresh_error(mut self, refresh_error: Option<String>) -> Self {
        self.refresh_error = refresh_error;
        self
    }

    pub fn is_resolved(&self) -> bool {
        self.token.is_some()
    }

    /// Source tag, or the missing-token sentinel when nothing resolved
    pub fn reason(&self) -> &'static str {
        match self.token {
            Some(_) => self.source.as_str(),
            None => MISSING_REFRESH_TOKEN,
        }
    }
}

impl fmt::Debug for TokenResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenResolution")
            .field("token", &self.token.as_deref().map(redact))
            .field("source", &self.source)
            .field("refresh_error", &self.refresh_error)
            .finish()
    }
}

/// Parsed token endpoint response. Built per call and discarded after extraction.
#[derive(Debug, Clone, Default)]
pub struct RemoteEnvelope {
    pub status: u16,
    pub body: Map<String, Value>,
    /// Raw Set-Cookie header values in response order
    pub set_cookies: Vec<String>,
}

impl RemoteEnvelope {
    /// Build from a raw response. A body that is not a JSON object is treated as empty.
    pub fn from_parts(status: u16, text: &str, set_cookies: Vec<String>) -> Self {
        let body = match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(map)) => map,
            Ok(_) | Err(_) => {
                tracing::debug!("Token endpoint body is not a JSON object, ignoring it");
                Map::new()
            }
        };

        Self {
            status,
            body,
            set_cookies,
        }
    }

    /// Trimmed string form of a body field; empty when absent, null, boolean, or structured
    pub fn field(&self, key: &str) -> String {
        match self.body.get(key) {
            Some(Value::String(s)) => s.trim().to_string(),
            Some(Value::Number(n)) => n.to_string(),
            _ => String::new(),
        }
    }
}

/// Token endpoint URLs derived from the API base
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointUrls {
    pub auth_base: String,
    pub token_url: String,
    pub refresh_url: String,
}

impl EndpointUrls {
    pub fn new(base_url: &str) -> Self {
        let auth_base = base_url.trim_end_matches('/').to_string();
        Self {
            token_url: format!("{}/token/", auth_base),
            refresh_url: format!("{}/token/refresh/", auth_base),
            auth_base,
        }
    }
}

/// Username/password used for the login route
#[derive(Clone, Serialize)]
pub struct LoginCredentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for LoginCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Explicit inputs for every token lifecycle operation
#[derive(Clone)]
pub struct AuthConfig {
    base_url: String,
    store_scope: String,
    direct_token: Option<String>,
    username: Option<String>,
    password: Option<String>,
}

impl AuthConfig {
    pub fn new(base_url: impl Into<String>, store_scope: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            store_scope: store_scope.into(),
            direct_token: None,
            username: None,
            password: None,
        }
    }

    pub fn with_direct_token(mut self, token: Option<String>) -> Self {
        self.direct_token = token;
        self
    }

    pub fn with_login(mut self, username: Option<String>, password: Option<String>) -> Self {
        self.username = username;
        self.password = password;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn store_scope(&self) -> &str {
        &self.store_scope
    }

    pub fn urls(&self) -> EndpointUrls {
        EndpointUrls::new(&self.base_url)
    }

    /// Direct override token, if one is set and not blank
    pub fn direct_token(&self) -> Option<&str> {
        self.direct_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }

    /// Username and password for login; fails if either is blank
    pub fn login_credentials(&self) -> Result<LoginCredentials, AuthError> {
        let username = non_blank(self.username.as_deref());
        let password = non_blank(self.password.as_deref());

        match (username, password) {
            (Some(username), Some(password)) => Ok(LoginCredentials {
                username: username.to_string(),
                password: password.to_string(),
            }),
            (None, Some(_)) => Err(AuthError::MissingCredentials("username".to_string())),
            (Some(_), None) => Err(AuthError::MissingCredentials("password".to_string())),
            (None, None) => Err(AuthError::MissingCredentials(
                "username and password".to_string(),
            )),
        }
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("base_url", &self.base_url)
            .field("store_scope", &self.store_scope)
            .field("direct_token", &self.direct_token().map(redact))
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Result of a successful bootstrap
#[derive(Debug, Clone, Serialize)]
pub struct BootstrapRecord {
    pub ok: bool,
    pub status: &'static str,
    #[serde(flatten)]
    pub urls: EndpointUrls,
    pub stored_refresh: bool,
    pub stored_access: bool,
    /// Number of raw Set-Cookie headers in the login response
    pub set_cookie_count: usize,
    /// Distinct cookie names seen, first-seen order
    pub cookie_names: Vec<String>,
}

/// Credential health report
#[derive(Debug, Clone, Serialize)]
pub struct StatusRecord {
    pub ok: bool,
    pub status: &'static str,
    #[serde(flatten)]
    pub urls: EndpointUrls,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<CredentialSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fix: Option<&'static str>,
}

/// Structured failure surfaced to the operator
#[derive(Debug, Clone, Serialize)]
pub struct FailureRecord {
    pub ok: bool,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub fix: &'static str,
}

impl FailureRecord {
    /// Failure for commands that found no usable credential
    pub fn no_credential(reason: &str) -> Self {
        Self {
            ok: false,
            status: "AUTH_FAILED",
            error_kind: None,
            status_code: None,
            error: None,
            reason: Some(reason.to_string()),
            fix: BOOTSTRAP_HINT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_fields() {
        let envelope = RemoteEnvelope::from_parts(
            200,
            r#"{"access":"  A1 ","refresh":null,"count":7}"#,
            vec![],
        );
        assert_eq!(envelope.field("access"), "A1");
        assert_eq!(envelope.field("refresh"), "");
        assert_eq!(envelope.field("count"), "7");
        assert_eq!(envelope.field("missing"), "");
    }

    #[test]
    fn test_envelope_non_object_body() {
        let envelope = RemoteEnvelope::from_parts(200, "<html>oops</html>", vec![]);
        assert!(envelope.body.is_empty());

        let envelope = RemoteEnvelope::from_parts(200, r#"["access"]"#, vec![]);
        assert!(envelope.body.is_empty());
    }

    #[test]
    fn test_endpoint_urls_trim_trailing_slash() {
        let urls = EndpointUrls::new("https://cfc.localline.ca/api/backoffice/v2/");
        assert_eq!(urls.auth_base, "https://cfc.localline.ca/api/backoffice/v2");
        assert_eq!(
            urls.token_url,
            "https://cfc.localline.ca/api/backoffice/v2/token/"
        );
        assert_eq!(
            urls.refresh_url,
            "https://cfc.localline.ca/api/backoffice/v2/token/refresh/"
        );
    }

    #[test]
    fn test_direct_token_blank_is_absent() {
        let config = AuthConfig::new("http://x", "svc").with_direct_token(Some("   ".into()));
        assert_eq!(config.direct_token(), None);

        let config = AuthConfig::new("http://x", "svc").with_direct_token(Some(" tok ".into()));
        assert_eq!(config.direct_token(), Some("tok"));
    }

    #[test]
    fn test_login_credentials_require_both() {
        let config = AuthConfig::new("http://x", "svc")
            .with_login(Some("user".into()), Some(" ".into()));
        let err = config.login_credentials().unwrap_err();
        assert!(matches!(err, AuthError::MissingCredentials(ref m) if m == "password"));

        let config = AuthConfig::new("http://x", "svc").with_login(None, None);
        let err = config.login_credentials().unwrap_err();
        assert!(matches!(err, AuthError::MissingCredentials(ref m) if m == "username and password"));

        let config = AuthConfig::new("http://x", "svc")
            .with_login(Some(" user ".into()), Some("pw".into()));
        let creds = config.login_credentials().unwrap();
        assert_eq!(creds.username, "user");
        assert_eq!(creds.password, "pw");
    }

    #[test]
    fn test_debug_output_redacts_secrets() {
        let config = AuthConfig::new("http://x", "svc")
            .with_direct_token(Some("supersecrettoken".into()))
            .with_login(Some("user".into()), Some("hunter2".into()));
        let printed = format!("{:?}", config);
        assert!(!printed.contains("supersecrettoken"));
        assert!(!printed.contains("hunter2"));

        let pair = TokenPair {
            access: "access-token-value".into(),
            refresh: String::new(),
        };
        let printed = format!("{:?}", pair);
        assert!(!printed.contains("access-token-value"));
        assert!(printed.contains("<empty>"));
    }

    #[test]
    fn test_resolution_reason() {
        let resolution = TokenResolution::resolved("tok".into(), CredentialSource::StoreAccess);
        assert_eq!(resolution.reason(), "store-access");
        assert_eq!(TokenResolution::missing().reason(), MISSING_REFRESH_TOKEN);
    }

    #[test]
    fn test_source_serialization() {
        assert_eq!(
            serde_json::to_value(CredentialSource::EnvDirect).unwrap(),
            json!("env-direct")
        );
        assert_eq!(
            serde_json::to_value(CredentialSource::StoreRefresh).unwrap(),
            json!("store-refresh")
        );
    }

    #[test]
    fn test_bootstrap_record_flattens_urls() {
        let record = BootstrapRecord {
            ok: true,
            status: "AUTH_OK",
            urls: EndpointUrls::new("http://api"),
            stored_refresh: false,
            stored_access: true,
            set_cookie_count: 0,
            cookie_names: vec![],
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["token_url"], "http://api/token/");
        assert_eq!(value["stored_access"], true);
        assert_eq!(value["set_cookie_count"], 0);
    }
}
