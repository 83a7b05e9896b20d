// Token endpoint client
// Login and refresh calls against the backoffice token routes

use anyhow::{Context, Result};
use reqwest::{header, Client};
use serde_json::{json, Value};
use std::time::Duration;

use super::types::{redact, EndpointUrls, LoginCredentials, RemoteEnvelope};
use crate::error::AuthError;
use crate::http_client::error_kind;

/// Cookie the refresh route reads the refresh token from.
/// Sending the token as a JSON field does not refresh the session.
pub const REFRESH_COOKIE_NAME: &str = "backoffice_refresh_token";

/// Why a token endpoint POST did not produce an envelope
enum PostFailure {
    Status { status: u16, body: String },
    Transport(reqwest::Error),
}

impl PostFailure {
    fn into_auth_error(
        self,
        url: &str,
        remote: fn(Option<u16>, String) -> AuthError,
    ) -> AuthError {
        match self {
            PostFailure::Status { status, body } => {
                let message = if body.trim().is_empty() {
                    format!("empty response body from {}", url)
                } else {
                    body
                };
                remote(Some(status), message)
            }
            PostFailure::Transport(e) => AuthError::NetworkError {
                kind: error_kind(&e),
                url: url.to_string(),
                message: e.to_string(),
            },
        }
    }
}

fn login_failed(status: Option<u16>, message: String) -> AuthError {
    AuthError::LoginFailed { status, message }
}

fn refresh_failed(status: Option<u16>, message: String) -> AuthError {
    AuthError::RefreshFailed { status, message }
}

/// HTTP client for the token routes
pub struct TokenEndpoint {
    client: Client,
}

impl TokenEndpoint {
    /// Create a client whose calls fail after `timeout`
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create token endpoint HTTP client")?;

        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// POST `{base}/token/` with username and password
    pub async fn login(
        &self,
        base_url: &str,
        credentials: &LoginCredentials,
    ) -> Result<RemoteEnvelope, AuthError> {
        let url = EndpointUrls::new(base_url).token_url;
        tracing::info!("Logging in to backoffice token endpoint as {}...", credentials.username);

        let payload = json!({
            "username": credentials.username,
            "password": credentials.password,
        });

        self.post(&url, &payload, None)
            .await
            .map_err(|failure| failure.into_auth_error(&url, login_failed))
    }

    /// POST `{base}/token/refresh/` with the refresh token in a cookie
    pub async fn refresh(
        &self,
        base_url: &str,
        refresh_token: &str,
    ) -> Result<RemoteEnvelope, AuthError> {
        let url = EndpointUrls::new(base_url).refresh_url;
        tracing::info!(
            "Refreshing backoffice access token (refresh token {})...",
            redact(refresh_token)
        );

        let cookie = format!("{}={}", REFRESH_COOKIE_NAME, refresh_token.trim());

        self.post(&url, &json!({}), Some(cookie))
            .await
            .map_err(|failure| failure.into_auth_error(&url, refresh_failed))
    }

    async fn post(
        &self,
        url: &str,
        payload: &Value,
        cookie: Option<String>,
    ) -> std::result::Result<RemoteEnvelope, PostFailure> {
        let mut request = self
            .client
            .post(url)
            .header(header::ACCEPT, "application/json")
            .json(payload);
        if let Some(cookie) = cookie {
            request = request.header(header::COOKIE, cookie);
        }

        let response = request.send().await.map_err(|e| {
            tracing::warn!(
                error_kind = error_kind(&e),
                error = %e,
                url = %url,
                "Token endpoint request error"
            );
            PostFailure::Transport(e)
        })?;

        let status = response.status();
        let set_cookies: Vec<String> = response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
            .collect();

        let text = response.text().await.map_err(PostFailure::Transport)?;

        tracing::debug!(
            status = %status,
            set_cookie_count = set_cookies.len(),
            "Received token endpoint response"
        );

        if !status.is_success() {
            tracing::error!(
                status = status.as_u16(),
                url = %url,
                response_body = %text,
                "Token endpoint returned error status"
            );
            return Err(PostFailure::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        Ok(RemoteEnvelope::from_parts(status.as_u16(), &text, set_cookies))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn endpoint() -> TokenEndpoint {
        TokenEndpoint::new(Duration::from_secs(5)).unwrap()
    }

    fn credentials() -> LoginCredentials {
        LoginCredentials {
            username: "ops@example.com".to_string(),
            password: "pw".to_string(),
        }
    }

    #[tokio::test]
    async fn test_login_posts_json_credentials() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/token/")
            .match_header("content-type", "application/json")
            .match_body(Matcher::Json(json!({
                "username": "ops@example.com",
                "password": "pw"
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_header("set-cookie", "refresh=R2; Path=/")
            .with_body(r#"{"access":"A1"}"#)
            .create_async()
            .await;

        let envelope = endpoint().login(&server.url(), &credentials()).await.unwrap();

        mock.assert_async().await;
        assert_eq!(envelope.status, 200);
        assert_eq!(envelope.field("access"), "A1");
        assert_eq!(envelope.set_cookies, vec!["refresh=R2; Path=/".to_string()]);
    }

    #[tokio::test]
    async fn test_refresh_sends_cookie_not_json_field() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/token/refresh/")
            .match_header("cookie", "backoffice_refresh_token=R0")
            .match_body(Matcher::Json(json!({})))
            .with_status(200)
            .with_body(r#"{"access":"A2"}"#)
            .create_async()
            .await;

        let envelope = endpoint().refresh(&server.url(), "R0").await.unwrap();

        mock.assert_async().await;
        assert_eq!(envelope.field("access"), "A2");
    }

    #[tokio::test]
    async fn test_non_utf8_set_cookie_is_kept() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        // hand-rolled server: header values outside UTF-8 cannot be set through mockito
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let _ = socket.read(&mut buf).await.unwrap();

            let body = br#"{"access":"A1"}"#;
            let mut response = Vec::new();
            response.extend_from_slice(b"HTTP/1.1 200 OK\r\n");
            response.extend_from_slice(b"Content-Type: application/json\r\n");
            response.extend_from_slice(b"Set-Cookie: sess=caf\xe9; Path=/\r\n");
            response.extend_from_slice(b"Set-Cookie: refresh=R2\r\n");
            let length = format!("Content-Length: {}\r\n", body.len());
            response.extend_from_slice(length.as_bytes());
            response.extend_from_slice(b"Connection: close\r\n\r\n");
            response.extend_from_slice(body);
            socket.write_all(&response).await.unwrap();
            let _ = socket.shutdown().await;
        });

        let envelope = endpoint().login(&base, &credentials()).await.unwrap();
        server.await.unwrap();

        assert_eq!(envelope.set_cookies.len(), 2);
        assert!(envelope.set_cookies[0].starts_with("sess=caf"));
        assert_eq!(envelope.set_cookies[1], "refresh=R2");
    }

    #[tokio::test]
    async fn test_error_status_maps_to_login_failed() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/token/")
            .with_status(401)
            .with_body(r#"{"detail":"No active account found"}"#)
            .create_async()
            .await;

        let err = endpoint()
            .login(&server.url(), &credentials())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "login_failed");
        assert_eq!(err.status_code(), Some(401));
        assert!(err.to_string().contains("No active account found"));
    }

    #[tokio::test]
    async fn test_error_status_maps_to_refresh_failed() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/token/refresh/")
            .with_status(403)
            .create_async()
            .await;

        let err = endpoint().refresh(&server.url(), "stale").await.unwrap_err();

        assert!(matches!(
            err,
            AuthError::RefreshFailed {
                status: Some(403),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_network_error() {
        // port 1 is reserved and refuses connections
        let err = endpoint()
            .login("http://127.0.0.1:1", &credentials())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "network_error");
        assert!(matches!(err, AuthError::NetworkError { ref url, .. } if url == "http://127.0.0.1:1/token/"));
    }
}
