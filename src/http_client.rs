use anyhow::{Context, Result};
use reqwest::{header, Client, RequestBuilder};
use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;

/// Categorize a transport error for logs and failure records
pub fn error_kind(e: &reqwest::Error) -> &'static str {
    if e.is_timeout() {
        "timeout"
    } else if e.is_connect() {
        "connection_failed"
    } else if e.is_request() {
        "request_error"
    } else if e.is_body() {
        "body_error"
    } else if e.is_decode() {
        "decode_error"
    } else if e.is_builder() {
        "builder_error"
    } else {
        "unknown"
    }
}

/// Outcome of one backoffice API call
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ApiResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    pub ok: bool,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
}

impl ApiResponse {
    fn transport_failure(url: String, e: &reqwest::Error) -> Self {
        Self {
            status_code: None,
            ok: false,
            url,
            data: None,
            error: Some(e.to_string()),
            error_kind: Some(error_kind(e)),
        }
    }
}

/// JSON when the body looks like JSON, otherwise `{"raw": text}`
fn parse_body(text: &str) -> Value {
    let trimmed = text.trim_start();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        if let Ok(value) = serde_json::from_str(text) {
            return value;
        }
    }
    json!({ "raw": text })
}

/// HTTP client for backoffice business endpoints. No retries.
pub struct BackofficeClient {
    client: Client,
}

impl BackofficeClient {
    /// Create a new HTTP client
    pub fn new(request_timeout: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(request_timeout))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }

    /// GET returning JSON
    pub async fn get_json(
        &self,
        url: &str,
        token: Option<&str>,
        query: &[(&str, String)],
    ) -> ApiResponse {
        let request = self.client.get(url).query(query);
        self.execute(url, self.authorize(request, token)).await
    }

    /// POST a JSON payload; repeated query keys are sent as repeated parameters
    pub async fn post_json(
        &self,
        url: &str,
        token: Option<&str>,
        payload: &Value,
        query: &[(&str, String)],
    ) -> ApiResponse {
        let request = self.client.post(url).query(query).json(payload);
        self.execute(url, self.authorize(request, token)).await
    }

    /// POST form-encoded fields
    pub async fn post_form(
        &self,
        url: &str,
        token: Option<&str>,
        query: &[(&str, String)],
        fields: &[(&str, &str)],
    ) -> ApiResponse {
        let request = self.client.post(url).query(query).form(fields);
        self.execute(url, self.authorize(request, token)).await
    }

    fn authorize(&self, request: RequestBuilder, token: Option<&str>) -> RequestBuilder {
        let request = request.header(header::ACCEPT, "application/json");
        match token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn execute(&self, base_url: &str, request: RequestBuilder) -> ApiResponse {
        let request = match request.build() {
            Ok(request) => request,
            Err(e) => return ApiResponse::transport_failure(base_url.to_string(), &e),
        };

        let method = request.method().clone();
        let url = request.url().to_string();
        tracing::debug!(method = %method, url = %url, "Sending HTTP request");

        let response = match self.client.execute(request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(
                    error_kind = error_kind(&e),
                    error = %e,
                    url = %url,
                    "HTTP request failed"
                );
                return ApiResponse::transport_failure(url, &e);
            }
        };

        let status = response.status();
        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => return ApiResponse::transport_failure(url, &e),
        };

        if status.is_success() {
            tracing::debug!(status = %status, "Request successful");
            return ApiResponse {
                status_code: Some(status.as_u16()),
                ok: true,
                url,
                data: Some(parse_body(&text)),
                error: None,
                error_kind: None,
            };
        }

        tracing::warn!(
            status = status.as_u16(),
            url = %url,
            response_body = %text,
            "HTTP request failed with error response"
        );

        ApiResponse {
            status_code: Some(status.as_u16()),
            ok: false,
            url,
            data: None,
            error: Some(text),
            error_kind: None,
        }
    }
}
