//! HTTP Transport
//!
//! One reqwest client per API root, with credentials attached as default
//! headers. Requests are not retried.
//!
//! # Responses
//!
//! - 2xx with a body: decoded JSON
//! - 2xx with an empty body: `null`
//! - anything else: [`ApiError::Status`] carrying the body's `code` and
//!   `message` when present, or the raw body text

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Method;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::application::ports::{ApiError, DataTransport, QueryParams};
use crate::infrastructure::alpaca::auth::Credentials;
use crate::infrastructure::metrics;

/// Authenticated JSON client rooted at one base URL.
#[derive(Debug, Clone)]
pub struct HttpClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpClient {
    /// Create a client for `base_url` (no trailing slash needed).
    ///
    /// # Errors
    ///
    /// Returns an error if a credential is not a valid header value or the
    /// TLS backend cannot be initialised.
    pub fn new(
        base_url: impl Into<String>,
        credentials: &Credentials,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        for (name, value) in credentials.auth_headers() {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| ApiError::InvalidRequest(e.to_string()))?;
            let mut value = HeaderValue::from_str(&value)
                .map_err(|e| ApiError::InvalidRequest(format!("{name}: {e}")))?;
            value.set_sensitive(true);
            headers.insert(name, value);
        }

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Base URL every path is appended to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET `path` and decode the body.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, a non-2xx status, or a body
    /// that does not decode into `T`.
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &QueryParams,
    ) -> Result<T, ApiError> {
        decode(self.execute(Method::GET, path, query, None).await?)
    }

    /// Send `body` as JSON with `method` and decode the response.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, a non-2xx status, or a body
    /// that does not decode into `T`.
    pub async fn send<B, T>(&self, method: Method, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let body = serde_json::to_value(body).map_err(|e| ApiError::InvalidRequest(e.to_string()))?;
        decode(self.execute(method, path, &QueryParams::new(), Some(body)).await?)
    }

    /// DELETE `path` and decode the response (`null` when empty).
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, a non-2xx status, or a body
    /// that does not decode into `T`.
    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        decode(self.execute(Method::DELETE, path, &QueryParams::new(), None).await?)
    }

    /// Issue one request and return the decoded JSON body.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, a non-2xx status, or a body
    /// that is not JSON.
    pub async fn execute(
        &self,
        method: Method,
        path: &str,
        query: &QueryParams,
        body: Option<Value>,
    ) -> Result<Value, ApiError> {
        let url = format!("{}{path}", self.base_url);
        let mut request = self.http.request(method.clone(), &url).query(query);
        if let Some(body) = &body {
            request = request.json(body);
        }

        let started = Instant::now();
        let response = request
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;
        let elapsed = started.elapsed();

        metrics::record_http_request(method.as_str(), status.as_u16(), elapsed);
        tracing::debug!(
            method = %method,
            path,
            status = status.as_u16(),
            elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            "REST request"
        );

        if !status.is_success() {
            return Err(status_error(status.as_u16(), &text));
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| ApiError::JsonParse(e.to_string()))
    }
}

#[async_trait]
impl DataTransport for HttpClient {
    async fn get_json(&self, path: &str, query: &QueryParams) -> Result<Value, ApiError> {
        self.execute(Method::GET, path, query, None).await
    }
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, ApiError> {
    serde_json::from_value(value).map_err(|e| ApiError::JsonParse(e.to_string()))
}

/// Build the error for a non-2xx response from its body.
fn status_error(status: u16, body: &str) -> ApiError {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let code = parsed.as_ref().and_then(|v| v.get("code")).and_then(Value::as_i64);
    let message = parsed
        .as_ref()
        .and_then(|v| v.get("message"))
        .and_then(Value::as_str)
        .map_or_else(|| body.trim().to_string(), str::to_owned);

    tracing::warn!(status, ?code, message = %message, "REST request failed");
    ApiError::Status {
        status,
        code,
        message,
    }
}
