//! HTTP seam shared by exchange clients and webhook channels.
//!
//! Everything above this module speaks [`HttpRequest`] / [`HttpResponse`];
//! tests swap in a scripted [`HttpClient`] instead of touching the network.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Per-request timeout unless the caller overrides it.
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    /// Lower-cased names.
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
    pub timeout_ms: u64,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            headers: BTreeMap::new(),
            body: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }

    /// `POST` with a JSON body, as webhook bots expect.
    pub fn post_json(url: impl Into<String>, body: impl Into<String>) -> Self {
        let mut request = Self::get(url).with_header("content-type", "application/json");
        request.method = HttpMethod::Post;
        request.body = Some(body.into());
        request
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn ok_json(body: impl Into<String>) -> Self {
        Self::new(200, body)
    }

    pub const fn is_success(&self) -> bool {
        matches!(self.status, 200..=299)
    }

    pub const fn is_server_error(&self) -> bool {
        self.status >= 500
    }

    /// First `max_chars` characters of the body, for error messages.
    pub fn body_snippet(&self, max_chars: usize) -> String {
        let mut snippet: String = self.body.chars().take(max_chars).collect();
        if self.body.chars().nth(max_chars).is_some() {
            snippet.push_str("...");
        }
        snippet
    }
}

/// Failure below HTTP status level: connect, timeout, body read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpError {
    message: String,
    retryable: bool,
}

impl HttpError {
    /// A retryable failure.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }

    pub fn non_retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn retryable(&self) -> bool {
        self.retryable
    }
}

impl Display for HttpError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for HttpError {}

pub type HttpFuture<'a> = Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>>;

pub trait HttpClient: Send + Sync {
    fn execute<'a>(&'a self, request: HttpRequest) -> HttpFuture<'a>;
}

/// Production client. One connection pool is shared by every clone.
#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .user_agent(concat!("tickwatch/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_else(|error| {
                tracing::warn!(error = %error, "falling back to default reqwest client");
                reqwest::Client::new()
            });
        Self { client }
    }

    fn build(&self, request: HttpRequest) -> reqwest::RequestBuilder {
        let builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Post => self.client.post(&request.url),
        };
        let builder = request
            .headers
            .iter()
            .fold(builder, |builder, (name, value)| builder.header(name, value))
            .timeout(Duration::from_millis(request.timeout_ms));

        match request.body {
            Some(body) => builder.body(body),
            None => builder,
        }
    }
}

impl Default for ReqwestHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient for ReqwestHttpClient {
    fn execute<'a>(&'a self, request: HttpRequest) -> HttpFuture<'a> {
        Box::pin(async move {
            let response = self.build(request).send().await.map_err(classify)?;
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .map_err(|error| HttpError::new(format!("failed to read response body: {error}")))?;
            Ok(HttpResponse { status, body })
        })
    }
}

/// Malformed requests are never worth retrying; everything else might be.
fn classify(error: reqwest::Error) -> HttpError {
    if error.is_builder() {
        HttpError::non_retryable(format!("invalid request: {error}"))
    } else if error.is_timeout() {
        HttpError::new(format!("request timed out: {error}"))
    } else if error.is_connect() {
        HttpError::new(format!("connection failed: {error}"))
    } else {
        HttpError::new(format!("request failed: {error}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_json_sets_content_type_and_body() {
        let request = HttpRequest::post_json("https://hooks.example.test/x", "{\"a\":1}");

        assert_eq!(request.method, HttpMethod::Post);
        assert_eq!(
            request.headers.get("content-type").map(String::as_str),
            Some("application/json")
        );
        assert_eq!(request.body.as_deref(), Some("{\"a\":1}"));
        assert_eq!(request.timeout_ms, DEFAULT_TIMEOUT_MS);
    }

    #[test]
    fn snippet_truncates_long_bodies() {
        let response = HttpResponse::new(502, "x".repeat(300));
        assert_eq!(response.body_snippet(10), format!("{}...", "x".repeat(10)));
        assert_eq!(HttpResponse::new(404, "gone").body_snippet(10), "gone");
        assert!(response.is_server_error());
        assert!(!HttpResponse::new(404, "").is_success());
    }
}
