//! HTTP transport seam
//!
//! [`ResilientClient`](crate::client::ResilientClient) never talks to reqwest
//! directly; it hands an [`ApiRequest`] to an [`HttpTransport`] and gets an
//! [`ApiResponse`] back. Production uses [`ReqwestTransport`]; tests use the
//! scripted transport in the `testing` module.

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use netops_core::{EngineError, Result};
use regex::Regex;
use serde_json::Value;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }

    /// Parse a method name as written in catalog tables
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "GET" => Some(Method::Get),
            "POST" => Some(Method::Post),
            "PUT" => Some(Method::Put),
            "DELETE" => Some(Method::Delete),
            _ => None,
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One fully-resolved HTTP request
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

/// The parts of an HTTP response the client cares about
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    /// `Retry-After` in whole seconds
    pub retry_after: Option<u64>,
    /// Target of a `Link: <...>; rel=next` header
    pub next_link: Option<String>,
    pub body: String,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            retry_after: None,
            next_link: None,
            body: body.into(),
        }
    }

    pub fn json(status: u16, value: Value) -> Self {
        Self::new(status, value.to_string())
    }

    pub fn no_content() -> Self {
        Self::new(204, "")
    }

    pub fn rate_limited(retry_after: Option<u64>) -> Self {
        Self {
            retry_after,
            ..Self::new(429, r#"{"errors":["API rate limit exceeded for organization"]}"#)
        }
    }

    pub fn with_next_link(mut self, link: impl Into<String>) -> Self {
        self.next_link = Some(link.into());
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send one request. Only failures to send or read are errors; any HTTP
    /// status is returned as a response.
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse>;
}

/// Extract the `rel=next` target from a `Link` header value.
pub fn parse_next_link(header: &str) -> Option<String> {
    static NEXT: OnceLock<Option<Regex>> = OnceLock::new();
    let re = NEXT
        .get_or_init(|| Regex::new(r#"<([^>]+)>\s*;\s*rel="?next"?"#).ok())
        .as_ref()?;
    re.captures(header)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Production transport over reqwest
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EngineError::config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        };

        let mut req = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            req = req.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            req = req.json(body);
        }

        let endpoint = request.url.split('?').next().unwrap_or(&request.url).to_string();
        debug!(method = %request.method, endpoint = %endpoint, "sending request");

        let response = req.send().await.map_err(|e| EngineError::Transport {
            endpoint: endpoint.clone(),
            message: e.to_string(),
        })?;

        let status = response.status().as_u16();
        let header_str = |name: &str| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let retry_after = header_str("retry-after").and_then(|v| v.trim().parse::<u64>().ok());
        let next_link = header_str("link").and_then(|v| parse_next_link(&v));

        let body = response.text().await.map_err(|e| EngineError::Transport {
            endpoint,
            message: format!("failed to read response body: {}", e),
        })?;

        Ok(ApiResponse {
            status,
            retry_after,
            next_link,
            body,
        })
    }
}
