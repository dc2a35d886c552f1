//! Resilient remote client
//!
//! Executes one logical request with a uniform policy:
//! - HTTP 429 is retried up to `max_retries` times, waiting `Retry-After` seconds
//!   when the server says so and `base * 2^attempt + jitter` otherwise
//! - HTTP 204 and empty successful bodies become `{}`
//! - any other non-2xx fails at once with the remote error text
//! - the cancellation token is checked before every attempt, and a backoff
//!   wait ends early when the token fires
//!
//! The client holds no per-call state; it does not cache or coalesce requests.

use std::sync::Arc;
use std::time::Duration;

use netops_core::config::{RetrySettings, Secret};
use netops_core::{ensure_active, CancellationToken, EngineError, Result};
use rand::Rng;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::transport::{ApiRequest, ApiResponse, HttpTransport, Method};

/// Retry policy for rate-limited requests
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub base_backoff: Duration,
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_backoff: Duration::from_millis(2000),
            max_jitter: Duration::from_millis(1000),
        }
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            base_backoff: Duration::from_millis(settings.base_backoff_ms),
            max_jitter: Duration::from_millis(settings.max_jitter_ms),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0 for the first retry).
    pub fn backoff(&self, attempt: u32, retry_after: Option<u64>) -> Duration {
        if let Some(secs) = retry_after {
            return Duration::from_secs(secs);
        }
        let exp = self.base_backoff.saturating_mul(1u32 << attempt.min(16));
        let jitter_ms = self.max_jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_ms)
        };
        exp + Duration::from_millis(jitter)
    }
}

/// How each request is authenticated
#[derive(Clone)]
pub enum Auth {
    /// Credential sent in a named header, e.g. `X-Cisco-Meraki-API-Key`
    Header { name: String, value: Secret },
    /// `Authorization: Bearer <token>`
    Bearer(Secret),
}

impl Auth {
    fn header(&self) -> (String, String) {
        match self {
            Auth::Header { name, value } => (name.clone(), value.expose().to_string()),
            Auth::Bearer(token) => (
                "Authorization".to_string(),
                format!("Bearer {}", token.expose()),
            ),
        }
    }
}

pub struct ResilientClient {
    transport: Arc<dyn HttpTransport>,
    base_url: String,
    auth: Auth,
    policy: RetryPolicy,
}

impl ResilientClient {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        base_url: impl Into<String>,
        auth: Auth,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            transport,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth,
            policy,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn get(&self, path: &str, cancel: &CancellationToken) -> Result<Value> {
        self.request(Method::Get, path, None, cancel).await
    }

    pub async fn post(&self, path: &str, body: Value, cancel: &CancellationToken) -> Result<Value> {
        self.request(Method::Post, path, Some(body), cancel).await
    }

    pub async fn put(&self, path: &str, body: Value, cancel: &CancellationToken) -> Result<Value> {
        self.request(Method::Put, path, Some(body), cancel).await
    }

    /// Run one logical request against `path` (relative to the base URL).
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        let url = self.url_for(path);
        let (value, _) = self.execute(method, &url, path, body, cancel).await?;
        Ok(value)
    }

    /// GET every page of a list endpoint by following `rel=next` links.
    /// Pages are concatenated in order; each page gets the full retry policy.
    pub async fn get_paginated(&self, path: &str, cancel: &CancellationToken) -> Result<Vec<Value>> {
        let mut items = Vec::new();
        let mut next = Some(self.url_for(path));
        let mut page = 0;

        while let Some(url) = next.take() {
            ensure_active(cancel)?;
            page += 1;
            let (value, link) = self.execute(Method::Get, &url, path, None, cancel).await?;
            match value {
                Value::Array(values) => items.extend(values),
                Value::Object(ref map) if map.is_empty() => {}
                other => items.push(other),
            }
            next = link;
        }

        debug!(endpoint = %path, pages = page, items = items.len(), "pagination complete");
        Ok(items)
    }

    fn url_for(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    async fn execute(
        &self,
        method: Method,
        url: &str,
        endpoint: &str,
        body: Option<Value>,
        cancel: &CancellationToken,
    ) -> Result<(Value, Option<String>)> {
        let (auth_name, auth_value) = self.auth.header();
        let request = ApiRequest {
            method,
            url: url.to_string(),
            headers: vec![
                (auth_name, auth_value),
                ("Content-Type".to_string(), "application/json".to_string()),
                ("Accept".to_string(), "application/json".to_string()),
            ],
            body,
        };

        let mut attempt: u32 = 0;
        loop {
            ensure_active(cancel)?;

            let response = self.transport.send(request.clone()).await?;

            if response.status == 429 {
                if attempt >= self.policy.max_retries {
                    warn!(
                        endpoint = %endpoint,
                        attempts = attempt + 1,
                        "rate limit exceeded, giving up"
                    );
                    return Err(EngineError::RateLimited {
                        endpoint: endpoint.to_string(),
                        attempts: attempt + 1,
                    });
                }

                let delay = self.policy.backoff(attempt, response.retry_after);
                warn!(
                    endpoint = %endpoint,
                    attempt = attempt + 1,
                    max_retries = self.policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    "rate limited (429), backing off"
                );
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => {
                        debug!(endpoint = %endpoint, "backoff interrupted by cancellation");
                    }
                }
                attempt += 1;
                continue;
            }

            return decode_response(endpoint, response);
        }
    }
}

fn decode_response(endpoint: &str, response: ApiResponse) -> Result<(Value, Option<String>)> {
    if response.status == 204 {
        return Ok((json!({}), response.next_link));
    }

    if !response.is_success() {
        let message = remote_error_text(response.status, &response.body);
        warn!(endpoint = %endpoint, status = response.status, error = %message, "remote call failed");
        return Err(EngineError::Remote {
            endpoint: endpoint.to_string(),
            status: response.status,
            message,
        });
    }

    if response.body.trim().is_empty() {
        return Ok((json!({}), response.next_link));
    }

    let value: Value = serde_json::from_str(&response.body)?;
    Ok((value, response.next_link))
}

/// Error text from a failed response: `errors` joined with ", ", else
/// `message` (top level or under `error`), else the status code.
pub fn remote_error_text(status: u16, body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        if let Some(errors) = value.get("errors").and_then(Value::as_array) {
            let parts: Vec<String> = errors
                .iter()
                .map(|e| match e {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect();
            if !parts.is_empty() {
                return parts.join(", ");
            }
        }
        if let Some(message) = value.get("message").and_then(Value::as_str) {
            return message.to_string();
        }
        // Google APIs nest it: {"error": {"message": ".."}}
        if let Some(message) = value.pointer("/error/message").and_then(Value::as_str) {
            return message.to_string();
        }
    }
    format!("HTTP error! status: {}", status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedTransport;
    use netops_core::ErrorKind;
    use tokio::time::Instant;

    fn client(transport: Arc<ScriptedTransport>) -> ResilientClient {
        ResilientClient::new(
            transport,
            "https://api.meraki.com/api/v1",
            Auth::Header {
                name: "X-Cisco-Meraki-API-Key".into(),
                value: Secret::new("test-key"),
            },
            RetryPolicy::default(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_is_honoured() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(Method::Get, "/organizations/1/networks", ApiResponse::rate_limited(Some(2)));
        transport.respond(
            Method::Get,
            "/organizations/1/networks",
            ApiResponse::json(200, json!([{"id": "N_1"}])),
        );

        let started = Instant::now();
        let value = client(transport.clone())
            .get("/organizations/1/networks", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(value, json!([{"id": "N_1"}]));
        assert_eq!(transport.request_count(), 2);
        assert!(started.elapsed() >= Duration::from_secs(2));
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistent_429_gives_up_after_four_attempts() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(Method::Get, "/organizations/1/devices", ApiResponse::rate_limited(None));

        let err = client(transport.clone())
            .get("/organizations/1/devices", &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(transport.request_count(), 4);
        assert_eq!(err.kind(), ErrorKind::TransientRemote);
        let text = err.to_string();
        assert!(text.contains("/organizations/1/devices"));
        assert!(text.contains("4 attempts"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exponential_backoff_without_hint() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(Method::Get, "/networks/N_1/events", ApiResponse::rate_limited(None));
        transport.respond(Method::Get, "/networks/N_1/events", ApiResponse::rate_limited(None));
        transport.respond(Method::Get, "/networks/N_1/events", ApiResponse::json(200, json!({"events": []})));

        let started = Instant::now();
        client(transport.clone())
            .get("/networks/N_1/events", &CancellationToken::new())
            .await
            .unwrap();

        // 2s + 4s plus at most 1s jitter per wait
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(6));
        assert!(elapsed <= Duration::from_secs(8));
        assert_eq!(transport.request_count(), 3);
    }

    #[tokio::test]
    async fn test_no_content_is_empty_object() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(Method::Post, "/devices/Q2AB/switch/ports/cycle", ApiResponse::no_content());

        let value = client(transport)
            .post("/devices/Q2AB/switch/ports/cycle", json!({"ports": ["5"]}), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(value, json!({}));
    }

    #[tokio::test]
    async fn test_non_429_failure_is_not_retried() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(
            Method::Put,
            "/devices/Q2AB/switch/ports/5",
            ApiResponse::json(400, json!({"errors": ["Invalid VLAN", "VLAN out of range"]})),
        );

        let err = client(transport.clone())
            .put("/devices/Q2AB/switch/ports/5", json!({"vlan": 9999}), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(transport.request_count(), 1);
        assert_eq!(err.kind(), ErrorKind::FatalRemote);
        assert_eq!(err.operator_message(), "Invalid VLAN, VLAN out of range");
    }

    #[test]
    fn test_remote_error_text_fallbacks() {
        assert_eq!(remote_error_text(403, r#"{"message":"Forbidden"}"#), "Forbidden");
        assert_eq!(remote_error_text(502, "<html>bad gateway</html>"), "HTTP error! status: 502");
        assert_eq!(remote_error_text(500, r#"{"errors":[]}"#), "HTTP error! status: 500");
        assert_eq!(
            remote_error_text(400, r#"{"error":{"code":400,"message":"API key not valid."}}"#),
            "API key not valid."
        );
    }

    #[tokio::test]
    async fn test_cancelled_before_first_attempt() {
        let transport = Arc::new(ScriptedTransport::new());
        let token = CancellationToken::new();
        token.cancel();

        let err = client(transport.clone())
            .get("/organizations/1/networks", &token)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_interrupts_backoff() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(Method::Get, "/organizations/1/networks", ApiResponse::rate_limited(Some(30)));

        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            canceller.cancel();
        });

        let started = Instant::now();
        let err = client(transport.clone())
            .get("/organizations/1/networks", &token)
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(transport.request_count(), 1);
        assert!(started.elapsed() < Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_pagination_follows_next_links() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(
            Method::Get,
            "/organizations/1/devices",
            ApiResponse::json(200, json!([{"serial": "A"}, {"serial": "B"}]))
                .with_next_link("https://api.meraki.com/api/v1/organizations/1/devices?startingAfter=B"),
        );
        transport.respond(
            Method::Get,
            "/organizations/1/devices",
            ApiResponse::json(200, json!([{"serial": "C"}])),
        );

        let items = client(transport.clone())
            .get_paginated("/organizations/1/devices", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(items.len(), 3);
        assert_eq!(items[2]["serial"], "C");
        let requests = transport.requests();
        assert!(requests[1].url.ends_with("startingAfter=B"));
        assert!(requests
            .iter()
            .all(|r| r.headers.iter().any(|(k, v)| k == "X-Cisco-Meraki-API-Key" && v == "test-key")));
    }

    #[test]
    fn test_backoff_grows_and_respects_hint() {
        let policy = RetryPolicy {
            max_retries: 3,
            base_backoff: Duration::from_millis(2000),
            max_jitter: Duration::ZERO,
        };
        assert_eq!(policy.backoff(0, None), Duration::from_millis(2000));
        assert_eq!(policy.backoff(2, None), Duration::from_millis(8000));
        assert_eq!(policy.backoff(2, Some(1)), Duration::from_secs(1));
    }
}
