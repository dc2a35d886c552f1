//! Scripted transport for tests
//!
//! Responses are queued per (method, path) route and replayed in order. The
//! last queued response of a route repeats forever, so a single
//! `rate_limited` entry models an endpoint that always answers 429. Requests
//! that match no route get a 404. Every request is recorded.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use netops_core::{CancellationToken, Result};
use serde_json::{json, Value};

use crate::transport::{ApiRequest, ApiResponse, HttpTransport, Method};

struct Route {
    method: Method,
    path: String,
    responses: VecDeque<ApiResponse>,
}

impl Route {
    fn matches(&self, request: &ApiRequest) -> bool {
        let path = request.url.split('?').next().unwrap_or(&request.url);
        self.method == request.method && path.ends_with(&self.path)
    }
}

#[derive(Default)]
struct Script {
    routes: Vec<Route>,
    requests: Vec<ApiRequest>,
    cancel_after: Option<(usize, CancellationToken)>,
}

#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<Script>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue a response for `method` requests whose path ends with `path`.
    pub fn respond(&self, method: Method, path: &str, response: ApiResponse) {
        let mut script = self.script();
        if let Some(route) = script
            .routes
            .iter_mut()
            .find(|r| r.method == method && r.path == path)
        {
            route.responses.push_back(response);
            return;
        }
        script.routes.push(Route {
            method,
            path: path.to_string(),
            responses: VecDeque::from([response]),
        });
    }

    /// Queue a 200 JSON response.
    pub fn respond_json(&self, method: Method, path: &str, body: Value) {
        self.respond(method, path, ApiResponse::json(200, body));
    }

    /// Cancel `token` as soon as the `count`-th request has been answered.
    pub fn cancel_after(&self, count: usize, token: CancellationToken) {
        self.script().cancel_after = Some((count, token));
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.script().requests.clone()
    }

    pub fn request_count(&self) -> usize {
        self.script().requests.len()
    }

    /// Recorded requests as `"METHOD /path"` strings with the base URL removed.
    pub fn calls(&self) -> Vec<String> {
        self.script()
            .requests
            .iter()
            .map(|r| format!("{} {}", r.method, strip_base(&r.url)))
            .collect()
    }

    /// Number of recorded requests with this method whose path ends with `path`.
    pub fn count_matching(&self, method: Method, path: &str) -> usize {
        self.script()
            .requests
            .iter()
            .filter(|r| {
                let p = r.url.split('?').next().unwrap_or(&r.url);
                r.method == method && p.ends_with(path)
            })
            .count()
    }
}

fn strip_base(url: &str) -> &str {
    match url.find("://") {
        Some(scheme_end) => {
            let rest = &url[scheme_end + 3..];
            let path_start = rest.find('/').unwrap_or(rest.len());
            let path = &rest[path_start..];
            path.strip_prefix("/api/v1")
                .or_else(|| path.strip_prefix("/v1"))
                .unwrap_or(path)
        }
        None => url,
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let mut script = self.script();

        let response = match script.routes.iter_mut().find(|r| r.matches(&request)) {
            Some(route) if route.responses.len() > 1 => route.responses.pop_front(),
            Some(route) => route.responses.front().cloned(),
            None => None,
        }
        .unwrap_or_else(|| ApiResponse::json(404, json!({"errors": ["Not found"]})));

        script.requests.push(request);
        let answered = script.requests.len();
        if let Some((count, token)) = &script.cancel_after {
            if answered >= *count {
                token.cancel();
            }
        }

        Ok(response)
    }
}
