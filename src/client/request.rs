//! Usage: Request description and per-call attempt record.

use reqwest::Method;
use serde_json::Value;

/// A logical API call: method, path relative to the base URL, optional JSON
/// body. The bearer credential is injected at dispatch time, never stored
/// here.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    body: Option<Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::POST, path).with_body(body)
    }

    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::PUT, path).with_body(body)
    }

    pub fn patch(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::PATCH, path).with_body(body)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub(crate) fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }
}

/// Immutable per-call attempt record. A retry is a new record, never an
/// in-place flag mutation, so concurrent replays cannot alias each other's
/// state. A logical request goes through at most one retry cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RequestAttempt {
    retried: bool,
}

impl RequestAttempt {
    pub(crate) const fn first() -> Self {
        Self { retried: false }
    }

    pub(crate) const fn into_retry(self) -> Self {
        Self { retried: true }
    }

    pub(crate) const fn retried(&self) -> bool {
        self.retried
    }
}
