//! Usage: Client configuration (base URL, timeouts, session persistence path).

use std::path::PathBuf;
use std::time::Duration;

use crate::shared::error::{ApiError, ApiResult};

pub(crate) const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000/";
pub(crate) const BASE_URL_ENV: &str = "API_BASE_URL";
pub(crate) const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(10_000);
pub(crate) const REFRESH_ENDPOINT: &str = "auth/token/refresh/";
/// Margin on top of the request timeout before a queued waiter gives up on an
/// in-flight refresh. The refresh call is bounded by the request timeout, so
/// the margin only matters when the refresh driver itself stalls.
pub(crate) const WAITER_TIMEOUT_MARGIN: Duration = Duration::from_secs(5);

/// Route the embedding application should navigate to after a hard logout.
pub const LOGIN_ROUTE: &str = "/login";

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub request_timeout: Duration,
    /// Where the session survives restarts. `None` keeps it in memory only.
    pub session_path: Option<PathBuf>,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            session_path: None,
        }
    }

    /// Base URL from `API_BASE_URL`, falling back to the local dev default.
    pub fn from_env() -> Self {
        let base_url = std::env::var(BASE_URL_ENV)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self::new(base_url)
    }

    pub fn with_session_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.session_path = Some(path.into());
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Parsed base URL with a guaranteed trailing slash so joins keep the
    /// full base path.
    pub(crate) fn parsed_base_url(&self) -> ApiResult<reqwest::Url> {
        let trimmed = self.base_url.trim();
        if trimmed.is_empty() {
            return Err(ApiError::InvalidBaseUrl("base url is empty".to_string()));
        }
        let normalized = if trimmed.ends_with('/') {
            trimmed.to_string()
        } else {
            format!("{trimmed}/")
        };
        reqwest::Url::parse(&normalized)
            .map_err(|e| ApiError::InvalidBaseUrl(format!("{normalized}: {e}")))
    }
}
