//! Usage: Authenticated API client (dispatch, classification, retry-once).

mod classify;
mod coordinator;
mod events;
mod request;

pub use events::{LogoutReason, SessionEvent};
pub use request::ApiRequest;

use std::sync::Arc;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::config::{ClientConfig, REFRESH_ENDPOINT, WAITER_TIMEOUT_MARGIN};
use crate::infra::session_store::{Session, SessionStore};
use crate::shared::error::{http_error_from_body, ApiError, ApiResult};
use classify::{classify_response, Disposition};
use coordinator::RefreshCoordinator;
use events::SessionEvents;
use request::RequestAttempt;

/// Completed call with a decoded JSON body (`Null` for empty bodies).
#[derive(Debug, Clone)]
pub struct ApiResponse {
    status: u16,
    body: Value,
}

impl ApiResponse {
    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn body(&self) -> &Value {
        &self.body
    }

    pub fn data<T: DeserializeOwned>(&self) -> ApiResult<T> {
        serde_json::from_value(self.body.clone())
            .map_err(|e| ApiError::Decode(format!("response body shape mismatch: {e}")))
    }
}

/// One instance per backend, shared by reference (or `Arc`) through the
/// application. Owns the session store and the refresh coordinator; there is
/// no ambient global state.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: reqwest::Url,
    session: Arc<SessionStore>,
    coordinator: RefreshCoordinator,
    events: SessionEvents,
}

impl ApiClient {
    pub fn new(config: ClientConfig) -> ApiResult<Self> {
        let base_url = config.parsed_base_url()?;
        let refresh_url = base_url
            .join(REFRESH_ENDPOINT)
            .map_err(|e| ApiError::InvalidBaseUrl(format!("{REFRESH_ENDPOINT}: {e}")))?;

        let mut default_headers = HeaderMap::new();
        default_headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        default_headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .default_headers(default_headers)
            .build()
            .map_err(|e| ApiError::Network(format!("http client init failed: {e}")))?;

        let session = Arc::new(match &config.session_path {
            Some(path) => SessionStore::open(path),
            None => SessionStore::in_memory(),
        });
        let events = SessionEvents::new();
        let coordinator = RefreshCoordinator::new(
            http.clone(),
            refresh_url,
            Arc::clone(&session),
            events.clone(),
            config.request_timeout + WAITER_TIMEOUT_MARGIN,
        );

        Ok(Self {
            http,
            base_url,
            session,
            coordinator,
            events,
        })
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    /// Session lifecycle events (hard logout). The application decides how to
    /// react, typically by navigating to [`crate::LOGIN_ROUTE`].
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Installs the session produced by a successful login.
    pub fn install_session(&self, session: Session) {
        self.session.set(session);
    }

    /// Clears the session and signals a hard logout (once, if anything was
    /// actually stored).
    pub fn logout(&self) {
        if self.session.clear() {
            self.events.hard_logout(LogoutReason::UserLogout);
        }
    }

    pub async fn get(&self, path: &str) -> ApiResult<ApiResponse> {
        self.execute(ApiRequest::get(path)).await
    }

    pub async fn post(&self, path: &str, body: Value) -> ApiResult<ApiResponse> {
        self.execute(ApiRequest::post(path, body)).await
    }

    pub async fn put(&self, path: &str, body: Value) -> ApiResult<ApiResponse> {
        self.execute(ApiRequest::put(path, body)).await
    }

    pub async fn patch(&self, path: &str, body: Value) -> ApiResult<ApiResponse> {
        self.execute(ApiRequest::patch(path, body)).await
    }

    pub async fn delete(&self, path: &str) -> ApiResult<ApiResponse> {
        self.execute(ApiRequest::delete(path)).await
    }

    /// Sends the request with the current access token. On a first 401 the
    /// call is absorbed into the refresh coordinator and transparently
    /// replayed once with the fresh token; the caller only ever sees the
    /// final outcome.
    pub async fn execute(&self, request: ApiRequest) -> ApiResult<ApiResponse> {
        let attempt = RequestAttempt::first();
        let token = self.session.access_token();
        let outcome = self.dispatch(&request, token.as_deref()).await?;

        match classify_response(outcome.status, attempt.retried()) {
            Disposition::Success => outcome.into_response(),
            Disposition::OtherFailure => {
                Err(http_error_from_body(outcome.status.as_u16(), &outcome.body))
            }
            Disposition::AuthExpired => {
                tracing::debug!(path = request.path(), "401 on first attempt; refreshing");
                let fresh_token = self.coordinator.fresh_token().await?;
                self.replay(request, attempt, &fresh_token).await
            }
            // classify never returns this for a first attempt.
            Disposition::AuthExhausted => Err(ApiError::AuthExhausted),
        }
    }

    /// Retry executor: one replay with the refreshed token, never more. The
    /// token is the one handed out by the coordinator, not re-read from the
    /// store, so every waiter of a cycle replays with the same credential.
    async fn replay(
        &self,
        request: ApiRequest,
        attempt: RequestAttempt,
        token: &str,
    ) -> ApiResult<ApiResponse> {
        let attempt = attempt.into_retry();
        let outcome = self.dispatch(&request, Some(token)).await?;

        match classify_response(outcome.status, attempt.retried()) {
            Disposition::Success => outcome.into_response(),
            Disposition::OtherFailure => {
                Err(http_error_from_body(outcome.status.as_u16(), &outcome.body))
            }
            Disposition::AuthExhausted | Disposition::AuthExpired => {
                tracing::warn!(path = request.path(), "401 after refresh; auth exhausted");
                Err(ApiError::AuthExhausted)
            }
        }
    }

    /// The dispatcher knows nothing about refresh: it joins the URL, injects
    /// the bearer credential when one is supplied, and reports the outcome.
    async fn dispatch(
        &self,
        request: &ApiRequest,
        bearer: Option<&str>,
    ) -> ApiResult<DispatchOutcome> {
        let url = self
            .base_url
            .join(request.path().trim_start_matches('/'))
            .map_err(|e| ApiError::InvalidBaseUrl(format!("{}: {e}", request.path())))?;

        let mut builder = self.http.request(request.method().clone(), url);
        if let Some(token) = bearer {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        if let Some(body) = request.body() {
            builder = builder.body(body.to_string());
        }

        let response = builder.send().await.map_err(ApiError::from)?;
        let status = response.status();
        let body = response.text().await.map_err(ApiError::from)?;
        Ok(DispatchOutcome { status, body })
    }
}

struct DispatchOutcome {
    status: StatusCode,
    body: String,
}

impl DispatchOutcome {
    fn into_response(self) -> ApiResult<ApiResponse> {
        let body = if self.body.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&self.body)
                .map_err(|e| ApiError::Decode(format!("response body json invalid: {e}")))?
        };
        Ok(ApiResponse {
            status: self.status.as_u16(),
            body,
        })
    }
}
