//! Usage: Single-flight session refresh (state machine + waiter queue).
//!
//! Many requests can fail with 401 at once when the access token expires.
//! The coordinator guarantees that exactly one refresh call goes out; every
//! other caller is queued as a waiter and resumed with the settlement of that
//! one call. Either all waiters get the new token, or all are rejected and
//! the session is torn down once.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::oneshot;

use crate::client::events::{LogoutReason, SessionEvents};
use crate::infra::session_store::SessionStore;
use crate::shared::error::{ApiError, ApiResult};
use crate::shared::lock_ext::MutexExt;
use crate::shared::security::mask_token;

/// Settlement of one refresh cycle, fanned out to every queued waiter.
#[derive(Debug, Clone)]
enum Settlement {
    Refreshed(String),
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefreshState {
    Idle,
    Refreshing,
}

#[derive(Debug)]
struct CoordinatorState {
    state: RefreshState,
    // FIFO; non-empty only while Refreshing; drained atomically on settle.
    waiters: Vec<oneshot::Sender<Settlement>>,
}

/// What a caller hitting the coordinator becomes. Decided in a single lock
/// acquisition so no two callers can both elect themselves starter.
enum Role {
    Starter { refresh_token: String },
    Waiter(oneshot::Receiver<Settlement>),
    /// 401 with no refresh token stored: nothing to coordinate.
    ShortCircuit,
}

pub(crate) struct RefreshCoordinator {
    http: reqwest::Client,
    refresh_url: reqwest::Url,
    session: Arc<SessionStore>,
    events: SessionEvents,
    waiter_timeout: Duration,
    state: Mutex<CoordinatorState>,
}

impl RefreshCoordinator {
    pub(crate) fn new(
        http: reqwest::Client,
        refresh_url: reqwest::Url,
        session: Arc<SessionStore>,
        events: SessionEvents,
        waiter_timeout: Duration,
    ) -> Self {
        Self {
            http,
            refresh_url,
            session,
            events,
            waiter_timeout,
            state: Mutex::new(CoordinatorState {
                state: RefreshState::Idle,
                waiters: Vec::new(),
            }),
        }
    }

    /// Resolves to a usable access token after exactly one refresh call, no
    /// matter how many concurrent callers land here. On refresh failure the
    /// session is cleared once and every caller gets `RefreshFailed`.
    pub(crate) async fn fresh_token(&self) -> ApiResult<String> {
        let role = {
            let mut guard = self.state.lock_or_recover();
            match guard.state {
                RefreshState::Refreshing => {
                    let (tx, rx) = oneshot::channel();
                    guard.waiters.push(tx);
                    Role::Waiter(rx)
                }
                RefreshState::Idle => match self.session.refresh_token() {
                    Some(refresh_token) => {
                        guard.state = RefreshState::Refreshing;
                        Role::Starter { refresh_token }
                    }
                    None => Role::ShortCircuit,
                },
            }
        };

        match role {
            Role::Waiter(rx) => self.wait_for_settlement(rx).await,
            Role::Starter { refresh_token } => self.run_refresh(refresh_token).await,
            Role::ShortCircuit => {
                tracing::warn!("auth expired with no refresh token stored; ending session");
                if self.session.clear() {
                    self.events.hard_logout(LogoutReason::MissingRefreshToken);
                }
                Err(ApiError::RefreshFailed)
            }
        }
    }

    async fn wait_for_settlement(&self, rx: oneshot::Receiver<Settlement>) -> ApiResult<String> {
        match tokio::time::timeout(self.waiter_timeout, rx).await {
            Ok(Ok(Settlement::Refreshed(token))) => Ok(token),
            Ok(Ok(Settlement::Failed)) => Err(ApiError::RefreshFailed),
            // Sender dropped: the cycle was aborted and the guard already
            // reset the state machine.
            Ok(Err(_)) => Err(ApiError::RefreshFailed),
            Err(_) => Err(ApiError::Network(
                "timed out waiting for session refresh".to_string(),
            )),
        }
    }

    /// Drives the refresh call with no locks held, then settles the queue.
    async fn run_refresh(&self, refresh_token: String) -> ApiResult<String> {
        let guard = InflightGuard {
            coordinator: self,
            armed: true,
        };

        tracing::debug!(
            refresh_token = %mask_token(&refresh_token),
            "starting session refresh"
        );

        match self.call_refresh_endpoint(&refresh_token).await {
            Ok(tokens) => {
                // Session first, then waiters: a waiter resuming early must
                // already observe the new token in the store.
                self.session
                    .apply_refresh(tokens.access.clone(), tokens.refresh);
                guard.settle(Settlement::Refreshed(tokens.access.clone()));
                Ok(tokens.access)
            }
            Err(err) => {
                tracing::warn!("session refresh failed; ending session: {err}");
                self.session.clear();
                self.events.hard_logout(LogoutReason::RefreshFailed);
                guard.settle(Settlement::Failed);
                Err(ApiError::RefreshFailed)
            }
        }
    }

    /// `POST <base>auth/token/refresh/` with `{"refresh": ...}`. Success
    /// requires a 2xx status and a non-empty `access` field. The call is
    /// never retried here; any failure is fatal to the session.
    async fn call_refresh_endpoint(&self, refresh_token: &str) -> Result<RefreshedTokens, String> {
        let body = serde_json::json!({ "refresh": refresh_token });
        let response = self
            .http
            .post(self.refresh_url.clone())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body.to_string())
            .send()
            .await
            .map_err(|e| format!("refresh request failed: {e}"))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| format!("refresh response read failed: {e}"))?;

        if !status.is_success() {
            return Err(format!(
                "refresh endpoint returned status={}",
                status.as_u16()
            ));
        }

        let value: Value = serde_json::from_str(&text)
            .map_err(|e| format!("refresh response json invalid: {e}"))?;
        let access = value
            .get("access")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| "refresh response missing access token".to_string())?
            .to_string();
        let refresh = value
            .get("refresh")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);

        tracing::debug!(
            access_token = %mask_token(&access),
            rotated = refresh.is_some(),
            "session refresh succeeded"
        );
        Ok(RefreshedTokens { access, refresh })
    }

    /// Back to Idle and the whole queue resolved in FIFO order, in one lock
    /// acquisition, so the queue is never partially drained.
    fn drain(&self, settlement: Settlement) {
        let waiters = {
            let mut guard = self.state.lock_or_recover();
            guard.state = RefreshState::Idle;
            std::mem::take(&mut guard.waiters)
        };
        if waiters.is_empty() {
            return;
        }
        tracing::debug!(waiters = waiters.len(), "resuming queued requests");
        for waiter in waiters {
            // A waiter may have timed out and dropped its receiver.
            let _ = waiter.send(settlement.clone());
        }
    }
}

struct RefreshedTokens {
    access: String,
    refresh: Option<String>,
}

/// Keeps the state machine honest if the future driving the refresh is
/// dropped mid-flight: without this, the state would stay `Refreshing`
/// forever and queued waiters would hang until their timeout.
struct InflightGuard<'a> {
    coordinator: &'a RefreshCoordinator,
    armed: bool,
}

impl InflightGuard<'_> {
    fn settle(mut self, settlement: Settlement) {
        self.armed = false;
        self.coordinator.drain(settlement);
    }
}

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        tracing::warn!("session refresh aborted before settling; rejecting queued requests");
        self.coordinator.drain(Settlement::Failed);
    }
}
