//! Shared in-process stub backend for integration tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock, RwLock};
use std::time::Duration;

use authfetch::{ApiClient, ClientConfig, Session};
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

pub fn init_tracing() {
    static INIT: OnceLock<()> = OnceLock::new();
    INIT.get_or_init(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    });
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshMode {
    /// Respond `{"access": <next token>}` and start accepting that token.
    Succeed,
    /// Respond with a token the protected routes will still reject, to
    /// exercise the exhausted-after-retry path.
    SucceedStale,
    /// Respond 500.
    Fail,
}

pub struct BackendState {
    accepted_token: RwLock<Option<String>>,
    refresh_mode: RwLock<RefreshMode>,
    next_access_token: RwLock<String>,
    rotate_refresh_to: RwLock<Option<String>>,
    refresh_delay: RwLock<Duration>,
    refresh_calls: AtomicUsize,
    ping_calls: AtomicUsize,
    seen_authorization: Mutex<Vec<Option<String>>>,
    refresh_bodies: Mutex<Vec<Value>>,
}

pub struct StubBackend {
    state: Arc<BackendState>,
    addr: SocketAddr,
}

impl StubBackend {
    pub async fn spawn() -> Self {
        let state = Arc::new(BackendState {
            accepted_token: RwLock::new(None),
            refresh_mode: RwLock::new(RefreshMode::Succeed),
            next_access_token: RwLock::new("T2".to_string()),
            rotate_refresh_to: RwLock::new(None),
            refresh_delay: RwLock::new(Duration::ZERO),
            refresh_calls: AtomicUsize::new(0),
            ping_calls: AtomicUsize::new(0),
            seen_authorization: Mutex::new(Vec::new()),
            refresh_bodies: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/api/ping/", get(ping))
            .route("/api/teapot/", get(teapot))
            .route("/auth/token/refresh/", post(refresh))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind stub backend");
        let addr = listener.local_addr().expect("stub backend addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve stub backend");
        });

        Self { state, addr }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}/", self.addr)
    }

    pub fn accept_token(&self, token: &str) {
        *self.state.accepted_token.write().unwrap() = Some(token.to_string());
    }

    pub fn set_refresh_mode(&self, mode: RefreshMode) {
        *self.state.refresh_mode.write().unwrap() = mode;
    }

    pub fn set_next_access_token(&self, token: &str) {
        *self.state.next_access_token.write().unwrap() = token.to_string();
    }

    pub fn rotate_refresh_to(&self, token: &str) {
        *self.state.rotate_refresh_to.write().unwrap() = Some(token.to_string());
    }

    /// Holds every refresh response open for `delay`, widening the window in
    /// which concurrent 401s pile onto one in-flight refresh.
    pub fn set_refresh_delay(&self, delay: Duration) {
        *self.state.refresh_delay.write().unwrap() = delay;
    }

    pub fn refresh_calls(&self) -> usize {
        self.state.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn ping_calls(&self) -> usize {
        self.state.ping_calls.load(Ordering::SeqCst)
    }

    pub fn authorization_headers(&self) -> Vec<Option<String>> {
        self.state.seen_authorization.lock().unwrap().clone()
    }

    pub fn refresh_bodies(&self) -> Vec<Value> {
        self.state.refresh_bodies.lock().unwrap().clone()
    }
}

async fn ping(State(state): State<Arc<BackendState>>, headers: HeaderMap) -> Response {
    state.ping_calls.fetch_add(1, Ordering::SeqCst);
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    state
        .seen_authorization
        .lock()
        .unwrap()
        .push(auth.clone());

    let accepted = state.accepted_token.read().unwrap().clone();
    let ok = match (accepted, auth) {
        (Some(token), Some(header)) => header == format!("Bearer {token}"),
        _ => false,
    };

    if ok {
        (StatusCode::OK, Json(json!({"ok": true}))).into_response()
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "token expired"})),
        )
            .into_response()
    }
}

async fn teapot(State(_state): State<Arc<BackendState>>) -> Response {
    (
        StatusCode::IM_A_TEAPOT,
        Json(json!({
            "error": "short and stout",
            "fields": {"spout": "missing"}
        })),
    )
        .into_response()
}

async fn refresh(State(state): State<Arc<BackendState>>, Json(body): Json<Value>) -> Response {
    state.refresh_calls.fetch_add(1, Ordering::SeqCst);
    state.refresh_bodies.lock().unwrap().push(body);

    let delay = *state.refresh_delay.read().unwrap();
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    let mode = *state.refresh_mode.read().unwrap();
    match mode {
        RefreshMode::Fail => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": "refresh rejected"})),
        )
            .into_response(),
        RefreshMode::Succeed | RefreshMode::SucceedStale => {
            let token = state.next_access_token.read().unwrap().clone();
            if mode == RefreshMode::Succeed {
                *state.accepted_token.write().unwrap() = Some(token.clone());
            }
            let mut payload = json!({ "access": token });
            if let Some(rotated) = state.rotate_refresh_to.read().unwrap().clone() {
                payload["refresh"] = Value::String(rotated);
            }
            (StatusCode::OK, Json(payload)).into_response()
        }
    }
}

pub fn client_for(backend: &StubBackend) -> ApiClient {
    ApiClient::new(ClientConfig::new(backend.base_url())).expect("client")
}

pub fn seeded_session(access: &str, refresh: Option<&str>) -> Session {
    Session {
        access_token: Some(access.to_string()),
        refresh_token: refresh.map(str::to_string),
        user: Some(json!({"id": 7, "email": "a@b.c"})),
    }
}
