//! Usage: Unified client error taxonomy with stable error codes.

use serde_json::Value;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Clone, thiserror::Error)]
pub enum ApiError {
    /// A request that was already replayed once came back 401 again. The
    /// session cannot recover this call; it never re-enters the refresh path.
    #[error("AUTH_EXHAUSTED: request rejected with 401 after a token refresh")]
    AuthExhausted,
    /// The refresh call failed, or no refresh token was stored. The session
    /// has been torn down and the caller must re-authenticate.
    #[error("AUTH_REFRESH_FAILED: session refresh failed; re-authentication required")]
    RefreshFailed,
    /// Transport-level failure (connect error, timeout, broken stream).
    #[error("NETWORK_ERROR: {0}")]
    Network(String),
    /// Non-2xx, non-auth response, normalized from the backend error body.
    #[error("HTTP_ERROR: status={status} {message}")]
    Http {
        status: u16,
        message: String,
        fields: Option<Value>,
    },
    /// A 2xx response whose body could not be decoded as JSON.
    #[error("DECODE_ERROR: {0}")]
    Decode(String),
    #[error("INVALID_BASE_URL: {0}")]
    InvalidBaseUrl(String),
}

impl ApiError {
    /// Stable machine-readable code, independent of message wording.
    pub fn code(&self) -> &'static str {
        match self {
            Self::AuthExhausted => "AUTH_EXHAUSTED",
            Self::RefreshFailed => "AUTH_REFRESH_FAILED",
            Self::Network(_) => "NETWORK_ERROR",
            Self::Http { .. } => "HTTP_ERROR",
            Self::Decode(_) => "DECODE_ERROR",
            Self::InvalidBaseUrl(_) => "INVALID_BASE_URL",
        }
    }

    /// Terminal authentication failures: the caller should treat the session
    /// as gone and route the user back through login.
    pub fn is_terminal_auth(&self) -> bool {
        matches!(self, Self::AuthExhausted | Self::RefreshFailed)
    }

    /// `{success:false, status, message, fields}` shape for UI layers.
    pub fn normalized(&self) -> Value {
        match self {
            Self::Http {
                status,
                message,
                fields,
            } => serde_json::json!({
                "success": false,
                "status": status,
                "message": message,
                "fields": fields.clone().unwrap_or(Value::Null),
            }),
            other => serde_json::json!({
                "success": false,
                "status": Value::Null,
                "message": other.to_string(),
                "fields": Value::Null,
            }),
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return ApiError::Network(format!("request timed out: {err}"));
        }
        if err.is_connect() {
            return ApiError::Network(format!("connect failed: {err}"));
        }
        ApiError::Network(err.to_string())
    }
}

/// Builds the normalized `Http` error from a non-2xx body. The backend error
/// shape is `{"error": "...", "fields": {...}}`; anything else falls back to a
/// generic message.
pub(crate) fn http_error_from_body(status: u16, body: &str) -> ApiError {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let message = parsed
        .as_ref()
        .and_then(|v| v.get("error"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| "an unexpected error occurred".to_string());
    let fields = parsed
        .as_ref()
        .and_then(|v| v.get("fields"))
        .filter(|v| !v.is_null())
        .cloned();
    ApiError::Http {
        status,
        message,
        fields,
    }
}
