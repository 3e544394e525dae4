//! Usage: Authenticated API client with single-flight session refresh.
//!
//! Every call carries the session's bearer token. When concurrent calls fail
//! with 401, exactly one refresh request is issued; the rest queue as waiters
//! and are replayed with the new token once it lands. A refresh failure tears
//! the session down once and rejects every waiter with a terminal error.

mod client;
mod config;
mod infra;
mod shared;

pub use client::{ApiClient, ApiRequest, ApiResponse, LogoutReason, SessionEvent};
pub use config::{ClientConfig, LOGIN_ROUTE};
pub use infra::session_store::{Session, SessionStore};
pub use shared::error::{ApiError, ApiResult};
