//! Usage: Session lifecycle events for the embedding application.

use tokio::sync::broadcast;

const EVENT_CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutReason {
    /// The refresh endpoint rejected the refresh token or was unreachable.
    RefreshFailed,
    /// A 401 arrived while no refresh token was stored.
    MissingRefreshToken,
    /// Explicit logout through [`crate::ApiClient::logout`].
    UserLogout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// The session was torn down. The application should navigate to the
    /// login entry point ([`crate::LOGIN_ROUTE`]).
    HardLogout { reason: LogoutReason },
}

/// Broadcast fan-out for session events. Emitting with no subscribers is
/// fine; the event is advisory.
#[derive(Debug, Clone)]
pub(crate) struct SessionEvents {
    tx: broadcast::Sender<SessionEvent>,
}

impl SessionEvents {
    pub(crate) fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    pub(crate) fn hard_logout(&self, reason: LogoutReason) {
        tracing::warn!(?reason, "hard logout signaled");
        let _ = self.tx.send(SessionEvent::HardLogout { reason });
    }
}
