//! Usage: Response disposition (success vs auth-expired vs terminal failures).

use reqwest::StatusCode;

/// What to do with a completed response. The `already_retried` flag is what
/// keeps a request from looping: a 401 on a replayed request is terminal and
/// never re-enters the refresh coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Disposition {
    Success,
    /// 401 on a first attempt; recoverable through the refresh coordinator.
    AuthExpired,
    /// 401 on a request that was already replayed once. Terminal.
    AuthExhausted,
    /// Any other non-2xx outcome; surfaced to the caller, no refresh.
    OtherFailure,
}

pub(crate) fn classify_response(status: StatusCode, already_retried: bool) -> Disposition {
    if status.is_success() {
        return Disposition::Success;
    }
    if status == StatusCode::UNAUTHORIZED {
        return if already_retried {
            Disposition::AuthExhausted
        } else {
            Disposition::AuthExpired
        };
    }
    Disposition::OtherFailure
}
