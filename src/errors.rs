//! User-facing terminal outcomes.
//!
//! These are delivered as the assistant's message text, not as HTTP
//! failures: the clients this endpoint serves surface the message body to
//! the user but bury transport errors.

use thiserror::Error;

/// Terminal failures of one response orchestration. The `Display` string is
/// exactly the payload the caller receives.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RelayFailure {
    #[error("You must be on the DeepSeek chat site.")]
    NotOnSite,

    #[error("You must be logged into DeepSeek.")]
    NotLoggedIn,

    #[error("Could not send prompt.")]
    SendFailed,

    #[error("No response generated.")]
    NoResponse,

    #[error("Error receiving response.")]
    ReceiveFailed,
}
