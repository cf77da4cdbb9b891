//! Tracker and lookup errors.

use std::time::Duration;

use tokio_tungstenite::tungstenite;

use crate::protocol::close_code;

/// Why the tracker stopped or a connection attempt failed.
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    /// Socket-level failure: TLS, handshake, read or write.
    #[error("websocket: {0}")]
    WebSocket(Box<tungstenite::Error>),

    /// REST request failed, e.g. gateway URL discovery.
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),

    /// A frame or response body did not decode.
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    /// Socket closed with a retryable code.
    #[error("gateway closed the connection ({0})")]
    Closed(u16),

    /// Close 4004: the token was rejected.
    #[error("gateway rejected the token (4004)")]
    AuthenticationFailed,

    /// Close 4013 or 4014: the intents cannot be used.
    #[error("gateway refused the requested intents ({0})")]
    InvalidIntents(u16),

    /// Any other close code after which reconnecting cannot help.
    #[error("gateway closed with unrecoverable code {0}")]
    UnrecoverableClose(u16),

    /// Non-1006 closes used up the retry budget.
    #[error("giving up after {attempts} attempts, last close {code}")]
    ReconnectExhausted {
        /// Final close code.
        code: u16,
        /// Attempts made.
        attempts: u32,
    },

    /// [`crate::TrackerHandle::stop`] was called.
    #[error("stopped")]
    Shutdown,

    /// No Hello within the configured window.
    #[error("no Hello received from gateway")]
    HelloTimeout,

    /// The gateway sent something the tracker cannot act on.
    #[error("protocol: {0}")]
    Protocol(String),

    /// Settings rejected before connecting.
    #[error("invalid tracker config: {0}")]
    Config(String),
}

impl From<tungstenite::Error> for TrackerError {
    fn from(err: tungstenite::Error) -> Self {
        Self::WebSocket(Box::new(err))
    }
}

impl TrackerError {
    pub(crate) fn from_fatal_close(code: u16) -> Self {
        match code {
            close_code::AUTHENTICATION_FAILED => Self::AuthenticationFailed,
            close_code::INVALID_INTENTS | close_code::DISALLOWED_INTENTS => {
                Self::InvalidIntents(code)
            },
            _ => Self::UnrecoverableClose(code),
        }
    }

    /// True when retrying cannot succeed.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::AuthenticationFailed
            | Self::InvalidIntents(_)
            | Self::UnrecoverableClose(_)
            | Self::ReconnectExhausted { .. }
            | Self::Config(_) => true,
            Self::WebSocket(_)
            | Self::Http(_)
            | Self::Json(_)
            | Self::Closed(_)
            | Self::Shutdown
            | Self::HelloTimeout
            | Self::Protocol(_) => false,
        }
    }
}

/// Result alias for tracker operations.
pub type TrackerResult<T> = Result<T, TrackerError>;

/// One failed metadata lookup. The cache turns every variant into a
/// fallback name, so these never reach the caller.
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    /// Transport failure.
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),

    /// Exceeded the lookup budget.
    #[error("no response within {0:?}")]
    Timeout(Duration),

    /// Token rejected.
    #[error("401 unauthorized")]
    Unauthorized,

    /// Slowed down by the API.
    #[error("429 rate limited")]
    RateLimited,

    /// Any other non-success status.
    #[error("status {0}")]
    Status(u16),
}
