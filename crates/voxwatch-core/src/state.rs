//! Connection state and status reporting.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::event::NormalizedEvent;

/// Lifecycle state of the gateway connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConnectionState {
    /// No socket and no pending reconnect.
    Disconnected,
    /// Socket connect in progress.
    Connecting,
    /// Socket open, waiting for the server's Hello.
    AwaitingHello,
    /// Identify sent, waiting for `READY`.
    Identifying,
    /// Resume sent, waiting for `RESUMED`.
    Resuming,
    /// Session established.
    Connected,
    /// Waiting `delay_ms` before reconnect attempt `attempt`.
    Reconnecting {
        /// Attempt number the pending reconnect will use.
        attempt: u32,
        /// Delay before the reconnect fires.
        delay_ms: u64,
    },
}

impl ConnectionState {
    /// Whether the session is fully established.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::AwaitingHello => write!(f, "awaiting hello"),
            Self::Identifying => write!(f, "identifying"),
            Self::Resuming => write!(f, "resuming"),
            Self::Connected => write!(f, "connected"),
            Self::Reconnecting { attempt, delay_ms } => {
                write!(f, "reconnecting (attempt {attempt}, in {delay_ms}ms)")
            },
        }
    }
}

/// Status report surfaced to sinks alongside presence events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StatusEvent {
    /// The connection moved to a new state.
    StateChanged {
        /// The new state.
        state: ConnectionState,
        /// Optional human-readable context.
        detail: Option<String>,
    },
    /// An error occurred. `fatal` errors end the tracker run.
    Error {
        /// Description of the failure.
        message: String,
        /// Whether the tracker has stopped retrying.
        fatal: bool,
    },
}

/// Everything the tracker delivers downstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "category", content = "event", rename_all = "snake_case")]
pub enum TrackerEvent {
    /// A join or leave.
    Presence(NormalizedEvent),
    /// A connection state change or error.
    Status(StatusEvent),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display() {
        assert_eq!(ConnectionState::AwaitingHello.to_string(), "awaiting hello");
        let state = ConnectionState::Reconnecting {
            attempt: 2,
            delay_ms: 7500,
        };
        assert_eq!(state.to_string(), "reconnecting (attempt 2, in 7500ms)");
    }

    #[test]
    fn test_only_connected_is_connected() {
        assert!(ConnectionState::Connected.is_connected());
        assert!(!ConnectionState::Resuming.is_connected());
    }

    #[test]
    fn test_status_serialization() {
        let status = StatusEvent::Error {
            message: "gave up".into(),
            fatal: true,
        };
        let json = serde_json::to_value(TrackerEvent::Status(status)).unwrap();
        assert_eq!(json["category"], "status");
        assert_eq!(json["event"]["type"], "error");
        assert_eq!(json["event"]["fatal"], true);
    }
}
