//! Normalized presence events.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Direction of a presence transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceKind {
    /// The user entered a watched channel.
    Join,
    /// The user left a watched channel.
    Leave,
}

impl PresenceKind {
    /// Lowercase wire name (`join` / `leave`).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Join => "join",
            Self::Leave => "leave",
        }
    }
}

impl fmt::Display for PresenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PresenceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "join" => Ok(Self::Join),
            "leave" => Ok(Self::Leave),
            other => Err(format!("unknown presence kind: {other}")),
        }
    }
}

/// A join or leave enriched with human-readable names.
///
/// `stay_duration_ms` is only ever set on [`PresenceKind::Leave`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedEvent {
    /// Join or leave.
    pub kind: PresenceKind,
    /// Display name of the guild owning the channel.
    pub guild_name: String,
    /// Display name of the user.
    pub user_name: String,
    /// Display name of the channel.
    pub channel_name: String,
    /// Channel snowflake.
    pub channel_id: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp_ms: i64,
    /// Time spent in the channel, for leaves.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stay_duration_ms: Option<u64>,
}

impl NormalizedEvent {
    /// Build a join event.
    #[must_use]
    pub fn join(
        guild_name: impl Into<String>,
        user_name: impl Into<String>,
        channel_name: impl Into<String>,
        channel_id: impl Into<String>,
        timestamp_ms: i64,
    ) -> Self {
        Self {
            kind: PresenceKind::Join,
            guild_name: guild_name.into(),
            user_name: user_name.into(),
            channel_name: channel_name.into(),
            channel_id: channel_id.into(),
            timestamp_ms,
            stay_duration_ms: None,
        }
    }

    /// Build a leave event carrying the stay duration.
    #[must_use]
    pub fn leave(
        guild_name: impl Into<String>,
        user_name: impl Into<String>,
        channel_name: impl Into<String>,
        channel_id: impl Into<String>,
        timestamp_ms: i64,
        stay_duration_ms: u64,
    ) -> Self {
        Self {
            kind: PresenceKind::Leave,
            guild_name: guild_name.into(),
            user_name: user_name.into(),
            channel_name: channel_name.into(),
            channel_id: channel_id.into(),
            timestamp_ms,
            stay_duration_ms: Some(stay_duration_ms),
        }
    }
}
