//! Tracker configuration.

use std::fmt;
use std::time::Duration;

use crate::error::{TrackerError, TrackerResult};
use crate::presence::WatchSet;
use crate::protocol::VOICE_STATES_INTENT;
use crate::rest::{DEFAULT_GATEWAY_URL, TokenType};

/// Placeholder token shipped in sample configs.
pub const PLACEHOLDER_TOKEN: &str = "YOUR_USER_TOKEN_HERE";

/// Configuration for one [`GatewayTracker`](super::GatewayTracker).
#[derive(Clone)]
pub struct TrackerConfig {
    /// Auth token sent in Identify and Resume.
    pub token: String,
    /// Kind of account the token belongs to.
    pub token_type: TokenType,
    /// Gateway base URL (`ws://` or `wss://`), without query.
    pub gateway_url: String,
    /// Gateway intents bitmask.
    pub intents: u32,
    /// Channels whose membership changes are reported.
    pub watch: WatchSet,
    /// Our own user id; updates about it are ignored.
    pub self_user_id: Option<String>,
    /// How long to wait for Hello after the socket opens.
    pub hello_timeout: Duration,
    /// Delay before re-identifying after an Invalid Session.
    pub invalid_session_delay: Duration,
    /// Treat a missed Heartbeat ACK as a dead connection.
    pub zombie_detection: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            token_type: TokenType::default(),
            gateway_url: DEFAULT_GATEWAY_URL.to_owned(),
            intents: VOICE_STATES_INTENT,
            watch: WatchSet::default(),
            self_user_id: None,
            hello_timeout: Duration::from_secs(30),
            invalid_session_delay: Duration::from_secs(5),
            zombie_detection: true,
        }
    }
}

impl fmt::Debug for TrackerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackerConfig")
            .field("token", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .field("gateway_url", &self.gateway_url)
            .field("intents", &self.intents)
            .field("watch", &self.watch)
            .field("self_user_id", &self.self_user_id)
            .field("hello_timeout", &self.hello_timeout)
            .field("invalid_session_delay", &self.invalid_session_delay)
            .field("zombie_detection", &self.zombie_detection)
            .finish()
    }
}

impl TrackerConfig {
    /// Reject configurations that can never connect.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::Config`] for a missing or placeholder token,
    /// an empty watch set, or a gateway URL that is not `ws(s)://`.
    pub fn validate(&self) -> TrackerResult<()> {
        let token = self.token.trim();
        if token.is_empty() || token == PLACEHOLDER_TOKEN {
            return Err(TrackerError::Config("a gateway token is required".into()));
        }
        if self.watch.is_empty() {
            return Err(TrackerError::Config(
                "at least one channel must be watched".into(),
            ));
        }
        let url = url::Url::parse(&self.gateway_url)
            .map_err(|e| TrackerError::Config(format!("invalid gateway URL: {e}")))?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(TrackerError::Config(
                "gateway URL must use ws or wss".into(),
            ));
        }
        Ok(())
    }
}
