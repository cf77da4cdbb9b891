//! Configuration types for voxwatch.
//!
//! Every struct implements [`Default`] with the same values as the embedded
//! `defaults.toml`, so a bare `[section]` header produces a working section.
//! Secrets (the gateway token and the webhook URL) are redacted from `Debug`
//! and omitted when serializing.

use std::path::PathBuf;

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Token value shipped in sample configs; never valid.
pub const PLACEHOLDER_TOKEN: &str = "YOUR_USER_TOKEN_HERE";

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Gateway connection and credentials.
    pub gateway: GatewaySection,
    /// Channels to watch.
    pub watch: WatchSection,
    /// Metadata lookups.
    pub lookup: LookupSection,
    /// Webhook notifications.
    pub notify: NotifySection,
    /// Presence log location.
    pub storage: StorageSection,
    /// Logging level, format and output.
    pub logging: LoggingSection,
}

impl Config {
    /// Directory holding the presence log.
    ///
    /// Uses `storage.data_dir` when set, otherwise the platform data
    /// directory for voxwatch.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoHomeDir`] if no platform directory exists.
    pub fn data_dir(&self) -> ConfigResult<PathBuf> {
        if let Some(dir) = &self.storage.data_dir {
            return Ok(dir.clone());
        }
        directories::ProjectDirs::from("", "", "voxwatch")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .ok_or(ConfigError::NoHomeDir)
    }
}

// ---------------------------------------------------------------------------
// Gateway
// ---------------------------------------------------------------------------

/// Gateway connection settings.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct GatewaySection {
    /// Account token.
    pub token: String,
    /// `user` or `bot`.
    pub token_type: String,
    /// REST API base URL.
    pub api_base: String,
    /// Fixed gateway URL. Discovered through the REST API when unset.
    pub gateway_url: Option<String>,
    /// Gateway intents bitmask.
    pub intents: u32,
    /// Seconds to wait for Hello after connecting.
    pub hello_timeout_secs: u64,
    /// Seconds to wait before re-identifying after an invalid session.
    pub invalid_session_delay_secs: u64,
    /// Reconnect when a heartbeat goes unacknowledged.
    pub zombie_detection: bool,
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            token: String::new(),
            token_type: "user".to_owned(),
            api_base: "https://discord.com/api/v10".to_owned(),
            gateway_url: None,
            intents: 128,
            hello_timeout_secs: 30,
            invalid_session_delay_secs: 5,
            zombie_detection: true,
        }
    }
}

impl GatewaySection {
    /// Whether a usable token is configured.
    #[must_use]
    pub fn has_token(&self) -> bool {
        let token = self.token.trim();
        !token.is_empty() && token != PLACEHOLDER_TOKEN
    }
}

impl std::fmt::Debug for GatewaySection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewaySection")
            .field("has_token", &self.has_token())
            .field("token_type", &self.token_type)
            .field("api_base", &self.api_base)
            .field("gateway_url", &self.gateway_url)
            .field("intents", &self.intents)
            .field("hello_timeout_secs", &self.hello_timeout_secs)
            .field("invalid_session_delay_secs", &self.invalid_session_delay_secs)
            .field("zombie_detection", &self.zombie_detection)
            .finish()
    }
}

impl Serialize for GatewaySection {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("GatewaySection", 7)?;
        // token is intentionally omitted.
        state.serialize_field("token_type", &self.token_type)?;
        state.serialize_field("api_base", &self.api_base)?;
        if let Some(url) = &self.gateway_url {
            state.serialize_field("gateway_url", url)?;
        }
        state.serialize_field("intents", &self.intents)?;
        state.serialize_field("hello_timeout_secs", &self.hello_timeout_secs)?;
        state.serialize_field("invalid_session_delay_secs", &self.invalid_session_delay_secs)?;
        state.serialize_field("zombie_detection", &self.zombie_detection)?;
        state.end()
    }
}

// ---------------------------------------------------------------------------
// Watch / lookup
// ---------------------------------------------------------------------------

/// Watched channels.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchSection {
    /// Voice channel ids to report on.
    pub channel_ids: Vec<String>,
    /// Own user id. Learned from the session when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub self_user_id: Option<String>,
}

/// Metadata lookup settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LookupSection {
    /// Upper bound for one remote lookup, in seconds.
    pub timeout_secs: u64,
}

impl Default for LookupSection {
    fn default() -> Self {
        Self { timeout_secs: 10 }
    }
}

// ---------------------------------------------------------------------------
// Notify
// ---------------------------------------------------------------------------

/// Webhook notifications.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct NotifySection {
    /// Post presence events to the webhook.
    pub enabled: bool,
    /// Webhook URL.
    pub webhook_url: Option<String>,
    /// Author name shown on messages.
    pub username: String,
    /// HTTP timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for NotifySection {
    fn default() -> Self {
        Self {
            enabled: false,
            webhook_url: None,
            username: "Voice Tracker".to_owned(),
            timeout_secs: 10,
        }
    }
}

impl std::fmt::Debug for NotifySection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifySection")
            .field("enabled", &self.enabled)
            .field("has_webhook_url", &self.webhook_url.is_some())
            .field("username", &self.username)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl Serialize for NotifySection {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("NotifySection", 3)?;
        state.serialize_field("enabled", &self.enabled)?;
        // webhook_url is intentionally omitted.
        state.serialize_field("username", &self.username)?;
        state.serialize_field("timeout_secs", &self.timeout_secs)?;
        state.end()
    }
}

// ---------------------------------------------------------------------------
// Storage / logging
// ---------------------------------------------------------------------------

/// Presence log location.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    /// Directory for the log file. Platform data dir when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
    /// Log file name.
    pub file_name: String,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            data_dir: None,
            file_name: "voice-log.csv".to_owned(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Base level filter.
    pub level: String,
    /// `pretty`, `compact`, `json` or `full`.
    pub format: String,
    /// Per-target directives (e.g. `voxwatch_gateway=debug`).
    pub directives: Vec<String>,
    /// Write rolling log files here instead of stderr.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
    /// `daily`, `hourly` or `never`.
    pub rotation: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: "compact".to_owned(),
            directives: Vec::new(),
            directory: None,
            rotation: "daily".to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_debug_redacts_token() {
        let section = GatewaySection {
            token: "secret-token-value".into(),
            ..GatewaySection::default()
        };
        let debug = format!("{section:?}");
        assert!(!debug.contains("secret-token-value"));
        assert!(debug.contains("has_token: true"));
    }

    #[test]
    fn serialize_omits_secrets() {
        let mut config = Config::default();
        config.gateway.token = "secret-token-value".into();
        config.notify.webhook_url = Some("https://hooks.example/abc".into());

        let toml = toml::to_string(&config).unwrap();
        assert!(!toml.contains("secret-token-value"));
        assert!(!toml.contains("hooks.example"));
        assert!(toml.contains("token_type"));
    }

    #[test]
    fn placeholder_token_is_not_a_token() {
        let section = GatewaySection {
            token: PLACEHOLDER_TOKEN.into(),
            ..GatewaySection::default()
        };
        assert!(!section.has_token());
    }

    #[test]
    fn explicit_data_dir_wins() {
        let mut config = Config::default();
        config.storage.data_dir = Some(PathBuf::from("/tmp/vw"));
        assert_eq!(config.data_dir().unwrap(), PathBuf::from("/tmp/vw"));
    }
}
