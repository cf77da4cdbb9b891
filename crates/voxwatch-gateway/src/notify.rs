//! Webhook notifications for presence events.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};
use voxwatch_core::{EventSink, NormalizedEvent, PresenceKind, TrackerEvent, format_duration};

use crate::error::{TrackerError, TrackerResult};

/// Default author name shown on webhook messages.
pub const DEFAULT_WEBHOOK_USERNAME: &str = "Voice Tracker";

#[derive(Serialize)]
struct WebhookBody<'a> {
    content: &'a str,
    username: &'a str,
}

/// Posts a message to a webhook for every presence event while enabled.
pub struct WebhookNotifier {
    http: reqwest::Client,
    url: Arc<str>,
    username: Arc<str>,
    enabled: AtomicBool,
}

impl fmt::Debug for WebhookNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookNotifier")
            .field("url", &"[REDACTED]")
            .field("username", &self.username)
            .field("enabled", &self.is_enabled())
            .finish_non_exhaustive()
    }
}

impl WebhookNotifier {
    /// Create a notifier for `url`.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::Config`] if `url` is not an http(s) URL, or
    /// [`TrackerError::Http`] if the HTTP client cannot be built.
    pub fn new(
        url: &str,
        username: impl Into<String>,
        enabled: bool,
        timeout: Duration,
    ) -> TrackerResult<Self> {
        let parsed = url::Url::parse(url)
            .map_err(|e| TrackerError::Config(format!("invalid webhook URL: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(TrackerError::Config(
                "webhook URL must use http or https".into(),
            ));
        }

        let http = reqwest::Client::builder().timeout(timeout).build()?;
        let username: String = username.into();
        Ok(Self {
            http,
            url: Arc::from(url),
            username: Arc::from(username),
            enabled: AtomicBool::new(enabled),
        })
    }

    /// Turn delivery on or off at runtime.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    /// Whether delivery is on.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Render the message for an event.
    #[must_use]
    pub fn format_message(event: &NormalizedEvent) -> String {
        match event.kind {
            PresenceKind::Join => format!(
                "🔵 **{}** joined **{}** ({})",
                event.user_name, event.channel_name, event.guild_name
            ),
            PresenceKind::Leave => {
                let mut message = format!(
                    "🔴 **{}** left **{}** ({})",
                    event.user_name, event.channel_name, event.guild_name
                );
                if let Some(stay) = event.stay_duration_ms.filter(|ms| *ms > 0) {
                    message.push_str(" after ");
                    message.push_str(&format_duration(stay));
                }
                message
            },
        }
    }

    /// Post `content` and wait for the response.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::Http`] on transport failure or a non-2xx
    /// response.
    pub async fn send(&self, content: &str) -> TrackerResult<()> {
        post(&self.http, &self.url, &self.username, content).await
    }
}

async fn post(http: &reqwest::Client, url: &str, username: &str, content: &str) -> TrackerResult<()> {
    http.post(url)
        .json(&WebhookBody { content, username })
        .send()
        .await?
        .error_for_status()?;
    Ok(())
}

impl EventSink for WebhookNotifier {
    fn deliver(&self, event: &TrackerEvent) {
        let TrackerEvent::Presence(presence) = event else {
            return;
        };
        if !self.is_enabled() {
            return;
        }

        let content = Self::format_message(presence);
        let http = self.http.clone();
        let url = Arc::clone(&self.url);
        let username = Arc::clone(&self.username);
        tokio::spawn(async move {
            match post(&http, &url, &username, &content).await {
                Ok(()) => debug!("Webhook delivered"),
                Err(e) => warn!(error = %e, "Webhook delivery failed"),
            }
        });
    }
}
