//! Voxwatch Gateway - Discord Gateway client and voice presence tracker.
//!
//! This crate provides:
//! - A Gateway connection state machine with heartbeat, resume and reconnect
//! - Presence tracking for a set of watched voice channels
//! - A single-flight metadata cache backed by the Discord REST API
//! - Webhook notifications for presence events
//!
//! # Architecture
//!
//! ```text
//! Gateway (WSS) ──▶ GatewayTracker ──▶ PresenceTracker ──▶ EventSink
//!                        │                                  (CSV, webhook, ...)
//!                        ▼
//!                  MetadataCache ──▶ DiscordRest
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use voxwatch_core::ChannelSink;
//! use voxwatch_gateway::{DiscordRest, MetadataCache, TokenType, TrackerConfig};
//!
//! # async fn example() -> Result<(), voxwatch_gateway::TrackerError> {
//! let rest = DiscordRest::new(
//!     voxwatch_gateway::rest::DEFAULT_API_BASE,
//!     "token",
//!     TokenType::User,
//!     Duration::from_secs(10),
//! )?;
//! let metadata = Arc::new(MetadataCache::new(Arc::new(rest), Duration::from_secs(10)));
//! let (sink, mut events) = ChannelSink::new();
//!
//! let config = TrackerConfig {
//!     token: "token".into(),
//!     watch: ["1234567890"].into_iter().collect(),
//!     ..TrackerConfig::default()
//! };
//! let mut handle = voxwatch_gateway::spawn(config, metadata, Arc::new(sink))?;
//!
//! while let Some(event) = events.recv().await {
//!     println!("{event:?}");
//! }
//! handle.stop().await?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod error;
pub mod metadata;
pub mod notify;
pub mod presence;
pub mod protocol;
pub mod reconnect;
pub mod rest;

mod connection;
mod heartbeat;
mod tracker;

pub use error::{LookupError, TrackerError, TrackerResult};
pub use metadata::{
    ChannelInfo, GuildInfo, MemberInfo, MetadataCache, MetadataSource, NameHint, UserInfo,
};
pub use notify::WebhookNotifier;
pub use presence::{MembershipUpdate, PresenceTracker, UserPresence, WatchSet};
pub use reconnect::ReconnectDecision;
pub use rest::{DiscordRest, TokenType};
pub use tracker::{GatewayTracker, PLACEHOLDER_TOKEN, TrackerConfig, TrackerHandle, spawn};
