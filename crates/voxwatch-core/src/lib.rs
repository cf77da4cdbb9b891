//! Voxwatch Core - shared types for the voice presence tracker.
//!
//! This crate provides:
//! - [`NormalizedEvent`], the enriched join/leave record emitted by the tracker
//! - [`ConnectionState`] and [`StatusEvent`] describing the gateway session
//! - The [`EventSink`] trait every downstream collaborator implements
//! - Duration formatting shared by notifications and statistics

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod event;
pub mod sink;
pub mod state;
pub mod utils;

pub use event::{NormalizedEvent, PresenceKind};
pub use sink::{ChannelSink, EventSink, SinkSet};
pub use state::{ConnectionState, StatusEvent, TrackerEvent};
pub use utils::format_duration;
