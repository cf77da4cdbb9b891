//! Downstream delivery of tracker events.
//!
//! The tracker never fans out implicitly: it holds exactly one
//! [`EventSink`]. Multiple collaborators are combined explicitly with
//! [`SinkSet`], which delivers to each member in registration order.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;

use crate::state::TrackerEvent;

/// A consumer of tracker events.
///
/// `deliver` is called from the tracker's serialized event path and must
/// not block. Implementations that perform I/O spawn it and log their own
/// failures.
pub trait EventSink: Send + Sync {
    /// Hand one event to the sink.
    fn deliver(&self, event: &TrackerEvent);
}

impl<S: EventSink + ?Sized> EventSink for Arc<S> {
    fn deliver(&self, event: &TrackerEvent) {
        (**self).deliver(event);
    }
}

/// An ordered collection of sinks.
#[derive(Default, Clone)]
pub struct SinkSet {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl SinkSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sink, returning the set for chaining.
    #[must_use]
    pub fn with(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Add a sink in place.
    pub fn push(&mut self, sink: Arc<dyn EventSink>) {
        self.sinks.push(sink);
    }

    /// Number of registered sinks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    /// Whether no sink is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl EventSink for SinkSet {
    fn deliver(&self, event: &TrackerEvent) {
        for sink in &self.sinks {
            sink.deliver(event);
        }
    }
}

/// Forwards events into an unbounded channel.
///
/// Useful for consumers that want to process events on their own task.
#[derive(Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<TrackerEvent>,
}

impl ChannelSink {
    /// Create a sink and the receiver that drains it.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TrackerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn deliver(&self, event: &TrackerEvent) {
        if self.tx.send(event.clone()).is_err() {
            debug!("event receiver dropped; discarding event");
        }
    }
}
