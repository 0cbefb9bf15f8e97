//! Window message channel.
//!
//! Models `window.postMessage`: a broadcast medium shared by the page realm
//! and the content-script realm. Every subscriber receives every message,
//! tagged with the origin of the sender, and must filter for itself.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::broadcast;
use tracing::trace;

// ============================================================================
// Constants
// ============================================================================

/// Default number of messages buffered per subscriber.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

// ============================================================================
// WindowMessage
// ============================================================================

/// A message as delivered to a window listener.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowMessage {
    /// Serialized origin of the sender.
    pub origin: String,
    /// Message body.
    pub data: Value,
}

// ============================================================================
// WindowChannel
// ============================================================================

/// Shared window message channel for one page load.
///
/// Cloning yields another handle to the same channel.
#[derive(Debug, Clone)]
pub struct WindowChannel {
    /// Origin of the page that owns this window.
    origin: Arc<str>,
    /// Broadcast sender.
    tx: broadcast::Sender<WindowMessage>,
}

impl WindowChannel {
    /// Creates a channel for a page at `origin`.
    #[inline]
    #[must_use]
    pub fn new(origin: impl Into<String>) -> Self {
        Self::with_capacity(origin, DEFAULT_CHANNEL_CAPACITY)
    }

    /// Creates a channel with a custom per-subscriber buffer.
    #[must_use]
    pub fn with_capacity(origin: impl Into<String>, capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            origin: Arc::from(origin.into()),
            tx,
        }
    }

    /// Returns the page origin.
    #[inline]
    #[must_use]
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Posts a message from the page's own origin.
    ///
    /// Both realms of the page share this origin.
    #[inline]
    pub fn post(&self, data: Value) {
        let origin = self.origin.to_string();
        self.post_from(origin, data);
    }

    /// Posts a message from an arbitrary origin (e.g. a cross-origin frame).
    pub fn post_from(&self, origin: impl Into<String>, data: Value) {
        let message = WindowMessage {
            origin: origin.into(),
            data,
        };

        if self.tx.send(message).is_err() {
            trace!("Window message posted with no listeners");
        }
    }

    /// Subscribes to all messages posted after this call.
    #[inline]
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<WindowMessage> {
        self.tx.subscribe()
    }

    /// Returns the number of live subscribers.
    #[inline]
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

// ============================================================================
// Tests
// ============================================================================
