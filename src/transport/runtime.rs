//! Extension runtime messaging.
//!
//! The relay reaches the background process through two primitives:
//!
//! - a one-shot request/response call ([`Runtime::send_message`]), and
//! - a named, long-lived port ([`Runtime::connect`]) used for disconnect
//!   detection and unsolicited notifications.
//!
//! The host embedding the relay implements [`Runtime`] on top of whatever
//! carries messages to its background process.
//!
//! # Port Lifecycle
//!
//! ```text
//! Runtime::connect("content-script")
//!        │
//!        ▼
//! (PortHandle, RuntimePort) ──► relay owns RuntimePort
//!        │                        │
//!  PortHandle::post  ────────────►│ notifications
//!  PortHandle::disconnect ───────►│ recv() == None → port nulled
//! ```

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::{Error, Result};

// ============================================================================
// Runtime
// ============================================================================

/// Background-process messaging primitives.
#[async_trait]
pub trait Runtime: Send + Sync + 'static {
    /// Sends a message to the background process and waits for its reply.
    ///
    /// There is exactly one reply per call.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Runtime`] carrying the platform error text when the
    /// background is unreachable, has no receiver, or the extension context
    /// was invalidated.
    async fn send_message(&self, message: Value) -> Result<Value>;

    /// Opens a named port to the background process.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PortUnavailable`] if the port cannot be opened.
    fn connect(&self, name: &str) -> Result<RuntimePort>;
}

// ============================================================================
// RuntimePort
// ============================================================================

/// Relay end of a named port.
#[derive(Debug)]
pub struct RuntimePort {
    /// Port name.
    name: String,
    /// Messages pushed by the background side.
    incoming: mpsc::UnboundedReceiver<Value>,
}

impl RuntimePort {
    /// Creates a connected port pair.
    ///
    /// The [`PortHandle`] stays with the background side; dropping it (or
    /// calling [`PortHandle::disconnect`]) disconnects the port.
    #[must_use]
    pub fn pair(name: impl Into<String>) -> (PortHandle, Self) {
        let name = name.into();
        let (tx, incoming) = mpsc::unbounded_channel();
        (
            PortHandle {
                name: name.clone(),
                tx,
            },
            Self { name, incoming },
        )
    }

    /// Returns the port name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Waits for the next message.
    ///
    /// Returns `None` once the background side has disconnected.
    #[inline]
    pub async fn recv(&mut self) -> Option<Value> {
        self.incoming.recv().await
    }
}

// ============================================================================
// PortHandle
// ============================================================================

/// Background end of a named port.
#[derive(Debug, Clone)]
pub struct PortHandle {
    /// Port name.
    name: String,
    /// Sender into the relay end.
    tx: mpsc::UnboundedSender<Value>,
}

impl PortHandle {
    /// Returns the port name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Pushes a message to the relay.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the relay end is gone.
    pub fn post(&self, message: Value) -> Result<()> {
        self.tx.send(message).map_err(|_| Error::ConnectionClosed)
    }

    /// Returns `true` if the relay end is gone.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Disconnects the port from the background side.
    #[inline]
    pub fn disconnect(self) {
        drop(self);
    }
}

// ============================================================================
// Tests
// ============================================================================
