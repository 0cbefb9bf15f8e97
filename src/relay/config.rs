//! Content relay configuration.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use webext_bridge::{RelayConfig, UnacknowledgedSync};
//!
//! let config = RelayConfig::new()
//!     .with_sync_timeout(Duration::from_secs(10))
//!     .with_unacknowledged_sync(UnacknowledgedSync::Notify);
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use crate::protocol::DEFAULT_SOURCE_DENYLIST;

// ============================================================================
// Constants
// ============================================================================

/// Default deadline for the page to acknowledge `syncRequested`.
pub const DEFAULT_SYNC_TIMEOUT: Duration = Duration::from_secs(30);

/// Default deadline for the page to answer a connectivity probe.
pub const DEFAULT_CONNECTION_TEST_TIMEOUT: Duration = Duration::from_secs(2);

/// Name of the port opened to the background process.
pub const DEFAULT_PORT_NAME: &str = "content-script";

// ============================================================================
// UnacknowledgedSync
// ============================================================================

/// What to do when the page never acknowledges a sync request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UnacknowledgedSync {
    /// Drop silently. Neither side is told.
    #[default]
    Drop,
    /// Send `{action:"syncTimeout", timeoutMs}` to the background process.
    Notify,
}

// ============================================================================
// RelayConfig
// ============================================================================

/// Timing and filtering options for a [`ContentRelay`](super::ContentRelay).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// Deadline for a `syncComplete` acknowledgment.
    pub sync_timeout: Duration,

    /// Deadline for a `connectionTestResponse`.
    pub connection_test_timeout: Duration,

    /// Policy for expired sync listeners.
    pub unacknowledged_sync: UnacknowledgedSync,

    /// Name of the background port.
    pub port_name: String,

    /// Source tags ignored even when otherwise well-formed.
    pub source_denylist: Vec<String>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl RelayConfig {
    /// Creates a configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sync_timeout: DEFAULT_SYNC_TIMEOUT,
            connection_test_timeout: DEFAULT_CONNECTION_TEST_TIMEOUT,
            unacknowledged_sync: UnacknowledgedSync::Drop,
            port_name: DEFAULT_PORT_NAME.to_string(),
            source_denylist: DEFAULT_SOURCE_DENYLIST
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl RelayConfig {
    /// Sets the sync acknowledgment deadline.
    #[inline]
    #[must_use]
    pub fn with_sync_timeout(mut self, timeout: Duration) -> Self {
        self.sync_timeout = timeout;
        self
    }

    /// Sets the connectivity probe deadline.
    #[inline]
    #[must_use]
    pub fn with_connection_test_timeout(mut self, timeout: Duration) -> Self {
        self.connection_test_timeout = timeout;
        self
    }

    /// Sets the unacknowledged sync policy.
    #[inline]
    #[must_use]
    pub fn with_unacknowledged_sync(mut self, policy: UnacknowledgedSync) -> Self {
        self.unacknowledged_sync = policy;
        self
    }

    /// Sets the background port name.
    #[inline]
    #[must_use]
    pub fn with_port_name(mut self, name: impl Into<String>) -> Self {
        self.port_name = name.into();
        self
    }

    /// Adds a source tag substring to the denylist.
    #[inline]
    #[must_use]
    pub fn with_denied_source(mut self, source: impl Into<String>) -> Self {
        self.source_denylist.push(source.into());
        self
    }

    /// Replaces the denylist.
    #[inline]
    #[must_use]
    pub fn with_denylist(mut self, denylist: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.source_denylist = denylist.into_iter().map(Into::into).collect();
        self
    }
}

// ============================================================================
// Tests
// ============================================================================
