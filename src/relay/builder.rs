//! Builder pattern for relay configuration.
//!
//! Provides a fluent API for configuring and starting [`ContentRelay`]
//! instances.
//!
//! # Example
//!
//! ```ignore
//! use webext_bridge::{ContentRelay, RelayConfig, WindowChannel};
//!
//! let channel = WindowChannel::new("https://bookmarks.example");
//! let relay = ContentRelay::builder()
//!     .channel(channel.clone())
//!     .runtime(my_runtime)
//!     .config(RelayConfig::new())
//!     .build()?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::protocol::OriginFilter;
use crate::transport::{Runtime, WindowChannel};

use super::config::RelayConfig;
use super::core::ContentRelay;

// ============================================================================
// RelayBuilder
// ============================================================================

/// Builder for configuring a [`ContentRelay`] instance.
///
/// Use [`ContentRelay::builder()`] to create a new builder.
#[derive(Default, Clone)]
pub struct RelayBuilder {
    /// Window channel of the page.
    channel: Option<WindowChannel>,
    /// Background messaging.
    runtime: Option<Arc<dyn Runtime>>,
    /// Relay options.
    config: RelayConfig,
}

impl fmt::Debug for RelayBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayBuilder")
            .field("channel", &self.channel)
            .field("runtime", &self.runtime.is_some())
            .field("config", &self.config)
            .finish()
    }
}

// ============================================================================
// RelayBuilder Implementation
// ============================================================================

impl RelayBuilder {
    /// Creates a new relay builder with no channel or runtime.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the page's window channel.
    #[inline]
    #[must_use]
    pub fn channel(mut self, channel: WindowChannel) -> Self {
        self.channel = Some(channel);
        self
    }

    /// Sets the background runtime.
    #[inline]
    #[must_use]
    pub fn runtime(mut self, runtime: impl Runtime) -> Self {
        self.runtime = Some(Arc::new(runtime));
        self
    }

    /// Sets a shared background runtime.
    #[inline]
    #[must_use]
    pub fn shared_runtime(mut self, runtime: Arc<dyn Runtime>) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Sets the relay options.
    #[inline]
    #[must_use]
    pub fn config(mut self, config: RelayConfig) -> Self {
        self.config = config;
        self
    }

    /// Validates the configuration and starts the relay.
    ///
    /// Must be called inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if channel or runtime not set, or a timeout is zero
    /// - [`Error::InvalidOrigin`] if the channel origin is not a tuple origin
    pub fn build(self) -> Result<ContentRelay> {
        let channel = self
            .channel
            .ok_or_else(|| Error::config("Window channel is required"))?;
        let runtime = self
            .runtime
            .ok_or_else(|| Error::config("Background runtime is required"))?;

        if self.config.sync_timeout.is_zero() {
            return Err(Error::config("Sync timeout must be non-zero"));
        }
        if self.config.connection_test_timeout.is_zero() {
            return Err(Error::config("Connection test timeout must be non-zero"));
        }

        let filter = OriginFilter::for_relay(channel.origin())?
            .with_denylist(self.config.source_denylist.iter().cloned());

        Ok(ContentRelay::start(channel, runtime, filter, self.config))
    }
}

// ============================================================================
// Tests
// ============================================================================
