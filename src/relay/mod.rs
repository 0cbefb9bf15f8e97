//! Content relay.
//!
//! The relay lives in the isolated content-script realm and is the only
//! component that crosses the realm boundary in both directions.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`ContentRelay`] | Dispatcher, request forwarding, notifications, probes |
//! | [`RelayBuilder`] | Fluent configuration builder |
//! | [`RelayConfig`] | Deadlines, denylist, port name, sync policy |
//! | [`UnacknowledgedSync`] | What happens to a sync the page never acknowledges |
//!
//! # Example
//!
//! ```ignore
//! use webext_bridge::{ContentRelay, WindowChannel};
//!
//! # async fn example(runtime: impl webext_bridge::Runtime) -> webext_bridge::Result<()> {
//! let channel = WindowChannel::new("https://bookmarks.example");
//! let relay = ContentRelay::builder()
//!     .channel(channel)
//!     .runtime(runtime)
//!     .build()?;
//!
//! let probe = relay.handle_connection_test().await;
//! println!("page responsive: {}", probe["responsive"]);
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Fluent builder pattern for relay configuration.
pub mod builder;

/// Relay options.
pub mod config;

/// Core relay implementation.
pub mod core;

/// Ephemeral listener registry.
pub(crate) mod listener;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::RelayBuilder;
pub use config::{
    DEFAULT_CONNECTION_TEST_TIMEOUT, DEFAULT_PORT_NAME, DEFAULT_SYNC_TIMEOUT, RelayConfig,
    UnacknowledgedSync,
};
pub use core::ContentRelay;
