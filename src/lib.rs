//! WebExtension Bridge - Page to extension message relay.
//!
//! This library connects a web page to a browser extension's background
//! process through an isolated content-script relay.
//!
//! # Architecture
//!
//! The bridge has three parties:
//!
//! - **Page realm**: [`PageBridge`] and [`PageClient`], running with the page's privileges
//! - **Content relay**: [`ContentRelay`], the only party crossing the realm boundary
//! - **Background**: anything implementing [`Runtime`]
//!
//! Key design principles:
//!
//! - The page and the relay share a single [`WindowChannel`]; everything on it is public
//! - Messages are accepted only from the page's own origin and the expected `source` tag
//! - Every forwarded request gets exactly one reply carrying its `requestId`
//! - Ephemeral listeners resolve exactly once: acknowledgment or deadline, never both
//!
//! # Quick Start
//!
//! ```ignore
//! use serde_json::json;
//! use webext_bridge::{ContentRelay, PageBridge, PageClient, Result, WindowChannel};
//!
//! async fn run(background: impl webext_bridge::Runtime) -> Result<()> {
//!     let channel = WindowChannel::new("https://bookmarks.example");
//!
//!     // Content script side
//!     let relay = ContentRelay::builder()
//!         .channel(channel.clone())
//!         .runtime(background)
//!         .build()?;
//!
//!     // Page side
//!     let bridge = PageBridge::new(channel.clone())?;
//!     bridge.inject();
//!
//!     let client = PageClient::new(channel)?;
//!     let bookmarks = client.request(json!({ "action": "getBookmarks" })).await?;
//!     println!("{bookmarks}");
//!
//!     relay.shutdown();
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Request and listener IDs |
//! | [`page`] | Page realm: [`PageBridge`], [`PageClient`] |
//! | [`protocol`] | Message shapes and the origin filter |
//! | [`relay`] | Content relay: [`ContentRelay`], [`RelayBuilder`], [`RelayConfig`] |
//! | [`transport`] | Window channel and background runtime |

// ============================================================================
// Modules
// ============================================================================

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Request and listener identifiers.
pub mod identifiers;

/// Page realm: injected bridge and request client.
pub mod page;

/// Bridge protocol message types.
///
/// Window-channel messages, runtime actions, and the origin filter.
pub mod protocol;

/// Content relay between the page and the background.
///
/// Use [`ContentRelay::builder()`] to start a relay.
pub mod relay;

/// Message transports.
///
/// The shared window channel and the background runtime abstraction.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Relay types
pub use relay::{ContentRelay, RelayBuilder, RelayConfig, UnacknowledgedSync};

// Page types
pub use page::{ExtensionEvent, PageBridge, PageClient, PageEvent};

// Protocol types
pub use protocol::{
    BackgroundCall, ExtensionMessage, OriginFilter, PageMessage, Rejection, RuntimeAction, Source,
};

// Transport types
pub use transport::{PortHandle, Runtime, RuntimePort, WindowChannel, WindowMessage};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{ListenerId, RequestId};
