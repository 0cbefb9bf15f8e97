//! Bridge protocol message types.
//!
//! This module defines the message formats exchanged across both
//! boundaries of the bridge and the filter applied to the shared window
//! channel.
//!
//! # Protocol Overview
//!
//! | Message Type | Boundary | Direction | Purpose |
//! |--------------|----------|-----------|---------|
//! | `PageMessage` | Window channel | Page → Relay | Requests, probes, acknowledgments |
//! | `ExtensionMessage` | Window channel | Relay → Page | Replies, events, probe answers |
//! | `RuntimeAction` | Runtime messaging | Background → Relay | Notifications, connectivity probe |
//! | `BackgroundCall` | Runtime messaging | Relay → Background | Sync acknowledgment |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `action` | Runtime messaging actions |
//! | `filter` | Origin and source filtering |
//! | `message` | Window-channel messages |

// ============================================================================
// Submodules
// ============================================================================

/// Runtime messaging actions.
pub mod action;

/// Origin and source filtering.
pub mod filter;

/// Window-channel message types.
pub mod message;

// ============================================================================
// Re-exports
// ============================================================================

pub use action::{BackgroundCall, RuntimeAction};
pub use filter::{DEFAULT_SOURCE_DENYLIST, OriginFilter, Rejection};
pub use message::{ExtensionMessage, PageMessage, Source};
