//! Page realm.
//!
//! Everything here runs with the page's own privileges. The page never
//! reaches the background directly; it posts to its window and the
//! content relay does the rest.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`PageBridge`] | Injected bridge: availability flag, ready event, probe responders |
//! | [`PageClient`] | Request/reply client with correlation by request ID |
//! | [`PageEvent`] | Events dispatched to page code by the bridge |
//! | [`ExtensionEvent`] | Relay notifications seen by the client |

// ============================================================================
// Submodules
// ============================================================================

/// Injected page bridge.
pub mod bridge;

/// Page-side request client.
pub mod client;

// ============================================================================
// Re-exports
// ============================================================================

pub use bridge::{EXTENSION_READY_EVENT, PageBridge, PageEvent};
pub use client::{DEFAULT_REQUEST_TIMEOUT, ExtensionEvent, PageClient};
