//! Message transports between the three parties of the bridge.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   WindowChannel    ┌──────────────┐   Runtime    ┌──────────────┐
//! │  Page realm  │◄──────────────────►│ ContentRelay │◄────────────►│  Background  │
//! │ (PageBridge, │  postMessage-like  │  (isolated   │ send_message │   process    │
//! │  PageClient) │  same-origin bcast │   realm)     │ + named port │              │
//! └──────────────┘                    └──────────────┘              └──────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `runtime` | Background messaging trait and named ports |
//! | `window` | Shared window message channel |

// ============================================================================
// Submodules
// ============================================================================

/// Background messaging trait and named ports.
pub mod runtime;

/// Shared window message channel.
pub mod window;

// ============================================================================
// Re-exports
// ============================================================================

pub use runtime::{PortHandle, Runtime, RuntimePort};
pub use window::{DEFAULT_CHANNEL_CAPACITY, WindowChannel, WindowMessage};
