//! Error types for the page/extension bridge.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use webext_bridge::{PageClient, Result};
//!
//! async fn example(client: &PageClient) -> Result<()> {
//!     let response = client.request(serde_json::json!({ "action": "getBookmarks" })).await?;
//!     println!("{response}");
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`], [`Error::InvalidOrigin`] |
//! | Background | [`Error::Runtime`], [`Error::PortUnavailable`] |
//! | Channel | [`Error::ConnectionClosed`] |
//! | Protocol | [`Error::Protocol`] |
//! | Timing | [`Error::Timeout`], [`Error::RequestTimeout`] |
//! | External | [`Error::Json`] |

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use thiserror::Error;

use crate::identifiers::RequestId;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when relay configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Origin could not be parsed or is opaque.
    #[error("Invalid origin: {origin}")]
    InvalidOrigin {
        /// The rejected origin string.
        origin: String,
    },

    // ========================================================================
    // Background Errors
    // ========================================================================
    /// Background runtime call failed.
    ///
    /// Carries the platform error text unchanged (e.g. "No receiving end"),
    /// which is what the page receives in its failure reply.
    #[error("Runtime error: {message}")]
    Runtime {
        /// Platform error text.
        message: String,
    },

    /// Background port could not be opened.
    #[error("Port {name} unavailable: {message}")]
    PortUnavailable {
        /// Requested port name.
        name: String,
        /// Platform error text.
        message: String,
    },

    // ========================================================================
    // Channel Errors
    // ========================================================================
    /// Relay or client stopped while a call was outstanding.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Protocol violation or unexpected message shape.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    // ========================================================================
    // Timing Errors
    // ========================================================================
    /// Operation timeout.
    #[error("Timeout after {timeout_ms}ms: {operation}")]
    Timeout {
        /// Description of the operation that timed out.
        operation: String,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Page request timeout.
    ///
    /// Returned by the page client when no reply arrives for a request.
    #[error("Request {request_id} timed out after {timeout_ms}ms")]
    RequestTimeout {
        /// The request ID that timed out.
        request_id: RequestId,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an invalid origin error.
    #[inline]
    pub fn invalid_origin(origin: impl Into<String>) -> Self {
        Self::InvalidOrigin {
            origin: origin.into(),
        }
    }

    /// Creates a runtime error from platform error text.
    #[inline]
    pub fn runtime(message: impl Into<String>) -> Self {
        Self::Runtime {
            message: message.into(),
        }
    }

    /// Creates a port unavailable error.
    #[inline]
    pub fn port_unavailable(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PortUnavailable {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a timeout error.
    #[inline]
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Creates a request timeout error.
    #[inline]
    pub fn request_timeout(request_id: RequestId, timeout_ms: u64) -> Self {
        Self::RequestTimeout {
            request_id,
            timeout_ms,
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::RequestTimeout { .. })
    }

    /// Returns `true` if the background side could not be reached.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Runtime { .. } | Self::PortUnavailable { .. } | Self::ConnectionClosed
        )
    }

    /// Text placed in the `error` field of a failure reply to the page.
    ///
    /// Runtime errors pass the platform text through untouched.
    #[must_use]
    pub fn reply_text(&self) -> String {
        match self {
            Self::Runtime { message } => message.clone(),
            other => other.to_string(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::runtime("No receiving end");
        assert_eq!(err.to_string(), "Runtime error: No receiving end");
    }

    #[test]
    fn test_config_error() {
        let err = Error::config("missing runtime");
        assert_eq!(err.to_string(), "Configuration error: missing runtime");
    }

    #[test]
    fn test_reply_text_passes_platform_message() {
        let err = Error::runtime("Extension context invalidated.");
        assert_eq!(err.reply_text(), "Extension context invalidated.");

        let err = Error::ConnectionClosed;
        assert_eq!(err.reply_text(), "Connection closed");
    }

    #[test]
    fn test_is_timeout() {
        let timeout_err = Error::timeout("connection test", 2000);
        let request_err = Error::request_timeout(RequestId::generate(), 30_000);
        let other_err = Error::runtime("test");

        assert!(timeout_err.is_timeout());
        assert!(request_err.is_timeout());
        assert!(!other_err.is_timeout());
    }

    #[test]
    fn test_is_connection_error() {
        assert!(Error::runtime("x").is_connection_error());
        assert!(Error::port_unavailable("content-script", "x").is_connection_error());
        assert!(Error::ConnectionClosed.is_connection_error());
        assert!(!Error::config("x").is_connection_error());
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }
}
