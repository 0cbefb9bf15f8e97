//! Type-safe identifiers for bridge entities.
//!
//! Newtype wrappers prevent mixing request correlation tokens with
//! listener handles at compile time.
//!
//! | Type | Wraps | Origin |
//! |------|-------|--------|
//! | [`RequestId`] | JSON value | Page (opaque, echoed verbatim) |
//! | [`ListenerId`] | `u64` | Relay listener registry |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// ============================================================================
// RequestId
// ============================================================================

/// Correlation token of a page request.
///
/// The page chooses the token; the relay never interprets it and echoes it
/// back exactly as received, so numbers stay numbers and strings stay strings.
/// `null` is not a valid token.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Value);

impl RequestId {
    /// Generates a new random request ID (UUID v4 string).
    #[inline]
    #[must_use]
    pub fn generate() -> Self {
        Self(Value::String(Uuid::new_v4().to_string()))
    }

    /// Wraps a JSON value taken from the wire.
    ///
    /// Returns `None` for `null`.
    #[inline]
    #[must_use]
    pub fn from_value(value: Value) -> Option<Self> {
        if value.is_null() {
            None
        } else {
            Some(Self(value))
        }
    }

    /// Returns the raw JSON token.
    #[inline]
    #[must_use]
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Consumes the ID, returning the raw JSON token.
    #[inline]
    #[must_use]
    pub fn into_value(self) -> Value {
        self.0
    }
}

impl PartialEq for RequestId {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for RequestId {}

impl Hash for RequestId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Compact JSON text is canonical for equal values except object key
        // order, which serde_json keeps sorted.
        self.0.to_string().hash(state);
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Value::String(s) => f.write_str(s),
            other => write!(f, "{other}"),
        }
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        Self(Value::String(value.to_string()))
    }
}

impl From<u64> for RequestId {
    fn from(value: u64) -> Self {
        Self(Value::from(value))
    }
}

// ============================================================================
// ListenerId
// ============================================================================

/// Handle of an armed ephemeral listener.
///
/// Allocated sequentially by the relay's listener registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Creates a listener ID from a raw sequence number.
    #[inline]
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw sequence number.
    #[inline]
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================
