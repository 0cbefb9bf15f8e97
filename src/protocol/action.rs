//! Runtime messaging actions.
//!
//! Messages exchanged between the relay and the background process are
//! JSON objects discriminated by an `action` field.
//!
//! | Action | Direction | Fields |
//! |--------|-----------|--------|
//! | `notifyWebApp` | Background → Relay | `event`, `data` |
//! | `testConnection` | Background → Relay | none (async reply) |
//! | `syncComplete` | Relay → Background | `data` |
//! | `syncTimeout` | Relay → Background | `timeoutMs` (opt-in) |
//!
//! Forwarded page payloads are not actions of this protocol; they travel to
//! the background untouched.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// RuntimeAction
// ============================================================================

/// Action sent by the background process to the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum RuntimeAction {
    /// Post an event to the page.
    NotifyWebApp {
        /// Event name.
        event: String,
        /// Event data.
        #[serde(default)]
        data: Value,
    },

    /// Probe whether the page answers.
    TestConnection,
}

impl RuntimeAction {
    /// Parses an action, returning `None` for anything the relay does not handle.
    #[inline]
    #[must_use]
    pub fn parse(message: &Value) -> Option<Self> {
        Self::deserialize(message).ok()
    }
}

// ============================================================================
// BackgroundCall
// ============================================================================

/// Call made by the relay to the background process on its own behalf.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum BackgroundCall {
    /// The page acknowledged a sync request.
    SyncComplete {
        /// Data the page supplied with its acknowledgment.
        data: Value,
    },

    /// A sync request went unacknowledged.
    SyncTimeout {
        /// Deadline that elapsed, in milliseconds.
        #[serde(rename = "timeoutMs")]
        timeout_ms: u64,
    },
}

impl BackgroundCall {
    /// Serializes to the runtime message shape.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Json`] if serialization fails.
    #[inline]
    pub fn to_value(&self) -> crate::Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_parse_notify_web_app() {
        let message = json!({ "action": "notifyWebApp", "event": "syncRequested", "data": { "full": true } });
        assert_eq!(
            RuntimeAction::parse(&message),
            Some(RuntimeAction::NotifyWebApp {
                event: "syncRequested".into(),
                data: json!({ "full": true })
            })
        );
    }

    #[test]
    fn test_notify_without_data() {
        let message = json!({ "action": "notifyWebApp", "event": "bookmarksUpdated" });
        assert_eq!(
            RuntimeAction::parse(&message),
            Some(RuntimeAction::NotifyWebApp {
                event: "bookmarksUpdated".into(),
                data: Value::Null
            })
        );
    }

    #[test]
    fn test_parse_test_connection() {
        let message = json!({ "action": "testConnection" });
        assert_eq!(
            RuntimeAction::parse(&message),
            Some(RuntimeAction::TestConnection)
        );
    }

    #[test]
    fn test_unknown_action() {
        assert_eq!(RuntimeAction::parse(&json!({ "action": "getBookmarks" })), None);
        assert_eq!(RuntimeAction::parse(&json!("not an object")), None);
    }

    #[test]
    fn test_background_call_shapes() {
        let call = BackgroundCall::SyncComplete {
            data: json!({ "count": 5 }),
        };
        assert_eq!(
            call.to_value().expect("serialize"),
            json!({ "action": "syncComplete", "data": { "count": 5 } })
        );

        let call = BackgroundCall::SyncTimeout { timeout_ms: 30_000 };
        assert_eq!(
            call.to_value().expect("serialize"),
            json!({ "action": "syncTimeout", "timeoutMs": 30_000 })
        );
    }
}
