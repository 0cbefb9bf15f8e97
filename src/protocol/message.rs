//! Window-channel message types.
//!
//! Every message on the window channel is a JSON object carrying a `source`
//! tag. The page side writes `source: "webapp"`, the extension side writes
//! `source: "extension"`.
//!
//! # Page → Relay
//!
//! ```json
//! { "source": "webapp", "requestId": "r-1", "payload": { ... } }
//! { "source": "webapp", "type": "availabilityCheck" }
//! { "source": "webapp", "type": "syncComplete", "data": { ... } }
//! { "source": "webapp", "type": "connectionTestResponse", "data": { ... } }
//! ```
//!
//! # Relay → Page
//!
//! ```json
//! { "source": "extension", "event": "syncRequested", "data": { ... } }
//! { "source": "extension", "requestId": "r-1", "response": { ... } }
//! { "source": "extension", "type": "availabilityResponse", "available": true, "timestamp": 0 }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::{Value, json};

use crate::identifiers::RequestId;

// ============================================================================
// Constants
// ============================================================================

/// `type` of a page liveness probe.
pub const AVAILABILITY_CHECK: &str = "availabilityCheck";

/// `type` of the answer to a liveness probe.
pub const AVAILABILITY_RESPONSE: &str = "availabilityResponse";

/// `type` of a page self-test probe, answered like [`AVAILABILITY_CHECK`].
pub const SELF_TEST: &str = "selfTest";

/// `type` of a page sync acknowledgment.
pub const SYNC_COMPLETE: &str = "syncComplete";

/// `type` of a page connectivity-probe acknowledgment.
pub const CONNECTION_TEST_RESPONSE: &str = "connectionTestResponse";

/// Event asking the page to run a sync.
pub const SYNC_REQUESTED_EVENT: &str = "syncRequested";

/// Event asking the page to prove it is alive.
pub const CONNECTION_TEST_EVENT: &str = "connectionTest";

// ============================================================================
// Source
// ============================================================================

/// Which side of the bridge produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    /// The page application.
    Webapp,
    /// The extension (relay or bridge script speaking for it).
    Extension,
}

impl Source {
    /// Wire tag.
    #[inline]
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Webapp => "webapp",
            Self::Extension => "extension",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// PageMessage
// ============================================================================

/// A message written by the page, addressed to the relay.
#[derive(Debug, Clone, PartialEq)]
pub enum PageMessage {
    /// Request to forward to the background process.
    Request {
        /// Correlation token chosen by the page.
        request_id: RequestId,
        /// Opaque payload handed to the background as-is.
        payload: Value,
    },

    /// Liveness probe.
    AvailabilityCheck,

    /// Self-test probe.
    SelfTest,

    /// Acknowledgment of a `syncRequested` event.
    SyncComplete {
        /// Sync result supplied by the page.
        data: Value,
    },

    /// Acknowledgment of a `connectionTest` event.
    ConnectionTestResponse {
        /// Probe answer supplied by the page.
        data: Value,
    },

    /// Tagged message the relay has no handler for.
    Unknown {
        /// The `type` tag, or empty if none.
        kind: String,
    },
}

impl PageMessage {
    /// Parses a page message from the raw JSON object.
    ///
    /// A `type` tag takes precedence; untagged messages carrying a
    /// non-null `requestId` are requests.
    #[must_use]
    pub fn parse(raw: &Value) -> Self {
        if let Some(kind) = raw.get("type").and_then(Value::as_str) {
            return match kind {
                AVAILABILITY_CHECK => Self::AvailabilityCheck,
                SELF_TEST => Self::SelfTest,
                SYNC_COMPLETE => Self::SyncComplete {
                    data: field(raw, "data"),
                },
                CONNECTION_TEST_RESPONSE => Self::ConnectionTestResponse {
                    data: field(raw, "data"),
                },
                other => Self::Unknown {
                    kind: other.to_string(),
                },
            };
        }

        match RequestId::from_value(field(raw, "requestId")) {
            Some(request_id) => Self::Request {
                request_id,
                payload: field(raw, "payload"),
            },
            None => Self::Unknown {
                kind: String::new(),
            },
        }
    }

    /// Serializes to the wire shape, tagged `source: "webapp"`.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let source = Source::Webapp.as_str();
        match self {
            Self::Request {
                request_id,
                payload,
            } => json!({ "source": source, "requestId": request_id, "payload": payload }),
            Self::AvailabilityCheck => json!({ "source": source, "type": AVAILABILITY_CHECK }),
            Self::SelfTest => json!({ "source": source, "type": SELF_TEST }),
            Self::SyncComplete { data } => {
                json!({ "source": source, "type": SYNC_COMPLETE, "data": data })
            }
            Self::ConnectionTestResponse { data } => {
                json!({ "source": source, "type": CONNECTION_TEST_RESPONSE, "data": data })
            }
            Self::Unknown { kind } => json!({ "source": source, "type": kind }),
        }
    }
}

// ============================================================================
// ExtensionMessage
// ============================================================================

/// A message written on behalf of the extension, addressed to the page.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtensionMessage {
    /// Notification fan-out.
    Event {
        /// Event name.
        event: String,
        /// Event data.
        data: Value,
    },

    /// Reply to a forwarded request.
    Reply {
        /// Token of the originating request.
        request_id: RequestId,
        /// Background response, or `{success:false, error}`.
        response: Value,
    },

    /// Answer to a liveness probe.
    AvailabilityResponse {
        /// Always `true` when sent by a live relay or bridge.
        available: bool,
        /// Milliseconds since the Unix epoch.
        timestamp: u64,
    },
}

impl ExtensionMessage {
    /// Creates an availability answer stamped with the current time.
    #[inline]
    #[must_use]
    pub fn available_now() -> Self {
        Self::AvailabilityResponse {
            available: true,
            timestamp: now_millis(),
        }
    }

    /// Creates the failure reply delivered when the background is unreachable.
    #[must_use]
    pub fn failure(request_id: RequestId, error: impl Into<String>) -> Self {
        Self::Reply {
            request_id,
            response: json!({ "success": false, "error": error.into() }),
        }
    }

    /// Parses an extension message from the raw JSON object.
    ///
    /// Returns `None` for shapes the page has no use for.
    #[must_use]
    pub fn parse(raw: &Value) -> Option<Self> {
        if raw.get("type").and_then(Value::as_str) == Some(AVAILABILITY_RESPONSE) {
            return Some(Self::AvailabilityResponse {
                available: raw
                    .get("available")
                    .and_then(Value::as_bool)
                    .unwrap_or_default(),
                timestamp: raw
                    .get("timestamp")
                    .and_then(Value::as_u64)
                    .unwrap_or_default(),
            });
        }

        if let Some(event) = raw.get("event").and_then(Value::as_str) {
            return Some(Self::Event {
                event: event.to_string(),
                data: field(raw, "data"),
            });
        }

        RequestId::from_value(field(raw, "requestId")).map(|request_id| Self::Reply {
            request_id,
            response: field(raw, "response"),
        })
    }

    /// Serializes to the wire shape, tagged `source: "extension"`.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let source = Source::Extension.as_str();
        match self {
            Self::Event { event, data } => json!({ "source": source, "event": event, "data": data }),
            Self::Reply {
                request_id,
                response,
            } => json!({ "source": source, "requestId": request_id, "response": response }),
            Self::AvailabilityResponse {
                available,
                timestamp,
            } => json!({
                "source": source,
                "type": AVAILABILITY_RESPONSE,
                "available": available,
                "timestamp": timestamp,
            }),
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Clones a field out of a JSON object, `Null` if absent.
#[inline]
fn field(raw: &Value, key: &str) -> Value {
    raw.get(key).cloned().unwrap_or(Value::Null)
}

/// Milliseconds since the Unix epoch.
#[inline]
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or_default()
}

// ============================================================================
// Tests
// ============================================================================
