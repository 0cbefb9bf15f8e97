//! Origin and source filtering for window-channel messages.
//!
//! The window channel is a broadcast medium: every listener in both realms
//! sees every message, including messages from foreign frames and from
//! unrelated browser tooling. Each side runs incoming messages through an
//! [`OriginFilter`] before looking at them.
//!
//! # Rules
//!
//! Applied in order, first failure wins:
//!
//! 1. Origin must equal the page origin ([`Rejection::ForeignOrigin`])
//! 2. `source` must be a string ([`Rejection::MissingSource`])
//! 3. `source` must not contain a denylisted substring ([`Rejection::DeniedSource`])
//! 4. `source` must be the side this filter listens for ([`Rejection::UnexpectedSource`])

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde_json::Value;
use url::Url;

use crate::error::{Error, Result};
use crate::transport::WindowMessage;

use super::message::Source;

// ============================================================================
// Constants
// ============================================================================

/// Source tags used by common devtools bridges sharing the window channel.
pub const DEFAULT_SOURCE_DENYLIST: &[&str] = &[
    "react-devtools",
    "vue-devtools",
    "angular-devtools",
    "__REDUX_DEVTOOLS",
    "devtools-detector",
];

// ============================================================================
// Rejection
// ============================================================================

/// Why a message was filtered out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// Sent from a different (or opaque) origin.
    ForeignOrigin {
        /// Origin the message claimed.
        origin: String,
    },
    /// No string `source` tag.
    MissingSource,
    /// `source` matched a denylist entry.
    DeniedSource {
        /// The offending source tag.
        source: String,
    },
    /// Well-formed, but written by the other side.
    UnexpectedSource {
        /// The source tag found.
        source: String,
    },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ForeignOrigin { origin } => write!(f, "foreign origin {origin}"),
            Self::MissingSource => f.write_str("missing source"),
            Self::DeniedSource { source } => write!(f, "denied source {source}"),
            Self::UnexpectedSource { source } => write!(f, "unexpected source {source}"),
        }
    }
}

// ============================================================================
// OriginFilter
// ============================================================================

/// Decides whether a window message is addressed to this side of the bridge.
#[derive(Debug, Clone)]
pub struct OriginFilter {
    /// Serialized page origin (`scheme://host[:port]`).
    origin: String,
    /// Source tag this side accepts.
    accept: Source,
    /// Case-sensitive substrings that disqualify a source tag.
    denylist: Vec<String>,
}

impl OriginFilter {
    /// Creates a filter accepting messages from `accept` on `page_origin`,
    /// with the default denylist.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOrigin`] if `page_origin` is not a tuple origin.
    pub fn new(page_origin: &str, accept: Source) -> Result<Self> {
        let origin = normalize_origin(page_origin)
            .ok_or_else(|| Error::invalid_origin(page_origin))?;

        Ok(Self {
            origin,
            accept,
            denylist: DEFAULT_SOURCE_DENYLIST
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
        })
    }

    /// Filter used by the content relay (accepts page messages).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOrigin`] if `page_origin` is not a tuple origin.
    #[inline]
    pub fn for_relay(page_origin: &str) -> Result<Self> {
        Self::new(page_origin, Source::Webapp)
    }

    /// Filter used on the page side (accepts extension messages).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOrigin`] if `page_origin` is not a tuple origin.
    #[inline]
    pub fn for_page(page_origin: &str) -> Result<Self> {
        Self::new(page_origin, Source::Extension)
    }

    /// Replaces the denylist.
    #[must_use]
    pub fn with_denylist(mut self, denylist: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.denylist = denylist.into_iter().map(Into::into).collect();
        self
    }

    /// Returns the normalized page origin.
    #[inline]
    #[must_use]
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Returns the source tag this filter accepts.
    #[inline]
    #[must_use]
    pub fn accepts(&self) -> Source {
        self.accept
    }

    /// Checks a message, returning its JSON body if accepted.
    ///
    /// # Errors
    ///
    /// Returns the [`Rejection`] reason. Rejections are routine and are
    /// never reported to either side.
    pub fn check<'a>(&self, message: &'a WindowMessage) -> std::result::Result<&'a Value, Rejection> {
        if !self.same_origin(&message.origin) {
            return Err(Rejection::ForeignOrigin {
                origin: message.origin.clone(),
            });
        }

        let source = message
            .data
            .get("source")
            .and_then(Value::as_str)
            .ok_or(Rejection::MissingSource)?;

        if self.denylist.iter().any(|entry| source.contains(entry.as_str())) {
            return Err(Rejection::DeniedSource {
                source: source.to_string(),
            });
        }

        if source != self.accept.as_str() {
            return Err(Rejection::UnexpectedSource {
                source: source.to_string(),
            });
        }

        Ok(&message.data)
    }

    /// Returns `true` if `origin` serializes to the page origin.
    fn same_origin(&self, origin: &str) -> bool {
        if origin == self.origin {
            return true;
        }
        normalize_origin(origin).is_some_and(|o| o == self.origin)
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Serializes the origin of `input`, `None` for unparsable or opaque origins.
fn normalize_origin(input: &str) -> Option<String> {
    let origin = Url::parse(input).ok()?.origin();
    origin.is_tuple().then(|| origin.ascii_serialization())
}

// ============================================================================
// Tests
// ============================================================================
