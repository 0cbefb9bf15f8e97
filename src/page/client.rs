//! Page-side request client.
//!
//! [`PageClient`] is how page code talks to the extension: it posts
//! requests with fresh request IDs, matches replies by ID, probes
//! availability, and exposes relay notifications as a stream.
//!
//! # Example
//!
//! ```ignore
//! let client = PageClient::new(channel)?;
//!
//! if client.check_availability(Duration::from_millis(500)).await {
//!     let bookmarks = client.request(json!({ "action": "getBookmarks" })).await?;
//! }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::RequestId;
use crate::protocol::{ExtensionMessage, OriginFilter, PageMessage};
use crate::transport::{WindowChannel, WindowMessage};

// ============================================================================
// Constants
// ============================================================================

/// Default time to wait for a reply to a request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum outstanding requests before rejecting new ones.
const MAX_PENDING_REQUESTS: usize = 100;

/// Buffer of the notification stream.
const EVENT_CAPACITY: usize = 64;

// ============================================================================
// Types
// ============================================================================

/// Map of request IDs to reply channels.
type CorrelationMap = FxHashMap<RequestId, oneshot::Sender<Value>>;

/// Waiters for the next availability answer, by probe sequence number.
type ProbeWaiters = FxHashMap<u64, oneshot::Sender<u64>>;

// ============================================================================
// ExtensionEvent
// ============================================================================

/// Notification posted by the relay.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtensionEvent {
    /// Event name.
    pub event: String,
    /// Event data.
    pub data: Value,
}

// ============================================================================
// ClientInner
// ============================================================================

/// Shared state of a client.
struct ClientInner {
    /// Window channel of the page.
    channel: WindowChannel,
    /// Outstanding requests (shared with listener).
    correlation: Arc<Mutex<CorrelationMap>>,
    /// Outstanding availability probes (shared with listener).
    probes: Arc<Mutex<ProbeWaiters>>,
    /// Next availability probe sequence number.
    next_probe: AtomicU64,
    /// Notification stream (shared with listener).
    events: broadcast::Sender<ExtensionEvent>,
    /// Listener task.
    listener: JoinHandle<()>,
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

// ============================================================================
// PageClient
// ============================================================================

/// Page-side client of the content relay.
///
/// Cloning yields another handle to the same client.
#[derive(Clone)]
pub struct PageClient {
    inner: Arc<ClientInner>,
}

impl fmt::Debug for PageClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageClient")
            .field("origin", &self.inner.channel.origin())
            .field("pending", &self.pending_count())
            .finish_non_exhaustive()
    }
}

impl PageClient {
    /// Creates a client for the page owning `channel`.
    ///
    /// Spawns the listener task; must be called inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOrigin`] if the channel origin is not a tuple origin.
    pub fn new(channel: WindowChannel) -> Result<Self> {
        let filter = OriginFilter::for_page(channel.origin())?;
        let correlation = Arc::new(Mutex::new(CorrelationMap::default()));
        let probes = Arc::new(Mutex::new(ProbeWaiters::default()));
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let listener = tokio::spawn(run_listener(
            channel.subscribe(),
            filter,
            Arc::clone(&correlation),
            Arc::clone(&probes),
            events.clone(),
        ));

        Ok(Self {
            inner: Arc::new(ClientInner {
                channel,
                correlation,
                probes,
                next_probe: AtomicU64::new(0),
                events,
                listener,
            }),
        })
    }

    /// Sends a request and waits for its reply with the default timeout (30s).
    ///
    /// # Errors
    ///
    /// - [`Error::RequestTimeout`] if no reply arrives in time
    /// - [`Error::Protocol`] if too many requests are outstanding
    pub async fn request(&self, payload: Value) -> Result<Value> {
        self.request_with_timeout(payload, DEFAULT_REQUEST_TIMEOUT)
            .await
    }

    /// Sends a request and waits for its reply.
    ///
    /// The reply is whatever the relay delivered: the background response,
    /// or `{success:false, error}` if the background was unreachable.
    ///
    /// # Errors
    ///
    /// - [`Error::RequestTimeout`] if no reply arrives within `wait`
    /// - [`Error::Protocol`] if too many requests are outstanding
    /// - [`Error::ConnectionClosed`] if the client listener stopped
    pub async fn request_with_timeout(&self, payload: Value, wait: Duration) -> Result<Value> {
        let request_id = RequestId::generate();
        let (tx, rx) = oneshot::channel();

        {
            let mut correlation = self.inner.correlation.lock();
            if correlation.len() >= MAX_PENDING_REQUESTS {
                warn!(
                    pending = correlation.len(),
                    max = MAX_PENDING_REQUESTS,
                    "Too many pending requests"
                );
                return Err(Error::protocol(format!(
                    "Too many pending requests: {}/{}",
                    correlation.len(),
                    MAX_PENDING_REQUESTS
                )));
            }
            correlation.insert(request_id.clone(), tx);
        }
        let _entry = PendingRequest {
            correlation: &self.inner.correlation,
            request_id: request_id.clone(),
        };

        let message = PageMessage::Request {
            request_id: request_id.clone(),
            payload,
        };
        self.inner.channel.post(message.to_value());
        trace!(%request_id, "Request posted");

        match timeout(wait, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => Err(Error::request_timeout(
                request_id,
                u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
            )),
        }
    }

    /// Asks whether the extension is present.
    ///
    /// Returns `false` if no availability answer arrives within `wait`.
    pub async fn check_availability(&self, wait: Duration) -> bool {
        let id = self.inner.next_probe.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.inner.probes.lock().insert(id, tx);
        let _waiter = PendingProbe {
            probes: &self.inner.probes,
            id,
        };

        self.inner
            .channel
            .post(PageMessage::AvailabilityCheck.to_value());

        match timeout(wait, rx).await {
            Ok(Ok(timestamp)) => {
                debug!(timestamp, "Extension available");
                true
            }
            _ => false,
        }
    }

    /// Subscribes to relay notifications posted after this call.
    #[inline]
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<ExtensionEvent> {
        self.inner.events.subscribe()
    }

    /// Returns the number of requests awaiting a reply.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.correlation.lock().len()
    }
}

// ============================================================================
// Wait Guards
// ============================================================================

/// Removes a request's correlation entry however its wait ends.
struct PendingRequest<'a> {
    correlation: &'a Mutex<CorrelationMap>,
    request_id: RequestId,
}

impl Drop for PendingRequest<'_> {
    fn drop(&mut self) {
        self.correlation.lock().remove(&self.request_id);
    }
}

/// Removes an availability waiter however its wait ends.
struct PendingProbe<'a> {
    probes: &'a Mutex<ProbeWaiters>,
    id: u64,
}

impl Drop for PendingProbe<'_> {
    fn drop(&mut self) {
        self.probes.lock().remove(&self.id);
    }
}

// ============================================================================
// Listener
// ============================================================================

/// Routes extension messages to request waiters, probes, and the event stream.
async fn run_listener(
    mut rx: broadcast::Receiver<WindowMessage>,
    filter: OriginFilter,
    correlation: Arc<Mutex<CorrelationMap>>,
    probes: Arc<Mutex<ProbeWaiters>>,
    events: broadcast::Sender<ExtensionEvent>,
) {
    loop {
        let message = match rx.recv().await {
            Ok(message) => message,
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Page client lagged behind window channel");
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        let Ok(data) = filter.check(&message) else {
            continue;
        };

        match ExtensionMessage::parse(data) {
            Some(ExtensionMessage::Reply {
                request_id,
                response,
            }) => {
                let tx = correlation.lock().remove(&request_id);
                match tx {
                    Some(tx) => {
                        let _ = tx.send(response);
                    }
                    None => trace!(%request_id, "Reply for unknown request"),
                }
            }

            Some(ExtensionMessage::AvailabilityResponse {
                available: true,
                timestamp,
            }) => {
                for (_, tx) in probes.lock().drain() {
                    let _ = tx.send(timestamp);
                }
            }

            Some(ExtensionMessage::Event { event, data }) => {
                let _ = events.send(ExtensionEvent { event, data });
            }

            _ => {}
        }
    }

    debug!("Page client listener terminated");
}

// ============================================================================
// Tests
// ============================================================================
