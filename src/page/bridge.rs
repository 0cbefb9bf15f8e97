//! Page-context bridge script.
//!
//! The bridge runs in the page's own realm and provides the page's half of
//! the protocol: an availability flag, a ready event, a hook for sync
//! acknowledgments, and passive responders for probes.
//!
//! # Responders
//!
//! | Incoming | Answer |
//! |----------|--------|
//! | `{source:"extension", event:"connectionTest"}` | `{source:"webapp", type:"connectionTestResponse", data:{responsive:true, timestamp}}` |
//! | `{source:"webapp", type:"availabilityCheck"}` | `{source:"extension", type:"availabilityResponse", available:true, timestamp}` |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::protocol::message::{CONNECTION_TEST_EVENT, now_millis};
use crate::protocol::{ExtensionMessage, OriginFilter, PageMessage};
use crate::transport::{WindowChannel, WindowMessage};

// ============================================================================
// Constants
// ============================================================================

/// Name of the page-visible ready event.
pub const EXTENSION_READY_EVENT: &str = "extensionReady";

/// Buffer of the page event stream.
const PAGE_EVENT_CAPACITY: usize = 16;

// ============================================================================
// PageEvent
// ============================================================================

/// Events dispatched to page code by the bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageEvent {
    /// The bridge was injected; the extension is reachable.
    ExtensionReady {
        /// Milliseconds since the Unix epoch.
        timestamp: u64,
    },
}

impl PageEvent {
    /// Event name as page code sees it.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::ExtensionReady { .. } => EXTENSION_READY_EVENT,
        }
    }
}

// ============================================================================
// PageInner
// ============================================================================

/// Page-global state installed by the bridge.
struct PageInner {
    /// Window channel of the page.
    channel: WindowChannel,
    /// Accepts extension-side messages.
    from_extension: OriginFilter,
    /// Accepts page-side messages.
    from_page: OriginFilter,
    /// Global "extension available" flag.
    available: AtomicBool,
    /// Timestamp of the latest ready event.
    ready_at: Mutex<Option<u64>>,
    /// Page event stream.
    events: broadcast::Sender<PageEvent>,
    /// Probe responder task of the current injection.
    responder: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for PageInner {
    fn drop(&mut self) {
        if let Some(handle) = self.responder.get_mut().take() {
            handle.abort();
        }
    }
}

// ============================================================================
// PageBridge
// ============================================================================

/// The page half of the bridge.
///
/// State is scoped to one page load: created with [`PageBridge::new`],
/// installed with [`PageBridge::inject`], torn down when the last handle
/// drops.
#[derive(Clone)]
pub struct PageBridge {
    inner: Arc<PageInner>,
}

impl fmt::Debug for PageBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageBridge")
            .field("origin", &self.inner.channel.origin())
            .field("available", &self.is_available())
            .field("ready_at", &self.ready_timestamp())
            .finish_non_exhaustive()
    }
}

impl PageBridge {
    /// Creates an uninjected bridge for the page owning `channel`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOrigin`] if the channel origin is not a tuple origin.
    pub fn new(channel: WindowChannel) -> Result<Self> {
        let from_extension = OriginFilter::for_page(channel.origin())?;
        let from_page = OriginFilter::for_relay(channel.origin())?;
        let (events, _) = broadcast::channel(PAGE_EVENT_CAPACITY);

        Ok(Self {
            inner: Arc::new(PageInner {
                channel,
                from_extension,
                from_page,
                available: AtomicBool::new(false),
                ready_at: Mutex::new(None),
                events,
                responder: Mutex::new(None),
            }),
        })
    }

    /// Installs the bridge into the page.
    ///
    /// Sets the availability flag, (re)installs the probe responders, and
    /// dispatches [`PageEvent::ExtensionReady`]. Injecting again replaces the
    /// responders instead of adding a second set. Must be called inside a
    /// tokio runtime.
    pub fn inject(&self) {
        let rx = self.inner.channel.subscribe();
        let task = tokio::spawn(run_responder(
            self.inner.channel.clone(),
            self.inner.from_extension.clone(),
            self.inner.from_page.clone(),
            rx,
        ));

        if let Some(previous) = self.inner.responder.lock().replace(task) {
            previous.abort();
            trace!("Replaced previous bridge responder");
        }

        self.inner.available.store(true, Ordering::Release);

        let timestamp = now_millis();
        *self.inner.ready_at.lock() = Some(timestamp);
        let _ = self.inner.events.send(PageEvent::ExtensionReady { timestamp });

        debug!(timestamp, "Page bridge injected");
    }

    /// Hook for page code: acknowledges a sync request with `data`.
    pub fn sync_complete(&self, data: Value) {
        self.inner
            .channel
            .post(PageMessage::SyncComplete { data }.to_value());
    }

    /// Returns the global availability flag.
    #[inline]
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.inner.available.load(Ordering::Acquire)
    }

    /// Returns the timestamp of the latest ready event.
    #[inline]
    #[must_use]
    pub fn ready_timestamp(&self) -> Option<u64> {
        *self.inner.ready_at.lock()
    }

    /// Subscribes to page events dispatched after this call.
    #[inline]
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PageEvent> {
        self.inner.events.subscribe()
    }

    /// Waits until the bridge has been injected.
    ///
    /// Returns immediately if it already was.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`] if no ready event arrives within `wait`.
    pub async fn wait_ready(&self, wait: Duration) -> Result<u64> {
        let mut rx = self.subscribe();

        if let Some(timestamp) = self.ready_timestamp() {
            return Ok(timestamp);
        }

        match timeout(wait, rx.recv()).await {
            Ok(Ok(PageEvent::ExtensionReady { timestamp })) => Ok(timestamp),
            Ok(Err(_)) => self.ready_timestamp().ok_or(Error::ConnectionClosed),
            Err(_) => Err(Error::timeout(
                EXTENSION_READY_EVENT,
                u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
            )),
        }
    }
}

// ============================================================================
// Responder
// ============================================================================

/// Answers probes until the channel closes or the task is replaced.
async fn run_responder(
    channel: WindowChannel,
    from_extension: OriginFilter,
    from_page: OriginFilter,
    mut rx: broadcast::Receiver<WindowMessage>,
) {
    loop {
        match rx.recv().await {
            Ok(message) => respond(&channel, &from_extension, &from_page, &message),

            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Page bridge lagged behind window channel");
            }

            Err(RecvError::Closed) => break,
        }
    }
}

/// Answers one message if it is a probe.
fn respond(
    channel: &WindowChannel,
    from_extension: &OriginFilter,
    from_page: &OriginFilter,
    message: &WindowMessage,
) {
    if let Ok(data) = from_extension.check(message) {
        if let Some(ExtensionMessage::Event { event, .. }) = ExtensionMessage::parse(data)
            && event == CONNECTION_TEST_EVENT
        {
            trace!("Answering connection test");
            let answer = PageMessage::ConnectionTestResponse {
                data: json!({ "responsive": true, "timestamp": now_millis() }),
            };
            channel.post(answer.to_value());
        }
        return;
    }

    if let Ok(data) = from_page.check(message)
        && PageMessage::parse(data) == PageMessage::AvailabilityCheck
    {
        trace!("Answering availability check");
        channel.post(ExtensionMessage::available_now().to_value());
    }
}

// ============================================================================
// Tests
// ============================================================================
