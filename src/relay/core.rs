//! Content relay state machine.
//!
//! The relay is the only party allowed to cross the realm boundary. One
//! dispatcher task per relay receives every window message, filters it, and
//! routes it by tag:
//!
//! | Page message | Handling |
//! |--------------|----------|
//! | request (`requestId`) | Forwarded to the background, reply posted back |
//! | `availabilityCheck` / `selfTest` | Answered locally, no background call |
//! | `syncComplete` | Satisfies the oldest sync listener |
//! | `connectionTestResponse` | Satisfies the oldest probe listener |
//!
//! Background messages enter through [`ContentRelay::handle_runtime_message`]
//! or the background port.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::{Value, json};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

use crate::identifiers::{ListenerId, RequestId};
use crate::protocol::message::{CONNECTION_TEST_EVENT, SYNC_REQUESTED_EVENT, now_millis};
use crate::protocol::{BackgroundCall, ExtensionMessage, OriginFilter, PageMessage, RuntimeAction};
use crate::transport::{Runtime, RuntimePort, WindowChannel, WindowMessage};

use super::builder::RelayBuilder;
use super::config::{RelayConfig, UnacknowledgedSync};
use super::listener::{ListenerKind, ListenerRegistry};

// ============================================================================
// Types
// ============================================================================

/// Outstanding forwarded requests, by token. Counts duplicates.
type PendingMap = FxHashMap<RequestId, usize>;

// ============================================================================
// ListenerOutcome
// ============================================================================

/// How an ephemeral listener ended.
#[derive(Debug)]
enum ListenerOutcome {
    /// The page acknowledged in time.
    Satisfied(Value),
    /// The deadline elapsed first.
    Expired,
    /// The registry was cleared by shutdown.
    Dropped,
}

// ============================================================================
// RelayCommand
// ============================================================================

/// Internal commands for the dispatcher.
enum RelayCommand {
    /// Stop dispatching.
    Shutdown,
}

// ============================================================================
// RelayInner
// ============================================================================

/// Shared state of a relay.
struct RelayInner {
    /// Window channel of the page.
    channel: WindowChannel,
    /// Background messaging.
    runtime: Arc<dyn Runtime>,
    /// Filter for page messages.
    filter: OriginFilter,
    /// Timing and policy options.
    config: RelayConfig,
    /// Armed ephemeral listeners.
    listeners: Mutex<ListenerRegistry>,
    /// Forwarded requests awaiting a background reply.
    pending: Mutex<PendingMap>,
    /// Name of the connected background port, `None` once disconnected.
    port: Mutex<Option<String>>,
    /// Channel for sending commands to the dispatcher.
    command_tx: mpsc::UnboundedSender<RelayCommand>,
}

// ============================================================================
// ContentRelay
// ============================================================================

/// Relay between a page's window channel and the extension background.
///
/// Created with [`ContentRelay::builder`]. Cloning yields another handle to
/// the same relay.
///
/// # Lifetime
///
/// A relay lives for one page load. The dispatcher keeps running until
/// [`ContentRelay::shutdown`] is called; dropping handles does not stop it.
#[derive(Clone)]
pub struct ContentRelay {
    inner: Arc<RelayInner>,
}

impl fmt::Debug for ContentRelay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentRelay")
            .field("origin", &self.inner.filter.origin())
            .field("port", &*self.inner.port.lock())
            .field("pending", &self.pending_count())
            .field("listeners", &self.active_listeners())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// ContentRelay - Constructor
// ============================================================================

impl ContentRelay {
    /// Returns a builder for configuring a relay.
    #[inline]
    #[must_use]
    pub fn builder() -> RelayBuilder {
        RelayBuilder::new()
    }

    /// Starts a relay on `channel`.
    ///
    /// Subscribes to the channel before returning, opens the background
    /// port, and spawns the dispatcher. Must be called inside a tokio runtime.
    pub(crate) fn start(
        channel: WindowChannel,
        runtime: Arc<dyn Runtime>,
        filter: OriginFilter,
        config: RelayConfig,
    ) -> Self {
        let window_rx = channel.subscribe();
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let relay = Self {
            inner: Arc::new(RelayInner {
                channel,
                runtime,
                filter,
                config,
                listeners: Mutex::new(ListenerRegistry::default()),
                pending: Mutex::new(PendingMap::default()),
                port: Mutex::new(None),
                command_tx,
            }),
        };

        let port = relay.connect_to_background();

        tokio::spawn(relay.clone().run_event_loop(window_rx, command_rx, port));

        debug!(origin = relay.inner.filter.origin(), "Content relay started");
        relay
    }
}

// ============================================================================
// ContentRelay - Public API
// ============================================================================

impl ContentRelay {
    /// Forwards a page request to the background process.
    ///
    /// The page always receives exactly one reply tagged with `request_id`:
    /// the background response, or `{success:false, error}` carrying the
    /// platform error text. The background call itself has no deadline.
    pub fn forward_to_background(&self, request_id: RequestId, payload: Value) {
        self.track(&request_id);

        let relay = self.clone();
        tokio::spawn(async move {
            let reply = match relay.inner.runtime.send_message(payload).await {
                Ok(response) => ExtensionMessage::Reply {
                    request_id: request_id.clone(),
                    response,
                },
                Err(e) => {
                    debug!(%request_id, error = %e, "Background request failed");
                    ExtensionMessage::failure(request_id.clone(), e.reply_text())
                }
            };

            relay.settle(&request_id);
            relay.post(reply);
        });
    }

    /// Posts a background event to the page.
    ///
    /// For `syncRequested`, also arms a sync-completion listener. If the page
    /// acknowledges in time the background receives exactly one
    /// `{action:"syncComplete", data}`; otherwise the configured
    /// [`UnacknowledgedSync`] policy applies.
    pub fn handle_notify_web_app(&self, event: impl Into<String>, data: Value) {
        let event = event.into();

        if event == SYNC_REQUESTED_EVENT {
            self.arm_sync_listener();
        }

        debug!(%event, "Notifying page");
        self.post(ExtensionMessage::Event { event, data });
    }

    /// Probes whether the page answers.
    ///
    /// Resolves `{success:true, responsive:true}` if a
    /// `connectionTestResponse` arrives before the deadline, otherwise
    /// `{success:true, responsive:false}`. Never fails.
    pub async fn handle_connection_test(&self) -> Value {
        let (armed, rx) = self.arm(ListenerKind::ConnectionTest);

        self.post(ExtensionMessage::Event {
            event: CONNECTION_TEST_EVENT.to_string(),
            data: json!({ "timestamp": now_millis() }),
        });

        let deadline = self.inner.config.connection_test_timeout;
        let outcome = self.await_listener(armed, rx, deadline).await;
        let responsive = matches!(outcome, ListenerOutcome::Satisfied(_));

        debug!(responsive, "Connection test finished");
        json!({ "success": true, "responsive": responsive })
    }

    /// Handles a message sent by the background process.
    ///
    /// Returns the reply for the background, or `None` if the message is not
    /// a relay action (the background should look for another receiver).
    pub async fn handle_runtime_message(&self, message: Value) -> Option<Value> {
        match RuntimeAction::parse(&message) {
            Some(RuntimeAction::NotifyWebApp { event, data }) => {
                self.handle_notify_web_app(event, data);
                Some(json!({ "success": true }))
            }
            Some(RuntimeAction::TestConnection) => Some(self.handle_connection_test().await),
            None => {
                trace!("Runtime message not handled by relay");
                None
            }
        }
    }

    /// Returns the number of forwarded requests awaiting a background reply.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.pending.lock().values().sum()
    }

    /// Returns the number of armed ephemeral listeners.
    #[inline]
    #[must_use]
    pub fn active_listeners(&self) -> usize {
        self.inner.listeners.lock().len()
    }

    /// Returns the number of armed sync-completion listeners.
    #[inline]
    #[must_use]
    pub fn pending_syncs(&self) -> usize {
        self.inner
            .listeners
            .lock()
            .count(ListenerKind::SyncCompletion)
    }

    /// Returns `true` while the background port is connected.
    #[inline]
    #[must_use]
    pub fn is_port_connected(&self) -> bool {
        self.inner.port.lock().is_some()
    }

    /// Returns the relay configuration.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &RelayConfig {
        &self.inner.config
    }

    /// Returns the page origin the relay accepts messages from.
    #[inline]
    #[must_use]
    pub fn origin(&self) -> &str {
        self.inner.filter.origin()
    }

    /// Stops the dispatcher.
    ///
    /// Armed listeners are dropped: probes in flight resolve as not
    /// responsive, sync listeners end without the unacknowledged policy
    /// running.
    pub fn shutdown(&self) {
        let _ = self.inner.command_tx.send(RelayCommand::Shutdown);
    }
}

// ============================================================================
// ContentRelay - Internal
// ============================================================================

impl ContentRelay {
    /// Opens the background port. Failure leaves the relay in degraded mode.
    fn connect_to_background(&self) -> Option<RuntimePort> {
        let name = self.inner.config.port_name.as_str();

        match self.inner.runtime.connect(name) {
            Ok(port) => {
                *self.inner.port.lock() = Some(port.name().to_string());
                debug!(port = name, "Connected to background");
                Some(port)
            }
            Err(e) => {
                warn!(port = name, error = %e, "Background port unavailable, running degraded");
                None
            }
        }
    }

    /// Dispatcher loop: window messages, port messages, commands.
    async fn run_event_loop(
        self,
        mut window_rx: broadcast::Receiver<WindowMessage>,
        mut command_rx: mpsc::UnboundedReceiver<RelayCommand>,
        mut port: Option<RuntimePort>,
    ) {
        loop {
            tokio::select! {
                message = window_rx.recv() => {
                    match message {
                        Ok(message) => self.dispatch(&message),

                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "Relay lagged behind window channel");
                        }

                        Err(RecvError::Closed) => {
                            debug!("Window channel closed");
                            break;
                        }
                    }
                }

                message = recv_port(&mut port), if port.is_some() => {
                    match message {
                        Some(message) => {
                            let relay = self.clone();
                            tokio::spawn(async move {
                                relay.handle_runtime_message(message).await;
                            });
                        }

                        None => {
                            port = None;
                            self.inner.port.lock().take();
                            info!("Background port disconnected");
                        }
                    }
                }

                command = command_rx.recv() => {
                    match command {
                        Some(RelayCommand::Shutdown) => {
                            debug!("Shutdown command received");
                            break;
                        }

                        None => {
                            debug!("Command channel closed");
                            break;
                        }
                    }
                }
            }
        }

        let dropped = self.inner.listeners.lock().clear();
        self.inner.port.lock().take();

        debug!(dropped, "Relay event loop terminated");
    }

    /// Routes one window message.
    fn dispatch(&self, message: &WindowMessage) {
        let data = match self.inner.filter.check(message) {
            Ok(data) => data,
            Err(rejection) => {
                trace!(%rejection, "Window message filtered");
                return;
            }
        };

        match PageMessage::parse(data) {
            PageMessage::Request {
                request_id,
                payload,
            } => self.forward_to_background(request_id, payload),

            PageMessage::AvailabilityCheck | PageMessage::SelfTest => {
                trace!("Answering availability probe");
                self.post(ExtensionMessage::available_now());
            }

            PageMessage::SyncComplete { data } => {
                self.acknowledge(ListenerKind::SyncCompletion, data);
            }

            PageMessage::ConnectionTestResponse { data } => {
                self.acknowledge(ListenerKind::ConnectionTest, data);
            }

            PageMessage::Unknown { kind } => {
                trace!(%kind, "Unhandled page message");
            }
        }
    }

    /// Satisfies the oldest listener of `kind`, if any.
    fn acknowledge(&self, kind: ListenerKind, data: Value) {
        if self.inner.listeners.lock().satisfy(kind, data).is_none() {
            trace!(?kind, "Acknowledgment with no armed listener");
        }
    }

    /// Arms a listener of `kind`.
    ///
    /// The returned guard disarms it when dropped, so a waiter that is
    /// cancelled never leaves its entry behind.
    fn arm(&self, kind: ListenerKind) -> (ArmedListener<'_>, oneshot::Receiver<Value>) {
        let (id, rx) = self.inner.listeners.lock().arm(kind);
        let armed = ArmedListener {
            listeners: &self.inner.listeners,
            id,
        };
        (armed, rx)
    }

    /// Arms a sync-completion listener and spawns its waiter.
    fn arm_sync_listener(&self) {
        let (id, rx) = self.inner.listeners.lock().arm(ListenerKind::SyncCompletion);
        let deadline = self.inner.config.sync_timeout;

        let relay = self.clone();
        tokio::spawn(async move {
            let armed = ArmedListener {
                listeners: &relay.inner.listeners,
                id,
            };

            match relay.await_listener(armed, rx, deadline).await {
                ListenerOutcome::Satisfied(data) => relay.report_sync_complete(data).await,
                ListenerOutcome::Expired => relay.report_sync_expired(id, deadline).await,
                ListenerOutcome::Dropped => debug!(%id, "Sync listener dropped by shutdown"),
            }
        });
    }

    /// Waits for a listener's outcome.
    ///
    /// On deadline the listener is disarmed; if the dispatcher removed it
    /// first, its value is already in `rx` and is returned instead.
    async fn await_listener(
        &self,
        armed: ArmedListener<'_>,
        mut rx: oneshot::Receiver<Value>,
        deadline: Duration,
    ) -> ListenerOutcome {
        match timeout(deadline, &mut rx).await {
            Ok(Ok(data)) => ListenerOutcome::Satisfied(data),
            Ok(Err(_)) => ListenerOutcome::Dropped,
            Err(_) => {
                if armed.disarm() {
                    trace!(id = %armed.id, "Listener expired");
                    return ListenerOutcome::Expired;
                }
                match rx.try_recv() {
                    Ok(data) => ListenerOutcome::Satisfied(data),
                    Err(_) => ListenerOutcome::Dropped,
                }
            }
        }
    }

    /// Tells the background the page finished a sync.
    async fn report_sync_complete(&self, data: Value) {
        let message = match (BackgroundCall::SyncComplete { data }).to_value() {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "Failed to encode syncComplete");
                return;
            }
        };

        match self.inner.runtime.send_message(message).await {
            Ok(_) => debug!("Sync completion forwarded"),
            Err(e) => warn!(error = %e, "Failed to forward sync completion"),
        }
    }

    /// Applies the unacknowledged sync policy.
    async fn report_sync_expired(&self, id: ListenerId, deadline: Duration) {
        let timeout_ms = u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX);
        debug!(%id, timeout_ms, "Sync request not acknowledged");

        if self.inner.config.unacknowledged_sync != UnacknowledgedSync::Notify {
            return;
        }

        let message = match (BackgroundCall::SyncTimeout { timeout_ms }).to_value() {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "Failed to encode syncTimeout");
                return;
            }
        };

        if let Err(e) = self.inner.runtime.send_message(message).await {
            warn!(error = %e, "Failed to report sync timeout");
        }
    }

    /// Records an outstanding request.
    fn track(&self, request_id: &RequestId) {
        let mut pending = self.inner.pending.lock();
        let count = pending.entry(request_id.clone()).or_default();
        *count += 1;

        if *count > 1 {
            warn!(%request_id, outstanding = *count, "Duplicate requestId in flight");
        }
    }

    /// Clears one outstanding request.
    fn settle(&self, request_id: &RequestId) {
        let mut pending = self.inner.pending.lock();
        if let Some(count) = pending.get_mut(request_id) {
            *count -= 1;
            if *count == 0 {
                pending.remove(request_id);
            }
        }
    }

    /// Posts a message to the page.
    #[inline]
    fn post(&self, message: ExtensionMessage) {
        self.inner.channel.post(message.to_value());
    }
}

// ============================================================================
// ArmedListener
// ============================================================================

/// Registry entry owned by a waiter; disarmed on drop.
struct ArmedListener<'a> {
    listeners: &'a Mutex<ListenerRegistry>,
    id: ListenerId,
}

impl ArmedListener<'_> {
    /// Removes the entry, returning `false` if it was already gone.
    fn disarm(&self) -> bool {
        self.listeners.lock().disarm(self.id)
    }
}

impl Drop for ArmedListener<'_> {
    fn drop(&mut self) {
        self.disarm();
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Receives from the port, or never resolves without one.
async fn recv_port(port: &mut Option<RuntimePort>) -> Option<Value> {
    match port {
        Some(port) => port.recv().await,
        None => std::future::pending().await,
    }
}

// ============================================================================
// Tests
// ============================================================================
