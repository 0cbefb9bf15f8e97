//! Ephemeral listener registry.
//!
//! An ephemeral listener waits for one page acknowledgment of a given kind
//! until a deadline. Listeners live in a single registry owned by the relay;
//! the dispatcher satisfies them, deadlines disarm them. Whichever side
//! removes the entry first owns the outcome, so each listener is removed
//! exactly once.
//!
//! Overlapping listeners of the same kind are satisfied oldest first.

// ============================================================================
// Imports
// ============================================================================

use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::trace;

use crate::identifiers::ListenerId;

// ============================================================================
// ListenerKind
// ============================================================================

/// What a listener is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenerKind {
    /// `syncComplete` from the page.
    SyncCompletion,
    /// `connectionTestResponse` from the page.
    ConnectionTest,
}

// ============================================================================
// EphemeralListener
// ============================================================================

/// One armed listener.
#[derive(Debug)]
struct EphemeralListener {
    id: ListenerId,
    kind: ListenerKind,
    armed_at: Instant,
    tx: oneshot::Sender<Value>,
}

// ============================================================================
// ListenerRegistry
// ============================================================================

/// Armed listeners in arming order.
#[derive(Debug, Default)]
pub(crate) struct ListenerRegistry {
    next_id: u64,
    listeners: Vec<EphemeralListener>,
}

impl ListenerRegistry {
    /// Arms a listener and returns the receiver its outcome arrives on.
    pub(crate) fn arm(&mut self, kind: ListenerKind) -> (ListenerId, oneshot::Receiver<Value>) {
        self.next_id += 1;
        let id = ListenerId::new(self.next_id);
        let (tx, rx) = oneshot::channel();

        self.listeners.push(EphemeralListener {
            id,
            kind,
            armed_at: Instant::now(),
            tx,
        });

        (id, rx)
    }

    /// Hands `data` to the oldest listener of `kind` and removes it.
    ///
    /// Must be called with the registry locked, so that a deadline racing
    /// with this call finds the value already in its receiver.
    pub(crate) fn satisfy(&mut self, kind: ListenerKind, data: Value) -> Option<ListenerId> {
        let mut data = data;

        while let Some(index) = self.listeners.iter().position(|l| l.kind == kind) {
            let listener = self.listeners.remove(index);
            let elapsed_ms = u64::try_from(listener.armed_at.elapsed().as_millis()).unwrap_or(u64::MAX);

            match listener.tx.send(data) {
                Ok(()) => {
                    trace!(id = %listener.id, ?kind, elapsed_ms, "Listener satisfied");
                    return Some(listener.id);
                }
                // Waiter is gone; try the next one.
                Err(returned) => data = returned,
            }
        }

        None
    }

    /// Removes a listener whose deadline elapsed.
    ///
    /// Returns `false` if it was already satisfied.
    pub(crate) fn disarm(&mut self, id: ListenerId) -> bool {
        match self.listeners.iter().position(|l| l.id == id) {
            Some(index) => {
                self.listeners.remove(index);
                true
            }
            None => false,
        }
    }

    /// Drops every listener; waiters observe a closed channel.
    pub(crate) fn clear(&mut self) -> usize {
        let count = self.listeners.len();
        self.listeners.clear();
        count
    }

    /// Number of armed listeners.
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.listeners.len()
    }

    /// Number of armed listeners of `kind`.
    #[inline]
    pub(crate) fn count(&self, kind: ListenerKind) -> usize {
        self.listeners.iter().filter(|l| l.kind == kind).count()
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
    fn test_satisfy_removes_listener() {
        let mut registry = ListenerRegistry::default();
        let (id, mut rx) = registry.arm(ListenerKind::SyncCompletion);

        assert_eq!(
            registry.satisfy(ListenerKind::SyncCompletion, json!({ "count": 5 })),
            Some(id)
        );
        assert_eq!(rx.try_recv().expect("value"), json!({ "count": 5 }));
        assert_eq!(registry.len(), 0);

        // A second acknowledgment finds nobody.
        assert_eq!(registry.satisfy(ListenerKind::SyncCompletion, json!({})), None);
    }

    #[test]
    fn test_kinds_do_not_cross() {
        let mut registry = ListenerRegistry::default();
        let (_sync, _rx1) = registry.arm(ListenerKind::SyncCompletion);

        assert_eq!(registry.satisfy(ListenerKind::ConnectionTest, json!({})), None);
        assert_eq!(registry.count(ListenerKind::SyncCompletion), 1);
    }

    #[test]
    fn test_oldest_first() {
        let mut registry = ListenerRegistry::default();
        let (first, _rx1) = registry.arm(ListenerKind::ConnectionTest);
        let (second, _rx2) = registry.arm(ListenerKind::ConnectionTest);

        assert_eq!(registry.satisfy(ListenerKind::ConnectionTest, json!(1)), Some(first));
        assert_eq!(registry.satisfy(ListenerKind::ConnectionTest, json!(2)), Some(second));
    }

    #[test]
    fn test_disarm_exactly_once() {
        let mut registry = ListenerRegistry::default();
        let (id, _rx) = registry.arm(ListenerKind::SyncCompletion);

        assert!(registry.disarm(id));
        assert!(!registry.disarm(id));
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_disarm_after_satisfy_leaves_value() {
        let mut registry = ListenerRegistry::default();
        let (id, mut rx) = registry.arm(ListenerKind::ConnectionTest);

        registry.satisfy(ListenerKind::ConnectionTest, json!("late"));
        assert!(!registry.disarm(id));
        assert_eq!(rx.try_recv().expect("value"), json!("late"));
    }

    #[test]
    fn test_dead_waiter_is_skipped() {
        let mut registry = ListenerRegistry::default();
        let (_dead, rx_dead) = registry.arm(ListenerKind::SyncCompletion);
        let (live, mut rx_live) = registry.arm(ListenerKind::SyncCompletion);
        drop(rx_dead);

        assert_eq!(registry.satisfy(ListenerKind::SyncCompletion, json!(9)), Some(live));
        assert_eq!(rx_live.try_recv().expect("value"), json!(9));
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_clear() {
        let mut registry = ListenerRegistry::default();
        let (_a, mut rx) = registry.arm(ListenerKind::ConnectionTest);
        let (_b, _rx2) = registry.arm(ListenerKind::SyncCompletion);

        assert_eq!(registry.clear(), 2);
        assert!(rx.try_recv().is_err());
    }
}
