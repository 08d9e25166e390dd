use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::oneshot;
use tracing::trace;

use super::envelope::Envelope;

/// Correlates outbound requests to their eventual response frames.
///
/// Message ids come from a counter that is monotonic for the lifetime of the
/// owning session object; reconnection does not reset it. Each registered id
/// maps to a [`oneshot::Sender`], which is the single-resolution slot: it can
/// deliver at most one envelope, and dropping it fails the waiting side.
#[derive(Debug, Default)]
pub(crate) struct PendingTable {
    next_id: AtomicU64,
    slots: DashMap<String, oneshot::Sender<Envelope>>,
}

impl PendingTable {
    /// Allocate the next message id without registering a slot.
    pub(crate) fn next_id(&self) -> String {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        id.to_string()
    }

    /// Allocate a message id and register a resolution slot for it.
    pub(crate) fn register(&self) -> (String, oneshot::Receiver<Envelope>) {
        let id = self.next_id();
        let (tx, rx) = oneshot::channel();
        self.slots.insert(id.clone(), tx);
        (id, rx)
    }

    /// Try to resolve a pending request with this envelope.
    ///
    /// Returns `None` when the envelope was claimed by a waiting request;
    /// returns the envelope back when it carries no id or no slot matches,
    /// so the caller can go on to classify it as an event.
    pub(crate) fn resolve(&self, envelope: Envelope) -> Option<Envelope> {
        let Some(id) = envelope.id.clone() else {
            return Some(envelope);
        };
        let Some((_, slot)) = self.slots.remove(&id) else {
            return Some(envelope);
        };

        if slot.send(envelope).is_err() {
            // The requester timed out between slot removal and delivery.
            trace!(%id, "dropping response for abandoned request");
        }
        None
    }

    /// Remove a slot without resolving it (caller-side timeout).
    pub(crate) fn cancel(&self, id: &str) {
        self.slots.remove(id);
    }

    /// Drop every outstanding slot, failing all waiting requests.
    pub(crate) fn fail_all(&self) {
        self.slots.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }
}
