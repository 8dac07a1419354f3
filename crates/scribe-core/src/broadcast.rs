//! Fan-out of document events to attached sessions.
//!
//! Every session owns a bounded channel. Publishing never blocks: a full or
//! closed channel drops the event for that session only, so delivery is
//! best-effort and at-most-once. Callers publish while holding the
//! document's lock, which makes per-document delivery order equal to
//! mutation order.

use crate::event::Event;
use crate::session::{SessionId, SessionTable};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

pub use tokio::sync::mpsc::error::TryRecvError;

pub(crate) type EventSender = mpsc::Sender<Event>;

/// Receiving end of a session's event channel.
///
/// Yields `None` / [`TryRecvError::Disconnected`] once the session has been
/// closed and all buffered events were consumed.
#[derive(Debug)]
pub struct SessionFeed {
    session_id: SessionId,
    receiver: mpsc::Receiver<Event>,
}

impl SessionFeed {
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Wait for the next event
    pub async fn recv(&mut self) -> Option<Event> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Result<Event, TryRecvError> {
        self.receiver.try_recv()
    }

    /// Take every event that is currently buffered
    pub fn drain(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        while let Ok(event) = self.receiver.try_recv() {
            events.push(event);
        }
        events
    }
}

/// Delivery counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastStats {
    pub delivered: u64,
    pub dropped: u64,
}

/// Routes events to the sessions of a document
pub struct BroadcastRouter {
    capacity: usize,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl BroadcastRouter {
    /// Create a router whose session channels buffer up to `capacity` events
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            delivered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Open the channel for a new session
    pub(crate) fn open(&self, session_id: &SessionId) -> (EventSender, SessionFeed) {
        let (sender, receiver) = mpsc::channel(self.capacity);
        let feed = SessionFeed {
            session_id: session_id.clone(),
            receiver,
        };
        (sender, feed)
    }

    /// Deliver `event` to every session in `sessions` except `exclude`.
    ///
    /// Returns the number of sessions that accepted the event.
    pub(crate) fn publish(
        &self,
        sessions: &SessionTable,
        event: &Event,
        exclude: Option<&SessionId>,
    ) -> usize {
        let mut delivered = 0;

        for (session_id, sender) in sessions.senders() {
            if exclude == Some(session_id) {
                continue;
            }
            if self.deliver(session_id, sender, event.clone()) {
                delivered += 1;
            }
        }

        debug!(doc_id = %event.doc_id, event = event.name(), delivered, "Broadcast event");
        delivered
    }

    /// Deliver a single event to one session
    pub(crate) fn send_to(&self, session_id: &SessionId, sender: &EventSender, event: Event) -> bool {
        self.deliver(session_id, sender, event)
    }

    pub fn stats(&self) -> BroadcastStats {
        BroadcastStats {
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }

    fn deliver(&self, session_id: &SessionId, sender: &EventSender, event: Event) -> bool {
        match sender.try_send(event) {
            Ok(()) => {
                self.delivered.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Full(event)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(session = %session_id, event = event.name(), "Session lagging, event dropped");
                false
            }
            Err(TrySendError::Closed(event)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                debug!(session = %session_id, event = event.name(), "Session feed closed, event dropped");
                false
            }
        }
    }
}
