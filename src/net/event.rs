//! Connection lifecycle events and the per-slot event bus.

use tokio::sync::mpsc;

use crate::net::connection::ConnectionId;
use crate::net::slots::SlotId;
use crate::net::RawFrame;

/// Lifecycle event for one slot.
///
/// For a single connection `New` comes first and `Closed` comes last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The slot just became live, holding this connection.
    New(ConnectionId),
    /// One full frame read from the connection, padding included.
    Message(Box<RawFrame>),
    /// The slot's transport is unusable.
    Closed,
}

impl ConnectionEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            ConnectionEvent::New(_) => "new",
            ConnectionEvent::Message(_) => "message",
            ConnectionEvent::Closed => "closed",
        }
    }
}

/// One bounded channel per slot, so events of a slot are never reordered.
#[derive(Debug)]
pub struct EventBus {
    senders: Vec<mpsc::Sender<ConnectionEvent>>,
    receivers: std::sync::Mutex<Option<Vec<mpsc::Receiver<ConnectionEvent>>>>,
}

impl EventBus {
    pub fn new(capacity: usize, buffer: usize) -> Self {
        let (senders, receivers): (Vec<_>, Vec<_>) = (0..capacity)
            .map(|_| mpsc::channel::<ConnectionEvent>(buffer))
            .unzip();
        Self {
            senders,
            receivers: std::sync::Mutex::new(Some(receivers)),
        }
    }

    /// Deliver an event to the slot's consumer, waiting while its channel is full.
    pub async fn emit(&self, slot: SlotId, event: ConnectionEvent) {
        let Some(tx) = self.senders.get(slot.index()) else {
            tracing::warn!(slot = %slot, "Event for slot outside the pool");
            return;
        };

        let kind = event.kind();
        if tx.send(event).await.is_err() {
            tracing::trace!(slot = %slot, kind, "No consumer for slot events");
        }
    }

    /// Hand out the receiving ends. Only the first call gets them.
    pub fn take_receivers(&self) -> Option<Vec<(SlotId, mpsc::Receiver<ConnectionEvent>)>> {
        let receivers = match self.receivers.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }?;

        Some(
            receivers
                .into_iter()
                .enumerate()
                .map(|(i, rx)| (SlotId::new(i), rx))
                .collect(),
        )
    }
}
