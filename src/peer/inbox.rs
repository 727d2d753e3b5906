//! Per-peer inbound message queue.

use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

use crate::peer::PeerId;

/// Sending side, held by the registry and used by the slot's dispatch loop.
pub type InboxSender = mpsc::Sender<Vec<u8>>;

/// Receiving side of a peer's bounded FIFO queue.
///
/// Clones share one queue, so every payload is delivered to exactly one
/// reader, in the order the frames arrived.
#[derive(Debug, Clone)]
pub struct PeerInbox {
    peer: PeerId,
    rx: Arc<Mutex<mpsc::Receiver<Vec<u8>>>>,
}

impl PeerInbox {
    /// Create a queue holding at most `capacity` undelivered payloads.
    pub fn channel(peer: PeerId, capacity: usize) -> (InboxSender, PeerInbox) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            tx,
            PeerInbox {
                peer,
                rx: Arc::new(Mutex::new(rx)),
            },
        )
    }

    /// The peer whose payloads arrive here.
    pub fn peer(&self) -> PeerId {
        self.peer
    }

    /// Wait for the next payload.
    pub async fn recv(&self) -> Option<Vec<u8>> {
        self.rx.lock().await.recv().await
    }

    /// Take the next payload if one is queued.
    pub async fn try_recv(&self) -> Option<Vec<u8>> {
        self.rx.lock().await.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn delivers_in_order() {
        let (tx, inbox) = PeerInbox::channel(PeerId::random(), 4);
        for payload in [b"A", b"B", b"C"] {
            tx.send(payload.to_vec()).await.unwrap();
        }

        let clone = inbox.clone();
        assert_eq!(inbox.recv().await.unwrap(), b"A");
        assert_eq!(clone.recv().await.unwrap(), b"B");
        assert_eq!(inbox.recv().await.unwrap(), b"C");
        assert!(inbox.try_recv().await.is_none());
    }

    #[tokio::test]
    async fn full_queue_applies_backpressure() {
        let (tx, inbox) = PeerInbox::channel(PeerId::random(), 1);
        tx.send(b"first".to_vec()).await.unwrap();

        let blocked = tokio::time::timeout(Duration::from_millis(50), tx.send(b"second".to_vec())).await;
        assert!(blocked.is_err(), "send should wait while the queue is full");

        assert_eq!(inbox.recv().await.unwrap(), b"first");
        tx.send(b"second".to_vec()).await.unwrap();
        assert_eq!(inbox.recv().await.unwrap(), b"second");
    }
}
