//! Demo application driving a node.
//!
//! Greets a random connected peer on every tick and logs whatever each
//! peer sends back.

use rand::seq::SliceRandom;
use std::time::Duration;
use tokio::sync::broadcast;

use crate::node::Node;
use crate::peer::{PeerId, PeerInbox};

pub struct App {
    node: Node,
    greeting: Vec<u8>,
    interval: Duration,
}

impl App {
    pub fn new(node: Node, greeting: impl Into<Vec<u8>>, interval: Duration) -> Self {
        Self {
            node,
            greeting: greeting.into(),
            interval,
        }
    }

    /// Run until shutdown.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        match self.node.new_peer_notifications() {
            Some(new_peers) => {
                tokio::spawn(watch_new_peers(self.node.clone(), new_peers));
            }
            None => tracing::warn!("New-peer stream already taken, incoming messages will not be logged"),
        }

        let mut ticker = tokio::time::interval(self.interval);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.greet_random_peer().await;
                }
                _ = shutdown.recv() => break,
            }
        }
    }

    /// Send the greeting to one connected peer chosen at random.
    pub async fn greet_random_peer(&self) -> Option<PeerId> {
        let peers = self.node.connected_peers().await;
        let peer = peers.choose(&mut rand::thread_rng()).copied()?;

        if let Err(e) = self.node.send_to(peer, &self.greeting).await {
            tracing::debug!(peer = %peer, error = %e, "Greeting not sent");
            return None;
        }
        Some(peer)
    }
}

async fn watch_new_peers(node: Node, mut new_peers: tokio::sync::mpsc::UnboundedReceiver<PeerId>) {
    while let Some(peer) = new_peers.recv().await {
        match node.inbound_channel(peer).await {
            Ok(inbox) => {
                tokio::spawn(log_messages(inbox));
            }
            Err(e) => tracing::warn!(peer = %peer, error = %e, "No inbox for new peer"),
        }
    }
}

async fn log_messages(inbox: PeerInbox) {
    while let Some(payload) = inbox.recv().await {
        tracing::info!(peer = %inbox.peer(), "{}", String::from_utf8_lossy(&payload));
    }
}
