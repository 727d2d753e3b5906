//! The overlay node: pool, handshake and registry wired together.
//!
//! # Responsibilities
//! - Own the connection pool and the peer registry
//! - Run one dispatch loop per slot, consuming that slot's events in order
//! - Expose the peer-addressed API: send, connected peers, inboxes and
//!   new-peer notifications

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch, RwLock};

use crate::config::loader::ConfigError;
use crate::config::validation::validate_config;
use crate::config::NodeConfig;
use crate::error::{NodeError, NodeResult};
use crate::lifecycle::Shutdown;
use crate::net::{ConnectionEvent, ConnectionId, ConnectionPool, Listener, PoolError, RawFrame, SlotId};
use crate::observability::metrics;
use crate::peer::handshake::{run_initiator, ProbeOutcome, ProbePolicy, SlotSignal};
use crate::peer::inbox::InboxSender;
use crate::peer::{HandshakeState, PeerId, PeerInbox, PeerRegistry, RegistryError};
use crate::protocol::{self, Frame};

struct NodeInner {
    id: PeerId,
    config: NodeConfig,
    pool: ConnectionPool,
    registry: RwLock<PeerRegistry>,
    shutdown: Shutdown,
    new_peers_tx: mpsc::UnboundedSender<PeerId>,
    new_peers_rx: std::sync::Mutex<Option<mpsc::UnboundedReceiver<PeerId>>>,
}

/// A payload resolved to its peer's inbox, waiting to be queued.
struct Delivery {
    peer: PeerId,
    tx: InboxSender,
    payload: Vec<u8>,
}

/// The connection a slot currently holds, as seen by its dispatch loop.
struct OpenSlot {
    conn: ConnectionId,
    initiator: watch::Sender<SlotSignal>,
}

/// Handle to a running node. Clones share the same node.
#[derive(Clone)]
pub struct Node {
    inner: Arc<NodeInner>,
}

impl Node {
    /// Create a node with a fresh random identity.
    ///
    /// Fails with `NodeError::Config` if the configuration does not validate.
    pub fn new(config: NodeConfig) -> NodeResult<Self> {
        Self::with_id(config, PeerId::random())
    }

    pub fn with_id(config: NodeConfig, id: PeerId) -> NodeResult<Self> {
        validate_config(&config).map_err(ConfigError::Validation)?;

        let shutdown = Shutdown::new();
        let pool = ConnectionPool::new(&config.pool, shutdown.clone());
        let registry = PeerRegistry::new(&config.registry);
        let (new_peers_tx, new_peers_rx) = mpsc::unbounded_channel();

        Ok(Self {
            inner: Arc::new(NodeInner {
                id,
                config,
                pool,
                registry: RwLock::new(registry),
                shutdown,
                new_peers_tx,
                new_peers_rx: std::sync::Mutex::new(Some(new_peers_rx)),
            }),
        })
    }

    pub fn id(&self) -> PeerId {
        self.inner.id
    }

    /// Bind the listener, start the dispatch loops, and dial configured peers.
    ///
    /// Returns the bound address. Dial failures are logged and do not fail
    /// startup.
    pub async fn start(&self) -> NodeResult<SocketAddr> {
        let listener = Listener::bind(&self.inner.config.listener).await?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| NodeError::Pool(PoolError::Io(e)))?;

        let events = self.inner.pool.take_events().ok_or(NodeError::AlreadyStarted)?;
        for (slot, rx) in events {
            let inner = Arc::clone(&self.inner);
            let shutdown = self.inner.shutdown.subscribe();
            tokio::spawn(inner.dispatch(slot, rx, shutdown));
        }

        let pool = self.inner.pool.clone();
        let shutdown = self.inner.shutdown.subscribe();
        tokio::spawn(listener.run(pool, shutdown));

        for addr in self.inner.config.peers.dial.clone() {
            let node = self.clone();
            tokio::spawn(async move {
                match node.dial(&addr).await {
                    Ok(slot) => tracing::info!(address = %addr, slot = %slot, "Dialed peer"),
                    Err(e) => tracing::warn!(address = %addr, error = %e, "Failed to dial peer"),
                }
            });
        }

        tracing::info!(
            peer_id = %self.inner.id,
            address = %local_addr,
            capacity = self.inner.pool.capacity(),
            "Node started"
        );
        Ok(local_addr)
    }

    /// Open an outbound connection. The handshake runs in the background.
    pub async fn dial(&self, addr: &str) -> NodeResult<SlotId> {
        Ok(self.inner.pool.dial(addr).await?)
    }

    /// Send an application payload to an identified peer.
    pub async fn send_to(&self, peer: PeerId, payload: &[u8]) -> NodeResult<()> {
        let frame = protocol::encode_message(payload)?;

        let (slot, conn) = self
            .inner
            .registry
            .read()
            .await
            .route(&peer)
            .ok_or(NodeError::PeerNotConnected(peer))?;

        // If the slot was closed and reused since the lookup, the pool refuses the write.
        self.inner.pool.send_on(slot, conn, &frame).await.map_err(|e| match e {
            PoolError::MessageTooLarge { size, max } => NodeError::MessageTooLarge { size, max },
            PoolError::ConnectionClosed { .. } => NodeError::PeerNotConnected(peer),
            other => NodeError::Pool(other),
        })
    }

    /// Snapshot of the identities with a live connection.
    pub async fn connected_peers(&self) -> Vec<PeerId> {
        self.inner.registry.read().await.connected_peers()
    }

    /// The inbox for a peer that has completed a handshake at least once.
    pub async fn inbound_channel(&self, peer: PeerId) -> NodeResult<PeerInbox> {
        self.inner
            .registry
            .read()
            .await
            .inbox(&peer)
            .ok_or(NodeError::UnknownPeer(peer))
    }

    /// Stream of newly identified peers, one item per identity.
    ///
    /// Only the first call gets the stream.
    pub fn new_peer_notifications(&self) -> Option<mpsc::UnboundedReceiver<PeerId>> {
        match self.inner.new_peers_rx.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }

    pub async fn handshake_state(&self, slot: SlotId) -> HandshakeState {
        self.inner.registry.read().await.handshake_state(slot)
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.inner.pool
    }

    pub fn shutdown_handle(&self) -> Shutdown {
        self.inner.shutdown.clone()
    }

    /// Stop accepting, close every connection and end every node task.
    pub fn shutdown(&self) {
        self.inner.shutdown.trigger();
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.inner.id)
            .field("pool", &self.inner.pool)
            .finish()
    }
}

impl NodeInner {
    async fn dispatch(
        self: Arc<Self>,
        slot: SlotId,
        mut events: mpsc::Receiver<ConnectionEvent>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        let mut open: Option<OpenSlot> = None;

        loop {
            if self.shutdown.is_triggered() {
                break;
            }

            let event = tokio::select! {
                event = events.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
                _ = shutdown.recv() => break,
            };
            tracing::trace!(slot = %slot, event = event.kind(), "Slot event");

            match event {
                ConnectionEvent::New(conn) => {
                    self.registry.write().await.open_slot(slot, conn);
                    open = Some(OpenSlot {
                        conn,
                        initiator: self.start_initiator(slot, conn),
                    });
                }
                ConnectionEvent::Message(frame) => {
                    let Some(current) = open.as_ref() else {
                        tracing::warn!(slot = %slot, "Frame on a slot with no open connection");
                        continue;
                    };
                    let Some(delivery) = self.handle_frame(slot, current, &frame).await else {
                        continue;
                    };
                    // Waits while the inbox is full; this slot's later events wait too.
                    tokio::select! {
                        result = delivery.tx.send(delivery.payload) => {
                            if result.is_err() {
                                tracing::warn!(peer = %delivery.peer, slot = %slot, "Inbox closed, message dropped");
                            }
                        }
                        _ = shutdown.recv() => break,
                    }
                }
                ConnectionEvent::Closed => {
                    if let Some(current) = open.take() {
                        let _ = current.initiator.send(SlotSignal::Closed);
                    }
                    self.handle_closed(slot).await;
                    self.pool.release(slot).await;
                }
            }
        }

        tracing::trace!(slot = %slot, "Dispatch loop stopped");
    }

    fn start_initiator(&self, slot: SlotId, conn: ConnectionId) -> watch::Sender<SlotSignal> {
        let (tx, rx) = watch::channel(SlotSignal::Open);
        let policy = ProbePolicy::from(&self.config.handshake);
        let pool = self.pool.clone();
        let probe = protocol::encode_identify(&self.id);

        tokio::spawn(async move {
            let outcome = run_initiator(policy, rx, || {
                let pool = pool.clone();
                let probe = probe.clone();
                async move { pool.send_on(slot, conn, &probe).await.is_ok() }
            })
            .await;

            match outcome {
                ProbeOutcome::Accepted => tracing::debug!(slot = %slot, "Identity acknowledged"),
                ProbeOutcome::Cancelled => tracing::trace!(slot = %slot, "Identity probe cancelled"),
                ProbeOutcome::Exhausted { probes } => {
                    tracing::warn!(slot = %slot, probes, "No acknowledgment, identity probe abandoned")
                }
            }
        });

        tx
    }

    async fn handle_frame(
        &self,
        slot: SlotId,
        current: &OpenSlot,
        raw: &RawFrame,
    ) -> Option<Delivery> {
        let frame = match Frame::decode(raw) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(slot = %slot, error = %e, "Dropping undecodable frame");
                return None;
            }
        };
        metrics::record_frame(frame.kind());

        match frame {
            Frame::Identify(peer) => {
                self.handle_identify(slot, current.conn, peer).await;
                None
            }
            Frame::Accept => {
                self.registry.write().await.set_accepted(slot);
                let _ = current.initiator.send(SlotSignal::Accepted);
                None
            }
            Frame::Message(payload) => match self.registry.read().await.inbox_sender(slot) {
                Ok((peer, tx)) => Some(Delivery { peer, tx, payload }),
                Err(e) => {
                    tracing::warn!(slot = %slot, error = %e, "Dropping message from unidentified slot");
                    None
                }
            },
        }
    }

    async fn handle_identify(&self, slot: SlotId, conn: ConnectionId, peer: PeerId) {
        if peer == self.id {
            tracing::warn!(slot = %slot, "Ignoring own identity, connected to self");
            return;
        }

        let registration = {
            let mut registry = self.registry.write().await;
            let result = registry.register(peer, slot);
            metrics::set_connected_peers(registry.connected_len());
            result
        };

        let registration = match registration {
            Ok(registration) => registration,
            Err(RegistryError::AlreadyRegistered { slot: existing, .. }) if existing == slot => {
                // Same identity on the same slot: not registered again, but ACC
                // is repeated so a remote still probing can stop.
                self.send_accept(slot, conn, peer).await;
                return;
            }
            Err(e) => {
                tracing::warn!(slot = %slot, peer = %peer, error = %e, "Ignoring identity");
                return;
            }
        };

        tracing::info!(peer = %peer, slot = %slot, "Made peer connection");
        metrics::record_handshake_completed();
        self.send_accept(slot, conn, peer).await;

        if registration.first_contact && self.new_peers_tx.send(peer).is_err() {
            tracing::debug!(peer = %peer, "New-peer stream dropped");
        }
    }

    async fn send_accept(&self, slot: SlotId, conn: ConnectionId, peer: PeerId) {
        if let Err(e) = self.pool.send_on(slot, conn, &protocol::encode_accept()).await {
            tracing::debug!(slot = %slot, peer = %peer, error = %e, "Failed to send ACC");
        }
    }

    async fn handle_closed(&self, slot: SlotId) {
        let result = {
            let mut registry = self.registry.write().await;
            let result = registry.unregister_slot(slot);
            metrics::set_connected_peers(registry.connected_len());
            result
        };

        match result {
            Ok(peer) => tracing::info!(peer = %peer, slot = %slot, "Disconnected from peer"),
            Err(e) => tracing::warn!(slot = %slot, error = %e, "Closed slot had no identified peer"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::connection::pad_frame;
    use crate::net::FRAME_SIZE;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    fn test_config() -> NodeConfig {
        let mut config = NodeConfig::default();
        config.listener.bind_address = "127.0.0.1:0".to_string();
        config.handshake.probe_interval_ms = 20;
        config
    }

    async fn read_raw(stream: &mut TcpStream) -> [u8; FRAME_SIZE] {
        let mut frame = [0u8; FRAME_SIZE];
        stream.read_exact(&mut frame).await.unwrap();
        frame
    }

    #[tokio::test]
    async fn raw_client_handshake() {
        let node = Node::new(test_config()).unwrap();
        let addr = node.start().await.unwrap();
        let mut notifications = node.new_peer_notifications().unwrap();
        assert!(node.new_peer_notifications().is_none());

        let mut client = TcpStream::connect(addr).await.unwrap();

        // The node probes first.
        let probe = read_raw(&mut client).await;
        assert_eq!(Frame::decode(&probe).unwrap(), Frame::Identify(node.id()));

        let remote = PeerId::random();
        client
            .write_all(&pad_frame(&protocol::encode_identify(&remote)))
            .await
            .unwrap();

        // Skip further probes until the ACC arrives.
        loop {
            let frame = Frame::decode(&read_raw(&mut client).await).unwrap();
            if frame == Frame::Accept {
                break;
            }
        }
        assert_eq!(notifications.recv().await, Some(remote));
        assert_eq!(node.connected_peers().await, vec![remote]);
        assert_eq!(node.handshake_state(SlotId::new(0)).await, HandshakeState::Pending);

        client.write_all(&pad_frame(b"ACC")).await.unwrap();

        let mut state = node.handshake_state(SlotId::new(0)).await;
        for _ in 0..50 {
            if state.is_established() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            state = node.handshake_state(SlotId::new(0)).await;
        }
        assert_eq!(state, HandshakeState::Established);

        node.shutdown();
    }

    #[tokio::test]
    async fn repeated_identify_on_same_slot_gets_another_accept() {
        let node = Node::new(test_config()).unwrap();
        let addr = node.start().await.unwrap();
        let mut notifications = node.new_peer_notifications().unwrap();
        let mut client = TcpStream::connect(addr).await.unwrap();

        let remote = PeerId::random();
        let identify = pad_frame(&protocol::encode_identify(&remote));
        for _ in 0..2 {
            client.write_all(&identify).await.unwrap();
        }

        let mut accepts = 0;
        while accepts < 2 {
            if Frame::decode(&read_raw(&mut client).await).unwrap() == Frame::Accept {
                accepts += 1;
            }
        }
        assert_eq!(notifications.recv().await, Some(remote));
        assert!(notifications.try_recv().is_err());
        assert_eq!(node.connected_peers().await, vec![remote]);

        node.shutdown();
    }

    #[test]
    fn invalid_config_is_rejected_at_construction() {
        let mut config = test_config();
        config.pool.event_buffer = 0;
        assert!(matches!(Node::new(config), Err(NodeError::Config(_))));

        let mut config = test_config();
        config.handshake.probe_interval_ms = 0;
        assert!(matches!(Node::new(config), Err(NodeError::Config(_))));

        let mut config = test_config();
        config.registry.inbox_capacity = 0;
        let err = Node::with_id(config, PeerId::random()).err().unwrap();
        assert!(err.to_string().contains("registry.inbox_capacity"));
    }

    #[tokio::test]
    async fn shutdown_right_after_start_closes_inbound_connections() {
        let node = Node::new(test_config()).unwrap();
        let addr = node.start().await.unwrap();
        node.shutdown();

        // Either the connect fails or the socket is closed without an ID frame.
        if let Ok(mut client) = TcpStream::connect(addr).await {
            let mut frame = [0u8; FRAME_SIZE];
            let read = tokio::time::timeout(
                std::time::Duration::from_secs(2),
                client.read_exact(&mut frame),
            )
            .await;
            assert!(!matches!(read, Ok(Ok(_))));
        }
        assert_eq!(node.pool().live_count().await, 0);
    }

    #[tokio::test]
    async fn second_start_is_rejected() {
        let node = Node::new(test_config()).unwrap();
        node.start().await.unwrap();
        assert!(matches!(node.start().await, Err(NodeError::AlreadyStarted)));
        node.shutdown();
    }

    #[tokio::test]
    async fn send_checks_size_before_lookup() {
        let node = Node::new(test_config()).unwrap();
        let peer = PeerId::random();

        assert!(matches!(
            node.send_to(peer, &[0u8; 253]).await,
            Err(NodeError::MessageTooLarge { size: 253, max: 252 })
        ));
        assert!(matches!(
            node.send_to(peer, b"hi").await,
            Err(NodeError::PeerNotConnected(p)) if p == peer
        ));
        assert!(matches!(
            node.inbound_channel(peer).await,
            Err(NodeError::UnknownPeer(_))
        ));
    }
}
