//! Bounded connection pool.
//!
//! # Responsibilities
//! - Own every live connection, addressed by slot
//! - Admit accepted and dialed streams into free slots, rejecting when full
//! - Run one reader task per live slot, translating bytes into events
//! - Write zero-padded frames to a slot on request

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, Mutex};

use crate::config::PoolConfig;
use crate::lifecycle::Shutdown;
use crate::net::connection::{pad_frame, read_frame, Connection, ConnectionId, Direction};
use crate::net::event::{ConnectionEvent, EventBus};
use crate::net::slots::{SlotArena, SlotId};
use crate::net::FRAME_SIZE;
use crate::observability::metrics;

/// Errors surfaced by pool operations.
#[derive(Debug, Error)]
pub enum PoolError {
    /// Every slot is occupied.
    #[error("Connection pool full ({capacity} slots)")]
    PoolFull { capacity: usize },

    /// The slot holds no live connection.
    #[error("Connection closed on {slot}")]
    ConnectionClosed { slot: SlotId },

    /// Payload does not fit in one frame.
    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// Outbound connection attempt failed.
    #[error("Failed to connect to {addr}: {source}")]
    Dial {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The node is shutting down and takes no new connections.
    #[error("Connection pool shutting down")]
    ShuttingDown,
}

struct PoolInner {
    slots: Mutex<SlotArena<Arc<Connection>>>,
    bus: EventBus,
    capacity: usize,
    connect_timeout: Duration,
    shutdown: Shutdown,
}

/// Fixed-capacity pool of raw connections.
///
/// Cheap to clone; clones share the same slots.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    pub fn new(config: &PoolConfig, shutdown: Shutdown) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                slots: Mutex::new(SlotArena::new(config.capacity)),
                bus: EventBus::new(config.capacity, config.event_buffer),
                capacity: config.capacity,
                connect_timeout: config.connect_timeout(),
                shutdown,
            }),
        }
    }

    /// Take the per-slot event receivers. Only the first call gets them.
    pub fn take_events(&self) -> Option<Vec<(SlotId, mpsc::Receiver<ConnectionEvent>)>> {
        self.inner.bus.take_receivers()
    }

    /// Place a stream in the lowest free slot and start reading from it.
    ///
    /// When the pool is full the stream is dropped, which closes it, and
    /// existing slots are left untouched.
    pub async fn admit(&self, stream: TcpStream, direction: Direction) -> Result<SlotId, PoolError> {
        // Subscribe before the check so a trigger in between still reaches the reader.
        let shutdown = self.inner.shutdown.subscribe();
        if self.inner.shutdown.is_triggered() {
            return Err(PoolError::ShuttingDown);
        }

        let remote = stream.peer_addr()?;
        if let Err(e) = stream.set_nodelay(true) {
            tracing::warn!(peer_addr = %remote, error = %e, "Failed to set TCP_NODELAY");
        }

        let (reader, writer) = stream.into_split();
        let conn = Arc::new(Connection::new(remote, writer));

        let slot = {
            let mut slots = self.inner.slots.lock().await;
            slots.allocate(Arc::clone(&conn)).map_err(|full| {
                metrics::record_connection_rejected();
                PoolError::PoolFull {
                    capacity: full.capacity,
                }
            })?
        };

        tracing::debug!(
            slot = %slot,
            connection_id = %conn.id(),
            peer_addr = %remote,
            direction = %direction,
            "Connection admitted"
        );
        metrics::record_connection_opened(direction);

        // New must be queued before the reader can queue any Message.
        self.inner.bus.emit(slot, ConnectionEvent::New(conn.id())).await;

        let pool = self.clone();
        tokio::spawn(async move {
            pool.read_loop(slot, conn, reader, shutdown).await;
        });

        Ok(slot)
    }

    /// Make one outbound connection attempt. No retry.
    pub async fn dial(&self, addr: &str) -> Result<SlotId, PoolError> {
        let stream = match tokio::time::timeout(self.inner.connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => {
                return Err(PoolError::Dial {
                    addr: addr.to_string(),
                    source,
                })
            }
            Err(_) => {
                return Err(PoolError::Dial {
                    addr: addr.to_string(),
                    source: std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out"),
                })
            }
        };

        self.admit(stream, Direction::Outbound).await
    }

    /// Write a payload to a slot as one zero-padded frame.
    pub async fn send(&self, slot: SlotId, payload: &[u8]) -> Result<(), PoolError> {
        self.write(slot, None, payload).await
    }

    /// Like `send`, but only if `slot` still holds connection `conn`.
    ///
    /// A slot index is reused once released; the connection id is not.
    pub async fn send_on(&self, slot: SlotId, conn: ConnectionId, payload: &[u8]) -> Result<(), PoolError> {
        self.write(slot, Some(conn), payload).await
    }

    async fn write(&self, slot: SlotId, expected: Option<ConnectionId>, payload: &[u8]) -> Result<(), PoolError> {
        let conn = self
            .inner
            .slots
            .lock()
            .await
            .get(slot)
            .filter(|c| expected.map_or(true, |id| c.id() == id))
            .cloned()
            .ok_or(PoolError::ConnectionClosed { slot })?;

        if payload.len() > FRAME_SIZE {
            return Err(PoolError::MessageTooLarge {
                size: payload.len(),
                max: FRAME_SIZE,
            });
        }

        conn.write_frame(&pad_frame(payload)).await.map_err(|e| {
            tracing::debug!(slot = %slot, connection_id = %conn.id(), error = %e, "Write failed");
            PoolError::ConnectionClosed { slot }
        })
    }

    /// Return a closed slot to the free set.
    ///
    /// Called by the event consumer once it has finished with the slot's
    /// `Closed` event.
    pub async fn release(&self, slot: SlotId) -> bool {
        let released = self.inner.slots.lock().await.release(slot);
        if released {
            tracing::trace!(slot = %slot, "Slot released");
        }
        released
    }

    /// Number of slots with a live connection.
    pub async fn live_count(&self) -> usize {
        self.inner.slots.lock().await.live()
    }

    /// Number of slots not yet back in the free set, live or closing.
    pub async fn occupied_count(&self) -> usize {
        self.inner.slots.lock().await.occupied()
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    async fn read_loop(
        self,
        slot: SlotId,
        conn: Arc<Connection>,
        mut reader: OwnedReadHalf,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                result = read_frame(&mut reader) => match result {
                    Ok(frame) => {
                        self.inner.bus.emit(slot, ConnectionEvent::Message(frame)).await;
                    }
                    Err(e) => {
                        tracing::debug!(
                            slot = %slot,
                            connection_id = %conn.id(),
                            peer_addr = %conn.remote(),
                            error = %e,
                            "Connection read ended"
                        );
                        break;
                    }
                },
                _ = shutdown.recv() => {
                    tracing::debug!(slot = %slot, connection_id = %conn.id(), "Reader stopping for shutdown");
                    break;
                }
            }
        }

        // Sends fail from here on, but the slot is not reusable until released.
        self.inner.slots.lock().await.mark_closing(slot);
        conn.close().await;
        metrics::record_connection_closed();

        self.inner.bus.emit(slot, ConnectionEvent::Closed).await;
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("capacity", &self.inner.capacity)
            .finish()
    }
}
