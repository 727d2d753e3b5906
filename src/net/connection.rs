//! Live connection handles.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing
//! - Own the write half of a connection and serialize writes to it
//! - Read whole frames from the read half

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::Mutex;

use crate::net::{RawFrame, FRAME_SIZE};

/// Source of connection IDs. Relaxed: only uniqueness matters.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
///
/// Slots are reused; connection IDs are not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Whether we accepted or dialed the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Inbound => write!(f, "inbound"),
            Direction::Outbound => write!(f, "outbound"),
        }
    }
}

/// Writable side of a live connection, shared by everything that sends on its slot.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    remote: SocketAddr,
    writer: Mutex<OwnedWriteHalf>,
}

impl Connection {
    pub fn new(remote: SocketAddr, writer: OwnedWriteHalf) -> Self {
        Self {
            id: ConnectionId::new(),
            remote,
            writer: Mutex::new(writer),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn remote(&self) -> SocketAddr {
        self.remote
    }

    /// Write one full frame. Concurrent writers never interleave.
    pub async fn write_frame(&self, frame: &RawFrame) -> std::io::Result<()> {
        let mut writer = self.writer.lock().await;
        writer.write_all(frame).await?;
        writer.flush().await
    }

    /// Shut down the write direction so the remote sees end-of-stream.
    pub async fn close(&self) {
        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.shutdown().await {
            tracing::trace!(connection_id = %self.id, error = %e, "Shutdown of closed socket");
        }
    }
}

/// Read exactly one frame.
pub async fn read_frame(reader: &mut OwnedReadHalf) -> std::io::Result<Box<RawFrame>> {
    let mut frame = Box::new([0u8; FRAME_SIZE]);
    reader.read_exact(&mut frame[..]).await?;
    Ok(frame)
}

/// Zero-pad a payload to a full frame. Callers check the length first.
pub fn pad_frame(payload: &[u8]) -> RawFrame {
    let mut frame = [0u8; FRAME_SIZE];
    let len = payload.len().min(FRAME_SIZE);
    frame[..len].copy_from_slice(&payload[..len]);
    frame
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::{TcpListener, TcpStream};

    #[test]
    fn connection_id_unique() {
        let id1 = ConnectionId::new();
        let id2 = ConnectionId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn pad_frame_zero_fills() {
        let frame = pad_frame(b"ACC");
        assert_eq!(&frame[..3], b"ACC");
        assert!(frame[3..].iter().all(|b| *b == 0));
    }

    #[tokio::test]
    async fn frames_survive_coalescing() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();

        let (_, writer) = client.into_split();
        let conn = Connection::new(addr, writer);
        conn.write_frame(&pad_frame(b"first")).await.unwrap();
        conn.write_frame(&pad_frame(b"second")).await.unwrap();
        conn.close().await;

        let (mut reader, _server_writer) = server.into_split();
        let first = read_frame(&mut reader).await.unwrap();
        let second = read_frame(&mut reader).await.unwrap();
        assert_eq!(&first[..5], b"first");
        assert_eq!(&second[..6], b"second");
        assert!(read_frame(&mut reader).await.is_err());
    }
}
