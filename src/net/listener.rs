//! TCP listener feeding the connection pool.
//!
//! # Responsibilities
//! - Bind to the configured address
//! - Accept incoming TCP connections until shutdown
//! - Hand each stream to the pool, which rejects it when full
//! - Treat accept errors as transient

use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use crate::config::ListenerConfig;
use crate::net::connection::Direction;
use crate::net::pool::{ConnectionPool, PoolError};

/// Pause after a failed accept so a persistent error does not spin.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Error type for listener operations.
#[derive(Debug)]
pub enum ListenerError {
    /// Failed to bind to address.
    Bind(std::io::Error),
    /// Failed to accept connection.
    Accept(std::io::Error),
}

impl std::fmt::Display for ListenerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenerError::Bind(e) => write!(f, "Failed to bind: {}", e),
            ListenerError::Accept(e) => write!(f, "Failed to accept: {}", e),
        }
    }
}

impl std::error::Error for ListenerError {}

/// A bound TCP listener.
pub struct Listener {
    /// The underlying TCP listener.
    inner: TcpListener,
}

impl Listener {
    /// Bind to the configured address.
    pub async fn bind(config: &ListenerConfig) -> Result<Self, ListenerError> {
        let addr: SocketAddr = config
            .bind_address
            .parse()
            .map_err(|e| ListenerError::Bind(std::io::Error::new(std::io::ErrorKind::InvalidInput, e)))?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(ListenerError::Bind)?;

        let local_addr = listener
            .local_addr()
            .map_err(ListenerError::Bind)?;

        tracing::info!(address = %local_addr, "Listener bound");

        Ok(Self { inner: listener })
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.inner.local_addr()
    }

    /// Accept connections into the pool until shutdown.
    pub async fn run(self, pool: ConnectionPool, mut shutdown: broadcast::Receiver<()>) {
        loop {
            let result = tokio::select! {
                result = self.inner.accept() => result.map_err(ListenerError::Accept),
                _ = shutdown.recv() => {
                    tracing::info!("Listener received shutdown signal, exiting loop");
                    break;
                }
            };

            let (stream, peer_addr) = match result {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::warn!(error = %e, "Accept failed");
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    continue;
                }
            };

            match pool.admit(stream, Direction::Inbound).await {
                Ok(slot) => {
                    tracing::debug!(peer_addr = %peer_addr, slot = %slot, "Connection accepted");
                }
                Err(e @ PoolError::PoolFull { .. }) => {
                    tracing::warn!(peer_addr = %peer_addr, error = %e, "Rejecting connection");
                }
                Err(e) => {
                    tracing::warn!(peer_addr = %peer_addr, error = %e, "Failed to admit connection");
                }
            }
        }
    }
}
