//! Errors returned by the node's public API.

use thiserror::Error;

use crate::config::loader::ConfigError;
use crate::net::{ListenerError, PoolError};
use crate::peer::PeerId;
use crate::protocol::ProtocolError;

#[derive(Debug, Error)]
pub enum NodeError {
    /// Payload does not fit in one `MSG:` frame.
    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// No live, identified connection to the peer.
    #[error("Peer not connected: {0}")]
    PeerNotConnected(PeerId),

    /// The peer has never completed a handshake with this node.
    #[error("Unknown peer: {0}")]
    UnknownPeer(PeerId),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Node already started")]
    AlreadyStarted,

    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Protocol(ProtocolError),
}

impl From<ProtocolError> for NodeError {
    fn from(e: ProtocolError) -> Self {
        match e {
            ProtocolError::PayloadTooLarge { size, max } => NodeError::MessageTooLarge { size, max },
            other => NodeError::Protocol(other),
        }
    }
}

pub type NodeResult<T> = Result<T, NodeError>;
