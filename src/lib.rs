//! Minimal peer-to-peer overlay node library.

pub mod app;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod net;
pub mod node;
pub mod observability;
pub mod peer;
pub mod protocol;

pub use config::NodeConfig;
pub use error::{NodeError, NodeResult};
pub use lifecycle::Shutdown;
pub use node::Node;
pub use peer::{PeerId, PeerInbox};
