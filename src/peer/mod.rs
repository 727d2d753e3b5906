//! Peer identities, handshake, and the identity ↔ slot registry.
//!
//! # Data Flow
//! ```text
//! slot event ──► dispatch loop
//!                  ├─ New     ──► handshake initiator (ID:<self> every interval)
//!                  ├─ ID:<p>  ──► registry.register(p, slot) ──► ACC ──► notify
//!                  ├─ ACC     ──► registry.set_accepted(slot) ──► stop initiator
//!                  ├─ MSG:<m> ──► inbox[p] (bounded, FIFO)
//!                  └─ Closed  ──► registry.unregister_slot(slot) ──► pool.release
//! ```

pub mod handshake;
pub mod identity;
pub mod inbox;
pub mod registry;

pub use handshake::HandshakeState;
pub use identity::PeerId;
pub use inbox::PeerInbox;
pub use registry::{PeerRegistry, RegistryError};
