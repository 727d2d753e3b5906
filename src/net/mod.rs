//! Network layer subsystem: the connection pool.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection          Outbound dial
//!     → listener.rs (accept loop)      → pool.rs (single attempt)
//!     → pool.rs (admit into lowest free slot, or PoolFull)
//!     → connection.rs (reader task, one frame at a time)
//!     → event.rs (per-slot New | Message | Closed)
//!     → Hand off to the node's dispatch loop for that slot
//!
//! Slot States (slots.rs):
//!     Vacant → Live → Closing → Vacant
//! ```
//!
//! # Design Decisions
//! - Capacity is fixed at construction; overflow is a typed error
//! - A closing slot is not reused until its consumer releases it
//! - Every frame on the wire is exactly `FRAME_SIZE` bytes

pub mod connection;
pub mod event;
pub mod listener;
pub mod pool;
pub mod slots;

pub use connection::{ConnectionId, Direction};
pub use event::ConnectionEvent;
pub use listener::{Listener, ListenerError};
pub use pool::{ConnectionPool, PoolError};
pub use slots::SlotId;

/// Size of every frame on the wire, and the largest payload `send` accepts.
pub const FRAME_SIZE: usize = 256;

/// One frame as read from a connection.
pub type RawFrame = [u8; FRAME_SIZE];
