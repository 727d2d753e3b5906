//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (Node::start):
//!     Bind listener → Spawn dispatch loops → Spawn accept loop → Dial peers
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Stop readers and initiators → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger shutdown
//! ```
//!
//! # Design Decisions
//! - The listener is bound before any configured peer is dialed
//! - Shutdown closes every connection and ends every per-slot task

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
