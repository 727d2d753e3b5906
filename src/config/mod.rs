//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML) + command line overrides
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → NodeConfig (validated, immutable)
//!     → handed to Node::new, split per subsystem
//! ```
//!
//! # Design Decisions
//! - Config is immutable once the node starts; pool capacity cannot change
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use schema::NodeConfig;
pub use schema::ListenerConfig;
pub use schema::PoolConfig;
pub use schema::PeersConfig;
pub use schema::HandshakeConfig;
pub use schema::RegistryConfig;
pub use schema::ObservabilityConfig;
