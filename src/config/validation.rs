//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (capacities > 0, intervals > 0)
//! - Validate addresses (bind, dial list, metrics endpoint)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: NodeConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::NodeConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Check a configuration, collecting every violation.
pub fn validate_config(config: &NodeConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    if config.pool.capacity == 0 {
        errors.push(ValidationError::new("pool.capacity", "must be at least 1"));
    }
    if config.pool.event_buffer == 0 {
        errors.push(ValidationError::new("pool.event_buffer", "must be at least 1"));
    }
    if config.pool.connect_timeout_secs == 0 {
        errors.push(ValidationError::new("pool.connect_timeout_secs", "must be greater than 0"));
    }

    for (i, addr) in config.peers.dial.iter().enumerate() {
        if !is_host_port(addr) {
            errors.push(ValidationError::new(
                format!("peers.dial[{}]", i),
                format!("'{}' is not host:port", addr),
            ));
        }
    }

    if config.handshake.probe_interval_ms == 0 {
        errors.push(ValidationError::new("handshake.probe_interval_ms", "must be greater than 0"));
    }
    if config.handshake.max_probes == Some(0) {
        errors.push(ValidationError::new("handshake.max_probes", "must be at least 1 when set"));
    }

    if config.registry.max_peers == 0 {
        errors.push(ValidationError::new("registry.max_peers", "must be at least 1"));
    }
    if config.registry.inbox_capacity == 0 {
        errors.push(ValidationError::new("registry.inbox_capacity", "must be at least 1"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Dial targets may be hostnames, so only the shape is checked here.
fn is_host_port(addr: &str) -> bool {
    match addr.rsplit_once(':') {
        Some((host, port)) => !host.is_empty() && port.parse::<u16>().is_ok(),
        None => false,
    }
}
