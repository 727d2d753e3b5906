//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the node.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for an overlay node.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct NodeConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Connection pool sizing and dial behavior.
    pub pool: PoolConfig,

    /// Addresses dialed once at startup.
    pub peers: PeersConfig,

    /// Identity exchange timing.
    pub handshake: HandshakeConfig,

    /// Peer registry bounds.
    pub registry: RegistryConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl NodeConfig {
    /// Override the listener port, keeping the configured host.
    pub fn with_port(mut self, port: u16) -> Self {
        let host = self
            .listener
            .bind_address
            .rsplit_once(':')
            .map(|(host, _)| host.to_string())
            .unwrap_or_else(|| "0.0.0.0".to_string());
        self.listener.bind_address = format!("{}:{}", host, port);
        self
    }

    /// Replace the startup dial list.
    pub fn with_dial(mut self, addresses: Vec<String>) -> Self {
        self.peers.dial = addresses;
        self
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:9001").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:9001".to_string(),
        }
    }
}

/// Connection pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Number of connection slots.
    pub capacity: usize,

    /// Depth of each slot's event channel.
    pub event_buffer: usize,

    /// Outbound connect timeout in seconds.
    pub connect_timeout_secs: u64,
}

impl PoolConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            capacity: 10,
            event_buffer: 64,
            connect_timeout_secs: 5,
        }
    }
}

/// Startup peer list.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct PeersConfig {
    /// Addresses to dial once (e.g., "127.0.0.1:9002").
    pub dial: Vec<String>,
}

/// Handshake configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HandshakeConfig {
    /// Interval between identity probes in milliseconds.
    pub probe_interval_ms: u64,

    /// Give up probing after this many milliseconds (unbounded when absent).
    pub timeout_ms: Option<u64>,

    /// Give up probing after this many probes (unbounded when absent).
    pub max_probes: Option<u32>,
}

impl HandshakeConfig {
    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            probe_interval_ms: 1000,
            timeout_ms: None,
            max_probes: None,
        }
    }
}

/// Peer registry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Maximum number of distinct peer identities ever given an inbox.
    pub max_peers: usize,

    /// Bounded queue depth of each peer's inbox.
    pub inbox_capacity: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_peers: 1024,
            inbox_capacity: 64,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_ten_slots_and_one_second_probes() {
        let config = NodeConfig::default();
        assert_eq!(config.pool.capacity, 10);
        assert_eq!(config.handshake.probe_interval(), Duration::from_secs(1));
        assert!(config.handshake.timeout().is_none());
        assert!(config.peers.dial.is_empty());
    }

    #[test]
    fn with_port_keeps_host() {
        let mut config = NodeConfig::default();
        config.listener.bind_address = "127.0.0.1:1".to_string();
        let config = config.with_port(9005);
        assert_eq!(config.listener.bind_address, "127.0.0.1:9005");
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: NodeConfig = toml::from_str(
            r#"
            [pool]
            capacity = 3

            [handshake]
            probe_interval_ms = 250
            max_probes = 8
            "#,
        )
        .unwrap();

        assert_eq!(config.pool.capacity, 3);
        assert_eq!(config.pool.event_buffer, 64);
        assert_eq!(config.handshake.probe_interval_ms, 250);
        assert_eq!(config.handshake.max_probes, Some(8));
        assert_eq!(config.registry.inbox_capacity, 64);
    }
}
