//! Metrics collection and exposition.
//!
//! # Metrics
//! - `overlay_connections_total` (counter): admitted connections by direction
//! - `overlay_connections_rejected_total` (counter): PoolFull rejections
//! - `overlay_active_connections` (gauge): live slots
//! - `overlay_frames_received_total` (counter): decoded frames by kind
//! - `overlay_handshakes_completed_total` (counter): identities registered
//! - `overlay_connected_peers` (gauge): registry size
//!
//! Recording is a no-op until a recorder is installed.

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

use crate::net::Direction;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_connection_opened(direction: Direction) {
    counter!("overlay_connections_total", "direction" => direction.to_string()).increment(1);
    gauge!("overlay_active_connections").increment(1.0);
}

pub fn record_connection_closed() {
    gauge!("overlay_active_connections").decrement(1.0);
}

pub fn record_connection_rejected() {
    counter!("overlay_connections_rejected_total").increment(1);
}

pub fn record_frame(kind: &'static str) {
    counter!("overlay_frames_received_total", "kind" => kind).increment(1);
}

pub fn record_handshake_completed() {
    counter!("overlay_handshakes_completed_total").increment(1);
}

pub fn set_connected_peers(count: usize) {
    gauge!("overlay_connected_peers").set(count as f64);
}
