//! Shared helpers for node integration tests.

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use overlay_node::{Node, NodeConfig, PeerId};

/// Upper bound for anything that should happen within a few probe intervals.
pub const SETTLE: Duration = Duration::from_secs(5);

/// Config for a loopback node on an ephemeral port with fast probing.
pub fn test_config() -> NodeConfig {
    let mut config = NodeConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.handshake.probe_interval_ms = 20;
    config
}

/// Start a node and return it with its bound address.
pub async fn start_node(config: NodeConfig) -> (Node, SocketAddr) {
    let node = Node::new(config).unwrap();
    let addr = node.start().await.unwrap();
    (node, addr)
}

/// Poll `check` until it returns true or `SETTLE` elapses.
pub async fn wait_until<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + SETTLE;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

/// Start two nodes, dial B from A, and wait until each sees the other.
#[allow(dead_code)]
pub async fn connected_pair() -> (Node, Node) {
    connected_pair_with(test_config(), test_config()).await
}

/// Like `connected_pair`, with explicit configs for each side.
#[allow(dead_code)]
pub async fn connected_pair_with(a_config: NodeConfig, b_config: NodeConfig) -> (Node, Node) {
    let (a, _) = start_node(a_config).await;
    let (b, b_addr) = start_node(b_config).await;

    a.dial(&b_addr.to_string()).await.unwrap();
    assert!(
        wait_until(|| both_see_each_other(&a, &b)).await,
        "nodes did not identify each other"
    );
    (a, b)
}

#[allow(dead_code)]
async fn both_see_each_other(a: &Node, b: &Node) -> bool {
    a.connected_peers().await.contains(&b.id()) && b.connected_peers().await.contains(&a.id())
}

#[allow(dead_code)]
pub async fn is_connected(node: &Node, peer: PeerId) -> bool {
    node.connected_peers().await.contains(&peer)
}
