//! Pool capacity as seen from raw TCP clients.

use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;

use overlay_node::net::FRAME_SIZE;
use overlay_node::protocol::Frame;

mod common;

use common::{start_node, test_config, wait_until, SETTLE};

#[tokio::test]
async fn full_node_closes_extra_connections() {
    let mut config = test_config();
    config.pool.capacity = 1;
    let (node, addr) = start_node(config).await;
    let pool = node.pool();

    let mut first = TcpStream::connect(addr).await.unwrap();
    assert!(wait_until(|| async move { pool.live_count().await == 1 }).await);

    let mut rejected = TcpStream::connect(addr).await.unwrap();
    let mut buf = [0u8; 1];
    let n = tokio::time::timeout(SETTLE, rejected.read(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(n, 0, "rejected connection should be closed");

    // The first connection still receives identity probes.
    let mut frame = [0u8; FRAME_SIZE];
    tokio::time::timeout(SETTLE, first.read_exact(&mut frame))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(Frame::decode(&frame).unwrap(), Frame::Identify(node.id()));
    assert_eq!(node.pool().live_count().await, 1);

    node.shutdown();
}

#[tokio::test]
async fn slot_is_reusable_after_disconnect() {
    let mut config = test_config();
    config.pool.capacity = 1;
    let (node, addr) = start_node(config).await;
    let pool = node.pool();

    let first = TcpStream::connect(addr).await.unwrap();
    assert!(wait_until(|| async move { pool.live_count().await == 1 }).await);
    drop(first);
    assert!(wait_until(|| async move { pool.live_count().await == 0 }).await);

    // Give the dispatch loop a moment to release the slot.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut second = TcpStream::connect(addr).await.unwrap();
    let mut frame = [0u8; FRAME_SIZE];
    tokio::time::timeout(SETTLE, second.read_exact(&mut frame))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(Frame::decode(&frame).unwrap(), Frame::Identify(node.id()));

    node.shutdown();
}

#[tokio::test]
async fn shutdown_closes_live_connections() {
    let (node, addr) = start_node(test_config()).await;
    let pool = node.pool();
    let mut client = TcpStream::connect(addr).await.unwrap();
    assert!(wait_until(|| async move { pool.live_count().await == 1 }).await);

    node.shutdown();

    // Drain any probes written before shutdown; then EOF.
    let mut frame = [0u8; FRAME_SIZE];
    let closed = tokio::time::timeout(SETTLE, async {
        loop {
            match client.read(&mut frame).await {
                Ok(0) | Err(_) => break,
                Ok(_) => continue,
            }
        }
    })
    .await;
    assert!(closed.is_ok());
}
