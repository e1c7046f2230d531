//! Multi-node fixtures over one in-process broker.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use crosslink::{CrosslinkConfig, EntityId, InMemorySessions, LocalEntity, Node, NodeBuilder};
use crosslink_transport::MemoryBroker;

pub const STAFF: &str = "crosslink.staffchat.use";
pub const ACTIVITY: &str = "crosslink.staffchat.activity";
pub const SPY: &str = "crosslink.socialspy";

/// Channels every started node subscribes with the default config.
pub const CHANNELS: [&str; 7] = [
    "crosslink:staffchat",
    "crosslink:activity",
    "crosslink:pm:message",
    "crosslink:pm:lookup",
    "crosslink:pm:lookup-response",
    "crosslink:pm:socialspy",
    "crosslink:pm:reply",
];

pub struct TestNode {
    pub node: Node<MemoryBroker>,
    pub sessions: Arc<InMemorySessions>,
}

impl TestNode {
    pub fn join(&self, name: &str, capabilities: &[&str]) -> LocalEntity {
        let entity = LocalEntity::new(EntityId::random(), name, self.node.node_id().as_str());
        self.sessions.connect(entity.clone(), capabilities);
        entity
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

pub fn config(node_id: &str) -> CrosslinkConfig {
    let mut config = CrosslinkConfig::for_node(node_id);
    config.private_messages.lookup_timeout_ms = 300;
    config
}

/// Build a node without starting it.
pub fn build(broker: &MemoryBroker, config: CrosslinkConfig) -> TestNode {
    let sessions = Arc::new(InMemorySessions::new());
    let node = NodeBuilder::new(config, sessions.clone())
        .build(broker.clone())
        .expect("valid config");
    TestNode { node, sessions }
}

/// Build and start a node, waiting until all of its subscriptions are live.
pub async fn start(broker: &MemoryBroker, node_id: &str, peers_already_up: usize) -> TestNode {
    start_with(broker, config(node_id), peers_already_up).await
}

/// [`start`] with a custom config. Channel names must be the defaults.
pub async fn start_with(
    broker: &MemoryBroker,
    config: CrosslinkConfig,
    peers_already_up: usize,
) -> TestNode {
    init_tracing();
    let node_id = config.node_id.clone();
    let node = build(broker, config);
    assert!(node.node.start().await, "node {node_id} failed to start");
    for channel in CHANNELS {
        wait_for_subscribers(broker, channel, peers_already_up + 1).await;
    }
    node
}

pub async fn wait_for_subscribers(broker: &MemoryBroker, channel: &str, count: usize) {
    for _ in 0..1000 {
        if broker.subscriber_count(channel) == count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!(
        "channel {} never reached {} subscribers (has {})",
        channel,
        count,
        broker.subscriber_count(channel)
    );
}

/// Poll `condition` for up to two seconds.
pub async fn eventually(what: &str, mut condition: impl FnMut() -> bool) {
    for _ in 0..2000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("timed out waiting for {what}");
}

/// Give in-flight envelopes time to arrive.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
