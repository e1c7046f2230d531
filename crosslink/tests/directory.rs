//! Directory listing, join/leave announcements and name completion.

mod common;

use common::{eventually, start};
use crosslink::NodeId;
use crosslink_transport::MemoryBroker;

#[tokio::test]
async fn test_new_node_learns_existing_entities() {
    let broker = MemoryBroker::new();
    let a = start(&broker, "a", 0).await;
    let alice = a.join("Alice", &[]);
    a.join("Albert", &[]);

    let b = start(&broker, "b", 1).await;

    eventually("listing merged", || b.node.directory().len() == 2).await;
    let entry = b.node.directory().get("alice").expect("listed");
    assert_eq!(entry.node, NodeId::new("a"));
    assert_eq!(entry.entity_id, alice.id);
    // A asked nobody; B's listing request only reached A.
    assert!(a.node.directory().is_empty());
}

#[tokio::test]
async fn test_join_and_leave_announcements() {
    let broker = MemoryBroker::new();
    let a = start(&broker, "a", 0).await;
    let b = start(&broker, "b", 1).await;
    let carol = a.join("Carol", &[]);
    let other = b.join("Other", &[]);
    a.node.messaging().set_reply_link(carol.id, other.id, "Other");

    assert!(a.node.announce_join(&carol).await);
    eventually("join seen", || b.node.directory().get("carol").is_some()).await;
    assert!(a.node.directory().get("carol").is_none(), "own echo ignored");

    a.sessions.disconnect(carol.id);
    assert!(a.node.announce_leave(&carol).await);
    eventually("leave seen", || b.node.directory().get("carol").is_none()).await;
    assert!(a.node.messaging().reply_link(carol.id).is_none());
}

#[tokio::test]
async fn test_complete_names_spans_the_network() {
    let broker = MemoryBroker::new();
    let a = start(&broker, "a", 0).await;
    let b = start(&broker, "b", 1).await;
    a.join("Steve", &[]);
    let stella = b.join("stella", &[]);
    b.join("Max", &[]);

    assert!(b.node.announce_join(&stella).await);
    eventually("join seen", || a.node.directory().get("stella").is_some()).await;

    assert_eq!(
        a.node.complete_names("ST"),
        vec!["stella".to_string(), "Steve".to_string()]
    );
}
