use chrono::Utc;
use kubelite_core::{
    AgentState, KubeError, KubeletAgent, KubeletConfig, MemoryStore, NodeRegistry, NodeStatus,
    ReconcileHealthOperation, ReconcileHealthOperationRequest,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

const HEARTBEAT: Duration = Duration::from_millis(50);

fn setup(name: &str) -> (Arc<NodeRegistry>, KubeletAgent<NodeRegistry>, watch::Sender<NodeStatus>) {
    let registry = Arc::new(NodeRegistry::new(Arc::new(MemoryStore::new())));
    let (tx, rx) = watch::channel(NodeStatus::Ready);
    let mut config = KubeletConfig::new(name);
    config.heartbeat_interval = HEARTBEAT;
    let agent = KubeletAgent::new(config, registry.clone(), rx);
    (registry, agent, tx)
}

fn reconcile_request() -> ReconcileHealthOperationRequest {
    ReconcileHealthOperationRequest {
        now: Utc::now(),
        staleness_threshold: HEARTBEAT * 3,
    }
}

#[tokio::test]
async fn test_silent_node_demoted_then_restored_by_late_heartbeat() {
    let (registry, mut agent, _status) = setup("node-1");
    let reconcile = ReconcileHealthOperation::new(registry.clone());
    let cancel = CancellationToken::new();

    agent.step(&cancel).await;
    assert!(matches!(agent.state(), AgentState::Registered { .. }));

    // a healthy node survives a pass
    let result = reconcile.run(reconcile_request(), &cancel).await.unwrap();
    assert!(result.demoted.is_empty());

    // no heartbeats for more than 3x the interval
    tokio::time::sleep(HEARTBEAT * 4).await;
    let result = reconcile.run(reconcile_request(), &cancel).await.unwrap();
    assert_eq!(result.demoted, vec!["node-1".to_string()]);
    assert_eq!(
        registry.get_node("node-1", &cancel).await.unwrap().status,
        NodeStatus::NotReady
    );

    // the agent's cached version is stale now; the heartbeat refetches and wins
    agent.step(&cancel).await;
    let node = registry.get_node("node-1", &cancel).await.unwrap();
    assert_eq!(node.status, NodeStatus::Ready);
    match agent.state() {
        AgentState::Registered { node: cached } => {
            assert_eq!(cached.resource_version(), node.resource_version())
        }
        other => panic!("unexpected state {:?}", other),
    }
}

#[tokio::test]
async fn test_heartbeat_between_read_and_write_beats_reconciler() {
    let (registry, mut agent, _status) = setup("node-2");
    let cancel = CancellationToken::new();

    agent.step(&cancel).await;
    tokio::time::sleep(HEARTBEAT * 4).await;

    // reconciler's snapshot, taken before the heartbeat lands
    let mut observed = registry.list_nodes(&cancel).await.unwrap().remove(0);
    agent.step(&cancel).await;

    observed.status = NodeStatus::NotReady;
    let err = registry.update_node(&observed, &cancel).await.unwrap_err();
    assert!(matches!(err, KubeError::Conflict(_)));
    assert_eq!(
        registry.get_node("node-2", &cancel).await.unwrap().status,
        NodeStatus::Ready
    );

    // and a fresh pass sees the recent write
    let reconcile = ReconcileHealthOperation::new(registry.clone());
    let result = reconcile.run(reconcile_request(), &cancel).await.unwrap();
    assert!(result.demoted.is_empty());
}
