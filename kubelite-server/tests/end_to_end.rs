use kubelite_core::{
    HttpNodeClient, KubeError, KubeletAgent, KubeletConfig, MemoryStore, NodeApi, NodeRegistry,
    NodeStatus,
};
use kubelite_server::{ServerState, serve};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

async fn start_server(shutdown: CancellationToken) -> String {
    let registry = Arc::new(NodeRegistry::new(Arc::new(MemoryStore::new())));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    let state = Arc::new(ServerState::new(registry, shutdown));
    tokio::spawn(async move {
        if let Err(error) = serve(listener, state).await {
            panic!("server failed: {}", error);
        }
    });
    addr
}

async fn wait_for_ready(client: &HttpNodeClient, expected: usize) -> Vec<String> {
    let cancel = CancellationToken::new();
    for _ in 0..200 {
        if let Ok(nodes) = client.list_nodes(&cancel).await {
            let ready: Vec<String> = nodes
                .iter()
                .filter(|node| node.status == NodeStatus::Ready)
                .map(|node| node.name().to_string())
                .collect();
            if ready.len() == expected {
                return ready;
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("timed out waiting for {} ready nodes", expected);
}

#[tokio::test]
async fn test_kubelets_register_and_deregister_over_http() {
    let shutdown = CancellationToken::new();
    let addr = start_server(shutdown.clone()).await;
    let client = HttpNodeClient::new(&addr, Duration::from_secs(2)).unwrap();

    let agents_cancel = CancellationToken::new();
    let mut handles = Vec::new();
    for i in 0..3 {
        let mut config = KubeletConfig::new(format!("node-{}", i));
        config.heartbeat_interval = Duration::from_millis(50);
        let (_tx, rx) = watch::channel(NodeStatus::Ready);
        let mut agent = KubeletAgent::new(config, Arc::new(client.clone()), rx);
        let cancel = agents_cancel.clone();
        handles.push(tokio::spawn(async move {
            agent.run(cancel).await;
        }));
    }

    let mut ready = wait_for_ready(&client, 3).await;
    ready.sort();
    assert_eq!(ready, vec!["node-0", "node-1", "node-2"]);

    agents_cancel.cancel();
    for handle in handles {
        handle.await.unwrap();
    }

    let cancel = CancellationToken::new();
    assert!(client.list_nodes(&cancel).await.unwrap().is_empty());
    shutdown.cancel();
}

#[tokio::test]
async fn test_http_client_error_mapping() {
    let shutdown = CancellationToken::new();
    let addr = start_server(shutdown.clone()).await;
    let client = HttpNodeClient::new(&addr, Duration::from_secs(2)).unwrap();
    let cancel = CancellationToken::new();

    let node = kubelite_core::Node::new("node-9", NodeStatus::Ready);
    let created = client.create_node(&node, &cancel).await.unwrap();

    let err = client.create_node(&node, &cancel).await.unwrap_err();
    assert!(matches!(err, KubeError::NodeAlreadyExists(_)));

    let mut stale = created.clone();
    stale.status = NodeStatus::MemoryPressure;
    client.update_node(&stale, &cancel).await.unwrap();
    let err = client.update_node(&stale, &cancel).await.unwrap_err();
    assert!(matches!(err, KubeError::Conflict(_)));

    client.delete_node("node-9", &cancel).await.unwrap();
    let err = client.get_node("node-9", &cancel).await.unwrap_err();
    assert!(matches!(err, KubeError::NodeNotFound(_)));

    shutdown.cancel();
}

#[tokio::test]
async fn test_names_with_url_metacharacters_address_their_own_node() {
    let shutdown = CancellationToken::new();
    let addr = start_server(shutdown.clone()).await;
    let client = HttpNodeClient::new(&addr, Duration::from_secs(2)).unwrap();
    let cancel = CancellationToken::new();

    for name in ["a", "a#b", "a?b", "a%b"] {
        let node = kubelite_core::Node::new(name, NodeStatus::Ready);
        client.create_node(&node, &cancel).await.unwrap();
    }

    for name in ["a#b", "a?b", "a%b"] {
        let fetched = client.get_node(name, &cancel).await.unwrap();
        assert_eq!(fetched.name(), name);

        let mut heartbeat = fetched.clone();
        heartbeat.status = NodeStatus::DiskPressure;
        let updated = client.update_node(&heartbeat, &cancel).await.unwrap();
        assert_eq!(updated.name(), name);
        assert_eq!(updated.status, NodeStatus::DiskPressure);
    }

    client.delete_node("a#b", &cancel).await.unwrap();
    let survivor = client.get_node("a", &cancel).await.unwrap();
    assert_eq!(survivor.status, NodeStatus::Ready);
    assert!(matches!(
        client.get_node("a#b", &cancel).await,
        Err(KubeError::NodeNotFound(_))
    ));

    let mut names: Vec<String> = client
        .list_nodes(&cancel)
        .await
        .unwrap()
        .into_iter()
        .map(|node| node.metadata.name)
        .collect();
    names.sort();
    assert_eq!(names, vec!["a", "a%b", "a?b"]);

    shutdown.cancel();
}
