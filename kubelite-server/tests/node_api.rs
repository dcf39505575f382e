use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use kubelite_core::{MemoryStore, Node, NodeRegistry};
use kubelite_server::{ServerState, router};
use serde_json::{Value, json};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

fn app() -> Router {
    let registry = Arc::new(NodeRegistry::new(Arc::new(MemoryStore::new())));
    router(Arc::new(ServerState::new(registry, CancellationToken::new())))
}

async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(value) => {
            builder = builder.header("content-type", "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn test_node_crud_scenario() {
    let app = app();

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/v1/nodes",
        Some(json!({"name": "node-0", "status": "Ready"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["resourceVersion"], "1");
    assert!(body["uid"].as_str().is_some_and(|uid| !uid.is_empty()));
    assert!(body["creationTimestamp"].is_string());

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/v1/nodes",
        Some(json!({"name": "node-0", "status": "Ready"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["reason"], "AlreadyExists");

    let update = json!({"name": "node-0", "resourceVersion": "1", "status": "NotReady"});
    let (status, body) = call(
        &app,
        Method::PUT,
        "/api/v1/nodes/node-0",
        Some(update.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["resourceVersion"], "2");
    assert_eq!(body["status"], "NotReady");

    let (status, body) = call(&app, Method::PUT, "/api/v1/nodes/node-0", Some(update)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["reason"], "Conflict");

    let (status, body) = call(&app, Method::DELETE, "/api/v1/nodes/node-0", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(body, Value::Null);

    let (status, body) = call(&app, Method::GET, "/api/v1/nodes/node-0", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["reason"], "NotFound");
}

#[tokio::test]
async fn test_create_validation() {
    let app = app();

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/v1/nodes",
        Some(json!({"name": "", "status": "Ready"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["reason"], "Invalid");

    let (status, _) = call(
        &app,
        Method::POST,
        "/api/v1/nodes",
        Some(json!({"status": "Ready"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(
        &app,
        Method::POST,
        "/api/v1/nodes",
        Some(json!({"name": "node-x", "status": "Exploded"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_update_errors() {
    let app = app();
    call(
        &app,
        Method::POST,
        "/api/v1/nodes",
        Some(json!({"name": "node-1", "status": "Ready"})),
    )
    .await;

    let (status, body) = call(
        &app,
        Method::PUT,
        "/api/v1/nodes/node-2",
        Some(json!({"name": "node-1", "resourceVersion": "1", "status": "Ready"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("does not match"));

    let (status, _) = call(
        &app,
        Method::PUT,
        "/api/v1/nodes/missing",
        Some(json!({"name": "missing", "resourceVersion": "1", "status": "Ready"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(
        &app,
        Method::PUT,
        "/api/v1/nodes/node-1",
        Some(json!({"name": "node-1", "resourceVersion": "1", "uid": "forged", "status": "Ready"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_list_and_idempotent_delete() {
    let app = app();
    for name in ["node-b", "node-a"] {
        let (status, _) = call(
            &app,
            Method::POST,
            "/api/v1/nodes",
            Some(json!({"name": name, "status": "Ready", "spec": {"providerID": "kind://x"}})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, _) = call(&app, Method::DELETE, "/api/v1/nodes/never-existed", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = call(&app, Method::GET, "/api/v1/nodes", None).await;
    assert_eq!(status, StatusCode::OK);
    let nodes: Vec<Node> = serde_json::from_value(body).unwrap();
    let names: Vec<&str> = nodes.iter().map(|node| node.name()).collect();
    assert_eq!(names, vec!["node-a", "node-b"]);
    assert_eq!(nodes[0].spec.provider_id, "kind://x");

    let (status, body) = call(&app, Method::GET, "/healthz", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}
