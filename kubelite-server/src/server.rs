use crate::config::Config;
use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use kubelite_core::{HealthReconciler, KubeError, Node, NodeRegistry, Result};
use serde::Serialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

pub struct ServerState {
    pub registry: Arc<NodeRegistry>,
    pub shutdown: CancellationToken,
}

impl ServerState {
    pub fn new(registry: Arc<NodeRegistry>, shutdown: CancellationToken) -> Self {
        Self { registry, shutdown }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    reason: &'static str,
}

/// Registry error rendered as a control-surface response.
struct ApiError(KubeError);

impl From<KubeError> for ApiError {
    fn from(error: KubeError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            tracing::error!("request failed: {}", self.0);
        }

        let body = ErrorBody {
            error: self.0.to_string(),
            reason: self.0.reason(),
        };
        (status, Json(body)).into_response()
    }
}

fn status_for(error: &KubeError) -> StatusCode {
    match error {
        KubeError::Invalid(_) => StatusCode::BAD_REQUEST,
        KubeError::NodeNotFound(_) => StatusCode::NOT_FOUND,
        KubeError::NodeAlreadyExists(_) | KubeError::Conflict(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn bad_body(rejection: JsonRejection) -> ApiError {
    ApiError(KubeError::Invalid(rejection.body_text()))
}

pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/healthz", get(health_handler))
        .route("/api/v1/nodes", get(list_nodes).post(create_node))
        .route(
            "/api/v1/nodes/:name",
            get(get_node).put(update_node).delete(delete_node),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the control surface on `listener` until `state.shutdown` fires.
pub async fn serve(listener: TcpListener, state: Arc<ServerState>) -> Result<()> {
    let shutdown = state.shutdown.clone();
    let app = router(state);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    Ok(())
}

pub async fn run_server(config: Config, shutdown: CancellationToken) -> Result<()> {
    let store = config.store.builder()?.build().await?;
    let registry = Arc::new(NodeRegistry::new(store));

    let reconciler = HealthReconciler::spawn(
        registry.clone(),
        config.apiserver.reconciler(),
        shutdown.child_token(),
    )?;

    let listener = TcpListener::bind(&config.apiserver.bind_addr).await?;
    tracing::info!("API server listening on {}", config.apiserver.bind_addr);

    let state = Arc::new(ServerState::new(registry, shutdown.clone()));
    let served = serve(listener, state).await;

    shutdown.cancel();
    if let Err(error) = reconciler.await {
        tracing::warn!("Health reconciler task ended abnormally: {}", error);
    }

    served
}

async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

async fn create_node(
    State(state): State<Arc<ServerState>>,
    payload: std::result::Result<Json<Node>, JsonRejection>,
) -> std::result::Result<(StatusCode, Json<Node>), ApiError> {
    let Json(node) = payload.map_err(bad_body)?;
    let cancel = state.shutdown.child_token();

    let created = state.registry.create_node(&node, &cancel).await?;
    tracing::info!(node = %created.name(), status = %created.status, "node created");
    Ok((StatusCode::CREATED, Json(created)))
}

async fn list_nodes(
    State(state): State<Arc<ServerState>>,
) -> std::result::Result<Json<Vec<Node>>, ApiError> {
    let cancel = state.shutdown.child_token();
    let nodes = state.registry.list_nodes(&cancel).await?;
    Ok(Json(nodes))
}

async fn get_node(
    State(state): State<Arc<ServerState>>,
    Path(name): Path<String>,
) -> std::result::Result<Json<Node>, ApiError> {
    let cancel = state.shutdown.child_token();
    let node = state.registry.get_node(&name, &cancel).await?;
    Ok(Json(node))
}

async fn update_node(
    State(state): State<Arc<ServerState>>,
    Path(name): Path<String>,
    payload: std::result::Result<Json<Node>, JsonRejection>,
) -> std::result::Result<Json<Node>, ApiError> {
    let Json(node) = payload.map_err(bad_body)?;
    if node.name() != name {
        return Err(ApiError(KubeError::Invalid(
            "node name in URL does not match the name in the request body".to_string(),
        )));
    }

    let cancel = state.shutdown.child_token();
    let updated = state.registry.update_node(&node, &cancel).await?;
    Ok(Json(updated))
}

async fn delete_node(
    State(state): State<Arc<ServerState>>,
    Path(name): Path<String>,
) -> std::result::Result<StatusCode, ApiError> {
    let cancel = state.shutdown.child_token();
    state.registry.delete_node(&name, &cancel).await?;
    tracing::info!(node = %name, "node deleted");
    Ok(StatusCode::NO_CONTENT)
}
