//! Node API seam shared by in-process callers and remote agents.

pub mod http;

pub use http::HttpNodeClient;

use crate::api::Node;
use crate::registry::NodeRegistry;
use crate::Result;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

#[async_trait]
pub trait NodeApi: Send + Sync {
    async fn create_node(&self, node: &Node, cancel: &CancellationToken) -> Result<Node>;

    async fn get_node(&self, name: &str, cancel: &CancellationToken) -> Result<Node>;

    async fn update_node(&self, node: &Node, cancel: &CancellationToken) -> Result<Node>;

    async fn delete_node(&self, name: &str, cancel: &CancellationToken) -> Result<()>;

    async fn list_nodes(&self, cancel: &CancellationToken) -> Result<Vec<Node>>;
}

#[async_trait]
impl NodeApi for NodeRegistry {
    async fn create_node(&self, node: &Node, cancel: &CancellationToken) -> Result<Node> {
        NodeRegistry::create_node(self, node, cancel).await
    }

    async fn get_node(&self, name: &str, cancel: &CancellationToken) -> Result<Node> {
        NodeRegistry::get_node(self, name, cancel).await
    }

    async fn update_node(&self, node: &Node, cancel: &CancellationToken) -> Result<Node> {
        NodeRegistry::update_node(self, node, cancel).await
    }

    async fn delete_node(&self, name: &str, cancel: &CancellationToken) -> Result<()> {
        NodeRegistry::delete_node(self, name, cancel).await
    }

    async fn list_nodes(&self, cancel: &CancellationToken) -> Result<Vec<Node>> {
        NodeRegistry::list_nodes(self, cancel).await
    }
}
