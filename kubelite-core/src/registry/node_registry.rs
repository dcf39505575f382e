use crate::api::Node;
use crate::storage::{DynObjectStore, Revision, StoreError, StoredObject};
use crate::{KubeError, Result};
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use ulid::Ulid;

pub const NODE_PREFIX: &str = "/registry/nodes/";

/// Storage key for a node. Namespace does not participate in the key.
pub fn node_key(name: &str) -> String {
    format!("{}{}", NODE_PREFIX, name)
}

/// CRUD over `Node` objects.
///
/// The registry never retries: conflicts and store outages are returned to
/// the caller, which owns the retry policy.
#[derive(Clone)]
pub struct NodeRegistry {
    store: DynObjectStore,
}

impl NodeRegistry {
    pub fn new(store: DynObjectStore) -> Self {
        Self { store }
    }

    pub async fn create_node(&self, node: &Node, cancel: &CancellationToken) -> Result<Node> {
        validate_name(node.name())?;

        let now = Utc::now();
        let mut node = node.clone();
        if node.metadata.uid.is_empty() {
            node.metadata.uid = Ulid::new().to_string();
        }
        if node.metadata.creation_timestamp.is_none() {
            node.metadata.creation_timestamp = Some(now);
        }
        node.metadata.update_timestamp = Some(now);
        node.metadata.resource_version.clear();

        let key = node_key(node.name());
        let payload = encode(&node)?;
        let revision = self
            .store
            .create(&key, payload, cancel)
            .await
            .map_err(|error| map_store_error(error, node.name()))?;

        node.metadata.resource_version = revision.to_string();
        tracing::debug!(
            node = %node.name(),
            resource_version = %node.metadata.resource_version,
            "created node"
        );
        Ok(node)
    }

    pub async fn get_node(&self, name: &str, cancel: &CancellationToken) -> Result<Node> {
        validate_name(name)?;

        let stored = self
            .store
            .get(&node_key(name), cancel)
            .await
            .map_err(|error| map_store_error(error, name))?;

        decode(&stored).map_err(KubeError::Internal)
    }

    /// Conditional update: applies only if `node.resource_version` is still current.
    pub async fn update_node(&self, node: &Node, cancel: &CancellationToken) -> Result<Node> {
        validate_name(node.name())?;
        let expected = parse_resource_version(node.resource_version())?;

        let current = self.get_node(node.name(), cancel).await?;
        if current.resource_version() != node.resource_version() {
            return Err(KubeError::Conflict(format!(
                "node {} has resource version {}, update carried {}",
                node.name(),
                current.resource_version(),
                node.resource_version()
            )));
        }

        let mut node = node.clone();
        if node.metadata.uid.is_empty() {
            node.metadata.uid = current.metadata.uid.clone();
        } else if node.metadata.uid != current.metadata.uid {
            return Err(KubeError::Invalid(format!(
                "uid of node {} is immutable",
                node.name()
            )));
        }

        match node.metadata.creation_timestamp {
            None => node.metadata.creation_timestamp = current.metadata.creation_timestamp,
            Some(ts) if Some(ts) != current.metadata.creation_timestamp => {
                return Err(KubeError::Invalid(format!(
                    "creationTimestamp of node {} is immutable",
                    node.name()
                )));
            }
            Some(_) => {}
        }

        node.metadata.update_timestamp = Some(Utc::now());
        node.metadata.resource_version.clear();

        let payload = encode(&node)?;
        let revision = self
            .store
            .update(&node_key(node.name()), payload, expected, cancel)
            .await
            .map_err(|error| map_store_error(error, node.name()))?;

        node.metadata.resource_version = revision.to_string();
        tracing::debug!(
            node = %node.name(),
            status = %node.status,
            resource_version = %node.metadata.resource_version,
            "updated node"
        );
        Ok(node)
    }

    /// Idempotent: deleting an absent node succeeds.
    pub async fn delete_node(&self, name: &str, cancel: &CancellationToken) -> Result<()> {
        validate_name(name)?;

        let removed = self
            .store
            .delete(&node_key(name), cancel)
            .await
            .map_err(|error| map_store_error(error, name))?;

        if removed {
            tracing::debug!(node = %name, "deleted node");
        } else {
            tracing::debug!(node = %name, "delete of absent node ignored");
        }
        Ok(())
    }

    /// All nodes, or `ListFailed` if any stored entry cannot be decoded.
    pub async fn list_nodes(&self, cancel: &CancellationToken) -> Result<Vec<Node>> {
        let objects = self
            .store
            .list(NODE_PREFIX, cancel)
            .await
            .map_err(KubeError::from)?;

        objects
            .iter()
            .map(|stored| decode(stored).map_err(KubeError::ListFailed))
            .collect()
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(KubeError::Invalid("node name cannot be empty".to_string()));
    }
    if name.contains('/') {
        return Err(KubeError::Invalid(format!(
            "node name cannot contain '/': {}",
            name
        )));
    }
    Ok(())
}

fn parse_resource_version(version: &str) -> Result<Revision> {
    if version.is_empty() {
        return Err(KubeError::Invalid(
            "resourceVersion is required for update".to_string(),
        ));
    }

    version
        .parse::<Revision>()
        .map_err(|_| KubeError::Invalid(format!("malformed resourceVersion: {}", version)))
}

fn map_store_error(error: StoreError, name: &str) -> KubeError {
    match error {
        StoreError::NotFound(_) => KubeError::NodeNotFound(name.to_string()),
        StoreError::AlreadyExists(_) => KubeError::NodeAlreadyExists(name.to_string()),
        other => other.into(),
    }
}

fn encode(node: &Node) -> Result<Vec<u8>> {
    serde_json::to_vec(node)
        .map_err(|error| KubeError::Internal(format!("failed to encode node: {}", error)))
}

fn decode(stored: &StoredObject) -> std::result::Result<Node, String> {
    let mut node: Node = serde_json::from_slice(&stored.value)
        .map_err(|error| format!("failed to decode {}: {}", stored.key, error))?;
    node.metadata.resource_version = stored.revision.to_string();
    Ok(node)
}
