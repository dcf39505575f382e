use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Minimal metadata every persisted resource carries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uid: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub resource_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<DateTime<Utc>>,
    /// Server-stamped time of the last successful write.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSpec {
    #[serde(default)]
    pub unschedulable: bool,
    #[serde(rename = "providerID", default, skip_serializing_if = "String::is_empty")]
    pub provider_id: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeStatus {
    #[default]
    Ready,
    NotReady,
    MemoryPressure,
    DiskPressure,
}

impl NodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeStatus::Ready => "Ready",
            NodeStatus::NotReady => "NotReady",
            NodeStatus::MemoryPressure => "MemoryPressure",
            NodeStatus::DiskPressure => "DiskPressure",
        }
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A worker node as stored under `/registry/nodes/<name>`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    #[serde(flatten)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: NodeSpec,
    #[serde(default)]
    pub status: NodeStatus,
}

impl Node {
    pub fn new(name: impl Into<String>, status: NodeStatus) -> Self {
        Self {
            metadata: ObjectMeta {
                name: name.into(),
                ..ObjectMeta::default()
            },
            spec: NodeSpec::default(),
            status,
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn resource_version(&self) -> &str {
        &self.metadata.resource_version
    }

    /// Time of the last successful write, falling back to creation time.
    pub fn last_write_time(&self) -> Option<DateTime<Utc>> {
        self.metadata
            .update_timestamp
            .or(self.metadata.creation_timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_wire_format() {
        let mut node = Node::new("node-0", NodeStatus::MemoryPressure);
        node.metadata.resource_version = "7".to_string();
        node.spec.provider_id = "aws:///i-123".to_string();

        let value = serde_json::to_value(&node).unwrap();
        assert_eq!(value["name"], "node-0");
        assert_eq!(value["resourceVersion"], "7");
        assert_eq!(value["spec"]["providerID"], "aws:///i-123");
        assert_eq!(value["spec"]["unschedulable"], false);
        assert_eq!(value["status"], "MemoryPressure");
        assert!(value.get("uid").is_none());
        assert!(value.get("creationTimestamp").is_none());
    }

    #[test]
    fn test_decode_minimal_body() {
        let node: Node = serde_json::from_str(r#"{"name":"node-1","status":"Ready"}"#).unwrap();
        assert_eq!(node.name(), "node-1");
        assert_eq!(node.status, NodeStatus::Ready);
        assert_eq!(node.spec, NodeSpec::default());
        assert!(node.last_write_time().is_none());
    }

    #[test]
    fn test_reject_unknown_status() {
        let result = serde_json::from_str::<Node>(r#"{"name":"node-1","status":"Sleepy"}"#);
        assert!(result.is_err());
    }
}
