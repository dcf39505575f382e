//! Kubelite Core - node registry, consistent object store and kubelet protocol
//!
//! A minimal cluster control plane:
//! - Object store with atomic create and revision-checked update (etcd or in-memory)
//! - Node registry enforcing node invariants over the store
//! - Kubelet registration/heartbeat state machine
//! - Staleness-based health reconciliation

pub mod api;
pub mod client;
pub mod error;
pub mod kubelet;
pub mod operations;
pub mod registry;
pub mod storage;

pub use api::{Node, NodeSpec, NodeStatus, ObjectMeta};
pub use client::{HttpNodeClient, NodeApi};
pub use error::{KubeError, Result};
pub use kubelet::{AgentState, KubeletAgent, KubeletConfig};
pub use operations::*;
pub use registry::{NODE_PREFIX, NodeRegistry, node_key};
pub use storage::{
    EtcdStore, MemoryStore, ObjectStore, Revision, StoreBuilder, StoreError, StoredObject,
};
