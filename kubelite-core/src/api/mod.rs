//! Persisted resource types.

pub mod node;

pub use node::{Node, NodeSpec, NodeStatus, ObjectMeta};
