//! Domain layer over the object store.

pub mod node_registry;

pub use node_registry::{NODE_PREFIX, NodeRegistry, node_key};
