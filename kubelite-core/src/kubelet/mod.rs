//! Kubelet registration and heartbeat protocol.

pub mod agent;

pub use agent::{AgentState, KubeletAgent, KubeletConfig};
