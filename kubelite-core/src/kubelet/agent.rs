use crate::api::{Node, NodeStatus};
use crate::client::NodeApi;
use crate::KubeError;
use backon::{BackoffBuilder, ExponentialBackoff, ExponentialBuilder};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct KubeletConfig {
    pub node_name: String,
    pub heartbeat_interval: Duration,
    pub register_backoff_min: Duration,
    pub register_backoff_max: Duration,
    /// Re-fetch-and-retry attempts for one heartbeat that keeps hitting conflicts.
    pub conflict_retries: usize,
    /// Upper bound on the best-effort delete during shutdown.
    pub shutdown_grace: Duration,
}

impl KubeletConfig {
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
            heartbeat_interval: Duration::from_secs(10),
            register_backoff_min: Duration::from_millis(500),
            register_backoff_max: Duration::from_secs(30),
            conflict_retries: 3,
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentState {
    Unregistered,
    /// Holds the last record written or read, including its resource version.
    Registered { node: Node },
    Terminating,
}

/// Per-node agent: registers once, then heartbeats the observed status.
pub struct KubeletAgent<A: NodeApi> {
    config: KubeletConfig,
    api: Arc<A>,
    observed: watch::Receiver<NodeStatus>,
    state: AgentState,
    backoff: Option<ExponentialBackoff>,
}

impl<A: NodeApi> KubeletAgent<A> {
    pub fn new(config: KubeletConfig, api: Arc<A>, observed: watch::Receiver<NodeStatus>) -> Self {
        Self {
            config,
            api,
            observed,
            state: AgentState::Unregistered,
            backoff: None,
        }
    }

    pub fn state(&self) -> &AgentState {
        &self.state
    }

    pub fn node_name(&self) -> &str {
        &self.config.node_name
    }

    /// Drive the state machine until `cancel` fires, then deregister.
    pub async fn run(&mut self, cancel: CancellationToken) {
        tracing::info!(
            node = %self.config.node_name,
            interval = ?self.config.heartbeat_interval,
            "kubelet starting"
        );

        loop {
            let delay = self.step(&cancel).await;
            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(delay) => {}
            }
        }

        self.terminate().await;
    }

    /// Perform one transition; returns how long to wait before the next one.
    pub async fn step(&mut self, cancel: &CancellationToken) -> Duration {
        match self.state {
            AgentState::Unregistered => self.register(cancel).await,
            AgentState::Registered { .. } => self.heartbeat(cancel).await,
            AgentState::Terminating => self.config.heartbeat_interval,
        }
    }

    /// Best-effort removal of the node record. A crash before this point is
    /// covered by the health reconciler.
    pub async fn terminate(&mut self) {
        self.state = AgentState::Terminating;

        let cleanup = CancellationToken::new();
        let name = self.config.node_name.clone();
        let delete = self.api.delete_node(&name, &cleanup);

        match tokio::time::timeout(self.config.shutdown_grace, delete).await {
            Ok(Ok(())) => tracing::info!(node = %name, "deregistered node"),
            Ok(Err(error)) => tracing::warn!(node = %name, "failed to deregister node: {}", error),
            Err(_) => {
                cleanup.cancel();
                tracing::warn!(node = %name, "timed out deregistering node");
            }
        }
    }

    async fn register(&mut self, cancel: &CancellationToken) -> Duration {
        let name = self.config.node_name.clone();
        let node = Node::new(name.clone(), NodeStatus::Ready);

        match self.api.create_node(&node, cancel).await {
            Ok(created) => {
                tracing::info!(
                    node = %name,
                    resource_version = %created.resource_version(),
                    "registered node"
                );
                self.enter_registered(created);
                self.config.heartbeat_interval
            }
            Err(KubeError::NodeAlreadyExists(_)) => match self.api.get_node(&name, cancel).await {
                Ok(existing) => {
                    tracing::info!(
                        node = %name,
                        resource_version = %existing.resource_version(),
                        "node already registered; adopting existing record"
                    );
                    self.enter_registered(existing);
                    // publish our own status right away
                    Duration::ZERO
                }
                Err(error) => self.registration_failed(error),
            },
            Err(error) => self.registration_failed(error),
        }
    }

    fn enter_registered(&mut self, node: Node) {
        self.backoff = None;
        self.state = AgentState::Registered { node };
    }

    fn registration_failed(&mut self, error: KubeError) -> Duration {
        let max = self.config.register_backoff_max;
        let min = self.config.register_backoff_min;
        let delay = self
            .backoff
            .get_or_insert_with(|| {
                ExponentialBuilder::default()
                    .with_min_delay(min)
                    .with_max_delay(max)
                    .with_max_times(16)
                    .with_jitter()
                    .build()
            })
            .next()
            .unwrap_or(max);

        tracing::warn!(
            node = %self.config.node_name,
            "registration failed: {} - retrying in {:?}",
            error,
            delay
        );
        delay
    }

    async fn heartbeat(&mut self, cancel: &CancellationToken) -> Duration {
        let interval = self.config.heartbeat_interval;
        let AgentState::Registered { node } = &self.state else {
            return interval;
        };

        let name = self.config.node_name.clone();
        let mut desired = node.clone();

        for attempt in 0..=self.config.conflict_retries {
            desired.status = *self.observed.borrow();

            match self.api.update_node(&desired, cancel).await {
                Ok(updated) => {
                    tracing::debug!(
                        node = %name,
                        status = %updated.status,
                        resource_version = %updated.resource_version(),
                        "heartbeat"
                    );
                    self.state = AgentState::Registered { node: updated };
                    return interval;
                }
                Err(KubeError::Conflict(reason)) => {
                    tracing::debug!(
                        node = %name,
                        attempt,
                        "heartbeat conflict, refetching: {}",
                        reason
                    );
                    match self.api.get_node(&name, cancel).await {
                        Ok(latest) => desired = latest,
                        Err(KubeError::NodeNotFound(_)) => return self.lost_registration(),
                        Err(error) => {
                            tracing::warn!(
                                node = %name,
                                "refetch after conflict failed: {}",
                                error
                            );
                            return interval;
                        }
                    }
                }
                Err(KubeError::NodeNotFound(_)) => return self.lost_registration(),
                Err(KubeError::Cancelled) => return Duration::ZERO,
                Err(error) if error.is_retryable() => {
                    tracing::warn!(
                        node = %name,
                        "heartbeat failed, retrying next tick: {}",
                        error
                    );
                    return interval;
                }
                Err(error) => {
                    tracing::error!(node = %name, "heartbeat rejected: {}", error);
                    return interval;
                }
            }
        }

        tracing::warn!(
            node = %name,
            "heartbeat still conflicting after {} retries; skipping tick",
            self.config.conflict_retries
        );
        interval
    }

    fn lost_registration(&mut self) -> Duration {
        tracing::warn!(
            node = %self.config.node_name,
            "node record deleted externally; re-registering"
        );
        self.state = AgentState::Unregistered;
        Duration::ZERO
    }
}
