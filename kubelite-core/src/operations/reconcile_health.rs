use crate::api::{Node, NodeStatus};
use crate::registry::NodeRegistry;
use crate::{KubeError, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct ReconcileHealthOperation {
    registry: Arc<NodeRegistry>,
}

#[derive(Debug, Clone)]
pub struct ReconcileHealthOperationRequest {
    pub now: DateTime<Utc>,
    pub staleness_threshold: Duration,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileHealthOperationResult {
    pub scanned: usize,
    pub demoted: Vec<String>,
    /// Stale nodes whose demotion lost a race or failed this pass.
    pub skipped: Vec<String>,
}

impl ReconcileHealthOperation {
    pub fn new(registry: Arc<NodeRegistry>) -> Self {
        Self { registry }
    }

    /// One pass: demote every node whose last write is older than the threshold.
    pub async fn run(
        &self,
        request: ReconcileHealthOperationRequest,
        cancel: &CancellationToken,
    ) -> Result<ReconcileHealthOperationResult> {
        let ReconcileHealthOperationRequest {
            now,
            staleness_threshold,
        } = request;

        let threshold = chrono::Duration::from_std(staleness_threshold).map_err(|error| {
            KubeError::Config(format!("invalid staleness threshold: {}", error))
        })?;
        let cutoff = now.checked_sub_signed(threshold).ok_or_else(|| {
            KubeError::Config(format!(
                "staleness threshold {:?} reaches outside the representable time range",
                staleness_threshold
            ))
        })?;

        let nodes = self.registry.list_nodes(cancel).await?;
        let mut result = ReconcileHealthOperationResult {
            scanned: nodes.len(),
            ..Default::default()
        };

        for node in nodes {
            if !is_stale(&node, cutoff) {
                continue;
            }

            let name = node.name().to_string();
            let mut demoted = node;
            demoted.status = NodeStatus::NotReady;

            // Conditional on the listed version: a heartbeat landing in between wins.
            match self.registry.update_node(&demoted, cancel).await {
                Ok(updated) => {
                    tracing::warn!(
                        node = %name,
                        last_write = ?demoted.last_write_time(),
                        resource_version = %updated.resource_version(),
                        "node heartbeat stale; marked NotReady"
                    );
                    result.demoted.push(name);
                }
                Err(KubeError::Conflict(_)) | Err(KubeError::NodeNotFound(_)) => {
                    tracing::debug!(node = %name, "node changed during reconcile; skipping");
                    result.skipped.push(name);
                }
                Err(KubeError::Cancelled) => return Err(KubeError::Cancelled),
                Err(error) => {
                    tracing::warn!(node = %name, "failed to demote stale node: {}", error);
                    result.skipped.push(name);
                }
            }
        }

        Ok(result)
    }
}

fn is_stale(node: &Node, cutoff: DateTime<Utc>) -> bool {
    if node.status == NodeStatus::NotReady {
        return false;
    }
    match node.last_write_time() {
        Some(last_write) => last_write < cutoff,
        None => true,
    }
}

#[derive(Debug, Clone)]
pub struct HealthReconcilerConfig {
    pub heartbeat_interval: Duration,
    pub missed_heartbeats: u32,
    pub check_interval: Duration,
}

impl HealthReconcilerConfig {
    /// `heartbeat_interval × missed_heartbeats`, or `Config` if that overflows.
    pub fn staleness_threshold(&self) -> Result<Duration> {
        self.heartbeat_interval
            .checked_mul(self.missed_heartbeats.max(1))
            .ok_or_else(|| {
                KubeError::Config(format!(
                    "staleness threshold overflows: {:?} x {}",
                    self.heartbeat_interval, self.missed_heartbeats
                ))
            })
    }
}

impl Default for HealthReconcilerConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(10),
            missed_heartbeats: 3,
            check_interval: Duration::from_secs(10),
        }
    }
}

/// Background task running `ReconcileHealthOperation` on a fixed interval.
pub struct HealthReconciler;

impl HealthReconciler {
    pub fn spawn(
        registry: Arc<NodeRegistry>,
        config: HealthReconcilerConfig,
        cancel: CancellationToken,
    ) -> Result<JoinHandle<()>> {
        let staleness_threshold = config.staleness_threshold()?;
        if config.check_interval.is_zero() {
            return Err(KubeError::Config(
                "reconcile check interval must be positive".to_string(),
            ));
        }

        // Reject thresholds the pass could never turn into a cutoff.
        let threshold = chrono::Duration::from_std(staleness_threshold).map_err(|error| {
            KubeError::Config(format!("invalid staleness threshold: {}", error))
        })?;
        if Utc::now().checked_sub_signed(threshold).is_none() {
            return Err(KubeError::Config(format!(
                "staleness threshold {:?} reaches outside the representable time range",
                staleness_threshold
            )));
        }

        let operation = ReconcileHealthOperation::new(registry);
        let handle = tokio::spawn(async move {
            tracing::info!(
                "Health reconciler started (check every {:?}, stale after {:?})",
                config.check_interval,
                staleness_threshold
            );

            let mut timer = tokio::time::interval(config.check_interval);
            timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    () = cancel.cancelled() => {
                        tracing::info!("Health reconciler shutting down");
                        return;
                    }
                    _ = timer.tick() => {}
                }

                let request = ReconcileHealthOperationRequest {
                    now: Utc::now(),
                    staleness_threshold,
                };

                match operation.run(request, &cancel).await {
                    Ok(result) if !result.demoted.is_empty() => {
                        tracing::info!(
                            "Reconcile pass scanned {} nodes, demoted {:?}",
                            result.scanned,
                            result.demoted
                        );
                    }
                    Ok(_) => {}
                    Err(KubeError::Cancelled) => return,
                    Err(error) => {
                        tracing::error!("Reconcile pass failed: {}", error);
                    }
                }
            }
        });

        Ok(handle)
    }
}
