//! # Management Server List Propagation
//!
//! When a zone's endpoint list or algorithm changes, every connected agent
//! of the zone needs its new list. The propagator listens for configuration
//! changes, asks the registry which zones actually changed and pushes fresh
//! lists through the [`AgentNotifier`] collaborator.
//!
//! Pushes are fire-and-forget: a failed push is logged and counted, and the
//! agent picks up its list on its next reconnect or periodic check.

use async_trait::async_trait;
use futures::future::join_all;
use metrics::counter;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::core::config::ConfigChangeEvent;
use crate::core::error::LbResult;
use crate::core::types::{DataCenterId, Endpoint, HostId};
use crate::discovery::endpoints::EndpointChangeEvent;
use crate::load_balancing::algorithm::LbAlgorithm;
use crate::load_balancing::coordinator::IndirectAgentLoadBalancer;
use crate::observability::metrics::{PUSHES_TOTAL, PUSH_FAILURES_TOTAL};

/// Settings pushed to one agent
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MsListPush {
    pub host_id: HostId,
    pub data_center_id: DataCenterId,
    pub endpoints: Vec<Endpoint>,
    pub algorithm: LbAlgorithm,
    #[serde(with = "humantime_serde")]
    pub check_interval: Duration,
}

/// Delivers endpoint lists to connected agents
#[async_trait]
pub trait AgentNotifier: Send + Sync {
    async fn push_ms_list(&self, push: MsListPush) -> LbResult<()>;
}

/// Notifier that only logs what would be sent
pub struct LoggingNotifier;

#[async_trait]
impl AgentNotifier for LoggingNotifier {
    async fn push_ms_list(&self, push: MsListPush) -> LbResult<()> {
        info!(
            host_id = push.host_id,
            data_center_id = push.data_center_id,
            algorithm = %push.algorithm,
            check_interval = %humantime::format_duration(push.check_interval),
            endpoints = %Endpoint::join(&push.endpoints),
            "Pushing management server list to agent"
        );
        Ok(())
    }
}

/// Pushes new endpoint lists to agents after configuration changes
pub struct MsListPropagator {
    balancer: Arc<IndirectAgentLoadBalancer>,
    notifier: Arc<dyn AgentNotifier>,
}

impl MsListPropagator {
    pub fn new(balancer: Arc<IndirectAgentLoadBalancer>, notifier: Arc<dyn AgentNotifier>) -> Self {
        Self { balancer, notifier }
    }

    pub fn balancer(&self) -> &Arc<IndirectAgentLoadBalancer> {
        &self.balancer
    }

    /// Compute the list for every agent host of a zone
    ///
    /// The ordered host list is fetched once and each host's rank is passed
    /// as the order override, so a zone costs a single inventory query.
    pub fn plan(&self, data_center_id: DataCenterId) -> LbResult<Vec<MsListPush>> {
        let algorithm = self.balancer.lb_algorithm(data_center_id)?;
        let host_ids = self.balancer.get_ordered_host_id_list(data_center_id, false)?;

        let mut pushes = Vec::with_capacity(host_ids.len());
        for (rank, host_id) in host_ids.into_iter().enumerate() {
            let endpoints = self.balancer.get_management_server_list(
                Some(host_id),
                data_center_id,
                Some(rank),
            )?;
            let cluster_id = self
                .balancer
                .inventory()
                .find_host(host_id)?
                .and_then(|host| host.cluster_id);

            pushes.push(MsListPush {
                host_id,
                data_center_id,
                endpoints,
                algorithm,
                check_interval: self.balancer.lb_check_interval(cluster_id),
            });
        }

        Ok(pushes)
    }

    /// Push fresh lists to every agent host of a zone
    ///
    /// Returns the number of successful pushes. Individual push failures do
    /// not fail the call.
    pub async fn propagate(&self, data_center_id: DataCenterId) -> LbResult<usize> {
        let pushes = self.plan(data_center_id)?;
        let total = pushes.len();

        let results = join_all(pushes.into_iter().map(|push| {
            let notifier = Arc::clone(&self.notifier);
            async move {
                let host_id = push.host_id;
                (host_id, notifier.push_ms_list(push).await)
            }
        }))
        .await;

        let mut delivered = 0;
        for (host_id, result) in results {
            match result {
                Ok(()) => {
                    delivered += 1;
                    counter!(PUSHES_TOTAL).increment(1);
                }
                Err(e) => {
                    counter!(PUSH_FAILURES_TOTAL).increment(1);
                    warn!(host_id, data_center_id, error = %e, "Failed to push management server list");
                }
            }
        }

        info!(data_center_id, delivered, total, "Propagated management server list");
        Ok(delivered)
    }

    /// Refresh every zone with hosts and propagate those that changed
    pub async fn refresh_all(&self) -> LbResult<Vec<EndpointChangeEvent>> {
        let mut changed = Vec::new();

        for data_center_id in self.balancer.inventory().data_center_ids()? {
            match self.balancer.registry().refresh(data_center_id) {
                Ok(Some(event)) => {
                    if let Err(e) = self.propagate(data_center_id).await {
                        warn!(data_center_id, error = %e, "Failed to propagate management server list");
                    }
                    changed.push(event);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(data_center_id, error = %e, "Skipping zone with invalid load balancer settings");
                }
            }
        }

        Ok(changed)
    }

    /// Follow configuration changes until the channel closes
    pub async fn run(self: Arc<Self>, mut changes: broadcast::Receiver<ConfigChangeEvent>) {
        // Record baselines so only later changes trigger pushes
        if let Err(e) = self.refresh_all().await {
            warn!(error = %e, "Failed to record initial endpoint baselines");
        }

        loop {
            match changes.recv().await {
                Ok(event) => {
                    debug!(path = %event.file_path.display(), "Configuration changed, refreshing zones");
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Missed configuration change events, refreshing zones");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }

            if let Err(e) = self.refresh_all().await {
                warn!(error = %e, "Failed to refresh zones after configuration change");
            }
        }

        debug!("Configuration change channel closed, propagator stopping");
    }

    /// Run the propagator on the tokio runtime
    pub fn spawn(
        self: Arc<Self>,
        changes: broadcast::Receiver<ConfigChangeEvent>,
    ) -> JoinHandle<()> {
        tokio::spawn(self.run(changes))
    }
}
