//! # Indirect Agent Load Balancer
//!
//! Decides which ordered list of management servers each host's agent
//! receives. The coordinator is stateless across calls: every request reads
//! the live configuration and the live host inventory, so switching the
//! algorithm or the address list takes effect on the next call.
//!
//! Round-robin stickiness comes only from the rank formula: a host's rank is
//! its position in the ascending list of candidate host ids of its zone, so
//! the same host keeps the same primary as long as neither that list nor the
//! endpoint list changes. Nothing is persisted.
//!
//! ## Usage Example
//!
//! ```rust,ignore
//! let lb = IndirectAgentLoadBalancer::new(config, inventory);
//! let endpoints = lb.get_management_server_list(Some(host_id), zone_id, None)?;
//! ```

use metrics::{counter, histogram};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::core::config::ConfigProvider;
use crate::core::error::LbResult;
use crate::core::types::{
    ClusterId, DataCenterId, Endpoint, HostId, HostType, HypervisorType, ResourceState,
};
use crate::discovery::endpoints::EndpointRegistry;
use crate::discovery::inventory::{HostFilter, HostInventory};
use crate::load_balancing::algorithm::{assign, LbAlgorithm};
use crate::observability::metrics::{
    ASSIGNMENTS_TOTAL, ASSIGNMENT_DURATION_SECONDS, ASSIGNMENT_FAILURES_TOTAL,
};

/// Resource states of hosts whose agents stay connected
const AGENT_RESOURCE_STATES: &[ResourceState] = &[
    ResourceState::Enabled,
    ResourceState::PrepareForMaintenance,
    ResourceState::ErrorInPrepareForMaintenance,
    ResourceState::Maintenance,
    ResourceState::ErrorInMaintenance,
];

/// Host types running an indirect agent
const AGENT_HOST_TYPES: &[HostType] = &[HostType::Routing];

/// Hypervisors managed through an indirect agent
const AGENT_HYPERVISOR_TYPES: &[HypervisorType] = &[HypervisorType::Kvm, HypervisorType::Lxc];

/// Coordinates configuration, inventory and assignment algorithms
pub struct IndirectAgentLoadBalancer {
    config: Arc<dyn ConfigProvider>,
    inventory: Arc<dyn HostInventory>,
    registry: Arc<EndpointRegistry>,
}

impl IndirectAgentLoadBalancer {
    pub fn new(config: Arc<dyn ConfigProvider>, inventory: Arc<dyn HostInventory>) -> Self {
        let registry = Arc::new(EndpointRegistry::new(config.clone()));
        Self {
            config,
            inventory,
            registry,
        }
    }

    /// Registry used for endpoint reads and change detection
    pub fn registry(&self) -> &Arc<EndpointRegistry> {
        &self.registry
    }

    pub fn inventory(&self) -> &Arc<dyn HostInventory> {
        &self.inventory
    }

    /// Ordered management server endpoints for a host's agent
    ///
    /// `host_order_index_override` replaces the rank lookup, letting callers
    /// that already hold the zone's ordered host list avoid re-querying the
    /// inventory. Without it, an absent or unknown `host_id` gets rank 0.
    pub fn get_management_server_list(
        &self,
        host_id: Option<HostId>,
        data_center_id: DataCenterId,
        host_order_index_override: Option<usize>,
    ) -> LbResult<Vec<Endpoint>> {
        self.resolve_management_server_list(host_id, data_center_id, host_order_index_override)
            .map(|(_, endpoints)| endpoints)
    }

    /// Instrumented computation returning the algorithm the list was built with
    fn resolve_management_server_list(
        &self,
        host_id: Option<HostId>,
        data_center_id: DataCenterId,
        host_order_index_override: Option<usize>,
    ) -> LbResult<(LbAlgorithm, Vec<Endpoint>)> {
        let start = Instant::now();
        let result =
            self.compute_management_server_list(host_id, data_center_id, host_order_index_override);
        histogram!(ASSIGNMENT_DURATION_SECONDS).record(start.elapsed().as_secs_f64());

        if let Err(e) = &result {
            counter!(ASSIGNMENT_FAILURES_TOTAL, "error" => e.error_type()).increment(1);
            warn!(host_id = ?host_id, data_center_id, error = %e, "Failed to compute management server list");
        }

        result
    }

    fn compute_management_server_list(
        &self,
        host_id: Option<HostId>,
        data_center_id: DataCenterId,
        host_order_index_override: Option<usize>,
    ) -> LbResult<(LbAlgorithm, Vec<Endpoint>)> {
        let endpoints = self.registry.current_endpoints(data_center_id)?;
        let algorithm = self.lb_algorithm(data_center_id)?;

        let host_order_index = match host_order_index_override {
            Some(index) => index,
            None if algorithm.strategy().needs_host_order() => {
                self.host_order_index(host_id, data_center_id)?
            }
            None => 0,
        };

        let ordered = assign(host_id, &endpoints, algorithm, host_order_index)?;

        counter!(ASSIGNMENTS_TOTAL, "algorithm" => algorithm.as_str()).increment(1);
        debug!(
            host_id = ?host_id,
            data_center_id,
            algorithm = %algorithm,
            host_order_index,
            endpoints = %Endpoint::join(&ordered),
            "Computed management server list"
        );

        Ok((algorithm, ordered))
    }

    /// Rank of `host_id` among the zone's candidate hosts, 0 when absent or unknown
    fn host_order_index(
        &self,
        host_id: Option<HostId>,
        data_center_id: DataCenterId,
    ) -> LbResult<usize> {
        let Some(host_id) = host_id else {
            return Ok(0);
        };

        let ordered = self.get_ordered_host_id_list(data_center_id, false)?;
        Ok(ordered.binary_search(&host_id).unwrap_or(0))
    }

    /// Candidate host ids of a zone in ascending order
    ///
    /// `include_disabled` adds hosts an operator disabled but whose agents may
    /// still be connected.
    pub fn get_ordered_host_id_list(
        &self,
        data_center_id: DataCenterId,
        include_disabled: bool,
    ) -> LbResult<Vec<HostId>> {
        let filter = Self::agent_host_filter(data_center_id, include_disabled);
        let mut host_ids = self.inventory.find_host_ids(&filter)?;
        host_ids.sort_unstable();
        host_ids.dedup();
        Ok(host_ids)
    }

    /// Filter selecting hosts that run indirect agents
    pub fn agent_host_filter(data_center_id: DataCenterId, include_disabled: bool) -> HostFilter {
        let mut resource_states = AGENT_RESOURCE_STATES.to_vec();
        if include_disabled {
            resource_states.push(ResourceState::Disabled);
        }

        HostFilter {
            data_center_id,
            cluster_id: None,
            resource_states,
            host_types: AGENT_HOST_TYPES.to_vec(),
            hypervisor_types: AGENT_HYPERVISOR_TYPES.to_vec(),
        }
    }

    /// Whether a list an agent reports still matches what it would be assigned now
    pub fn is_assignment_current(
        &self,
        host_id: HostId,
        data_center_id: DataCenterId,
        reported: &[Endpoint],
    ) -> LbResult<bool> {
        let (algorithm, expected) =
            self.resolve_management_server_list(Some(host_id), data_center_id, None)?;
        Ok(algorithm.strategy().compare(&expected, reported))
    }

    /// Algorithm effective for a zone
    pub fn lb_algorithm(&self, data_center_id: DataCenterId) -> LbResult<LbAlgorithm> {
        self.config.lb_algorithm(data_center_id).parse()
    }

    /// How often agents in a cluster re-check their preferred management server
    pub fn lb_check_interval(&self, cluster_id: Option<ClusterId>) -> Duration {
        self.config.lb_check_interval(cluster_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::LbConfig;
    use crate::core::error::LbError;
    use crate::core::types::HostIdentity;
    use crate::discovery::inventory::StaticHostInventory;

    fn host(id: HostId, dc: DataCenterId) -> HostIdentity {
        HostIdentity {
            id,
            data_center_id: dc,
            cluster_id: Some(1),
            hypervisor_type: HypervisorType::Kvm,
            host_type: HostType::Routing,
            resource_state: ResourceState::Enabled,
        }
    }

    fn balancer(algorithm: &str, hosts: Vec<HostIdentity>) -> (Arc<StaticHostInventory>, IndirectAgentLoadBalancer) {
        let mut config = LbConfig::default();
        config.management_server.addresses = "10.0.0.1,10.0.0.2,10.0.0.3".to_string();
        config.management_server.lb_algorithm = algorithm.to_string();
        let inventory = Arc::new(StaticHostInventory::from_hosts(hosts));
        let lb = IndirectAgentLoadBalancer::new(Arc::new(config), inventory.clone());
        (inventory, lb)
    }

    #[test]
    fn test_override_replaces_rank() {
        let (_, lb) = balancer("roundrobin", vec![host(1, 1), host(2, 1)]);
        assert_eq!(
            lb.get_management_server_list(Some(1), 1, Some(2)).unwrap(),
            vec!["10.0.0.3", "10.0.0.1", "10.0.0.2"]
        );
    }

    #[test]
    fn test_unknown_host_gets_rank_zero() {
        let (_, lb) = balancer("roundrobin", vec![host(5, 1), host(6, 1)]);
        assert_eq!(
            lb.get_management_server_list(Some(42), 1, None).unwrap(),
            lb.get_management_server_list(Some(5), 1, None).unwrap()
        );
    }

    #[test]
    fn test_rank_follows_host_set_changes() {
        let (inventory, lb) = balancer("roundrobin", vec![host(10, 1), host(20, 1), host(30, 1)]);
        assert_eq!(lb.get_management_server_list(Some(30), 1, None).unwrap()[0], "10.0.0.3");

        inventory.remove_host(10);
        assert_eq!(lb.get_management_server_list(Some(30), 1, None).unwrap()[0], "10.0.0.2");
    }

    #[test]
    fn test_hosts_of_other_zones_do_not_affect_rank() {
        let (_, lb) = balancer("roundrobin", vec![host(1, 2), host(2, 2), host(3, 1)]);
        assert_eq!(lb.get_management_server_list(Some(3), 1, None).unwrap()[0], "10.0.0.1");
    }

    #[test]
    fn test_ordered_host_ids_filters_agent_hosts() {
        let mut xen = host(3, 1);
        xen.hypervisor_type = HypervisorType::XenServer;
        let mut disabled = host(4, 1);
        disabled.resource_state = ResourceState::Disabled;
        let mut maintenance = host(5, 1);
        maintenance.resource_state = ResourceState::Maintenance;
        let mut lxc = host(6, 1);
        lxc.hypervisor_type = HypervisorType::Lxc;

        let (_, lb) = balancer("static", vec![host(2, 1), host(1, 1), xen, disabled, maintenance, lxc]);

        assert_eq!(lb.get_ordered_host_id_list(1, false).unwrap(), vec![1, 2, 5, 6]);
        assert_eq!(lb.get_ordered_host_id_list(1, true).unwrap(), vec![1, 2, 4, 5, 6]);
    }

    #[test]
    fn test_static_skips_inventory_failures() {
        struct FailingInventory;
        impl HostInventory for FailingInventory {
            fn find_host_ids(&self, _: &HostFilter) -> LbResult<Vec<HostId>> {
                Err(LbError::inventory("unreachable"))
            }
            fn find_host(&self, _: HostId) -> LbResult<Option<HostIdentity>> {
                Err(LbError::inventory("unreachable"))
            }
            fn data_center_ids(&self) -> LbResult<Vec<DataCenterId>> {
                Err(LbError::inventory("unreachable"))
            }
        }

        let mut config = LbConfig::default();
        config.management_server.addresses = "a,b".to_string();
        let lb = IndirectAgentLoadBalancer::new(Arc::new(config.clone()), Arc::new(FailingInventory));
        assert_eq!(lb.get_management_server_list(Some(1), 1, None).unwrap(), vec!["a", "b"]);

        config.management_server.lb_algorithm = "roundrobin".to_string();
        let lb = IndirectAgentLoadBalancer::new(Arc::new(config), Arc::new(FailingInventory));
        let err = lb.get_management_server_list(Some(1), 1, None).unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_is_assignment_current_reads_algorithm_once() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        /// Switches from static to roundrobin after the first algorithm read
        struct SwitchingConfig {
            reads: AtomicUsize,
        }

        impl ConfigProvider for SwitchingConfig {
            fn management_server_addresses(&self, _: DataCenterId) -> String {
                "a,b,c".to_string()
            }
            fn lb_algorithm(&self, _: DataCenterId) -> String {
                match self.reads.fetch_add(1, Ordering::SeqCst) {
                    0 => "static".to_string(),
                    _ => "roundrobin".to_string(),
                }
            }
            fn lb_check_interval(&self, _: Option<ClusterId>) -> Duration {
                Duration::ZERO
            }
        }

        let config = Arc::new(SwitchingConfig { reads: AtomicUsize::new(0) });
        let inventory = Arc::new(StaticHostInventory::from_hosts(vec![host(1, 1), host(2, 1)]));
        let lb = IndirectAgentLoadBalancer::new(config.clone(), inventory);

        let reported = Endpoint::parse_list("a,b,c");
        assert!(lb.is_assignment_current(2, 1, &reported).unwrap());
        assert_eq!(config.reads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_is_assignment_current() {
        let (_, lb) = balancer("roundrobin", vec![host(1, 1), host(2, 1)]);
        let reported_ok: Vec<Endpoint> = ["10.0.0.2", "10.0.0.3", "10.0.0.1"].into_iter().map(Endpoint::from).collect();
        let reported_stale: Vec<Endpoint> = ["10.0.0.1", "10.0.0.2", "10.0.0.3"].into_iter().map(Endpoint::from).collect();

        assert!(lb.is_assignment_current(2, 1, &reported_ok).unwrap());
        assert!(!lb.is_assignment_current(2, 1, &reported_stale).unwrap());

        let (_, lb) = balancer("shuffle", vec![host(1, 1)]);
        assert!(lb.is_assignment_current(1, 1, &reported_stale).unwrap());
    }

    #[test]
    fn test_lb_settings() {
        let (_, lb) = balancer("shuffle", vec![]);
        assert_eq!(lb.lb_algorithm(1).unwrap(), LbAlgorithm::Shuffle);
        assert_eq!(lb.lb_check_interval(Some(1)), Duration::ZERO);
    }
}
