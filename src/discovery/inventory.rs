//! # Host Inventory
//!
//! The load balancer never owns host records; it asks an inventory
//! collaborator for candidate host ids. [`StaticHostInventory`] is an
//! in-memory implementation for tests and the diagnostics binary.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::core::config::ConfigChangeEvent;
use crate::core::error::LbResult;
use crate::core::types::{
    ClusterId, DataCenterId, HostId, HostIdentity, HostType, HypervisorType, ResourceState,
};

/// Criteria for selecting candidate hosts
///
/// `cluster_id: None` means every cluster of the zone. An empty list means
/// the attribute is not filtered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostFilter {
    pub data_center_id: DataCenterId,
    pub cluster_id: Option<ClusterId>,
    pub resource_states: Vec<ResourceState>,
    pub host_types: Vec<HostType>,
    pub hypervisor_types: Vec<HypervisorType>,
}

impl HostFilter {
    /// Every host of a zone
    pub fn zone(data_center_id: DataCenterId) -> Self {
        Self {
            data_center_id,
            cluster_id: None,
            resource_states: Vec::new(),
            host_types: Vec::new(),
            hypervisor_types: Vec::new(),
        }
    }

    pub fn matches(&self, host: &HostIdentity) -> bool {
        host.data_center_id == self.data_center_id
            && self.cluster_id.map_or(true, |id| host.cluster_id == Some(id))
            && (self.resource_states.is_empty() || self.resource_states.contains(&host.resource_state))
            && (self.host_types.is_empty() || self.host_types.contains(&host.host_type))
            && (self.hypervisor_types.is_empty() || self.hypervisor_types.contains(&host.hypervisor_type))
    }
}

/// Query interface onto the platform's host records
///
/// Calls are synchronous and may block; callers needing timeouts wrap them.
pub trait HostInventory: Send + Sync {
    /// Ids of hosts matching `filter`, in no particular order
    fn find_host_ids(&self, filter: &HostFilter) -> LbResult<Vec<HostId>>;

    /// Look up a single host
    fn find_host(&self, host_id: HostId) -> LbResult<Option<HostIdentity>>;

    /// Zones that currently have hosts
    fn data_center_ids(&self) -> LbResult<Vec<DataCenterId>>;
}

/// In-memory inventory
#[derive(Default)]
pub struct StaticHostInventory {
    hosts: DashMap<HostId, HostIdentity>,
}

impl StaticHostInventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_hosts<I: IntoIterator<Item = HostIdentity>>(hosts: I) -> Self {
        let inventory = Self::new();
        for host in hosts {
            inventory.add_host(host);
        }
        inventory
    }

    /// Insert or replace a host
    pub fn add_host(&self, host: HostIdentity) {
        self.hosts.insert(host.id, host);
    }

    pub fn remove_host(&self, host_id: HostId) -> Option<HostIdentity> {
        self.hosts.remove(&host_id).map(|(_, host)| host)
    }

    /// Make the inventory hold exactly `hosts`
    pub fn replace_hosts<I: IntoIterator<Item = HostIdentity>>(&self, hosts: I) {
        let hosts: Vec<HostIdentity> = hosts.into_iter().collect();
        self.hosts.retain(|id, _| hosts.iter().any(|host| host.id == *id));
        for host in hosts {
            self.add_host(host);
        }
    }

    pub fn set_resource_state(&self, host_id: HostId, state: ResourceState) {
        if let Some(mut host) = self.hosts.get_mut(&host_id) {
            host.resource_state = state;
        }
    }

    /// Keep the inventory in step with the hosts of reloaded configurations
    ///
    /// Returns a receiver that sees each configuration change only after the
    /// inventory has been updated from it.
    pub fn follow_config(
        self: Arc<Self>,
        mut changes: broadcast::Receiver<ConfigChangeEvent>,
    ) -> broadcast::Receiver<ConfigChangeEvent> {
        let (sender, receiver) = broadcast::channel(16);

        tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(event) => {
                        self.replace_hosts(event.config.inventory.hosts.iter().cloned());
                        debug!(hosts = self.len(), "Synchronized host inventory with configuration");
                        if sender.send(event).is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Missed configuration change events while synchronizing inventory");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        receiver
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}

impl HostInventory for StaticHostInventory {
    fn find_host_ids(&self, filter: &HostFilter) -> LbResult<Vec<HostId>> {
        Ok(self
            .hosts
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| *entry.key())
            .collect())
    }

    fn find_host(&self, host_id: HostId) -> LbResult<Option<HostIdentity>> {
        Ok(self.hosts.get(&host_id).map(|entry| entry.value().clone()))
    }

    fn data_center_ids(&self) -> LbResult<Vec<DataCenterId>> {
        let mut ids: Vec<_> = self.hosts.iter().map(|entry| entry.data_center_id).collect();
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }
}
