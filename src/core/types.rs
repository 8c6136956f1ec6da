//! # Core Types
//!
//! Data structures shared by the registry, the inventory query, the
//! assignment algorithms and the coordinator.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a compute host
pub type HostId = u64;

/// Identifier of a zone (data center)
pub type DataCenterId = u64;

/// Identifier of a cluster within a zone
pub type ClusterId = u64;

/// A management server address an agent can connect to
///
/// The address is opaque to the service: either a bare host or `host:port`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Endpoint(String);

impl Endpoint {
    pub fn new<S: Into<String>>(address: S) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse a comma-separated address list
    ///
    /// Entries are trimmed, blank entries are skipped and repeated addresses
    /// keep only their first position, so the result never has duplicates.
    pub fn parse_list(csv: &str) -> Vec<Endpoint> {
        let mut endpoints: Vec<Endpoint> = Vec::new();
        for address in csv.split(',').map(str::trim).filter(|a| !a.is_empty()) {
            if !endpoints.iter().any(|e| e.0 == address) {
                endpoints.push(Endpoint::new(address));
            }
        }
        endpoints
    }

    /// Join endpoints back into the comma-separated wire form agents expect
    pub fn join(endpoints: &[Endpoint]) -> String {
        endpoints
            .iter()
            .map(Endpoint::as_str)
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Endpoint {
    fn from(address: &str) -> Self {
        Self::new(address)
    }
}

impl From<String> for Endpoint {
    fn from(address: String) -> Self {
        Self(address)
    }
}

impl PartialEq<str> for Endpoint {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for Endpoint {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Hypervisor running on a host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HypervisorType {
    #[serde(rename = "KVM")]
    Kvm,
    #[serde(rename = "LXC")]
    Lxc,
    XenServer,
    VMware,
    Hyperv,
    Simulator,
    External,
    None,
}

/// Role of a host in the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HostType {
    Routing,
    ConsoleProxy,
    SecondaryStorageVM,
    Storage,
    ExternalLoadBalancer,
}

/// Administrative state of a host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceState {
    Enabled,
    Disabled,
    Creating,
    PrepareForMaintenance,
    ErrorInPrepareForMaintenance,
    Maintenance,
    ErrorInMaintenance,
    Error,
    Degraded,
}

/// Read-only description of a host as supplied by the inventory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostIdentity {
    pub id: HostId,
    pub data_center_id: DataCenterId,
    #[serde(default)]
    pub cluster_id: Option<ClusterId>,
    pub hypervisor_type: HypervisorType,
    #[serde(default = "default_host_type")]
    pub host_type: HostType,
    #[serde(default = "default_resource_state")]
    pub resource_state: ResourceState,
}

fn default_host_type() -> HostType {
    HostType::Routing
}

fn default_resource_state() -> ResourceState {
    ResourceState::Enabled
}
