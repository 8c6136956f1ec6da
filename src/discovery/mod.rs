//! Collaborator-facing inputs of the load balancer: the configured
//! management server endpoints and the host inventory.

pub mod endpoints;
pub mod inventory;

pub use endpoints::{EndpointChangeEvent, EndpointChangeReceiver, EndpointRegistry};
pub use inventory::{HostFilter, HostInventory, StaticHostInventory};
