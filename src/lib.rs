//! # Indirect Agent Load Balancer
//!
//! Assigns each compute host's indirect agent an ordered list of management
//! server endpoints to connect to and fail over across.
//!
//! ## Modules
//!
//! - `core`: errors, configuration and shared data types
//! - `discovery`: the endpoint registry and the host inventory seam
//! - `load_balancing`: assignment algorithms, the coordinator and propagation
//!   of changed lists to agents
//! - `observability`: logging setup and metric names
//!
//! The service is a library invoked in-process by the surrounding platform.
//! Configuration and host inventory are injected through the
//! [`ConfigProvider`] and [`HostInventory`] traits.

/// Errors, configuration and basic data structures
pub mod core;

/// Endpoint registry and host inventory query
pub mod discovery;

/// Assignment algorithms and the load balancer coordinator
pub mod load_balancing;

/// Structured logging and metrics
pub mod observability;

pub use crate::core::config::{ConfigManager, ConfigProvider, LbConfig};
pub use crate::core::error::{LbError, LbResult};
pub use crate::core::types::{ClusterId, DataCenterId, Endpoint, HostId, HostIdentity};
pub use crate::discovery::{EndpointRegistry, HostFilter, HostInventory, StaticHostInventory};
pub use crate::load_balancing::{IndirectAgentLoadBalancer, LbAlgorithm, MsListPropagator};
