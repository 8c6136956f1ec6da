//! # Assignment Algorithm
//!
//! Pure ordering of management server endpoints for one host. The selector is
//! read from configuration on every call, parsed into [`LbAlgorithm`] and
//! dispatched to the matching [`AssignmentStrategy`].
//!
//! ## Algorithms
//!
//! 1. **static**: every host receives the configured order
//! 2. **roundrobin**: the configured order rotated left by the host's rank
//! 3. **shuffle**: a fresh random permutation per call

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::trace;

use crate::core::error::{LbError, LbResult};
use crate::core::types::{Endpoint, HostId};
use crate::load_balancing::strategies::{
    AssignmentStrategy, RoundRobinAssignment, ShuffleAssignment, StaticAssignment,
};

/// Supported indirect agent load balancing algorithms
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LbAlgorithm {
    #[default]
    Static,
    #[serde(rename = "roundrobin")]
    RoundRobin,
    Shuffle,
}

impl LbAlgorithm {
    pub const ALL: [LbAlgorithm; 3] = [Self::Static, Self::RoundRobin, Self::Shuffle];

    /// Canonical configuration name
    pub fn as_str(&self) -> &'static str {
        self.strategy().name()
    }

    /// Strategy implementing this algorithm
    pub fn strategy(&self) -> &'static dyn AssignmentStrategy {
        match self {
            Self::Static => &StaticAssignment,
            Self::RoundRobin => &RoundRobinAssignment,
            Self::Shuffle => &ShuffleAssignment,
        }
    }
}

impl FromStr for LbAlgorithm {
    type Err = LbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|algorithm| algorithm.as_str() == s)
            .ok_or_else(|| LbError::invalid_algorithm(s))
    }
}

impl fmt::Display for LbAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order `endpoints` for one host
///
/// `host_order_index` is the host's rank among the zone's candidate hosts
/// (0 for an anonymous host); only round-robin uses it. `host_id` is carried
/// for tracing.
pub fn assign(
    host_id: Option<HostId>,
    endpoints: &[Endpoint],
    algorithm: LbAlgorithm,
    host_order_index: usize,
) -> LbResult<Vec<Endpoint>> {
    if endpoints.is_empty() {
        return Err(LbError::NoEndpoints);
    }

    let ordered = algorithm.strategy().sort(endpoints, host_order_index);

    trace!(
        host_id = ?host_id,
        algorithm = %algorithm,
        host_order_index,
        primary = %ordered[0],
        "Ordered management server endpoints"
    );

    Ok(ordered)
}
