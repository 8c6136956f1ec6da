pub mod algorithm;
pub mod coordinator;
pub mod propagation;
pub mod strategies;

pub use algorithm::{assign, LbAlgorithm};
pub use coordinator::IndirectAgentLoadBalancer;
pub use propagation::{AgentNotifier, LoggingNotifier, MsListPropagator, MsListPush};
pub use strategies::{AssignmentStrategy, RoundRobinAssignment, ShuffleAssignment, StaticAssignment};
