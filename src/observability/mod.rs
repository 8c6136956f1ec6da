//! Logging and metrics for the load balancer.

pub mod logging;
pub mod metrics;

pub use logging::init_logging;
