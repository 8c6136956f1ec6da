//! # Error Handling Module
//!
//! All failures of the assignment service are expressed through [`LbError`],
//! derived with `thiserror`. Every error propagates synchronously to the
//! immediate caller: the service never retries internally and never returns a
//! partially ordered endpoint list.
//!
//! ## Error Taxonomy
//!
//! - `Configuration`: the endpoint list is empty/blank, or the configuration
//!   file could not be loaded or validated
//! - `InvalidAlgorithm`: the configured selector is not `static`,
//!   `roundrobin` or `shuffle`
//! - `NoEndpoints`: the algorithm layer was handed an empty list
//! - `Inventory`: the host inventory collaborator failed
//! - `AgentNotification`: pushing a list to an agent failed

use thiserror::Error;

/// Main result type used throughout the service
pub type LbResult<T> = Result<T, LbError>;

/// Error types for the indirect-agent load balancer
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LbError {
    /// Missing or empty management server addresses, unreadable or invalid config
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Unrecognized load balancing algorithm name
    #[error("Invalid indirect agent LB algorithm '{name}', expected one of: static, roundrobin, shuffle")]
    InvalidAlgorithm { name: String },

    /// Algorithm invoked with no endpoints to order
    #[error("No management server endpoints to assign")]
    NoEndpoints,

    /// Host inventory query failures
    #[error("Host inventory error: {message}")]
    Inventory { message: String },

    /// Failure pushing an endpoint list to a connected agent
    #[error("Failed to notify agent of host {host_id}: {message}")]
    AgentNotification { host_id: u64, message: String },

    /// I/O errors while reading configuration
    #[error("I/O error: {message}")]
    Io { message: String },

    /// JSON serialization/deserialization errors
    #[error("JSON error: {message}")]
    Json { message: String },

    /// YAML parsing errors for configuration files
    #[error("YAML error: {message}")]
    Yaml { message: String },
}

impl LbError {
    /// Create a configuration error with a custom message
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an invalid algorithm error for the given selector
    pub fn invalid_algorithm<S: Into<String>>(name: S) -> Self {
        Self::InvalidAlgorithm { name: name.into() }
    }

    /// Create an inventory error with a custom message
    pub fn inventory<S: Into<String>>(message: S) -> Self {
        Self::Inventory {
            message: message.into(),
        }
    }

    /// Create an agent notification error for a host
    pub fn agent_notification<S: Into<String>>(host_id: u64, message: S) -> Self {
        Self::AgentNotification {
            host_id,
            message: message.into(),
        }
    }

    /// Check if the failure is transient
    ///
    /// Configuration and algorithm errors are permanent until an operator
    /// changes the configuration; collaborator failures may succeed later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Inventory { .. } | Self::AgentNotification { .. } | Self::Io { .. }
        )
    }

    /// Get a string representation of the error type for logs and metric labels
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "configuration_error",
            Self::InvalidAlgorithm { .. } => "invalid_algorithm",
            Self::NoEndpoints => "no_endpoints",
            Self::Inventory { .. } => "inventory_error",
            Self::AgentNotification { .. } => "agent_notification_error",
            Self::Io { .. } => "io_error",
            Self::Json { .. } => "json_error",
            Self::Yaml { .. } => "yaml_error",
        }
    }
}

impl From<std::io::Error> for LbError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for LbError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json {
            message: err.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for LbError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Yaml {
            message: err.to_string(),
        }
    }
}

/// Convenience macro for creating configuration errors
///
/// Usage: `config_error!("Invalid address: {}", addr)`
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::core::error::LbError::config(format!($($arg)*))
    };
}
