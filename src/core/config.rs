//! # Configuration Module
//!
//! This module handles configuration management with hot reloading capabilities.
//! It provides the configuration structures, the [`ConfigProvider`] seam the
//! load balancer reads through, and the [`ConfigManager`] that keeps a live
//! snapshot in sync with the file on disk.
//!
//! ## Key Features
//! - YAML/JSON configuration parsing with serde
//! - Environment variable override support
//! - Per-zone overrides for addresses and algorithm, per-cluster check interval
//! - Hot reloading using file system watchers
//! - Validation that collects every problem into a single error

use notify::{recommended_watcher, Event, EventKind, RecursiveMode, Watcher};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use url::Url;

use crate::core::error::{LbError, LbResult};
use crate::core::types::{ClusterId, DataCenterId, HostIdentity};
use crate::load_balancing::algorithm::LbAlgorithm;

/// Source of the live settings the load balancer needs
///
/// Values are read on every call, so a provider backed by a reloadable
/// snapshot makes changes effective on the next assignment without restart.
pub trait ConfigProvider: Send + Sync {
    /// Comma-separated management server addresses effective for a zone
    fn management_server_addresses(&self, data_center_id: DataCenterId) -> String;

    /// Algorithm name effective for a zone (not yet validated)
    fn lb_algorithm(&self, data_center_id: DataCenterId) -> String;

    /// Interval at which agents re-check their preferred management server
    fn lb_check_interval(&self, cluster_id: Option<ClusterId>) -> Duration;
}

/// Top-level configuration for the assignment service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LbConfig {
    /// Global management server settings
    #[serde(default)]
    pub management_server: ManagementServerConfig,

    /// Zone-scoped overrides keyed by data center id
    #[serde(default)]
    pub zones: HashMap<DataCenterId, ZoneOverride>,

    /// Cluster-scoped overrides keyed by cluster id
    #[serde(default)]
    pub clusters: HashMap<ClusterId, ClusterOverride>,

    /// Logging settings
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Static host inventory, used when no external inventory is wired in
    #[serde(default)]
    pub inventory: InventoryConfig,
}

/// Global management server settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagementServerConfig {
    /// Comma-separated list of addresses handed to agents
    #[serde(default)]
    pub addresses: String,

    /// One of `static`, `roundrobin`, `shuffle`
    #[serde(default = "default_lb_algorithm")]
    pub lb_algorithm: String,

    /// Zero disables the agent-side preferred host check
    #[serde(default, with = "humantime_serde")]
    pub lb_check_interval: Duration,
}

impl Default for ManagementServerConfig {
    fn default() -> Self {
        Self {
            addresses: String::new(),
            lb_algorithm: default_lb_algorithm(),
            lb_check_interval: Duration::ZERO,
        }
    }
}

fn default_lb_algorithm() -> String {
    LbAlgorithm::Static.as_str().to_string()
}

/// Zone-scoped overrides
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ZoneOverride {
    #[serde(default)]
    pub addresses: Option<String>,
    #[serde(default)]
    pub lb_algorithm: Option<String>,
}

/// Cluster-scoped overrides
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterOverride {
    #[serde(default, with = "humantime_serde")]
    pub lb_check_interval: Option<Duration>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default level for this crate when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

impl std::str::FromStr for LogFormat {
    type Err = LbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            other => Err(crate::config_error!("Unknown log format '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InventoryConfig {
    #[serde(default)]
    pub hosts: Vec<HostIdentity>,
}

impl LbConfig {
    /// Load configuration from a file, choosing JSON or YAML by extension
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> LbResult<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await?;

        let mut config = if path.extension().and_then(|s| s.to_str()) == Some("json") {
            Self::from_json_str(&content)?
        } else {
            Self::from_yaml_str(&content)?
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse YAML without applying overrides or validation
    pub fn from_yaml_str(content: &str) -> LbResult<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Parse JSON without applying overrides or validation
    pub fn from_json_str(content: &str) -> LbResult<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Apply environment variable overrides to configuration
    ///
    /// Variables follow the pattern `AGENT_LB_<FIELD>`, for example
    /// `AGENT_LB_ALGORITHM=roundrobin`.
    pub fn apply_env_overrides(&mut self) -> LbResult<()> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> LbResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addresses) = lookup("AGENT_LB_MS_ADDRESSES") {
            self.management_server.addresses = addresses;
        }

        if let Some(algorithm) = lookup("AGENT_LB_ALGORITHM") {
            self.management_server.lb_algorithm = algorithm;
        }

        if let Some(interval) = lookup("AGENT_LB_CHECK_INTERVAL") {
            self.management_server.lb_check_interval = humantime::parse_duration(&interval)
                .map_err(|e| crate::config_error!("Invalid AGENT_LB_CHECK_INTERVAL: {}", e))?;
        }

        if let Some(level) = lookup("AGENT_LB_LOG_LEVEL") {
            self.observability.logging.level = level;
        }

        if let Some(format) = lookup("AGENT_LB_LOG_FORMAT") {
            self.observability.logging.format = format.parse()?;
        }

        Ok(())
    }

    /// Configuration validation with detailed error messages
    ///
    /// An empty global address list is accepted here; it only fails when an
    /// assignment is requested, so a fresh deployment can start before the
    /// addresses are known.
    pub fn validate(&self) -> LbResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = self.management_server.lb_algorithm.parse::<LbAlgorithm>() {
            errors.push(e.to_string());
        }
        errors.extend(invalid_addresses(
            &self.management_server.addresses,
            "management_server.addresses",
        ));

        let mut zone_ids: Vec<_> = self.zones.keys().copied().collect();
        zone_ids.sort_unstable();
        for zone_id in zone_ids {
            let zone = &self.zones[&zone_id];
            if let Some(ref algorithm) = zone.lb_algorithm {
                if let Err(e) = algorithm.parse::<LbAlgorithm>() {
                    errors.push(format!("zones.{}: {}", zone_id, e));
                }
            }
            if let Some(ref addresses) = zone.addresses {
                errors.extend(invalid_addresses(
                    addresses,
                    &format!("zones.{}.addresses", zone_id),
                ));
            }
        }

        let mut seen = std::collections::HashSet::new();
        for host in &self.inventory.hosts {
            if !seen.insert(host.id) {
                errors.push(format!("inventory.hosts: duplicate host id {}", host.id));
            }
        }

        if !errors.is_empty() {
            return Err(LbError::config(format!(
                "Configuration validation failed: {}",
                errors.join("; ")
            )));
        }

        Ok(())
    }
}

/// Check each comma-separated entry is a plain host or `host:port`
fn invalid_addresses(csv: &str, field: &str) -> Vec<String> {
    csv.split(',')
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .filter(|a| !is_valid_address(a))
        .map(|a| format!("{}: invalid management server address '{}'", field, a))
        .collect()
}

fn is_valid_address(address: &str) -> bool {
    match Url::parse(&format!("tcp://{}", address)) {
        Ok(url) => {
            url.host_str().map_or(false, |h| !h.is_empty())
                && url.username().is_empty()
                && url.password().is_none()
                && url.path().is_empty()
                && url.query().is_none()
                && url.fragment().is_none()
        }
        Err(_) => false,
    }
}

impl ConfigProvider for LbConfig {
    fn management_server_addresses(&self, data_center_id: DataCenterId) -> String {
        self.zones
            .get(&data_center_id)
            .and_then(|zone| zone.addresses.clone())
            .unwrap_or_else(|| self.management_server.addresses.clone())
    }

    fn lb_algorithm(&self, data_center_id: DataCenterId) -> String {
        self.zones
            .get(&data_center_id)
            .and_then(|zone| zone.lb_algorithm.clone())
            .unwrap_or_else(|| self.management_server.lb_algorithm.clone())
    }

    fn lb_check_interval(&self, cluster_id: Option<ClusterId>) -> Duration {
        cluster_id
            .and_then(|id| self.clusters.get(&id))
            .and_then(|cluster| cluster.lb_check_interval)
            .unwrap_or(self.management_server.lb_check_interval)
    }
}

/// Configuration change event
#[derive(Debug, Clone)]
pub struct ConfigChangeEvent {
    /// Path of the changed configuration file
    pub file_path: PathBuf,
    /// New configuration
    pub config: LbConfig,
    /// Timestamp of the change
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Configuration manager with hot reloading capabilities
///
/// Holds the current configuration behind a lock so that synchronous readers
/// (the [`ConfigProvider`] implementation) always see a complete snapshot.
pub struct ConfigManager {
    current_config: Arc<RwLock<LbConfig>>,
    config_path: PathBuf,
    _watcher: Option<notify::RecommendedWatcher>,
    change_sender: broadcast::Sender<ConfigChangeEvent>,
}

impl ConfigManager {
    /// Load the configuration file without watching it
    pub async fn load<P: AsRef<Path>>(config_path: P) -> LbResult<Self> {
        let config_path = config_path.as_ref().to_path_buf();
        let config = LbConfig::load_from_file(&config_path).await?;
        let (change_sender, _) = broadcast::channel(16);

        Ok(Self {
            current_config: Arc::new(RwLock::new(config)),
            config_path,
            _watcher: None,
            change_sender,
        })
    }

    /// Load the configuration file and reload it whenever it changes on disk
    pub async fn watch<P: AsRef<Path>>(config_path: P) -> LbResult<Self> {
        let mut manager = Self::load(config_path).await?;
        manager.setup_file_watcher()?;
        Ok(manager)
    }

    /// Get a copy of the current configuration
    pub fn get_config(&self) -> LbConfig {
        self.current_config.read().clone()
    }

    /// Subscribe to configuration changes
    pub fn subscribe_to_changes(&self) -> broadcast::Receiver<ConfigChangeEvent> {
        self.change_sender.subscribe()
    }

    /// Manually reload configuration from file
    pub async fn reload_config(&self) -> LbResult<()> {
        tracing::info!(path = %self.config_path.display(), "Manually reloading configuration");
        let new_config = LbConfig::load_from_file(&self.config_path).await?;
        Self::apply(&self.current_config, &self.change_sender, &self.config_path, new_config);
        Ok(())
    }

    /// Replace the configuration in memory and notify subscribers
    pub fn update_config(&self, new_config: LbConfig) -> LbResult<()> {
        new_config.validate()?;
        Self::apply(&self.current_config, &self.change_sender, &self.config_path, new_config);
        Ok(())
    }

    fn apply(
        current: &RwLock<LbConfig>,
        sender: &broadcast::Sender<ConfigChangeEvent>,
        path: &Path,
        new_config: LbConfig,
    ) {
        *current.write() = new_config.clone();

        let change_event = ConfigChangeEvent {
            file_path: path.to_path_buf(),
            config: new_config,
            timestamp: chrono::Utc::now(),
        };

        // No subscribers is not an error
        let _ = sender.send(change_event);
        tracing::info!("Configuration updated successfully");
    }

    /// Watch the parent directory of the configuration file
    ///
    /// Editors often write a temporary file and rename it over the original,
    /// which a watch on the file itself would miss.
    fn setup_file_watcher(&mut self) -> LbResult<()> {
        let config_path = self.config_path.clone();
        let current_config = Arc::clone(&self.current_config);
        let change_sender = self.change_sender.clone();

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        let mut watcher = recommended_watcher(move |res: Result<Event, notify::Error>| {
            if let Ok(event) = res {
                let _ = tx.send(event);
            }
        })
        .map_err(|e| LbError::config(format!("Failed to create file watcher: {}", e)))?;

        let watch_dir = match config_path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        watcher
            .watch(&watch_dir, RecursiveMode::NonRecursive)
            .map_err(|e| LbError::config(format!("Failed to watch config directory: {}", e)))?;

        self._watcher = Some(watcher);

        let config_file_name = config_path
            .file_name()
            .ok_or_else(|| LbError::config("Invalid config file path"))?
            .to_owned();

        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let is_config_file_event = event.paths.iter().any(|path| {
                    path.file_name() == Some(config_file_name.as_os_str())
                });

                if !is_config_file_event {
                    continue;
                }

                if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                    continue;
                }

                tracing::info!("Configuration file changed, reloading");

                // Let the writer finish before reading
                tokio::time::sleep(Duration::from_millis(100)).await;

                match LbConfig::load_from_file(&config_path).await {
                    Ok(new_config) => {
                        let unchanged = *current_config.read() == new_config;
                        if unchanged {
                            continue;
                        }
                        Self::apply(&current_config, &change_sender, &config_path, new_config);
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to reload configuration, keeping previous");
                    }
                }
            }
        });

        Ok(())
    }
}

impl ConfigProvider for ConfigManager {
    fn management_server_addresses(&self, data_center_id: DataCenterId) -> String {
        self.current_config.read().management_server_addresses(data_center_id)
    }

    fn lb_algorithm(&self, data_center_id: DataCenterId) -> String {
        self.current_config.read().lb_algorithm(data_center_id)
    }

    fn lb_check_interval(&self, cluster_id: Option<ClusterId>) -> Duration {
        self.current_config.read().lb_check_interval(cluster_id)
    }
}
