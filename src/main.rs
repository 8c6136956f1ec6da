//! # agent-lb - Diagnostics Entry Point
//!
//! Loads a configuration file with a static host inventory and prints, per
//! zone, the ordered host ids and the management server list every agent
//! host would receive.
//!
//! ```text
//! agent-lb [--watch] [--metrics] [CONFIG]
//! ```
//!
//! `CONFIG` defaults to `$AGENT_LB_CONFIG`, then `agent-lb.yaml`. With
//! `--watch` the process stays resident, reloads the file on change and logs
//! the lists that would be pushed to agents, keeping the host inventory in
//! step with the reloaded file. `--metrics` prints a Prometheus scrape before
//! exiting.

use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use indirect_agent_lb::load_balancing::{LoggingNotifier, MsListPropagator};
use indirect_agent_lb::observability::{init_logging, metrics::install_prometheus_recorder};
use indirect_agent_lb::{
    ConfigManager, DataCenterId, Endpoint, HostId, HostInventory, IndirectAgentLoadBalancer,
    StaticHostInventory,
};

#[derive(Debug, Parser)]
#[command(
    name = "agent-lb",
    version,
    about = "Show and follow management server assignments for indirect agents"
)]
struct Args {
    /// Stay resident, reload the configuration on change and log pushes
    #[arg(long)]
    watch: bool,

    /// Print a Prometheus scrape before exiting
    #[arg(long)]
    metrics: bool,

    /// Configuration file (YAML, or JSON by extension)
    #[arg(value_name = "CONFIG", env = "AGENT_LB_CONFIG", default_value = "agent-lb.yaml")]
    config_path: PathBuf,
}

#[derive(Serialize)]
struct ZoneReport {
    data_center_id: DataCenterId,
    algorithm: String,
    host_ids: Vec<HostId>,
    assignments: Vec<HostAssignment>,
}

#[derive(Serialize)]
struct HostAssignment {
    host_id: Option<HostId>,
    endpoints: Vec<Endpoint>,
}

fn zone_report(
    lb: &IndirectAgentLoadBalancer,
    data_center_id: DataCenterId,
) -> anyhow::Result<ZoneReport> {
    let algorithm = lb.lb_algorithm(data_center_id)?;
    let host_ids = lb.get_ordered_host_id_list(data_center_id, false)?;

    let mut assignments = Vec::with_capacity(host_ids.len() + 1);
    for host_id in host_ids.iter().copied().map(Some).chain(std::iter::once(None)) {
        let endpoints = lb
            .get_management_server_list(host_id, data_center_id, None)
            .with_context(|| format!("assigning host {:?} in zone {}", host_id, data_center_id))?;
        assignments.push(HostAssignment { host_id, endpoints });
    }

    Ok(ZoneReport {
        data_center_id,
        algorithm: algorithm.to_string(),
        host_ids,
        assignments,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let manager = if args.watch {
        ConfigManager::watch(&args.config_path).await
    } else {
        ConfigManager::load(&args.config_path).await
    }
    .with_context(|| format!("loading {}", args.config_path.display()))?;
    let manager = Arc::new(manager);

    let config = manager.get_config();
    init_logging(&config.observability.logging)?;
    let metrics_handle = if args.metrics {
        Some(install_prometheus_recorder()?)
    } else {
        None
    };

    info!(version = env!("CARGO_PKG_VERSION"), config = %args.config_path.display(), "Starting agent-lb");

    let inventory = Arc::new(StaticHostInventory::from_hosts(config.inventory.hosts.clone()));
    let lb = Arc::new(IndirectAgentLoadBalancer::new(manager.clone(), inventory.clone()));

    let mut reports = Vec::new();
    for data_center_id in inventory.data_center_ids()? {
        reports.push(zone_report(&lb, data_center_id)?);
    }
    println!("{}", serde_json::to_string_pretty(&reports)?);

    if args.watch {
        let changes = inventory.clone().follow_config(manager.subscribe_to_changes());
        let propagator = Arc::new(MsListPropagator::new(lb.clone(), Arc::new(LoggingNotifier)));
        let task = propagator.spawn(changes);

        info!("Watching configuration for changes, press Ctrl-C to stop");
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for shutdown signal");
        }
        task.abort();
    }

    if let Some(handle) = metrics_handle {
        print!("{}", handle.render());
    }

    Ok(())
}
