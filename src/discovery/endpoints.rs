//! # Endpoint Registry
//!
//! Holds the ordered management server addresses per zone as read from the
//! configuration provider, and detects when they change.
//!
//! Reads ([`EndpointRegistry::current_endpoints`]) are pure: they parse the
//! live configuration value and never touch registry state. Change detection
//! happens only in [`EndpointRegistry::refresh`], which compares against the
//! last snapshot of the zone, bumps its epoch and broadcasts an
//! [`EndpointChangeEvent`] so agent-management code can push new lists.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use metrics::counter;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

use crate::core::config::ConfigProvider;
use crate::core::error::{LbError, LbResult};
use crate::core::types::{DataCenterId, Endpoint};
use crate::load_balancing::algorithm::LbAlgorithm;
use crate::observability::metrics::ENDPOINT_CHANGES_TOTAL;

/// Published when a zone's endpoint list or algorithm changes
#[derive(Debug, Clone, Serialize)]
pub struct EndpointChangeEvent {
    pub id: Uuid,
    pub data_center_id: DataCenterId,
    pub previous: Vec<Endpoint>,
    pub current: Vec<Endpoint>,
    pub algorithm: LbAlgorithm,
    pub epoch: u64,
    pub changed_at: DateTime<Utc>,
}

/// Type alias for endpoint change event receiver
pub type EndpointChangeReceiver = broadcast::Receiver<EndpointChangeEvent>;

#[derive(Debug, Clone)]
struct EndpointSnapshot {
    endpoints: Vec<Endpoint>,
    algorithm: LbAlgorithm,
    epoch: u64,
}

/// Per-zone view of the configured management server endpoints
pub struct EndpointRegistry {
    config: Arc<dyn ConfigProvider>,
    snapshots: DashMap<DataCenterId, EndpointSnapshot>,
    change_sender: broadcast::Sender<EndpointChangeEvent>,
}

impl EndpointRegistry {
    pub fn new(config: Arc<dyn ConfigProvider>) -> Self {
        let (change_sender, _) = broadcast::channel(64);
        Self {
            config,
            snapshots: DashMap::new(),
            change_sender,
        }
    }

    /// Ordered endpoints currently configured for a zone
    ///
    /// Fails with a configuration error when the effective address list is
    /// empty or blank.
    pub fn current_endpoints(&self, data_center_id: DataCenterId) -> LbResult<Vec<Endpoint>> {
        let addresses = self.config.management_server_addresses(data_center_id);
        let endpoints = Endpoint::parse_list(&addresses);

        if endpoints.is_empty() {
            return Err(LbError::config(format!(
                "No management server addresses defined for zone {}",
                data_center_id
            )));
        }

        Ok(endpoints)
    }

    /// Compare the zone's live settings with its last snapshot
    ///
    /// The first refresh of a zone records a baseline and returns `None`.
    /// Later refreshes return and broadcast an event when either the
    /// endpoint list or the algorithm differs. A zone first observed with
    /// unusable settings gets an empty baseline, so its first valid list is
    /// reported as a change.
    pub fn refresh(&self, data_center_id: DataCenterId) -> LbResult<Option<EndpointChangeEvent>> {
        let (endpoints, algorithm) = match self.live_settings(data_center_id) {
            Ok(settings) => settings,
            Err(e) => {
                self.snapshots.entry(data_center_id).or_insert_with(|| EndpointSnapshot {
                    endpoints: Vec::new(),
                    algorithm: LbAlgorithm::default(),
                    epoch: 0,
                });
                return Err(e);
            }
        };

        let event = match self.snapshots.entry(data_center_id) {
            Entry::Vacant(entry) => {
                debug!(data_center_id, endpoints = %Endpoint::join(&endpoints), "Recorded endpoint baseline");
                entry.insert(EndpointSnapshot { endpoints, algorithm, epoch: 0 });
                None
            }
            Entry::Occupied(mut entry) => {
                let snapshot = entry.get_mut();
                if snapshot.endpoints == endpoints && snapshot.algorithm == algorithm {
                    None
                } else {
                    let previous = std::mem::replace(&mut snapshot.endpoints, endpoints.clone());
                    snapshot.algorithm = algorithm;
                    snapshot.epoch += 1;

                    Some(EndpointChangeEvent {
                        id: Uuid::new_v4(),
                        data_center_id,
                        previous,
                        current: endpoints,
                        algorithm,
                        epoch: snapshot.epoch,
                        changed_at: Utc::now(),
                    })
                }
            }
        };

        if let Some(ref event) = event {
            counter!(ENDPOINT_CHANGES_TOTAL).increment(1);
            info!(
                data_center_id,
                epoch = event.epoch,
                algorithm = %event.algorithm,
                previous = %Endpoint::join(&event.previous),
                current = %Endpoint::join(&event.current),
                "Management server list changed"
            );
            // No subscribers is not an error
            let _ = self.change_sender.send(event.clone());
        }

        Ok(event)
    }

    fn live_settings(&self, data_center_id: DataCenterId) -> LbResult<(Vec<Endpoint>, LbAlgorithm)> {
        let endpoints = self.current_endpoints(data_center_id)?;
        let algorithm = self.config.lb_algorithm(data_center_id).parse()?;
        Ok((endpoints, algorithm))
    }

    /// Number of changes observed for a zone since its baseline
    pub fn epoch(&self, data_center_id: DataCenterId) -> u64 {
        self.snapshots
            .get(&data_center_id)
            .map(|snapshot| snapshot.epoch)
            .unwrap_or(0)
    }

    /// Subscribe to endpoint changes across all zones
    pub fn subscribe(&self) -> EndpointChangeReceiver {
        self.change_sender.subscribe()
    }
}
