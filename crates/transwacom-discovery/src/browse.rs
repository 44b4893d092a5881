//! mDNS browsing.

use std::collections::HashMap;
use std::sync::Arc;

use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::DiscoveryError;
use crate::table::{DiscoveredPeer, PeerTable};
use crate::{REFRESH_INTERVAL, SERVICE_TYPE};

/// Browses for consumer services and keeps a [`PeerTable`] current.
pub struct Browser {
    daemon: ServiceDaemon,
    drain_task: Option<JoinHandle<()>>,
    sweep_task: Option<JoinHandle<()>>,
}

impl Browser {
    /// Start browsing; resolved services land in `table`, and a sweep
    /// task evicts stale entries at the refresh interval.
    pub fn start(table: Arc<PeerTable>) -> Result<Self, DiscoveryError> {
        let daemon = ServiceDaemon::new().map_err(|e| DiscoveryError::Daemon(e.to_string()))?;
        let receiver = daemon
            .browse(SERVICE_TYPE)
            .map_err(|e| DiscoveryError::Browse(e.to_string()))?;

        let drain_table = Arc::clone(&table);
        let drain_task = tokio::spawn(async move {
            // The removal event only carries the service fullname, so
            // remember which table key each fullname produced.
            let mut by_fullname: HashMap<String, String> = HashMap::new();

            while let Ok(event) = receiver.recv_async().await {
                match event {
                    ServiceEvent::ServiceResolved(info) => {
                        if let Some(peer) = peer_from_service(&info) {
                            by_fullname
                                .insert(info.get_fullname().to_string(), peer.unique_id.clone());
                            drain_table.observe(peer);
                        }
                    }
                    ServiceEvent::ServiceRemoved(_, fullname) => {
                        if let Some(unique_id) = by_fullname.remove(&fullname) {
                            drain_table.remove(&unique_id);
                        }
                    }
                    other => debug!(?other, "discovery event"),
                }
            }
            debug!("mDNS browse channel closed");
        });

        let sweep_table = Arc::clone(&table);
        let sweep_task = tokio::spawn(async move {
            let mut tick = tokio::time::interval(REFRESH_INTERVAL);
            loop {
                tick.tick().await;
                sweep_table.evict_stale(tokio::time::Instant::now());
            }
        });

        info!(service = SERVICE_TYPE, "mDNS browsing started");
        Ok(Self {
            daemon,
            drain_task: Some(drain_task),
            sweep_task: Some(sweep_task),
        })
    }

    /// Stop browsing and cancel the background tasks.
    pub fn stop(&mut self) {
        if let Err(e) = self.daemon.stop_browse(SERVICE_TYPE) {
            warn!(error = %e, "failed to stop mDNS browse");
        }
        if let Some(task) = self.drain_task.take() {
            task.abort();
        }
        if let Some(task) = self.sweep_task.take() {
            task.abort();
        }
        info!("mDNS browsing stopped");
    }
}

impl Drop for Browser {
    fn drop(&mut self) {
        self.stop();
        let _ = self.daemon.shutdown();
    }
}

/// Convert a resolved service record into a peer entry.
fn peer_from_service(info: &ServiceInfo) -> Option<DiscoveredPeer> {
    let properties = info.get_properties();
    let port = info.get_port();

    let addresses = info.get_addresses();
    let address = addresses
        .iter()
        .find(|a| a.is_ipv4())
        .or_else(|| addresses.iter().next())
        .copied()?;

    let name = properties
        .get_property_val_str("name")
        .map_or_else(
            || info.get_fullname().split('.').next().unwrap_or("unknown").to_string(),
            ToString::to_string,
        );

    let capabilities = properties
        .get_property_val_str("capabilities")
        .unwrap_or("")
        .split(',')
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect();

    let version = properties
        .get_property_val_str("version")
        .unwrap_or("1.0")
        .to_string();

    Some(DiscoveredPeer {
        unique_id: format!("{address}:{port}"),
        name,
        address,
        port,
        capabilities,
        version,
        last_seen: tokio::time::Instant::now(),
    })
}
