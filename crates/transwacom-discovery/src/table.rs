//! In-memory table of discovered peers.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Mutex;

use tokio::time::Instant;
use tracing::debug;

use crate::staleness_cutoff;

/// A consumer observed on the network. Held only in memory.
#[derive(Debug, Clone)]
pub struct DiscoveredPeer {
    /// `"address:port"`, the wire-level key for outbound sessions.
    pub unique_id: String,
    pub name: String,
    pub address: IpAddr,
    pub port: u16,
    pub capabilities: Vec<String>,
    pub version: String,
    pub last_seen: Instant,
}

/// Shared registry of discovered peers, keyed by `unique_id`.
///
/// Browse events refresh `last_seen`; a background sweep evicts entries
/// that have not been refreshed within the staleness cutoff. The local
/// peer's own advertisement is filtered out by (name, port).
#[derive(Debug, Default)]
pub struct PeerTable {
    peers: Mutex<HashMap<String, DiscoveredPeer>>,
    own: Mutex<Option<(String, u16)>>,
}

impl PeerTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record our own advertised identity so we never list ourselves.
    pub fn set_own_identity(&self, name: &str, port: u16) {
        *self.own.lock().unwrap_or_else(std::sync::PoisonError::into_inner) =
            Some((name.to_string(), port));
    }

    /// Insert or refresh a peer record.
    pub fn observe(&self, peer: DiscoveredPeer) {
        if let Some((own_name, own_port)) =
            self.own.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clone()
        {
            if peer.name == own_name && peer.port == own_port {
                debug!(peer = %peer.unique_id, "ignoring our own advertisement");
                return;
            }
        }

        let mut peers = self.peers.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        debug!(peer = %peer.unique_id, name = %peer.name, "peer observed");
        peers.insert(peer.unique_id.clone(), peer);
    }

    /// Remove a peer whose advertisement was withdrawn.
    pub fn remove(&self, unique_id: &str) {
        let mut peers = self.peers.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if peers.remove(unique_id).is_some() {
            debug!(peer = %unique_id, "peer withdrawn");
        }
    }

    /// Drop entries not refreshed within the staleness cutoff.
    pub fn evict_stale(&self, now: Instant) {
        let cutoff = staleness_cutoff();
        let mut peers = self.peers.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        peers.retain(|id, peer| {
            let fresh = now.duration_since(peer.last_seen) <= cutoff;
            if !fresh {
                debug!(peer = %id, "evicting stale peer");
            }
            fresh
        });
    }

    /// Current peers, sorted by name for stable menus.
    #[must_use]
    pub fn snapshot(&self) -> Vec<DiscoveredPeer> {
        let peers = self.peers.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut list: Vec<DiscoveredPeer> = peers.values().cloned().collect();
        list.sort_by(|a, b| a.name.cmp(&b.name));
        list
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.peers.lock().unwrap_or_else(std::sync::PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
