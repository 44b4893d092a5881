//! Connection registry.
//!
//! Tracks outbound sessions (keyed by `unique_id`, at most one each) and
//! inbound sessions (keyed by validated host name, several sockets per
//! name). Both maps sit behind plain mutexes with small critical
//! sections: insert, remove, snapshot.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use transwacom_protocol::MessageSender;
use transwacom_types::Message;

use crate::error::DaemonError;
use crate::session::{now_timestamp, OutboundSession};

/// An outbound session plus its background tasks (liveness monitor and
/// batch forwarder), aborted together on removal.
pub struct OutboundEntry {
    pub session: Arc<tokio::sync::Mutex<OutboundSession>>,
    pub tasks: Vec<JoinHandle<()>>,
}

impl OutboundEntry {
    fn abort_tasks(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

/// One accepted inbound socket.
pub struct InboundHandle {
    pub addr: SocketAddr,
    close: watch::Sender<bool>,
    sender: Arc<tokio::sync::Mutex<MessageSender<OwnedWriteHalf>>>,
}

impl InboundHandle {
    #[must_use]
    pub fn new(
        addr: SocketAddr,
        close: watch::Sender<bool>,
        sender: Arc<tokio::sync::Mutex<MessageSender<OwnedWriteHalf>>>,
    ) -> Self {
        Self {
            addr,
            close,
            sender,
        }
    }

    /// Best-effort disconnect message, then signal the reader to stop.
    pub async fn disconnect(&self, reason: &str) {
        let msg = Message::Disconnect {
            reason: reason.to_string(),
            timestamp: now_timestamp(),
        };
        let _ = self.sender.lock().await.send(&msg).await;
        let _ = self.close.send(true);
    }
}

/// Registry of all live sessions in this process.
#[derive(Default)]
pub struct ConnectionRegistry {
    outbound: Mutex<HashMap<String, OutboundEntry>>,
    inbound: Mutex<HashMap<String, Vec<InboundHandle>>>,
}

impl ConnectionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // --- outbound ---

    /// Register an outbound session. At most one per `unique_id`.
    pub fn insert_outbound(
        &self,
        unique_id: &str,
        entry: OutboundEntry,
    ) -> Result<(), DaemonError> {
        let mut outbound = self.outbound.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if outbound.contains_key(unique_id) {
            return Err(DaemonError::AlreadyConnected(unique_id.to_string()));
        }
        outbound.insert(unique_id.to_string(), entry);
        Ok(())
    }

    /// Attach background tasks to an already-registered session. If the
    /// session is gone the tasks are aborted instead.
    pub fn attach_tasks(&self, unique_id: &str, tasks: Vec<JoinHandle<()>>) {
        let mut outbound = self.outbound.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        match outbound.get_mut(unique_id) {
            Some(entry) => entry.tasks.extend(tasks),
            None => {
                for task in tasks {
                    task.abort();
                }
            }
        }
    }

    /// Remove and return an outbound session, aborting its tasks.
    pub fn take_outbound(&self, unique_id: &str) -> Option<OutboundEntry> {
        let mut outbound = self.outbound.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut entry = outbound.remove(unique_id)?;
        entry.abort_tasks();
        Some(entry)
    }

    /// Remove every outbound session, aborting their tasks.
    pub fn drain_outbound(&self) -> Vec<OutboundEntry> {
        let mut outbound = self.outbound.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        outbound
            .drain()
            .map(|(_, mut entry)| {
                entry.abort_tasks();
                entry
            })
            .collect()
    }

    #[must_use]
    pub fn has_outbound(&self, unique_id: &str) -> bool {
        self.outbound
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .contains_key(unique_id)
    }

    #[must_use]
    pub fn outbound_ids(&self) -> Vec<String> {
        self.outbound
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    // --- inbound ---

    /// Register an accepted inbound socket under its validated host name.
    pub fn insert_inbound(&self, host_name: &str, handle: InboundHandle) {
        let mut inbound = self.inbound.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        inbound
            .entry(host_name.to_string())
            .or_default()
            .push(handle);
        info!(host = %host_name, "inbound session registered");
    }

    /// Drop one inbound socket; the host entry disappears with its last
    /// socket.
    pub fn remove_inbound(&self, host_name: &str, addr: SocketAddr) {
        let mut inbound = self.inbound.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(handles) = inbound.get_mut(host_name) {
            handles.retain(|h| h.addr != addr);
            if handles.is_empty() {
                inbound.remove(host_name);
                debug!(host = %host_name, "last inbound session removed");
            }
        }
    }

    /// Take every socket for one host (revocation path).
    pub fn take_inbound_host(&self, host_name: &str) -> Vec<InboundHandle> {
        self.inbound
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(host_name)
            .unwrap_or_default()
    }

    /// Take every inbound socket.
    pub fn drain_inbound(&self) -> Vec<InboundHandle> {
        self.inbound
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .drain()
            .flat_map(|(_, handles)| handles)
            .collect()
    }

    /// `(host name, socket count)` pairs for status display.
    #[must_use]
    pub fn inbound_hosts(&self) -> Vec<(String, usize)> {
        self.inbound
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .iter()
            .map(|(name, handles)| (name.clone(), handles.len()))
            .collect()
    }

    #[must_use]
    pub fn has_inbound(&self, host_name: &str) -> bool {
        self.inbound
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .contains_key(host_name)
    }
}
