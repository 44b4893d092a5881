//! Process-wide supervisor.
//!
//! One supervisor owns every long-lived resource: configuration, the
//! session registry, the injector, discovery, and (on the host side) the
//! capture manager. The UI and signal handlers hold only a handle to it;
//! `emergency_cleanup` is the single funnel every exit path goes
//! through.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{info, warn};
use transwacom_discovery::{Advertiser, Browser, DiscoveredPeer, PeerTable};
use transwacom_input::InputInjector;
use transwacom_types::{DeviceType, MachineIdentity};

use crate::authorize::AuthorizationPrompt;
use crate::config::ConfigManager;
use crate::error::DaemonError;
use crate::notify::Notifier;
use crate::registry::ConnectionRegistry;
use crate::server::{ConsumerServer, ServerContext};

#[cfg(feature = "linux")]
use transwacom_input::linux::CaptureManager;

/// Cadence of the per-session liveness probe.
pub const PROBE_INTERVAL: Duration = Duration::from_secs(2);

/// Snapshot of the peer's current activity, for status displays.
#[derive(Debug, Clone)]
pub struct SupervisorStatus {
    /// `unique_id` of each outbound session.
    pub outbound: Vec<String>,
    /// `(host name, socket count)` per inbound peer.
    pub inbound: Vec<(String, usize)>,
    pub discovered_peers: usize,
}

/// Owns all long-lived resources of the peer process.
pub struct Supervisor {
    config: Arc<Mutex<ConfigManager>>,
    identity: MachineIdentity,
    registry: Arc<ConnectionRegistry>,
    injector: Arc<tokio::sync::Mutex<Box<dyn InputInjector>>>,
    notifier: Arc<dyn Notifier>,
    prompt: Arc<dyn AuthorizationPrompt>,
    peers: Arc<PeerTable>,
    #[cfg(feature = "linux")]
    captures: Arc<CaptureManager>,
    advertiser: Mutex<Option<Advertiser>>,
    browser: Mutex<Option<Browser>>,
    server: Mutex<Option<ConsumerServer>>,
}

impl Supervisor {
    pub fn new(
        config: ConfigManager,
        injector: Box<dyn InputInjector>,
        prompt: Arc<dyn AuthorizationPrompt>,
        notifier: Arc<dyn Notifier>,
    ) -> Arc<Self> {
        let identity = config.identity().clone();
        Arc::new(Self {
            config: Arc::new(Mutex::new(config)),
            identity,
            registry: Arc::new(ConnectionRegistry::new()),
            injector: Arc::new(tokio::sync::Mutex::new(injector)),
            notifier,
            prompt,
            peers: Arc::new(PeerTable::new()),
            #[cfg(feature = "linux")]
            captures: Arc::new(CaptureManager::new()),
            advertiser: Mutex::new(None),
            browser: Mutex::new(None),
            server: Mutex::new(None),
        })
    }

    #[must_use]
    pub fn identity(&self) -> &MachineIdentity {
        &self.identity
    }

    #[must_use]
    pub fn config(&self) -> Arc<Mutex<ConfigManager>> {
        Arc::clone(&self.config)
    }

    #[must_use]
    pub fn registry(&self) -> Arc<ConnectionRegistry> {
        Arc::clone(&self.registry)
    }

    /// Start the consumer role: listen, then advertise over mDNS.
    pub async fn start_consumer(
        self: &Arc<Self>,
        port_override: Option<u16>,
        bind_addr: Option<SocketAddr>,
    ) -> Result<SocketAddr, DaemonError> {
        let (port, mdns_name, capabilities) = {
            let config = self.config.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            let mut capabilities = Vec::new();
            if config.is_device_enabled(DeviceType::Wacom) {
                capabilities.push("wacom");
            }
            if config.is_device_enabled(DeviceType::Joystick) {
                capabilities.push("joystick");
            }
            (
                port_override.unwrap_or_else(|| config.consumer_port()),
                config.mdns_name(),
                capabilities,
            )
        };

        let addr = bind_addr
            .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], port)));
        let ctx = ServerContext {
            config: Arc::clone(&self.config),
            identity: self.identity.clone(),
            prompt: Arc::clone(&self.prompt),
            injector: Arc::clone(&self.injector),
            registry: Arc::clone(&self.registry),
            notifier: Arc::clone(&self.notifier),
        };
        let server = ConsumerServer::bind(addr, ctx).await?;
        let local_addr = server.local_addr();

        self.peers.set_own_identity(&mdns_name, local_addr.port());

        // A loopback bind is reachable only on this machine, so there is
        // nothing to announce to the LAN.
        if !local_addr.ip().is_loopback() {
            match Advertiser::new() {
                Ok(mut advertiser) => {
                    if let Err(e) = advertiser.publish(&mdns_name, local_addr.port(), &capabilities)
                    {
                        warn!(error = %e, "mDNS publish failed; running without advertisement");
                    } else {
                        *self
                            .advertiser
                            .lock()
                            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(advertiser);
                    }
                }
                Err(e) => warn!(error = %e, "mDNS unavailable"),
            }
        }

        *self.server.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = Some(server);
        info!(addr = %local_addr, name = %mdns_name, "consumer role started");
        Ok(local_addr)
    }

    /// Start browsing for other consumers.
    pub fn start_discovery(&self) -> Result<(), DaemonError> {
        let mut browser = self.browser.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if browser.is_none() {
            *browser = Some(Browser::start(Arc::clone(&self.peers))?);
        }
        Ok(())
    }

    #[must_use]
    pub fn discovered_peers(&self) -> Vec<DiscoveredPeer> {
        self.peers.snapshot()
    }

    #[must_use]
    pub fn status(&self) -> SupervisorStatus {
        SupervisorStatus {
            outbound: self.registry.outbound_ids(),
            inbound: self.registry.inbound_hosts(),
            discovered_peers: self.peers.len(),
        }
    }

    /// Revoke trust for a host and tear down its inbound sessions.
    pub async fn revoke_host(&self, host_name: &str) -> Result<(), DaemonError> {
        self.config
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove_trusted_host(host_name)?;
        for handle in self.registry.take_inbound_host(host_name) {
            handle.disconnect("revoked").await;
        }
        Ok(())
    }

    /// Release every resource. Every step tolerates already-released
    /// state, so calling this more than once is safe; signal handlers
    /// and the normal exit path both funnel here.
    pub async fn emergency_cleanup(&self) {
        info!("emergency cleanup");

        // 1. Cancel timers: draining the registry aborts each session's
        //    liveness monitor and batch forwarder.
        let outbound = self.registry.drain_outbound();

        // 2. Stop captures; this restores tablet mode and local input.
        #[cfg(feature = "linux")]
        self.captures.stop_all().await;

        // 3. Destroy virtual devices.
        if let Err(e) = self.injector.lock().await.destroy_all().await {
            warn!(error = %e, "failed to destroy virtual devices");
        }

        // 4. Close session sockets with best-effort disconnects.
        if let Some(mut server) = self
            .server
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take()
        {
            server.shutdown();
        }
        for entry in outbound {
            entry.session.lock().await.stop("shutdown").await;
        }
        for handle in self.registry.drain_inbound() {
            handle.disconnect("shutdown").await;
        }

        // 5. Unpublish mDNS.
        if let Some(mut advertiser) = self
            .advertiser
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take()
        {
            advertiser.unpublish();
        }

        // 6. Stop discovery.
        if let Some(mut browser) = self
            .browser
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take()
        {
            browser.stop();
        }

        info!("cleanup complete");
    }
}

#[cfg(feature = "linux")]
mod host_side {
    use std::path::Path;

    use tokio::sync::mpsc;
    use tracing::{info, warn};
    use transwacom_input::CaptureOptions;
    use transwacom_types::DeviceDescriptor;

    use super::{Arc, DaemonError, Duration, Supervisor, PROBE_INTERVAL};
    use crate::registry::OutboundEntry;
    use crate::session::OutboundSession;

    impl Supervisor {
        /// Share one device with a consumer: connect, authorise, start
        /// the capture, and watch the link.
        pub async fn start_share(
            self: &Arc<Self>,
            addr: std::net::SocketAddr,
            device: DeviceDescriptor,
            options: CaptureOptions,
        ) -> Result<(), DaemonError> {
            let unique_id = addr.to_string();
            if self.registry.has_outbound(&unique_id) {
                return Err(DaemonError::AlreadyConnected(unique_id));
            }

            let mut session =
                OutboundSession::connect(addr, &self.identity, device.clone()).await?;
            let consumer_name = session.consumer_name().to_string();

            // A consumer pinned in the trust registry may be limited to
            // certain device classes.
            let class_allowed = {
                let config = self
                    .config
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner);
                !config.is_consumer_trusted(&consumer_name, session.consumer_id())
                    || config
                        .allowed_devices_for_consumer(&consumer_name)
                        .iter()
                        .any(|class| class == device.device_type.as_str())
            };
            if !class_allowed {
                session.stop("device_not_allowed").await;
                return Err(DaemonError::DeviceNotAllowed {
                    device: device.device_type.to_string(),
                    consumer: consumer_name,
                });
            }

            let health = session.health();
            let session = Arc::new(tokio::sync::Mutex::new(session));

            // Claim the unique_id before anything else has side effects;
            // a concurrent share to the same consumer loses here.
            let entry = OutboundEntry {
                session: Arc::clone(&session),
                tasks: Vec::new(),
            };
            if let Err(e) = self.registry.insert_outbound(&unique_id, entry) {
                session.lock().await.stop("duplicate").await;
                return Err(e);
            }

            // Capture feeds batches through a channel; the forwarder is
            // the only writer on the session, so a full TCP buffer
            // backpressures all the way to the device read.
            let (batch_tx, mut batch_rx) = mpsc::channel(256);
            if let Err(e) = self
                .captures
                .start_capture(&device, batch_tx, options)
                .await
            {
                self.registry.take_outbound(&unique_id);
                session.lock().await.stop("capture_failed").await;
                return Err(e.into());
            }

            let forward_session = Arc::clone(&session);
            let forwarder = tokio::spawn(async move {
                while let Some((_, events)) = batch_rx.recv().await {
                    if forward_session.lock().await.send_batch(events).await.is_err() {
                        break;
                    }
                }
            });
            self.registry.attach_tasks(&unique_id, vec![forwarder]);

            // The monitor is not in the entry's task list: it must
            // survive the take_outbound() it performs itself. It exits
            // on its own once the session leaves the registry.
            let monitor_self = Arc::clone(self);
            let monitor_id = unique_id.clone();
            tokio::spawn(async move {
                let mut tick = tokio::time::interval(PROBE_INTERVAL);
                loop {
                    tick.tick().await;
                    if !monitor_self.registry.has_outbound(&monitor_id) {
                        break;
                    }
                    if health.is_lost() {
                        monitor_self.handle_connection_lost(&monitor_id).await;
                        break;
                    }
                }
            });

            info!(consumer = %consumer_name, device = %device.name, "sharing started");
            Ok(())
        }

        /// Deliberately stop a share, restoring the device.
        pub async fn stop_share(&self, unique_id: &str, reason: &str) -> Result<(), DaemonError> {
            let Some(entry) = self.registry.take_outbound(unique_id) else {
                return Ok(());
            };
            let device_path = {
                let mut session = entry.session.lock().await;
                let path = session.device().path.clone();
                session.stop(reason).await;
                path
            };
            self.stop_capture_for(&device_path).await;
            Ok(())
        }

        /// Liveness-monitor teardown path: the link died without a
        /// disconnect, so skip pleasantries and restore the device.
        pub(super) async fn handle_connection_lost(self: &Arc<Self>, unique_id: &str) {
            let Some(entry) = self.registry.take_outbound(unique_id) else {
                return;
            };
            let (consumer_name, device_path, reason) = {
                let mut session = entry.session.lock().await;
                let name = session.consumer_name().to_string();
                let path = session.device().path.clone();
                let reason = session
                    .health()
                    .reason()
                    .unwrap_or_else(|| "connection lost".to_string());
                session.stop("connection_lost").await;
                (name, path, reason)
            };
            self.stop_capture_for(&device_path).await;
            self.notifier.notify(
                "Connection lost",
                &format!("{consumer_name}: {reason}; local device restored"),
            );
        }

        async fn stop_capture_for(&self, device_path: &str) {
            if let Err(e) = self.captures.stop_capture(Path::new(device_path)).await {
                warn!(path = %device_path, error = %e, "capture stop failed");
            }
        }

        /// Wait until an active share's link is reported lost or the
        /// share is stopped. Used by the CLI to block in `--connect`.
        pub async fn wait_while_sharing(&self, unique_id: &str) {
            loop {
                if !self.registry.has_outbound(unique_id) {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
        }
    }
}
