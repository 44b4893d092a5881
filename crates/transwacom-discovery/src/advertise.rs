//! mDNS service advertisement.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, UdpSocket};

use mdns_sd::{ServiceDaemon, ServiceInfo};
use tracing::{info, warn};

use crate::error::DiscoveryError;
use crate::SERVICE_TYPE;

/// Publishes this peer's consumer service record.
pub struct Advertiser {
    daemon: ServiceDaemon,
    fullname: Option<String>,
}

impl Advertiser {
    pub fn new() -> Result<Self, DiscoveryError> {
        let daemon = ServiceDaemon::new().map_err(|e| DiscoveryError::Daemon(e.to_string()))?;
        Ok(Self {
            daemon,
            fullname: None,
        })
    }

    /// Register the service record with TXT `{version, name, capabilities}`.
    ///
    /// Binds to the first non-loopback IPv4. With only loopback available
    /// the record is still published but reachable only on this machine.
    pub fn publish(
        &mut self,
        name: &str,
        port: u16,
        capabilities: &[&str],
    ) -> Result<(), DiscoveryError> {
        let address = match local_ipv4() {
            Some(ip) => IpAddr::V4(ip),
            None => {
                warn!("no non-loopback IPv4 found; advertising on loopback only");
                IpAddr::V4(Ipv4Addr::LOCALHOST)
            }
        };

        let mut properties = HashMap::new();
        properties.insert("version".to_string(), "1.0".to_string());
        properties.insert("name".to_string(), name.to_string());
        properties.insert("capabilities".to_string(), capabilities.join(","));

        let service = ServiceInfo::new(
            SERVICE_TYPE,
            name,
            &format!("{name}.local."),
            address,
            port,
            properties,
        )
        .map_err(|e| DiscoveryError::Publish(e.to_string()))?;

        let fullname = service.get_fullname().to_string();
        self.daemon
            .register(service)
            .map_err(|e| DiscoveryError::Publish(e.to_string()))?;

        info!(service = %fullname, %address, port, "published mDNS service");
        self.fullname = Some(fullname);
        Ok(())
    }

    /// Withdraw the service record. A no-op when nothing is published.
    pub fn unpublish(&mut self) {
        if let Some(fullname) = self.fullname.take() {
            if let Err(e) = self.daemon.unregister(&fullname) {
                warn!(service = %fullname, error = %e, "failed to unregister mDNS service");
            } else {
                info!(service = %fullname, "unpublished mDNS service");
            }
        }
    }
}

impl Drop for Advertiser {
    fn drop(&mut self) {
        self.unpublish();
        let _ = self.daemon.shutdown();
    }
}

/// First non-loopback IPv4 of this host.
///
/// Connecting a UDP socket to a public address selects the outbound
/// interface without sending any packet.
#[must_use]
pub fn local_ipv4() -> Option<Ipv4Addr> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    match socket.local_addr().ok()? {
        std::net::SocketAddr::V4(addr) if !addr.ip().is_loopback() => Some(*addr.ip()),
        _ => None,
    }
}
