//! mDNS discovery for transwacom.
//!
//! Every peer advertises itself as a consumer under
//! `_input-consumer._tcp.local.` and browses for other consumers. The
//! browse results feed an in-memory [`PeerTable`] whose entries go stale
//! and are evicted when a peer stops refreshing.

pub mod advertise;
pub mod browse;
pub mod error;
pub mod table;

use std::time::Duration;

pub use advertise::Advertiser;
pub use browse::Browser;
pub use error::DiscoveryError;
pub use table::{DiscoveredPeer, PeerTable};

/// DNS-SD service type for transwacom consumers.
pub const SERVICE_TYPE: &str = "_input-consumer._tcp.local.";

/// Period at which peers re-advertise and the table is swept.
pub const REFRESH_INTERVAL: Duration = Duration::from_secs(5);

/// Entries unseen for longer than this are evicted (2.5x the refresh
/// interval).
#[must_use]
pub fn staleness_cutoff() -> Duration {
    REFRESH_INTERVAL * 5 / 2
}
