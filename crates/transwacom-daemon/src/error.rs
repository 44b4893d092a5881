//! Daemon errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("connection rejected by {0}")]
    ConnectionRejected(String),

    #[error("no authorisation response within {0} seconds")]
    AuthTimeout(u64),

    #[error("already connected to {0}")]
    AlreadyConnected(String),

    #[error("device class {device} not allowed for consumer {consumer}")]
    DeviceNotAllowed { device: String, consumer: String },

    #[error("protocol error: {0}")]
    Protocol(#[from] transwacom_protocol::ProtocolError),

    #[error("input error: {0}")]
    Input(#[from] transwacom_input::InputError),

    #[error("discovery error: {0}")]
    Discovery(#[from] transwacom_discovery::DiscoveryError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
