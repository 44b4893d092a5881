//! Discovery errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("mDNS daemon error: {0}")]
    Daemon(String),

    #[error("failed to publish service: {0}")]
    Publish(String),

    #[error("failed to browse services: {0}")]
    Browse(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
