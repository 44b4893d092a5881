//! Protocol and framing errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("serialisation error: {0}")]
    Serialization(String),

    #[error("line exceeds maximum length of {max} bytes")]
    LineTooLong { max: usize },

    #[error("stream closed unexpectedly")]
    StreamClosed,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
