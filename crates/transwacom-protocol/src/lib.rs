//! Wire protocol and TCP framing for transwacom.
//!
//! Each message is a UTF-8 JSON object followed by a single `\n` byte;
//! there is no other framing. This crate provides the codec (encode,
//! buffered line reassembly, decode policy) and message-oriented
//! wrappers over TCP stream halves.

pub mod codec;
pub mod connection;
pub mod error;

pub use codec::{encode_message, Decoded, LineDecoder, MAX_LINE_LEN};
pub use connection::{split, MessageReceiver, MessageSender};
pub use error::ProtocolError;
