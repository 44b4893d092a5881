//! Message-oriented wrappers over TCP stream halves.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::trace;

use transwacom_types::Message;

use crate::codec::{encode_message, Decoded, LineDecoder};
use crate::error::ProtocolError;

/// Split a connected stream into message-oriented halves.
#[must_use]
pub fn split(
    stream: TcpStream,
) -> (MessageSender<OwnedWriteHalf>, MessageReceiver<OwnedReadHalf>) {
    let (read, write) = stream.into_split();
    (MessageSender::new(write), MessageReceiver::new(read))
}

/// Sends newline-delimited JSON messages.
#[derive(Debug)]
pub struct MessageSender<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> MessageSender<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Encode and send one message. Blocks when the TCP send buffer is
    /// full, which is the backpressure mechanism for the capture loop.
    pub async fn send(&mut self, msg: &Message) -> Result<(), ProtocolError> {
        let bytes = encode_message(msg)?;
        self.writer.write_all(&bytes).await?;
        trace!(kind = msg.kind(), len = bytes.len(), "sent message");
        Ok(())
    }

    /// Flush and shut down the write side.
    pub async fn shutdown(&mut self) -> Result<(), ProtocolError> {
        self.writer.shutdown().await?;
        Ok(())
    }
}

/// Receives newline-delimited JSON messages with buffered reassembly.
pub struct MessageReceiver<R> {
    reader: R,
    decoder: LineDecoder,
}

impl<R: AsyncRead + Unpin> MessageReceiver<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            decoder: LineDecoder::new(),
        }
    }

    /// Receive the next complete line.
    ///
    /// Returns `Ok(None)` on clean EOF. A partial line pending at EOF is
    /// discarded; events in flight at disconnect are dropped.
    pub async fn recv(&mut self) -> Result<Option<Decoded>, ProtocolError> {
        let mut buf = [0u8; 4096];
        loop {
            if let Some(decoded) = self.decoder.next()? {
                return Ok(Some(decoded));
            }

            let n = self.reader.read(&mut buf).await?;
            if n == 0 {
                return Ok(None);
            }
            self.decoder.extend(&buf[..n]);
        }
    }

    /// Receive the next well-formed message, applying the streaming-phase
    /// policy: unknown types and malformed lines are logged and skipped.
    pub async fn recv_message(&mut self) -> Result<Option<Message>, ProtocolError> {
        loop {
            match self.recv().await? {
                Some(Decoded::Message(msg)) => return Ok(Some(msg)),
                Some(Decoded::UnknownType(kind)) => {
                    tracing::debug!(kind, "ignoring unknown message type");
                }
                Some(Decoded::Malformed(reason)) => {
                    tracing::warn!(reason, "skipping malformed message");
                }
                None => return Ok(None),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_recv_over_duplex() {
        let (client, server) = tokio::io::duplex(1024);
        let mut tx = MessageSender::new(client);
        let mut rx = MessageReceiver::new(server);

        let msg = Message::Disconnect {
            reason: "user_request".to_string(),
            timestamp: 1.5,
        };
        tx.send(&msg).await.unwrap();
        tx.shutdown().await.unwrap();

        assert_eq!(rx.recv_message().await.unwrap(), Some(msg));
        assert_eq!(rx.recv_message().await.unwrap(), None);
    }

    #[tokio::test]
    async fn recv_message_skips_garbage() {
        let (mut client, server) = tokio::io::duplex(1024);
        let mut rx = MessageReceiver::new(server);

        client.write_all(b"{broken\n").await.unwrap();
        client
            .write_all(b"{\"type\":\"future_thing\"}\n")
            .await
            .unwrap();
        let msg = Message::Disconnect {
            reason: "done".to_string(),
            timestamp: 0.0,
        };
        client.write_all(&encode_message(&msg).unwrap()).await.unwrap();
        client.shutdown().await.unwrap();

        assert_eq!(rx.recv_message().await.unwrap(), Some(msg));
    }

    #[tokio::test]
    async fn partial_line_at_eof_dropped() {
        let (mut client, server) = tokio::io::duplex(1024);
        let mut rx = MessageReceiver::new(server);

        client
            .write_all(b"{\"type\":\"disconnect\",\"reason\":")
            .await
            .unwrap();
        client.shutdown().await.unwrap();

        assert_eq!(rx.recv_message().await.unwrap(), None);
    }
}
