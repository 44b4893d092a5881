//! Outbound (host-initiated) sessions.
//!
//! One TCP connection per shared device. The session walks
//! Connecting -> AwaitingAuth -> Streaming and tears down through
//! Closing -> Closed exactly once, whatever the trigger.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use transwacom_protocol::{Decoded, MessageReceiver, MessageSender, ProtocolError};
use transwacom_types::{DeviceDescriptor, InputEvent, MachineIdentity, Message, PROTOCOL_VERSION};

use crate::error::DaemonError;

/// How long the initiator waits for the consumer's authorisation.
pub const AUTH_TIMEOUT: Duration = Duration::from_secs(60);

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    AwaitingAuth,
    Streaming,
    Closing,
    Closed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Connecting => "Connecting",
            Self::AwaitingAuth => "AwaitingAuth",
            Self::Streaming => "Streaming",
            Self::Closing => "Closing",
            Self::Closed => "Closed",
        };
        f.write_str(name)
    }
}

/// Shared liveness flag between a session, its reader task, and the
/// liveness monitor.
#[derive(Debug, Default)]
pub struct SessionHealth {
    lost: AtomicBool,
    reason: Mutex<Option<String>>,
}

impl SessionHealth {
    pub fn mark_lost(&self, reason: &str) {
        if !self.lost.swap(true, Ordering::SeqCst) {
            *self.reason.lock().unwrap_or_else(std::sync::PoisonError::into_inner) =
                Some(reason.to_string());
        }
    }

    #[must_use]
    pub fn is_lost(&self) -> bool {
        self.lost.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.reason.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clone()
    }
}

/// Seconds since the Unix epoch, as carried in wire timestamps.
#[must_use]
pub fn now_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// A host-initiated session streaming one device to a consumer.
#[derive(Debug)]
pub struct OutboundSession {
    unique_id: String,
    consumer_name: String,
    consumer_id: String,
    device: DeviceDescriptor,
    connected_at: SystemTime,
    state: SessionState,
    sender: MessageSender<OwnedWriteHalf>,
    health: Arc<SessionHealth>,
    reader: Option<JoinHandle<()>>,
}

impl OutboundSession {
    /// Connect, send the handshake, and wait for authorisation.
    pub async fn connect(
        addr: SocketAddr,
        identity: &MachineIdentity,
        device: DeviceDescriptor,
    ) -> Result<Self, DaemonError> {
        Self::connect_with_timeout(addr, identity, device, AUTH_TIMEOUT).await
    }

    pub async fn connect_with_timeout(
        addr: SocketAddr,
        identity: &MachineIdentity,
        device: DeviceDescriptor,
        auth_timeout: Duration,
    ) -> Result<Self, DaemonError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| ProtocolError::Connection(format!("{addr}: {e}")))?;
        let (mut sender, mut receiver) = transwacom_protocol::split(stream);

        let handshake = Message::Handshake {
            host_name: identity.machine_name.clone(),
            host_id: identity.machine_id.clone(),
            devices: vec![device.clone()],
            version: PROTOCOL_VERSION.to_string(),
        };
        sender.send(&handshake).await?;
        debug!(addr = %addr, "handshake sent, awaiting authorisation");

        let response = tokio::time::timeout(auth_timeout, await_auth(&mut receiver))
            .await
            .map_err(|_| DaemonError::AuthTimeout(auth_timeout.as_secs()))??;

        let (accepted, consumer_name, consumer_id) = response;
        if !accepted {
            return Err(DaemonError::ConnectionRejected(consumer_name));
        }

        let health = Arc::new(SessionHealth::default());
        let reader = tokio::spawn(run_reader(receiver, Arc::clone(&health)));

        info!(consumer = %consumer_name, addr = %addr, device = %device.name, "session streaming");
        Ok(Self {
            unique_id: addr.to_string(),
            consumer_name,
            consumer_id,
            device,
            connected_at: SystemTime::now(),
            state: SessionState::Streaming,
            sender,
            health,
            reader: Some(reader),
        })
    }

    #[must_use]
    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    #[must_use]
    pub fn consumer_name(&self) -> &str {
        &self.consumer_name
    }

    #[must_use]
    pub fn consumer_id(&self) -> &str {
        &self.consumer_id
    }

    #[must_use]
    pub fn device(&self) -> &DeviceDescriptor {
        &self.device
    }

    #[must_use]
    pub fn connected_at(&self) -> SystemTime {
        self.connected_at
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    #[must_use]
    pub fn health(&self) -> Arc<SessionHealth> {
        Arc::clone(&self.health)
    }

    /// Send one event batch. A send failure marks the session lost so
    /// the liveness monitor picks it up.
    pub async fn send_batch(&mut self, events: Vec<InputEvent>) -> Result<(), DaemonError> {
        if self.state != SessionState::Streaming {
            return Ok(());
        }
        let timestamp = events.last().map_or_else(now_timestamp, |e| e.timestamp);
        let msg = Message::Event {
            device_type: self.device.device_type,
            events,
            timestamp,
        };
        if let Err(e) = self.sender.send(&msg).await {
            self.health.mark_lost("send failed");
            return Err(e.into());
        }
        Ok(())
    }

    /// Tear the session down. Re-entrant: the second call is a no-op.
    ///
    /// Exactly one `disconnect` message is attempted on deliberate
    /// close; send failure is ignored and the socket closes regardless.
    pub async fn stop(&mut self, reason: &str) {
        if matches!(self.state, SessionState::Closing | SessionState::Closed) {
            return;
        }
        self.state = SessionState::Closing;

        if !self.health.is_lost() {
            let msg = Message::Disconnect {
                reason: reason.to_string(),
                timestamp: now_timestamp(),
            };
            if let Err(e) = self.sender.send(&msg).await {
                debug!(error = %e, "disconnect message not delivered");
            }
        }
        let _ = self.sender.shutdown().await;

        if let Some(reader) = self.reader.take() {
            reader.abort();
        }

        self.state = SessionState::Closed;
        info!(consumer = %self.consumer_name, reason, "session closed");
    }
}

/// Wait for the `auth_response` that ends the AwaitingAuth phase.
///
/// Anything other than a well-formed `auth_response` (bar ignorable
/// unknown types) terminates the session: this is the handshake phase,
/// where malformed input is fatal.
async fn await_auth(
    receiver: &mut MessageReceiver<OwnedReadHalf>,
) -> Result<(bool, String, String), DaemonError> {
    loop {
        match receiver.recv().await? {
            Some(Decoded::Message(Message::AuthResponse {
                accepted,
                consumer_name,
                consumer_id,
            })) => return Ok((accepted, consumer_name, consumer_id)),
            Some(Decoded::Message(other)) => {
                return Err(ProtocolError::Handshake(format!(
                    "expected auth_response, got {}",
                    other.kind()
                ))
                .into());
            }
            Some(Decoded::UnknownType(kind)) => {
                debug!(kind, "ignoring unknown message while awaiting auth");
            }
            Some(Decoded::Malformed(reason)) => {
                return Err(ProtocolError::Handshake(format!(
                    "malformed message while awaiting auth: {reason}"
                ))
                .into());
            }
            None => return Err(ProtocolError::StreamClosed.into()),
        }
    }
}

/// Watch the read half for the consumer's disconnect or EOF.
async fn run_reader(mut receiver: MessageReceiver<OwnedReadHalf>, health: Arc<SessionHealth>) {
    loop {
        match receiver.recv_message().await {
            Ok(Some(Message::Disconnect { reason, .. })) => {
                info!(reason = %reason, "consumer disconnected");
                health.mark_lost(&reason);
                break;
            }
            Ok(Some(msg)) => {
                debug!(kind = msg.kind(), "unexpected message from consumer");
            }
            Ok(None) => {
                health.mark_lost("connection closed by peer");
                break;
            }
            Err(e) => {
                warn!(error = %e, "session read error");
                health.mark_lost("read error");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;
    use transwacom_types::DeviceType;

    fn identity() -> MachineIdentity {
        MachineIdentity {
            machine_id: "a1b2c3d4e5f60718".to_string(),
            machine_name: "alpha".to_string(),
        }
    }

    fn wacom_device() -> DeviceDescriptor {
        DeviceDescriptor {
            device_type: DeviceType::Wacom,
            path: "/dev/input/event19".to_string(),
            name: "Wacom Intuos".to_string(),
            capabilities: vec!["pressure".to_string()],
            vendor_id: None,
            product_id: None,
        }
    }

    async fn fake_consumer(
        accepted: bool,
    ) -> (SocketAddr, tokio::task::JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut lines = BufReader::new(stream);

            let mut handshake = String::new();
            lines.read_line(&mut handshake).await.unwrap();
            assert!(handshake.contains("\"type\":\"handshake\""));

            let response = format!(
                "{{\"type\":\"auth_response\",\"accepted\":{accepted},\"consumer_name\":\"beta\",\"consumer_id\":\"0011223344556677\"}}\n"
            );
            lines
                .get_mut()
                .write_all(response.as_bytes())
                .await
                .unwrap();

            // Collect whatever else the host sends until EOF.
            let mut received = Vec::new();
            let mut line = String::new();
            while lines.read_line(&mut line).await.unwrap_or(0) > 0 {
                received.push(line.trim().to_string());
                line.clear();
            }
            received
        });

        (addr, handle)
    }

    #[tokio::test]
    async fn accepted_handshake_reaches_streaming() {
        let (addr, _consumer) = fake_consumer(true).await;
        let session = OutboundSession::connect_with_timeout(
            addr,
            &identity(),
            wacom_device(),
            Duration::from_secs(1),
        )
        .await
        .unwrap();

        assert_eq!(session.state(), SessionState::Streaming);
        assert_eq!(session.consumer_name(), "beta");
        assert_eq!(session.consumer_id(), "0011223344556677");
        assert_eq!(session.unique_id(), addr.to_string());
    }

    #[tokio::test]
    async fn rejected_handshake_errors() {
        let (addr, _consumer) = fake_consumer(false).await;
        let err = OutboundSession::connect_with_timeout(
            addr,
            &identity(),
            wacom_device(),
            Duration::from_secs(1),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, DaemonError::ConnectionRejected(name) if name == "beta"));
    }

    #[tokio::test]
    async fn silent_consumer_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _hold = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(10)).await;
            drop(stream);
        });

        let err = OutboundSession::connect_with_timeout(
            addr,
            &identity(),
            wacom_device(),
            Duration::from_millis(100),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, DaemonError::AuthTimeout(_)));
    }

    #[tokio::test]
    async fn malformed_auth_terminates() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _consumer = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            stream
                .write_all(b"{\"type\":\"auth_response\",\"accepted\":true}\n")
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_secs(1)).await;
        });

        let err = OutboundSession::connect_with_timeout(
            addr,
            &identity(),
            wacom_device(),
            Duration::from_secs(1),
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            DaemonError::Protocol(ProtocolError::Handshake(_))
        ));
    }

    #[tokio::test]
    async fn stop_sends_exactly_one_disconnect() {
        let (addr, consumer) = fake_consumer(true).await;
        let mut session = OutboundSession::connect_with_timeout(
            addr,
            &identity(),
            wacom_device(),
            Duration::from_secs(1),
        )
        .await
        .unwrap();

        session.stop("user_request").await;
        session.stop("user_request").await;
        assert_eq!(session.state(), SessionState::Closed);

        let received = consumer.await.unwrap();
        let disconnects = received
            .iter()
            .filter(|l| l.contains("\"type\":\"disconnect\""))
            .count();
        assert_eq!(disconnects, 1);
    }

    #[tokio::test]
    async fn batch_reaches_consumer() {
        let (addr, consumer) = fake_consumer(true).await;
        let mut session = OutboundSession::connect_with_timeout(
            addr,
            &identity(),
            wacom_device(),
            Duration::from_secs(1),
        )
        .await
        .unwrap();

        session
            .send_batch(vec![
                InputEvent::new("ABS_X", 500, 1.0),
                InputEvent::new("SYN_REPORT", 0, 1.001),
            ])
            .await
            .unwrap();
        session.stop("done").await;

        let received = consumer.await.unwrap();
        assert!(received.iter().any(|l| l.contains("\"ABS_X\"")));
    }

    #[tokio::test]
    async fn peer_eof_marks_health_lost() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _consumer = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            stream
                .write_all(b"{\"type\":\"auth_response\",\"accepted\":true,\"consumer_name\":\"beta\",\"consumer_id\":\"x\"}\n")
                .await
                .unwrap();
            // Kill the endpoint without a disconnect message.
        });

        let session = OutboundSession::connect_with_timeout(
            addr,
            &identity(),
            wacom_device(),
            Duration::from_secs(1),
        )
        .await
        .unwrap();

        let health = session.health();
        tokio::time::timeout(Duration::from_secs(2), async {
            while !health.is_lost() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("reader should observe EOF");
    }
}
