//! Consumer-side TCP server.
//!
//! Accepts connections, runs the handshake/authorisation exchange, and
//! feeds accepted event streams into the injector. Inbound bookkeeping
//! keys sockets by the validated host name; the peer address stays the
//! wire-level key.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use transwacom_input::{InputError, InputInjector};
use transwacom_protocol::{Decoded, MessageReceiver, ProtocolError};
use transwacom_types::{DeviceDescriptor, MachineIdentity, Message, PROTOCOL_VERSION};

use crate::authorize::{authorize_host, AuthorizationPrompt, PROMPT_TIMEOUT};
use crate::config::ConfigManager;
use crate::error::DaemonError;
use crate::notify::Notifier;
use crate::registry::{ConnectionRegistry, InboundHandle};
use crate::session::AUTH_TIMEOUT;

/// Everything an inbound connection handler needs.
#[derive(Clone)]
pub struct ServerContext {
    pub config: Arc<Mutex<ConfigManager>>,
    pub identity: MachineIdentity,
    pub prompt: Arc<dyn AuthorizationPrompt>,
    pub injector: Arc<tokio::sync::Mutex<Box<dyn InputInjector>>>,
    pub registry: Arc<ConnectionRegistry>,
    pub notifier: Arc<dyn Notifier>,
}

/// Listening half of the consumer role.
pub struct ConsumerServer {
    local_addr: SocketAddr,
    accept_task: Option<JoinHandle<()>>,
}

impl ConsumerServer {
    /// Bind and start accepting connections.
    pub async fn bind(addr: SocketAddr, ctx: ServerContext) -> Result<Self, DaemonError> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        info!(addr = %local_addr, "consumer server listening");

        let accept_task = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, peer)) => {
                        debug!(peer = %peer, "inbound connection");
                        let ctx = ctx.clone();
                        tokio::spawn(async move {
                            handle_client(stream, peer, ctx).await;
                        });
                    }
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                    }
                }
            }
        });

        Ok(Self {
            local_addr,
            accept_task: Some(accept_task),
        })
    }

    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting new connections. Existing sessions keep running
    /// until the registry closes them.
    pub fn shutdown(&mut self) {
        if let Some(task) = self.accept_task.take() {
            task.abort();
        }
    }
}

impl Drop for ConsumerServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn handle_client(stream: tokio::net::TcpStream, peer: SocketAddr, ctx: ServerContext) {
    let (sender, mut receiver) = transwacom_protocol::split(stream);
    let sender = Arc::new(tokio::sync::Mutex::new(sender));

    // Handshake phase: malformed input here terminates the session.
    let handshake = match tokio::time::timeout(AUTH_TIMEOUT, read_handshake(&mut receiver)).await {
        Ok(Ok(handshake)) => handshake,
        Ok(Err(e)) => {
            warn!(peer = %peer, error = %e, "handshake failed");
            return;
        }
        Err(_) => {
            warn!(peer = %peer, "peer silent in handshake phase, abandoning");
            return;
        }
    };

    let (host_name, host_id, devices, version) = handshake;
    if version != PROTOCOL_VERSION {
        debug!(peer = %peer, version = %version, "peer speaks a different protocol version");
    }

    let accepted = authorize_host(
        &ctx.config,
        &*ctx.prompt,
        &host_name,
        &host_id,
        &devices,
        PROMPT_TIMEOUT,
    )
    .await;

    let response = Message::AuthResponse {
        accepted,
        consumer_name: ctx.identity.machine_name.clone(),
        consumer_id: ctx.identity.machine_id.clone(),
    };
    if let Err(e) = sender.lock().await.send(&response).await {
        warn!(peer = %peer, error = %e, "failed to send auth response");
        return;
    }
    if !accepted {
        return;
    }

    let (close_tx, mut close_rx) = watch::channel(false);
    ctx.registry
        .insert_inbound(&host_name, InboundHandle::new(peer, close_tx, sender));
    let device_names: Vec<&str> = devices.iter().map(|d| d.name.as_str()).collect();
    ctx.notifier.notify(
        "Device connected",
        &format!("{host_name} is sharing {}", device_names.join(", ")),
    );

    // Streaming phase: malformed input is skipped, not fatal.
    loop {
        tokio::select! {
            _ = close_rx.changed() => {
                info!(host = %host_name, "inbound session closed locally");
                break;
            }
            result = receiver.recv() => match result {
                Ok(Some(Decoded::Message(Message::Event { device_type, events, .. }))) => {
                    let enabled = ctx
                        .config
                        .lock()
                        .unwrap_or_else(std::sync::PoisonError::into_inner)
                        .is_device_enabled(device_type);
                    if !enabled {
                        debug!(host = %host_name, %device_type, "device class disabled, dropping batch");
                        continue;
                    }
                    match ctx.injector.lock().await.inject_batch(device_type, &events).await {
                        Ok(()) => {}
                        Err(e @ InputError::VirtualDeviceCreate(_)) => {
                            ctx.notifier.notify(
                                "Virtual device unavailable",
                                &format!("cannot receive {device_type} events: {e}"),
                            );
                            break;
                        }
                        Err(e) => warn!(host = %host_name, error = %e, "injection failed"),
                    }
                }
                Ok(Some(Decoded::Message(Message::Disconnect { reason, .. }))) => {
                    info!(host = %host_name, reason = %reason, "host disconnected");
                    break;
                }
                Ok(Some(Decoded::Message(other))) => {
                    warn!(host = %host_name, kind = other.kind(), "unexpected message in streaming phase");
                }
                Ok(Some(Decoded::UnknownType(kind))) => {
                    debug!(host = %host_name, kind, "ignoring unknown message type");
                }
                Ok(Some(Decoded::Malformed(reason))) => {
                    warn!(host = %host_name, reason, "skipping malformed message");
                }
                Ok(None) => {
                    info!(host = %host_name, "connection closed by host");
                    break;
                }
                Err(e) => {
                    warn!(host = %host_name, error = %e, "read error");
                    break;
                }
            }
        }
    }

    ctx.registry.remove_inbound(&host_name, peer);
    ctx.notifier
        .notify("Host disconnected", &format!("{host_name} stopped sharing"));
}

type HandshakeFields = (String, String, Vec<DeviceDescriptor>, String);

/// Wait for the opening handshake. Unknown message types are ignored;
/// anything else out of shape terminates the connection.
async fn read_handshake(
    receiver: &mut MessageReceiver<OwnedReadHalf>,
) -> Result<HandshakeFields, DaemonError> {
    loop {
        match receiver.recv().await? {
            Some(Decoded::Message(Message::Handshake {
                host_name,
                host_id,
                devices,
                version,
            })) => {
                if devices.is_empty() {
                    return Err(
                        ProtocolError::Handshake("handshake offers no devices".to_string()).into(),
                    );
                }
                return Ok((host_name, host_id, devices, version));
            }
            Some(Decoded::Message(other)) => {
                return Err(ProtocolError::Handshake(format!(
                    "expected handshake, got {}",
                    other.kind()
                ))
                .into());
            }
            Some(Decoded::UnknownType(kind)) => {
                debug!(kind, "ignoring unknown message before handshake");
            }
            Some(Decoded::Malformed(reason)) => {
                return Err(
                    ProtocolError::Handshake(format!("malformed handshake: {reason}")).into(),
                );
            }
            None => return Err(ProtocolError::StreamClosed.into()),
        }
    }
}
