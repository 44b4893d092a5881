//! Peer runtime for transwacom.
//!
//! Owns everything long-lived: configuration and trust registries, the
//! consumer server, outbound sessions with their liveness monitors, the
//! discovery plane, and the process-wide supervisor whose emergency
//! cleanup restores device state on every exit path.

pub mod authorize;
pub mod config;
pub mod error;
pub mod notify;
pub mod registry;
pub mod server;
pub mod session;
pub mod supervisor;

pub use authorize::{AuthDecision, AuthorizationPrompt, TerminalPrompt};
pub use config::ConfigManager;
pub use error::DaemonError;
pub use notify::{LogNotifier, Notifier};
pub use registry::ConnectionRegistry;
pub use session::{OutboundSession, SessionState};
pub use supervisor::Supervisor;
