//! Protocol message types.
//!
//! Messages are exchanged as newline-delimited JSON objects over TCP.
//! The `type` field is the serde tag, so the wire shape is
//! `{"type":"handshake",...}`.

use serde::{Deserialize, Serialize};

use crate::device::DeviceDescriptor;
use crate::event::InputEvent;

/// Current protocol version, carried in every handshake.
pub const PROTOCOL_VERSION: &str = "1.0";

/// Top-level wire message.
///
/// The set of types is closed: receivers ignore unknown `type` values
/// and discard messages with missing required fields (terminating the
/// session only during the handshake/auth phase).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// First message on an outbound connection, host -> consumer.
    Handshake {
        host_name: String,
        host_id: String,
        /// Devices offered in this session. Currently one per session,
        /// but receivers must accept one or more entries.
        devices: Vec<DeviceDescriptor>,
        version: String,
    },

    /// Authorisation verdict, consumer -> host.
    AuthResponse {
        accepted: bool,
        consumer_name: String,
        consumer_id: String,
    },

    /// A batch of input events for one device class, host -> consumer.
    Event {
        device_type: crate::device::DeviceType,
        events: Vec<InputEvent>,
        timestamp: f64,
    },

    /// Deliberate teardown, either direction.
    Disconnect { reason: String, timestamp: f64 },
}

impl Message {
    /// Short name of the message type, for log lines.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Handshake { .. } => "handshake",
            Self::AuthResponse { .. } => "auth_response",
            Self::Event { .. } => "event",
            Self::Disconnect { .. } => "disconnect",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceType;

    fn json_roundtrip(msg: &Message) -> Message {
        let json = serde_json::to_string(msg).unwrap();
        serde_json::from_str(&json).unwrap()
    }

    #[test]
    fn handshake_roundtrip() {
        let msg = Message::Handshake {
            host_name: "alpha".to_string(),
            host_id: "a1b2c3d4e5f60718".to_string(),
            devices: vec![DeviceDescriptor {
                device_type: DeviceType::Wacom,
                path: "/dev/input/event19".to_string(),
                name: "Wacom Intuos".to_string(),
                capabilities: vec!["pressure".to_string(), "tilt".to_string()],
                vendor_id: None,
                product_id: None,
            }],
            version: PROTOCOL_VERSION.to_string(),
        };
        assert_eq!(json_roundtrip(&msg), msg);
    }

    #[test]
    fn auth_response_roundtrip() {
        let msg = Message::AuthResponse {
            accepted: true,
            consumer_name: "beta".to_string(),
            consumer_id: "0011223344556677".to_string(),
        };
        assert_eq!(json_roundtrip(&msg), msg);
    }

    #[test]
    fn event_roundtrip() {
        let msg = Message::Event {
            device_type: DeviceType::Wacom,
            events: vec![
                InputEvent::new("ABS_X", 1024, 1_700_000_000.001),
                InputEvent::new("SYN_REPORT", 0, 1_700_000_000.003),
            ],
            timestamp: 1_700_000_000.003,
        };
        assert_eq!(json_roundtrip(&msg), msg);
    }

    #[test]
    fn disconnect_roundtrip() {
        let msg = Message::Disconnect {
            reason: "user_request".to_string(),
            timestamp: 1_700_000_000.0,
        };
        assert_eq!(json_roundtrip(&msg), msg);
    }

    #[test]
    fn tag_is_snake_case_type_field() {
        let msg = Message::AuthResponse {
            accepted: false,
            consumer_name: "beta".to_string(),
            consumer_id: "0011223344556677".to_string(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"auth_response\""));
    }

    #[test]
    fn missing_required_field_rejected() {
        let err = serde_json::from_str::<Message>(r#"{"type":"handshake","host_name":"h"}"#);
        assert!(err.is_err());
    }
}
