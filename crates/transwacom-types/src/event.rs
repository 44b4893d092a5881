//! Wire-form input events.

use serde::{Deserialize, Serialize};

/// A single input event as it travels on the wire.
///
/// `code` is a symbolic name from the closed alphabet in [`crate::codes`]
/// (e.g. `ABS_X`, `BTN_STYLUS`, `SYN_REPORT`). Receivers drop unknown
/// codes with a warning; they never fail the stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputEvent {
    pub code: String,
    pub value: i32,
    /// Seconds since the Unix epoch, sub-millisecond precision.
    pub timestamp: f64,
}

impl InputEvent {
    #[must_use]
    pub fn new(code: impl Into<String>, value: i32, timestamp: f64) -> Self {
        Self {
            code: code.into(),
            value,
            timestamp,
        }
    }

    /// Whether this is a synchronisation event (`SYN_*`).
    ///
    /// Sync events terminate a batch: the batcher flushes as soon as one
    /// is appended.
    #[must_use]
    pub fn is_sync(&self) -> bool {
        self.code.starts_with("SYN_")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_detection() {
        assert!(InputEvent::new("SYN_REPORT", 0, 0.0).is_sync());
        assert!(!InputEvent::new("ABS_X", 512, 0.0).is_sync());
    }

    #[test]
    fn wire_shape() {
        let ev = InputEvent::new("ABS_PRESSURE", 312, 1_700_000_000.002);
        let json = serde_json::to_string(&ev).unwrap();
        let back: InputEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ev);
        assert!(json.contains("\"code\":\"ABS_PRESSURE\""));
    }
}
