//! Event batching.
//!
//! Events accumulate into a batch that flushes when a synchronisation
//! event (`SYN_*`) is appended or when the batch has been open for
//! [`FLUSH_INTERVAL`], whichever comes first. A batch never crosses a
//! device boundary because each capture loop owns its own batcher.

use std::time::Duration;

use tokio::time::Instant;
use transwacom_types::InputEvent;

/// Flush deadline for a batch that never sees a sync event.
pub const FLUSH_INTERVAL: Duration = Duration::from_millis(10);

/// Accumulates events for one device until a flush boundary.
#[derive(Debug, Default)]
pub struct EventBatcher {
    events: Vec<InputEvent>,
    opened_at: Option<Instant>,
}

impl EventBatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event. Returns the completed batch when the event is a
    /// sync boundary, leaving the batcher empty.
    pub fn push(&mut self, event: InputEvent) -> Option<Vec<InputEvent>> {
        if self.events.is_empty() {
            self.opened_at = Some(Instant::now());
        }
        let flush = event.is_sync();
        self.events.push(event);
        if flush {
            self.take()
        } else {
            None
        }
    }

    /// Instant at which the open batch must be flushed, if one is open.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.opened_at.map(|at| at + FLUSH_INTERVAL)
    }

    /// Take the open batch regardless of boundaries (timer flush or
    /// teardown). Returns `None` when nothing is pending.
    pub fn take(&mut self) -> Option<Vec<InputEvent>> {
        self.opened_at = None;
        if self.events.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.events))
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(code: &str, value: i32) -> InputEvent {
        InputEvent::new(code, value, 0.0)
    }

    #[test]
    fn sync_event_closes_batch() {
        let mut batcher = EventBatcher::new();
        assert!(batcher.push(ev("ABS_X", 500)).is_none());
        assert!(batcher.push(ev("ABS_PRESSURE", 200)).is_none());
        let batch = batcher.push(ev("SYN_REPORT", 0)).expect("flush on sync");

        assert_eq!(batch.len(), 3);
        assert_eq!(batch.last().unwrap().code, "SYN_REPORT");
        assert!(batcher.is_empty());
    }

    #[test]
    fn sync_is_always_last_element() {
        let mut batcher = EventBatcher::new();
        batcher.push(ev("ABS_X", 1));
        let batch = batcher.push(ev("SYN_REPORT", 0)).unwrap();
        // Nothing after the sync; the next event opens a fresh batch.
        assert_eq!(batch.last().unwrap().code, "SYN_REPORT");
        assert!(batcher.push(ev("ABS_Y", 2)).is_none());
        assert_eq!(batcher.take().unwrap().len(), 1);
    }

    #[test]
    fn deadline_set_when_batch_opens() {
        let mut batcher = EventBatcher::new();
        assert!(batcher.deadline().is_none());

        let before = Instant::now();
        batcher.push(ev("ABS_X", 1));
        let deadline = batcher.deadline().unwrap();
        assert!(deadline >= before + FLUSH_INTERVAL);
        assert!(deadline <= Instant::now() + FLUSH_INTERVAL);

        // Deadline is anchored to the first event, not subsequent ones.
        batcher.push(ev("ABS_Y", 2));
        assert_eq!(batcher.deadline().unwrap(), deadline);
    }

    #[test]
    fn take_drains_partial_batch() {
        let mut batcher = EventBatcher::new();
        batcher.push(ev("ABS_X", 1));
        assert_eq!(batcher.take().unwrap().len(), 1);
        assert!(batcher.take().is_none());
        assert!(batcher.deadline().is_none());
    }
}
