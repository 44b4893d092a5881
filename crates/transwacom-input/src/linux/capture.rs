//! evdev-based input capture.
//!
//! Each captured device gets a dedicated task that owns the device
//! handle exclusively, translates raw events to wire form, and flushes
//! batches to an async sink. Stopping a capture unblocks the read within
//! one pending event and always runs tablet restoration before the path
//! is released.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use evdev::{Device, EventStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use transwacom_types::{codes, DeviceDescriptor, DeviceType, InputEvent};

use super::control::TabletController;
use crate::batch::EventBatcher;
use crate::claims::ClaimTable;
use crate::error::InputError;
use crate::CaptureOptions;

/// Where capture loops deliver completed batches.
pub type BatchSink = mpsc::Sender<(DeviceType, Vec<InputEvent>)>;

struct ActiveCapture {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
    /// Present for tablets; shared with the capture task so restoration
    /// can also run from here if the task does not wind down in time.
    controller: Option<Arc<tokio::sync::Mutex<TabletController>>>,
}

/// Manages capture loops, one per device path.
///
/// Double-capture of the same path is rejected with a busy error before
/// any device state is touched.
#[derive(Default)]
pub struct CaptureManager {
    claims: ClaimTable,
    active: Mutex<HashMap<PathBuf, ActiveCapture>>,
}

impl CaptureManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start capturing from a device and stream batches into `sink`.
    pub async fn start_capture(
        &self,
        descriptor: &DeviceDescriptor,
        sink: BatchSink,
        options: CaptureOptions,
    ) -> Result<(), InputError> {
        let path = PathBuf::from(&descriptor.path);
        self.claims.claim(&path)?;

        let result = self
            .start_claimed(descriptor, &path, sink, options)
            .await;
        if result.is_err() {
            self.claims.release(&path);
        }
        result
    }

    async fn start_claimed(
        &self,
        descriptor: &DeviceDescriptor,
        path: &Path,
        sink: BatchSink,
        options: CaptureOptions,
    ) -> Result<(), InputError> {
        let device =
            Device::open(path).map_err(|e| InputError::DeviceOpen(format!("{}: {e}", path.display())))?;
        let stream = device
            .into_event_stream()
            .map_err(|e| InputError::DeviceOpen(format!("{}: {e}", path.display())))?;

        // Tablet adjustments happen before any event flows so the local
        // cursor stops moving the moment the share starts.
        let controller = if descriptor.device_type == DeviceType::Wacom {
            let controller = Arc::new(tokio::sync::Mutex::new(TabletController::new(
                &descriptor.name,
            )));
            controller.lock().await.apply(options).await;
            Some(controller)
        } else {
            None
        };

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run_capture(
            stream,
            descriptor.device_type,
            sink,
            shutdown_rx,
            controller.clone(),
        ));

        info!(path = %path.display(), device = %descriptor.name, "capture started");
        self.active.lock().unwrap_or_else(std::sync::PoisonError::into_inner).insert(
            path.to_path_buf(),
            ActiveCapture {
                shutdown: shutdown_tx,
                task,
                controller,
            },
        );
        Ok(())
    }

    /// Stop one capture, restoring tablet state before the path frees up.
    pub async fn stop_capture(&self, path: &Path) -> Result<(), InputError> {
        let entry = self
            .active
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(path)
            .ok_or_else(|| InputError::NotCaptured(path.to_path_buf()))?;

        let _ = entry.shutdown.send(true);
        if tokio::time::timeout(Duration::from_secs(2), entry.task)
            .await
            .is_err()
        {
            // The task is wedged in a syscall; restore directly. The
            // controller makes restoration idempotent, so a late task
            // exit cannot double-apply.
            warn!(path = %path.display(), "capture task did not stop in time");
            if let Some(controller) = &entry.controller {
                controller.lock().await.restore().await;
            }
        }

        self.claims.release(path);
        info!(path = %path.display(), "capture stopped");
        Ok(())
    }

    /// Stop every active capture. Safe to call repeatedly.
    pub async fn stop_all(&self) {
        let paths: Vec<PathBuf> = self
            .active
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        for path in paths {
            if let Err(e) = self.stop_capture(&path).await {
                debug!(path = %path.display(), error = %e, "stop during shutdown");
            }
        }
    }

    #[must_use]
    pub fn is_capturing(&self, path: &Path) -> bool {
        self.claims.is_claimed(path)
    }

    /// Paths of all active captures.
    #[must_use]
    pub fn active_paths(&self) -> Vec<PathBuf> {
        self.claims.claimed()
    }
}

async fn run_capture(
    mut stream: EventStream,
    device_type: DeviceType,
    sink: BatchSink,
    mut shutdown: watch::Receiver<bool>,
    controller: Option<Arc<tokio::sync::Mutex<TabletController>>>,
) {
    let mut batcher = EventBatcher::new();

    loop {
        let flush_at = batcher.deadline();
        tokio::select! {
            _ = shutdown.changed() => break,

            () = async {
                tokio::time::sleep_until(flush_at.unwrap_or_else(tokio::time::Instant::now)).await;
            }, if flush_at.is_some() => {
                if let Some(batch) = batcher.take() {
                    if sink.send((device_type, batch)).await.is_err() {
                        break;
                    }
                }
            }

            result = stream.next_event() => {
                match result {
                    Ok(raw) => {
                        let event = convert_event(&raw);
                        if let Some(batch) = batcher.push(event) {
                            if sink.send((device_type, batch)).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "device read error");
                        break;
                    }
                }
            }
        }
    }

    // Restoration runs on every exit path of the loop, including read
    // errors and a dropped sink.
    if let Some(controller) = controller {
        controller.lock().await.restore().await;
    }
}

/// Translate a raw evdev event into wire form.
fn convert_event(raw: &evdev::InputEvent) -> InputEvent {
    let code = codes::name_for(raw.event_type().0, raw.code());
    let timestamp = raw
        .timestamp()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0);
    InputEvent::new(code, raw.value(), timestamp)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn start_nonexistent_device_releases_claim() {
        let manager = CaptureManager::new();
        let descriptor = DeviceDescriptor {
            device_type: DeviceType::Wacom,
            path: "/nonexistent/event99".to_string(),
            name: "Ghost Tablet".to_string(),
            capabilities: vec![],
            vendor_id: None,
            product_id: None,
        };
        let (sink, _rx) = mpsc::channel(8);

        let err = manager
            .start_capture(&descriptor, sink.clone(), CaptureOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, InputError::DeviceOpen(_)));

        // The failed start must not leave the path claimed.
        assert!(!manager.is_capturing(Path::new("/nonexistent/event99")));
    }

    #[tokio::test]
    async fn stop_unknown_path_errors() {
        let manager = CaptureManager::new();
        let err = manager
            .stop_capture(Path::new("/dev/input/event42"))
            .await
            .unwrap_err();
        assert!(matches!(err, InputError::NotCaptured(_)));
    }
}
