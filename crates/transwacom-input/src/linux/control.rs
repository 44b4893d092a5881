//! Tablet mode and enable control around a share.
//!
//! While a tablet is shared, the host switches it to relative mode (so
//! the remote cursor does not chase the absolute coordinate plane) and
//! disables local delivery. Both actions go through external tools with
//! two back-ends each; success of either is sufficient. Prior state is
//! recorded before mutating and restored in reverse order on teardown.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::CaptureOptions;

/// Runs an external control tool and returns its stdout on success.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    async fn run(&self, program: &str, args: &[&str]) -> Option<String>;
}

/// Invokes the real `xinput` / `xsetwacom` binaries.
#[derive(Debug, Default)]
pub struct SystemToolRunner;

#[async_trait]
impl ToolRunner for SystemToolRunner {
    async fn run(&self, program: &str, args: &[&str]) -> Option<String> {
        let output = Command::new(program).args(args).output().await.ok()?;
        if output.status.success() {
            Some(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            debug!(program, ?args, code = ?output.status.code(), "control tool failed");
            None
        }
    }
}

/// Saves, mutates, and restores the X configuration of one tablet.
pub struct TabletController {
    device_name: String,
    runner: Arc<dyn ToolRunner>,
    tool_id: Option<String>,
    /// The device was enabled before we disabled it.
    was_enabled: bool,
    /// Mode to restore (recorded before switching to relative).
    original_mode: Option<String>,
    restored: bool,
}

impl TabletController {
    #[must_use]
    pub fn new(device_name: &str) -> Self {
        Self::with_runner(device_name, Arc::new(SystemToolRunner))
    }

    #[must_use]
    pub fn with_runner(device_name: &str, runner: Arc<dyn ToolRunner>) -> Self {
        Self {
            device_name: device_name.to_string(),
            runner,
            tool_id: None,
            was_enabled: false,
            original_mode: None,
            restored: false,
        }
    }

    /// Apply the requested adjustments before capture starts.
    ///
    /// Failures are logged and do not abort the share; restoration on
    /// teardown is still attempted for whatever succeeded.
    pub async fn apply(&mut self, options: CaptureOptions) {
        if options.relative_mode && !self.set_relative_mode().await {
            warn!(device = %self.device_name, "could not switch tablet to relative mode");
        }
        if options.disable_local && !self.disable_local().await {
            warn!(device = %self.device_name, "could not disable local tablet input");
        }
    }

    /// Resolve the X device id used by xinput/xsetwacom.
    async fn tool_id(&mut self) -> Option<String> {
        if self.tool_id.is_some() {
            return self.tool_id.clone();
        }

        if let Some(listing) = self.runner.run("xsetwacom", &["--list", "devices"]).await {
            for line in listing.lines() {
                if !line.contains(&self.device_name) && !line.to_lowercase().contains("stylus") {
                    continue;
                }
                let mut parts = line.split_whitespace();
                while let Some(part) = parts.next() {
                    if part == "id:" {
                        if let Some(id) = parts.next() {
                            self.tool_id = Some(id.to_string());
                            return self.tool_id.clone();
                        }
                    }
                }
            }
        }

        // Fallback: xinput knows the device by name.
        if let Some(listing) = self.runner.run("xinput", &["list", "--name-only"]).await {
            for line in listing.lines() {
                let lower = line.to_lowercase();
                if lower.contains("wacom") || lower.contains("pen") {
                    self.tool_id = Some(line.trim().to_string());
                    return self.tool_id.clone();
                }
            }
        }

        warn!(device = %self.device_name, "could not resolve tablet control id");
        None
    }

    /// Disable local delivery of tablet events.
    pub async fn disable_local(&mut self) -> bool {
        let Some(id) = self.tool_id().await else {
            return false;
        };

        let disabled = self.runner.run("xinput", &["disable", &id]).await.is_some()
            || self
                .runner
                .run("xsetwacom", &["--set", &id, "Touch", "off"])
                .await
                .is_some();

        if disabled {
            info!(device = %self.device_name, id = %id, "disabled local tablet input");
            self.was_enabled = true;
        }
        disabled
    }

    /// Switch the tablet to relative (mouse-like) positioning.
    pub async fn set_relative_mode(&mut self) -> bool {
        let Some(id) = self.tool_id().await else {
            return false;
        };

        let switched = self
            .runner
            .run("xsetwacom", &["--set", &id, "Mode", "Relative"])
            .await
            .is_some()
            || self
                .runner
                .run("xinput", &["set-mode", &id, "RELATIVE"])
                .await
                .is_some();

        if switched {
            info!(device = %self.device_name, id = %id, "tablet switched to relative mode");
            self.original_mode = Some("Absolute".to_string());
        }
        switched
    }

    /// Undo every adjustment, in reverse order of application.
    ///
    /// Idempotent; failures are logged but never block further cleanup.
    /// Must run on every exit path that applied adjustments.
    pub async fn restore(&mut self) {
        if self.restored {
            return;
        }
        self.restored = true;

        if self.was_enabled {
            let Some(id) = self.tool_id().await else {
                warn!(device = %self.device_name, "cannot restore: control id unavailable");
                return;
            };
            let enabled = self.runner.run("xinput", &["enable", &id]).await.is_some()
                || self
                    .runner
                    .run("xsetwacom", &["--set", &id, "Touch", "on"])
                    .await
                    .is_some();
            if enabled {
                info!(device = %self.device_name, "re-enabled local tablet input");
            } else {
                warn!(device = %self.device_name, "failed to re-enable local tablet input");
            }
        }

        if let Some(mode) = self.original_mode.take() {
            let Some(id) = self.tool_id().await else {
                return;
            };
            let switched = self
                .runner
                .run("xsetwacom", &["--set", &id, "Mode", &mode])
                .await
                .is_some()
                || self
                    .runner
                    .run("xinput", &["set-mode", &id, &mode.to_uppercase()])
                    .await
                    .is_some();
            if switched {
                info!(device = %self.device_name, mode = %mode, "restored tablet mode");
            } else {
                warn!(device = %self.device_name, "failed to restore tablet mode");
            }
        }
    }

    /// Whether restoration has already run.
    #[must_use]
    pub fn is_restored(&self) -> bool {
        self.restored
    }
}
