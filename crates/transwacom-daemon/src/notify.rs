//! User-visible notifications.
//!
//! The desktop tray integration is an external collaborator; the daemon
//! only talks to this trait. The default implementation writes to the
//! terminal and the log.

/// Sink for events the user should see (connection lost, rejected, ...).
pub trait Notifier: Send + Sync {
    fn notify(&self, title: &str, body: &str);
}

/// Prints notifications to stderr and the structured log.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, title: &str, body: &str) {
        tracing::info!(title, body, "notification");
        eprintln!("[{title}] {body}");
    }
}
