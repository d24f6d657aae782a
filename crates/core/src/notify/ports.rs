//! Port interface for user-facing notices

use rentline_domain::Notice;

/// Displays a short message to the user (toast, status bar, log line).
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notice: Notice);
}
