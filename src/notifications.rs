//! Desktop notifications for error alerts
//!
//! Only failures are announced; routine copies stay in the log.

use notify_rust::{Notification, Timeout};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::warn;

/// Global flag to enable/disable notifications
static NOTIFICATIONS_ENABLED: AtomicBool = AtomicBool::new(false);

/// Initialize notifications with the enabled setting
pub fn init(enabled: bool) {
    NOTIFICATIONS_ENABLED.store(enabled, Ordering::SeqCst);
}

/// Check if notifications are enabled
pub fn is_enabled() -> bool {
    NOTIFICATIONS_ENABLED.load(Ordering::SeqCst)
}

#[derive(Debug, Clone, Copy)]
pub enum NotificationKind {
    /// A routed file could not be copied
    CopyError,
    /// A watch folder could not be watched
    WatchError,
}

impl NotificationKind {
    fn icon(&self) -> &'static str {
        match self {
            NotificationKind::CopyError => "dialog-error",
            NotificationKind::WatchError => "dialog-warning",
        }
    }

    fn prefix(&self) -> &'static str {
        match self {
            NotificationKind::CopyError => "Copy Error",
            NotificationKind::WatchError => "Watch Error",
        }
    }
}

/// Send a notification if enabled.
///
/// Fire-and-forget: failures are logged and never propagate.
pub fn notify(kind: NotificationKind, message: &str) {
    if !is_enabled() {
        return;
    }

    let result = Notification::new()
        .appname("AutoSort")
        .summary(&format!("AutoSort: {}", kind.prefix()))
        .body(message)
        .icon(kind.icon())
        .timeout(Timeout::Milliseconds(5000))
        .show();

    if let Err(e) = result {
        warn!("Failed to send notification: {}", e);
    }
}

pub fn notify_copy_error(path: &str, error: &str) {
    notify(
        NotificationKind::CopyError,
        &format!("Could not copy '{}': {}", path, error),
    );
}

pub fn notify_watch_error(path: &str, error: &str) {
    notify(
        NotificationKind::WatchError,
        &format!("Watch '{}': {}", path, error),
    );
}
