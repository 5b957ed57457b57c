//! Desktop notification sink — `spec.md` §4.E invariant 6.
//!
//! Fires on `[COMPLETE]`/`[QUESTION]`. Best-effort: a missing notification
//! daemon must never interrupt the turn loop.

use shellmind_agent::NotificationSink;
use tracing::debug;

pub struct DesktopNotifier;

impl NotificationSink for DesktopNotifier {
    fn notify(&self, title: &str, body: &str) {
        if let Err(e) = notify_rust::Notification::new().summary(title).body(body).show() {
            debug!(error = %e, "desktop notification failed");
        }
    }
}
