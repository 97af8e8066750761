//! Default notification sink.

use column_traits::{Notification, Notifier, Severity};

/// Renders notifications as `tracing` events at a matching level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&mut self, n: &Notification) {
        match n.severity {
            Severity::Info | Severity::Success => {
                tracing::info!(target: "column::notify", severity = n.severity.as_str(), title = %n.title, "{}", n.message);
            }
            Severity::Warning => {
                tracing::warn!(target: "column::notify", title = %n.title, "{}", n.message);
            }
            Severity::Error => {
                tracing::error!(target: "column::notify", title = %n.title, "{}", n.message);
            }
        }
    }
}
