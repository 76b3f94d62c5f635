//! Notification sinks

use std::sync::{Mutex, PoisonError};

use crate::domain::{Notification, Severity};

use super::ports::Notifier;

/// Collects the notifications raised while serving one request so they can
/// be returned to the client with the response.
#[derive(Debug, Default)]
pub struct NotificationBuffer {
    items: Mutex<Vec<Notification>>,
}

impl NotificationBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain everything collected so far
    pub fn take(&self) -> Vec<Notification> {
        std::mem::take(&mut *self.items.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl Notifier for NotificationBuffer {
    fn notify(&self, notification: Notification) {
        match notification.severity {
            Severity::Destructive => tracing::warn!(
                title = %notification.title,
                description = %notification.description,
                "User notification"
            ),
            Severity::Default => tracing::debug!(
                title = %notification.title,
                "User notification"
            ),
        }
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(notification);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_take_drains() {
        let buffer = NotificationBuffer::new();
        buffer.notify(Notification::session_expired());
        buffer.notify(Notification::fetch_exhausted());

        let taken = buffer.take();
        assert_eq!(taken.len(), 2);
        assert_eq!(taken[0], Notification::session_expired());
        assert!(buffer.take().is_empty());
    }
}
