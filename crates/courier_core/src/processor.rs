use crate::{ConfigKind, Msg, QueueViewModel};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Error,
    Warning,
}

/// A user-visible toast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub title: String,
    pub body: String,
}

/// View-side companion of the queue: triggers worker start-up on mount and
/// turns error fields into notifications, once per new value.
#[derive(Debug, Clone, Default)]
pub struct MessageProcessor {
    mounted: bool,
    last_queue_error: Option<String>,
    last_config_errors: [Option<String>; 3],
}

impl MessageProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `Msg::InitializeWorker` on the first call only.
    pub fn mount(&mut self) -> Option<Msg> {
        if self.mounted {
            return None;
        }
        self.mounted = true;
        Some(Msg::InitializeWorker)
    }

    /// Compares the view against the last observed one. An error that did not
    /// change raises nothing; an error that was cleared and comes back raises again.
    pub fn observe(&mut self, view: &QueueViewModel) -> Vec<Notification> {
        let mut notifications = Vec::new();

        if let Some(error) = changed(&mut self.last_queue_error, view.error.as_deref()) {
            notifications.push(Notification {
                level: NotificationLevel::Error,
                title: "Message processing failed".to_string(),
                body: error,
            });
        }

        for (slot, kind) in self.last_config_errors.iter_mut().zip(ConfigKind::ALL) {
            if let Some(error) = changed(slot, view.config.error(kind)) {
                notifications.push(Notification {
                    level: NotificationLevel::Warning,
                    title: format!("Could not sync {} settings", kind.label()),
                    body: error,
                });
            }
        }

        notifications
    }
}

fn changed(last: &mut Option<String>, current: Option<&str>) -> Option<String> {
    if last.as_deref() == current {
        return None;
    }
    *last = current.map(ToOwned::to_owned);
    last.clone()
}
