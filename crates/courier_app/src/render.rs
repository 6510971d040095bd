use std::collections::HashSet;

use chrono::DateTime;
use courier_core::{
    ConfigKind, InterfaceConfig, MessageId, Notification, NotificationLevel, QueueViewModel,
    QueuedMessage,
};

/// Turns view models into terminal lines. Each finished message is printed once.
#[derive(Debug, Default)]
pub struct Renderer {
    shown: HashSet<MessageId>,
    last_summary: Option<String>,
}

impl Renderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn render(&mut self, view: &QueueViewModel) -> Vec<String> {
        let interface = view.config.interface.value();
        let mut lines = Vec::new();

        for message in &view.completed_messages {
            if self.shown.insert(message.id) {
                lines.push(completed_line(message, interface));
            }
        }
        for message in &view.failed_messages {
            if self.shown.insert(message.id) {
                lines.push(failed_line(message, interface));
            }
        }

        let summary = summary_line(view);
        if self.last_summary.as_deref() != Some(summary.as_str()) {
            if !interface.compact {
                lines.push(summary.clone());
            }
            self.last_summary = Some(summary);
        }
        lines
    }

    pub fn notification(&self, notification: &Notification, view: &QueueViewModel) -> Option<String> {
        if !view.config.interface.value().notifications {
            return None;
        }
        let level = match notification.level {
            NotificationLevel::Error => "error",
            NotificationLevel::Warning => "warning",
        };
        Some(format!(
            "[{level}] {}: {}",
            notification.title, notification.body
        ))
    }
}

pub fn status_lines(view: &QueueViewModel) -> Vec<String> {
    let config = &view.config;
    let provider = config.provider.value();
    let personality = config.personality.value();
    let interface = config.interface.value();

    let mut lines = vec![
        summary_line(view),
        format!(
            "worker: {}",
            if view.worker_initialized {
                "running"
            } else {
                "not started"
            }
        ),
        format!(
            "provider{}: {} {} ({}) temperature={} max_tokens={}",
            marker(view, ConfigKind::Provider),
            provider.provider,
            provider.model,
            provider.base_url,
            provider.temperature,
            provider.max_tokens
        ),
        format!(
            "personality{}: {} tone={} instructions={}",
            marker(view, ConfigKind::Personality),
            personality.name,
            personality.tone,
            personality.instructions.len()
        ),
        format!(
            "interface{}: theme={} timestamps={} compact={} notifications={}",
            marker(view, ConfigKind::Interface),
            interface.theme,
            interface.show_timestamps,
            interface.compact,
            interface.notifications
        ),
    ];
    if let Some(error) = &view.error {
        lines.push(format!("last error: {error}"));
    }
    lines
}

fn marker(view: &QueueViewModel, kind: ConfigKind) -> &'static str {
    if view.config.error(kind).is_some() {
        " [sync failed]"
    } else if view.config.is_dirty(kind) {
        " [unsynced]"
    } else {
        ""
    }
}

fn summary_line(view: &QueueViewModel) -> String {
    format!(
        "queue: {} pending, {} processing, {} completed, {} failed | buffer: {} ({} processed)",
        view.pending_messages.len(),
        view.processing_messages.len(),
        view.completed_messages.len(),
        view.failed_messages.len(),
        view.buffered,
        view.buffered_processed
    )
}

fn completed_line(message: &QueuedMessage, interface: &InterfaceConfig) -> String {
    let prefix = prefix(message, interface);
    match (&message.reply, interface.compact) {
        (Some(reply), true) => format!("{prefix}{reply}"),
        (Some(reply), false) => format!("{prefix}> {}\n{reply}", message.content),
        (None, _) => format!("{prefix}done: {}", message.content),
    }
}

fn failed_line(message: &QueuedMessage, interface: &InterfaceConfig) -> String {
    let error = message.last_error.as_deref().unwrap_or("unknown error");
    if interface.compact {
        return format!("{}failed: {error}", prefix(message, interface));
    }
    format!(
        "{}failed after {} retries: {} ({error})",
        prefix(message, interface),
        message.retries,
        message.content
    )
}

fn prefix(message: &QueuedMessage, interface: &InterfaceConfig) -> String {
    let stamp = interface
        .show_timestamps
        .then(|| DateTime::from_timestamp_millis(message.timestamp_ms))
        .flatten()
        .map(|time| format!("[{}] ", time.format("%H:%M:%S")))
        .unwrap_or_default();
    format!("{stamp}#{} ", message.id)
}
