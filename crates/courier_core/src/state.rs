use crate::buffer::MessageBuffer;
use crate::config::AiConfigState;
use crate::view_model::QueueViewModel;

pub type MessageId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MessageStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl MessageStatus {
    /// Completed and failed messages never change status again.
    pub fn is_terminal(self) -> bool {
        matches!(self, MessageStatus::Completed | MessageStatus::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedMessage {
    pub id: MessageId,
    pub content: String,
    /// Milliseconds since the Unix epoch, assigned at enqueue time.
    pub timestamp_ms: i64,
    pub status: MessageStatus,
    pub retries: u32,
    pub last_error: Option<String>,
    pub reply: Option<String>,
}

/// UI-facing projection of the chat queue plus the AI configuration slices.
///
/// Only `update` mutates it; the worker's own queue is the source of truth for
/// what is still to be processed.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueState {
    messages: Vec<QueuedMessage>,
    error: Option<String>,
    worker_initialized: bool,
    next_id: MessageId,
    buffer: MessageBuffer,
    config: AiConfigState,
    dirty: bool,
}

impl Default for QueueState {
    fn default() -> Self {
        Self {
            messages: Vec::new(),
            error: None,
            worker_initialized: false,
            next_id: 1,
            buffer: MessageBuffer::default(),
            config: AiConfigState::default(),
            dirty: false,
        }
    }
}

impl QueueState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn view(&self) -> QueueViewModel {
        QueueViewModel::from_state(self)
    }

    pub fn messages(&self) -> &[QueuedMessage] {
        &self.messages
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn worker_initialized(&self) -> bool {
        self.worker_initialized
    }

    pub fn buffer(&self) -> &MessageBuffer {
        &self.buffer
    }

    pub fn config(&self) -> &AiConfigState {
        &self.config
    }

    /// Returns whether anything changed since the last call, and resets the flag.
    pub fn consume_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub(crate) fn config_mut(&mut self) -> &mut AiConfigState {
        &mut self.config
    }

    pub(crate) fn buffer_mut(&mut self) -> &mut MessageBuffer {
        &mut self.buffer
    }

    /// Returns true only for the first call.
    pub(crate) fn initialize_worker(&mut self) -> bool {
        if self.worker_initialized {
            return false;
        }
        self.worker_initialized = true;
        self.mark_dirty();
        true
    }

    pub(crate) fn push_message(&mut self, content: String, timestamp_ms: i64) -> &QueuedMessage {
        let id = self.next_id;
        self.next_id += 1;
        self.messages.push(QueuedMessage {
            id,
            content,
            timestamp_ms,
            status: MessageStatus::Pending,
            retries: 0,
            last_error: None,
            reply: None,
        });
        self.mark_dirty();
        &self.messages[self.messages.len() - 1]
    }

    /// Drops every message and the error. The id counter keeps counting so
    /// late worker events for cleared ids match nothing.
    pub(crate) fn clear(&mut self) {
        self.messages.clear();
        self.error = None;
        self.buffer.clear();
        self.mark_dirty();
    }

    pub(crate) fn set_error(&mut self, error: String) {
        self.error = Some(error);
        self.mark_dirty();
    }

    pub(crate) fn apply_started(&mut self, id: MessageId, attempt: u32) {
        let Some(message) = self.find_mut(id) else {
            return;
        };
        if message.status != MessageStatus::Pending {
            return;
        }
        message.status = MessageStatus::Processing;
        message.retries = attempt.saturating_sub(1);
        self.mark_dirty();
    }

    pub(crate) fn apply_retrying(&mut self, id: MessageId, retries: u32, error: String) {
        let Some(message) = self.find_mut(id) else {
            return;
        };
        if message.status.is_terminal() {
            return;
        }
        message.status = MessageStatus::Pending;
        message.retries = retries;
        message.last_error = Some(error);
        self.mark_dirty();
    }

    pub(crate) fn apply_completed(&mut self, id: MessageId, reply: Option<String>) {
        let Some(message) = self.find_mut(id) else {
            return;
        };
        if message.status.is_terminal() {
            return;
        }
        message.status = MessageStatus::Completed;
        message.reply = reply;
        self.mark_dirty();
    }

    /// Returns false when the event was stale and nothing changed.
    pub(crate) fn apply_failed(&mut self, id: MessageId, error: &str, retries: u32) -> bool {
        let Some(message) = self.find_mut(id) else {
            return false;
        };
        if message.status.is_terminal() {
            return false;
        }
        message.status = MessageStatus::Failed;
        message.retries = retries;
        message.last_error = Some(error.to_string());
        self.mark_dirty();
        true
    }

    /// Fails every unfinished message with `error` and forgets the worker, so
    /// the next enqueue spawns a fresh one.
    pub(crate) fn fail_unfinished(&mut self, error: &str) {
        let mut failed = Vec::new();
        for message in &mut self.messages {
            if message.status.is_terminal() {
                continue;
            }
            message.status = MessageStatus::Failed;
            message.last_error = Some(error.to_string());
            failed.push(message.id);
        }
        for id in &failed {
            self.buffer.remove(*id);
        }
        self.worker_initialized = false;
        self.set_error(error.to_string());
    }

    /// Puts every unfinished message back to pending and returns them for resubmission.
    pub(crate) fn reset_unfinished(&mut self) -> Vec<QueuedMessage> {
        let mut unfinished = Vec::new();
        for message in &mut self.messages {
            if message.status.is_terminal() {
                continue;
            }
            message.status = MessageStatus::Pending;
            unfinished.push(message.clone());
        }
        if !unfinished.is_empty() {
            self.mark_dirty();
        }
        unfinished
    }

    fn find_mut(&mut self, id: MessageId) -> Option<&mut QueuedMessage> {
        self.messages.iter_mut().find(|message| message.id == id)
    }
}
