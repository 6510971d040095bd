use crate::MessageId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferedMessage {
    pub id: MessageId,
    pub content: String,
    pub timestamp_ms: i64,
    pub processed: bool,
}

/// Secondary view of enqueued messages, flipped to `processed` by batch reports.
///
/// Processed entries stay until drained, so the chat history can be written
/// in batches rather than one row per completion.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MessageBuffer {
    entries: Vec<BufferedMessage>,
}

impl MessageBuffer {
    pub fn entries(&self) -> &[BufferedMessage] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn processed_count(&self) -> usize {
        self.entries.iter().filter(|entry| entry.processed).count()
    }

    pub(crate) fn push(&mut self, id: MessageId, content: String, timestamp_ms: i64) {
        self.entries.push(BufferedMessage {
            id,
            content,
            timestamp_ms,
            processed: false,
        });
    }

    /// Marks matching entries processed; returns how many changed. Unknown ids are ignored.
    pub(crate) fn mark_processed(&mut self, ids: &[MessageId]) -> usize {
        let mut changed = 0;
        for entry in &mut self.entries {
            if !entry.processed && ids.contains(&entry.id) {
                entry.processed = true;
                changed += 1;
            }
        }
        changed
    }

    /// Drops the entry for a message that will never be processed.
    pub(crate) fn remove(&mut self, id: MessageId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.id != id);
        self.entries.len() != before
    }

    /// Removes and returns processed entries, keeping the rest in order.
    pub(crate) fn drain_processed(&mut self) -> Vec<BufferedMessage> {
        let (processed, remaining) = std::mem::take(&mut self.entries)
            .into_iter()
            .partition(|entry| entry.processed);
        self.entries = remaining;
        processed
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}
