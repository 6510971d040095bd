use crate::{AiConfigState, MessageStatus, QueueState, QueuedMessage};

/// Read-side projection of [`QueueState`], partitioned by message status.
///
/// Partitions are disjoint and keep enqueue order. A view is a snapshot: later
/// updates (including a clear) never touch an already computed view.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueueViewModel {
    pub pending_messages: Vec<QueuedMessage>,
    pub processing_messages: Vec<QueuedMessage>,
    pub completed_messages: Vec<QueuedMessage>,
    pub failed_messages: Vec<QueuedMessage>,
    pub total_messages: usize,
    pub error: Option<String>,
    pub buffered: usize,
    pub buffered_processed: usize,
    pub worker_initialized: bool,
    pub config: AiConfigState,
}

impl QueueViewModel {
    pub(crate) fn from_state(state: &QueueState) -> Self {
        let mut view = QueueViewModel {
            total_messages: state.messages().len(),
            error: state.error().map(ToOwned::to_owned),
            buffered: state.buffer().len(),
            buffered_processed: state.buffer().processed_count(),
            worker_initialized: state.worker_initialized(),
            config: state.config().clone(),
            ..QueueViewModel::default()
        };

        for message in state.messages() {
            let bucket = match message.status {
                MessageStatus::Pending => &mut view.pending_messages,
                MessageStatus::Processing => &mut view.processing_messages,
                MessageStatus::Completed => &mut view.completed_messages,
                MessageStatus::Failed => &mut view.failed_messages,
            };
            bucket.push(message.clone());
        }

        view
    }

    pub fn is_idle(&self) -> bool {
        self.pending_messages.is_empty() && self.processing_messages.is_empty()
    }
}
