use std::collections::VecDeque;

use courier_logging::{courier_debug, courier_warn};

use crate::{ProcessError, ProcessOutput, WorkItem, WorkerEvent};

/// The worker's own queue: FIFO, except that retried items go back to the front.
#[derive(Debug, Clone)]
pub struct WorkQueue {
    items: VecDeque<WorkItem>,
    batch_size: usize,
    max_retries: u32,
}

impl WorkQueue {
    pub fn new(batch_size: usize, max_retries: u32) -> Self {
        Self {
            items: VecDeque::new(),
            batch_size: batch_size.max(1),
            max_retries: max_retries.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn ids(&self) -> Vec<u64> {
        self.items.iter().map(|item| item.id).collect()
    }

    pub fn push_back(&mut self, item: WorkItem) {
        self.items.push_back(item);
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Removes up to `batch_size` items from the front.
    pub fn take_batch(&mut self) -> Vec<WorkItem> {
        let count = self.items.len().min(self.batch_size);
        self.items.drain(..count).collect()
    }

    /// Applies the outcomes of one batch and returns the events to report, in
    /// batch order, followed by `BatchProcessed`.
    ///
    /// Failed items under the retry budget are pushed back to the front,
    /// keeping their relative order; the rest are dropped with `ProcessError`.
    pub fn settle(
        &mut self,
        outcomes: Vec<(WorkItem, Result<ProcessOutput, ProcessError>)>,
    ) -> Vec<WorkerEvent> {
        let mut events = Vec::with_capacity(outcomes.len() + 1);
        let mut completed = Vec::new();
        let mut retry = Vec::new();

        for (mut item, outcome) in outcomes {
            match outcome {
                Ok(output) => {
                    completed.push(item.id);
                    events.push(WorkerEvent::ProcessComplete {
                        id: item.id,
                        reply: output.reply,
                    });
                }
                Err(err) => {
                    item.retries += 1;
                    let error = err.to_string();
                    if item.retries < self.max_retries {
                        courier_debug!(
                            "message {} attempt {} failed, retrying: {}",
                            item.id,
                            item.retries,
                            error
                        );
                        events.push(WorkerEvent::ProcessRetrying {
                            id: item.id,
                            retries: item.retries,
                            error,
                        });
                        retry.push(item);
                    } else {
                        courier_warn!(
                            "message {} failed after {} attempts: {}",
                            item.id,
                            item.retries,
                            error
                        );
                        events.push(WorkerEvent::ProcessError {
                            id: item.id,
                            error,
                            retries: item.retries,
                        });
                    }
                }
            }
        }

        for item in retry.into_iter().rev() {
            self.items.push_front(item);
        }
        events.push(WorkerEvent::BatchProcessed { ids: completed });
        events
    }
}
