use std::time::Duration;

use crate::completion::CompletionError;

pub type MessageId = u64;

pub const MAX_RETRIES: u32 = 3;
pub const BATCH_SIZE: usize = 10;
pub const PROCESS_INTERVAL: Duration = Duration::from_millis(1000);

/// A message as the worker sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub id: MessageId,
    pub content: String,
    pub timestamp_ms: i64,
    /// Failed attempts so far. Only the worker increments it.
    pub retries: u32,
}

impl WorkItem {
    pub fn new(id: MessageId, content: impl Into<String>, timestamp_ms: i64) -> Self {
        Self {
            id,
            content: content.into(),
            timestamp_ms,
            retries: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerCommand {
    Enqueue(WorkItem),
    Clear,
    /// Ends the running actor abnormally, as a crash would. The supervisor
    /// then applies its restart policy.
    InjectFault(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    ProcessStarted {
        id: MessageId,
        attempt: u32,
    },
    ProcessRetrying {
        id: MessageId,
        retries: u32,
        error: String,
    },
    ProcessComplete {
        id: MessageId,
        reply: Option<String>,
    },
    ProcessError {
        id: MessageId,
        error: String,
        retries: u32,
    },
    /// Ids that completed in the batch that just settled.
    BatchProcessed {
        ids: Vec<MessageId>,
    },
    WorkerFault {
        error: String,
    },
    WorkerRestarted {
        restarts: u32,
    },
    /// Restart budget exhausted; the worker accepts no more work.
    WorkerStopped {
        restarts: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProcessOutput {
    pub reply: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("processing timed out after {0:?}")]
    Timeout(Duration),
    #[error("simulated processing failure")]
    Simulated,
    #[error(transparent)]
    Completion(#[from] CompletionError),
    #[error("worker fault: {0}")]
    Fault(String),
}

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub max_retries: u32,
    pub batch_size: usize,
    /// Pause between two passes while the queue is non-empty.
    pub process_interval: Duration,
    /// Delay between an enqueue into an idle worker and the pass it triggers,
    /// so a burst of enqueues lands in one batch.
    pub enqueue_debounce: Duration,
    pub message_timeout: Duration,
    pub restart_backoff: Duration,
    pub max_restart_backoff: Duration,
    pub max_restarts: u32,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            batch_size: BATCH_SIZE,
            process_interval: PROCESS_INTERVAL,
            enqueue_debounce: Duration::from_millis(10),
            message_timeout: Duration::from_secs(30),
            restart_backoff: Duration::from_millis(500),
            max_restart_backoff: Duration::from_secs(30),
            max_restarts: 5,
        }
    }
}
