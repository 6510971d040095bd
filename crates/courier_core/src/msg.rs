use crate::{ConfigKind, ConfigValue, MessageId};

#[derive(Debug, Clone, PartialEq)]
pub enum Msg {
    /// View mounted; spawn the background worker if it does not exist yet.
    InitializeWorker,
    /// User submitted chat content. No validation: empty content is queued too.
    EnqueueRequested { content: String, timestamp_ms: i64 },
    /// User asked to drop every queued message.
    ClearRequested,
    /// User asked to move processed buffer entries into the chat history.
    FlushBufferRequested,
    /// Worker picked a message up for an attempt (1-based).
    ProcessStarted { id: MessageId, attempt: u32 },
    /// Worker attempt failed and the message went back to the front of its queue.
    ProcessRetrying {
        id: MessageId,
        retries: u32,
        error: String,
    },
    /// Worker finished a message.
    ProcessComplete {
        id: MessageId,
        reply: Option<String>,
    },
    /// Worker gave up on a message after exhausting its retry budget.
    ProcessError {
        id: MessageId,
        error: String,
        retries: u32,
    },
    /// Worker settled a batch; carries the ids that completed in it.
    BatchProcessed { ids: Vec<MessageId> },
    /// Worker execution context failed.
    WorkerFault { error: String },
    /// Worker came back after a fault with an empty queue.
    WorkerRestarted { restarts: u32 },
    /// Worker gave up restarting; it will not report on anything still queued.
    WorkerStopped { restarts: u32 },
    /// AI configuration slice traffic.
    Config(ConfigMsg),
    /// UI/render tick to coalesce rendering.
    Tick,
    /// Fallback for placeholder wiring.
    NoOp,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigMsg {
    FetchRequested(ConfigKind),
    Fetched(ConfigValue),
    /// Backend has no row for this user yet; defaults stay in place.
    FetchMissing(ConfigKind),
    FetchFailed { kind: ConfigKind, error: String },
    /// Optimistic local write.
    Set(ConfigValue),
    Persisted { kind: ConfigKind, revision: u64 },
    PersistFailed {
        kind: ConfigKind,
        revision: u64,
        error: String,
    },
    /// Re-send the local value of a dirty slice.
    RetrySync(ConfigKind),
    /// Drop unsynced local edits and go back to the last synced value.
    Revert(ConfigKind),
}
