//! Courier engine: background worker, message processors and backend plumbing.
mod backend;
mod completion;
mod config_sync;
mod persist;
mod processor;
mod queue;
mod types;
mod worker;

pub use backend::{
    BackendError, ChangeEvent, ChangeFeed, ChangeFilter, ChangeKind, LocalBackend, RemoteTable,
    Row, SessionProvider, Subscription, UserId,
};
pub use completion::{
    CompletionError, CompletionProcessor, CompletionProvider, CompletionRequest,
    FallbackCompleter, HttpCompletionProvider, ProviderSettings,
};
pub use config_sync::{ConfigSync, HistoryEntry, HISTORY_TABLE};
pub use persist::{ensure_data_dir, PersistError, SnapshotFile};
pub use processor::{Processor, SimulatedProcessor};
pub use queue::WorkQueue;
pub use types::{
    MessageId, ProcessError, ProcessOutput, WorkItem, WorkerCommand, WorkerEvent, WorkerSettings,
    BATCH_SIZE, MAX_RETRIES, PROCESS_INTERVAL,
};
pub use worker::WorkerHandle;
