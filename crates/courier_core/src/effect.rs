use crate::{BufferedMessage, ConfigKind, ConfigValue, MessageId};

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Create the background worker unless one already exists.
    SpawnWorker,
    /// `retries` is the failed-attempt count so far; non-zero only on resubmission.
    ForwardMessage {
        id: MessageId,
        content: String,
        timestamp_ms: i64,
        retries: u32,
    },
    ClearWorker,
    FetchConfig { kind: ConfigKind },
    PersistConfig { value: ConfigValue, revision: u64 },
    AppendHistory { entries: Vec<BufferedMessage> },
}
