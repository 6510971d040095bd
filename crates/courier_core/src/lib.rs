//! Courier core: pure queue state machine, configuration slices and view-model helpers.
mod buffer;
mod config;
mod effect;
mod msg;
mod processor;
mod state;
mod update;
mod view_model;

pub use buffer::{BufferedMessage, MessageBuffer};
pub use config::{
    AiConfigState, ConfigKind, ConfigSlice, ConfigValue, InterfaceConfig, PersonalityConfig,
    ProviderConfig,
};
pub use effect::Effect;
pub use msg::{ConfigMsg, Msg};
pub use processor::{MessageProcessor, Notification, NotificationLevel};
pub use state::{MessageId, MessageStatus, QueueState, QueuedMessage};
pub use update::update;
pub use view_model::QueueViewModel;
