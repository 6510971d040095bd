use std::sync::{mpsc, Arc};
use std::time::Duration;

use anyhow::{bail, Context};
use courier_core::{
    BufferedMessage, ConfigKind, ConfigMsg, ConfigValue, Effect, InterfaceConfig, Msg,
    PersonalityConfig, ProviderConfig,
};
use courier_engine::{
    CompletionProcessor, CompletionProvider, ConfigSync, FallbackCompleter, HistoryEntry,
    HttpCompletionProvider, Processor, Row, SimulatedProcessor, WorkItem, WorkerEvent,
    WorkerHandle, WorkerSettings,
};
use courier_logging::{courier_debug, courier_error, courier_info, courier_warn};
use tokio::runtime::Runtime;

use crate::settings::{AppSettings, ProcessorConfig};

/// Lazily spawned background worker. At most one exists per runner.
struct WorkerSlot {
    handle: Option<WorkerHandle>,
    processor: Arc<dyn Processor>,
    settings: WorkerSettings,
}

impl WorkerSlot {
    fn get_or_spawn(&mut self) -> &WorkerHandle {
        let processor = &self.processor;
        let settings = &self.settings;
        self.handle.get_or_insert_with(|| {
            courier_info!(
                "spawning worker batch_size={} interval={:?}",
                settings.batch_size,
                settings.process_interval
            );
            WorkerHandle::spawn(processor.clone(), settings.clone())
        })
    }

    fn get(&self) -> Option<&WorkerHandle> {
        self.handle.as_ref()
    }
}

/// Executes effects produced by `update` and turns their outcomes back into `Msg`s.
pub struct EffectRunner {
    worker: WorkerSlot,
    sync: ConfigSync,
    runtime: Runtime,
    msg_tx: mpsc::Sender<Msg>,
    completion: Option<Arc<CompletionProcessor>>,
}

impl EffectRunner {
    pub fn new(
        settings: &AppSettings,
        sync: ConfigSync,
        msg_tx: mpsc::Sender<Msg>,
    ) -> anyhow::Result<Self> {
        let (processor, completion) = build_processor(settings)?;
        Self::with_processor(
            processor,
            completion,
            settings.worker_settings(),
            sync,
            msg_tx,
        )
    }

    pub fn with_processor(
        processor: Arc<dyn Processor>,
        completion: Option<Arc<CompletionProcessor>>,
        worker_settings: WorkerSettings,
        sync: ConfigSync,
        msg_tx: mpsc::Sender<Msg>,
    ) -> anyhow::Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("courier-sync")
            .enable_all()
            .build()
            .context("failed to start the sync runtime")?;
        Ok(Self {
            worker: WorkerSlot {
                handle: None,
                processor,
                settings: worker_settings,
            },
            sync,
            runtime,
            msg_tx,
            completion,
        })
    }

    pub fn run(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::SpawnWorker => {
                    self.worker.get_or_spawn();
                }
                Effect::ForwardMessage {
                    id,
                    content,
                    timestamp_ms,
                    retries,
                } => {
                    courier_debug!(
                        "ForwardMessage id={} len={} retries={}",
                        id,
                        content.len(),
                        retries
                    );
                    self.worker.get_or_spawn().enqueue(WorkItem {
                        retries,
                        ..WorkItem::new(id, content, timestamp_ms)
                    });
                }
                Effect::ClearWorker => {
                    if let Some(worker) = self.worker.get() {
                        worker.clear();
                    }
                }
                Effect::FetchConfig { kind } => self.fetch_config(kind),
                Effect::PersistConfig { value, revision } => self.persist_config(value, revision),
                Effect::AppendHistory { entries } => self.append_history(entries),
            }
        }
    }

    /// Worker events waiting to be fed into `update`. A stopped worker is
    /// released, so the next forwarded message spawns a fresh one.
    pub fn drain_worker_events(&mut self) -> Vec<Msg> {
        let Some(worker) = self.worker.get() else {
            return Vec::new();
        };
        let events: Vec<WorkerEvent> = std::iter::from_fn(|| worker.try_recv()).collect();
        if events
            .iter()
            .any(|event| matches!(event, WorkerEvent::WorkerStopped { .. }))
        {
            self.worker.handle = None;
        }
        events.into_iter().map(map_event).collect()
    }

    /// Only meaningful with the completion processor; the simulated one ignores prompts.
    pub fn set_system_prompt(&self, prompt: String) {
        if let Some(completion) = &self.completion {
            completion.set_system_prompt(Some(prompt));
        }
    }

    /// Stops the worker and gives in-flight backend writes a moment to land.
    pub fn shutdown(self) {
        if let Some(worker) = self.worker.get() {
            worker.shutdown();
        }
        self.runtime.shutdown_timeout(Duration::from_secs(2));
    }

    fn fetch_config(&self, kind: ConfigKind) {
        let sync = self.sync.clone();
        let msg_tx = self.msg_tx.clone();
        self.runtime.spawn(async move {
            let msg = match sync.fetch(kind.table()).await {
                Ok(Some(row)) => match row_to_config(kind, row) {
                    Ok(value) => ConfigMsg::Fetched(value),
                    Err(err) => {
                        courier_warn!("malformed {} settings row: {}", kind.label(), err);
                        ConfigMsg::FetchFailed {
                            kind,
                            error: format!("malformed settings row: {err}"),
                        }
                    }
                },
                Ok(None) => ConfigMsg::FetchMissing(kind),
                Err(err) => {
                    courier_warn!("fetching {} settings failed: {}", kind.label(), err);
                    ConfigMsg::FetchFailed {
                        kind,
                        error: err.to_string(),
                    }
                }
            };
            let _ = msg_tx.send(Msg::Config(msg));
        });
    }

    fn persist_config(&self, value: ConfigValue, revision: u64) {
        let kind = value.kind();
        let row = match config_to_row(&value) {
            Ok(row) => row,
            Err(err) => {
                courier_error!("could not encode {} settings: {}", kind.label(), err);
                let _ = self.msg_tx.send(Msg::Config(ConfigMsg::PersistFailed {
                    kind,
                    revision,
                    error: err.to_string(),
                }));
                return;
            }
        };

        let sync = self.sync.clone();
        let msg_tx = self.msg_tx.clone();
        self.runtime.spawn(async move {
            let msg = match sync.persist(kind.table(), row).await {
                Ok(()) => ConfigMsg::Persisted { kind, revision },
                Err(err) => {
                    courier_warn!(
                        "persisting {} settings rev={} failed: {}",
                        kind.label(),
                        revision,
                        err
                    );
                    ConfigMsg::PersistFailed {
                        kind,
                        revision,
                        error: err.to_string(),
                    }
                }
            };
            let _ = msg_tx.send(Msg::Config(msg));
        });
    }

    fn append_history(&self, entries: Vec<BufferedMessage>) {
        let entries: Vec<HistoryEntry> = entries
            .into_iter()
            .map(|entry| HistoryEntry {
                id: entry.id,
                content: entry.content,
                timestamp_ms: entry.timestamp_ms,
            })
            .collect();
        let sync = self.sync.clone();
        self.runtime.spawn(async move {
            if let Err(err) = sync.append_history(&entries).await {
                courier_error!("writing {} history rows failed: {}", entries.len(), err);
            }
        });
    }
}

fn build_processor(
    settings: &AppSettings,
) -> anyhow::Result<(Arc<dyn Processor>, Option<Arc<CompletionProcessor>>)> {
    match &settings.processor {
        ProcessorConfig::Simulated {
            delay_ms,
            failure_rate,
        } => {
            courier_info!(
                "using simulated processor delay_ms={} failure_rate={}",
                delay_ms,
                failure_rate
            );
            let processor =
                SimulatedProcessor::new(Duration::from_millis(*delay_ms), *failure_rate);
            Ok((Arc::new(processor), None))
        }
        ProcessorConfig::Completion => {
            let mut providers: Vec<Arc<dyn CompletionProvider>> = Vec::new();
            for provider_settings in settings.provider_settings() {
                let name = provider_settings.name.clone();
                match HttpCompletionProvider::new(provider_settings) {
                    Ok(provider) => providers.push(Arc::new(provider)),
                    Err(err) => courier_warn!("skipping provider {}: {}", name, err),
                }
            }
            if providers.is_empty() {
                bail!("no usable completion providers configured");
            }
            let completer = FallbackCompleter::new(providers);
            courier_info!(
                "using completion processor providers={:?}",
                completer.provider_names()
            );
            let completion = Arc::new(CompletionProcessor::new(completer));
            let processor: Arc<dyn Processor> = completion.clone();
            Ok((processor, Some(completion)))
        }
    }
}

fn map_event(event: WorkerEvent) -> Msg {
    match event {
        WorkerEvent::ProcessStarted { id, attempt } => Msg::ProcessStarted { id, attempt },
        WorkerEvent::ProcessRetrying { id, retries, error } => {
            Msg::ProcessRetrying { id, retries, error }
        }
        WorkerEvent::ProcessComplete { id, reply } => Msg::ProcessComplete { id, reply },
        WorkerEvent::ProcessError { id, error, retries } => {
            courier_warn!("message {} failed after {} retries: {}", id, retries, error);
            Msg::ProcessError { id, error, retries }
        }
        WorkerEvent::BatchProcessed { ids } => Msg::BatchProcessed { ids },
        WorkerEvent::WorkerFault { error } => {
            courier_error!("worker fault: {}", error);
            Msg::WorkerFault { error }
        }
        WorkerEvent::WorkerRestarted { restarts } => Msg::WorkerRestarted { restarts },
        WorkerEvent::WorkerStopped { restarts } => {
            courier_error!("worker stopped for good after {} restarts", restarts);
            Msg::WorkerStopped { restarts }
        }
    }
}

pub(crate) fn config_to_row(value: &ConfigValue) -> Result<Row, serde_json::Error> {
    match value {
        ConfigValue::Provider(config) => serde_json::to_value(config),
        ConfigValue::Personality(config) => serde_json::to_value(config),
        ConfigValue::Interface(config) => serde_json::to_value(config),
    }
}

/// Missing columns fall back to defaults; unknown ones are ignored.
pub(crate) fn row_to_config(kind: ConfigKind, row: Row) -> Result<ConfigValue, serde_json::Error> {
    Ok(match kind {
        ConfigKind::Provider => ConfigValue::Provider(serde_json::from_value::<ProviderConfig>(row)?),
        ConfigKind::Personality => {
            ConfigValue::Personality(serde_json::from_value::<PersonalityConfig>(row)?)
        }
        ConfigKind::Interface => {
            ConfigValue::Interface(serde_json::from_value::<InterfaceConfig>(row)?)
        }
    })
}
