use crate::{AiConfigState, ConfigKind, ConfigMsg, ConfigSlice, ConfigValue, Effect, Msg, QueueState};

/// Pure update function: applies a message to state and returns any effects.
pub fn update(mut state: QueueState, msg: Msg) -> (QueueState, Vec<Effect>) {
    let effects = match msg {
        Msg::InitializeWorker => {
            if state.initialize_worker() {
                vec![Effect::SpawnWorker]
            } else {
                Vec::new()
            }
        }
        Msg::EnqueueRequested {
            content,
            timestamp_ms,
        } => {
            let spawn = state.initialize_worker();
            let message = state.push_message(content, timestamp_ms).clone();
            state
                .buffer_mut()
                .push(message.id, message.content.clone(), message.timestamp_ms);

            let mut effects = Vec::with_capacity(1 + usize::from(spawn));
            if spawn {
                effects.push(Effect::SpawnWorker);
            }
            effects.push(Effect::ForwardMessage {
                id: message.id,
                content: message.content,
                timestamp_ms: message.timestamp_ms,
                retries: 0,
            });
            effects
        }
        Msg::ClearRequested => {
            state.clear();
            // A worker that was never spawned has nothing to clear.
            if state.worker_initialized() {
                vec![Effect::ClearWorker]
            } else {
                Vec::new()
            }
        }
        Msg::FlushBufferRequested => {
            let entries = state.buffer_mut().drain_processed();
            if entries.is_empty() {
                Vec::new()
            } else {
                state.mark_dirty();
                vec![Effect::AppendHistory { entries }]
            }
        }
        Msg::ProcessStarted { id, attempt } => {
            state.apply_started(id, attempt);
            Vec::new()
        }
        Msg::ProcessRetrying { id, retries, error } => {
            state.apply_retrying(id, retries, error);
            Vec::new()
        }
        Msg::ProcessComplete { id, reply } => {
            state.apply_completed(id, reply);
            Vec::new()
        }
        Msg::ProcessError { id, error, retries } => {
            if state.apply_failed(id, &error, retries) {
                state.buffer_mut().remove(id);
                state.set_error(error);
            }
            Vec::new()
        }
        Msg::BatchProcessed { ids } => {
            if state.buffer_mut().mark_processed(&ids) > 0 {
                state.mark_dirty();
            }
            Vec::new()
        }
        Msg::WorkerFault { error } => {
            state.set_error(error);
            Vec::new()
        }
        Msg::WorkerRestarted { .. } => state
            .reset_unfinished()
            .into_iter()
            .map(|message| Effect::ForwardMessage {
                id: message.id,
                content: message.content,
                timestamp_ms: message.timestamp_ms,
                retries: message.retries,
            })
            .collect(),
        Msg::WorkerStopped { restarts } => {
            state.fail_unfinished(&format!(
                "worker stopped after {restarts} restarts"
            ));
            Vec::new()
        }
        Msg::Config(config_msg) => update_config(&mut state, config_msg),
        Msg::Tick | Msg::NoOp => Vec::new(),
    };

    (state, effects)
}

fn update_config(state: &mut QueueState, msg: ConfigMsg) -> Vec<Effect> {
    let effects = match msg {
        ConfigMsg::FetchRequested(kind) => {
            with_slice(state.config_mut(), kind, SliceOp::BeginFetch);
            vec![Effect::FetchConfig { kind }]
        }
        ConfigMsg::Fetched(value) => {
            let config = state.config_mut();
            match value {
                ConfigValue::Provider(value) => config.provider.apply_fetched(value),
                ConfigValue::Personality(value) => config.personality.apply_fetched(value),
                ConfigValue::Interface(value) => config.interface.apply_fetched(value),
            }
            Vec::new()
        }
        ConfigMsg::FetchMissing(kind) => {
            with_slice(state.config_mut(), kind, SliceOp::Missing);
            Vec::new()
        }
        ConfigMsg::FetchFailed { kind, error } => {
            with_slice(state.config_mut(), kind, SliceOp::FailFetch(error));
            Vec::new()
        }
        ConfigMsg::Set(value) => {
            let config = state.config_mut();
            let revision = match value.clone() {
                ConfigValue::Provider(mut value) => {
                    if let Some(normalized) = value.normalized_base_url() {
                        value.base_url = normalized;
                    }
                    config.provider.set_local(value)
                }
                ConfigValue::Personality(value) => config.personality.set_local(value),
                ConfigValue::Interface(value) => config.interface.set_local(value),
            };
            let (value, _) = config.current(value.kind());
            vec![Effect::PersistConfig { value, revision }]
        }
        ConfigMsg::Persisted { kind, revision } => {
            with_slice(state.config_mut(), kind, SliceOp::Persisted(revision));
            Vec::new()
        }
        ConfigMsg::PersistFailed {
            kind,
            revision,
            error,
        } => {
            with_slice(
                state.config_mut(),
                kind,
                SliceOp::FailPersist { revision, error },
            );
            Vec::new()
        }
        ConfigMsg::RetrySync(kind) => {
            if !state.config().is_dirty(kind) {
                return Vec::new();
            }
            let (value, revision) = state.config().current(kind);
            vec![Effect::PersistConfig { value, revision }]
        }
        ConfigMsg::Revert(kind) => {
            if !state.config().is_dirty(kind) {
                return Vec::new();
            }
            with_slice(state.config_mut(), kind, SliceOp::Revert);
            let (value, revision) = state.config().current(kind);
            vec![Effect::PersistConfig { value, revision }]
        }
    };

    state.mark_dirty();
    effects
}

enum SliceOp {
    BeginFetch,
    Missing,
    FailFetch(String),
    Persisted(u64),
    FailPersist { revision: u64, error: String },
    Revert,
}

fn with_slice(config: &mut AiConfigState, kind: ConfigKind, op: SliceOp) {
    match kind {
        ConfigKind::Provider => apply_slice_op(&mut config.provider, op),
        ConfigKind::Personality => apply_slice_op(&mut config.personality, op),
        ConfigKind::Interface => apply_slice_op(&mut config.interface, op),
    }
}

fn apply_slice_op<T: Clone>(slice: &mut ConfigSlice<T>, op: SliceOp) {
    match op {
        SliceOp::BeginFetch => slice.begin_fetch(),
        SliceOp::Missing => slice.apply_missing(),
        SliceOp::FailFetch(error) => slice.fail_fetch(error),
        SliceOp::Persisted(revision) => {
            slice.mark_persisted(revision);
        }
        SliceOp::FailPersist { revision, error } => {
            slice.fail_persist(revision, error);
        }
        SliceOp::Revert => {
            slice.revert();
        }
    }
}
