use courier_core::{
    update, ConfigKind, ConfigMsg, ConfigValue, Effect, MessageProcessor, Msg, NotificationLevel,
    ProviderConfig, QueueState,
};

fn enqueue(state: QueueState, content: &str) -> QueueState {
    update(
        state,
        Msg::EnqueueRequested {
            content: content.to_string(),
            timestamp_ms: 0,
        },
    )
    .0
}

fn fail(state: QueueState, id: u64, error: &str) -> QueueState {
    update(
        state,
        Msg::ProcessError {
            id,
            error: error.to_string(),
            retries: 3,
        },
    )
    .0
}

#[test]
fn mount_initializes_worker_once() {
    let mut processor = MessageProcessor::new();
    assert_eq!(processor.mount(), Some(Msg::InitializeWorker));
    assert_eq!(processor.mount(), None);
}

#[test]
fn partitions_are_disjoint_and_complete() {
    let mut state = QueueState::new();
    for n in 0..5 {
        state = enqueue(state, &format!("m{n}"));
    }
    state = update(state, Msg::ProcessStarted { id: 1, attempt: 1 }).0;
    state = update(state, Msg::ProcessStarted { id: 2, attempt: 1 }).0;
    state = update(state, Msg::ProcessComplete { id: 2, reply: None }).0;
    state = fail(state, 3, "bad");

    let view = state.view();
    let ids = |messages: &[courier_core::QueuedMessage]| {
        messages.iter().map(|m| m.id).collect::<Vec<_>>()
    };
    assert_eq!(ids(&view.pending_messages), vec![4, 5]);
    assert_eq!(ids(&view.processing_messages), vec![1]);
    assert_eq!(ids(&view.completed_messages), vec![2]);
    assert_eq!(ids(&view.failed_messages), vec![3]);
    assert_eq!(view.total_messages, 5);
    assert!(!view.is_idle());
}

#[test]
fn error_notifies_once_per_new_value() {
    let mut processor = MessageProcessor::new();
    let state = enqueue(enqueue(enqueue(QueueState::new(), "a"), "b"), "c");
    assert!(processor.observe(&state.view()).is_empty());

    let state = fail(state, 1, "timeout");
    let first = processor.observe(&state.view());
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].level, NotificationLevel::Error);
    assert_eq!(first[0].body, "timeout");

    // Unrelated re-render with the same error.
    let state = update(state, Msg::ProcessStarted { id: 2, attempt: 1 }).0;
    assert!(processor.observe(&state.view()).is_empty());

    let state = fail(state, 2, "rate limited");
    assert_eq!(processor.observe(&state.view()).len(), 1);

    // Cleared, then the same text again is a new error.
    let state = update(state, Msg::ClearRequested).0;
    assert!(processor.observe(&state.view()).is_empty());
    let state = enqueue(state, "d");
    let state = fail(state, 4, "rate limited");
    assert_eq!(processor.observe(&state.view()).len(), 1);
}

#[test]
fn config_persist_failures_are_notified() {
    let mut processor = MessageProcessor::new();
    let (state, effects) = update(
        QueueState::new(),
        Msg::Config(ConfigMsg::Set(ConfigValue::Provider(ProviderConfig::default()))),
    );
    let revision = match effects.as_slice() {
        [Effect::PersistConfig { revision, .. }] => *revision,
        other => panic!("unexpected effects {other:?}"),
    };
    let (state, _) = update(
        state,
        Msg::Config(ConfigMsg::PersistFailed {
            kind: ConfigKind::Provider,
            revision,
            error: "not authenticated".to_string(),
        }),
    );

    let notes = processor.observe(&state.view());
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].level, NotificationLevel::Warning);
    assert_eq!(notes[0].title, "Could not sync provider settings");
    assert!(processor.observe(&state.view()).is_empty());
}
