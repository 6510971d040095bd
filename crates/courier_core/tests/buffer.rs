use courier_core::{update, Effect, Msg, QueueState};

fn enqueue_n(mut state: QueueState, n: usize) -> QueueState {
    for i in 0..n {
        state = update(
            state,
            Msg::EnqueueRequested {
                content: format!("m{i}"),
                timestamp_ms: i as i64,
            },
        )
        .0;
    }
    state
}

#[test]
fn batch_processed_marks_matching_entries() {
    let state = enqueue_n(QueueState::new(), 4);
    assert_eq!(state.buffer().len(), 4);
    assert_eq!(state.buffer().processed_count(), 0);

    let (mut state, _) = update(state, Msg::BatchProcessed { ids: vec![1, 3, 99] });
    assert!(state.consume_dirty());
    let processed: Vec<_> = state
        .buffer()
        .entries()
        .iter()
        .filter(|entry| entry.processed)
        .map(|entry| entry.id)
        .collect();
    assert_eq!(processed, vec![1, 3]);

    let (mut state, _) = update(state, Msg::BatchProcessed { ids: vec![1] });
    assert!(!state.consume_dirty());
}

#[test]
fn flush_moves_processed_entries_to_history() {
    let state = enqueue_n(QueueState::new(), 3);
    let (state, _) = update(state, Msg::BatchProcessed { ids: vec![2] });

    let (state, effects) = update(state, Msg::FlushBufferRequested);
    match effects.as_slice() {
        [Effect::AppendHistory { entries }] => {
            assert_eq!(entries.len(), 1);
            assert_eq!(entries[0].id, 2);
            assert_eq!(entries[0].content, "m1");
        }
        other => panic!("unexpected effects {other:?}"),
    }
    let remaining: Vec<_> = state.buffer().entries().iter().map(|e| e.id).collect();
    assert_eq!(remaining, vec![1, 3]);

    let (_state, effects) = update(state, Msg::FlushBufferRequested);
    assert!(effects.is_empty());
}

#[test]
fn failed_message_leaves_the_buffer() {
    let state = enqueue_n(QueueState::new(), 2);
    let (state, _) = update(
        state,
        Msg::ProcessError {
            id: 1,
            error: "boom".to_string(),
            retries: 3,
        },
    );
    let remaining: Vec<_> = state.buffer().entries().iter().map(|e| e.id).collect();
    assert_eq!(remaining, vec![2]);

    let (state, _) = update(state, Msg::BatchProcessed { ids: vec![1, 2] });
    let (_state, effects) = update(state, Msg::FlushBufferRequested);
    match effects.as_slice() {
        [Effect::AppendHistory { entries }] => {
            let ids: Vec<_> = entries.iter().map(|e| e.id).collect();
            assert_eq!(ids, vec![2]);
        }
        other => panic!("unexpected effects {other:?}"),
    }
}
