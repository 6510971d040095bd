use std::time::Duration;

use courier_engine::{ProcessError, ProcessOutput, SimulatedProcessor, WorkItem, WorkQueue, WorkerEvent};
use pretty_assertions::assert_eq;

fn items(ids: impl IntoIterator<Item = u64>) -> Vec<WorkItem> {
    ids.into_iter()
        .map(|id| WorkItem::new(id, format!("m{id}"), 0))
        .collect()
}

#[test]
fn take_batch_is_fifo_and_bounded() {
    let mut queue = WorkQueue::new(10, 3);
    for item in items(1..=25) {
        queue.push_back(item);
    }

    let sizes: Vec<usize> = std::iter::from_fn(|| {
        let batch = queue.take_batch();
        (!batch.is_empty()).then_some(batch.len())
    })
    .collect();
    assert_eq!(sizes, vec![10, 10, 5]);
    assert!(queue.is_empty());
}

#[test]
fn failed_items_go_back_to_the_front_in_order() {
    let mut queue = WorkQueue::new(3, 3);
    for item in items(1..=5) {
        queue.push_back(item);
    }
    let batch = queue.take_batch();
    assert_eq!(queue.ids(), vec![4, 5]);

    let outcomes = batch
        .into_iter()
        .map(|item| {
            let result = if item.id == 2 {
                Ok(ProcessOutput::default())
            } else {
                Err(ProcessError::Simulated)
            };
            (item, result)
        })
        .collect();
    let events = queue.settle(outcomes);

    assert_eq!(queue.ids(), vec![1, 3, 4, 5]);
    assert_eq!(
        events,
        vec![
            WorkerEvent::ProcessRetrying {
                id: 1,
                retries: 1,
                error: "simulated processing failure".to_string(),
            },
            WorkerEvent::ProcessComplete { id: 2, reply: None },
            WorkerEvent::ProcessRetrying {
                id: 3,
                retries: 1,
                error: "simulated processing failure".to_string(),
            },
            WorkerEvent::BatchProcessed { ids: vec![2] },
        ]
    );
    let requeued = queue.take_batch();
    assert_eq!(requeued[0].retries, 1);
    assert_eq!(requeued[2].retries, 0);
}

#[test]
fn retry_budget_exhaustion_drops_the_item() {
    let mut queue = WorkQueue::new(10, 3);
    let mut item = WorkItem::new(9, "bad", 0);
    item.retries = 2;

    let events = queue.settle(vec![(item, Err(ProcessError::Timeout(Duration::from_secs(1))))]);

    assert!(queue.is_empty());
    assert_eq!(
        events,
        vec![
            WorkerEvent::ProcessError {
                id: 9,
                error: "processing timed out after 1s".to_string(),
                retries: 3,
            },
            WorkerEvent::BatchProcessed { ids: vec![] },
        ]
    );
}

#[test]
fn simulated_failures_are_reproducible() {
    let processor = SimulatedProcessor::new(Duration::ZERO, 0.5);
    let item = WorkItem::new(42, "same input", 0);
    let first = processor.should_fail(&item);
    for _ in 0..10 {
        assert_eq!(processor.should_fail(&item), first);
    }

    let never = SimulatedProcessor::new(Duration::ZERO, 0.0);
    let always = SimulatedProcessor::new(Duration::ZERO, 1.0);
    assert!(!never.should_fail(&item));
    assert!(always.should_fail(&item));
}
