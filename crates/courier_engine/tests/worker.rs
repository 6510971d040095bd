use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::time::{Duration, Instant};

use courier_engine::{
    ProcessError, ProcessOutput, Processor, SimulatedProcessor, WorkItem, WorkerEvent,
    WorkerHandle, WorkerSettings,
};

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(courier_logging::initialize_for_tests);
}

fn fast_settings() -> WorkerSettings {
    WorkerSettings {
        process_interval: Duration::from_millis(20),
        enqueue_debounce: Duration::from_millis(100),
        message_timeout: Duration::from_secs(5),
        ..WorkerSettings::default()
    }
}

/// Collects events until `done` returns true or the deadline passes.
fn collect_until(
    worker: &WorkerHandle,
    timeout: Duration,
    mut done: impl FnMut(&[WorkerEvent]) -> bool,
) -> Vec<WorkerEvent> {
    let deadline = Instant::now() + timeout;
    let mut events = Vec::new();
    while Instant::now() < deadline {
        if let Some(event) = worker.recv_timeout(Duration::from_millis(10)) {
            events.push(event);
            if done(&events) {
                break;
            }
        }
    }
    events
}

fn count_completed(events: &[WorkerEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, WorkerEvent::ProcessComplete { .. }))
        .count()
}

fn started_ids(events: &[WorkerEvent]) -> Vec<u64> {
    events
        .iter()
        .filter_map(|e| match e {
            WorkerEvent::ProcessStarted { id, .. } => Some(*id),
            _ => None,
        })
        .collect()
}

/// Always succeeds after a short delay and records the peak concurrency.
#[derive(Default)]
struct ConcurrencyGauge {
    current: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait::async_trait]
impl Processor for ConcurrencyGauge {
    async fn process(&self, _item: &WorkItem) -> Result<ProcessOutput, ProcessError> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(15)).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        Ok(ProcessOutput::default())
    }
}

/// Fails the first attempt of messages whose content starts with "flaky".
struct FlakyOnce;

#[async_trait::async_trait]
impl Processor for FlakyOnce {
    async fn process(&self, item: &WorkItem) -> Result<ProcessOutput, ProcessError> {
        if item.content.starts_with("flaky") && item.retries == 0 {
            return Err(ProcessError::Simulated);
        }
        Ok(ProcessOutput {
            reply: Some(item.content.to_uppercase()),
        })
    }
}

struct Slow(Duration);

#[async_trait::async_trait]
impl Processor for Slow {
    async fn process(&self, _item: &WorkItem) -> Result<ProcessOutput, ProcessError> {
        tokio::time::sleep(self.0).await;
        Ok(ProcessOutput::default())
    }
}

struct PanicsFirst;

#[async_trait::async_trait]
impl Processor for PanicsFirst {
    async fn process(&self, item: &WorkItem) -> Result<ProcessOutput, ProcessError> {
        if item.retries == 0 {
            panic!("processor blew up");
        }
        Ok(ProcessOutput::default())
    }
}

#[test]
fn twenty_five_messages_run_in_batches_of_ten_ten_five() {
    init_logging();
    let gauge = Arc::new(ConcurrencyGauge::default());
    let worker = WorkerHandle::spawn(gauge.clone(), fast_settings());

    for id in 1..=25 {
        worker.enqueue(WorkItem::new(id, format!("message {id}"), 0));
    }
    let events = collect_until(&worker, Duration::from_secs(10), |events| {
        events
            .iter()
            .filter(|e| matches!(e, WorkerEvent::BatchProcessed { .. }))
            .count()
            == 3
    });

    let batches: Vec<usize> = events
        .iter()
        .filter_map(|e| match e {
            WorkerEvent::BatchProcessed { ids } => Some(ids.len()),
            _ => None,
        })
        .collect();
    assert_eq!(batches, vec![10, 10, 5]);
    assert_eq!(count_completed(&events), 25);
    assert_eq!(started_ids(&events), (1..=25).collect::<Vec<_>>());
    assert!(gauge.peak.load(Ordering::SeqCst) <= 10);
    assert!(!events
        .iter()
        .any(|e| matches!(e, WorkerEvent::ProcessRetrying { .. })));
}

#[test]
fn batches_never_exceed_configured_size() {
    init_logging();
    let gauge = Arc::new(ConcurrencyGauge::default());
    let settings = WorkerSettings {
        batch_size: 4,
        ..fast_settings()
    };
    let worker = WorkerHandle::spawn(gauge.clone(), settings);

    for id in 1..=13 {
        worker.enqueue(WorkItem::new(id, "x", 0));
    }
    let events = collect_until(&worker, Duration::from_secs(10), |events| {
        count_completed(events) == 13
    });

    assert_eq!(count_completed(&events), 13);
    assert!(gauge.peak.load(Ordering::SeqCst) <= 4);
    for event in &events {
        if let WorkerEvent::BatchProcessed { ids } = event {
            assert!(ids.len() <= 4);
        }
    }
}

#[test]
fn always_failing_message_fails_after_three_attempts() {
    init_logging();
    let worker = WorkerHandle::spawn(
        Arc::new(SimulatedProcessor::new(Duration::from_millis(1), 1.0)),
        fast_settings(),
    );

    worker.enqueue(WorkItem::new(7, "doomed", 0));
    let mut events = collect_until(&worker, Duration::from_secs(5), |events| {
        events
            .iter()
            .any(|e| matches!(e, WorkerEvent::ProcessError { .. }))
    });
    // Nothing else should follow the terminal error.
    events.extend(collect_until(&worker, Duration::from_millis(200), |_| false));

    let attempts: Vec<u32> = events
        .iter()
        .filter_map(|e| match e {
            WorkerEvent::ProcessStarted { id: 7, attempt } => Some(*attempt),
            _ => None,
        })
        .collect();
    assert_eq!(attempts, vec![1, 2, 3]);

    let errors: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            WorkerEvent::ProcessError { id, retries, error } => Some((*id, *retries, error.clone())),
            _ => None,
        })
        .collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].0, 7);
    assert_eq!(errors[0].1, 3);
    assert_eq!(errors[0].2, "simulated processing failure");
    assert_eq!(count_completed(&events), 0);
}

#[test]
fn first_try_success_is_never_retried() {
    init_logging();
    let worker = WorkerHandle::spawn(
        Arc::new(SimulatedProcessor::new(Duration::from_millis(1), 0.0)),
        fast_settings(),
    );

    worker.enqueue(WorkItem::new(1, "hello", 0));
    let events = collect_until(&worker, Duration::from_secs(5), |events| {
        events
            .iter()
            .any(|e| matches!(e, WorkerEvent::BatchProcessed { .. }))
    });

    assert_eq!(
        events,
        vec![
            WorkerEvent::ProcessStarted { id: 1, attempt: 1 },
            WorkerEvent::ProcessComplete {
                id: 1,
                reply: Some("processed: hello".to_string()),
            },
            WorkerEvent::BatchProcessed { ids: vec![1] },
        ]
    );
}

#[test]
fn retried_message_is_dequeued_before_later_messages() {
    init_logging();
    let settings = WorkerSettings {
        batch_size: 1,
        ..fast_settings()
    };
    let worker = WorkerHandle::spawn(Arc::new(FlakyOnce), settings);

    worker.enqueue(WorkItem::new(1, "flaky first", 0));
    worker.enqueue(WorkItem::new(2, "steady second", 0));
    worker.enqueue(WorkItem::new(3, "steady third", 0));
    let events = collect_until(&worker, Duration::from_secs(5), |events| {
        count_completed(events) == 3
    });

    assert_eq!(started_ids(&events), vec![1, 1, 2, 3]);
    assert!(events.contains(&WorkerEvent::ProcessRetrying {
        id: 1,
        retries: 1,
        error: "simulated processing failure".to_string(),
    }));
    assert!(events.contains(&WorkerEvent::ProcessComplete {
        id: 1,
        reply: Some("FLAKY FIRST".to_string()),
    }));
}

#[test]
fn clear_mid_batch_discards_in_flight_results() {
    init_logging();
    let worker = WorkerHandle::spawn(Arc::new(Slow(Duration::from_millis(300))), fast_settings());

    worker.enqueue(WorkItem::new(1, "in flight", 0));
    worker.enqueue(WorkItem::new(2, "in flight too", 0));
    let started = collect_until(&worker, Duration::from_secs(2), |events| {
        started_ids(events).len() == 2
    });
    assert_eq!(started_ids(&started), vec![1, 2]);

    worker.clear();
    worker.enqueue(WorkItem::new(3, "after clear", 0));
    let events = collect_until(&worker, Duration::from_secs(3), |events| {
        count_completed(events) == 1
    });
    let mut events = events;
    events.extend(collect_until(&worker, Duration::from_millis(400), |_| false));

    let completed: Vec<u64> = events
        .iter()
        .filter_map(|e| match e {
            WorkerEvent::ProcessComplete { id, .. } => Some(*id),
            _ => None,
        })
        .collect();
    assert_eq!(completed, vec![3]);
    assert!(!events.iter().any(|e| matches!(
        e,
        WorkerEvent::BatchProcessed { ids } if ids.contains(&1) || ids.contains(&2)
    )));
}

#[test]
fn hung_processing_is_cut_off_by_timeout() {
    init_logging();
    let settings = WorkerSettings {
        message_timeout: Duration::from_millis(50),
        max_retries: 2,
        ..fast_settings()
    };
    let worker = WorkerHandle::spawn(Arc::new(Slow(Duration::from_secs(30))), settings);

    worker.enqueue(WorkItem::new(1, "stuck", 0));
    let events = collect_until(&worker, Duration::from_secs(5), |events| {
        events
            .iter()
            .any(|e| matches!(e, WorkerEvent::ProcessError { .. }))
    });

    match events.last() {
        Some(WorkerEvent::ProcessError { id, error, retries }) => {
            assert_eq!(*id, 1);
            assert_eq!(*retries, 2);
            assert!(error.contains("timed out"), "unexpected error {error}");
        }
        other => panic!("expected a terminal error, got {other:?}"),
    }
}

#[test]
fn panicking_processor_reports_fault_and_retries() {
    init_logging();
    let worker = WorkerHandle::spawn(Arc::new(PanicsFirst), fast_settings());

    worker.enqueue(WorkItem::new(1, "explosive", 0));
    let events = collect_until(&worker, Duration::from_secs(5), |events| {
        count_completed(events) == 1
    });

    let fault = events.iter().find_map(|e| match e {
        WorkerEvent::WorkerFault { error } => Some(error.clone()),
        _ => None,
    });
    let fault = fault.expect("fault reported");
    assert!(fault.contains("processor blew up"), "unexpected fault {fault}");
    assert!(events
        .iter()
        .any(|e| matches!(e, WorkerEvent::ProcessRetrying { id: 1, retries: 1, .. })));
    assert_eq!(count_completed(&events), 1);
}

#[test]
fn crashed_worker_restarts_and_keeps_accepting_work() {
    init_logging();
    let settings = WorkerSettings {
        restart_backoff: Duration::from_millis(10),
        ..fast_settings()
    };
    let worker = WorkerHandle::spawn(
        Arc::new(SimulatedProcessor::new(Duration::from_millis(1), 0.0)),
        settings,
    );

    worker.inject_fault("disk on fire");
    let events = collect_until(&worker, Duration::from_secs(5), |events| {
        events
            .iter()
            .any(|e| matches!(e, WorkerEvent::WorkerRestarted { .. }))
    });
    match events.as_slice() {
        [WorkerEvent::WorkerFault { error }, WorkerEvent::WorkerRestarted { restarts: 1 }] => {
            assert!(error.contains("disk on fire"), "unexpected fault {error}");
        }
        other => panic!("unexpected events {other:?}"),
    }

    worker.enqueue(WorkItem::new(1, "after restart", 0));
    let events = collect_until(&worker, Duration::from_secs(5), |events| {
        count_completed(events) == 1
    });
    assert!(events.contains(&WorkerEvent::ProcessComplete {
        id: 1,
        reply: Some("processed: after restart".to_string()),
    }));
}

#[test]
fn restart_budget_stops_the_worker() {
    init_logging();
    let settings = WorkerSettings {
        restart_backoff: Duration::from_millis(10),
        max_restarts: 1,
        ..fast_settings()
    };
    let worker = WorkerHandle::spawn(
        Arc::new(SimulatedProcessor::new(Duration::from_millis(1), 0.0)),
        settings,
    );

    worker.inject_fault("first");
    let _ = collect_until(&worker, Duration::from_secs(5), |events| {
        events
            .iter()
            .any(|e| matches!(e, WorkerEvent::WorkerRestarted { .. }))
    });
    worker.inject_fault("second");
    let events = collect_until(&worker, Duration::from_secs(5), |events| {
        events
            .iter()
            .any(|e| matches!(e, WorkerEvent::WorkerStopped { .. }))
    });
    assert!(matches!(
        events.as_slice(),
        [WorkerEvent::WorkerFault { .. }, WorkerEvent::WorkerStopped { restarts: 1 }]
    ));

    worker.enqueue(WorkItem::new(1, "nobody home", 0));
    let late = collect_until(&worker, Duration::from_millis(300), |_| false);
    assert!(late.is_empty(), "stopped worker produced {late:?}");
}
