use std::any::Any;
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use courier_logging::{courier_debug, courier_error, courier_info, courier_warn};
use futures_util::future::join_all;
use tokio::sync::{mpsc as async_mpsc, Mutex};
use tokio::task::JoinError;
use tokio::time::{sleep, sleep_until, Instant};
use tokio_util::sync::CancellationToken;

use crate::processor::Processor;
use crate::queue::WorkQueue;
use crate::{ProcessError, ProcessOutput, WorkItem, WorkerCommand, WorkerEvent, WorkerSettings};

type CommandRx = Arc<Mutex<async_mpsc::UnboundedReceiver<WorkerCommand>>>;

/// Handle to the background worker.
///
/// The worker runs on its own thread and tokio runtime. Commands are
/// fire-and-forget; outcomes come back as [`WorkerEvent`]s.
pub struct WorkerHandle {
    cmd_tx: async_mpsc::UnboundedSender<WorkerCommand>,
    event_rx: mpsc::Receiver<WorkerEvent>,
    shutdown: CancellationToken,
}

impl WorkerHandle {
    pub fn spawn(processor: Arc<dyn Processor>, settings: WorkerSettings) -> Self {
        let (cmd_tx, cmd_rx) = async_mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::channel();
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();

        thread::spawn(move || {
            let runtime = match tokio::runtime::Runtime::new() {
                Ok(runtime) => runtime,
                Err(err) => {
                    courier_error!("worker runtime failed to start: {}", err);
                    let _ = event_tx.send(WorkerEvent::WorkerFault {
                        error: format!("worker runtime failed to start: {err}"),
                    });
                    return;
                }
            };
            runtime.block_on(supervise(processor, settings, cmd_rx, event_tx, token));
        });

        Self {
            cmd_tx,
            event_rx,
            shutdown,
        }
    }

    pub fn enqueue(&self, item: WorkItem) {
        let _ = self.cmd_tx.send(WorkerCommand::Enqueue(item));
    }

    /// Drops everything queued or in flight. Results of the cancelled batch are never reported.
    pub fn clear(&self) {
        let _ = self.cmd_tx.send(WorkerCommand::Clear);
    }

    /// Crashes the current actor; queued work is lost and the supervisor takes over.
    pub fn inject_fault(&self, reason: impl Into<String>) {
        let _ = self.cmd_tx.send(WorkerCommand::InjectFault(reason.into()));
    }

    pub fn try_recv(&self) -> Option<WorkerEvent> {
        self.event_rx.try_recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<WorkerEvent> {
        self.event_rx.recv_timeout(timeout).ok()
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Runs the actor and starts a fresh one, with exponential backoff, whenever it dies.
async fn supervise(
    processor: Arc<dyn Processor>,
    settings: WorkerSettings,
    cmd_rx: async_mpsc::UnboundedReceiver<WorkerCommand>,
    events: mpsc::Sender<WorkerEvent>,
    shutdown: CancellationToken,
) {
    let commands: CommandRx = Arc::new(Mutex::new(cmd_rx));
    let mut restarts = 0;
    let mut backoff = settings.restart_backoff;

    loop {
        let actor = WorkerActor::new(
            processor.clone(),
            settings.clone(),
            events.clone(),
            shutdown.clone(),
        );
        let error = match tokio::spawn(actor.run(commands.clone())).await {
            Ok(Ok(())) => {
                courier_info!("worker stopped");
                return;
            }
            Ok(Err(fault)) => format!("worker crashed: {fault}"),
            Err(err) => format!("worker crashed: {}", join_error_message(err)),
        };
        courier_error!("{}", error);
        let _ = events.send(WorkerEvent::WorkerFault { error });

        if restarts >= settings.max_restarts {
            courier_error!("worker restart budget of {} exhausted", settings.max_restarts);
            let _ = events.send(WorkerEvent::WorkerStopped { restarts });
            return;
        }
        restarts += 1;
        tokio::select! {
            _ = sleep(backoff) => {}
            _ = shutdown.cancelled() => return,
        }
        backoff = (backoff * 2).min(settings.max_restart_backoff);
        courier_warn!("worker restarted ({} so far)", restarts);
        let _ = events.send(WorkerEvent::WorkerRestarted { restarts });
    }
}

struct Settled {
    epoch: u64,
    outcomes: Vec<(WorkItem, Result<ProcessOutput, ProcessError>)>,
    faults: Vec<String>,
}

/// Single owner of the queue. Commands, batch settlements and the pass timer
/// are handled one at a time, so at most one batch is ever in flight.
struct WorkerActor {
    processor: Arc<dyn Processor>,
    settings: WorkerSettings,
    queue: WorkQueue,
    events: mpsc::Sender<WorkerEvent>,
    shutdown: CancellationToken,
    /// Bumped by every clear; settlements from an older epoch are discarded.
    epoch: u64,
    in_flight: Option<CancellationToken>,
    next_pass: Option<Instant>,
    settle_tx: Option<async_mpsc::UnboundedSender<Settled>>,
}

impl WorkerActor {
    fn new(
        processor: Arc<dyn Processor>,
        settings: WorkerSettings,
        events: mpsc::Sender<WorkerEvent>,
        shutdown: CancellationToken,
    ) -> Self {
        let queue = WorkQueue::new(settings.batch_size, settings.max_retries);
        Self {
            processor,
            settings,
            queue,
            events,
            shutdown,
            epoch: 0,
            in_flight: None,
            next_pass: None,
            settle_tx: None,
        }
    }

    /// `Err` means the actor died and should be restarted.
    async fn run(mut self, commands: CommandRx) -> Result<(), String> {
        let mut commands = commands.lock().await;
        let (settle_tx, mut settle_rx) = async_mpsc::unbounded_channel();
        self.settle_tx = Some(settle_tx);
        let shutdown = self.shutdown.clone();

        let outcome = loop {
            let deadline = self.next_pass;
            tokio::select! {
                _ = shutdown.cancelled() => break Ok(()),
                command = commands.recv() => match command {
                    Some(WorkerCommand::InjectFault(reason)) => break Err(reason),
                    Some(command) => self.handle_command(command),
                    None => break Ok(()),
                },
                Some(settled) = settle_rx.recv() => self.handle_settled(settled),
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.next_pass = None;
                    self.process_queue();
                }
            }
        };

        if let Some(batch) = self.in_flight.take() {
            batch.cancel();
        }
        outcome
    }

    fn handle_command(&mut self, command: WorkerCommand) {
        match command {
            WorkerCommand::Enqueue(item) => {
                courier_debug!("enqueue message {} ({} bytes)", item.id, item.content.len());
                self.queue.push_back(item);
                if self.in_flight.is_none() {
                    self.schedule_pass(self.settings.enqueue_debounce);
                }
            }
            WorkerCommand::Clear => {
                courier_info!(
                    "clearing worker queue ({} queued, batch in flight: {})",
                    self.queue.len(),
                    self.in_flight.is_some()
                );
                self.queue.clear();
                self.epoch += 1;
                self.next_pass = None;
                if let Some(batch) = self.in_flight.take() {
                    batch.cancel();
                }
            }
            WorkerCommand::InjectFault(_) => {}
        }
    }

    /// Keeps the earlier deadline if a pass is already scheduled.
    fn schedule_pass(&mut self, delay: Duration) {
        let at = Instant::now() + delay;
        self.next_pass = Some(match self.next_pass {
            Some(existing) if existing <= at => existing,
            _ => at,
        });
    }

    fn process_queue(&mut self) {
        if self.in_flight.is_some() || self.queue.is_empty() {
            return;
        }
        let Some(settle_tx) = self.settle_tx.clone() else {
            return;
        };

        let batch = self.queue.take_batch();
        courier_debug!(
            "processing batch of {} ({} left queued)",
            batch.len(),
            self.queue.len()
        );
        for item in &batch {
            let _ = self.events.send(WorkerEvent::ProcessStarted {
                id: item.id,
                attempt: item.retries + 1,
            });
        }

        let cancel = CancellationToken::new();
        self.in_flight = Some(cancel.clone());
        let epoch = self.epoch;
        let processor = self.processor.clone();
        let timeout = self.settings.message_timeout;

        tokio::spawn(async move {
            if let Some((outcomes, faults)) = run_batch(processor, batch, timeout, cancel).await {
                let _ = settle_tx.send(Settled {
                    epoch,
                    outcomes,
                    faults,
                });
            }
        });
    }

    fn handle_settled(&mut self, settled: Settled) {
        if settled.epoch != self.epoch {
            courier_debug!("dropping results of a batch cleared while in flight");
            return;
        }
        self.in_flight = None;

        for error in settled.faults {
            let _ = self.events.send(WorkerEvent::WorkerFault { error });
        }
        for event in self.queue.settle(settled.outcomes) {
            let _ = self.events.send(event);
        }

        if !self.queue.is_empty() {
            self.schedule_pass(self.settings.process_interval);
        }
    }
}

type BatchOutcome = (
    Vec<(WorkItem, Result<ProcessOutput, ProcessError>)>,
    Vec<String>,
);

/// Runs every item concurrently and waits for all of them. Returns `None` if cancelled.
async fn run_batch(
    processor: Arc<dyn Processor>,
    batch: Vec<WorkItem>,
    timeout: Duration,
    cancel: CancellationToken,
) -> Option<BatchOutcome> {
    let handles: Vec<_> = batch
        .iter()
        .cloned()
        .map(|item| {
            let processor = processor.clone();
            tokio::spawn(async move {
                match tokio::time::timeout(timeout, processor.process(&item)).await {
                    Ok(result) => result,
                    Err(_) => Err(ProcessError::Timeout(timeout)),
                }
            })
        })
        .collect();
    let aborts: Vec<_> = handles.iter().map(|handle| handle.abort_handle()).collect();

    let results = tokio::select! {
        results = join_all(handles) => results,
        _ = cancel.cancelled() => {
            for abort in aborts {
                abort.abort();
            }
            return None;
        }
    };

    let mut faults = Vec::new();
    let outcomes = batch
        .into_iter()
        .zip(results)
        .map(|(item, joined)| {
            let outcome = joined.unwrap_or_else(|err| {
                let error = format!(
                    "processing message {} crashed: {}",
                    item.id,
                    join_error_message(err)
                );
                courier_error!("{}", error);
                faults.push(error.clone());
                Err(ProcessError::Fault(error))
            });
            (item, outcome)
        })
        .collect();
    Some((outcomes, faults))
}

fn join_error_message(err: JoinError) -> String {
    if err.is_cancelled() {
        return "task cancelled".to_string();
    }
    panic_message(err.into_panic())
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        return (*message).to_string();
    }
    if let Some(message) = payload.downcast_ref::<String>() {
        return message.clone();
    }
    "unknown panic".to_string()
}
