use std::io::{self, BufRead};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use courier_core::{
    update, ConfigKind, ConfigMsg, MessageProcessor, Msg, QueueState, QueueViewModel,
};
use courier_engine::{
    ensure_data_dir, ChangeEvent, ChangeFeed, ChangeFilter, ConfigSync, LocalBackend,
    RemoteTable, SessionProvider, Subscription,
};
use courier_logging::{courier_debug, courier_info, courier_warn};

use crate::commands::{parse_command, Command, HELP};
use crate::effects::{row_to_config, EffectRunner};
use crate::render::{status_lines, Renderer};
use crate::settings::AppSettings;

const LOOP_INTERVAL: Duration = Duration::from_millis(50);

enum Input {
    Line(String),
    Eof,
}

pub fn run_app(settings: AppSettings) -> anyhow::Result<()> {
    ensure_data_dir(&settings.data_dir)?;
    let backend = Arc::new(
        LocalBackend::open(&settings.data_dir)
            .with_context(|| format!("failed to open backend at {:?}", settings.data_dir))?,
    );
    match &settings.user_id {
        Some(user) => backend.sign_in(user.clone()),
        None => courier_warn!("no user configured; settings will not sync"),
    }

    // Realtime updates to our own settings rows, e.g. from another session.
    let subscriptions: Vec<Subscription> = ConfigKind::ALL
        .into_iter()
        .map(|kind| backend.subscribe(kind.table(), ChangeFilter::Update))
        .collect();

    let tables: Arc<dyn RemoteTable> = backend.clone();
    let session: Arc<dyn SessionProvider> = backend;
    let (msg_tx, msg_rx) = mpsc::channel::<Msg>();
    let runner = EffectRunner::new(&settings, ConfigSync::new(tables, session), msg_tx)?;

    let mut app = App::new(runner, settings.user_id.clone());
    app.start();
    let input_rx = spawn_input_reader();
    let mut input_closed = false;

    loop {
        while let Ok(input) = input_rx.try_recv() {
            match input {
                Input::Line(line) => {
                    if !app.handle_line(&line) {
                        return app.finish();
                    }
                }
                Input::Eof => {
                    courier_debug!("stdin closed; waiting for the queue to drain");
                    input_closed = true;
                }
            }
        }
        while let Ok(msg) = msg_rx.try_recv() {
            app.dispatch(msg);
        }
        for msg in app.runner.drain_worker_events() {
            app.dispatch(msg);
        }
        for subscription in &subscriptions {
            while let Some(event) = subscription.try_recv() {
                app.handle_change(event);
            }
        }
        let view = app.refresh();

        if input_closed && view.is_idle() {
            return app.finish();
        }
        thread::sleep(LOOP_INTERVAL);
    }
}

fn spawn_input_reader() -> mpsc::Receiver<Input> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(Input::Line(line)).is_err() {
                        return;
                    }
                }
                Err(err) => {
                    courier_warn!("reading stdin failed: {}", err);
                    break;
                }
            }
        }
        let _ = tx.send(Input::Eof);
    });
    rx
}

struct App {
    state: QueueState,
    processor: MessageProcessor,
    renderer: Renderer,
    runner: EffectRunner,
    user_id: Option<String>,
    system_prompt: Option<String>,
}

impl App {
    fn new(runner: EffectRunner, user_id: Option<String>) -> Self {
        Self {
            state: QueueState::new(),
            processor: MessageProcessor::new(),
            renderer: Renderer::new(),
            runner,
            user_id,
            system_prompt: None,
        }
    }

    fn start(&mut self) {
        if let Some(msg) = self.processor.mount() {
            self.dispatch(msg);
        }
        for kind in ConfigKind::ALL {
            self.dispatch(Msg::Config(ConfigMsg::FetchRequested(kind)));
        }
        println!("courier ready; /help lists commands");
    }

    fn dispatch(&mut self, msg: Msg) {
        let state = std::mem::take(&mut self.state);
        let (state, effects) = update(state, msg);
        self.state = state;
        self.runner.run(effects);
    }

    /// Returns false when the user asked to quit.
    fn handle_line(&mut self, line: &str) -> bool {
        let now_ms = Utc::now().timestamp_millis();
        match parse_command(line, self.state.config(), now_ms) {
            Command::Dispatch(msgs) => {
                for msg in msgs {
                    self.dispatch(msg);
                }
            }
            Command::Status => {
                for line in status_lines(&self.state.view()) {
                    println!("{line}");
                }
            }
            Command::Help => println!("{HELP}"),
            Command::Quit => return false,
            Command::Unknown(line) => println!("unknown command: {line} (try /help)"),
            Command::Ignore => {}
        }
        true
    }

    fn handle_change(&mut self, event: ChangeEvent) {
        if self.user_id.as_deref() != Some(event.key.as_str()) {
            return;
        }
        let (Some(kind), Some(row)) = (ConfigKind::from_table(&event.table), event.new) else {
            return;
        };
        match row_to_config(kind, row) {
            Ok(value) => {
                courier_debug!("remote update for {} settings", kind.label());
                self.dispatch(Msg::Config(ConfigMsg::Fetched(value)));
            }
            Err(err) => courier_warn!("ignoring malformed {} update: {}", kind.label(), err),
        }
    }

    /// Prints whatever changed since the last call and returns the current view.
    fn refresh(&mut self) -> QueueViewModel {
        let view = self.state.view();
        if !self.state.consume_dirty() {
            return view;
        }

        for notification in self.processor.observe(&view) {
            courier_warn!("{}: {}", notification.title, notification.body);
            if let Some(line) = self.renderer.notification(&notification, &view) {
                eprintln!("{line}");
            }
        }
        for line in self.renderer.render(&view) {
            println!("{line}");
        }

        let prompt = view.config.personality.value().system_prompt();
        if self.system_prompt.as_deref() != Some(prompt.as_str()) {
            courier_debug!("system prompt updated");
            self.runner.set_system_prompt(prompt.clone());
            self.system_prompt = Some(prompt);
        }
        view
    }

    fn finish(self) -> anyhow::Result<()> {
        courier_info!(
            "shutting down with {} messages buffered",
            self.state.buffer().len()
        );
        self.runner.shutdown();
        Ok(())
    }
}
