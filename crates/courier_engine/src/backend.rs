//! Interfaces of the hosted backend the queue and configuration layers rely on,
//! plus a local implementation backed by memory and an optional JSON snapshot.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{mpsc, Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use courier_logging::{courier_debug, courier_error, courier_info};
use serde_json::Value;
use thiserror::Error;

use crate::persist::{PersistError, SnapshotFile};

pub type Row = Value;
pub type UserId = String;

const SNAPSHOT_FILENAME: &str = "tables.json";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// No row for this key. Distinct from real failures so callers can fall back to defaults.
    #[error("row not found")]
    NotFound,
    #[error("row already exists")]
    Conflict,
    #[error("not authenticated")]
    NotAuthenticated,
    #[error("storage error: {0}")]
    Storage(String),
}

/// Row storage keyed by table and key (usually the user id).
#[async_trait::async_trait]
pub trait RemoteTable: Send + Sync {
    async fn fetch_row(&self, table: &str, key: &str) -> Result<Row, BackendError>;
    /// Fails with `Conflict` if the key exists.
    async fn insert_row(&self, table: &str, key: &str, row: Row) -> Result<(), BackendError>;
    /// Fails with `NotFound` if the key does not exist.
    async fn update_row(&self, table: &str, key: &str, row: Row) -> Result<(), BackendError>;
    async fn upsert_row(&self, table: &str, key: &str, row: Row) -> Result<(), BackendError>;
}

pub trait SessionProvider: Send + Sync {
    fn current_user(&self) -> Option<UserId>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeFilter {
    Insert,
    Update,
    All,
}

impl ChangeFilter {
    fn accepts(self, kind: ChangeKind) -> bool {
        matches!(
            (self, kind),
            (ChangeFilter::All, _)
                | (ChangeFilter::Insert, ChangeKind::Insert)
                | (ChangeFilter::Update, ChangeKind::Update)
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub table: String,
    pub kind: ChangeKind,
    pub key: String,
    pub new: Option<Row>,
    pub old: Option<Row>,
}

pub trait ChangeFeed: Send + Sync {
    fn subscribe(&self, table: &str, filter: ChangeFilter) -> Subscription;
}

struct Subscriber {
    id: u64,
    table: String,
    filter: ChangeFilter,
    tx: mpsc::Sender<ChangeEvent>,
}

#[derive(Default)]
struct Subscribers {
    next_id: u64,
    entries: Vec<Subscriber>,
}

/// Live change subscription. Dropping it detaches from the feed.
pub struct Subscription {
    id: u64,
    rx: mpsc::Receiver<ChangeEvent>,
    registry: Weak<Mutex<Subscribers>>,
}

impl Subscription {
    pub fn try_recv(&self) -> Option<ChangeEvent> {
        self.rx.try_recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<ChangeEvent> {
        self.rx.recv_timeout(timeout).ok()
    }

    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            lock(&registry).entries.retain(|entry| entry.id != self.id);
        }
    }
}

type Tables = BTreeMap<String, BTreeMap<String, Row>>;

/// In-process backend: tables in memory, optional JSON snapshot on disk,
/// a change feed, and a single signed-in user.
pub struct LocalBackend {
    tables: Mutex<Tables>,
    subscribers: Arc<Mutex<Subscribers>>,
    user: Mutex<Option<UserId>>,
    snapshot: Option<SnapshotFile>,
}

impl LocalBackend {
    pub fn in_memory() -> Self {
        Self {
            tables: Mutex::new(Tables::new()),
            subscribers: Arc::new(Mutex::new(Subscribers::default())),
            user: Mutex::new(None),
            snapshot: None,
        }
    }

    /// Loads `{dir}/tables.json` if present; every write rewrites it.
    pub fn open(dir: &Path) -> Result<Self, BackendError> {
        let snapshot = SnapshotFile::new(dir.join(SNAPSHOT_FILENAME));
        let tables: Tables = snapshot.load()?;
        courier_info!("loaded {} tables from {:?}", tables.len(), snapshot.path());

        Ok(Self {
            tables: Mutex::new(tables),
            snapshot: Some(snapshot),
            ..Self::in_memory()
        })
    }

    pub fn sign_in(&self, user: impl Into<UserId>) {
        *lock(&self.user) = Some(user.into());
    }

    pub fn sign_out(&self) {
        *lock(&self.user) = None;
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.subscribers).entries.len()
    }

    fn write(
        &self,
        table: &str,
        key: &str,
        row: Row,
        mode: WriteMode,
    ) -> Result<(), BackendError> {
        let event = {
            let mut tables = lock(&self.tables);
            let rows = tables.entry(table.to_string()).or_default();
            let old = rows.get(key).cloned();
            match (mode, &old) {
                (WriteMode::Insert, Some(_)) => return Err(BackendError::Conflict),
                (WriteMode::Update, None) => return Err(BackendError::NotFound),
                _ => {}
            }
            rows.insert(key.to_string(), row.clone());
            self.save_snapshot(&tables)?;
            ChangeEvent {
                table: table.to_string(),
                kind: if old.is_some() {
                    ChangeKind::Update
                } else {
                    ChangeKind::Insert
                },
                key: key.to_string(),
                new: Some(row),
                old,
            }
        };
        self.publish(event);
        Ok(())
    }

    fn save_snapshot(&self, tables: &Tables) -> Result<(), BackendError> {
        let Some(snapshot) = &self.snapshot else {
            return Ok(());
        };
        snapshot.save(tables).map_err(|err| {
            courier_error!("failed to write snapshot: {}", err);
            BackendError::from(err)
        })
    }

    fn publish(&self, event: ChangeEvent) {
        let mut subscribers = lock(&self.subscribers);
        // Receivers that went away without dropping the subscription are pruned here.
        subscribers.entries.retain(|entry| {
            if entry.table != event.table || !entry.filter.accepts(event.kind) {
                return true;
            }
            entry.tx.send(event.clone()).is_ok()
        });
        courier_debug!("published {:?} on {}", event.kind, event.table);
    }
}

impl From<PersistError> for BackendError {
    fn from(err: PersistError) -> Self {
        BackendError::Storage(err.to_string())
    }
}

#[derive(Debug, Clone, Copy)]
enum WriteMode {
    Insert,
    Update,
    Upsert,
}

#[async_trait::async_trait]
impl RemoteTable for LocalBackend {
    async fn fetch_row(&self, table: &str, key: &str) -> Result<Row, BackendError> {
        lock(&self.tables)
            .get(table)
            .and_then(|rows| rows.get(key))
            .cloned()
            .ok_or(BackendError::NotFound)
    }

    async fn insert_row(&self, table: &str, key: &str, row: Row) -> Result<(), BackendError> {
        self.write(table, key, row, WriteMode::Insert)
    }

    async fn update_row(&self, table: &str, key: &str, row: Row) -> Result<(), BackendError> {
        self.write(table, key, row, WriteMode::Update)
    }

    async fn upsert_row(&self, table: &str, key: &str, row: Row) -> Result<(), BackendError> {
        self.write(table, key, row, WriteMode::Upsert)
    }
}

impl SessionProvider for LocalBackend {
    fn current_user(&self) -> Option<UserId> {
        lock(&self.user).clone()
    }
}

impl ChangeFeed for LocalBackend {
    fn subscribe(&self, table: &str, filter: ChangeFilter) -> Subscription {
        let (tx, rx) = mpsc::channel();
        let mut subscribers = lock(&self.subscribers);
        subscribers.next_id += 1;
        let id = subscribers.next_id;
        subscribers.entries.push(Subscriber {
            id,
            table: table.to_string(),
            filter,
            tx,
        });
        Subscription {
            id,
            rx,
            registry: Arc::downgrade(&self.subscribers),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
