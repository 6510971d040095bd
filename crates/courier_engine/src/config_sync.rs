use std::sync::Arc;

use courier_logging::{courier_debug, courier_info};
use serde_json::json;

use crate::backend::{BackendError, RemoteTable, Row, SessionProvider};

pub const HISTORY_TABLE: &str = "chat_history";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub id: u64,
    pub content: String,
    pub timestamp_ms: i64,
}

/// User-scoped access to configuration rows and chat history.
///
/// Reads without a session are silent no-ops; writes without one fail with
/// `NotAuthenticated`.
#[derive(Clone)]
pub struct ConfigSync {
    tables: Arc<dyn RemoteTable>,
    session: Arc<dyn SessionProvider>,
}

impl ConfigSync {
    pub fn new(tables: Arc<dyn RemoteTable>, session: Arc<dyn SessionProvider>) -> Self {
        Self { tables, session }
    }

    /// `Ok(None)` when signed out or when the user has no row yet.
    pub async fn fetch(&self, table: &str) -> Result<Option<Row>, BackendError> {
        let Some(user) = self.session.current_user() else {
            courier_debug!("skipping fetch of {} without a session", table);
            return Ok(None);
        };
        match self.tables.fetch_row(table, &user).await {
            Ok(row) => Ok(Some(row)),
            Err(BackendError::NotFound) => Ok(None),
            Err(err) => Err(err),
        }
    }

    pub async fn persist(&self, table: &str, row: Row) -> Result<(), BackendError> {
        let user = self
            .session
            .current_user()
            .ok_or(BackendError::NotAuthenticated)?;
        self.tables.upsert_row(table, &user, row).await
    }

    /// Inserts one history row per entry; returns how many were written.
    pub async fn append_history(&self, entries: &[HistoryEntry]) -> Result<usize, BackendError> {
        let user = self
            .session
            .current_user()
            .ok_or(BackendError::NotAuthenticated)?;
        let mut written = 0;
        for entry in entries {
            let key = format!("{user}/{}/{}", entry.timestamp_ms, entry.id);
            let row = json!({
                "user_id": user,
                "message_id": entry.id,
                "content": entry.content,
                "timestamp": entry.timestamp_ms,
            });
            match self.tables.insert_row(HISTORY_TABLE, &key, row).await {
                Ok(()) => written += 1,
                // Already recorded by an earlier flush.
                Err(BackendError::Conflict) => {}
                Err(err) => return Err(err),
            }
        }
        courier_info!("appended {} history rows", written);
        Ok(written)
    }
}
