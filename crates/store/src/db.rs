use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, NaiveDateTime, Utc};
use duckdb::Connection;
use spanscope_core::error::{Result, SpanscopeError};
use spanscope_core::model::notification::NotificationEvent;
use spanscope_core::query::StoreStatus;
use tokio::sync::broadcast;

use crate::schema::SCHEMA_SQL;

const EVENT_CHANNEL_CAPACITY: usize = 1024;
pub const DEFAULT_MAX_NOTIFICATIONS: usize = 100;

/// Notification storage shared by the API and the monitor. Every mutation is broadcast to
/// subscribers after it commits.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
    db_path: String,
    max_notifications: usize,
    event_tx: broadcast::Sender<NotificationEvent>,
}

impl Store {
    pub fn open(path: &Path, max_notifications: usize) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| SpanscopeError::Io(format!("failed to create db dir: {e}")))?;
        }

        let conn = Connection::open(path)
            .map_err(|e| SpanscopeError::Store(format!("failed to open duckdb: {e}")))?;
        conn.execute_batch("PRAGMA threads=2;")
            .map_err(|e| SpanscopeError::Store(format!("failed to set pragmas: {e}")))?;
        Self::init(conn, path.display().to_string(), max_notifications)
    }

    pub fn open_in_memory(max_notifications: usize) -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| SpanscopeError::Store(format!("failed to open in-memory db: {e}")))?;
        Self::init(conn, ":memory:".to_string(), max_notifications)
    }

    fn init(conn: Connection, db_path: String, max_notifications: usize) -> Result<Self> {
        if max_notifications == 0 {
            return Err(SpanscopeError::Config(
                "notification limit must be at least 1".to_string(),
            ));
        }
        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| SpanscopeError::Store(format!("failed to initialize schema: {e}")))?;
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path,
            max_notifications,
            event_tx,
        })
    }

    pub(crate) fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| SpanscopeError::Store("store mutex poisoned".to_string()))
    }

    pub fn max_notifications(&self) -> usize {
        self.max_notifications
    }

    pub fn status(&self) -> Result<StoreStatus> {
        let conn = self.conn()?;

        let notification_count = scalar_usize(&conn, "SELECT COUNT(*) FROM notifications")?;
        let unread_count = scalar_usize(
            &conn,
            "SELECT COUNT(*) FROM notifications WHERE NOT is_read",
        )?;
        let oldest = scalar_ts(&conn, "SELECT MIN(ts) FROM notifications")?;
        let newest = scalar_ts(&conn, "SELECT MAX(ts) FROM notifications")?;

        let db_size_bytes = if self.db_path == ":memory:" {
            0
        } else {
            fs::metadata(&self.db_path).map(|m| m.len()).unwrap_or(0)
        };

        Ok(StoreStatus {
            db_path: self.db_path.clone(),
            db_size_bytes,
            notification_count,
            unread_count,
            oldest,
            newest,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NotificationEvent> {
        self.event_tx.subscribe()
    }

    /// No subscribers is not an error.
    pub(crate) fn publish(&self, event: NotificationEvent) {
        tracing::debug!(event = event.name(), "notification event");
        let _ = self.event_tx.send(event);
    }
}

pub(crate) fn scalar_usize(conn: &Connection, sql: &str) -> Result<usize> {
    conn.query_row(sql, [], |row| row.get::<_, i64>(0))
        .map(|v| v.max(0) as usize)
        .map_err(|e| SpanscopeError::Store(format!("query failed: {e}")))
}

fn scalar_ts(conn: &Connection, sql: &str) -> Result<Option<DateTime<Utc>>> {
    conn.query_row(sql, [], |row| row.get::<_, Option<NaiveDateTime>>(0))
        .map(|opt| opt.map(|dt| dt.and_utc()))
        .map_err(|e| SpanscopeError::Store(format!("query failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_store_initializes() {
        let store = Store::open_in_memory(10).unwrap();
        let status = store.status().unwrap();
        assert_eq!(status.db_path, ":memory:");
        assert_eq!(status.notification_count, 0);
        assert_eq!(status.unread_count, 0);
        assert!(status.oldest.is_none());
    }

    #[test]
    fn zero_limit_is_rejected() {
        assert!(matches!(
            Store::open_in_memory(0),
            Err(SpanscopeError::Config(_))
        ));
    }

    #[test]
    fn file_store_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("notifications.duckdb");
        let store = Store::open(&path, 5).unwrap();
        assert_eq!(store.max_notifications(), 5);
        assert!(path.exists());
    }
}
