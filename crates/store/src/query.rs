use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::NaiveDateTime;
use duckdb::params;
use spanscope_core::error::{Result, SpanscopeError};
use spanscope_core::model::notification::{Notification, NotificationList, NotificationType};

use crate::Store;
use crate::db::scalar_usize;

const SELECT_COLUMNS: &str =
    "SELECT id, ts, kind, title, message, is_read, service_name, trace_id, metadata_json
     FROM notifications";

struct NotificationRow {
    id: String,
    ts: NaiveDateTime,
    kind: String,
    title: String,
    message: String,
    is_read: bool,
    service_name: Option<String>,
    trace_id: Option<String>,
    metadata_json: String,
}

impl NotificationRow {
    fn from_row(row: &duckdb::Row<'_>) -> duckdb::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            ts: row.get(1)?,
            kind: row.get(2)?,
            title: row.get(3)?,
            message: row.get(4)?,
            is_read: row.get(5)?,
            service_name: row.get(6)?,
            trace_id: row.get(7)?,
            metadata_json: row.get(8)?,
        })
    }

    fn into_notification(self) -> Result<Notification> {
        let metadata: BTreeMap<String, String> = serde_json::from_str(&self.metadata_json)
            .map_err(|e| {
                SpanscopeError::Store(format!("corrupt metadata on notification {}: {e}", self.id))
            })?;
        Ok(Notification {
            kind: NotificationType::from_str(&self.kind)?,
            id: self.id,
            title: self.title,
            message: self.message,
            timestamp: self.ts.and_utc(),
            is_read: self.is_read,
            service_name: self.service_name,
            trace_id: self.trace_id,
            metadata,
        })
    }
}

impl Store {
    /// Newest first.
    pub fn list_notifications(&self, unread_only: bool) -> Result<Vec<Notification>> {
        let sql = format!(
            "{SELECT_COLUMNS} {} ORDER BY ts DESC, seq DESC",
            if unread_only { "WHERE NOT is_read" } else { "" }
        );
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| SpanscopeError::Store(format!("prepare list notifications failed: {e}")))?;
        let rows = stmt
            .query_map([], NotificationRow::from_row)
            .map_err(|e| SpanscopeError::Store(format!("query notifications failed: {e}")))?;

        let mut out = Vec::new();
        for row in rows {
            let row = row
                .map_err(|e| SpanscopeError::Store(format!("map notification row failed: {e}")))?;
            out.push(row.into_notification()?);
        }
        Ok(out)
    }

    pub fn get_notification(&self, id: &str) -> Result<Option<Notification>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!("{SELECT_COLUMNS} WHERE id = ?"))
            .map_err(|e| SpanscopeError::Store(format!("prepare get notification failed: {e}")))?;
        let mut rows = stmt
            .query_map(params![id], NotificationRow::from_row)
            .map_err(|e| SpanscopeError::Store(format!("query notification failed: {e}")))?;
        match rows.next() {
            Some(row) => row
                .map_err(|e| SpanscopeError::Store(format!("map notification row failed: {e}")))?
                .into_notification()
                .map(Some),
            None => Ok(None),
        }
    }

    pub fn unread_count(&self) -> Result<usize> {
        let conn = self.conn()?;
        scalar_usize(&conn, "SELECT COUNT(*) FROM notifications WHERE NOT is_read")
    }

    pub fn notification_list(&self, unread_only: bool) -> Result<NotificationList> {
        Ok(NotificationList {
            notifications: self.list_notifications(unread_only)?,
            unread_count: self.unread_count()?,
        })
    }
}
