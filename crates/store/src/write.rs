use chrono::{DateTime, SubsecRound, Utc};
use duckdb::params;
use spanscope_core::error::{Result, SpanscopeError};
use spanscope_core::model::notification::{CreateNotification, Notification, NotificationEvent};

use crate::Store;
use crate::retention::prune_to_limit;

/// DuckDB TIMESTAMP keeps microseconds; render without an offset so no zone conversion applies.
pub(crate) fn ts_param(ts: DateTime<Utc>) -> String {
    ts.naive_utc().format("%Y-%m-%d %H:%M:%S%.6f").to_string()
}

impl Store {
    /// Persists a new unread notification and evicts the oldest entries beyond the
    /// configured limit in the same transaction.
    pub fn create_notification(&self, request: CreateNotification) -> Result<Notification> {
        request.validate()?;
        let notification = request.into_notification(Utc::now().trunc_subsecs(6));
        let metadata_json = serde_json::to_string(&notification.metadata)
            .map_err(|e| SpanscopeError::Internal(format!("encode metadata failed: {e}")))?;

        let evicted = {
            let mut conn = self.conn()?;
            let tx = conn
                .transaction()
                .map_err(|e| SpanscopeError::Store(format!("begin tx failed: {e}")))?;
            tx.execute(
                "INSERT INTO notifications
                   (seq, id, ts, kind, title, message, is_read, service_name, trace_id, metadata_json)
                 VALUES (nextval('notifications_seq'), ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    notification.id,
                    ts_param(notification.timestamp),
                    notification.kind.as_str(),
                    notification.title,
                    notification.message,
                    notification.is_read,
                    notification.service_name,
                    notification.trace_id,
                    metadata_json,
                ],
            )
            .map_err(|e| SpanscopeError::Store(format!("insert notification failed: {e}")))?;
            let evicted = prune_to_limit(&tx, self.max_notifications())?;
            tx.commit()
                .map_err(|e| SpanscopeError::Store(format!("commit failed: {e}")))?;
            evicted
        };

        if evicted > 0 {
            tracing::debug!(evicted, "evicted notifications over limit");
        }
        self.publish(NotificationEvent::Created {
            notification: notification.clone(),
        });
        Ok(notification)
    }

    /// Returns false when no notification has this id. Marking an already read
    /// notification succeeds.
    pub fn mark_read(&self, id: &str) -> Result<bool> {
        let found = {
            let mut conn = self.conn()?;
            let tx = conn
                .transaction()
                .map_err(|e| SpanscopeError::Store(format!("begin tx failed: {e}")))?;
            let matches = tx
                .query_row(
                    "SELECT COUNT(*) FROM notifications WHERE id = ?",
                    params![id],
                    |row| row.get::<_, i64>(0),
                )
                .map_err(|e| SpanscopeError::Store(format!("lookup notification failed: {e}")))?;
            if matches > 0 {
                tx.execute(
                    "UPDATE notifications SET is_read = TRUE WHERE id = ? AND NOT is_read",
                    params![id],
                )
                .map_err(|e| SpanscopeError::Store(format!("mark read failed: {e}")))?;
            }
            tx.commit()
                .map_err(|e| SpanscopeError::Store(format!("commit failed: {e}")))?;
            matches > 0
        };

        if found {
            self.publish(NotificationEvent::Read { id: id.to_string() });
        }
        Ok(found)
    }

    pub fn mark_all_read(&self) -> Result<usize> {
        let count = self
            .conn()?
            .execute("UPDATE notifications SET is_read = TRUE WHERE NOT is_read", [])
            .map_err(|e| SpanscopeError::Store(format!("mark all read failed: {e}")))?;
        self.publish(NotificationEvent::AllRead { count });
        Ok(count)
    }

    pub fn delete_notification(&self, id: &str) -> Result<bool> {
        let removed = self
            .conn()?
            .execute("DELETE FROM notifications WHERE id = ?", params![id])
            .map_err(|e| SpanscopeError::Store(format!("delete notification failed: {e}")))?;
        if removed > 0 {
            self.publish(NotificationEvent::Deleted { id: id.to_string() });
        }
        Ok(removed > 0)
    }
}
