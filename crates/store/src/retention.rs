use std::time::Duration;

use chrono::Utc;
use duckdb::{Connection, params};
use spanscope_core::error::{Result, SpanscopeError};

use crate::Store;
use crate::write::ts_param;

impl Store {
    /// Drops notifications older than `ttl`. Returns how many were removed.
    pub fn prune_ttl(&self, ttl: Duration) -> Result<usize> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| SpanscopeError::Config(format!("invalid ttl: {e}")))?;
        let cutoff = Utc::now() - ttl;
        self.conn()?
            .execute(
                "DELETE FROM notifications WHERE ts < ?",
                params![ts_param(cutoff)],
            )
            .map_err(|e| SpanscopeError::Store(format!("ttl prune failed: {e}")))
    }
}

/// Keeps the newest `limit` notifications, ties broken by insertion order.
pub(crate) fn prune_to_limit(conn: &Connection, limit: usize) -> Result<usize> {
    let sql = format!(
        "DELETE FROM notifications WHERE seq NOT IN
           (SELECT seq FROM notifications ORDER BY ts DESC, seq DESC LIMIT {limit})"
    );
    conn.execute(&sql, [])
        .map_err(|e| SpanscopeError::Store(format!("limit prune failed: {e}")))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::TimeZone;
    use duckdb::params;
    use spanscope_core::model::notification::{CreateNotification, NotificationType};

    use crate::Store;
    use crate::write::ts_param;

    #[test]
    fn ttl_prunes_old_notifications() {
        let store = Store::open_in_memory(10).unwrap();
        let old = store
            .create_notification(CreateNotification::new(
                NotificationType::Info,
                "old",
                "from long ago",
            ))
            .unwrap();
        store
            .create_notification(CreateNotification::new(
                NotificationType::Info,
                "fresh",
                "just now",
            ))
            .unwrap();
        let ancient = chrono::Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap();
        store
            .conn()
            .unwrap()
            .execute(
                "UPDATE notifications SET ts = ? WHERE id = ?",
                params![ts_param(ancient), old.id],
            )
            .unwrap();

        assert_eq!(store.prune_ttl(Duration::from_secs(3600)).unwrap(), 1);
        let left = store.list_notifications(false).unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].title, "fresh");
    }
}
