pub const SCHEMA_SQL: &str = r#"
CREATE SEQUENCE IF NOT EXISTS notifications_seq;

CREATE TABLE IF NOT EXISTS notifications (
  seq BIGINT NOT NULL,
  id TEXT NOT NULL,
  ts TIMESTAMP NOT NULL,
  kind TEXT NOT NULL,
  title TEXT NOT NULL,
  message TEXT NOT NULL,
  is_read BOOLEAN NOT NULL,
  service_name TEXT,
  trace_id TEXT,
  metadata_json TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_notifications_ts ON notifications(ts);
"#;
