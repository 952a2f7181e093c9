use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};

use crate::error::{Result, SpanscopeError};

pub fn parse_time_or_relative(input: &str) -> Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(input) {
        return Ok(ts.with_timezone(&Utc));
    }

    if let Ok(duration) = humantime::parse_duration(input) {
        return Ok(Utc::now()
            - chrono::Duration::from_std(duration).map_err(|e| {
                SpanscopeError::Validation(format!("failed to convert duration: {e}"))
            })?);
    }

    Err(SpanscopeError::Validation(format!(
        "expected RFC3339 time or duration, got {input}"
    )))
}

pub fn parse_duration_str(input: &str) -> Result<Duration> {
    humantime::parse_duration(input)
        .map_err(|e| SpanscopeError::Validation(format!("invalid duration {input}: {e}")))
}

/// Converts Unix microseconds into a UTC timestamp, rejecting values chrono cannot represent.
pub fn micros_to_datetime(micros: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_micros(micros)
        .single()
        .ok_or_else(|| SpanscopeError::DataFormat(format!("timestamp out of range: {micros}")))
}

pub fn to_unix_micros(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_micros()
}

/// Milliseconds with microsecond precision, the unit every derived view reports durations in.
pub fn duration_ms(duration: chrono::Duration) -> f64 {
    match duration.num_microseconds() {
        Some(us) => us as f64 / 1000.0,
        None => duration.num_milliseconds() as f64,
    }
}

pub fn hours_ago(hours: u32) -> DateTime<Utc> {
    Utc::now() - chrono::Duration::hours(i64::from(hours))
}
