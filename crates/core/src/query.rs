use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SpanscopeError};
use crate::filter::{TagFilter, TimeWindow};

pub const DEFAULT_SEARCH_LIMIT: usize = 20;
pub const MAX_SEARCH_LIMIT: usize = 1500;

/// Filters for an upstream trace search. Durations are microseconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TraceSearchParams {
    pub service: Option<String>,
    pub operation: Option<String>,
    pub tags: Vec<TagFilter>,
    pub min_duration_us: Option<i64>,
    pub max_duration_us: Option<i64>,
    pub window: TimeWindow,
    pub limit: usize,
}

impl Default for TraceSearchParams {
    fn default() -> Self {
        Self {
            service: None,
            operation: None,
            tags: Vec::new(),
            min_duration_us: None,
            max_duration_us: None,
            window: TimeWindow::all(),
            limit: DEFAULT_SEARCH_LIMIT,
        }
    }
}

impl TraceSearchParams {
    pub fn validate(&self) -> Result<()> {
        if self.limit == 0 || self.limit > MAX_SEARCH_LIMIT {
            return Err(SpanscopeError::Validation(format!(
                "limit must be between 1 and {MAX_SEARCH_LIMIT}, got {}",
                self.limit
            )));
        }
        if let (Some(min), Some(max)) = (self.min_duration_us, self.max_duration_us)
            && min > max
        {
            return Err(SpanscopeError::Validation(format!(
                "minDuration ({min}us) exceeds maxDuration ({max}us)"
            )));
        }
        if self.min_duration_us.is_some_and(|v| v < 0) || self.max_duration_us.is_some_and(|v| v < 0)
        {
            return Err(SpanscopeError::Validation(
                "durations cannot be negative".to_string(),
            ));
        }
        if let (Some(since), Some(until)) = (self.window.since, self.window.until)
            && since > until
        {
            return Err(SpanscopeError::Validation(
                "start of the time window is after its end".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub upstream: String,
    pub upstream_reachable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error: String,
}

/// Snapshot of the notification store, reported by `spanscope status`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StoreStatus {
    pub db_path: String,
    pub db_size_bytes: u64,
    pub notification_count: usize,
    pub unread_count: usize,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub health: HealthResponse,
    /// Absent when notifications are disabled.
    pub store: Option<StoreStatus>,
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    #[test]
    fn default_params_are_valid() {
        assert!(TraceSearchParams::default().validate().is_ok());
    }

    #[test]
    fn rejects_inverted_ranges() {
        let params = TraceSearchParams {
            min_duration_us: Some(10),
            max_duration_us: Some(5),
            ..TraceSearchParams::default()
        };
        assert!(params.validate().is_err());

        let since = Utc.with_ymd_and_hms(2026, 2, 2, 0, 0, 0).unwrap();
        let params = TraceSearchParams {
            window: TimeWindow {
                since: Some(since),
                until: Some(since - chrono::Duration::hours(1)),
            },
            ..TraceSearchParams::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn rejects_zero_limit() {
        let params = TraceSearchParams {
            limit: 0,
            ..TraceSearchParams::default()
        };
        assert!(params.validate().is_err());
    }
}
