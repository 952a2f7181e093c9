use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};

use crate::model::tag::TagValue;
use crate::time::duration_ms;

pub const ERROR_TAG: &str = "error";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SpanLog {
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub fields: BTreeMap<String, TagValue>,
}

/// A normalized span. Duration and the error flag are derived, never stored.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Span {
    pub span_id: String,
    pub parent_span_id: Option<String>,
    pub trace_id: String,
    pub operation_name: String,
    pub service_name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub tags: BTreeMap<String, TagValue>,
    #[serde(default)]
    pub logs: Vec<SpanLog>,
}

impl Span {
    pub fn duration(&self) -> chrono::Duration {
        self.end_time - self.start_time
    }

    pub fn duration_ms(&self) -> f64 {
        duration_ms(self.duration())
    }

    /// True when the `error` tag renders exactly as `true`.
    pub fn has_error(&self) -> bool {
        self.tags
            .get(ERROR_TAG)
            .is_some_and(|value| value.to_string() == "true")
    }

    pub fn is_root(&self) -> bool {
        self.parent_span_id.is_none()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SpanView<'a> {
    span_id: &'a str,
    parent_span_id: Option<&'a str>,
    trace_id: &'a str,
    operation_name: &'a str,
    service_name: &'a str,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    duration: f64,
    has_error: bool,
    tags: &'a BTreeMap<String, TagValue>,
    logs: &'a [SpanLog],
}

impl Serialize for Span {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        SpanView {
            span_id: &self.span_id,
            parent_span_id: self.parent_span_id.as_deref(),
            trace_id: &self.trace_id,
            operation_name: &self.operation_name,
            service_name: &self.service_name,
            start_time: self.start_time,
            end_time: self.end_time,
            duration: self.duration_ms(),
            has_error: self.has_error(),
            tags: &self.tags,
            logs: &self.logs,
        }
        .serialize(serializer)
    }
}
