use std::collections::BTreeMap;

use chrono::{DateTime, TimeZone, Utc};
use spanscope_core::model::span::{ERROR_TAG, Span};
use spanscope_core::model::tag::TagValue;
use spanscope_core::model::trace::Trace;

use crate::assemble;

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap()
}

/// Span starting `offset_ms` after [`base_time`] and lasting `dur_ms`.
pub fn span(
    id: &str,
    parent: Option<&str>,
    service: &str,
    operation: &str,
    offset_ms: i64,
    dur_ms: i64,
    error: bool,
) -> Span {
    let start = base_time() + chrono::Duration::milliseconds(offset_ms);
    let mut tags = BTreeMap::new();
    if error {
        tags.insert(ERROR_TAG.to_string(), TagValue::from("true"));
    }
    Span {
        span_id: id.to_string(),
        parent_span_id: parent.map(str::to_string),
        trace_id: String::new(),
        operation_name: operation.to_string(),
        service_name: service.to_string(),
        start_time: start,
        end_time: start + chrono::Duration::milliseconds(dur_ms),
        tags,
        logs: Vec::new(),
    }
}

pub fn trace(trace_id: &str, spans: Vec<Span>) -> Trace {
    let spans = spans
        .into_iter()
        .map(|mut s| {
            s.trace_id = trace_id.to_string();
            s
        })
        .collect();
    assemble(trace_id, spans)
}

/// web -> auth, where the auth call fails.
pub fn t1() -> Trace {
    trace(
        "t1",
        vec![
            span("a", None, "web", "GET /", 0, 100, false),
            span("b", Some("a"), "auth", "POST /login", 10, 40, true),
        ],
    )
}

/// A clean web -> cart trace starting `offset_ms` after the base time.
pub fn clean(trace_id: &str, offset_ms: i64) -> Trace {
    trace(
        trace_id,
        vec![
            span("r", None, "web", "GET /cart", offset_ms, 50, false),
            span("c", Some("r"), "cart", "load", offset_ms + 5, 20, false),
        ],
    )
}
