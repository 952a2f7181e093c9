use std::collections::BTreeMap;

use spanscope_core::error::{Result, SpanscopeError};
use spanscope_core::model::span::{Span, SpanLog};
use spanscope_core::model::tag::TagValue;
use spanscope_core::time::micros_to_datetime;

use crate::model::{CHILD_OF, RawKeyValue, RawLog, RawSpan, RawTrace};

/// Normalizes every span of a raw trace, failing the whole trace on the first span with an
/// unusable timestamp.
pub fn normalize_trace(raw: &RawTrace) -> Result<Vec<Span>> {
    raw.spans
        .iter()
        .map(|span| normalize_span(raw, span))
        .collect()
}

pub fn normalize_span(raw: &RawTrace, span: &RawSpan) -> Result<Span> {
    let start_us = micros_field(span.start_time.as_ref(), "startTime", &span.span_id)?;
    let duration_us = micros_field(span.duration.as_ref(), "duration", &span.span_id)?;
    if duration_us < 0 {
        return Err(SpanscopeError::DataFormat(format!(
            "span {} has negative duration {duration_us}us",
            span.span_id
        )));
    }

    let start_time = micros_to_datetime(start_us)?;
    let end_time = start_time
        .checked_add_signed(chrono::Duration::microseconds(duration_us))
        .ok_or_else(|| {
            SpanscopeError::DataFormat(format!("span {} ends out of range", span.span_id))
        })?;

    Ok(Span {
        span_id: span.span_id.clone(),
        parent_span_id: parent_span_id(span),
        trace_id: if span.trace_id.is_empty() {
            raw.trace_id.clone()
        } else {
            span.trace_id.clone()
        },
        operation_name: span.operation_name.clone(),
        service_name: service_name(raw, span),
        start_time,
        end_time,
        tags: kv_to_map(&span.tags),
        logs: span
            .logs
            .iter()
            .map(|log| decode_log(log, &span.span_id))
            .collect::<Result<Vec<_>>>()?,
    })
}

fn service_name(raw: &RawTrace, span: &RawSpan) -> String {
    let process = span
        .process_id
        .as_deref()
        .and_then(|pid| raw.processes.get(pid));
    match process {
        Some(p) => p.service_name.clone(),
        None => {
            tracing::debug!(
                trace_id = %raw.trace_id,
                span_id = %span.span_id,
                process_id = ?span.process_id,
                "span process not resolved; using empty service name"
            );
            String::new()
        }
    }
}

fn parent_span_id(span: &RawSpan) -> Option<String> {
    span.references
        .iter()
        .find(|r| r.ref_type.eq_ignore_ascii_case(CHILD_OF))
        .map(|r| r.span_id.clone())
}

/// Later duplicates overwrite earlier ones.
fn kv_to_map(kvs: &[RawKeyValue]) -> BTreeMap<String, TagValue> {
    kvs.iter()
        .map(|kv| (kv.key.clone(), TagValue::from_json(kv.value.clone())))
        .collect()
}

fn decode_log(log: &RawLog, span_id: &str) -> Result<SpanLog> {
    let ts = micros_field(log.timestamp.as_ref(), "log timestamp", span_id)?;
    Ok(SpanLog {
        timestamp: micros_to_datetime(ts)?,
        fields: kv_to_map(&log.fields),
    })
}

fn micros_field(value: Option<&serde_json::Value>, field: &str, span_id: &str) -> Result<i64> {
    let bad = |detail: String| {
        SpanscopeError::DataFormat(format!("span {span_id}: {field} {detail}"))
    };
    match value {
        None | Some(serde_json::Value::Null) => Err(bad("is missing".to_string())),
        Some(serde_json::Value::Number(n)) => {
            if let Some(v) = n.as_i64() {
                return Ok(v);
            }
            match n.as_f64() {
                Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Ok(f as i64),
                _ => Err(bad(format!("is not an integer microsecond value: {n}"))),
            }
        }
        Some(serde_json::Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map_err(|e| bad(format!("is not an integer: {s:?} ({e})"))),
        Some(other) => Err(bad(format!("has unsupported encoding: {other}"))),
    }
}
