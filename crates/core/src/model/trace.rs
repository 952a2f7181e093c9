use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};

use crate::model::span::Span;
use crate::time::duration_ms;

/// An assembled trace. Built once from its spans and never updated afterwards.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Trace {
    pub trace_id: String,
    pub spans: Vec<Span>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub root_service: String,
    pub has_error: bool,
}

impl Trace {
    pub fn duration(&self) -> chrono::Duration {
        self.end_time - self.start_time
    }

    pub fn duration_ms(&self) -> f64 {
        duration_ms(self.duration())
    }

    /// Distinct service names in first-seen order.
    pub fn services(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for span in &self.spans {
            if !out.contains(&span.service_name.as_str()) {
                out.push(&span.service_name);
            }
        }
        out
    }

    pub fn service_count(&self) -> usize {
        self.services().len()
    }

    pub fn spans_of<'a>(&'a self, service: &'a str) -> impl Iterator<Item = &'a Span> + 'a {
        self.spans.iter().filter(move |s| s.service_name == service)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TraceView<'a> {
    trace_id: &'a str,
    spans: &'a [Span],
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    duration: f64,
    root_service: &'a str,
    has_error: bool,
}

impl Serialize for Trace {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        TraceView {
            trace_id: &self.trace_id,
            spans: &self.spans,
            start_time: self.start_time,
            end_time: self.end_time,
            duration: self.duration_ms(),
            root_service: &self.root_service,
            has_error: self.has_error,
        }
        .serialize(serializer)
    }
}

/// Row used by list views that do not need the spans themselves.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TraceSummary {
    pub trace_id: String,
    pub root_service: String,
    pub start_time: DateTime<Utc>,
    pub duration: f64,
    pub span_count: usize,
    pub service_count: usize,
    pub has_error: bool,
}

impl From<&Trace> for TraceSummary {
    fn from(trace: &Trace) -> Self {
        Self {
            trace_id: trace.trace_id.clone(),
            root_service: trace.root_service.clone(),
            start_time: trace.start_time,
            duration: trace.duration_ms(),
            span_count: trace.spans.len(),
            service_count: trace.service_count(),
            has_error: trace.has_error,
        }
    }
}
