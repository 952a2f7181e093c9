use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::json;
use spanscope_core::error::{Result, SpanscopeError};
use spanscope_core::model::tag::TagValue;
use spanscope_core::model::trace::Trace;
use spanscope_core::query::TraceSearchParams;
use spanscope_jaeger::TraceSource;
use spanscope_jaeger::model::{RawKeyValue, RawProcess, RawReference, RawSpan, RawTrace};

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap()
}

/// Builds Jaeger-shaped traces; offsets and durations are milliseconds from the trace start.
pub struct RawTraceBuilder {
    trace: RawTrace,
    start: DateTime<Utc>,
}

impl RawTraceBuilder {
    pub fn new(trace_id: &str) -> Self {
        Self {
            trace: RawTrace {
                trace_id: trace_id.to_string(),
                ..RawTrace::default()
            },
            start: base_time(),
        }
    }

    pub fn starting_at(mut self, start: DateTime<Utc>) -> Self {
        self.start = start;
        self
    }

    pub fn span(
        self,
        span_id: &str,
        parent: Option<&str>,
        service: &str,
        operation: &str,
        offset_ms: i64,
        duration_ms: i64,
    ) -> Self {
        self.push(span_id, parent, service, operation, offset_ms, duration_ms, false)
    }

    pub fn error_span(
        self,
        span_id: &str,
        parent: Option<&str>,
        service: &str,
        operation: &str,
        offset_ms: i64,
        duration_ms: i64,
    ) -> Self {
        self.push(span_id, parent, service, operation, offset_ms, duration_ms, true)
    }

    #[allow(clippy::too_many_arguments)]
    fn push(
        mut self,
        span_id: &str,
        parent: Option<&str>,
        service: &str,
        operation: &str,
        offset_ms: i64,
        duration_ms: i64,
        error: bool,
    ) -> Self {
        let process_id = self.process_for(service);
        let start_us = (self.start + Duration::milliseconds(offset_ms)).timestamp_micros();
        let mut tags = vec![RawKeyValue {
            key: "span.kind".to_string(),
            value_type: Some("string".to_string()),
            value: json!("server"),
        }];
        if error {
            tags.push(RawKeyValue {
                key: "error".to_string(),
                value_type: Some("bool".to_string()),
                value: json!(true),
            });
        }
        self.trace.spans.push(RawSpan {
            trace_id: self.trace.trace_id.clone(),
            span_id: span_id.to_string(),
            operation_name: operation.to_string(),
            references: parent
                .map(|p| {
                    vec![RawReference {
                        ref_type: "CHILD_OF".to_string(),
                        trace_id: self.trace.trace_id.clone(),
                        span_id: p.to_string(),
                    }]
                })
                .unwrap_or_default(),
            start_time: Some(json!(start_us)),
            duration: Some(json!(duration_ms * 1000)),
            tags,
            process_id: Some(process_id),
            ..RawSpan::default()
        });
        self
    }

    fn process_for(&mut self, service: &str) -> String {
        if let Some((id, _)) = self
            .trace
            .processes
            .iter()
            .find(|(_, p)| p.service_name == service)
        {
            return id.clone();
        }
        let id = format!("p{}", self.trace.processes.len() + 1);
        self.trace.processes.insert(
            id.clone(),
            RawProcess {
                service_name: service.to_string(),
                tags: Vec::new(),
            },
        );
        id
    }

    pub fn build(self) -> RawTrace {
        self.trace
    }
}

/// frontend calls cart and payment; payment writes to db. The charge span fails when
/// `failing` is set.
pub fn checkout_trace(trace_id: &str, start: DateTime<Utc>, failing: bool) -> RawTrace {
    let builder = RawTraceBuilder::new(trace_id)
        .starting_at(start)
        .span("root", None, "frontend", "GET /checkout", 0, 300)
        .span("cart", Some("root"), "cart", "load cart", 20, 60);
    let builder = if failing {
        builder.error_span("charge", Some("root"), "payment", "charge", 100, 190)
    } else {
        builder.span("charge", Some("root"), "payment", "charge", 100, 190)
    };
    builder
        .span("insert", Some("charge"), "db", "INSERT payments", 120, 80)
        .build()
}

pub fn normalized(raw: &RawTrace) -> Trace {
    let spans = spanscope_jaeger::normalize_trace(raw).unwrap();
    spanscope_analysis::assemble(raw.trace_id.clone(), spans)
}

/// In-memory trace backend. Searches apply the same filters the Jaeger query service does.
#[derive(Default)]
pub struct StaticSource {
    traces: Vec<RawTrace>,
    operations: HashMap<String, Vec<String>>,
    failure: Option<String>,
    searches: Mutex<Vec<TraceSearchParams>>,
}

impl StaticSource {
    pub fn new(traces: Vec<RawTrace>) -> Self {
        Self {
            traces,
            ..Self::default()
        }
    }

    /// Operations listed for `service` in addition to those observed in spans.
    pub fn with_operations(mut self, service: &str, operations: &[&str]) -> Self {
        self.operations.insert(
            service.to_string(),
            operations.iter().map(|s| s.to_string()).collect(),
        );
        self
    }

    /// Every call fails with an upstream error.
    pub fn failing(mut self, message: &str) -> Self {
        self.failure = Some(message.to_string());
        self
    }

    pub fn searches(&self) -> Vec<TraceSearchParams> {
        self.searches.lock().unwrap().clone()
    }

    fn check(&self) -> Result<()> {
        match &self.failure {
            Some(msg) => Err(SpanscopeError::Upstream(msg.clone())),
            None => Ok(()),
        }
    }
}

fn service_of<'a>(trace: &'a RawTrace, span: &RawSpan) -> &'a str {
    span.process_id
        .as_deref()
        .and_then(|pid| trace.processes.get(pid))
        .map(|p| p.service_name.as_str())
        .unwrap_or("")
}

fn micros(value: &Option<serde_json::Value>) -> i64 {
    value.as_ref().and_then(|v| v.as_i64()).unwrap_or(0)
}

fn span_matches(trace: &RawTrace, span: &RawSpan, params: &TraceSearchParams) -> bool {
    if let Some(service) = &params.service
        && service_of(trace, span) != service
    {
        return false;
    }
    if let Some(op) = &params.operation
        && &span.operation_name != op
    {
        return false;
    }
    let duration = micros(&span.duration);
    if params.min_duration_us.is_some_and(|min| duration < min) {
        return false;
    }
    if params.max_duration_us.is_some_and(|max| duration > max) {
        return false;
    }
    params.tags.iter().all(|filter| {
        span.tags.iter().any(|kv| {
            kv.key == filter.key && TagValue::from_json(kv.value.clone()).to_string() == filter.value
        })
    })
}

fn trace_start(trace: &RawTrace) -> Option<DateTime<Utc>> {
    trace
        .spans
        .iter()
        .map(|s| micros(&s.start_time))
        .min()
        .and_then(|us| Utc.timestamp_micros(us).single())
}

#[async_trait]
impl TraceSource for StaticSource {
    async fn search_traces(&self, params: &TraceSearchParams) -> Result<Vec<RawTrace>> {
        self.searches.lock().unwrap().push(params.clone());
        self.check()?;
        let mut hits: Vec<&RawTrace> = self
            .traces
            .iter()
            .filter(|t| t.spans.iter().any(|s| span_matches(t, s, params)))
            .filter(|t| trace_start(t).is_some_and(|start| params.window.contains(start)))
            .collect();
        hits.sort_by_key(|t| std::cmp::Reverse(trace_start(t)));
        hits.truncate(params.limit);
        Ok(hits.into_iter().cloned().collect())
    }

    async fn get_trace(&self, trace_id: &str) -> Result<Option<RawTrace>> {
        self.check()?;
        Ok(self
            .traces
            .iter()
            .find(|t| t.trace_id.eq_ignore_ascii_case(trace_id))
            .cloned())
    }

    async fn list_services(&self) -> Result<Vec<String>> {
        self.check()?;
        let services: BTreeSet<String> = self
            .traces
            .iter()
            .flat_map(|t| t.processes.values().map(|p| p.service_name.clone()))
            .collect();
        Ok(services.into_iter().collect())
    }

    async fn list_operations(&self, service: &str) -> Result<Vec<String>> {
        self.check()?;
        let mut ops: BTreeSet<String> = self
            .operations
            .get(service)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .collect();
        for trace in &self.traces {
            for span in &trace.spans {
                if service_of(trace, span) == service {
                    ops.insert(span.operation_name.clone());
                }
            }
        }
        Ok(ops.into_iter().collect())
    }

    fn describe(&self) -> String {
        format!("static ({} traces)", self.traces.len())
    }
}
