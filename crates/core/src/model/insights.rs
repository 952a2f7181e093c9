use serde::{Deserialize, Serialize};

use crate::model::trace::Trace;

/// Aggregate over a filtered set of spans. Durations are milliseconds; an empty set is all zeros.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SpanStatistics {
    pub count: usize,
    pub average_duration: f64,
    pub max_duration: f64,
    pub error_count: usize,
    pub p50_duration: f64,
    pub p95_duration: f64,
    pub p99_duration: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OperationStatistics {
    pub operation_name: String,
    #[serde(flatten)]
    pub stats: SpanStatistics,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInsights {
    pub service_name: String,
    pub operation_count: usize,
    pub trace_count: usize,
    pub error_count: usize,
    pub error_percentage: f64,
    pub average_span_duration: f64,
    pub operation_stats: Vec<OperationStatistics>,
    pub recent_traces: Vec<Trace>,
}
