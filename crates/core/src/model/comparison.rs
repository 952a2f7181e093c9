use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::trace::Trace;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TraceComparisonRequest {
    pub trace_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TraceComparison {
    pub traces: Vec<Trace>,
    pub common_services: Vec<String>,
    /// `service:operation` pairs present in every trace.
    pub common_operations: Vec<String>,
    pub service_comparison: Vec<ServiceComparisonItem>,
    pub operation_comparison: Vec<OperationComparisonItem>,
    pub duration_comparison: TraceDurationComparison,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceComparisonItem {
    pub service_name: String,
    /// One entry per compared trace, in request order.
    pub trace_durations: Vec<ServiceTraceDuration>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceTraceDuration {
    pub trace_id: String,
    pub total_duration: f64,
    pub span_count: usize,
    pub has_error: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OperationComparisonItem {
    pub service_name: String,
    pub operation_name: String,
    pub trace_durations: Vec<OperationTraceDuration>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OperationTraceDuration {
    pub trace_id: String,
    pub average_duration: f64,
    pub max_duration: f64,
    pub span_count: usize,
    pub has_error: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TraceDurationComparison {
    pub trace_durations: Vec<TraceDurationItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TraceDurationItem {
    pub trace_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration: f64,
    pub span_count: usize,
    pub service_count: usize,
    pub has_error: bool,
}
