use serde::{Deserialize, Serialize};

use crate::model::span::Span;
use crate::model::trace::Trace;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub service_count: usize,
    pub traces_last24_hours: usize,
    pub error_count: usize,
    pub error_percentage: f64,
    pub average_trace_duration: f64,
    pub top_services: Vec<String>,
    pub top_error_traces: Vec<Trace>,
    pub top_slow_spans: Vec<Span>,
}
