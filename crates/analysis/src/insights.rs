use spanscope_core::model::insights::{OperationStatistics, ServiceInsights};
use spanscope_core::model::trace::Trace;

use crate::select::most_recent;
use crate::stats::{mean, operation_statistics, percentage};

/// Rolls up one service's behaviour over `traces`.
///
/// `operations` is the upstream operation listing; every listed operation gets a row even when
/// no span used it, and operations seen in spans but missing from the listing are appended.
/// Rows are ordered by mean duration, slowest first.
pub fn service_insights(
    service: &str,
    operations: &[String],
    traces: &[Trace],
    max_traces: usize,
) -> ServiceInsights {
    let mut names: Vec<String> = Vec::new();
    let observed = traces
        .iter()
        .flat_map(|t| t.spans_of(service))
        .map(|s| &s.operation_name);
    for name in operations.iter().chain(observed) {
        if !names.contains(name) {
            names.push(name.clone());
        }
    }

    let mut operation_stats: Vec<OperationStatistics> = names
        .into_iter()
        .map(|name| OperationStatistics {
            stats: operation_statistics(traces, service, Some(&name)),
            operation_name: name,
        })
        .collect();
    operation_stats.sort_by(|a, b| {
        b.stats
            .average_duration
            .total_cmp(&a.stats.average_duration)
    });

    let span_durations: Vec<f64> = traces
        .iter()
        .flat_map(|t| t.spans_of(service))
        .map(|s| s.duration_ms())
        .collect();
    let error_count = traces.iter().filter(|t| t.has_error).count();

    ServiceInsights {
        service_name: service.to_string(),
        operation_count: operation_stats.len(),
        trace_count: traces.len(),
        error_count,
        error_percentage: percentage(error_count, traces.len()),
        average_span_duration: mean(&span_durations),
        operation_stats,
        recent_traces: most_recent(traces, max_traces),
    }
}
