use std::collections::HashSet;

use spanscope_core::error::{Result, SpanscopeError};
use spanscope_core::model::comparison::{
    OperationComparisonItem, OperationTraceDuration, ServiceComparisonItem, ServiceTraceDuration,
    TraceComparison, TraceDurationComparison, TraceDurationItem,
};
use spanscope_core::model::span::Span;
use spanscope_core::model::trace::Trace;

use crate::stats::mean;

pub const MIN_COMPARED_TRACES: usize = 2;

/// Compares two or more traces side by side. Every per-trace column has one entry per input
/// trace, in input order, zero-filled where a trace lacks the service or operation.
pub fn compare_traces(traces: Vec<Trace>) -> Result<TraceComparison> {
    if traces.len() < MIN_COMPARED_TRACES {
        return Err(SpanscopeError::Validation(format!(
            "at least {MIN_COMPARED_TRACES} traces are required for comparison, got {}",
            traces.len()
        )));
    }

    Ok(TraceComparison {
        common_services: common_services(&traces),
        common_operations: common_operations(&traces),
        service_comparison: compare_services(&traces),
        operation_comparison: compare_operations(&traces),
        duration_comparison: compare_durations(&traces),
        traces,
    })
}

/// Services present in every trace, in first-trace order.
pub fn common_services(traces: &[Trace]) -> Vec<String> {
    intersect(traces, |t| {
        t.services().into_iter().map(str::to_string).collect()
    })
}

/// `service:operation` pairs present in every trace, in first-trace order.
pub fn common_operations(traces: &[Trace]) -> Vec<String> {
    intersect(traces, |t| {
        distinct_operations(std::slice::from_ref(t))
            .into_iter()
            .map(|(svc, op)| operation_key(&svc, &op))
            .collect()
    })
}

fn intersect(traces: &[Trace], key_set: impl Fn(&Trace) -> Vec<String>) -> Vec<String> {
    let Some((first, rest)) = traces.split_first() else {
        return Vec::new();
    };
    let others: Vec<HashSet<String>> = rest
        .iter()
        .map(|t| key_set(t).into_iter().collect())
        .collect();
    key_set(first)
        .into_iter()
        .filter(|key| others.iter().all(|set| set.contains(key)))
        .collect()
}

fn operation_key(service: &str, operation: &str) -> String {
    format!("{service}:{operation}")
}

/// Distinct `(service, operation)` pairs across `traces`, in first-seen order.
fn distinct_operations(traces: &[Trace]) -> Vec<(String, String)> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for span in traces.iter().flat_map(|t| t.spans.iter()) {
        let key = (span.service_name.clone(), span.operation_name.clone());
        if seen.insert(key.clone()) {
            out.push(key);
        }
    }
    out
}

fn distinct_services(traces: &[Trace]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for trace in traces {
        for service in trace.services() {
            if !out.iter().any(|s| s == service) {
                out.push(service.to_string());
            }
        }
    }
    out
}

pub fn compare_services(traces: &[Trace]) -> Vec<ServiceComparisonItem> {
    distinct_services(traces)
        .into_iter()
        .map(|service| {
            let trace_durations = traces
                .iter()
                .map(|trace| {
                    let spans: Vec<&Span> = trace.spans_of(&service).collect();
                    ServiceTraceDuration {
                        trace_id: trace.trace_id.clone(),
                        total_duration: spans.iter().map(|s| s.duration_ms()).sum(),
                        span_count: spans.len(),
                        has_error: spans.iter().any(|s| s.has_error()),
                    }
                })
                .collect();
            ServiceComparisonItem {
                service_name: service,
                trace_durations,
            }
        })
        .collect()
}

pub fn compare_operations(traces: &[Trace]) -> Vec<OperationComparisonItem> {
    distinct_operations(traces)
        .into_iter()
        .map(|(service, operation)| {
            let trace_durations = traces
                .iter()
                .map(|trace| {
                    let spans: Vec<&Span> = trace
                        .spans
                        .iter()
                        .filter(|s| s.service_name == service && s.operation_name == operation)
                        .collect();
                    let durations: Vec<f64> = spans.iter().map(|s| s.duration_ms()).collect();
                    OperationTraceDuration {
                        trace_id: trace.trace_id.clone(),
                        average_duration: mean(&durations),
                        max_duration: durations.iter().copied().fold(0.0, f64::max),
                        span_count: spans.len(),
                        has_error: spans.iter().any(|s| s.has_error()),
                    }
                })
                .collect();
            OperationComparisonItem {
                service_name: service,
                operation_name: operation,
                trace_durations,
            }
        })
        .collect()
}

pub fn compare_durations(traces: &[Trace]) -> TraceDurationComparison {
    TraceDurationComparison {
        trace_durations: traces
            .iter()
            .map(|t| TraceDurationItem {
                trace_id: t.trace_id.clone(),
                start_time: t.start_time,
                end_time: t.end_time,
                duration: t.duration_ms(),
                span_count: t.spans.len(),
                service_count: t.service_count(),
                has_error: t.has_error,
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{clean, span, t1, trace};

    #[test]
    fn rejects_fewer_than_two_traces() {
        assert!(matches!(
            compare_traces(vec![t1()]),
            Err(SpanscopeError::Validation(_))
        ));
        assert!(compare_traces(Vec::new()).is_err());
    }

    #[test]
    fn missing_service_is_zero_filled() {
        let other = trace("t2", vec![span("a", None, "web", "GET /", 0, 60, false)]);
        let cmp = compare_traces(vec![t1(), other]).unwrap();

        let auth = cmp
            .service_comparison
            .iter()
            .find(|row| row.service_name == "auth")
            .unwrap();
        assert_eq!(
            auth.trace_durations,
            vec![
                ServiceTraceDuration {
                    trace_id: "t1".into(),
                    total_duration: 40.0,
                    span_count: 1,
                    has_error: true,
                },
                ServiceTraceDuration {
                    trace_id: "t2".into(),
                    total_duration: 0.0,
                    span_count: 0,
                    has_error: false,
                },
            ]
        );
    }

    #[test]
    fn every_row_has_one_entry_per_trace() {
        let traces = vec![t1(), clean("t2", 0), clean("t3", 10)];
        let cmp = compare_traces(traces).unwrap();
        assert!(cmp.service_comparison.iter().all(|r| r.trace_durations.len() == 3));
        assert!(cmp.operation_comparison.iter().all(|r| r.trace_durations.len() == 3));
        let ids: Vec<_> = cmp
            .duration_comparison
            .trace_durations
            .iter()
            .map(|d| d.trace_id.as_str())
            .collect();
        assert_eq!(ids, vec!["t1", "t2", "t3"]);
    }

    #[test]
    fn intersections_shrink_with_new_traces() {
        let two = vec![clean("t2", 0), clean("t3", 10)];
        assert_eq!(common_services(&two), vec!["web", "cart"]);
        assert_eq!(common_operations(&two), vec!["web:GET /cart", "cart:load"]);

        let three = vec![clean("t2", 0), clean("t3", 10), t1()];
        assert_eq!(common_services(&three), vec!["web"]);
        assert!(common_operations(&three).is_empty());
    }

    #[test]
    fn sums_services_but_averages_operations() {
        let t = trace(
            "t",
            vec![
                span("a", None, "db", "query", 0, 10, false),
                span("b", None, "db", "query", 0, 30, false),
                span("c", None, "db", "commit", 0, 5, true),
            ],
        );
        let traces = vec![t, clean("t2", 0)];
        let services = compare_services(&traces);
        assert_eq!(services[0].trace_durations[0].total_duration, 45.0);
        assert!(services[0].trace_durations[0].has_error);

        let ops = compare_operations(&traces);
        let query = &ops[0];
        assert_eq!(query.operation_name, "query");
        assert_eq!(query.trace_durations[0].average_duration, 20.0);
        assert_eq!(query.trace_durations[0].max_duration, 30.0);
        assert_eq!(query.trace_durations[1].span_count, 0);
    }
}
