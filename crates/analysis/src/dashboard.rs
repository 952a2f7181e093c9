use std::collections::HashSet;

use spanscope_core::model::dashboard::DashboardSummary;
use spanscope_core::model::span::Span;
use spanscope_core::model::trace::Trace;

use crate::select::{error_traces, slowest_spans};
use crate::stats::{mean, percentage};

pub const TOP_N: usize = 5;

/// Independently fetched inputs for the dashboard.
#[derive(Debug, Clone, Default)]
pub struct DashboardInputs {
    pub services: Vec<String>,
    pub error_traces: Vec<Trace>,
    pub recent_traces: Vec<Trace>,
    pub slow_spans: Vec<Span>,
}

pub fn summarize(inputs: &DashboardInputs) -> DashboardSummary {
    let recent = inputs.recent_traces.len();
    let errors = inputs.error_traces.len();
    let durations: Vec<f64> = inputs.recent_traces.iter().map(Trace::duration_ms).collect();

    let mut top_slow_spans = inputs.slow_spans.clone();
    top_slow_spans.sort_by(|a, b| b.duration().cmp(&a.duration()));
    top_slow_spans.truncate(TOP_N);

    DashboardSummary {
        service_count: inputs.services.len(),
        traces_last24_hours: recent,
        error_count: errors,
        error_percentage: percentage(errors, recent),
        average_trace_duration: mean(&durations),
        top_services: top_services(&inputs.services, &inputs.recent_traces),
        top_error_traces: error_traces(&inputs.error_traces, TOP_N),
        top_slow_spans,
    }
}

/// Services ranked by how many recent traces touch them; ties keep the listing order.
fn top_services(services: &[String], recent: &[Trace]) -> Vec<String> {
    let per_trace: Vec<HashSet<&str>> = recent
        .iter()
        .map(|t| t.services().into_iter().collect())
        .collect();
    let mut ranked: Vec<(usize, &String)> = services
        .iter()
        .map(|svc| {
            let hits = per_trace.iter().filter(|set| set.contains(svc.as_str())).count();
            (hits, svc)
        })
        .collect();
    ranked.sort_by(|a, b| b.0.cmp(&a.0));
    ranked
        .into_iter()
        .take(TOP_N)
        .map(|(_, svc)| svc.clone())
        .collect()
}

/// Convenience for callers holding one trace batch: picks error traces and slow spans from it.
pub fn summarize_batch(services: Vec<String>, traces: &[Trace]) -> DashboardSummary {
    summarize(&DashboardInputs {
        services,
        error_traces: error_traces(traces, usize::MAX),
        recent_traces: traces.to_vec(),
        slow_spans: slowest_spans(traces, TOP_N),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{clean, t1};

    #[test]
    fn zero_recent_traces_yields_zeros() {
        let summary = summarize(&DashboardInputs {
            services: vec!["web".into()],
            error_traces: vec![t1()],
            ..DashboardInputs::default()
        });
        assert_eq!(summary.error_percentage, 0.0);
        assert_eq!(summary.average_trace_duration, 0.0);
        assert_eq!(summary.traces_last24_hours, 0);
        assert_eq!(summary.service_count, 1);
    }

    #[test]
    fn aggregates_percentages_and_tops() {
        let recent = vec![t1(), clean("t2", 0), clean("t3", 100)];
        let services: Vec<String> = ["auth", "billing", "cart", "web", "search", "mail"]
            .into_iter()
            .map(String::from)
            .collect();
        let summary = summarize_batch(services, &recent);

        assert_eq!(summary.error_count, 1);
        assert_eq!(summary.error_percentage, 33.33);
        assert!((summary.average_trace_duration - 200.0 / 3.0).abs() < 1e-9);
        assert_eq!(
            summary.top_services,
            vec!["web", "cart", "auth", "billing", "search"]
        );
        assert_eq!(summary.top_error_traces.len(), 1);
        assert_eq!(summary.top_slow_spans[0].duration_ms(), 100.0);
        assert!(summary.top_slow_spans.len() <= TOP_N);
    }
}
