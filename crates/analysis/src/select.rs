use spanscope_core::model::span::Span;
use spanscope_core::model::trace::Trace;

/// Erroring traces, most recent first, never padded with clean ones.
pub fn error_traces(traces: &[Trace], limit: usize) -> Vec<Trace> {
    let mut out: Vec<Trace> = traces.iter().filter(|t| t.has_error).cloned().collect();
    out.sort_by(|a, b| b.start_time.cmp(&a.start_time));
    out.truncate(limit);
    out
}

/// The longest spans across all traces.
pub fn slowest_spans(traces: &[Trace], limit: usize) -> Vec<Span> {
    let mut spans: Vec<Span> = traces.iter().flat_map(|t| t.spans.iter().cloned()).collect();
    spans.sort_by(|a, b| b.duration().cmp(&a.duration()));
    spans.truncate(limit);
    spans
}

pub fn most_recent(traces: &[Trace], limit: usize) -> Vec<Trace> {
    let mut out = traces.to_vec();
    out.sort_by(|a, b| b.start_time.cmp(&a.start_time));
    out.truncate(limit);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{clean, span, t1, trace};

    #[test]
    fn error_traces_never_pad() {
        let mut traces: Vec<Trace> = (0..10).map(|i| clean(&format!("c{i}"), i * 10)).collect();
        for i in 0..3 {
            traces.push(trace(
                &format!("e{i}"),
                vec![span("a", None, "web", "GET", 1_000 + i * 10, 5, true)],
            ));
        }

        let errors = error_traces(&traces, 5);
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().all(|t| t.has_error));
        assert_eq!(errors[0].trace_id, "e2");

        assert_eq!(error_traces(&traces, 2).len(), 2);
    }

    #[test]
    fn slowest_spans_sorted_descending() {
        let spans = slowest_spans(&[t1(), clean("t2", 0)], 3);
        let durations: Vec<f64> = spans.iter().map(|s| s.duration_ms()).collect();
        assert_eq!(durations, vec![100.0, 50.0, 40.0]);
    }

    #[test]
    fn most_recent_orders_by_start() {
        let recent = most_recent(&[clean("old", 0), clean("new", 500), clean("mid", 100)], 2);
        let ids: Vec<_> = recent.iter().map(|t| t.trace_id.as_str()).collect();
        assert_eq!(ids, vec!["new", "mid"]);
    }
}
