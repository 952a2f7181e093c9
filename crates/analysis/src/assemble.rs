use std::collections::HashSet;

use chrono::{DateTime, Utc};
use spanscope_core::model::span::Span;
use spanscope_core::model::trace::Trace;

/// Builds a [`Trace`] from its normalized spans.
///
/// Span order is kept as given. A trace without spans is returned as a degenerate value with
/// epoch start/end, an empty root service and no error.
pub fn assemble(trace_id: impl Into<String>, spans: Vec<Span>) -> Trace {
    let trace_id = trace_id.into();

    let start_time = spans
        .iter()
        .map(|s| s.start_time)
        .min()
        .unwrap_or_else(DateTime::<Utc>::default);
    let end_time = spans
        .iter()
        .map(|s| s.end_time)
        .max()
        .unwrap_or_else(DateTime::<Utc>::default);
    let root_service = root_service(&spans);
    let has_error = spans.iter().any(Span::has_error);

    Trace {
        trace_id,
        spans,
        start_time,
        end_time,
        root_service,
        has_error,
    }
}

/// The service of the first parentless span in input order. When every span names a parent,
/// the first span whose parent is missing from the trace stands in as the root.
fn root_service(spans: &[Span]) -> String {
    if let Some(root) = spans.iter().find(|s| s.is_root()) {
        return root.service_name.clone();
    }

    let ids: HashSet<&str> = spans.iter().map(|s| s.span_id.as_str()).collect();
    spans
        .iter()
        .find(|s| {
            s.parent_span_id
                .as_deref()
                .is_some_and(|parent| !ids.contains(parent))
        })
        .map(|s| s.service_name.clone())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{base_time, span, t1, trace};

    #[test]
    fn derives_bounds_root_and_error() {
        let t = t1();
        assert_eq!(t.duration_ms(), 100.0);
        assert_eq!(t.root_service, "web");
        assert!(t.has_error);
        assert_eq!(t.start_time, base_time());
    }

    #[test]
    fn bounds_ignore_span_order() {
        let t = trace(
            "t",
            vec![
                span("late", Some("root"), "db", "query", 90, 30, false),
                span("root", None, "api", "GET", 0, 100, false),
            ],
        );
        assert_eq!(t.start_time, base_time());
        assert_eq!(t.duration_ms(), 120.0);
        assert_eq!(t.root_service, "api");
        assert!(!t.has_error);
    }

    #[test]
    fn empty_trace_is_degenerate_not_error() {
        let t = assemble("empty", Vec::new());
        assert!(t.spans.is_empty());
        assert_eq!(t.start_time, DateTime::<Utc>::default());
        assert_eq!(t.duration_ms(), 0.0);
        assert_eq!(t.root_service, "");
        assert!(!t.has_error);
    }

    #[test]
    fn first_of_multiple_roots_wins() {
        let t = trace(
            "t",
            vec![
                span("x", Some("a"), "worker", "job", 5, 5, false),
                span("a", None, "scheduler", "tick", 0, 10, false),
                span("b", None, "web", "GET", 1, 10, false),
            ],
        );
        assert_eq!(t.root_service, "scheduler");
    }

    #[test]
    fn dangling_parent_stands_in_for_missing_root() {
        let t = trace(
            "t",
            vec![
                span("b", Some("c"), "auth", "check", 2, 1, false),
                span("c", Some("gone"), "billing", "charge", 1, 5, false),
            ],
        );
        assert_eq!(t.root_service, "billing");

        let cyclic = trace(
            "t",
            vec![
                span("a", Some("b"), "x", "op", 0, 1, false),
                span("b", Some("a"), "y", "op", 0, 1, false),
            ],
        );
        assert_eq!(cyclic.root_service, "");
    }
}
