use std::fmt::Write as _;

use spanscope_core::model::insights::ServiceInsights;
use spanscope_core::model::trace::Trace;

use super::TIMESTAMP_FORMAT;
use crate::select::most_recent;

pub const TRACE_CSV_HEADER: &str =
    "SpanId,ParentSpanId,ServiceName,OperationName,StartTime,EndTime,Duration,HasError";

pub const SERVICE_CSV_HEADER: &str =
    "OperationName,Count,AverageDuration,P95Duration,MaxDuration,ErrorCount,ErrorRate";

pub const RECENT_TRACES_CSV_HEADER: &str = "TraceId,Start Time,Duration (ms),Has Error";

/// Rows in the recent traces section of the service export.
pub const SERVICE_CSV_RECENT_TRACES: usize = 20;

/// One row per span, in trace order. Durations are milliseconds with three decimals.
pub fn trace_csv(trace: &Trace) -> String {
    let mut out = String::with_capacity(64 * (trace.spans.len() + 1));
    out.push_str(TRACE_CSV_HEADER);
    out.push('\n');
    for span in &trace.spans {
        let _ = writeln!(
            out,
            "{},{},{},{},{},{},{:.3},{}",
            escape(&span.span_id),
            escape(span.parent_span_id.as_deref().unwrap_or("null")),
            escape(&span.service_name),
            escape(&span.operation_name),
            span.start_time.format(TIMESTAMP_FORMAT),
            span.end_time.format(TIMESTAMP_FORMAT),
            span.duration_ms(),
            span.has_error(),
        );
    }
    out
}

/// Summary block, per-operation statistics, then the newest traces of the service.
pub fn service_csv(insights: &ServiceInsights, time_range_hours: u32) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Service,{}", escape(&insights.service_name));
    let _ = writeln!(out, "TimeRangeHours,{time_range_hours}");
    let _ = writeln!(out, "TraceCount,{}", insights.trace_count);
    let _ = writeln!(out, "ErrorCount,{}", insights.error_count);
    let _ = writeln!(out, "ErrorPercentage,{:.2}", insights.error_percentage);
    let _ = writeln!(
        out,
        "AverageSpanDuration,{:.3}",
        insights.average_span_duration
    );
    out.push('\n');
    out.push_str(SERVICE_CSV_HEADER);
    out.push('\n');
    for op in &insights.operation_stats {
        let stats = &op.stats;
        let error_rate = if stats.count == 0 {
            0.0
        } else {
            stats.error_count as f64 / stats.count as f64 * 100.0
        };
        let _ = writeln!(
            out,
            "{},{},{:.3},{:.3},{:.3},{},{:.2}",
            escape(&op.operation_name),
            stats.count,
            stats.average_duration,
            stats.p95_duration,
            stats.max_duration,
            stats.error_count,
            error_rate,
        );
    }

    out.push_str("\nRecent Traces\n");
    out.push_str(RECENT_TRACES_CSV_HEADER);
    out.push('\n');
    for trace in most_recent(&insights.recent_traces, SERVICE_CSV_RECENT_TRACES) {
        let _ = writeln!(
            out,
            "{},{},{:.3},{}",
            escape(&trace.trace_id),
            trace.start_time.format(TIMESTAMP_FORMAT),
            trace.duration_ms(),
            trace.has_error,
        );
    }
    out
}

/// Quotes a field containing a separator, quote or line break; inner quotes are doubled.
pub fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use spanscope_core::model::insights::{OperationStatistics, SpanStatistics};

    use super::*;
    use crate::fixtures::{clean, span, t1, trace};

    #[test]
    fn header_and_rows_are_stable() {
        let csv = trace_csv(&t1());
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], TRACE_CSV_HEADER);
        assert_eq!(
            lines[1],
            "a,null,web,GET /,2026-02-01 00:00:00.000,2026-02-01 00:00:00.100,100.000,false"
        );
        assert_eq!(
            lines[2],
            "b,a,auth,POST /login,2026-02-01 00:00:00.010,2026-02-01 00:00:00.050,40.000,true"
        );
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn escapes_awkward_fields() {
        assert_eq!(escape("plain"), "plain");
        assert_eq!(escape("a,b"), "\"a,b\"");
        assert_eq!(escape("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(escape("two\nlines"), "\"two\nlines\"");

        let t = trace(
            "t",
            vec![span("x", None, "svc", "GET /a,b", 0, 1, false)],
        );
        assert!(trace_csv(&t).contains(",\"GET /a,b\","));
    }

    #[test]
    fn service_csv_lists_operations() {
        let insights = ServiceInsights {
            service_name: "auth".into(),
            operation_count: 1,
            trace_count: 4,
            error_count: 1,
            error_percentage: 25.0,
            average_span_duration: 12.5,
            operation_stats: vec![OperationStatistics {
                operation_name: "login".into(),
                stats: SpanStatistics {
                    count: 4,
                    average_duration: 12.5,
                    max_duration: 20.0,
                    error_count: 1,
                    p50_duration: 10.0,
                    p95_duration: 20.0,
                    p99_duration: 20.0,
                },
            }],
            recent_traces: vec![t1(), clean("t2", 200)],
        };
        let csv = service_csv(&insights, 24);
        assert!(csv.starts_with("Service,auth\nTimeRangeHours,24\n"));
        assert!(csv.contains(SERVICE_CSV_HEADER));
        assert!(csv.contains("login,4,12.500,20.000,20.000,1,25.00\n\nRecent Traces\n"));
        assert!(csv.ends_with(
            "TraceId,Start Time,Duration (ms),Has Error\n\
             t2,2026-02-01 00:00:00.200,50.000,false\n\
             t1,2026-02-01 00:00:00.000,100.000,true\n"
        ));

        let many = ServiceInsights {
            recent_traces: (0..25).map(|i| clean(&format!("c{i}"), i * 10)).collect(),
            ..insights
        };
        let csv = service_csv(&many, 24);
        let rows: Vec<&str> = csv
            .lines()
            .skip_while(|l| *l != RECENT_TRACES_CSV_HEADER)
            .skip(1)
            .collect();
        assert_eq!(rows.len(), SERVICE_CSV_RECENT_TRACES);
        assert!(rows[0].starts_with("c24,"));
    }
}
