use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use spanscope_core::model::trace::Trace;
use spanscope_core::time::duration_ms;

use super::TIMESTAMP_FORMAT;

const MIN_BAR_WIDTH_PCT: f64 = 0.5;
const ROW_HEIGHT_PX: usize = 25;

const STYLE: &str = "\
    body { font-family: Arial, sans-serif; margin: 20px; }
    h1, h2 { color: #333; }
    .container { max-width: 1200px; margin: 0 auto; }
    .header { text-align: center; margin-bottom: 30px; }
    .summary { border: 1px solid #ddd; padding: 15px; margin-bottom: 20px; }
    .has-error { border-left: 4px solid #f44336; }
    .ok { color: green; }
    .failed { color: red; }
    .gantt { overflow-x: auto; margin: 20px 0; }
    .gantt-container { position: relative; width: 100%; }
    .gantt-bar { position: absolute; height: 20px; background-color: #3f51b5; border-radius: 3px; color: white; line-height: 20px; padding: 0 4px; white-space: nowrap; overflow: hidden; text-overflow: ellipsis; }
    .gantt-bar-error { background-color: #f44336; }
    .table { width: 100%; border-collapse: collapse; }
    .table th, .table td { border: 1px solid #ddd; padding: 8px; text-align: left; }
    .table th { background-color: #f5f5f5; }
    .footer { margin-top: 30px; text-align: center; font-size: 12px; color: #777; }
";

/// Self-contained HTML page: summary, timing chart and span table.
pub fn trace_report(trace: &Trace, generated_at: DateTime<Utc>) -> String {
    let mut out = String::with_capacity(4096 + trace.spans.len() * 512);
    let title = format!("Trace {}", escape_html(&trace.trace_id));

    out.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n  <meta charset=\"UTF-8\">\n");
    let _ = writeln!(out, "  <title>{title}</title>");
    let _ = writeln!(out, "  <style>\n{STYLE}  </style>\n</head>\n<body>");
    out.push_str("  <div class=\"container\">\n");
    let _ = writeln!(
        out,
        "    <div class=\"header\">\n      <h1>{title}</h1>\n    </div>"
    );

    write_summary(&mut out, trace);
    write_timeline(&mut out, trace);
    write_span_table(&mut out, trace);

    let _ = writeln!(
        out,
        "    <div class=\"footer\">\n      <p>Generated {}</p>\n    </div>",
        generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    out.push_str("  </div>\n</body>\n</html>\n");
    out
}

fn write_summary(out: &mut String, trace: &Trace) {
    out.push_str("    <div class=\"summary\">\n      <h2>Summary</h2>\n");
    let rows = [
        ("Trace ID", escape_html(&trace.trace_id)),
        ("Root service", escape_html(&trace.root_service)),
        ("Start", trace.start_time.format(TIMESTAMP_FORMAT).to_string()),
        ("End", trace.end_time.format(TIMESTAMP_FORMAT).to_string()),
        ("Duration", format!("{:.3} ms", trace.duration_ms())),
        ("Spans", trace.spans.len().to_string()),
        ("Services", trace.service_count().to_string()),
        ("Status", status_badge(trace.has_error)),
    ];
    for (label, value) in rows {
        let _ = writeln!(out, "      <p><strong>{label}:</strong> {value}</p>");
    }
    out.push_str("    </div>\n");
}

fn write_timeline(out: &mut String, trace: &Trace) {
    let total_ms = trace.duration_ms();
    let height = trace.spans.len() * ROW_HEIGHT_PX + 20;
    out.push_str("    <h2>Timeline</h2>\n    <div class=\"gantt\">\n");
    let _ = writeln!(
        out,
        "      <div class=\"gantt-container\" style=\"height: {height}px;\">"
    );
    for (idx, span) in trace.spans.iter().enumerate() {
        let offset_ms = duration_ms(span.start_time - trace.start_time);
        let span_ms = span.duration_ms();
        let (left, width) = if total_ms > 0.0 {
            (offset_ms / total_ms * 100.0, span_ms / total_ms * 100.0)
        } else {
            (0.0, 100.0)
        };
        let width = width.max(MIN_BAR_WIDTH_PCT);
        let top = idx * ROW_HEIGHT_PX + 10;
        let class = if span.has_error() {
            "gantt-bar gantt-bar-error"
        } else {
            "gantt-bar"
        };
        let label = format!(
            "{}: {}",
            escape_html(&span.service_name),
            escape_html(&span.operation_name)
        );
        let _ = writeln!(
            out,
            "        <div class=\"{class}\" style=\"left: {left:.2}%; width: {width:.2}%; top: {top}px;\" title=\"{label} ({span_ms:.2} ms)\">{label}</div>"
        );
    }
    out.push_str("      </div>\n    </div>\n");
}

fn write_span_table(out: &mut String, trace: &Trace) {
    out.push_str("    <h2>Spans</h2>\n    <table class=\"table\">\n      <thead>\n        <tr>");
    for head in [
        "Span ID",
        "Parent span ID",
        "Service",
        "Operation",
        "Start",
        "Duration (ms)",
        "Status",
    ] {
        let _ = write!(out, "<th>{head}</th>");
    }
    out.push_str("</tr>\n      </thead>\n      <tbody>\n");
    for span in &trace.spans {
        let class = if span.has_error() { " class=\"has-error\"" } else { "" };
        let _ = writeln!(
            out,
            "        <tr{class}><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{:.3}</td><td>{}</td></tr>",
            escape_html(&span.span_id),
            escape_html(span.parent_span_id.as_deref().unwrap_or("-")),
            escape_html(&span.service_name),
            escape_html(&span.operation_name),
            span.start_time.format("%H:%M:%S%.3f"),
            span.duration_ms(),
            status_badge(span.has_error()),
        );
    }
    out.push_str("      </tbody>\n    </table>\n");
}

fn status_badge(has_error: bool) -> String {
    if has_error {
        "<span class=\"failed\">Error</span>".to_string()
    } else {
        "<span class=\"ok\">OK</span>".to_string()
    }
}

pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::assemble;
    use crate::fixtures::{span, t1, trace};

    fn generated() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn report_contains_summary_and_rows() {
        let html = trace_report(&t1(), generated());
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("<strong>Root service:</strong> web"));
        assert!(html.contains("<strong>Duration:</strong> 100.000 ms"));
        assert!(html.contains("gantt-bar gantt-bar-error"));
        assert!(html.contains("left: 10.00%; width: 40.00%"));
        assert!(html.contains("<td>POST /login</td>"));
        assert!(html.contains("Generated 2026-03-01 12:00:00 UTC"));
    }

    #[test]
    fn report_escapes_markup() {
        let t = trace(
            "t",
            vec![span("a", None, "<script>", "a&b", 0, 10, false)],
        );
        let html = trace_report(&t, generated());
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;: a&amp;b"));
    }

    #[test]
    fn empty_trace_renders() {
        let html = trace_report(&assemble("empty", Vec::new()), generated());
        assert!(html.contains("<strong>Spans:</strong> 0"));
        assert!(html.contains("</tbody>"));
    }
}
