use std::collections::HashMap;

use chrono::SecondsFormat;
use owo_colors::OwoColorize;
use spanscope_core::model::comparison::TraceComparison;
use spanscope_core::model::dashboard::DashboardSummary;
use spanscope_core::model::insights::ServiceInsights;
use spanscope_core::model::notification::{Notification, NotificationEvent, NotificationList};
use spanscope_core::model::service_map::ServiceMapView;
use spanscope_core::model::span::Span;
use spanscope_core::model::trace::{Trace, TraceSummary};
use spanscope_core::query::StatusResponse;

fn status_label(has_error: bool) -> String {
    if has_error {
        "ERROR".red().to_string()
    } else {
        "OK".green().to_string()
    }
}

pub fn print_trace_human(trace: &Trace) {
    let errors = trace.spans.iter().filter(|s| s.has_error()).count();
    println!(
        "TRACE {} root={} duration={:.3}ms spans={} services={} errors={}",
        trace.trace_id,
        trace.root_service.cyan(),
        trace.duration_ms(),
        trace.spans.len(),
        trace.service_count(),
        errors
    );
    print_span_tree(&trace.spans);
}

pub fn print_traces_human(traces: &[Trace]) {
    for summary in traces.iter().map(TraceSummary::from) {
        println!(
            "{} trace={} root={} duration={:.3}ms spans={} services={} {}",
            summary.start_time.to_rfc3339_opts(SecondsFormat::Millis, true),
            summary.trace_id,
            summary.root_service.cyan(),
            summary.duration,
            summary.span_count,
            summary.service_count,
            status_label(summary.has_error)
        );
    }
    println!("-- {} traces --", traces.len());
}

pub fn print_spans_human(spans: &[Span]) {
    for span in spans {
        println!(
            "{:>10.3}ms {} {} trace={} span={} {}",
            span.duration_ms(),
            span.service_name.cyan(),
            span.operation_name,
            span.trace_id,
            span.span_id,
            status_label(span.has_error())
        );
    }
    println!("-- {} spans --", spans.len());
}

pub fn print_service_map_human(view: &ServiceMapView) {
    let stats = &view.statistics;
    println!(
        "services={} connections={} operations={} traces={}",
        stats.service_count, stats.connection_count, stats.operation_count, stats.trace_count
    );
    for node in &view.service_map.nodes {
        println!(
            "node {} calls={} avg={:.2}ms errors={}",
            node.service_name.cyan(),
            node.call_count,
            node.avg_duration,
            node.error_count
        );
    }
    for edge in &view.service_map.edges {
        println!(
            "edge {} -> {} calls={} avg={:.2}ms errors={} ops=[{}]",
            edge.source,
            edge.target,
            edge.call_count,
            edge.avg_duration,
            edge.error_count,
            edge.operations.join(", ")
        );
    }
    if !stats.highest_error_rate_services.is_empty() {
        println!("highest error rate:");
        for svc in &stats.highest_error_rate_services {
            println!(
                "  {} {:.2}% ({}/{})",
                svc.service_name, svc.error_rate, svc.error_count, svc.call_count
            );
        }
    }
}

pub fn print_comparison_human(cmp: &TraceComparison) {
    for item in &cmp.duration_comparison.trace_durations {
        println!(
            "trace={} duration={:.3}ms spans={} services={} {}",
            item.trace_id,
            item.duration,
            item.span_count,
            item.service_count,
            status_label(item.has_error)
        );
    }
    println!("common services: {}", cmp.common_services.join(", "));
    println!("common operations: {}", cmp.common_operations.len());
    for svc in &cmp.service_comparison {
        let cells: Vec<String> = svc
            .trace_durations
            .iter()
            .map(|d| format!("{:.3}ms", d.total_duration))
            .collect();
        println!("  {} {}", svc.service_name.cyan(), cells.join(" | "));
    }
}

pub fn print_insights_human(insights: &ServiceInsights) {
    println!(
        "SERVICE {} traces={} errors={} ({:.2}%) avg_span={:.3}ms operations={}",
        insights.service_name.cyan(),
        insights.trace_count,
        insights.error_count,
        insights.error_percentage,
        insights.average_span_duration,
        insights.operation_count
    );
    for op in &insights.operation_stats {
        println!(
            "  {} count={} avg={:.3}ms p95={:.3}ms max={:.3}ms errors={}",
            op.operation_name,
            op.stats.count,
            op.stats.average_duration,
            op.stats.p95_duration,
            op.stats.max_duration,
            op.stats.error_count
        );
    }
    if !insights.recent_traces.is_empty() {
        println!("recent:");
        print_traces_human(&insights.recent_traces);
    }
}

pub fn print_dashboard_human(summary: &DashboardSummary) {
    println!(
        "services={} traces_24h={} errors={} ({:.2}%) avg_trace={:.3}ms",
        summary.service_count,
        summary.traces_last24_hours,
        summary.error_count,
        summary.error_percentage,
        summary.average_trace_duration
    );
    println!("top services: {}", summary.top_services.join(", "));
    if !summary.top_error_traces.is_empty() {
        println!("recent errors:");
        print_traces_human(&summary.top_error_traces);
    }
    if !summary.top_slow_spans.is_empty() {
        println!("slowest spans:");
        print_spans_human(&summary.top_slow_spans);
    }
}

pub fn print_notification_human(n: &Notification) {
    let marker = if n.is_read { " " } else { "*" };
    let kind = match n.kind.as_str() {
        "error" => n.kind.as_str().red().to_string(),
        "warning" | "performance" => n.kind.as_str().yellow().to_string(),
        other => other.blue().to_string(),
    };
    println!(
        "{marker} {} {} {} | {}{}",
        n.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
        kind,
        n.title,
        n.message,
        n.service_name
            .as_deref()
            .map(|s| format!(" service={s}"))
            .unwrap_or_default()
    );
}

pub fn print_notifications_human(list: &NotificationList) {
    for n in &list.notifications {
        print_notification_human(n);
    }
    println!(
        "-- {} notifications ({} unread) --",
        list.notifications.len(),
        list.unread_count
    );
}

pub fn print_notification_event_human(event: &NotificationEvent) {
    match event {
        NotificationEvent::Created { notification } => print_notification_human(notification),
        NotificationEvent::Read { id } => println!("read {id}"),
        NotificationEvent::AllRead { count } => println!("marked {count} read"),
        NotificationEvent::Deleted { id } => println!("deleted {id}"),
    }
}

pub fn print_status_human(status: &StatusResponse) {
    println!("version={}", status.health.version);
    println!(
        "upstream={} reachable={}",
        status.health.upstream, status.health.upstream_reachable
    );
    match &status.store {
        Some(store) => {
            println!("db_path={}", store.db_path);
            println!("db_size_bytes={}", store.db_size_bytes);
            println!(
                "notifications={} unread={}",
                store.notification_count, store.unread_count
            );
            if let Some(newest) = store.newest {
                println!(
                    "newest={}",
                    newest.to_rfc3339_opts(SecondsFormat::Millis, true)
                );
            }
        }
        None => println!("notifications=disabled"),
    }
}

fn print_span_tree(spans: &[Span]) {
    let known: std::collections::HashSet<&str> =
        spans.iter().map(|s| s.span_id.as_str()).collect();
    let mut children: HashMap<Option<&str>, Vec<&Span>> = HashMap::new();
    for span in spans {
        let parent = span
            .parent_span_id
            .as_deref()
            .filter(|p| known.contains(p));
        children.entry(parent).or_default().push(span);
    }
    if let Some(roots) = children.get(&None) {
        for root in roots {
            print_node(root, &children, 0, spans.len());
        }
    }
}

/// `max_depth` stops runaway recursion when span ids repeat within a trace.
fn print_node(
    span: &Span,
    children: &HashMap<Option<&str>, Vec<&Span>>,
    depth: usize,
    max_depth: usize,
) {
    if depth > max_depth {
        return;
    }
    let indent = "  ".repeat(depth);
    println!(
        "{}{} {} ({:.3}ms) {}",
        indent,
        span.service_name.cyan(),
        span.operation_name,
        span.duration_ms(),
        status_label(span.has_error())
    );

    if let Some(kids) = children.get(&Some(span.span_id.as_str())) {
        for child in kids {
            print_node(child, children, depth + 1, max_depth);
        }
    }
}
