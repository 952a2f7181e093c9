use spanscope_core::model::insights::SpanStatistics;
use spanscope_core::model::span::Span;
use spanscope_core::model::trace::Trace;

/// Rounds to two decimals, ties to even.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round_ties_even() / 100.0
}

/// `part / whole * 100` rounded to two decimals; zero when `whole` is zero.
pub fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    round2(part as f64 / whole as f64 * 100.0)
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Nearest-rank percentile: the smallest value with at least `pct` of the samples at or
/// below it.
pub fn percentile(sorted: &[f64], pct: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (pct.clamp(0.0, 1.0) * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

/// Count, arithmetic mean, max, error count and percentiles over `spans`, recomputed from
/// scratch on every call.
pub fn span_statistics<'a>(spans: impl IntoIterator<Item = &'a Span>) -> SpanStatistics {
    let mut durations = Vec::new();
    let mut error_count = 0;
    for span in spans {
        durations.push(span.duration_ms());
        if span.has_error() {
            error_count += 1;
        }
    }
    if durations.is_empty() {
        return SpanStatistics::default();
    }

    let average_duration = mean(&durations);
    durations.sort_by(f64::total_cmp);
    SpanStatistics {
        count: durations.len(),
        average_duration,
        max_duration: durations[durations.len() - 1],
        error_count,
        p50_duration: percentile(&durations, 0.50),
        p95_duration: percentile(&durations, 0.95),
        p99_duration: percentile(&durations, 0.99),
    }
}

/// Statistics for the spans of `service`, narrowed to `operation` when given.
pub fn operation_statistics(
    traces: &[Trace],
    service: &str,
    operation: Option<&str>,
) -> SpanStatistics {
    span_statistics(
        traces
            .iter()
            .flat_map(|t| t.spans.iter())
            .filter(|s| s.service_name == service)
            .filter(|s| operation.is_none_or(|op| s.operation_name == op)),
    )
}
