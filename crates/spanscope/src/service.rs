use std::sync::Arc;

use chrono::Duration;
use spanscope_analysis::compare::compare_traces;
use spanscope_analysis::dashboard::{DashboardInputs, summarize};
use spanscope_analysis::export::csv::SERVICE_CSV_RECENT_TRACES;
use spanscope_analysis::export::service_csv;
use spanscope_analysis::insights::service_insights;
use spanscope_analysis::select::{error_traces, slowest_spans};
use spanscope_analysis::service_map::{filter_service_map, service_map_statistics};
use spanscope_analysis::{assemble, build_service_map};
use spanscope_core::config::Config;
use spanscope_core::error::{Result, SpanscopeError};
use spanscope_core::filter::{TagFilter, TimeWindow};
use spanscope_core::ids::TraceId;
use spanscope_core::model::comparison::TraceComparison;
use spanscope_core::model::dashboard::DashboardSummary;
use spanscope_core::model::insights::ServiceInsights;
use spanscope_core::model::service_map::{ServiceMap, ServiceMapView};
use spanscope_core::model::span::{ERROR_TAG, Span};
use spanscope_core::model::trace::Trace;
use spanscope_core::query::{HealthResponse, TraceSearchParams};
use spanscope_jaeger::model::RawTrace;
use spanscope_jaeger::{TraceSource, normalize_trace};

const ERROR_LOOKBACK_DAYS: i64 = 7;
const SLOW_SPAN_MIN_DURATION_US: i64 = 1_000_000;
const DASHBOARD_FETCH_LIMIT: usize = 100;
const INSIGHTS_FETCH_LIMIT: usize = 100;

/// Fetches from the upstream source and hands normalized traces to the analysis engine.
#[derive(Clone)]
pub struct TraceService {
    source: Arc<dyn TraceSource>,
    map_window: Duration,
    map_limit: usize,
}

impl TraceService {
    pub fn new(source: Arc<dyn TraceSource>, cfg: &Config) -> Self {
        Self {
            source,
            map_window: Duration::from_std(cfg.service_map_window)
                .unwrap_or_else(|_| Duration::hours(24)),
            map_limit: cfg.service_map_limit,
        }
    }

    pub fn source(&self) -> &Arc<dyn TraceSource> {
        &self.source
    }

    pub async fn health(&self) -> HealthResponse {
        let upstream_reachable = match self.source.list_services().await {
            Ok(_) => true,
            Err(err) => {
                tracing::warn!(error = %err, "upstream health probe failed");
                false
            }
        };
        HealthResponse {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            upstream: self.source.describe(),
            upstream_reachable,
        }
    }

    pub async fn get_trace(&self, trace_id: &str) -> Result<Trace> {
        let id = TraceId::parse(trace_id)?;
        let raw = self
            .source
            .get_trace(id.as_str())
            .await?
            .ok_or_else(|| SpanscopeError::NotFound(format!("trace {id}")))?;
        let trace = to_trace(&raw)?;
        if trace.spans.is_empty() {
            return Err(SpanscopeError::NotFound(format!("trace {id}")));
        }
        Ok(trace)
    }

    pub async fn search_traces(&self, params: &TraceSearchParams) -> Result<Vec<Trace>> {
        params.validate()?;
        let raw = self.source.search_traces(params).await?;
        tracing::debug!(count = raw.len(), "upstream search returned");
        raw.iter().map(to_trace).collect()
    }

    pub async fn list_services(&self) -> Result<Vec<String>> {
        self.source.list_services().await
    }

    pub async fn list_operations(&self, service: &str) -> Result<Vec<String>> {
        self.source.list_operations(service).await
    }

    pub async fn error_traces(&self, limit: usize) -> Result<Vec<Trace>> {
        let traces = self
            .search_traces(&TraceSearchParams {
                tags: vec![TagFilter {
                    key: ERROR_TAG.to_string(),
                    value: "true".to_string(),
                }],
                window: TimeWindow::last(Duration::days(ERROR_LOOKBACK_DAYS)),
                limit,
                ..TraceSearchParams::default()
            })
            .await?;
        Ok(error_traces(&traces, limit))
    }

    pub async fn slow_spans(&self, limit: usize) -> Result<Vec<Span>> {
        let traces = self
            .search_traces(&TraceSearchParams {
                min_duration_us: Some(SLOW_SPAN_MIN_DURATION_US),
                window: TimeWindow::last(Duration::days(ERROR_LOOKBACK_DAYS)),
                limit: limit.saturating_mul(2),
                ..TraceSearchParams::default()
            })
            .await?;
        Ok(slowest_spans(&traces, limit))
    }

    pub async fn service_map(&self) -> Result<ServiceMap> {
        let traces = self.map_traces(self.map_window).await?;
        Ok(build_service_map(&traces))
    }

    pub async fn service_map_view(&self, hours: u32) -> Result<ServiceMapView> {
        let traces = self.map_traces(Duration::hours(i64::from(hours))).await?;
        let service_map = build_service_map(&traces);
        let statistics = service_map_statistics(&service_map, traces.len());
        Ok(ServiceMapView {
            service_map,
            statistics,
        })
    }

    pub async fn filtered_service_map(&self, services: &[String]) -> Result<ServiceMap> {
        if services.is_empty() {
            return Err(SpanscopeError::Validation(
                "at least one service must be specified".to_string(),
            ));
        }
        let map = self.service_map().await?;
        Ok(filter_service_map(&map, services))
    }

    async fn map_traces(&self, window: Duration) -> Result<Vec<Trace>> {
        self.search_traces(&TraceSearchParams {
            window: TimeWindow::last(window),
            limit: self.map_limit,
            ..TraceSearchParams::default()
        })
        .await
    }

    /// Unresolvable ids are skipped; the comparison still needs two traces that exist.
    pub async fn compare(&self, trace_ids: &[String]) -> Result<TraceComparison> {
        if trace_ids.len() < 2 {
            return Err(SpanscopeError::Validation(
                "at least two trace ids are required for comparison".to_string(),
            ));
        }
        let mut traces = Vec::with_capacity(trace_ids.len());
        for id in trace_ids {
            match self.get_trace(id).await {
                Ok(trace) => traces.push(trace),
                Err(SpanscopeError::NotFound(_)) => {
                    tracing::warn!(trace_id = %id, "trace not found; skipped in comparison");
                }
                Err(err) => return Err(err),
            }
        }
        compare_traces(traces)
    }

    pub async fn service_insights(
        &self,
        service: &str,
        hours: u32,
        max_traces: usize,
    ) -> Result<ServiceInsights> {
        let services = self.list_services().await?;
        if !services.iter().any(|s| s == service) {
            return Err(SpanscopeError::Validation(format!(
                "unknown service: {service}"
            )));
        }
        let operations = self.list_operations(service).await?;
        let traces = self
            .search_traces(&TraceSearchParams {
                service: Some(service.to_string()),
                window: TimeWindow::last_hours(hours),
                limit: INSIGHTS_FETCH_LIMIT,
                ..TraceSearchParams::default()
            })
            .await?;
        Ok(service_insights(service, &operations, &traces, max_traces))
    }

    pub async fn service_csv(&self, service: &str, hours: u32) -> Result<String> {
        let insights = self
            .service_insights(service, hours, SERVICE_CSV_RECENT_TRACES)
            .await?;
        Ok(service_csv(&insights, hours))
    }

    pub async fn dashboard_summary(&self) -> Result<DashboardSummary> {
        let recent_params = TraceSearchParams {
            window: TimeWindow::last_hours(24),
            limit: DASHBOARD_FETCH_LIMIT,
            ..TraceSearchParams::default()
        };
        let (services, error_traces, recent_traces, slow_spans) = tokio::try_join!(
            self.list_services(),
            self.error_traces(DASHBOARD_FETCH_LIMIT),
            self.search_traces(&recent_params),
            self.slow_spans(DASHBOARD_FETCH_LIMIT),
        )?;
        Ok(summarize(&DashboardInputs {
            services,
            error_traces,
            recent_traces,
            slow_spans,
        }))
    }
}

fn to_trace(raw: &RawTrace) -> Result<Trace> {
    let spans = normalize_trace(raw)?;
    Ok(assemble(raw.trace_id.clone(), spans))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use spanscope_core::model::tag::TagValue;
    use testkit::{RawTraceBuilder, StaticSource, checkout_trace};

    use super::*;

    fn service(source: StaticSource) -> (TraceService, Arc<StaticSource>) {
        let source = Arc::new(source);
        let svc = TraceService::new(source.clone(), &Config::default());
        (svc, source)
    }

    fn recent(minutes_ago: i64) -> chrono::DateTime<Utc> {
        Utc::now() - Duration::minutes(minutes_ago)
    }

    #[tokio::test]
    async fn get_trace_assembles_and_reports_missing() {
        let (svc, _) = service(StaticSource::new(vec![checkout_trace(
            "abc123",
            recent(5),
            true,
        )]));

        let trace = svc.get_trace("ABC123").await.unwrap();
        assert_eq!(trace.root_service, "frontend");
        assert!(trace.has_error);
        assert_eq!(trace.spans.len(), 4);

        assert!(matches!(
            svc.get_trace("def456").await,
            Err(SpanscopeError::NotFound(_))
        ));
        assert!(matches!(
            svc.get_trace("not-hex").await,
            Err(SpanscopeError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn trace_without_spans_is_not_found() {
        let (svc, _) = service(StaticSource::new(vec![RawTraceBuilder::new("e0").build()]));
        assert!(matches!(
            svc.get_trace("e0").await,
            Err(SpanscopeError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn error_traces_query_error_tag_and_drop_clean_results() {
        let (svc, source) = service(StaticSource::new(vec![
            checkout_trace("a1", recent(30), true),
            checkout_trace("a2", recent(20), false),
            checkout_trace("a3", recent(10), true),
        ]));

        let traces = svc.error_traces(5).await.unwrap();
        let ids: Vec<_> = traces.iter().map(|t| t.trace_id.as_str()).collect();
        assert_eq!(ids, vec!["a3", "a1"]);

        let searches = source.searches();
        assert_eq!(searches[0].tags[0].key, "error");
        assert_eq!(searches[0].tags[0].value, "true");
        assert!(searches[0].window.since.is_some());
    }

    #[tokio::test]
    async fn slow_spans_ask_for_double_and_sort() {
        let slow = RawTraceBuilder::new("s1")
            .starting_at(recent(3))
            .span("r", None, "web", "GET /report", 0, 2_500)
            .span("q", Some("r"), "db", "SELECT", 100, 1_200)
            .build();
        let (svc, source) = service(StaticSource::new(vec![slow]));

        let spans = svc.slow_spans(1).await.unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].operation_name, "GET /report");
        assert_eq!(source.searches()[0].limit, 2);
        assert_eq!(source.searches()[0].min_duration_us, Some(1_000_000));
    }

    #[tokio::test]
    async fn compare_skips_missing_but_needs_two() {
        let (svc, _) = service(StaticSource::new(vec![
            checkout_trace("c1", recent(4), true),
            checkout_trace("c2", recent(2), false),
        ]));

        let cmp = svc
            .compare(&["c1".into(), "ffff".into(), "c2".into()])
            .await
            .unwrap();
        assert_eq!(cmp.traces.len(), 2);
        assert_eq!(cmp.common_services, vec!["frontend", "cart", "payment", "db"]);

        assert!(matches!(
            svc.compare(&["c1".into(), "ffff".into()]).await,
            Err(SpanscopeError::Validation(_))
        ));
        assert!(matches!(
            svc.compare(&["c1".into()]).await,
            Err(SpanscopeError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn insights_reject_unknown_service() {
        let (svc, _) = service(
            StaticSource::new(vec![checkout_trace("d1", recent(1), true)])
                .with_operations("payment", &["refund"]),
        );

        let insights = svc.service_insights("payment", 24, 10).await.unwrap();
        assert_eq!(insights.operation_count, 2);
        assert_eq!(insights.error_count, 1);
        assert_eq!(insights.error_percentage, 100.0);
        assert_eq!(insights.operation_stats[0].operation_name, "charge");
        assert_eq!(insights.operation_stats[1].stats.count, 0);

        assert!(matches!(
            svc.service_insights("ghost", 24, 10).await,
            Err(SpanscopeError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn service_csv_lists_recent_traces() {
        let (svc, _) = service(StaticSource::new(vec![
            checkout_trace("d1", recent(10), true),
            checkout_trace("d2", recent(5), false),
        ]));

        let csv = svc.service_csv("payment", 24).await.unwrap();
        let rows: Vec<&str> = csv
            .lines()
            .skip_while(|l| !l.starts_with("TraceId,"))
            .skip(1)
            .collect();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].starts_with("d2,"));
        assert!(rows[1].starts_with("d1,") && rows[1].ends_with(",true"));
    }

    #[tokio::test]
    async fn service_map_view_counts_edges() {
        let (svc, _) = service(StaticSource::new(vec![
            checkout_trace("m1", recent(10), true),
            checkout_trace("m2", recent(5), false),
        ]));

        let view = svc.service_map_view(24).await.unwrap();
        assert_eq!(view.statistics.service_count, 4);
        assert_eq!(view.statistics.connection_count, 3);
        assert_eq!(view.statistics.trace_count, 2);
        let edge = view.service_map.edge("frontend", "payment").unwrap();
        assert_eq!(edge.call_count, 2);
        assert_eq!(edge.error_count, 1);

        let filtered = svc
            .filtered_service_map(&["frontend".into(), "cart".into()])
            .await
            .unwrap();
        assert_eq!(filtered.nodes.len(), 2);
        assert_eq!(filtered.edges.len(), 1);

        assert!(matches!(
            svc.filtered_service_map(&[]).await,
            Err(SpanscopeError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn dashboard_combines_concurrent_fetches() {
        let (svc, source) = service(StaticSource::new(vec![
            checkout_trace("e1", recent(60), true),
            checkout_trace("e2", recent(30), false),
        ]));

        let summary = svc.dashboard_summary().await.unwrap();
        let slow_search = source
            .searches()
            .into_iter()
            .find(|p| p.min_duration_us.is_some())
            .unwrap();
        assert_eq!(slow_search.limit, 200);
        assert_eq!(summary.service_count, 4);
        assert_eq!(summary.traces_last24_hours, 2);
        assert_eq!(summary.error_count, 1);
        assert_eq!(summary.error_percentage, 50.0);
        assert_eq!(summary.top_error_traces[0].trace_id, "e1");
        assert!(summary.top_slow_spans.is_empty());
    }

    #[tokio::test]
    async fn upstream_failure_propagates_and_health_degrades() {
        let (svc, _) = service(StaticSource::default().failing("connection refused"));
        assert!(matches!(
            svc.error_traces(5).await,
            Err(SpanscopeError::Upstream(_))
        ));
        let health = svc.health().await;
        assert!(!health.upstream_reachable);
        assert_eq!(health.status, "ok");
    }

    #[tokio::test]
    async fn error_tag_matches_bool_values() {
        let (svc, _) = service(StaticSource::new(vec![checkout_trace("b1", recent(1), true)]));
        let trace = svc.get_trace("b1").await.unwrap();
        let charge = trace.spans.iter().find(|s| s.span_id == "charge").unwrap();
        assert_eq!(charge.tags[ERROR_TAG], TagValue::Bool(true));
    }
}
