use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use spanscope_core::config::Config;
use spanscope_core::error::Result;
use spanscope_core::filter::TimeWindow;
use spanscope_core::model::notification::{CreateNotification, NotificationType};
use spanscope_core::model::trace::Trace;
use spanscope_core::query::TraceSearchParams;
use spanscope_store::NotificationSink;

use crate::service::TraceService;

const MONITOR_FETCH_LIMIT: usize = 200;
pub const JITTER_RANGE: std::ops::Range<f64> = 0.5..1.5;

#[derive(Debug, Clone, PartialEq)]
pub struct MonitorSettings {
    pub error_threshold: u32,
    pub latency_threshold_ms: f64,
    pub alert_cooldown: chrono::Duration,
}

impl MonitorSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            error_threshold: cfg.monitor_error_threshold.max(1),
            latency_threshold_ms: cfg.monitor_latency_threshold.as_secs_f64() * 1000.0,
            alert_cooldown: chrono::Duration::from_std(cfg.monitor_alert_cooldown)
                .unwrap_or_else(|_| chrono::Duration::hours(1)),
        }
    }
}

#[derive(Default)]
struct ServiceTick<'a> {
    error_spans: usize,
    latest_error: Option<&'a Trace>,
    span_count: usize,
    total_ms: f64,
}

/// Error streaks and latency cooldowns carried between checks. Evaluation is pure so the
/// alerting rules can be exercised without a clock or a backend.
#[derive(Debug)]
pub struct MonitorState {
    settings: MonitorSettings,
    error_streaks: HashMap<String, u32>,
    last_latency_alert: HashMap<String, DateTime<Utc>>,
}

impl MonitorState {
    pub fn new(settings: MonitorSettings) -> Self {
        Self {
            settings,
            error_streaks: HashMap::new(),
            last_latency_alert: HashMap::new(),
        }
    }

    pub fn evaluate(&mut self, traces: &[Trace], now: DateTime<Utc>) -> Vec<CreateNotification> {
        let mut order: Vec<&str> = Vec::new();
        let mut ticks: HashMap<&str, ServiceTick<'_>> = HashMap::new();
        for trace in traces {
            for span in &trace.spans {
                let tick = ticks.entry(span.service_name.as_str()).or_insert_with(|| {
                    order.push(span.service_name.as_str());
                    ServiceTick::default()
                });
                tick.span_count += 1;
                tick.total_ms += span.duration_ms();
                if span.has_error() {
                    tick.error_spans += 1;
                    if tick
                        .latest_error
                        .is_none_or(|t| trace.start_time > t.start_time)
                    {
                        tick.latest_error = Some(trace);
                    }
                }
            }
        }

        self.error_streaks
            .retain(|svc, _| ticks.get(svc.as_str()).is_some_and(|t| t.error_spans > 0));

        let mut out = Vec::new();
        for service in order {
            let tick = &ticks[service];
            if tick.error_spans > 0 {
                let streak = self.error_streaks.entry(service.to_string()).or_insert(0);
                *streak += 1;
                if *streak >= self.settings.error_threshold {
                    let checks = *streak;
                    *streak = 0;
                    out.push(
                        CreateNotification::new(
                            NotificationType::Error,
                            format!("Errors detected in {service}"),
                            format!(
                                "{} erroring spans in {service} over {checks} consecutive checks",
                                tick.error_spans
                            ),
                        )
                        .for_service(service)
                        .with_trace(tick.latest_error.map(|t| t.trace_id.clone()))
                        .with_meta("errorCount", tick.error_spans.to_string())
                        .with_meta("consecutiveChecks", checks.to_string()),
                    );
                }
            }

            let mean_ms = tick.total_ms / tick.span_count as f64;
            if mean_ms > self.settings.latency_threshold_ms && self.latency_alert_due(service, now)
            {
                self.last_latency_alert.insert(service.to_string(), now);
                out.push(
                    CreateNotification::new(
                        NotificationType::Performance,
                        format!("High latency in {service}"),
                        format!(
                            "mean span duration {mean_ms:.2} ms exceeds {:.2} ms",
                            self.settings.latency_threshold_ms
                        ),
                    )
                    .for_service(service)
                    .with_meta("averageDuration", format!("{mean_ms:.2}"))
                    .with_meta("spanCount", tick.span_count.to_string()),
                );
            }
        }
        out
    }

    fn latency_alert_due(&self, service: &str, now: DateTime<Utc>) -> bool {
        self.last_latency_alert
            .get(service)
            .is_none_or(|last| now - *last >= self.settings.alert_cooldown)
    }
}

/// Delay after `failures` consecutive failed checks, doubling from `base` and capped at `cap`.
pub fn backoff_delay(base: Duration, failures: u32, cap: Duration) -> Duration {
    let factor = 2u32.saturating_pow(failures.saturating_sub(1));
    base.saturating_mul(factor).min(cap)
}

/// Scales `delay` by `factor` (drawn from [`JITTER_RANGE`]) and keeps the result within `cap`.
pub fn with_jitter(delay: Duration, factor: f64, cap: Duration) -> Duration {
    delay.mul_f64(factor.clamp(JITTER_RANGE.start, JITTER_RANGE.end)).min(cap)
}

pub struct Monitor {
    traces: TraceService,
    sink: Arc<dyn NotificationSink>,
    interval: Duration,
    initial_delay: Duration,
    error_backoff: Duration,
    state: MonitorState,
}

impl Monitor {
    pub fn new(traces: TraceService, sink: Arc<dyn NotificationSink>, cfg: &Config) -> Self {
        Self {
            traces,
            sink,
            interval: cfg.monitor_interval,
            initial_delay: cfg.monitor_initial_delay,
            error_backoff: cfg.monitor_error_backoff,
            state: MonitorState::new(MonitorSettings::from_config(cfg)),
        }
    }

    pub async fn run(mut self) {
        tokio::time::sleep(self.initial_delay).await;
        self.deliver(CreateNotification::new(
            NotificationType::SystemUpdate,
            "Monitoring started",
            format!(
                "checking {} every {}",
                self.traces.source().describe(),
                humantime::format_duration(self.interval)
            ),
        ));
        tracing::info!(interval = ?self.interval, "monitor started");

        let mut failures = 0u32;
        loop {
            let delay = match self.tick(Utc::now()).await {
                Ok(sent) => {
                    failures = 0;
                    tracing::debug!(sent, "monitor check complete");
                    self.interval
                }
                Err(err) => {
                    failures = failures.saturating_add(1);
                    let factor = rand::rng().random_range(JITTER_RANGE);
                    let delay = with_jitter(
                        backoff_delay(self.error_backoff, failures, self.interval),
                        factor,
                        self.interval,
                    );
                    tracing::warn!(error = %err, failures, retry_in = ?delay, "monitor check failed");
                    delay
                }
            };
            tokio::time::sleep(delay).await;
        }
    }

    /// One check over the last interval. Returns how many notifications were raised.
    pub async fn tick(&mut self, now: DateTime<Utc>) -> Result<usize> {
        let window = chrono::Duration::from_std(self.interval)
            .unwrap_or_else(|_| chrono::Duration::minutes(1));
        let traces = self
            .traces
            .search_traces(&TraceSearchParams {
                window: TimeWindow {
                    since: Some(now - window),
                    until: Some(now),
                },
                limit: MONITOR_FETCH_LIMIT,
                ..TraceSearchParams::default()
            })
            .await?;
        let raised = self.state.evaluate(&traces, now);
        let count = raised.len();
        for request in raised {
            self.deliver(request);
        }
        Ok(count)
    }

    fn deliver(&self, request: CreateNotification) {
        if let Err(err) = self.sink.notify(request) {
            tracing::warn!(error = %err, "failed to record notification");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use chrono::TimeZone;
    use spanscope_core::error::SpanscopeError;
    use spanscope_core::model::notification::Notification;
    use testkit::{StaticSource, checkout_trace, normalized};

    use super::*;

    fn settings(threshold: u32, latency_ms: f64) -> MonitorSettings {
        MonitorSettings {
            error_threshold: threshold,
            latency_threshold_ms: latency_ms,
            alert_cooldown: chrono::Duration::hours(1),
        }
    }

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 1, 12, minute, 0).unwrap()
    }

    fn failing(id: &str, minute: u32) -> Trace {
        normalized(&checkout_trace(id, at(minute), true))
    }

    fn healthy(id: &str, minute: u32) -> Trace {
        normalized(&checkout_trace(id, at(minute), false))
    }

    #[test]
    fn error_streak_alerts_at_threshold_then_resets() {
        let mut state = MonitorState::new(settings(3, 10_000.0));

        assert!(state.evaluate(&[failing("a", 0)], at(1)).is_empty());
        assert!(state.evaluate(&[failing("b", 1)], at(2)).is_empty());
        let raised = state.evaluate(&[healthy("c", 2), failing("d", 2)], at(3));
        assert_eq!(raised.len(), 1);
        let alert = &raised[0];
        assert_eq!(alert.kind, NotificationType::Error);
        assert_eq!(alert.service_name.as_deref(), Some("payment"));
        assert_eq!(alert.trace_id.as_deref(), Some("d"));
        assert_eq!(alert.metadata["consecutiveChecks"], "3");

        assert!(state.evaluate(&[failing("e", 3)], at(4)).is_empty());
    }

    #[test]
    fn clean_check_breaks_the_streak() {
        let mut state = MonitorState::new(settings(2, 10_000.0));
        assert!(state.evaluate(&[failing("a", 0)], at(1)).is_empty());
        assert!(state.evaluate(&[healthy("b", 1)], at(2)).is_empty());
        assert!(state.evaluate(&[failing("c", 2)], at(3)).is_empty());
        assert_eq!(state.evaluate(&[failing("d", 3)], at(4)).len(), 1);
    }

    #[test]
    fn empty_check_breaks_the_streak() {
        let mut state = MonitorState::new(settings(2, 10_000.0));
        assert!(state.evaluate(&[failing("a", 0)], at(1)).is_empty());
        assert!(state.evaluate(&[], at(2)).is_empty());
        assert!(state.evaluate(&[failing("b", 2)], at(3)).is_empty());
    }

    #[test]
    fn latency_alerts_respect_cooldown() {
        let mut state = MonitorState::new(settings(100, 250.0));

        let raised = state.evaluate(&[healthy("a", 0)], at(1));
        assert_eq!(raised.len(), 1);
        assert_eq!(raised[0].kind, NotificationType::Performance);
        assert_eq!(raised[0].service_name.as_deref(), Some("frontend"));
        assert_eq!(raised[0].metadata["averageDuration"], "300.00");

        assert!(state.evaluate(&[healthy("b", 1)], at(30)).is_empty());
        let later = at(1) + chrono::Duration::hours(1);
        assert_eq!(state.evaluate(&[healthy("c", 2)], later).len(), 1);
    }

    #[test]
    fn backoff_doubles_up_to_cap() {
        let base = Duration::from_secs(30);
        let cap = Duration::from_secs(100);
        assert_eq!(backoff_delay(base, 1, cap), Duration::from_secs(30));
        assert_eq!(backoff_delay(base, 2, cap), Duration::from_secs(60));
        assert_eq!(backoff_delay(base, 3, cap), cap);
        assert_eq!(backoff_delay(base, 40, cap), cap);
    }

    #[test]
    fn jitter_spreads_retries_within_cap() {
        let delay = Duration::from_secs(40);
        let cap = Duration::from_secs(50);
        assert_eq!(with_jitter(delay, 0.5, cap), Duration::from_secs(20));
        assert_eq!(with_jitter(delay, 1.0, cap), delay);
        assert_eq!(with_jitter(delay, 1.5, cap), cap);
        assert_eq!(with_jitter(delay, 9.0, cap), cap);
        assert_eq!(with_jitter(delay, 0.0, cap), Duration::from_secs(20));

        for _ in 0..100 {
            let factor = rand::rng().random_range(JITTER_RANGE);
            let jittered = with_jitter(delay, factor, cap);
            assert!(jittered >= Duration::from_secs(20) && jittered <= cap);
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        seen: Mutex<Vec<CreateNotification>>,
    }

    impl NotificationSink for RecordingSink {
        fn notify(&self, request: CreateNotification) -> Result<Notification> {
            self.seen.lock().unwrap().push(request.clone());
            Ok(request.into_notification(Utc::now()))
        }
    }

    fn monitor(source: StaticSource, sink: Arc<RecordingSink>) -> Monitor {
        let cfg = Config {
            monitor_error_threshold: 1,
            monitor_interval: Duration::from_secs(600),
            ..Config::default()
        };
        Monitor::new(TraceService::new(Arc::new(source), &cfg), sink, &cfg)
    }

    #[tokio::test]
    async fn tick_searches_the_last_interval_and_delivers() {
        let now = Utc::now();
        let sink = Arc::new(RecordingSink::default());
        let source = StaticSource::new(vec![
            checkout_trace("f1", now - chrono::Duration::minutes(2), true),
            checkout_trace("f0", now - chrono::Duration::hours(3), true),
        ]);
        let mut monitor = monitor(source, sink.clone());

        assert_eq!(monitor.tick(now).await.unwrap(), 1);
        let seen = sink.seen.lock().unwrap();
        assert_eq!(seen[0].trace_id.as_deref(), Some("f1"));
    }

    #[tokio::test]
    async fn tick_surfaces_upstream_errors() {
        let sink = Arc::new(RecordingSink::default());
        let mut monitor = monitor(StaticSource::default().failing("down"), sink.clone());
        assert!(matches!(
            monitor.tick(Utc::now()).await,
            Err(SpanscopeError::Upstream(_))
        ));
        assert!(sink.seen.lock().unwrap().is_empty());
    }
}
