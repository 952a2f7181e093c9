use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::try_join_all;
use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use spanscope_core::config::Config;
use spanscope_core::error::{Result, SpanscopeError};
use spanscope_core::filter::tags_to_json;
use spanscope_core::query::TraceSearchParams;
use spanscope_core::time::to_unix_micros;

use crate::model::{Envelope, RawTrace};
use crate::source::TraceSource;

/// Bounded exponential backoff: retry `n` (zero based) waits `base_delay * 2^n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(retry))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone)]
pub struct JaegerClient {
    http: Client,
    base_url: Url,
    retry: RetryPolicy,
}

impl JaegerClient {
    pub fn new(base_url: &str, timeout: Duration, retry: RetryPolicy) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| SpanscopeError::Config(format!("bad jaeger url {base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(SpanscopeError::Config(format!(
                "jaeger url {base_url} cannot carry a path"
            )));
        }
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SpanscopeError::Config(format!("failed to build http client: {e}")))?;
        Ok(Self {
            http,
            base_url,
            retry,
        })
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        Self::new(
            &cfg.jaeger_url,
            cfg.jaeger_timeout,
            RetryPolicy {
                retries: cfg.jaeger_retry_attempts,
                base_delay: cfg.jaeger_retry_base_delay,
            },
        )
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| SpanscopeError::Config("jaeger url cannot carry a path".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// GETs a Jaeger endpoint and unwraps its `data` field. A 404 yields `Ok(None)`.
    async fn get_data<T: DeserializeOwned>(
        &self,
        url: Url,
        query: &[(&str, String)],
    ) -> Result<Option<T>> {
        let mut retry = 0;
        loop {
            let reason = match self.http.get(url.clone()).query(query).send().await {
                Ok(resp) if resp.status() == StatusCode::NOT_FOUND => return Ok(None),
                Ok(resp) if resp.status().is_success() => {
                    let body = resp.bytes().await.map_err(|e| {
                        SpanscopeError::Upstream(format!("failed reading {url}: {e}"))
                    })?;
                    return decode_envelope(&url, &body);
                }
                Ok(resp) if is_retryable(resp.status()) => format!("status {}", resp.status()),
                Ok(resp) => {
                    return Err(SpanscopeError::Upstream(format!(
                        "{url} returned {}",
                        resp.status()
                    )));
                }
                Err(err) => err.to_string(),
            };

            if retry >= self.retry.retries {
                return Err(SpanscopeError::Upstream(format!(
                    "{url}: {reason} (gave up after {} attempts)",
                    retry + 1
                )));
            }
            let delay = self.retry.delay_for(retry);
            tracing::warn!(
                url = %url,
                attempt = retry + 1,
                delay_ms = delay.as_millis() as u64,
                reason = %reason,
                "jaeger request failed; retrying"
            );
            tokio::time::sleep(delay).await;
            retry += 1;
        }
    }

    async fn search_service(&self, params: &TraceSearchParams) -> Result<Vec<RawTrace>> {
        let url = self.endpoint(&["api", "traces"])?;
        let traces: Option<Vec<RawTrace>> = self.get_data(url, &search_query(params)).await?;
        let traces = traces.unwrap_or_default();
        tracing::debug!(
            service = ?params.service,
            count = traces.len(),
            "jaeger search returned"
        );
        Ok(traces)
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

fn decode_envelope<T: DeserializeOwned>(url: &Url, body: &[u8]) -> Result<Option<T>> {
    let envelope: Envelope<T> = serde_json::from_slice(body)
        .map_err(|e| SpanscopeError::DataFormat(format!("bad payload from {url}: {e}")))?;
    if envelope.data.is_none()
        && let Some(errors) = envelope.errors.filter(|e| !e.is_empty())
    {
        let msgs: Vec<String> = errors.into_iter().map(|e| e.msg).collect();
        return Err(SpanscopeError::Upstream(format!(
            "{url} reported: {}",
            msgs.join("; ")
        )));
    }
    Ok(envelope.data)
}

/// Query string for `/api/traces`. Jaeger takes durations as unit strings and the window as
/// Unix microseconds.
pub fn search_query(params: &TraceSearchParams) -> Vec<(&'static str, String)> {
    let mut query = Vec::new();
    if let Some(service) = &params.service {
        query.push(("service", service.clone()));
    }
    if let Some(operation) = &params.operation {
        query.push(("operation", operation.clone()));
    }
    if !params.tags.is_empty() {
        query.push(("tags", tags_to_json(&params.tags)));
    }
    if let Some(min) = params.min_duration_us {
        query.push(("minDuration", format!("{min}us")));
    }
    if let Some(max) = params.max_duration_us {
        query.push(("maxDuration", format!("{max}us")));
    }
    if let Some(since) = params.window.since {
        query.push(("start", to_unix_micros(since).to_string()));
    }
    if let Some(until) = params.window.until {
        query.push(("end", to_unix_micros(until).to_string()));
    }
    query.push(("limit", params.limit.to_string()));
    query
}

/// Earliest parseable span start, used to order merged fan-out results.
fn raw_start(trace: &RawTrace) -> i64 {
    trace
        .spans
        .iter()
        .filter_map(|s| s.start_time.as_ref().and_then(serde_json::Value::as_i64))
        .min()
        .unwrap_or(i64::MIN)
}

#[async_trait]
impl TraceSource for JaegerClient {
    /// Jaeger requires a service for searches, so a search without one fans out over every
    /// known service and merges the newest `limit` distinct traces.
    async fn search_traces(&self, params: &TraceSearchParams) -> Result<Vec<RawTrace>> {
        params.validate()?;
        if params.service.is_some() {
            return self.search_service(params).await;
        }

        let services = self.list_services().await?;
        let searches = services.into_iter().map(|service| {
            let scoped = TraceSearchParams {
                service: Some(service),
                ..params.clone()
            };
            async move { self.search_service(&scoped).await }
        });
        let batches = try_join_all(searches).await?;

        let mut seen = HashSet::new();
        let mut merged: Vec<RawTrace> = batches
            .into_iter()
            .flatten()
            .filter(|t| seen.insert(t.trace_id.clone()))
            .collect();
        merged.sort_by_key(|t| std::cmp::Reverse(raw_start(t)));
        merged.truncate(params.limit);
        Ok(merged)
    }

    async fn get_trace(&self, trace_id: &str) -> Result<Option<RawTrace>> {
        let url = self.endpoint(&["api", "traces", trace_id])?;
        let traces: Option<Vec<RawTrace>> = self.get_data(url, &[]).await?;
        Ok(traces
            .unwrap_or_default()
            .into_iter()
            .find(|t| !t.spans.is_empty()))
    }

    async fn list_services(&self) -> Result<Vec<String>> {
        let url = self.endpoint(&["api", "services"])?;
        let services: Option<Vec<String>> = self.get_data(url, &[]).await?;
        let mut services = services.unwrap_or_default();
        services.sort();
        Ok(services)
    }

    async fn list_operations(&self, service: &str) -> Result<Vec<String>> {
        let url = self.endpoint(&["api", "services", service, "operations"])?;
        let operations: Option<Vec<String>> = self.get_data(url, &[]).await?;
        Ok(operations.unwrap_or_default())
    }

    fn describe(&self) -> String {
        self.base_url.to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::Router;
    use axum::extract::{Path, Query, State};
    use axum::http::StatusCode as AxumStatus;
    use axum::response::IntoResponse;
    use axum::routing::get;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use spanscope_core::filter::{TagFilter, TimeWindow};

    use super::*;

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            retries: 2,
            base_delay: Duration::from_millis(1),
        }
    }

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn trace_json(id: &str, service: &str, start: i64) -> serde_json::Value {
        json!({
            "traceID": id,
            "spans": [{
                "traceID": id, "spanID": "s1", "operationName": "GET /",
                "references": [], "startTime": start, "duration": 10,
                "tags": [], "logs": [], "processID": "p1"
            }],
            "processes": {"p1": {"serviceName": service, "tags": []}}
        })
    }

    #[test]
    fn backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_secs(2));
        assert_eq!(policy.delay_for(1), Duration::from_secs(4));
        assert_eq!(policy.delay_for(2), Duration::from_secs(8));
    }

    #[test]
    fn search_query_encodes_filters() {
        let since = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap();
        let params = TraceSearchParams {
            service: Some("web".into()),
            tags: TagFilter::parse_list("error=true").unwrap(),
            min_duration_us: Some(1_000_000),
            window: TimeWindow {
                since: Some(since),
                until: None,
            },
            limit: 7,
            ..TraceSearchParams::default()
        };
        let query = search_query(&params);
        assert_eq!(
            query,
            vec![
                ("service", "web".to_string()),
                ("tags", r#"{"error":"true"}"#.to_string()),
                ("minDuration", "1000000us".to_string()),
                ("start", since.timestamp_micros().to_string()),
                ("limit", "7".to_string()),
            ]
        );
    }

    #[test]
    fn rejects_unusable_base_url() {
        assert!(JaegerClient::new("not a url", Duration::from_secs(1), fast_retry()).is_err());
        assert!(
            JaegerClient::new("mailto:ops@example.com", Duration::from_secs(1), fast_retry())
                .is_err()
        );
    }

    #[tokio::test]
    async fn missing_trace_is_none() {
        let app = Router::new().route(
            "/api/traces/{id}",
            get(|| async { (AxumStatus::NOT_FOUND, "trace not found") }),
        );
        let base = serve(app).await;
        let client = JaegerClient::new(&base, Duration::from_secs(5), fast_retry()).unwrap();
        assert!(client.get_trace("abc").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn retries_transient_failures() {
        let hits = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route(
                "/api/traces/{id}",
                get(
                    |State(hits): State<Arc<AtomicUsize>>, Path(id): Path<String>| async move {
                        if hits.fetch_add(1, Ordering::SeqCst) < 2 {
                            return AxumStatus::SERVICE_UNAVAILABLE.into_response();
                        }
                        axum::Json(json!({"data": [trace_json(&id, "web", 5)]})).into_response()
                    },
                ),
            )
            .with_state(hits.clone());
        let base = serve(app).await;
        let client = JaegerClient::new(&base, Duration::from_secs(5), fast_retry()).unwrap();

        let trace = client.get_trace("abc").await.unwrap().unwrap();
        assert_eq!(trace.trace_id, "abc");
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausted_retries_surface_upstream_error() {
        let app = Router::new().route(
            "/api/services",
            get(|| async { AxumStatus::INTERNAL_SERVER_ERROR }),
        );
        let base = serve(app).await;
        let client = JaegerClient::new(&base, Duration::from_secs(5), fast_retry()).unwrap();
        let err = client.list_services().await.unwrap_err();
        assert!(matches!(err, SpanscopeError::Upstream(_)));
        assert!(err.to_string().contains("3 attempts"));
    }

    #[tokio::test]
    async fn garbage_payload_is_data_format() {
        let app = Router::new().route("/api/services", get(|| async { "{not json" }));
        let base = serve(app).await;
        let client = JaegerClient::new(&base, Duration::from_secs(5), fast_retry()).unwrap();
        assert!(matches!(
            client.list_services().await,
            Err(SpanscopeError::DataFormat(_))
        ));
    }

    #[tokio::test]
    async fn unreachable_backend_is_upstream_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let client =
            JaegerClient::new(&format!("http://{addr}"), Duration::from_secs(1), fast_retry())
                .unwrap();
        assert!(matches!(
            client.list_services().await,
            Err(SpanscopeError::Upstream(_))
        ));
    }

    #[tokio::test]
    async fn search_without_service_fans_out() {
        let app = Router::new()
            .route(
                "/api/services",
                get(|| async { axum::Json(json!({"data": ["web", "auth"]})) }),
            )
            .route(
                "/api/traces",
                get(
                    |Query(q): Query<std::collections::HashMap<String, String>>| async move {
                        let data = match q.get("service").map(String::as_str) {
                            Some("web") => vec![
                                trace_json("shared", "web", 10),
                                trace_json("w1", "web", 30),
                            ],
                            Some("auth") => vec![
                                trace_json("shared", "auth", 10),
                                trace_json("a1", "auth", 20),
                            ],
                            _ => Vec::new(),
                        };
                        axum::Json(json!({ "data": data }))
                    },
                ),
            )
            .route(
                "/api/services/{service}/operations",
                get(|Path(service): Path<String>| async move {
                    axum::Json(json!({"data": [format!("{service}-op")]}))
                }),
            );
        let base = serve(app).await;
        let client = JaegerClient::new(&base, Duration::from_secs(5), fast_retry()).unwrap();

        let traces = client
            .search_traces(&TraceSearchParams {
                limit: 2,
                ..TraceSearchParams::default()
            })
            .await
            .unwrap();
        let ids: Vec<_> = traces.iter().map(|t| t.trace_id.as_str()).collect();
        assert_eq!(ids, vec!["w1", "a1"]);

        assert_eq!(client.list_services().await.unwrap(), vec!["auth", "web"]);
        assert_eq!(
            client.list_operations("web").await.unwrap(),
            vec!["web-op".to_string()]
        );
    }
}
