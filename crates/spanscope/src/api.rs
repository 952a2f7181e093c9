use std::convert::Infallible;
use std::str::FromStr;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use futures::Stream;
use serde::Deserialize;
use spanscope_analysis::export::{ExportFormat, render_trace, trace_file_name};
use spanscope_core::config::FeatureFlags;
use spanscope_core::error::SpanscopeError;
use spanscope_core::filter::{TagFilter, TimeWindow};
use spanscope_core::model::comparison::{TraceComparison, TraceComparisonRequest};
use spanscope_core::model::dashboard::DashboardSummary;
use spanscope_core::model::insights::ServiceInsights;
use spanscope_core::model::notification::{CreateNotification, Notification, NotificationList};
use spanscope_core::model::service_map::{ServiceMap, ServiceMapView};
use spanscope_core::model::span::Span;
use spanscope_core::model::trace::Trace;
use spanscope_core::query::{
    DEFAULT_SEARCH_LIMIT, ErrorBody, HealthResponse, StatusResponse, TraceSearchParams,
};
use spanscope_core::time::parse_time_or_relative;
use spanscope_store::Store;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::Level;

use crate::service::TraceService;

const DEFAULT_HOURS: u32 = 24;
const DEFAULT_MAX_TRACES: usize = 10;

#[derive(Clone)]
pub struct AppState {
    pub traces: TraceService,
    pub store: Option<Store>,
    pub features: FeatureFlags,
}

impl AppState {
    fn require(&self, enabled: bool, feature: &str) -> Result<(), ApiError> {
        if enabled {
            Ok(())
        } else {
            Err(SpanscopeError::FeatureDisabled(feature.to_string()).into())
        }
    }

    fn store(&self) -> Result<&Store, ApiError> {
        self.require(self.features.notifications, "notifications")?;
        self.store.as_ref().ok_or_else(|| {
            SpanscopeError::Internal("notification store is not open".to_string()).into()
        })
    }
}

pub struct ApiError(SpanscopeError);

impl From<SpanscopeError> for ApiError {
    fn from(err: SpanscopeError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            SpanscopeError::NotFound(_) => StatusCode::NOT_FOUND,
            SpanscopeError::Validation(_) | SpanscopeError::FeatureDisabled(_) => {
                StatusCode::BAD_REQUEST
            }
            SpanscopeError::DataFormat(_) => StatusCode::BAD_GATEWAY,
            SpanscopeError::Upstream(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::warn!(error = %self.0, status = status.as_u16(), "request failed");
        }
        let body = ErrorBody {
            error: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    Router::new()
        .route("/api/health", get(health))
        .route("/api/status", get(status))
        .route("/api/traces", get(search_traces))
        .route("/api/traces/{trace_id}", get(get_trace))
        .route("/api/services", get(list_services))
        .route("/api/services/{service}/operations", get(list_operations))
        .route("/api/services/{service}/insights", get(service_insights))
        .route("/api/analytics/errors", get(error_traces))
        .route("/api/analytics/slow-spans", get(slow_spans))
        .route("/api/analytics/service-map", get(service_map))
        .route("/api/service-map/visualization", get(service_map_view))
        .route("/api/service-map/filter", post(filter_service_map))
        .route("/api/comparison/traces", post(compare_traces))
        .route("/api/dashboard/summary", get(dashboard_summary))
        .route("/api/export/traces/{trace_id}/{format}", get(export_trace))
        .route("/api/export/services/{service}/csv", get(export_service_csv))
        .route(
            "/api/notifications",
            get(list_notifications).post(create_notification),
        )
        .route("/api/notifications/unread", get(list_unread_notifications))
        .route("/api/notifications/read-all", put(mark_all_read))
        .route("/api/notifications/stream", get(notification_stream))
        .route("/api/notifications/{id}/read", put(mark_read))
        .route("/api/notifications/{id}", delete(delete_notification))
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .on_request(tower_http::trace::DefaultOnRequest::new().level(Level::INFO))
                .on_response(tower_http::trace::DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state)
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    pub service: Option<String>,
    pub operation: Option<String>,
    pub tags: Option<String>,
    pub min_duration: Option<i64>,
    pub max_duration: Option<i64>,
    pub start_time_min: Option<String>,
    pub start_time_max: Option<String>,
    pub limit: Option<usize>,
}

impl SearchQuery {
    fn into_params(self) -> Result<TraceSearchParams, SpanscopeError> {
        Ok(TraceSearchParams {
            service: self.service.filter(|s| !s.is_empty()),
            operation: self.operation.filter(|s| !s.is_empty()),
            tags: self
                .tags
                .as_deref()
                .map(TagFilter::parse_list)
                .transpose()?
                .unwrap_or_default(),
            min_duration_us: self.min_duration,
            max_duration_us: self.max_duration,
            window: TimeWindow {
                since: self
                    .start_time_min
                    .as_deref()
                    .map(parse_time_or_relative)
                    .transpose()?,
                until: self
                    .start_time_max
                    .as_deref()
                    .map(parse_time_or_relative)
                    .transpose()?,
            },
            limit: self.limit.unwrap_or(DEFAULT_SEARCH_LIMIT),
        })
    }
}

#[derive(Debug, Deserialize)]
struct LimitQuery {
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HoursQuery {
    time_range_hours: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InsightsQuery {
    time_range_hours: Option<u32>,
    max_traces: Option<usize>,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(state.traces.health().await)
}

async fn status(State(state): State<AppState>) -> ApiResult<StatusResponse> {
    let store = match &state.store {
        Some(store) if state.features.notifications => Some(store.status()?),
        _ => None,
    };
    Ok(Json(StatusResponse {
        health: state.traces.health().await,
        store,
    }))
}

async fn search_traces(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Vec<Trace>> {
    let params = query.into_params()?;
    Ok(Json(state.traces.search_traces(&params).await?))
}

async fn get_trace(
    State(state): State<AppState>,
    Path(trace_id): Path<String>,
) -> ApiResult<Trace> {
    Ok(Json(state.traces.get_trace(&trace_id).await?))
}

async fn list_services(State(state): State<AppState>) -> ApiResult<Vec<String>> {
    Ok(Json(state.traces.list_services().await?))
}

async fn list_operations(
    State(state): State<AppState>,
    Path(service): Path<String>,
) -> ApiResult<Vec<String>> {
    Ok(Json(state.traces.list_operations(&service).await?))
}

async fn service_insights(
    State(state): State<AppState>,
    Path(service): Path<String>,
    Query(query): Query<InsightsQuery>,
) -> ApiResult<ServiceInsights> {
    state.require(state.features.dashboard_analytics, "dashboard_analytics")?;
    let insights = state
        .traces
        .service_insights(
            &service,
            query.time_range_hours.unwrap_or(DEFAULT_HOURS),
            query.max_traces.unwrap_or(DEFAULT_MAX_TRACES),
        )
        .await?;
    Ok(Json(insights))
}

async fn error_traces(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Vec<Trace>> {
    let limit = query.limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
    Ok(Json(state.traces.error_traces(limit).await?))
}

async fn slow_spans(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Vec<Span>> {
    let limit = query.limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
    Ok(Json(state.traces.slow_spans(limit).await?))
}

async fn service_map(State(state): State<AppState>) -> ApiResult<ServiceMap> {
    state.require(state.features.service_map, "service_map")?;
    Ok(Json(state.traces.service_map().await?))
}

async fn service_map_view(
    State(state): State<AppState>,
    Query(query): Query<HoursQuery>,
) -> ApiResult<ServiceMapView> {
    state.require(state.features.service_map, "service_map")?;
    let hours = query.time_range_hours.unwrap_or(DEFAULT_HOURS);
    Ok(Json(state.traces.service_map_view(hours).await?))
}

async fn filter_service_map(
    State(state): State<AppState>,
    Json(services): Json<Vec<String>>,
) -> ApiResult<ServiceMap> {
    state.require(state.features.service_map, "service_map")?;
    Ok(Json(state.traces.filtered_service_map(&services).await?))
}

async fn compare_traces(
    State(state): State<AppState>,
    Json(request): Json<TraceComparisonRequest>,
) -> ApiResult<TraceComparison> {
    state.require(state.features.trace_comparison, "trace_comparison")?;
    Ok(Json(state.traces.compare(&request.trace_ids).await?))
}

async fn dashboard_summary(State(state): State<AppState>) -> ApiResult<DashboardSummary> {
    state.require(state.features.dashboard_analytics, "dashboard_analytics")?;
    Ok(Json(state.traces.dashboard_summary().await?))
}

async fn export_trace(
    State(state): State<AppState>,
    Path((trace_id, format)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    state.require(state.features.trace_export, "trace_export")?;
    let format = ExportFormat::from_str(&format)?;
    let trace = state.traces.get_trace(&trace_id).await?;
    let body = render_trace(&trace, format)?;
    Ok(attachment(
        format.content_type(),
        &trace_file_name(&trace.trace_id, format),
        body,
    ))
}

async fn export_service_csv(
    State(state): State<AppState>,
    Path(service): Path<String>,
    Query(query): Query<HoursQuery>,
) -> Result<Response, ApiError> {
    state.require(state.features.trace_export, "trace_export")?;
    let hours = query.time_range_hours.unwrap_or(DEFAULT_HOURS);
    let body = state.traces.service_csv(&service, hours).await?;
    Ok(attachment(
        ExportFormat::Csv.content_type(),
        &format!("service-{service}.csv"),
        body,
    ))
}

fn attachment(content_type: &'static str, file_name: &str, body: String) -> Response {
    let disposition = format!("attachment; filename=\"{}\"", file_name.replace('"', ""));
    let mut response = body.into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    response
}

async fn list_notifications(State(state): State<AppState>) -> ApiResult<NotificationList> {
    Ok(Json(state.store()?.notification_list(false)?))
}

async fn list_unread_notifications(State(state): State<AppState>) -> ApiResult<NotificationList> {
    Ok(Json(state.store()?.notification_list(true)?))
}

async fn create_notification(
    State(state): State<AppState>,
    Json(request): Json<CreateNotification>,
) -> Result<(StatusCode, Json<Notification>), ApiError> {
    let created = state.store()?.create_notification(request)?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn mark_read(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.store()?.mark_read(&id)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(SpanscopeError::NotFound(format!("notification {id}")).into())
    }
}

async fn mark_all_read(State(state): State<AppState>) -> ApiResult<serde_json::Value> {
    let count = state.store()?.mark_all_read()?;
    Ok(Json(serde_json::json!({ "count": count })))
}

async fn delete_notification(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.store()?.delete_notification(&id)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(SpanscopeError::NotFound(format!("notification {id}")).into())
    }
}

async fn notification_stream(
    State(state): State<AppState>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let rx = state.store()?.subscribe();
    let stream = BroadcastStream::new(rx)
        .filter_map(|result| match result {
            Ok(event) => Some(event),
            Err(err) => {
                tracing::warn!(error = %err, "notification stream lagged");
                None
            }
        })
        .map(|event| {
            let data = serde_json::to_string(&event).unwrap_or_default();
            Ok(Event::default().event(event.name()).data(data))
        });
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
