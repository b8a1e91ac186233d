// MockIoT Server - HTTP API
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! HTTP routes.
//!
//! Synchronous generation endpoints answer `{"success": true, ...summary}`,
//! or `{"success": false, "message": ...}` when the catalog lacks the
//! devices a run needs. Asynchronous endpoints answer with a task id to
//! poll on `/tasks/:id`. Invalid parameters are rejected with 400 before
//! any task exists.

use crate::metrics::{encode_metrics, set_active_tasks};
use crate::replay::{PublishQuery, ReplayEngine, ReplayError, ReplayQuery, ReplayStatus};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use mockiot::{
    ConfigError, GenerationError, GenerationRequest, GenerationSummary, GenerationTask, Generator,
    LoadingQuery, PredictionQuery, TaskError, TaskId, TimePattern, TimeSeriesQuery,
    VehicleEntryQuery,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{error, warn, Level};

/// Application state shared across handlers.
pub struct AppState {
    pub generator: Generator,
    pub replay: Arc<ReplayEngine>,
    pub device_count: usize,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(generator: Generator, replay: Arc<ReplayEngine>, device_count: usize) -> Self {
        Self {
            generator,
            replay,
            device_count,
            start_time: Instant::now(),
        }
    }
}

/// Errors answered to HTTP clients.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    BadRequest(#[from] ConfigError),

    #[error(transparent)]
    NotFound(#[from] TaskError),

    #[error(transparent)]
    Replay(#[from] ReplayError),

    #[error("{0}")]
    Internal(String),
}

impl From<GenerationError> for ApiError {
    fn from(e: GenerationError) -> Self {
        match e {
            GenerationError::Config(e) => ApiError::BadRequest(e),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Replay(ReplayError::FileNotFound(_) | ReplayError::EmptyDataset) => {
                StatusCode::CONFLICT
            }
            ApiError::Replay(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        } else {
            warn!("Request rejected: {}", self);
        }
        let body = Json(json!({ "success": false, "message": self.to_string() }));
        (status, body).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Build the router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/status", get(status_handler))
        .route("/metrics", get(metrics_handler))
        // Scenarios
        .route("/scenarios/vehicle-entry", post(vehicle_entry))
        .route("/scenarios/loading", post(loading))
        .route("/scenarios/loading/async", post(loading_async))
        .route("/scenarios/carbon-peak", post(carbon_peak))
        .route("/scenarios/carbon-reduction", post(carbon_reduction))
        .route("/patterns/workday-peak", post(workday_peak))
        .route("/patterns/night", post(night))
        // Time series
        .route("/time-series", post(time_series))
        .route("/time-series/async", post(time_series_async))
        .route("/prediction-dataset", post(prediction_dataset))
        .route("/prediction-dataset/async", post(prediction_dataset_async))
        // Tasks
        .route("/tasks", get(list_tasks))
        .route("/tasks/:id", get(get_task))
        // Replay
        .route("/replay/status", get(replay_status))
        .route("/replay/start", post(replay_start))
        .route("/replay/stop", post(replay_stop))
        .route("/replay/publish", post(replay_publish))
        .route("/replay/reload", post(replay_reload))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state)
}

// ============================================================================
// Run helpers
// ============================================================================

fn summary_body(summary: &GenerationSummary) -> ApiResult<Json<Value>> {
    let mut body = serde_json::to_value(summary).map_err(|e| ApiError::Internal(e.to_string()))?;
    if let Value::Object(map) = &mut body {
        map.insert("success".to_string(), Value::Bool(true));
        map.insert("message".to_string(), Value::String(summary.message()));
    }
    Ok(Json(body))
}

async fn run_sync(state: &AppState, request: GenerationRequest) -> ApiResult<Json<Value>> {
    match state.generator.run(&request).await {
        Ok(summary) => summary_body(&summary),
        Err(e) if e.is_precondition() => {
            warn!("{} not run: {}", request.kind(), e);
            Ok(Json(json!({ "success": false, "message": e.to_string() })))
        }
        Err(e) => Err(e.into()),
    }
}

async fn submit(state: &AppState, request: GenerationRequest) -> ApiResult<Json<Value>> {
    let kind = request.kind();
    let task_id = state.generator.submit(request).await?;
    Ok(Json(json!({
        "success": true,
        "task_id": task_id,
        "message": format!("{} task started, poll /tasks/{}", kind, task_id),
    })))
}

// ============================================================================
// Service endpoints
// ============================================================================

/// Root handler - shows a simple HTML page.
async fn root_handler() -> Html<&'static str> {
    Html(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>MockIoT</title>
    <style>
        body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; max-width: 800px; margin: 50px auto; padding: 20px; }
        h1 { color: #2c3e50; }
        .endpoints { background: #f8f9fa; padding: 20px; border-radius: 8px; margin: 20px 0; }
        code { background: #e9ecef; padding: 2px 6px; border-radius: 4px; }
    </style>
</head>
<body>
    <h1>MockIoT</h1>
    <p>Synthetic telemetry for carbon-monitoring and logistics sites.</p>

    <div class="endpoints">
        <h2>Scenarios</h2>
        <div><code>POST /scenarios/vehicle-entry?count=</code></div>
        <div><code>POST /scenarios/loading?duration=&amp;interval=</code> (and <code>/async</code>)</div>
        <div><code>POST /scenarios/carbon-peak</code>, <code>POST /scenarios/carbon-reduction</code></div>
        <div><code>POST /patterns/workday-peak</code>, <code>POST /patterns/night</code></div>
        <h2>Time series</h2>
        <div><code>POST /time-series?days=&amp;interval=&amp;trend=&amp;seasonality=&amp;noise=&amp;outliers=</code> (and <code>/async</code>)</div>
        <div><code>POST /prediction-dataset?days=&amp;interval=&amp;include_factors=</code> (and <code>/async</code>)</div>
        <h2>Tasks</h2>
        <div><code>GET /tasks</code>, <code>GET /tasks/:id</code></div>
        <h2>Replay</h2>
        <div><code>GET /replay/status</code>, <code>POST /replay/start</code>, <code>POST /replay/stop</code>, <code>POST /replay/publish</code>, <code>POST /replay/reload</code></div>
        <h2>Service</h2>
        <div><a href="/metrics">/metrics</a>, <a href="/health">/health</a>, <a href="/ready">/ready</a>, <a href="/status">/status</a></div>
    </div>
</body>
</html>"#,
    )
}

/// Metrics handler - returns Prometheus text format.
async fn metrics_handler(State(state): State<Arc<AppState>>) -> ApiResult<impl IntoResponse> {
    set_active_tasks(state.generator.registry().active().await);
    let metrics = encode_metrics().map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok((
        StatusCode::OK,
        [("Content-Type", "text/plain; charset=utf-8")],
        metrics,
    ))
}

async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn ready_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if state.device_count == 0 {
        return (StatusCode::SERVICE_UNAVAILABLE, "No devices");
    }
    (StatusCode::OK, "Ready")
}

#[derive(Serialize)]
struct StatusResponse {
    version: String,
    uptime_secs: u64,
    devices: usize,
    tasks: TaskCounts,
    replay: ReplayStatus,
}

#[derive(Serialize)]
struct TaskCounts {
    retained: usize,
    active: usize,
}

async fn status_handler(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let registry = state.generator.registry();
    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        devices: state.device_count,
        tasks: TaskCounts {
            retained: registry.len().await,
            active: registry.active().await,
        },
        replay: state.replay.status().await,
    })
}

// ============================================================================
// Scenarios
// ============================================================================

async fn vehicle_entry(
    State(state): State<Arc<AppState>>,
    Query(query): Query<VehicleEntryQuery>,
) -> ApiResult<Json<Value>> {
    let config = query.into_config()?;
    run_sync(&state, GenerationRequest::VehicleEntry(config)).await
}

async fn loading(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LoadingQuery>,
) -> ApiResult<Json<Value>> {
    let config = query.into_config()?;
    run_sync(&state, GenerationRequest::LoadingScenario(config)).await
}

async fn loading_async(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LoadingQuery>,
) -> ApiResult<Json<Value>> {
    let config = query.into_config()?;
    submit(&state, GenerationRequest::LoadingScenario(config)).await
}

async fn carbon_peak(State(state): State<Arc<AppState>>) -> ApiResult<Json<Value>> {
    run_sync(&state, GenerationRequest::CarbonPeak { seed: None }).await
}

async fn carbon_reduction(State(state): State<Arc<AppState>>) -> ApiResult<Json<Value>> {
    run_sync(&state, GenerationRequest::CarbonReduction { seed: None }).await
}

async fn workday_peak(State(state): State<Arc<AppState>>) -> ApiResult<Json<Value>> {
    let request = GenerationRequest::TimePattern {
        pattern: TimePattern::WorkdayPeak,
        seed: None,
    };
    run_sync(&state, request).await
}

async fn night(State(state): State<Arc<AppState>>) -> ApiResult<Json<Value>> {
    let request = GenerationRequest::TimePattern {
        pattern: TimePattern::Night,
        seed: None,
    };
    run_sync(&state, request).await
}

// ============================================================================
// Time series
// ============================================================================

async fn time_series(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TimeSeriesQuery>,
) -> ApiResult<Json<Value>> {
    let config = query.into_config(Utc::now())?;
    run_sync(&state, GenerationRequest::TimeSeries(config)).await
}

async fn time_series_async(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TimeSeriesQuery>,
) -> ApiResult<Json<Value>> {
    let config = query.into_config(Utc::now())?;
    submit(&state, GenerationRequest::TimeSeries(config)).await
}

async fn prediction_dataset(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PredictionQuery>,
) -> ApiResult<Json<Value>> {
    let config = query.into_config(Utc::now())?;
    run_sync(&state, GenerationRequest::PredictionDataset(config)).await
}

async fn prediction_dataset_async(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PredictionQuery>,
) -> ApiResult<Json<Value>> {
    let config = query.into_config(Utc::now())?;
    submit(&state, GenerationRequest::PredictionDataset(config)).await
}

// ============================================================================
// Tasks
// ============================================================================

async fn list_tasks(State(state): State<Arc<AppState>>) -> Json<Vec<GenerationTask>> {
    Json(state.generator.tasks().await)
}

async fn get_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<GenerationTask>> {
    let id: TaskId = id.parse()?;
    Ok(Json(state.generator.status(id).await?))
}

// ============================================================================
// Replay
// ============================================================================

async fn replay_status(State(state): State<Arc<AppState>>) -> Json<ReplayStatus> {
    Json(state.replay.status().await)
}

async fn replay_start(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ReplayQuery>,
) -> ApiResult<Json<Value>> {
    let config = query.into_config(&state.replay.config().await)?;
    let status = state.replay.start(config).await;
    Ok(Json(json!({
        "success": true,
        "status": "started",
        "message": format!(
            "Publishing {} row(s) every {}ms",
            config.devices_per_interval, config.interval_ms
        ),
        "replay": status,
    })))
}

async fn replay_stop(State(state): State<Arc<AppState>>) -> Json<Value> {
    let (status, message) = if state.replay.stop().await {
        ("stopped", "Replay stopped")
    } else {
        ("idle", "Replay was not running")
    };
    Json(json!({ "success": true, "status": status, "message": message }))
}

async fn replay_publish(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PublishQuery>,
) -> ApiResult<Json<Value>> {
    let (count, interval) = query.parse()?;
    let scheduled = state.replay.publish(count, interval).await?;
    Ok(Json(json!({
        "success": true,
        "count": scheduled,
        "message": format!("Scheduled {} row(s), {}ms apart", scheduled, interval),
    })))
}

async fn replay_reload(State(state): State<Arc<AppState>>) -> ApiResult<Json<Value>> {
    let rows = state.replay.reload().await?;
    Ok(Json(json!({ "success": true, "total_rows": rows })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use mockiot::{generate_fleet, DeviceType, InMemoryCatalog, InstantPacer, MemorySink};
    use std::time::Duration;
    use tower::ServiceExt;

    fn app(fleet: &[(DeviceType, u32)]) -> (Router, Arc<MemorySink>) {
        let devices = generate_fleet(fleet);
        let count = devices.len();
        let catalog = Arc::new(InMemoryCatalog::with_devices(devices));
        let sink = Arc::new(MemorySink::new());
        let generator = Generator::builder(catalog.clone(), sink.clone())
            .pacer(Arc::new(InstantPacer::new()))
            .build();
        let replay = Arc::new(ReplayEngine::new(
            "/nonexistent/replay.csv",
            catalog,
            sink.clone(),
        ));
        let state = Arc::new(AppState::new(generator, replay, count));
        (router(state), sink)
    }

    async fn call(app: &Router, method: &str, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _) = app(&[]);
        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_ready_needs_devices() {
        let (empty, _) = app(&[]);
        let request = Request::builder().uri("/ready").body(Body::empty()).unwrap();
        let response = empty.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_time_series_sync() {
        let (app, sink) = app(&[(DeviceType::CarbonSensor, 2)]);
        let (status, body) = call(&app, "POST", "/time-series?days=1&interval=60").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["kind"], "time_series");
        assert_eq!(body["count"], 48);
        assert_eq!(body["time_series"].as_array().unwrap().len(), 10);
        assert_eq!(sink.total(), 48);
    }

    #[tokio::test]
    async fn test_bad_parameter_is_400() {
        let (app, sink) = app(&[(DeviceType::CarbonSensor, 1)]);

        for uri in [
            "/time-series?days=0",
            "/time-series/async?interval=abc",
            "/prediction-dataset?days=400",
            "/scenarios/loading?duration=10&interval=0",
            "/scenarios/vehicle-entry?count=101",
        ] {
            let (status, body) = call(&app, "POST", uri).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
            assert_eq!(body["success"], false);
        }

        let (_, tasks) = call(&app, "GET", "/tasks").await;
        assert_eq!(tasks.as_array().unwrap().len(), 0);
        assert_eq!(sink.total(), 0);
    }

    #[tokio::test]
    async fn test_missing_devices_is_unsuccessful() {
        let (app, _) = app(&[(DeviceType::CarbonSensor, 1)]);
        let (status, body) = call(&app, "POST", "/scenarios/loading?duration=10&interval=5").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], false);
        assert!(body["message"].as_str().unwrap().contains("loading"));
    }

    #[tokio::test]
    async fn test_async_task_roundtrip() {
        let (app, _) = app(&[(DeviceType::Loader, 1)]);
        let (status, body) =
            call(&app, "POST", "/scenarios/loading/async?duration=10&interval=5").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        let task_id = body["task_id"].as_str().unwrap().to_string();

        let mut task = Value::Null;
        for _ in 0..200 {
            let (status, body) = call(&app, "GET", &format!("/tasks/{}", task_id)).await;
            assert_eq!(status, StatusCode::OK);
            if body["status"] == "completed" || body["status"] == "failed" {
                task = body;
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        assert_eq!(task["status"], "completed");
        assert_eq!(task["progress"], 100);
        assert_eq!(task["result"]["iterations"], 2);

        let (_, tasks) = call(&app, "GET", "/tasks").await;
        assert_eq!(tasks.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_task_is_404() {
        let (app, _) = app(&[]);
        let (status, _) = call(&app, "GET", "/tasks/not-a-task").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = call(&app, "GET", &format!("/tasks/{}", TaskId::new())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_snapshot_endpoints() {
        let (app, _) = app(&[(DeviceType::Hvac, 1), (DeviceType::Lighting, 2)]);

        let (_, body) = call(&app, "POST", "/patterns/night").await;
        assert_eq!(body["success"], true);
        assert_eq!(body["scenario"], "night");
        assert_eq!(body["device_count"], 3);

        let (_, body) = call(&app, "POST", "/scenarios/carbon-peak").await;
        assert_eq!(body["success"], true);
        assert_eq!(body["samples_count"], 1);
    }

    #[tokio::test]
    async fn test_replay_without_dataset() {
        let (app, _) = app(&[(DeviceType::CarbonSensor, 1)]);

        let (status, body) = call(&app, "POST", "/replay/publish?count=3&interval=0").await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["success"], false);

        let (status, body) = call(&app, "POST", "/replay/stop").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "idle");

        let (_, body) = call(&app, "GET", "/replay/status").await;
        assert_eq!(body["active"], false);
        assert_eq!(body["total_rows"], 0);
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let (app, _) = app(&[(DeviceType::CarbonSensor, 1)]);
        call(&app, "POST", "/time-series?days=1").await;

        let request = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("mockiot_tasks_active"));
    }
}
