//! HTTP surface over the fallback orchestrator.
//!
//! Read endpoints always answer 200 with the best tier available; only
//! malformed parameters produce 400.

use std::{convert::Infallible, sync::Arc};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::get,
    Json, Router,
};
use futures::{Stream, StreamExt};
use netpulse_network::RealtimeServer;
use netpulse_orchestrator::MetricsOptions;
use netpulse_types::{
    metrics::{MetricSnapshot, MetricSummary},
    query::{HistoryRequest, HistoryWindow},
    validation_error, NetpulseError,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::Dashboard;

type AppState = Arc<Dashboard>;

pub fn router(dashboard: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/metrics", get(current_metrics).post(record_metrics))
        .route("/api/metrics/summary", get(summary))
        .route("/api/metrics/activity", get(activity))
        .route("/api/history", get(history))
        .route("/api/interfaces/:name/history", get(interface_history))
        .route("/api/events", get(events))
        .layer(TraceLayer::new_for_http())
        .with_state(dashboard)
}

struct ApiError(NetpulseError);

impl From<NetpulseError> for ApiError {
    fn from(err: NetpulseError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = if self.0.is_validation() {
            StatusCode::BAD_REQUEST
        } else {
            error!(error = %self.0, "request failed");
            StatusCode::INTERNAL_SERVER_ERROR
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

#[derive(Debug, Default, Deserialize)]
struct MetricsParams {
    interface: Option<String>,
    #[serde(default)]
    skip_live: bool,
}

#[derive(Debug, Default, Deserialize)]
struct InterfaceParams {
    interface: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct WindowParams {
    interface: Option<String>,
    hours: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct DaysParams {
    days: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct ActivityParams {
    interface: Option<String>,
    limit: Option<u32>,
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn current_metrics(
    State(dashboard): State<AppState>,
    Query(params): Query<MetricsParams>,
) -> Json<MetricSnapshot> {
    let options = MetricsOptions {
        skip_live: params.skip_live,
        ..Default::default()
    };
    let interface = params.interface.unwrap_or_default();
    Json(dashboard.get_metrics(&interface, options).await)
}

/// Accepts a canonical snapshot (validated strictly) or any upstream payload
/// the normalizer understands.
async fn record_metrics(
    State(dashboard): State<AppState>,
    Query(params): Query<InterfaceParams>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, ApiError> {
    let entry = match serde_json::from_value::<MetricSnapshot>(body.clone()) {
        Ok(snapshot) => dashboard.record_metrics(snapshot).await?,
        Err(_) => {
            dashboard
                .record_payload(&body, params.interface.as_deref())
                .await?
        }
    };
    Ok((StatusCode::CREATED, Json(entry)))
}

async fn history(
    State(dashboard): State<AppState>,
    Query(request): Query<HistoryRequest>,
) -> Result<Response, ApiError> {
    let query = request.validate(dashboard.history_config(), false)?;
    let mut history = dashboard.get_history(&query).await;
    Ok(match query.metric {
        Some(kind) => Json(history.series.remove(&kind).unwrap_or_default()).into_response(),
        None => Json(history).into_response(),
    })
}

async fn interface_history(
    State(dashboard): State<AppState>,
    Path(name): Path<String>,
    Query(params): Query<DaysParams>,
) -> Result<Response, ApiError> {
    let request = HistoryRequest {
        interface: Some(name),
        days: params.days,
        ..Default::default()
    };
    let history = dashboard.history_for(&request, true).await?;
    Ok(Json(history).into_response())
}

async fn summary(
    State(dashboard): State<AppState>,
    Query(params): Query<WindowParams>,
) -> Result<Json<MetricSummary>, ApiError> {
    let config = dashboard.history_config();
    let hours = params.hours.unwrap_or(config.default_hours);
    if hours == 0 || hours > config.max_hours {
        return Err(validation_error(format!(
            "hours must be between 1 and {}",
            config.max_hours
        ))
        .into());
    }
    let interface = params.interface.unwrap_or_default();
    Ok(Json(
        dashboard
            .summary(&interface, HistoryWindow::hours(hours))
            .await,
    ))
}

async fn activity(
    State(dashboard): State<AppState>,
    Query(params): Query<ActivityParams>,
) -> Result<Json<Vec<MetricSnapshot>>, ApiError> {
    let limit = params.limit.unwrap_or(10);
    if limit == 0 || limit > 500 {
        return Err(validation_error("limit must be between 1 and 500").into());
    }
    let interface = params.interface.unwrap_or_default();
    Ok(Json(dashboard.recent_activity(&interface, limit).await))
}

async fn events(
    State(dashboard): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = dashboard.network().subscribe().filter_map(|event| async move {
        let kind = format!("{:?}", event.kind).to_lowercase();
        Event::default().event(kind).json_data(&event).ok().map(Ok)
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}
