//! HTTP handlers for the dashboard page, its JSON views and cache control.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, Redirect};
use axum::Json;
use serde::Serialize;
use shopfunnel_core::types::Event;
use tracing::error;

use crate::cache::{Kpis, RawSnapshot, SnapshotCache};
use crate::page::{self, DashboardView};

/// Shared application state for the dashboard handlers.
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<SnapshotCache>,
    pub event_sample: usize,
    pub order_sample: usize,
    pub start_time: Instant,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub cache_loaded: bool,
    pub uptime_secs: u64,
}

#[derive(Serialize)]
pub struct KpiResponse {
    #[serde(flatten)]
    pub kpis: Kpis,
    pub loaded_at: String,
}

type HandlerError = (StatusCode, Json<ErrorResponse>);

/// Fetch the cached snapshot, loading it on the blocking pool when cold.
async fn snapshot(state: &AppState) -> Result<Arc<RawSnapshot>, HandlerError> {
    let cache = state.cache.clone();
    let loaded = tokio::task::spawn_blocking(move || cache.get_or_load()).await;

    match loaded {
        Ok(Ok(snapshot)) => Ok(snapshot),
        Ok(Err(e)) => {
            error!(error = %e, dir = %state.cache.raw_dir().display(), "Failed to load raw tables");
            metrics::counter!("dashboard.load_errors").increment(1);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "raw_tables_unavailable".to_string(),
                    message: e.to_string(),
                }),
            ))
        }
        Err(e) => {
            error!(error = %e, "Raw table load task failed");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "internal_error".to_string(),
                    message: "Internal processing error".to_string(),
                }),
            ))
        }
    }
}

/// GET / - The dashboard page.
pub async fn dashboard(State(state): State<AppState>) -> Result<Html<String>, HandlerError> {
    let snapshot = snapshot(&state).await?;
    metrics::counter!("dashboard.page_views").increment(1);

    let events = snapshot.event_sample(state.event_sample, &mut rand::thread_rng());
    let view = DashboardView {
        kpis: snapshot.kpis(),
        orders: snapshot.order_head(state.order_sample),
        events: &events,
    };
    Ok(Html(page::render(&view)))
}

/// GET /api/kpis - Row counts of the cached tables.
pub async fn kpis(State(state): State<AppState>) -> Result<Json<KpiResponse>, HandlerError> {
    let snapshot = snapshot(&state).await?;
    Ok(Json(KpiResponse {
        kpis: snapshot.kpis(),
        loaded_at: snapshot.loaded_at.to_rfc3339(),
    }))
}

/// GET /api/events/sample - A fresh random event sample.
pub async fn event_sample(State(state): State<AppState>) -> Result<Json<Vec<Event>>, HandlerError> {
    let snapshot = snapshot(&state).await?;
    Ok(Json(
        snapshot.event_sample(state.event_sample, &mut rand::thread_rng()),
    ))
}

/// POST /reload - Drop the cached tables; the next request reloads them.
pub async fn reload(State(state): State<AppState>) -> Redirect {
    state.cache.invalidate();
    metrics::counter!("dashboard.reloads").increment(1);
    Redirect::to("/")
}

/// GET /health - Liveness.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        cache_loaded: state.cache.is_loaded(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}
