use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use super::{ApiError, ApiResponse, AppState, HealthResponse, QueueDto, StatsDto};
use crate::models::ResolvedSource;

/// `GET /health`
///
/// 503 when the database does not answer.
pub async fn health(State(state): State<Arc<AppState>>) -> Response {
    let database = state.store().ping().await.is_ok();
    let body = HealthResponse {
        status: if database { "ok" } else { "degraded" },
        database,
        uptime_secs: state.start_time.elapsed().as_secs(),
    };

    let status = if database {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(ApiResponse::success(body))).into_response()
}

/// `GET /stats`
pub async fn get_stats(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<StatsDto>>, ApiError> {
    let store = state.store();
    let counts = state.shared.queue.counts().await?;

    Ok(Json(ApiResponse::success(StatsDto {
        anime: store.count_anime().await?,
        episodes: store.count_episodes().await?,
        sources: store.count_sources().await?,
        websites: state.shared.registry.enabled().len(),
        queue: QueueDto {
            pending: counts.pending,
            running: counts.running,
            failed: counts.failed,
        },
        version: env!("CARGO_PKG_VERSION"),
    })))
}

/// `GET /source/{id}`
pub async fn get_source(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<ResolvedSource>>, ApiError> {
    let source = state.shared.sources.get_source(&id).await?;
    Ok(Json(ApiResponse::success(source)))
}
