use axum::{
    Json,
    extract::{Path, State},
};
use std::sync::Arc;

use super::{
    ApiError, ApiResponse, AppState, EnqueueResponse, FetchResponse, ResyncRequest, ScrapeRequest,
};
use crate::services::queue::priority;
use crate::services::scheduler::run_logged;
use crate::services::{JobKind, ScheduledTask, ScrapeJob};

/// `POST /admin/fetch/{anilist_id}`
///
/// Imports the catalog entry right away, then queues its scrape at manual priority.
pub async fn fetch_anime(
    State(state): State<Arc<AppState>>,
    Path(anilist_id): Path<i32>,
) -> Result<Json<ApiResponse<FetchResponse>>, ApiError> {
    if anilist_id <= 0 {
        return Err(ApiError::validation("AniList id must be positive"));
    }

    let anime_id = state
        .shared
        .information
        .fetch_specific(anilist_id, true)
        .await?;

    let enqueued = state
        .shared
        .queue
        .enqueue(
            JobKind::Scrape,
            &ScrapeJob::new(vec![anime_id.clone()], false),
            priority::MANUAL,
        )
        .await?;

    Ok(Json(ApiResponse::success(FetchResponse {
        anime_id,
        job_id: enqueued.id,
    })))
}

pub async fn trigger_refetch(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<String>>, ApiError> {
    spawn_task(&state, ScheduledTask::Refetch);
    Ok(Json(ApiResponse::success("Refetch started".to_string())))
}

/// `POST /admin/resync`, optionally narrowed to `{"ids": [...]}`.
pub async fn trigger_resync(
    State(state): State<Arc<AppState>>,
    body: Option<Json<ResyncRequest>>,
) -> Result<Json<ApiResponse<String>>, ApiError> {
    let ids = body.and_then(|Json(req)| req.ids);

    match ids {
        None => spawn_task(&state, ScheduledTask::Resync),
        Some(ids) if ids.is_empty() => {
            return Err(ApiError::validation("ids must not be empty"));
        }
        Some(ids) => {
            let information = state.shared.information.clone();
            tokio::spawn(async move {
                if let Err(e) = information.resync(Some(ids)).await {
                    tracing::error!(error = %e, "Manual resync failed");
                }
            });
        }
    }

    Ok(Json(ApiResponse::success("Resync started".to_string())))
}

pub async fn enqueue_scrape(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ScrapeRequest>,
) -> Result<Json<ApiResponse<EnqueueResponse>>, ApiError> {
    if req.anime_ids.is_empty() {
        return Err(ApiError::validation("animeIds must not be empty"));
    }

    let batch_size = state.config().read().await.scheduler.batch_size;
    let jobs = state
        .shared
        .queue
        .enqueue_batched(
            JobKind::Scrape,
            &req.anime_ids,
            req.info_only,
            priority::MANUAL,
            batch_size,
        )
        .await?;

    Ok(Json(ApiResponse::success(EnqueueResponse { jobs })))
}

fn spawn_task(state: &AppState, task: ScheduledTask) {
    let dispatcher = state.shared.dispatcher.clone();
    tokio::spawn(async move {
        run_logged(&dispatcher, task).await;
    });
}
