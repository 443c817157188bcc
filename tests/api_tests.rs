mod common;

use std::sync::Arc;

use anisync::scrapers::Scraper;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use common::{FakeCatalog, FakeSite, media, offline_config, spawn_state};
use http_body_util::BodyExt;
use tower::ServiceExt;

const ADMIN_KEY: &str = "test-admin-key";

async fn spawn_app() -> (Router, anisync::state::SharedState) {
    let mut config = offline_config();
    config.server.admin_key = ADMIN_KEY.to_string();

    let (state, _worker) = spawn_state(
        config,
        FakeCatalog::with(vec![media(401, "Api Show", 2)]),
        vec![FakeSite::new(vec![1.0, 2.0]) as Arc<dyn Scraper>],
    )
    .await;

    let app_state = anisync::api::create_app_state(Arc::new(state.clone()), None);
    (anisync::api::router(app_state).await, state)
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health_and_stats() {
    let (app, _state) = spawn_app().await;

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["database"], true);

    let response = app
        .oneshot(Request::builder().uri("/stats").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["data"]["anime"], 0);
    assert_eq!(json["data"]["websites"], 1);
}

#[tokio::test]
async fn test_admin_routes_require_key() {
    let (app, _state) = spawn_app().await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/admin/refetch")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/admin/refetch")
                .header("X-Admin-Key", "wrong")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_fetch_imports_and_queues() {
    let (app, state) = spawn_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/admin/fetch/401")
                .header("X-Admin-Key", ADMIN_KEY)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    let anime_id = json["data"]["anime_id"].as_str().unwrap().to_string();
    assert!(state.store.get_anime(&anime_id).await.unwrap().is_some());

    let pending = state.store.list_pending_jobs().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].priority, anisync::services::queue::priority::MANUAL);
}

#[tokio::test]
async fn test_admin_fetch_unknown_anime_is_not_found() {
    let (app, _state) = spawn_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/admin/fetch/999")
                .header("X-Admin-Key", ADMIN_KEY)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_admin_scrape_enqueues_batches() {
    let (app, state) = spawn_app().await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/admin/scrape")
                .header("X-Admin-Key", ADMIN_KEY)
                .header("Content-Type", "application/json")
                .body(Body::from(r#"{"animeIds": ["a", "b"], "infoOnly": true}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(state.queue.counts().await.unwrap().pending, 1);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/admin/scrape")
                .header("X-Admin-Key", ADMIN_KEY)
                .header("Content-Type", "application/json")
                .body(Body::from(r#"{"animeIds": []}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_source_returns_404() {
    let (app, _state) = spawn_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/source/nope")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_json(response).await;
    assert_eq!(json["success"], false);
}
