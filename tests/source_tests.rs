mod common;

use std::collections::HashMap;
use std::sync::Arc;

use anisync::db::NewSource;
use anisync::error::SourceError;
use anisync::models::{RawSource, ResolvedSource, SourceType};
use anisync::scrapers::Scraper;
use anisync::services::source::cache_key;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
    routing::get,
};
use common::{FakeCatalog, FakeSite, media, offline_config, spawn_state};
use tower::ServiceExt;

/// Serves `/live` with 200 and `/dead` with 404, for HEAD and GET alike.
async fn spawn_cdn() -> String {
    let app = Router::new()
        .route("/live", get(|| async { StatusCode::OK }))
        .route("/dead", get(|| async { StatusCode::NOT_FOUND }));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

async fn direct_source(state: &anisync::state::SharedState, target: &str) -> String {
    state
        .store
        .upsert_website(&anisync::entities::websites::Model {
            id: "directsite".to_string(),
            name: "DirectSite".to_string(),
            url: "https://direct.example".to_string(),
            locale: "en_US".to_string(),
            priority: 2,
        })
        .await
        .unwrap();

    let anime_id = state.information.fetch_specific(301, false).await.unwrap();
    let (episode, _) = state
        .store
        .find_or_create_episode(&anime_id, 1, None)
        .await
        .unwrap();

    state
        .store
        .create_source_if_absent(&NewSource {
            episode_id: episode.id,
            website_id: "directsite".to_string(),
            source_type: SourceType::Direct,
            target: target.to_string(),
            resolution: None,
            format: None,
            referer: None,
        })
        .await
        .unwrap()
        .expect("source created")
        .id
}

#[tokio::test]
async fn test_direct_source_resolves_to_target() {
    let cdn = spawn_cdn().await;
    let (state, _worker) = spawn_state(
        offline_config(),
        FakeCatalog::with(vec![media(301, "Direct Show", 1)]),
        vec![],
    )
    .await;

    let id = direct_source(&state, &format!("{cdn}/live")).await;
    let resolved = state.sources.get_source(&id).await.unwrap();

    assert_eq!(resolved.url, format!("{cdn}/live"));
    assert_eq!(resolved.website, "DirectSite");
    assert_eq!(resolved.priority, 2);
    assert!(state.store.cache_get(&cache_key(&id)).await.unwrap().is_some());
}

#[tokio::test]
async fn test_stale_cached_url_is_evicted() {
    let cdn = spawn_cdn().await;
    let (state, _worker) = spawn_state(
        offline_config(),
        FakeCatalog::with(vec![media(301, "Direct Show", 1)]),
        vec![],
    )
    .await;

    let id = direct_source(&state, &format!("{cdn}/live")).await;

    let stale = ResolvedSource {
        id: id.clone(),
        url: format!("{cdn}/dead"),
        subtitle: None,
        referer: None,
        headers: HashMap::new(),
        priority: 2,
        browser: false,
        website: "DirectSite".to_string(),
    };
    state
        .store
        .cache_set(
            &cache_key(&id),
            &serde_json::to_string(&stale).unwrap(),
            chrono::Duration::hours(1),
        )
        .await
        .unwrap();

    let resolved = state.sources.get_source(&id).await.unwrap();
    assert_eq!(resolved.url, format!("{cdn}/live"));

    let cached: ResolvedSource =
        serde_json::from_str(&state.store.cache_get(&cache_key(&id)).await.unwrap().unwrap())
            .unwrap();
    assert_eq!(cached.url, format!("{cdn}/live"));
}

#[tokio::test]
async fn test_live_cached_url_is_served() {
    let cdn = spawn_cdn().await;
    let (state, _worker) = spawn_state(
        offline_config(),
        FakeCatalog::with(vec![media(301, "Direct Show", 1)]),
        vec![],
    )
    .await;

    let id = direct_source(&state, &format!("{cdn}/dead")).await;

    let cached = ResolvedSource {
        id: id.clone(),
        url: format!("{cdn}/live"),
        subtitle: Some("https://subs.example/en.vtt".to_string()),
        referer: None,
        headers: HashMap::new(),
        priority: 2,
        browser: false,
        website: "DirectSite".to_string(),
    };
    state
        .store
        .cache_set(
            &cache_key(&id),
            &serde_json::to_string(&cached).unwrap(),
            chrono::Duration::hours(1),
        )
        .await
        .unwrap();

    let resolved = state.sources.get_source(&id).await.unwrap();
    assert_eq!(resolved, cached);
}

#[tokio::test]
async fn test_unknown_source_is_not_found() {
    let (state, _worker) = spawn_state(offline_config(), FakeCatalog::default(), vec![]).await;

    let err = state.sources.get_source("missing").await.unwrap_err();
    assert!(matches!(err, SourceError::NotFound(_)));
}

const PROXY_SITE: &str = "proxysite";

fn raw(video: &str) -> RawSource {
    RawSource {
        video: video.to_string(),
        referer: Some("https://embed.example/".to_string()),
        ..RawSource::default()
    }
}

async fn proxy_state(site: FakeSite) -> (anisync::state::SharedState, String) {
    let (state, _worker) = spawn_state(
        offline_config(),
        FakeCatalog::with(vec![media(302, "Proxy Show", 1)]),
        vec![Arc::new(site) as Arc<dyn Scraper>],
    )
    .await;

    let anime_id = state.information.fetch_specific(302, false).await.unwrap();
    let (episode, _) = state
        .store
        .find_or_create_episode(&anime_id, 1, None)
        .await
        .unwrap();
    let id = state
        .store
        .create_source_if_absent(&NewSource {
            episode_id: episode.id,
            website_id: PROXY_SITE.to_string(),
            source_type: SourceType::Proxy,
            target: "/watch/proxy-show-episode-1".to_string(),
            resolution: None,
            format: None,
            referer: None,
        })
        .await
        .unwrap()
        .expect("source created")
        .id;
    (state, id)
}

fn proxy_site() -> FakeSite {
    FakeSite::site(PROXY_SITE, "ProxySite", vec![])
}

#[tokio::test]
async fn test_proxy_source_uses_extractor() {
    let (state, id) = proxy_state(FakeSite {
        raw: Some(raw("https://cdn.example/extracted.m3u8")),
        consumet: Some(raw("https://cdn.example/consumet.m3u8")),
        ..proxy_site()
    })
    .await;

    let resolved = state.sources.get_source(&id).await.unwrap();
    assert_eq!(resolved.url, "https://cdn.example/extracted.m3u8");
    assert_eq!(resolved.referer.as_deref(), Some("https://embed.example/"));
    assert_eq!(resolved.website, "ProxySite");
}

#[tokio::test]
async fn test_failed_extraction_falls_back_to_consumet() {
    let (state, id) = proxy_state(FakeSite {
        consumet: Some(raw("https://cdn.example/fallback.m3u8")),
        ..proxy_site()
    })
    .await;

    let resolved = state.sources.get_source(&id).await.unwrap();
    assert_eq!(resolved.url, "https://cdn.example/fallback.m3u8");
}

#[tokio::test]
async fn test_unresolvable_source_is_bad_gateway() {
    let (state, id) = proxy_state(proxy_site()).await;

    let err = state.sources.get_source(&id).await.unwrap_err();
    assert!(matches!(err, SourceError::HardResolutionFailure(_)));
    assert!(state.store.cache_get(&cache_key(&id)).await.unwrap().is_none());

    let app = anisync::api::router(anisync::api::create_app_state(Arc::new(state), None)).await;
    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/source/{id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}
