mod common;

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use anisync::scrapers::Scraper;
use anisync::services::ScrapeJob;
use common::{FAKE_SITE, FakeCatalog, FakeSite, media, offline_config, spawn_state};

#[tokio::test]
async fn test_scrape_creates_episodes_and_sources() {
    let site = FakeSite::new(vec![1.0, 2.0, 2.5]);
    let (state, _worker) = spawn_state(
        offline_config(),
        FakeCatalog::with(vec![media(101, "Sample Show", 3)]),
        vec![Arc::clone(&site) as Arc<dyn Scraper>],
    )
    .await;

    let anime_id = state.information.fetch_specific(101, false).await.unwrap();
    let before = state.store.get_anime(&anime_id).await.unwrap().unwrap();
    assert_eq!(before.current_episode, 3);
    assert!(before.last_episode_update.is_none());

    let updates = state
        .processor
        .process(&ScrapeJob::new(vec![anime_id.clone()], false))
        .await
        .unwrap();
    assert_eq!(updates.len(), 2);
    assert!(updates.iter().all(|u| u.website == "FakeSite"));

    let episodes = state.store.list_episodes(&anime_id).await.unwrap();
    let numbers: Vec<i32> = episodes.iter().map(|e| e.number).collect();
    assert_eq!(numbers, vec![1, 2]);

    for episode in &episodes {
        let sources = state.store.list_sources_for_episode(&episode.id).await.unwrap();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].website_id, FAKE_SITE);
        assert_eq!(sources[0].source_type, "PROXY");
    }

    let after = state.store.get_anime(&anime_id).await.unwrap().unwrap();
    assert!(after.last_episode_update.is_some());
    assert!(after.last_check_map().contains_key(FAKE_SITE));
}

#[tokio::test]
async fn test_rescrape_is_idempotent() {
    let site = FakeSite::new(vec![1.0, 2.0]);
    let (state, _worker) = spawn_state(
        offline_config(),
        FakeCatalog::with(vec![media(102, "Idempotent Show", 3)]),
        vec![Arc::clone(&site) as Arc<dyn Scraper>],
    )
    .await;

    let anime_id = state.information.fetch_specific(102, false).await.unwrap();
    let job = ScrapeJob::new(vec![anime_id.clone()], false);

    let first = state.processor.process(&job).await.unwrap();
    assert_eq!(first.len(), 2);
    let stamped = state
        .store
        .get_anime(&anime_id)
        .await
        .unwrap()
        .unwrap()
        .last_episode_update;

    let second = state.processor.process(&job).await.unwrap();
    assert!(second.is_empty());

    assert_eq!(state.store.count_episodes().await.unwrap(), 2);
    assert_eq!(state.store.count_sources().await.unwrap(), 2);

    // No new source, so the update stamp stays put.
    let after = state.store.get_anime(&anime_id).await.unwrap().unwrap();
    assert_eq!(after.last_episode_update, stamped);
}

#[tokio::test]
async fn test_fetch_excludes_already_sourced_numbers() {
    let site = FakeSite::new(vec![1.0, 2.0, 3.0, 5.0]);
    let (state, _worker) = spawn_state(
        offline_config(),
        FakeCatalog::with(vec![media(103, "Gappy Show", 10)]),
        vec![Arc::clone(&site) as Arc<dyn Scraper>],
    )
    .await;

    let anime_id = state.information.fetch_specific(103, false).await.unwrap();
    let job = ScrapeJob::new(vec![anime_id], false);

    state.processor.process(&job).await.unwrap();
    state.processor.process(&job).await.unwrap();

    let calls = site.calls();
    assert_eq!(calls.len(), 2);
    assert!(calls[0].excluded.is_empty());
    assert_eq!((calls[1].start, calls[1].end), (0, 10));
    assert_eq!(calls[1].excluded, BTreeSet::from([1, 2, 3, 5]));
}

#[tokio::test]
async fn test_listing_longer_than_aired_is_rejected() {
    let site = FakeSite::unfiltered(vec![1.0, 2.0, 3.0]);
    let (state, _worker) = spawn_state(
        offline_config(),
        FakeCatalog::with(vec![media(104, "Spoiler Show", 2)]),
        vec![Arc::clone(&site) as Arc<dyn Scraper>],
    )
    .await;

    let anime_id = state.information.fetch_specific(104, false).await.unwrap();
    let updates = state
        .processor
        .process(&ScrapeJob::new(vec![anime_id.clone()], false))
        .await
        .unwrap();

    assert!(updates.is_empty());
    assert_eq!(state.store.count_episodes_for_anime(&anime_id).await.unwrap(), 0);
}

#[tokio::test]
async fn test_missing_anime_does_not_fail_the_job() {
    let site = FakeSite::new(vec![1.0]);
    let (state, _worker) = spawn_state(
        offline_config(),
        FakeCatalog::with(vec![media(105, "Only Show", 1)]),
        vec![Arc::clone(&site) as Arc<dyn Scraper>],
    )
    .await;

    let anime_id = state.information.fetch_specific(105, false).await.unwrap();
    let updates = state
        .processor
        .process(&ScrapeJob::new(
            vec!["does-not-exist".to_string(), anime_id],
            false,
        ))
        .await
        .unwrap();

    assert_eq!(updates.len(), 1);
}

#[tokio::test]
async fn test_failing_plugin_does_not_block_others() {
    let broken = Arc::new(FakeSite {
        failing: true,
        ..FakeSite::site("brokensite", "BrokenSite", vec![1.0, 2.0])
    });
    let site = FakeSite::new(vec![1.0, 2.0]);
    let (state, _worker) = spawn_state(
        offline_config(),
        FakeCatalog::with(vec![media(106, "Resilient Show", 2)]),
        vec![
            Arc::clone(&broken) as Arc<dyn Scraper>,
            Arc::clone(&site) as Arc<dyn Scraper>,
        ],
    )
    .await;

    let anime_id = state.information.fetch_specific(106, false).await.unwrap();
    let updates = state
        .processor
        .process(&ScrapeJob::new(vec![anime_id.clone()], false))
        .await
        .unwrap();

    assert_eq!(broken.calls().len(), 1);
    assert_eq!(updates.len(), 2);
    assert!(updates.iter().all(|u| u.website == "FakeSite"));
    assert_eq!(state.store.count_sources().await.unwrap(), 2);

    let checks = state.store.get_anime(&anime_id).await.unwrap().unwrap().last_check_map();
    assert!(checks.contains_key(FAKE_SITE));
    assert!(!checks.contains_key("brokensite"));
}

#[tokio::test]
async fn test_info_only_job_skips_playable_plugins() {
    let info = Arc::new(FakeSite {
        info_only: true,
        title_prefix: "Chapter",
        ..FakeSite::site("infosite", "InfoSite", vec![1.0, 2.0])
    });
    let site = FakeSite::new(vec![1.0, 2.0]);
    let (state, _worker) = spawn_state(
        offline_config(),
        FakeCatalog::with(vec![media(107, "Listed Show", 2)]),
        vec![
            Arc::clone(&site) as Arc<dyn Scraper>,
            Arc::clone(&info) as Arc<dyn Scraper>,
        ],
    )
    .await;

    let anime_id = state.information.fetch_specific(107, false).await.unwrap();
    let updates = state
        .processor
        .process(&ScrapeJob::new(vec![anime_id.clone()], true))
        .await
        .unwrap();

    assert!(updates.is_empty());
    assert!(site.calls().is_empty());
    assert_eq!(info.calls().len(), 1);
    assert_eq!(state.store.count_sources().await.unwrap(), 0);

    let titles: Vec<Option<String>> = state
        .store
        .list_episodes(&anime_id)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.title)
        .collect();
    assert_eq!(
        titles,
        vec![Some("Chapter 1".to_string()), Some("Chapter 2".to_string())]
    );
}

#[tokio::test]
async fn test_scrape_only_fills_missing_titles() {
    let site = FakeSite::new(vec![1.0, 2.0]);
    let (state, _worker) = spawn_state(
        offline_config(),
        FakeCatalog::with(vec![media(108, "Titled Show", 2)]),
        vec![Arc::clone(&site) as Arc<dyn Scraper>],
    )
    .await;

    let anime_id = state.information.fetch_specific(108, false).await.unwrap();
    state
        .store
        .find_or_create_episode(&anime_id, 1, Some("The Beginning"))
        .await
        .unwrap();
    state
        .store
        .find_or_create_episode(&anime_id, 2, None)
        .await
        .unwrap();

    state
        .processor
        .process(&ScrapeJob::new(vec![anime_id.clone()], false))
        .await
        .unwrap();

    let episodes = state.store.list_episodes(&anime_id).await.unwrap();
    assert_eq!(episodes.len(), 2);
    assert_eq!(episodes[0].title.as_deref(), Some("The Beginning"));
    assert_eq!(episodes[1].title.as_deref(), Some("Episode 2"));
}

#[tokio::test]
async fn test_progress_merges_check_times() {
    let (state, _worker) = spawn_state(
        offline_config(),
        FakeCatalog::with(vec![media(109, "Shared Show", 1)]),
        vec![],
    )
    .await;
    let anime_id = state.information.fetch_specific(109, false).await.unwrap();

    let first = HashMap::from([("alpha".to_string(), "2026-01-01T00:00:00.000000Z".to_string())]);
    let second = HashMap::from([("beta".to_string(), "2026-01-02T00:00:00.000000Z".to_string())]);

    state
        .store
        .record_scrape_progress(&anime_id, &first, Some("2026-01-01T00:00:00.000000Z"))
        .await
        .unwrap();
    state
        .store
        .record_scrape_progress(&anime_id, &second, None)
        .await
        .unwrap();

    let anime = state.store.get_anime(&anime_id).await.unwrap().unwrap();
    let checks = anime.last_check_map();
    assert_eq!(checks.get("alpha").map(String::as_str), Some("2026-01-01T00:00:00.000000Z"));
    assert_eq!(checks.get("beta").map(String::as_str), Some("2026-01-02T00:00:00.000000Z"));
    assert_eq!(
        anime.last_episode_update.as_deref(),
        Some("2026-01-01T00:00:00.000000Z")
    );
}
