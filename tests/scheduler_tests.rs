mod common;

use std::sync::Arc;

use anisync::scrapers::Scraper;
use anisync::services::queue::{decode_payload, priority};
use anisync::services::{JobKind, ScheduledTask, ScrapeJob};
use anisync::state::SharedState;
use common::{
    FakeCatalog, FakeSite, finished, media, offline_config, prequel_edge, sequel_edge,
    spawn_state, with_relations,
};

/// Anime ids of pending jobs queued at `priority`, sorted.
async fn queued_at(state: &SharedState, priority: i32) -> Vec<String> {
    let mut ids: Vec<String> = state
        .store
        .list_pending_jobs()
        .await
        .unwrap()
        .iter()
        .filter(|job| job.priority == priority)
        .flat_map(|job| decode_payload(job).unwrap().anime_ids)
        .collect();
    ids.sort();
    ids
}

fn sorted(mut ids: Vec<String>) -> Vec<String> {
    ids.sort();
    ids
}

async fn anime_id(state: &SharedState, anilist_id: i32) -> String {
    state
        .store
        .get_anime_by_anilist_id(anilist_id)
        .await
        .unwrap()
        .unwrap()
        .id
}

async fn scrape(state: &SharedState, anime_id: &str) {
    state
        .processor
        .process(&ScrapeJob::new(vec![anime_id.to_string()], false))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_releasing_check_selects_under_sourced_anime() {
    let (state, _worker) = spawn_state(
        offline_config(),
        FakeCatalog::with(vec![
            media(501, "Sourced Show", 2),
            media(502, "Behind Show", 3),
            finished(503, "Old Show", 2),
        ]),
        vec![FakeSite::new(vec![1.0, 2.0]) as Arc<dyn Scraper>],
    )
    .await;

    let sourced = state.information.fetch_specific(501, false).await.unwrap();
    let behind = state.information.fetch_specific(502, false).await.unwrap();
    state.information.fetch_specific(503, false).await.unwrap();
    scrape(&state, &sourced).await;

    let jobs = state.dispatcher.run(ScheduledTask::ReleasingCheck).await.unwrap();
    assert_eq!(jobs, 1);
    assert_eq!(queued_at(&state, priority::RELEASING_CHECK).await, vec![behind]);
}

#[tokio::test]
async fn test_finished_selections() {
    let (state, _worker) = spawn_state(
        offline_config(),
        FakeCatalog::with(vec![
            finished(511, "Never Scraped", 2),
            finished(512, "Scraped Once", 2),
            media(513, "Still Airing", 1),
        ]),
        vec![FakeSite::new(vec![1.0, 2.0]) as Arc<dyn Scraper>],
    )
    .await;

    let never = state.information.fetch_specific(511, false).await.unwrap();
    let scraped = state.information.fetch_specific(512, false).await.unwrap();
    state.information.fetch_specific(513, false).await.unwrap();
    scrape(&state, &scraped).await;

    state
        .dispatcher
        .run(ScheduledTask::UnscrapedFinished)
        .await
        .unwrap();
    assert_eq!(
        queued_at(&state, priority::UNSCRAPED_FINISHED).await,
        vec![never.clone()]
    );

    state.dispatcher.run(ScheduledTask::FinishedCheck).await.unwrap();
    assert_eq!(
        queued_at(&state, priority::ROUTINE).await,
        sorted(vec![never, scraped])
    );
}

#[tokio::test]
async fn test_relation_repair_selects_anime_missing_either_edge() {
    let (state, _worker) = spawn_state(
        offline_config(),
        FakeCatalog::with(vec![
            with_relations(media(521, "Part One", 12), vec![sequel_edge(522)]),
            with_relations(
                media(522, "Part Two", 12),
                vec![prequel_edge(521), sequel_edge(523)],
            ),
            with_relations(media(523, "Part Three", 12), vec![prequel_edge(522)]),
            media(524, "Standalone", 12),
        ]),
        vec![],
    )
    .await;

    state.information.fetch_specific(521, false).await.unwrap();
    let standalone = state.information.fetch_specific(524, false).await.unwrap();
    let first = anime_id(&state, 521).await;
    let middle = anime_id(&state, 522).await;
    let last = anime_id(&state, 523).await;

    let missing = state.store.list_missing_sequence_edges().await.unwrap();
    assert!(missing.contains(&first), "a first season has no PREQUEL link");
    assert!(!missing.contains(&middle));

    state.dispatcher.run(ScheduledTask::RelationRepair).await.unwrap();

    let jobs = state.store.list_pending_jobs().await.unwrap();
    assert!(jobs.iter().all(|j| j.kind == JobKind::Relations.as_str()));
    assert_eq!(
        queued_at(&state, priority::RELATION_REPAIR).await,
        sorted(vec![first, last, standalone])
    );
}

#[tokio::test]
async fn test_refetch_queues_new_anime() {
    let (state, _worker) = spawn_state(
        offline_config(),
        FakeCatalog::with(vec![media(531, "Fresh One", 1), media(532, "Fresh Two", 4)]),
        vec![],
    )
    .await;

    let jobs = state.dispatcher.run(ScheduledTask::Refetch).await.unwrap();
    assert_eq!(jobs, 1);

    let created = vec![anime_id(&state, 531).await, anime_id(&state, 532).await];
    assert_eq!(queued_at(&state, priority::NEW_ANIME).await, sorted(created));
}
