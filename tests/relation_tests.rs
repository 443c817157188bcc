mod common;

use anisync::entities::{anime_genres, anime_relations, prelude::*};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};

use common::{FakeCatalog, media, offline_config, sequel_edge, spawn_state, with_relations};

#[tokio::test]
async fn test_fetch_creates_related_anime() {
    let catalog = FakeCatalog::with(vec![
        with_relations(media(201, "First Season", 12), vec![sequel_edge(202)]),
        media(202, "Second Season", 3),
    ]);
    let (state, _worker) = spawn_state(offline_config(), catalog, vec![]).await;

    let first = state.information.fetch_specific(201, false).await.unwrap();
    let sequel = state
        .store
        .get_anime_by_anilist_id(202)
        .await
        .unwrap()
        .expect("sequel imported alongside");

    let linked = state.store.relations_linked_from(&first).await.unwrap();
    assert_eq!(linked.len(), 1);
    assert_eq!(linked[0].relation_type, "SEQUEL");
    assert_eq!(linked[0].anime_id, sequel.id);
}

#[tokio::test]
async fn test_concurrent_relation_fetches_converge() {
    let mut config = offline_config();
    config.queue.concurrency = 4;
    let catalog = FakeCatalog::with(vec![
        with_relations(media(211, "Origin", 12), vec![sequel_edge(212)]),
        media(212, "Continuation", 4),
    ]);
    let (state, _worker) = spawn_state(config, catalog, vec![]).await;

    let origin = state.information.fetch_specific(211, false).await.unwrap();

    let runs = (0..4).map(|_| state.information.fetch_relations(vec![origin.clone()]));
    for result in futures::future::join_all(runs).await {
        result.unwrap();
    }

    let linked = state.store.relations_linked_from(&origin).await.unwrap();
    assert_eq!(linked.len(), 1);
    assert_eq!(linked[0].relation_type, "SEQUEL");
    assert_eq!(state.store.count_anime().await.unwrap(), 2);
}

#[tokio::test]
async fn test_non_anime_edges_are_ignored() {
    let mut manga_edge = sequel_edge(222);
    manga_edge.node.media_type = Some("MANGA".to_string());
    let catalog = FakeCatalog::with(vec![
        with_relations(media(221, "Adaptation", 12), vec![manga_edge]),
        media(222, "Source Manga", 0),
    ]);
    let (state, _worker) = spawn_state(offline_config(), catalog, vec![]).await;

    let id = state.information.fetch_specific(221, false).await.unwrap();

    assert!(state.store.relations_linked_from(&id).await.unwrap().is_empty());
    assert!(state.store.get_anime_by_anilist_id(222).await.unwrap().is_none());
}

#[tokio::test]
async fn test_junction_rows_resolve_both_sides() {
    let mut show = with_relations(media(231, "Linked Show", 12), vec![sequel_edge(232)]);
    show.genres = vec!["Action".to_string(), "Drama".to_string()];
    let catalog = FakeCatalog::with(vec![show, media(232, "Linked Sequel", 2)]);
    let (state, _worker) = spawn_state(offline_config(), catalog, vec![]).await;

    let anime_id = state.information.fetch_specific(231, false).await.unwrap();
    let conn = &state.store.conn;

    let mut genres: Vec<String> = AnimeGenres::find()
        .filter(anime_genres::Column::AnimeId.eq(anime_id.as_str()))
        .find_also_related(Genres)
        .all(conn)
        .await
        .unwrap()
        .into_iter()
        .filter_map(|(_, genre)| genre.map(|g| g.name))
        .collect();
    genres.sort();
    assert_eq!(genres, vec!["Action", "Drama"]);

    let owners = AnimeGenres::find()
        .filter(anime_genres::Column::AnimeId.eq(anime_id.as_str()))
        .find_also_related(Anime)
        .all(conn)
        .await
        .unwrap();
    assert!(owners.iter().all(|(_, a)| a.as_ref().map(|a| a.anilist_id) == Some(231)));

    let relations = AnimeRelations::find()
        .filter(anime_relations::Column::AnimeId.eq(anime_id.as_str()))
        .find_also_related(Relations)
        .all(conn)
        .await
        .unwrap();
    assert_eq!(relations.len(), 1);
    assert_eq!(
        relations[0].1.as_ref().map(|r| r.relation_type.as_str()),
        Some("SEQUEL")
    );
}
