#![allow(dead_code)]

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use anisync::clients::anilist::{
    AiringQuery, AnilistMedia, CatalogApi, CatalogPage, MediaTitle, NextAiringEpisode,
    RelationEdge, RelationNode, Relations,
};
use anisync::clients::http::HttpFetcher;
use anisync::clients::webhook::DisabledNotifier;
use anisync::config::Config;
use anisync::db::Store;
use anisync::error::ScrapeError;
use anisync::extractors::KeyRotation;
use anisync::models::{RawSource, ScrapedEpisode, SourceParams, TitleVariants};
use anisync::scrapers::{Scraper, ScraperRegistry, WebPage};
use anisync::state::{Collaborators, SharedState};
use tokio::task::JoinHandle;

pub const FAKE_SITE: &str = "fakesite";

/// Arguments of one `Scraper::fetch` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchCall {
    pub start: i32,
    pub end: i32,
    pub excluded: BTreeSet<i32>,
}

/// A site listing fixed episodes; records what it was asked for.
pub struct FakeSite {
    pub id: &'static str,
    pub name: &'static str,
    pub episodes: Vec<f64>,
    /// Return every listed episode regardless of the requested window.
    pub unfiltered: bool,
    pub info_only: bool,
    /// Every listing request fails as a transient upstream error.
    pub failing: bool,
    /// Prefix of the scraped episode titles, `"{prefix} {n}"`.
    pub title_prefix: &'static str,
    /// What `raw_source` extracts. `None` makes extraction fail.
    pub raw: Option<RawSource>,
    /// What the Consumet fallback returns.
    pub consumet: Option<RawSource>,
    pub calls: Mutex<Vec<FetchCall>>,
}

impl FakeSite {
    pub fn site(id: &'static str, name: &'static str, episodes: Vec<f64>) -> Self {
        Self {
            id,
            name,
            episodes,
            unfiltered: false,
            info_only: false,
            failing: false,
            title_prefix: "Episode",
            raw: None,
            consumet: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn new(episodes: Vec<f64>) -> Arc<Self> {
        Arc::new(Self::site(FAKE_SITE, "FakeSite", episodes))
    }

    pub fn unfiltered(episodes: Vec<f64>) -> Arc<Self> {
        Arc::new(Self {
            unfiltered: true,
            ..Self::site(FAKE_SITE, "FakeSite", episodes)
        })
    }

    pub fn calls(&self) -> Vec<FetchCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Scraper for FakeSite {
    fn id(&self) -> &'static str {
        self.id
    }

    fn name(&self) -> &'static str {
        self.name
    }

    fn url(&self) -> &str {
        "https://fake.example"
    }

    fn info_only(&self) -> bool {
        self.info_only
    }

    async fn match_title(&self, titles: &TitleVariants) -> Result<Option<WebPage>, ScrapeError> {
        Ok(titles.current.as_ref().map(|t| WebPage {
            title: t.clone(),
            path: "/category/show".to_string(),
        }))
    }

    async fn fetch(
        &self,
        path: &str,
        start: i32,
        end: i32,
        excluded: &BTreeSet<i32>,
    ) -> Result<Vec<ScrapedEpisode>, ScrapeError> {
        self.calls.lock().unwrap().push(FetchCall {
            start,
            end,
            excluded: excluded.clone(),
        });
        if self.failing {
            return Err(ScrapeError::UpstreamTransient {
                service: self.id.to_string(),
                message: "connection reset".to_string(),
            });
        }

        Ok(self
            .episodes
            .iter()
            .filter(|n| {
                if self.unfiltered {
                    return true;
                }
                #[allow(clippy::cast_possible_truncation)]
                let whole = **n as i32;
                (start..=end).contains(&whole) && !excluded.contains(&whole)
            })
            .map(|n| {
                let mut episode = ScrapedEpisode::proxy(*n, format!("{path}/ep-{n}"));
                episode.title = Some(format!("{} {n}", self.title_prefix));
                episode
            })
            .collect())
    }

    async fn raw_source(
        &self,
        _target: &str,
        _params: &SourceParams,
    ) -> Result<Option<RawSource>, ScrapeError> {
        self.raw.clone().map(Some).ok_or_else(|| ScrapeError::UpstreamTransient {
            service: self.id.to_string(),
            message: "embed page unavailable".to_string(),
        })
    }

    async fn consumet_source(&self, _target: &str) -> Result<Option<RawSource>, ScrapeError> {
        Ok(self.consumet.clone())
    }
}

/// In-memory catalog keyed by AniList id.
#[derive(Default)]
pub struct FakeCatalog {
    pub media: HashMap<i32, AnilistMedia>,
}

impl FakeCatalog {
    pub fn with(media: Vec<AnilistMedia>) -> Self {
        Self {
            media: media.into_iter().map(|m| (m.id, m)).collect(),
        }
    }
}

#[async_trait::async_trait]
impl CatalogApi for FakeCatalog {
    async fn airing_page(&self, _query: &AiringQuery, _page: u32) -> anyhow::Result<CatalogPage> {
        Ok(CatalogPage {
            media: self.media.values().cloned().collect(),
            has_next_page: false,
        })
    }

    async fn media_by_id(&self, anilist_id: i32) -> anyhow::Result<Option<AnilistMedia>> {
        Ok(self.media.get(&anilist_id).cloned())
    }
}

/// A releasing TV show with `current` episodes aired.
pub fn media(id: i32, title: &str, current: i32) -> AnilistMedia {
    AnilistMedia {
        id,
        title: MediaTitle {
            romaji: Some(title.to_string()),
            english: Some(title.to_string()),
            native: None,
        },
        status: Some("RELEASING".to_string()),
        season: Some("SPRING".to_string()),
        season_year: Some(2026),
        format: Some("TV".to_string()),
        next_airing_episode: Some(NextAiringEpisode {
            episode: current + 1,
            airing_at: chrono::Utc::now().timestamp() + 86_400,
        }),
        ..AnilistMedia::default()
    }
}

pub fn relation_edge(relation_type: &str, anilist_id: i32) -> RelationEdge {
    RelationEdge {
        relation_type: Some(relation_type.to_string()),
        node: RelationNode {
            id: anilist_id,
            media_type: Some("ANIME".to_string()),
        },
    }
}

pub fn sequel_edge(anilist_id: i32) -> RelationEdge {
    relation_edge("SEQUEL", anilist_id)
}

pub fn prequel_edge(anilist_id: i32) -> RelationEdge {
    relation_edge("PREQUEL", anilist_id)
}

/// A finished TV show with all `episodes` aired.
pub fn finished(id: i32, title: &str, episodes: i32) -> AnilistMedia {
    AnilistMedia {
        status: Some("FINISHED".to_string()),
        episodes: Some(episodes),
        next_airing_episode: None,
        season_year: Some(2020),
        ..media(id, title, episodes)
    }
}

pub fn with_relations(mut media: AnilistMedia, edges: Vec<RelationEdge>) -> AnilistMedia {
    media.relations = Relations { edges };
    media
}

/// Config that keeps every third party unreachable.
pub fn offline_config() -> Config {
    let mut config = Config::default();
    config.metadata.tvdb_enabled = false;
    config.metadata.anidb_enabled = false;
    config.notifications.enabled = false;
    config.mapping.provider_ids_url = "http://127.0.0.1:9/ids.json".to_string();
    config.mapping.tvdb_mapping_url = "http://127.0.0.1:9/tvdb.xml".to_string();
    config.scraper.malsync_url = "http://127.0.0.1:9".to_string();
    config.catalog.batch_delay_ms = 0;
    config.catalog.page_delay_ms = 0;
    config.queue.retry_backoff_secs = 0;
    config
}

pub async fn temp_store() -> Store {
    let path = std::env::temp_dir().join(format!("anisync-{}.db", uuid::Uuid::new_v4()));
    Store::new(&format!("sqlite:{}?mode=rwc", path.display()))
        .await
        .expect("Failed to open test database")
}

pub async fn spawn_state(
    config: Config,
    catalog: FakeCatalog,
    plugins: Vec<Arc<dyn Scraper>>,
) -> (SharedState, JoinHandle<()>) {
    let store = temp_store().await;
    let client = reqwest::Client::new();

    let collaborators = Collaborators {
        http: HttpFetcher::direct(client.clone()),
        client,
        catalog: Arc::new(catalog),
        registry: ScraperRegistry::new(plugins, HashMap::new()),
        notifier: Arc::new(DisabledNotifier),
        rapidcloud_key: Arc::new(KeyRotation::empty()),
    };

    let (state, task) = SharedState::from_parts(config, store, collaborators);
    state.seed_websites().await.unwrap();
    (state, task)
}
