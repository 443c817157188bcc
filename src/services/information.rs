//! Catalog-side synchronisation: the airing window, single anime, relation
//! edges and provider id mappings.
//!
//! Nothing in here enqueues scrape jobs. Operations that discover work return
//! [`FollowUp`] items and the caller decides where they go.

use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, Utc};
use futures::future::BoxFuture;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::clients::anilist::{AiringQuery, AnilistMedia, CatalogApi, RelationEdge};
use crate::clients::mappings::MappingClient;
use crate::config::CatalogConfig;
use crate::db::Store;
use crate::entities::{anime, episodes, relations};
use crate::error::{ScrapeError, is_constraint_race};
use crate::metadata::MetaService;
use crate::models::{AnimeFormat, AnimeRecord, AnimeStatus, AnimeTitle, RelationType};
use crate::services::queue::priority;

/// Work discovered by a sync pass that someone else has to schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FollowUp {
    Scrape {
        anime_ids: Vec<String>,
        priority: i32,
        info_only: bool,
    },
    Resync {
        anime_ids: Vec<String>,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefetchReport {
    pub created: Vec<String>,
    /// Existing anime whose episode count moved.
    pub updated: Vec<String>,
}

impl RefetchReport {
    #[must_use]
    pub fn follow_ups(&self) -> Vec<FollowUp> {
        let mut follow_ups = Vec::new();
        if !self.updated.is_empty() {
            follow_ups.push(FollowUp::Scrape {
                anime_ids: self.updated.clone(),
                priority: priority::REFETCHED,
                info_only: false,
            });
        }
        if !self.created.is_empty() {
            follow_ups.push(FollowUp::Resync {
                anime_ids: self.created.clone(),
            });
            follow_ups.push(FollowUp::Scrape {
                anime_ids: self.created.clone(),
                priority: priority::NEW_ANIME,
                info_only: false,
            });
        }
        follow_ups
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResyncReport {
    pub mapped: usize,
    pub unmapped: usize,
    pub meta_synced: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Season {
    Winter,
    Spring,
    Summer,
    Fall,
}

impl Season {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Winter => "WINTER",
            Self::Spring => "SPRING",
            Self::Summer => "SUMMER",
            Self::Fall => "FALL",
        }
    }

    /// The catalog season a date falls in, three months each starting in January.
    #[must_use]
    pub fn containing(date: DateTime<Utc>) -> (Self, i32) {
        let season = match date.month0() / 3 {
            0 => Self::Winter,
            1 => Self::Spring,
            2 => Self::Summer,
            _ => Self::Fall,
        };
        (season, date.year())
    }

    #[must_use]
    pub const fn previous(self, year: i32) -> (Self, i32) {
        match self {
            Self::Winter => (Self::Fall, year - 1),
            Self::Spring => (Self::Winter, year),
            Self::Summer => (Self::Spring, year),
            Self::Fall => (Self::Summer, year),
        }
    }
}

struct CatalogUpsert {
    id: String,
    created: bool,
    require_update: bool,
}

const RESYNC_CHUNK: usize = 500;

pub struct InformationService {
    store: Store,
    catalog: Arc<dyn CatalogApi>,
    mappings: Arc<MappingClient>,
    meta: Arc<MetaService>,
    config: CatalogConfig,
}

impl InformationService {
    #[must_use]
    pub fn new(
        store: Store,
        catalog: Arc<dyn CatalogApi>,
        mappings: Arc<MappingClient>,
        meta: Arc<MetaService>,
        config: CatalogConfig,
    ) -> Self {
        Self {
            store,
            catalog,
            mappings,
            meta,
            config,
        }
    }

    /// Pulls releasing TV anime from the current and previous season.
    #[instrument(skip(self))]
    pub async fn refetch(&self) -> Result<RefetchReport> {
        let start = std::time::Instant::now();
        let (season, year) = Season::containing(Utc::now());
        let (previous, previous_year) = season.previous(year);

        let mut media = Vec::new();
        let mut seen = HashSet::new();
        for (season, year) in [(season, year), (previous, previous_year)] {
            let query = AiringQuery {
                season: Some(season.as_str().to_string()),
                year: Some(year),
                status: Some(AnimeStatus::Releasing.to_string()),
                format: Some(AnimeFormat::Tv.to_string()),
            };
            for entry in self.load_airing(&query).await? {
                if seen.insert(entry.id) {
                    media.push(entry);
                }
            }
        }

        let mut report = RefetchReport::default();
        let mut stored = Vec::with_capacity(media.len());
        for entry in &media {
            match self.upsert_from_catalog(entry).await {
                Ok(outcome) => {
                    if outcome.created {
                        report.created.push(outcome.id.clone());
                    } else if outcome.require_update {
                        report.updated.push(outcome.id.clone());
                    }
                    stored.push((outcome.id, entry));
                }
                Err(e) => warn!(anilist_id = entry.id, error = %e, "Failed to store catalog entry"),
            }
        }

        for (id, entry) in stored {
            let Some(anime) = self.store.get_anime(&id).await? else {
                continue;
            };
            if let Err(e) = self.link_relations(&anime, &entry.relations.edges).await {
                warn!(anime_id = %id, error = %e, "Failed to link relations");
            }
        }

        info!(
            event = "refetch_finished",
            seen = media.len(),
            created = report.created.len(),
            updated = report.updated.len(),
            duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            "Catalog refetch finished"
        );
        Ok(report)
    }

    async fn load_airing(&self, query: &AiringQuery) -> Result<Vec<AnilistMedia>> {
        let mut media = Vec::new();
        let mut page = 1;
        loop {
            let result = self
                .catalog
                .airing_page(query, page)
                .await
                .with_context(|| format!("Airing page {page} of {query:?}"))?;
            media.extend(result.media);
            if !result.has_next_page {
                break;
            }
            page += 1;
            tokio::time::sleep(Duration::from_millis(self.config.page_delay_ms)).await;
        }
        debug!(season = ?query.season, year = ?query.year, count = media.len(), "Airing window loaded");
        Ok(media)
    }

    async fn upsert_from_catalog(&self, media: &AnilistMedia) -> Result<CatalogUpsert> {
        let record = convert(media)?;

        let Some(existing) = self.store.get_anime_by_anilist_id(media.id).await? else {
            let (anime, created) = self.store.create_anime(&record).await?;
            if created {
                self.attach_mappings(&anime).await;
            }
            return Ok(CatalogUpsert {
                id: anime.id,
                created,
                require_update: created,
            });
        };

        let updated = self
            .store
            .update_anime_from_catalog(&existing, &record, false)
            .await?;

        if existing.parsed_status() == AnimeStatus::Releasing
            && record.current_episode > existing.current_episode
        {
            self.store
                .upsert_aired_episode(
                    &existing.id,
                    record.current_episode,
                    existing.next_airing.as_deref(),
                )
                .await?;
        }

        Ok(CatalogUpsert {
            id: existing.id,
            created: false,
            require_update: updated.current_episode != existing.current_episode,
        })
    }

    /// Stores provider ids for a freshly created anime. Failures only cost the mapping.
    async fn attach_mappings(&self, anime: &anime::Model) {
        match self.mappings.provider_ids(anime.anilist_id).await {
            Ok(Some(ids)) => {
                if let Err(e) = self.store.set_anime_mappings(&anime.id, &ids).await {
                    warn!(anime_id = %anime.id, error = %e, "Failed to store provider ids");
                }
            }
            Ok(None) => {}
            Err(e) => debug!(anime_id = %anime.id, error = %e, "Provider id feed unavailable"),
        }
    }

    /// Fetch-or-create by catalog id. Returns the stored anime id.
    ///
    /// With `force`, an existing row is refreshed from the catalog. Relations
    /// are only walked for anime this call created.
    pub fn fetch_anime_by_anilist_id(
        &self,
        anilist_id: i32,
        force: bool,
    ) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            let existing = self.store.get_anime_by_anilist_id(anilist_id).await?;
            if let Some(anime) = &existing
                && !force
            {
                return Ok(anime.id.clone());
            }

            let media = self
                .catalog
                .media_by_id(anilist_id)
                .await?
                .ok_or_else(|| ScrapeError::NotFound(format!("AniList anime {anilist_id}")))?;
            let record = convert(&media)?;

            if let Some(anime) = existing {
                self.store
                    .update_anime_from_catalog(&anime, &record, true)
                    .await?;
                return Ok(anime.id);
            }

            let (anime, created) = self.store.create_anime(&record).await?;
            if created {
                info!(anime_id = %anime.id, anilist_id, "Anime created from catalog");
                self.attach_mappings(&anime).await;
                self.link_relations(&anime, &media.relations.edges).await?;
            }
            Ok(anime.id)
        })
    }

    /// Re-reads an anime's catalog edges and links every usable one.
    #[instrument(skip(self))]
    pub async fn fetch_relations(&self, anime_id: &str) -> Result<Vec<relations::Model>> {
        let anime = self
            .store
            .get_anime(anime_id)
            .await?
            .ok_or_else(|| ScrapeError::NotFound(format!("Anime {anime_id}")))?;
        let edges = self.catalog.relation_edges(anime.anilist_id).await?;
        self.link_relations(&anime, &edges).await
    }

    async fn link_relations(
        &self,
        anime: &anime::Model,
        edges: &[RelationEdge],
    ) -> Result<Vec<relations::Model>> {
        let mut linked = Vec::new();

        for edge in edges {
            if edge.node.id == anime.anilist_id || edge.node.media_type.as_deref() != Some("ANIME") {
                continue;
            }
            let Some(relation_type) = edge
                .relation_type
                .as_deref()
                .and_then(|t| t.parse::<RelationType>().ok())
            else {
                continue;
            };

            let related_id = match self.fetch_anime_by_anilist_id(edge.node.id, false).await {
                Ok(id) => id,
                Err(e) => {
                    warn!(anilist_id = edge.node.id, error = %e, "Related anime unavailable");
                    continue;
                }
            };

            let relation = match self
                .store
                .find_or_create_relation(relation_type, &related_id)
                .await
            {
                Ok(relation) => relation,
                Err(e) if is_constraint_race(&e) => {
                    match self.store.find_relation(relation_type, &related_id).await? {
                        Some(relation) => relation,
                        None => continue,
                    }
                }
                Err(e) => return Err(e),
            };

            match self.store.link_relation(&anime.id, &relation.id).await {
                Ok(()) => {}
                Err(e) if is_constraint_race(&e) => {
                    debug!(relation_id = %relation.id, "Relation linked concurrently");
                }
                Err(e) => return Err(e),
            }
            linked.push(relation);
        }

        Ok(linked)
    }

    /// Refreshes provider ids and backfills episode metadata.
    ///
    /// Without ids, every anime that is not currently releasing is resynced.
    #[instrument(skip_all, fields(requested = ids.map_or(0, <[String]>::len)))]
    pub async fn resync(&self, ids: Option<&[String]>) -> Result<ResyncReport> {
        let table = self.mappings.provider_id_table().await?;

        let ids = match ids {
            Some(ids) if !ids.is_empty() => ids.to_vec(),
            _ => {
                self.store
                    .list_anime_ids_excluding_status(AnimeStatus::Releasing)
                    .await?
            }
        };

        let mut report = ResyncReport::default();
        for chunk in ids.chunks(RESYNC_CHUNK) {
            for anime in self.store.get_anime_many(chunk).await? {
                let Some(provider_ids) = table.get(&anime.anilist_id) else {
                    report.unmapped += 1;
                    continue;
                };

                self.store
                    .set_anime_mappings(&anime.id, provider_ids)
                    .await?;
                report.mapped += 1;

                let episodes = self.store.list_episodes(&anime.id).await?;
                if episodes.iter().all(episodes::Model::has_complete_meta) {
                    continue;
                }

                let Some(anime) = self.store.get_anime(&anime.id).await? else {
                    continue;
                };
                match self.meta.synchronize(&anime, true, false).await {
                    Ok(_) => report.meta_synced += 1,
                    Err(e) => warn!(anime_id = %anime.id, error = %e, "Metadata sync failed"),
                }
            }
        }

        info!(
            event = "resync_finished",
            mapped = report.mapped,
            unmapped = report.unmapped,
            meta_synced = report.meta_synced,
            "Provider resync finished"
        );
        Ok(report)
    }
}

/// Converts a catalog entry into the stored shape.
pub fn convert(media: &AnilistMedia) -> Result<AnimeRecord> {
    let status: AnimeStatus = media
        .status
        .as_deref()
        .unwrap_or("NOT_YET_RELEASED")
        .parse()
        .map_err(anyhow::Error::msg)?;

    let (current_episode, next_airing) = match media.next_airing_episode {
        Some(next) => (
            next.episode - 1,
            DateTime::from_timestamp(next.airing_at, 0),
        ),
        None if status == AnimeStatus::Finished => (media.episodes.unwrap_or(0), None),
        None => (0, None),
    };

    let title = AnimeTitle {
        english: media.title.english.clone(),
        romaji: media.title.romaji.clone(),
        native: media.title.native.clone(),
    };
    let slug_source = title
        .english
        .as_deref()
        .or(title.romaji.as_deref())
        .map_or_else(|| media.id.to_string(), ToString::to_string);

    Ok(AnimeRecord {
        anilist_id: media.id,
        slug: slugify(&slug_source),
        title,
        synonyms: media.synonyms.clone(),
        cover_image: media.cover_image.extra_large.clone(),
        banner_image: media.banner_image.clone(),
        color: media.cover_image.color.clone(),
        description: media
            .description
            .as_deref()
            .map(|d| html_escape::decode_html_entities(d).into_owned()),
        duration: media.duration,
        popularity: media.popularity,
        average_score: media.average_score,
        status,
        season: media.season.clone().unwrap_or_else(|| "UNKNOWN".to_string()),
        year: media.season_year,
        format: media
            .format
            .as_deref()
            .map_or(AnimeFormat::Unknown, AnimeFormat::parse_lossy),
        current_episode: current_episode.max(0),
        next_airing,
        genres: media.genres.clone(),
    })
}

/// URL slug for a title. Whitespace runs become one `-`; a handful of
/// characters get readable replacements and other punctuation is dropped.
#[must_use]
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut in_space = false;

    for c in title.trim().chars() {
        if c.is_whitespace() {
            if !in_space {
                slug.push('-');
            }
            in_space = true;
            continue;
        }
        in_space = false;

        match c {
            '×' => slug.push('x'),
            '/' | ';' => slug.push('-'),
            '?' => slug.push_str("-question"),
            c if c.is_alphanumeric() || "$*_+~.()'\"!-:@".contains(c) => {
                slug.extend(c.to_lowercase());
            }
            _ => {}
        }
    }

    slug
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::anilist::{MediaTitle, NextAiringEpisode};

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Attack on Titan"), "attack-on-titan");
        assert_eq!(slugify("Fate/Zero"), "fate-zero");
        assert_eq!(slugify("Hunter × Hunter"), "hunter-x-hunter");
        assert_eq!(
            slugify("Is It Wrong to Pick Up Girls in a Dungeon?"),
            "is-it-wrong-to-pick-up-girls-in-a-dungeon-question"
        );
        assert_eq!(slugify("  Re:Zero  Starting Life "), "re:zero-starting-life");
        assert_eq!(slugify("Steins;Gate"), "steins-gate");
    }

    #[test]
    fn test_season_window() {
        let jan = DateTime::parse_from_rfc3339("2026-01-15T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let (season, year) = Season::containing(jan);
        assert_eq!((season, year), (Season::Winter, 2026));
        assert_eq!(season.previous(year), (Season::Fall, 2025));

        let oct = DateTime::parse_from_rfc3339("2026-10-18T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let (season, year) = Season::containing(oct);
        assert_eq!(season, Season::Fall);
        assert_eq!(season.previous(year), (Season::Summer, 2026));
    }

    fn media() -> AnilistMedia {
        AnilistMedia {
            id: 154_587,
            title: MediaTitle {
                romaji: Some("Sousou no Frieren".to_string()),
                english: Some("Frieren: Beyond Journey's End".to_string()),
                native: None,
            },
            status: Some("RELEASING".to_string()),
            episodes: Some(28),
            next_airing_episode: Some(NextAiringEpisode {
                episode: 12,
                airing_at: 1_700_000_000,
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_convert_releasing() {
        let record = convert(&media()).unwrap();
        assert_eq!(record.current_episode, 11);
        assert_eq!(record.next_airing.map(|d| d.timestamp()), Some(1_700_000_000));
        assert_eq!(record.slug, "frieren:-beyond-journey's-end");
        assert_eq!(record.season, "UNKNOWN");
        assert_eq!(record.format, AnimeFormat::Unknown);
    }

    #[test]
    fn test_convert_finished_uses_episode_total() {
        let mut finished = media();
        finished.status = Some("FINISHED".to_string());
        finished.next_airing_episode = None;
        assert_eq!(convert(&finished).unwrap().current_episode, 28);

        let mut upcoming = media();
        upcoming.status = Some("NOT_YET_RELEASED".to_string());
        upcoming.next_airing_episode = None;
        assert_eq!(convert(&upcoming).unwrap().current_episode, 0);
    }

    #[test]
    fn test_convert_decodes_description_entities() {
        let mut m = media();
        m.description = Some("Frieren &amp; Himmel&#039;s party.".to_string());
        assert_eq!(
            convert(&m).unwrap().description.as_deref(),
            Some("Frieren & Himmel's party.")
        );
    }

    #[test]
    fn test_follow_ups() {
        let report = RefetchReport {
            created: vec!["new".to_string()],
            updated: vec!["old".to_string()],
        };
        let follow_ups = report.follow_ups();
        assert_eq!(follow_ups.len(), 3);
        assert!(follow_ups.contains(&FollowUp::Scrape {
            anime_ids: vec!["old".to_string()],
            priority: priority::REFETCHED,
            info_only: false,
        }));
        assert!(follow_ups.contains(&FollowUp::Resync {
            anime_ids: vec!["new".to_string()],
        }));
        assert!(RefetchReport::default().follow_ups().is_empty());
    }
}
