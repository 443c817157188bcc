//! Scrape job reconciler.
//!
//! A job's anime are processed one after another; concurrency comes from the
//! worker pool running several jobs. Every write is a find-or-create guarded
//! by a unique index, so two workers touching the same anime converge on the
//! same rows.

use anyhow::Result;
use chrono::{DateTime, Datelike, Utc};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::clients::malsync::{MalSyncClient, SiteTable, select_page};
use crate::clients::webhook::{EpisodeUpdate, UpdateNotifier};
use crate::config::ScraperConfig;
use crate::db::{NewSource, Store};
use crate::entities::anime;
use crate::error::{ScrapeError, is_constraint_race};
use crate::metadata::MetaService;
use crate::models::{AnimeStatus, TitleVariants};
use crate::scrapers::{Scraper, ScraperRegistry, WebPage};
use crate::services::queue::ScrapeJob;

/// Episode window handed to `Scraper::fetch`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapeRange {
    pub start: i32,
    pub end: i32,
    pub excluded: BTreeSet<i32>,
}

/// Bounds of the numbers in `0..=current` not yet sourced, or `None` when all are.
#[must_use]
pub fn scrape_range(current: i32, sourced: &BTreeSet<i32>) -> Option<ScrapeRange> {
    let mut bounds: Option<(i32, i32)> = None;
    let mut excluded = BTreeSet::new();

    for number in 0..=current {
        if sourced.contains(&number) {
            excluded.insert(number);
        } else {
            bounds = Some(bounds.map_or((number, number), |(lo, _)| (lo, number)));
        }
    }

    bounds.map(|(start, end)| ScrapeRange {
        start,
        end,
        excluded,
    })
}

/// Per-plugin skip rules for anime unlikely to have changed.
#[derive(Debug, Clone, Copy)]
pub struct Quarantine {
    pub weeks: i64,
    pub hiatus_days: i64,
}

impl Quarantine {
    #[must_use]
    pub fn applies(&self, anime: &anime::Model, plugin_id: &str, now: DateTime<Utc>) -> bool {
        match anime.parsed_status() {
            AnimeStatus::Finished => {
                let old = anime.year.is_some_and(|y| y < now.year() - 1);
                let recently_checked = anime
                    .last_check_map()
                    .get(plugin_id)
                    .and_then(|ts| crate::db::parse_timestamp(ts))
                    .is_some_and(|ts| now - ts < chrono::Duration::weeks(self.weeks));
                old && recently_checked
            }
            AnimeStatus::Hiatus => anime
                .next_airing_at()
                .is_some_and(|next| next - now >= chrono::Duration::days(self.hiatus_days)),
            _ => false,
        }
    }
}

#[derive(Debug, Default)]
struct PluginOutcome {
    matched: bool,
    sources_created: bool,
    require_meta: bool,
    updates: Vec<EpisodeUpdate>,
}

pub struct ScrapeProcessor {
    store: Store,
    registry: ScraperRegistry,
    malsync: MalSyncClient,
    meta: Arc<MetaService>,
    notifier: Arc<dyn UpdateNotifier>,
    quarantine: Quarantine,
}

impl ScrapeProcessor {
    #[must_use]
    pub fn new(
        store: Store,
        registry: ScraperRegistry,
        malsync: MalSyncClient,
        meta: Arc<MetaService>,
        notifier: Arc<dyn UpdateNotifier>,
        config: &ScraperConfig,
    ) -> Self {
        Self {
            store,
            registry,
            malsync,
            meta,
            notifier,
            quarantine: Quarantine {
                weeks: config.quarantine_weeks,
                hiatus_days: config.hiatus_skip_days,
            },
        }
    }

    /// Runs one job. Failures on a single anime are logged and the loop moves on.
    #[instrument(skip_all, fields(anime = job.anime_ids.len(), info_only = job.info_only))]
    pub async fn process(&self, job: &ScrapeJob) -> Result<Vec<EpisodeUpdate>> {
        let mut updates = Vec::new();

        for anime_id in &job.anime_ids {
            match self.process_anime(anime_id, job.info_only).await {
                Ok(mut found) => updates.append(&mut found),
                Err(e) => warn!(event = "scrape_anime_failed", anime_id, error = %e, "Scrape failed for anime"),
            }
        }

        if !updates.is_empty() {
            if let Err(e) = self.notifier.notify(&updates).await {
                warn!(error = %e, "Failed to send update digest");
            }
        }

        Ok(updates)
    }

    async fn process_anime(&self, anime_id: &str, info_only: bool) -> Result<Vec<EpisodeUpdate>> {
        let Some(anime) = self.store.get_anime(anime_id).await? else {
            debug!(anime_id, "Anime vanished before its scrape job ran");
            return Ok(Vec::new());
        };
        if anime.parsed_status() == AnimeStatus::NotYetReleased {
            return Ok(Vec::new());
        }

        let titles = anime.title_variants();
        let sites = self.site_table(&anime).await;
        let now = Utc::now();

        let mut checked = HashMap::new();
        let mut sources_created = false;
        let mut require_meta = false;
        let mut updates = Vec::new();

        for plugin in self.registry.enabled() {
            if info_only && !plugin.info_only() {
                continue;
            }
            if self.quarantine.applies(&anime, plugin.id(), now) {
                debug!(anime_id, plugin = plugin.id(), "Plugin quarantined for anime");
                continue;
            }

            match self
                .scrape_plugin(&anime, plugin.as_ref(), &titles, sites.as_ref(), info_only)
                .await
            {
                Ok(outcome) => {
                    if outcome.matched {
                        checked.insert(plugin.id().to_string(), crate::db::timestamp(now));
                    }
                    sources_created |= outcome.sources_created;
                    require_meta |= outcome.require_meta;
                    updates.extend(outcome.updates);
                }
                Err(e) => match e.downcast_ref::<ScrapeError>() {
                    Some(ScrapeError::NotFound(_) | ScrapeError::UpstreamLogicMismatch(_)) => {
                        debug!(anime_id, plugin = plugin.id(), reason = %e, "Plugin result discarded");
                    }
                    _ if is_constraint_race(&e) => {
                        debug!(anime_id, plugin = plugin.id(), "Concurrent writer won an insert");
                    }
                    _ => warn!(event = "scrape_plugin_failed", anime_id, plugin = plugin.id(), error = %e, "Plugin scrape failed"),
                },
            }
        }

        let stamp = crate::db::timestamp(now);
        self.store
            .record_scrape_progress(
                &anime.id,
                &checked,
                sources_created.then_some(stamp.as_str()),
            )
            .await?;

        if require_meta {
            if let Some(fresh) = self.store.get_anime(&anime.id).await? {
                if let Err(e) = self.meta.synchronize(&fresh, true, false).await {
                    warn!(anime_id, error = %e, "Metadata sync after scrape failed");
                }
            }
        }

        if !updates.is_empty() {
            info!(anime_id, new_sources = updates.len(), "Anime scraped");
        }
        Ok(updates)
    }

    /// MALSync's site table for the anime. Failures fall back to live matching.
    async fn site_table(&self, anime: &anime::Model) -> Option<SiteTable> {
        let mal_id = anime.mapping_id("mal")?;
        match self.malsync.sites(&mal_id).await {
            Ok(sites) => Some(sites),
            Err(e) => {
                debug!(mal_id, error = %e, "MALSync lookup failed");
                None
            }
        }
    }

    async fn locate(
        &self,
        plugin: &dyn Scraper,
        anime: &anime::Model,
        titles: &TitleVariants,
        sites: Option<&SiteTable>,
    ) -> Result<Option<WebPage>, ScrapeError> {
        if let Some(page) = sites.and_then(|s| select_page(s, plugin.name(), anime.parsed_format())) {
            return Ok(Some(WebPage {
                title: page.title,
                path: page.path,
            }));
        }
        plugin.match_title(titles).await
    }

    async fn scrape_plugin(
        &self,
        anime: &anime::Model,
        plugin: &dyn Scraper,
        titles: &TitleVariants,
        sites: Option<&SiteTable>,
        info_only: bool,
    ) -> Result<PluginOutcome> {
        let mut outcome = PluginOutcome::default();
        let current = anime.current_episode;

        let sourced = self
            .store
            .episode_numbers_sourced_by(&anime.id, plugin.id(), current)
            .await?;
        let Some(mut range) = scrape_range(current, &sourced) else {
            return Ok(outcome);
        };
        if info_only && plugin.info_only() {
            range.excluded.clear();
        }

        let Some(page) = self.locate(plugin, anime, titles, sites).await? else {
            debug!(anime_id = %anime.id, plugin = plugin.id(), "No page matched");
            return Ok(outcome);
        };
        outcome.matched = true;

        let episodes = plugin
            .fetch(&page.path, range.start, range.end, &range.excluded)
            .await?;
        if episodes.len() > usize::try_from(current.max(0)).unwrap_or(usize::MAX) {
            return Err(ScrapeError::UpstreamLogicMismatch(format!(
                "{} listed {} episodes for {} aired",
                plugin.id(),
                episodes.len(),
                current
            ))
            .into());
        }

        let anime_title = anime
            .title()
            .preferred()
            .map_or_else(|| anime.slug.clone(), ToString::to_string);
        let store_sources = !info_only && !plugin.info_only();

        for scraped in episodes {
            let Some(number) = scraped.whole_number().filter(|n| (0..=current).contains(n)) else {
                continue;
            };
            let title = scraped
                .title
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty());

            let (episode, created) = self
                .store
                .find_or_create_episode(&anime.id, number, title)
                .await?;
            if created || episode.aired_at.is_none() {
                outcome.require_meta = true;
            }
            if !created && let Some(title) = title {
                match episode.title.as_deref() {
                    None => {
                        self.store.fill_episode_title_if_missing(&episode.id, title).await?;
                    }
                    Some(stored) if stored != title => {
                        warn!(event = "plugin_title_disagreement", anime_id = %anime.id, number, plugin = plugin.id(), stored, scraped = title, "Plugins disagree on an episode title");
                    }
                    Some(_) => {}
                }
            }

            if !store_sources {
                continue;
            }

            let created_source = self
                .store
                .create_source_if_absent(&NewSource {
                    episode_id: episode.id.clone(),
                    website_id: plugin.id().to_string(),
                    source_type: scraped.source_type,
                    target: scraped.url.clone(),
                    resolution: scraped.resolution.clone(),
                    format: scraped.format.clone(),
                    referer: scraped.referer.clone(),
                })
                .await?;

            if created_source.is_some() {
                metrics::counter!("scrape_sources_created_total", "website" => plugin.id())
                    .increment(1);
                outcome.sources_created = true;
                outcome.updates.push(EpisodeUpdate {
                    anime: anime_title.clone(),
                    episode_number: number,
                    episode_title: episode.title.clone().or_else(|| title.map(ToString::to_string)),
                    episode_id: episode.id.clone(),
                    website: plugin.name().to_string(),
                });
            }
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn anime(status: &str, year: Option<i32>) -> anime::Model {
        anime::Model {
            id: "a1".to_string(),
            anilist_id: 1,
            slug: "a1".to_string(),
            title_english: Some("Test".to_string()),
            title_romaji: None,
            title_native: None,
            synonyms: "[]".to_string(),
            cover_image: None,
            banner_image: None,
            color: None,
            description: None,
            duration: None,
            popularity: None,
            average_score: None,
            status: status.to_string(),
            season: "WINTER".to_string(),
            year,
            format: "TV".to_string(),
            current_episode: 12,
            next_airing: None,
            last_episode_update: None,
            last_checks: "{}".to_string(),
            mappings: "{}".to_string(),
            created_at: crate::db::now(),
            updated_at: crate::db::now(),
        }
    }

    #[test]
    fn test_range_skips_sourced_numbers() {
        let range = scrape_range(10, &BTreeSet::from([1, 2, 3, 5])).unwrap();
        assert_eq!(range.start, 0);
        assert_eq!(range.end, 10);
        assert_eq!(range.excluded, BTreeSet::from([1, 2, 3, 5]));
    }

    #[test]
    fn test_range_trims_sourced_edges() {
        let range = scrape_range(5, &BTreeSet::from([0, 1, 5])).unwrap();
        assert_eq!((range.start, range.end), (2, 4));
        assert!(scrape_range(2, &BTreeSet::from([0, 1, 2])).is_none());
    }

    #[test]
    fn test_quarantine_old_finished_recently_checked() {
        let quarantine = Quarantine { weeks: 4, hiatus_days: 3 };
        let now = Utc::now();

        let mut old = anime("FINISHED", Some(now.year() - 5));
        assert!(!quarantine.applies(&old, "gogoanime", now));

        old.last_checks = serde_json::json!({
            "gogoanime": crate::db::timestamp(now - chrono::Duration::days(3)),
            "9anime": crate::db::timestamp(now - chrono::Duration::weeks(10)),
        })
        .to_string();
        assert!(quarantine.applies(&old, "gogoanime", now));
        assert!(!quarantine.applies(&old, "9anime", now));

        let mut recent = old.clone();
        recent.year = Some(now.year());
        assert!(!quarantine.applies(&recent, "gogoanime", now));
    }

    #[test]
    fn test_quarantine_hiatus() {
        let quarantine = Quarantine { weeks: 4, hiatus_days: 3 };
        let now = Utc::now();

        let mut paused = anime("HIATUS", Some(now.year()));
        paused.next_airing = Some(crate::db::timestamp(now + chrono::Duration::days(10)));
        assert!(quarantine.applies(&paused, "gogoanime", now));

        paused.next_airing = Some(crate::db::timestamp(now + chrono::Duration::hours(20)));
        assert!(!quarantine.applies(&paused, "gogoanime", now));
    }
}
