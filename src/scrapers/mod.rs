//! Website plugins: search a site for an anime, list its episodes and turn a
//! stored episode reference back into something playable.

pub mod gogoanime;
pub mod html;
pub mod nineanime;

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use crate::clients::http::HttpFetcher;
use crate::config::ScraperConfig;
use crate::entities::websites;
use crate::error::ScrapeError;
use crate::extractors::{ExtractorSet, KeyRotation};
use crate::models::{RawSource, ScrapedEpisode, SourceParams, TitleVariants};

pub use gogoanime::Gogoanime;
pub use nineanime::{NineAnime, NineAnimeKeySource};

/// A search hit on a website.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebPage {
    pub title: String,
    /// Site-relative path, or an absolute URL for sites that need one.
    pub path: String,
}

#[async_trait::async_trait]
pub trait Scraper: Send + Sync {
    /// Stable website id, also the primary key of the `websites` row.
    fn id(&self) -> &'static str;

    /// Display name. MALSync keys its site table by this.
    fn name(&self) -> &'static str;

    fn url(&self) -> &str;

    fn locale(&self) -> &'static str {
        "en_US"
    }

    /// Lower plays first.
    fn priority(&self) -> i32 {
        -1
    }

    fn enabled_by_default(&self) -> bool {
        true
    }

    /// Only confirms episode existence and titles, never stores a playable source.
    fn info_only(&self) -> bool {
        false
    }

    /// Best search hit for the titles, or `None` when nothing matches confidently.
    async fn match_title(&self, titles: &TitleVariants) -> Result<Option<WebPage>, ScrapeError>;

    /// Episodes numbered within `start..=end`, minus `excluded`.
    async fn fetch(
        &self,
        path: &str,
        start: i32,
        end: i32,
        excluded: &BTreeSet<i32>,
    ) -> Result<Vec<ScrapedEpisode>, ScrapeError>;

    async fn raw_source(
        &self,
        _target: &str,
        _params: &SourceParams,
    ) -> Result<Option<RawSource>, ScrapeError> {
        Ok(None)
    }

    /// Resolution through the Consumet aggregator.
    async fn consumet_source(&self, _target: &str) -> Result<Option<RawSource>, ScrapeError> {
        Ok(None)
    }
}

/// All known plugins plus the per-plugin enable overrides from config.
#[derive(Clone)]
pub struct ScraperRegistry {
    plugins: Vec<Arc<dyn Scraper>>,
    overrides: HashMap<String, bool>,
}

impl ScraperRegistry {
    #[must_use]
    pub fn new(plugins: Vec<Arc<dyn Scraper>>, overrides: HashMap<String, bool>) -> Self {
        Self { plugins, overrides }
    }

    /// The production plugin set. Spawns the 9anime key refresher.
    #[must_use]
    pub fn standard(http: &HttpFetcher, extractors: ExtractorSet, config: &ScraperConfig) -> Self {
        let refresh = Duration::from_secs(config.key_refresh_minutes * 60);
        let keys = KeyRotation::spawn(
            NineAnimeKeySource::new(http.clone(), &config.nineanime_keys_url),
            refresh,
        );

        let plugins: Vec<Arc<dyn Scraper>> = vec![
            Arc::new(Gogoanime::new(http.clone(), extractors, config)),
            Arc::new(NineAnime::new(http.clone(), &config.nineanime_url, keys)),
        ];

        Self::new(plugins, config.plugin_overrides.clone())
    }

    #[must_use]
    pub fn is_enabled(&self, plugin: &dyn Scraper) -> bool {
        self.overrides
            .get(plugin.id())
            .copied()
            .unwrap_or_else(|| plugin.enabled_by_default())
    }

    #[must_use]
    pub fn all(&self) -> &[Arc<dyn Scraper>] {
        &self.plugins
    }

    #[must_use]
    pub fn enabled(&self) -> Vec<Arc<dyn Scraper>> {
        self.plugins
            .iter()
            .filter(|p| self.is_enabled(p.as_ref()))
            .cloned()
            .collect()
    }

    /// Enabled plugin owning a website id.
    #[must_use]
    pub fn by_website(&self, website_id: &str) -> Option<Arc<dyn Scraper>> {
        self.plugins
            .iter()
            .find(|p| p.id() == website_id && self.is_enabled(p.as_ref()))
            .cloned()
    }

    /// Upper bound on sources per episode once every playable plugin has run.
    #[must_use]
    pub fn playable_count(&self) -> usize {
        self.plugins
            .iter()
            .filter(|p| self.is_enabled(p.as_ref()) && !p.info_only())
            .count()
    }

    /// Rows for the `websites` table, one per plugin.
    #[must_use]
    pub fn website_rows(&self) -> Vec<websites::Model> {
        self.plugins
            .iter()
            .map(|p| websites::Model {
                id: p.id().to_string(),
                name: p.name().to_string(),
                url: p.url().to_string(),
                locale: p.locale().to_string(),
                priority: p.priority(),
            })
            .collect()
    }
}

/// Parses a site's episode label into a number, rejecting NaN and fractions.
pub(crate) fn whole_episode_number(label: &str) -> Option<f64> {
    let n: f64 = label.trim().parse().ok()?;
    (n.is_finite() && n.fract() == 0.0).then_some(n)
}
