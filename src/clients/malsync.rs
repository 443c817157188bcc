use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::debug;

use crate::clients::http::HttpFetcher;
use crate::error::ScrapeError;
use crate::models::AnimeFormat;

/// A site page MALSync already knows for an anime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SitePage {
    pub title: String,
    /// URL path on the site, e.g. `/category/shingeki-no-kyojin`.
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SiteEntry {
    #[serde(default)]
    pub title: String,
    pub url: String,
}

/// Site name -> entry identifier -> entry.
pub type SiteTable = BTreeMap<String, BTreeMap<String, SiteEntry>>;

#[derive(Debug, Deserialize)]
struct MalSyncResponse {
    #[serde(rename = "Sites", default)]
    sites: SiteTable,
}

/// Client for the MALSync title-to-site mapping API.
#[derive(Clone)]
pub struct MalSyncClient {
    http: HttpFetcher,
    base_url: String,
}

impl MalSyncClient {
    #[must_use]
    pub fn new(http: HttpFetcher, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    /// Known site pages for a MyAnimeList id. Unknown ids yield an empty table.
    pub async fn sites(&self, mal_id: &str) -> Result<SiteTable, ScrapeError> {
        let url = format!("{}/mal/anime/{mal_id}", self.base_url.trim_end_matches('/'));
        match self.http.get_json::<MalSyncResponse>(&url, &[]).await {
            Ok(response) => Ok(response.sites),
            Err(ScrapeError::NotFound(_)) => {
                debug!(mal_id, "MALSync has no entry");
                Ok(SiteTable::new())
            }
            Err(e) => Err(e),
        }
    }
}

/// Picks the page for `site_name` out of a MALSync table.
///
/// Site names compare case-insensitively. Dub and uncensored entries are never
/// chosen; for TV anime an entry whose key mentions `tv` is preferred, since
/// MALSync sometimes files movie adaptations under the series.
#[must_use]
pub fn select_page(sites: &SiteTable, site_name: &str, format: AnimeFormat) -> Option<SitePage> {
    let entries = sites
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(site_name))
        .map(|(_, entries)| entries)?;

    let usable = |key: &&String| !key.contains("dub") && !key.contains("uncensored");

    let mut key = entries.keys().find(usable);
    if format == AnimeFormat::Tv
        && let Some(tv_key) = entries.keys().filter(usable).find(|k| k.contains("tv"))
    {
        key = Some(tv_key);
    }

    let entry = entries.get(key?)?;
    let path = url::Url::parse(&entry.url).ok()?.path().to_string();

    Some(SitePage {
        title: entry.title.clone(),
        path,
    })
}
