//! Cross-reference feeds mapping catalog ids to other providers.
//!
//! Two public feeds are used:
//! - Fribb's `anime-list-full.json`, keyed by AniList id, for the provider
//!   ids stored on each anime (`mal`, `anidb`, `thetvdb`, `imdb`, ...).
//! - The anime-lists `anime-list-full.xml`, keyed by AniDB id, for the TVDB
//!   season and episode offset the metadata sync needs.
//!
//! Parsed tables are kept in memory and in the key-value cache. The cache is
//! only an accelerator: a miss or a decode failure refetches the feed.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

use crate::clients::http::HttpFetcher;
use crate::config::MappingConfig;
use crate::services::cache::{self, KeyValueCache};

pub const PROVIDER_IDS_CACHE_KEY: &str = "anime-list-mapping";
pub const TVDB_MAPPING_CACHE_KEY: &str = "tvdb-mapping";

/// Provider name -> provider id, as stored in `anime.mappings`.
pub type ProviderIds = BTreeMap<String, serde_json::Value>;

pub type ProviderIdTable = HashMap<i32, ProviderIds>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TvdbSeason {
    /// Episodes are numbered absolutely on TVDB.
    Absolute,
    Numbered(i32),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TvdbMapping {
    /// Numeric series id, or `movie`.
    pub tvdb_id: String,
    pub season: TvdbSeason,
    pub episode_offset: i32,
    pub imdb_id: Option<String>,
}

impl TvdbMapping {
    #[must_use]
    pub fn is_movie(&self) -> bool {
        self.tvdb_id == "movie"
    }
}

pub type TvdbMappingTable = HashMap<i32, TvdbMapping>;

#[derive(Debug, Deserialize)]
struct AnimeListXml {
    #[serde(rename = "anime", default)]
    anime: Vec<AnimeListEntry>,
}

#[derive(Debug, Deserialize)]
struct AnimeListEntry {
    #[serde(rename = "@anidbid")]
    anidb_id: String,
    #[serde(rename = "@tvdbid", default)]
    tvdb_id: Option<String>,
    #[serde(rename = "@defaulttvdbseason", default)]
    default_season: Option<String>,
    #[serde(rename = "@episodeoffset", default)]
    episode_offset: Option<String>,
    #[serde(rename = "@imdbid", default)]
    imdb_id: Option<String>,
}

type Memo<T> = RwLock<Option<(Instant, Arc<T>)>>;

pub struct MappingClient {
    http: HttpFetcher,
    cache: Arc<dyn KeyValueCache>,
    config: MappingConfig,
    provider_ids: Memo<ProviderIdTable>,
    tvdb: Memo<TvdbMappingTable>,
}

impl MappingClient {
    #[must_use]
    pub fn new(http: HttpFetcher, cache: Arc<dyn KeyValueCache>, config: MappingConfig) -> Self {
        Self {
            http,
            cache,
            config,
            provider_ids: RwLock::new(None),
            tvdb: RwLock::new(None),
        }
    }

    /// The whole AniList id -> provider ids table.
    #[instrument(skip(self))]
    pub async fn provider_id_table(&self) -> Result<Arc<ProviderIdTable>> {
        let ttl = chrono::Duration::hours(self.config.provider_ids_ttl_hours);
        if let Some(table) = memo_get(&self.provider_ids, ttl).await {
            return Ok(table);
        }

        let table = if let Some(table) =
            cache::get_json::<ProviderIdTable>(self.cache.as_ref(), PROVIDER_IDS_CACHE_KEY).await
        {
            table
        } else {
            let body = self
                .http
                .get_text(&self.config.provider_ids_url)
                .await
                .context("Failed to download provider id feed")?;
            let table = tokio::task::spawn_blocking(move || parse_provider_ids(&body))
                .await
                .context("Provider id parse task panicked")??;
            info!(entries = table.len(), "Loaded provider id feed");
            cache::set_json(self.cache.as_ref(), PROVIDER_IDS_CACHE_KEY, &table, ttl).await;
            table
        };

        Ok(memo_set(&self.provider_ids, table).await)
    }

    pub async fn provider_ids(&self, anilist_id: i32) -> Result<Option<ProviderIds>> {
        Ok(self.provider_id_table().await?.get(&anilist_id).cloned())
    }

    /// The AniDB id -> TVDB placement table.
    #[instrument(skip(self))]
    pub async fn tvdb_table(&self) -> Result<Arc<TvdbMappingTable>> {
        let ttl = chrono::Duration::hours(self.config.tvdb_mapping_ttl_hours);
        if let Some(table) = memo_get(&self.tvdb, ttl).await {
            return Ok(table);
        }

        let table = if let Some(table) =
            cache::get_json::<TvdbMappingTable>(self.cache.as_ref(), TVDB_MAPPING_CACHE_KEY).await
        {
            table
        } else {
            let body = self
                .http
                .get_text(&self.config.tvdb_mapping_url)
                .await
                .context("Failed to download TVDB mapping feed")?;
            let table = tokio::task::spawn_blocking(move || parse_tvdb_mappings(&body))
                .await
                .context("TVDB mapping parse task panicked")??;
            info!(entries = table.len(), "Loaded TVDB mapping feed");
            cache::set_json(self.cache.as_ref(), TVDB_MAPPING_CACHE_KEY, &table, ttl).await;
            table
        };

        Ok(memo_set(&self.tvdb, table).await)
    }

    pub async fn tvdb_mapping(&self, anidb_id: i32) -> Result<Option<TvdbMapping>> {
        Ok(self.tvdb_table().await?.get(&anidb_id).cloned())
    }
}

async fn memo_get<T>(memo: &Memo<T>, ttl: chrono::Duration) -> Option<Arc<T>> {
    let ttl = ttl.to_std().unwrap_or(Duration::ZERO);
    let guard = memo.read().await;
    guard
        .as_ref()
        .filter(|(loaded_at, _)| loaded_at.elapsed() < ttl)
        .map(|(_, table)| Arc::clone(table))
}

async fn memo_set<T>(memo: &Memo<T>, table: T) -> Arc<T> {
    let table = Arc::new(table);
    *memo.write().await = Some((Instant::now(), Arc::clone(&table)));
    table
}

/// Parses Fribb's feed: an array of objects with `*_id` keys.
///
/// The `_id` suffix is dropped from every key and the `type` field is skipped.
/// Entries without an AniList id cannot be looked up and are ignored.
pub fn parse_provider_ids(body: &str) -> Result<ProviderIdTable> {
    let entries: Vec<serde_json::Map<String, serde_json::Value>> =
        serde_json::from_str(body).context("Provider id feed is not a JSON array")?;

    let mut table = HashMap::with_capacity(entries.len());
    for entry in entries {
        let mut ids = ProviderIds::new();
        for (key, value) in entry {
            if key == "type" || value.is_null() {
                continue;
            }
            let name = key.strip_suffix("_id").unwrap_or(&key).to_string();
            ids.insert(name, value);
        }

        let Some(anilist_id) = ids
            .get("anilist")
            .and_then(serde_json::Value::as_i64)
            .and_then(|id| i32::try_from(id).ok())
        else {
            continue;
        };
        table.insert(anilist_id, ids);
    }

    Ok(table)
}

/// Parses the anime-lists XML feed.
///
/// Entries without a default season, or whose TVDB id is missing, `unknown`,
/// `hentai` or `OVA`, are skipped.
/// `movie` entries are kept so callers can recognise and skip them.
pub fn parse_tvdb_mappings(body: &str) -> Result<TvdbMappingTable> {
    let list: AnimeListXml =
        quick_xml::de::from_str(body).context("TVDB mapping feed is not valid anime-list XML")?;

    let mut table = HashMap::with_capacity(list.anime.len());
    for entry in list.anime {
        let Ok(anidb_id) = entry.anidb_id.trim().parse::<i32>() else {
            continue;
        };
        let Some(tvdb_id) = entry
            .tvdb_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty() && !matches!(id.as_str(), "unknown" | "hentai" | "OVA"))
        else {
            continue;
        };

        let season = match entry.default_season.as_deref().map(str::trim) {
            Some("a") => TvdbSeason::Absolute,
            Some(s) => match s.parse() {
                Ok(n) => TvdbSeason::Numbered(n),
                Err(_) => continue,
            },
            None => continue,
        };
        let episode_offset = entry
            .episode_offset
            .and_then(|o| o.trim().parse().ok())
            .unwrap_or(0);
        let imdb_id = entry
            .imdb_id
            .map(|id| id.trim().to_string())
            .filter(|id| id.starts_with("tt"));

        table.insert(
            anidb_id,
            TvdbMapping {
                tvdb_id,
                season,
                episode_offset,
                imdb_id,
            },
        );
    }

    debug!(entries = table.len(), "Parsed TVDB mapping feed");
    Ok(table)
}
