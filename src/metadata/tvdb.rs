use anyhow::Result;
use chrono::{NaiveDate, TimeZone, Utc};
use reqwest::StatusCode;
use scraper::{ElementRef, Html, Selector};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, OnceLock};
use tracing::{debug, instrument};

use super::{MetaProvider, anidb_id};
use crate::clients::http::HttpFetcher;
use crate::clients::mappings::{MappingClient, TvdbMapping, TvdbSeason};
use crate::config::MetadataConfig;
use crate::entities::{anime, episodes};
use crate::models::EpisodeMeta;
use crate::scrapers::html::{child_attr, parse_selector, selector, text};

static EPISODE_ROW: OnceLock<Selector> = OnceLock::new();
static CELL: OnceLock<Selector> = OnceLock::new();
static LINK: OnceLock<Selector> = OnceLock::new();
static PARAGRAPH: OnceLock<Selector> = OnceLock::new();
static THUMBNAIL: OnceLock<Selector> = OnceLock::new();
static AIR_DATE: OnceLock<Selector> = OnceLock::new();
static EPISODE_CODE: OnceLock<regex::Regex> = OnceLock::new();

fn get_regex(cell: &'static OnceLock<regex::Regex>, pattern: &str) -> &'static regex::Regex {
    cell.get_or_init(|| regex::Regex::new(pattern).expect("Invalid regex pattern defined in code"))
}

/// Placeholder titles TVDB shows before an episode is named.
fn is_placeholder(title: &str) -> bool {
    title == "TBA" || title == "TBD" || title.starts_with("Episode")
}

/// TheTVDB, scraped from its public series, season and episode pages.
pub struct TvdbProvider {
    http: HttpFetcher,
    mappings: Arc<MappingClient>,
    base_url: String,
    enabled: bool,
}

impl TvdbProvider {
    #[must_use]
    pub fn new(http: HttpFetcher, mappings: Arc<MappingClient>, config: &MetadataConfig) -> Self {
        Self {
            http,
            mappings,
            base_url: config.tvdb_url.trim_end_matches('/').to_string(),
            enabled: config.tvdb_enabled,
        }
    }

    /// Body of a page, or `None` on 404.
    async fn page(&self, url: &str) -> Result<Option<String>> {
        let (status, body) = self.http.get_with_status(url, &[]).await?;
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            anyhow::bail!("TVDB returned {status} for {url}");
        }
        Ok(Some(body))
    }

    fn absolute(&self, href: &str) -> String {
        if href.starts_with("http") {
            href.to_string()
        } else {
            format!("{}{href}", self.base_url)
        }
    }
}

#[async_trait::async_trait]
impl MetaProvider for TvdbProvider {
    fn name(&self) -> &'static str {
        "TvDB"
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    #[instrument(skip_all, fields(anime_id = %anime.id))]
    async fn load_meta(
        &self,
        anime: &anime::Model,
        episodes: &[episodes::Model],
        excluded: &BTreeSet<i32>,
    ) -> Result<Vec<EpisodeMeta>> {
        let Some(aid) = anidb_id(anime) else {
            return Ok(Vec::new());
        };
        let Some(mapping) = self.mappings.tvdb_mapping(aid).await? else {
            return Ok(Vec::new());
        };
        if mapping.is_movie() {
            return Ok(Vec::new());
        }

        let series_url = format!("{}/dereferrer/series/{}", self.base_url, mapping.tvdb_id);
        let Some(series) = self.page(&series_url).await? else {
            return Ok(Vec::new());
        };
        let Some(season_href) = parse_season_link(&series, mapping.season)? else {
            return Ok(Vec::new());
        };

        let Some(season) = self.page(&self.absolute(&season_href)).await? else {
            return Ok(Vec::new());
        };
        let rows = parse_season_rows(&season, &mapping, excluded);
        debug!(tvdb_id = %mapping.tvdb_id, rows = rows.len(), "TVDB season parsed");

        let mut metas = Vec::new();
        for episode in episodes.iter().filter(|e| !excluded.contains(&e.number)) {
            let Some((_, href)) = rows
                .iter()
                .find(|(n, _)| n - mapping.episode_offset == episode.number)
            else {
                continue;
            };

            let Some(page) = self.page(&self.absolute(href)).await? else {
                continue;
            };
            metas.push(parse_episode_page(&page, episode.number)?);
        }

        Ok(metas)
    }
}

/// Link to the season listing that matches the mapping's season.
fn parse_season_link(body: &str, season: TvdbSeason) -> Result<Option<String>> {
    let css = match season {
        TvdbSeason::Absolute => {
            r#"#tab-absolute > ul > .list-group-item[data-number="1"] a"#.to_string()
        }
        TvdbSeason::Numbered(n) => {
            format!(r#"#tab-official > ul > .list-group-item[data-number="{n}"] a"#)
        }
    };
    let link = parse_selector(&css)?;
    let doc = Html::parse_document(body);

    Ok(doc
        .select(&link)
        .next()
        .and_then(|a| a.value().attr("href"))
        .map(ToString::to_string))
}

/// `(tvdb episode number, episode page href)` for rows past the offset.
fn parse_season_rows(
    body: &str,
    mapping: &TvdbMapping,
    excluded: &BTreeSet<i32>,
) -> Vec<(i32, String)> {
    let doc = Html::parse_document(body);
    let cell = selector(&CELL, "td");
    let link = selector(&LINK, "a");
    let code = get_regex(&EPISODE_CODE, r"S(\d+)E(\d+)");

    doc.select(selector(&EPISODE_ROW, "tbody > tr"))
        .filter_map(|row| {
            let cells: Vec<ElementRef<'_>> = row.select(cell).collect();
            let label = text(*cells.first()?);
            let number: i32 = code.captures(&label)?.get(2)?.as_str().parse().ok()?;

            if excluded.contains(&number) || number <= mapping.episode_offset {
                return None;
            }
            let href = child_attr(*cells.get(1)?, link, "href")?;
            Some((number, href))
        })
        .collect()
}

fn parse_episode_page(body: &str, number: i32) -> Result<EpisodeMeta> {
    let doc = Html::parse_document(body);

    let translation = |lang: &str| -> Result<(Option<String>, Option<String>)> {
        let css = format!(r#"#translations > .change_translation_text[data-language="{lang}"]"#);
        let Some(element) = doc.select(&parse_selector(&css)?).next() else {
            return Ok((None, None));
        };

        let title = element
            .value()
            .attr("data-title")
            .map(str::trim)
            .filter(|t| !t.is_empty() && !is_placeholder(t))
            .map(ToString::to_string);
        let description = element
            .select(selector(&PARAGRAPH, "p"))
            .next()
            .map(|p| text(p).replace("\n\n", "\n"))
            .filter(|d| !d.is_empty());
        Ok((title, description))
    };

    let (native, _) = translation("jpn")?;
    let (english, description) = translation("eng")?;

    let image = doc
        .select(selector(&THUMBNAIL, ".thumbnail > img"))
        .next()
        .and_then(|img| img.value().attr("src"))
        .map(ToString::to_string);

    let aired_at = doc
        .select(selector(&AIR_DATE, r#"a[href^="/on-today/"]"#))
        .next()
        .map(text)
        .and_then(|d| NaiveDate::parse_from_str(&d, "%B %d, %Y").ok())
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|d| Utc.from_utc_datetime(&d));

    let mut title_variations = HashMap::new();
    if let Some(t) = &native {
        title_variations.insert("native".to_string(), t.clone());
    }
    if let Some(t) = &english {
        title_variations.insert("english".to_string(), t.clone());
    }

    Ok(EpisodeMeta {
        number,
        title: english,
        title_variations,
        description,
        image,
        aired_at,
    })
}
