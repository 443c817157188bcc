use anyhow::{Context, Result, bail};
use chrono::{NaiveDate, TimeZone, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

use super::{MetaProvider, anidb_id};
use crate::clients::http::HttpFetcher;
use crate::config::MetadataConfig;
use crate::entities::{anime, episodes};
use crate::models::EpisodeMeta;

#[derive(Debug, Deserialize)]
struct AnimeXml {
    #[serde(default)]
    episodes: Option<EpisodesXml>,
}

#[derive(Debug, Deserialize)]
struct EpisodesXml {
    #[serde(rename = "episode", default)]
    episode: Vec<EpisodeXml>,
}

#[derive(Debug, Deserialize)]
struct EpisodeXml {
    epno: TextNode,
    #[serde(default)]
    airdate: Option<String>,
    #[serde(rename = "title", default)]
    titles: Vec<TitleXml>,
    #[serde(default)]
    summary: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TextNode {
    #[serde(rename = "$text", default)]
    value: String,
}

#[derive(Debug, Deserialize)]
struct TitleXml {
    #[serde(rename = "@xml:lang", alias = "@lang", default)]
    lang: String,
    #[serde(rename = "$text", default)]
    text: String,
}

/// AniDB HTTP API. Titles, summaries and air dates, never images.
pub struct AnidbProvider {
    http: HttpFetcher,
    url: String,
    client: String,
    client_version: String,
    enabled: bool,
}

impl AnidbProvider {
    #[must_use]
    pub fn new(http: HttpFetcher, config: &MetadataConfig) -> Self {
        Self {
            http,
            url: config.anidb_url.clone(),
            client: config.anidb_client.clone(),
            client_version: config.anidb_client_version.clone(),
            enabled: config.anidb_enabled,
        }
    }
}

#[async_trait::async_trait]
impl MetaProvider for AnidbProvider {
    fn name(&self) -> &'static str {
        "AniDB"
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    async fn load_meta(
        &self,
        anime: &anime::Model,
        _episodes: &[episodes::Model],
        excluded: &BTreeSet<i32>,
    ) -> Result<Vec<EpisodeMeta>> {
        let Some(aid) = anidb_id(anime) else {
            return Ok(Vec::new());
        };

        let url = format!(
            "{}?request=anime&client={}&clientver={}&protover=1&aid={aid}",
            self.url, self.client, self.client_version
        );
        let (status, body) = self.http.get_with_status(&url, &[]).await?;
        if status == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }

        let metas = parse_anime(&body)?;
        debug!(aid, count = metas.len(), "AniDB episodes parsed");
        Ok(metas
            .into_iter()
            .filter(|m| !excluded.contains(&m.number))
            .collect())
    }
}

fn parse_anime(body: &str) -> Result<Vec<EpisodeMeta>> {
    if body.trim_start().starts_with("<error") {
        bail!("AniDB refused the request: {}", body.trim());
    }

    let anime: AnimeXml = quick_xml::de::from_str(body).context("Unexpected AniDB XML")?;
    let episodes = anime.episodes.map(|e| e.episode).unwrap_or_default();

    Ok(episodes
        .into_iter()
        .filter_map(|episode| {
            let number: i32 = episode.epno.value.trim().parse().ok()?;

            let title_for = |lang: &str| {
                episode
                    .titles
                    .iter()
                    .find(|t| t.lang == lang)
                    .map(|t| t.text.trim().to_string())
                    .filter(|t| !t.is_empty())
            };
            let japanese = title_for("ja");
            let english = title_for("en");

            let mut title_variations = HashMap::new();
            if let Some(t) = &japanese {
                title_variations.insert("japanese".to_string(), t.clone());
            }
            if let Some(t) = &english {
                title_variations.insert("english".to_string(), t.clone());
            }

            let aired_at = episode
                .airdate
                .as_deref()
                .and_then(|d| NaiveDate::parse_from_str(d.trim(), "%Y-%m-%d").ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|d| Utc.from_utc_datetime(&d));

            Some(EpisodeMeta {
                number,
                title: english,
                title_variations,
                description: episode.summary.filter(|s| !s.trim().is_empty()),
                image: None,
                aired_at,
            })
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<anime id="17617" restricted="false">
  <type>TV Series</type>
  <episodecount>28</episodecount>
  <episodes>
    <episode id="271434" update="2023-09-30">
      <epno type="1">1</epno>
      <length>25</length>
      <airdate>2023-09-29</airdate>
      <rating votes="12">8.42</rating>
      <title xml:lang="ja">冒険の終わり</title>
      <title xml:lang="en">The Journey's End</title>
      <title xml:lang="x-jat">Bouken no Owari</title>
      <summary>The hero party returns.</summary>
    </episode>
    <episode id="271500" update="2023-10-01">
      <epno type="2">S1</epno>
      <length>5</length>
      <title xml:lang="en">Recap</title>
    </episode>
    <episode id="271435" update="2023-10-06">
      <epno type="1">2</epno>
      <length>25</length>
      <airdate>2023-10-06</airdate>
      <title xml:lang="en">It Didn't Have to Be Magic...</title>
    </episode>
  </episodes>
</anime>"#;

    #[test]
    fn test_parse_regular_episodes_only() {
        let metas = parse_anime(SAMPLE).unwrap();
        assert_eq!(metas.len(), 2);

        let first = &metas[0];
        assert_eq!(first.number, 1);
        assert_eq!(first.title.as_deref(), Some("The Journey's End"));
        assert_eq!(first.title_variations.get("japanese").map(String::as_str), Some("冒険の終わり"));
        assert_eq!(first.description.as_deref(), Some("The hero party returns."));
        assert_eq!(
            first.aired_at.map(crate::db::timestamp).as_deref(),
            Some("2023-09-29T00:00:00.000000Z")
        );
        assert!(first.image.is_none());

        assert_eq!(metas[1].number, 2);
        assert!(metas[1].description.is_none());
        assert!(!metas[1].title_variations.contains_key("japanese"));
    }

    #[test]
    fn test_error_document() {
        assert!(parse_anime("<error>Banned</error>").is_err());
    }
}
