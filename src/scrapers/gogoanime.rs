use scraper::{Html, Selector};
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::OnceLock;
use tracing::{debug, warn};

use super::html::{child_attr, child_text, first_attr, selector};
use super::{Scraper, WebPage, whole_episode_number};
use crate::clients::http::HttpFetcher;
use crate::config::ScraperConfig;
use crate::error::ScrapeError;
use crate::extractors::ExtractorSet;
use crate::matcher;
use crate::models::{RawSource, ScrapedEpisode, SourceParams, TitleVariants};

/// Accept the first search hit on this similarity to the current title alone.
const LOOSE_ACCEPT: f64 = 0.75;

static SEARCH_ITEM: OnceLock<Selector> = OnceLock::new();
static SEARCH_LINK: OnceLock<Selector> = OnceLock::new();
static MOVIE_ID: OnceLock<Selector> = OnceLock::new();
static EPISODE_ITEM: OnceLock<Selector> = OnceLock::new();
static EPISODE_NAME: OnceLock<Selector> = OnceLock::new();
static LINK: OnceLock<Selector> = OnceLock::new();
static IFRAME: OnceLock<Selector> = OnceLock::new();
static STREAMTAPE_SERVER: OnceLock<Selector> = OnceLock::new();

#[derive(Debug, Deserialize)]
struct ConsumetWatch {
    #[serde(default)]
    sources: Vec<ConsumetSource>,
    #[serde(default)]
    headers: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct ConsumetSource {
    url: String,
}

pub struct Gogoanime {
    http: HttpFetcher,
    extractors: ExtractorSet,
    url: String,
    ajax_url: String,
    consumet_url: String,
}

impl Gogoanime {
    #[must_use]
    pub fn new(http: HttpFetcher, extractors: ExtractorSet, config: &ScraperConfig) -> Self {
        Self {
            http,
            extractors,
            url: config.gogoanime_url.trim_end_matches('/').to_string(),
            ajax_url: config.gogoanime_ajax_url.trim_end_matches('/').to_string(),
            consumet_url: config.gogoanime_consumet_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait::async_trait]
impl Scraper for Gogoanime {
    fn id(&self) -> &'static str {
        "gogoanime"
    }

    fn name(&self) -> &'static str {
        "Gogoanime"
    }

    fn url(&self) -> &str {
        &self.url
    }

    fn priority(&self) -> i32 {
        1
    }

    async fn match_title(&self, titles: &TitleVariants) -> Result<Option<WebPage>, ScrapeError> {
        let Some(current) = titles.current.as_deref() else {
            return Ok(None);
        };

        let url = format!(
            "{}/search.html?keyword={}",
            self.url,
            urlencoding::encode(current)
        );
        let body = self.http.get_text(&url).await?;

        let Some(hit) = parse_first_search_hit(&body) else {
            return Ok(None);
        };

        let accepted = titles
            .alternatives()
            .any(|alt| matcher::matches(alt, &hit.title))
            || matcher::loose_similarity(current, &matcher::clean(&hit.title)) >= LOOSE_ACCEPT;

        Ok(accepted.then_some(hit))
    }

    async fn fetch(
        &self,
        path: &str,
        start: i32,
        end: i32,
        excluded: &BTreeSet<i32>,
    ) -> Result<Vec<ScrapedEpisode>, ScrapeError> {
        let page = self.http.get_text(&format!("{}{path}", self.url)).await?;
        let movie_id = parse_movie_id(&page)
            .ok_or_else(|| ScrapeError::UpstreamLogicMismatch(format!("No movie id on {path}")))?;

        let list_url = format!(
            "{}/load-list-episode?ep_start={start}&ep_end={end}&id={movie_id}",
            self.ajax_url
        );
        let list = self.http.get_text(&list_url).await?;

        let episodes = parse_episode_list(&list, excluded);
        debug!(path, count = episodes.len(), "Gogoanime episodes listed");
        Ok(episodes)
    }

    async fn raw_source(
        &self,
        target: &str,
        params: &SourceParams,
    ) -> Result<Option<RawSource>, ScrapeError> {
        let page = self.http.get_text(&format!("{}{target}", self.url)).await?;
        let (embed, streamtape) = parse_embeds(&page);

        let Some(embed) = embed else {
            return Ok(None);
        };

        let embed_params = SourceParams {
            referer: Some(embed.clone()),
            decryption_key: params.decryption_key.clone(),
        };

        let primary = self.extractors.extract(&embed, &embed_params, "gogocdn").await;
        let (video, referer) = match (primary, streamtape) {
            (Ok(video), _) => (video, embed),
            (Err(e), Some(backup)) => {
                warn!(target, error = %e, "Primary embed failed, trying StreamTape server");
                let video = self
                    .extractors
                    .extract(&backup, &SourceParams::default(), "streamtape")
                    .await?;
                (video, backup)
            }
            (Err(e), None) => return Err(e),
        };

        Ok(Some(RawSource {
            video: video.url,
            subtitles: video.subtitles,
            referer: Some(referer),
            headers: HashMap::new(),
            browser: true,
        }))
    }

    async fn consumet_source(&self, target: &str) -> Result<Option<RawSource>, ScrapeError> {
        let url = format!("{}/watch{target}", self.consumet_url);
        let watch: ConsumetWatch = self.http.get_json(&url, &[]).await?;

        let Some(first) = watch.sources.into_iter().next() else {
            return Ok(None);
        };

        Ok(Some(RawSource {
            video: first.url,
            subtitles: Vec::new(),
            referer: watch.headers.get("Referer").cloned(),
            headers: HashMap::new(),
            browser: true,
        }))
    }
}

fn parse_first_search_hit(body: &str) -> Option<WebPage> {
    let doc = Html::parse_document(body);
    let item = doc
        .select(selector(&SEARCH_ITEM, ".last_episodes > ul > li"))
        .next()?;
    let link = selector(&SEARCH_LINK, ".name > a");

    let title = child_attr(item, link, "title").filter(|t| !t.is_empty())?;
    let path = child_attr(item, link, "href")?;
    Some(WebPage { title, path })
}

fn parse_movie_id(body: &str) -> Option<String> {
    let doc = Html::parse_document(body);
    first_attr(&doc, selector(&MOVIE_ID, "#movie_id"), "value")
}

fn parse_episode_list(body: &str, excluded: &BTreeSet<i32>) -> Vec<ScrapedEpisode> {
    let doc = Html::parse_fragment(body);
    let name = selector(&EPISODE_NAME, "div.name");
    let link = selector(&LINK, "a");

    doc.select(selector(&EPISODE_ITEM, "#episode_related > li"))
        .filter_map(|li| {
            let label = child_text(li, name)?;
            let number = whole_episode_number(&label.replace("EP ", ""))?;
            let href = child_attr(li, link, "href").filter(|h| !h.is_empty())?;

            let mut episode = ScrapedEpisode::proxy(number, href);
            if episode.whole_number().is_some_and(|n| excluded.contains(&n)) {
                return None;
            }
            episode.format = Some("m3u8".to_string());
            Some(episode)
        })
        .collect()
}

/// The default player iframe and, when listed, the StreamTape mirror.
fn parse_embeds(body: &str) -> (Option<String>, Option<String>) {
    let doc = Html::parse_document(body);
    let iframe = first_attr(&doc, selector(&IFRAME, "iframe"), "src").map(|src| absolute(&src));
    let streamtape = first_attr(
        &doc,
        selector(
            &STREAMTAPE_SERVER,
            ".anime_muti_link > ul > li.streamtape > a[data-video]",
        ),
        "data-video",
    )
    .map(|src| absolute(&src));
    (iframe, streamtape)
}

fn absolute(src: &str) -> String {
    if src.starts_with("https:") {
        src.to_string()
    } else {
        format!("https:{src}")
    }
}
