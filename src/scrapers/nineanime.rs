use base64::Engine;
use base64::engine::general_purpose::STANDARD_NO_PAD;
use scraper::{Html, Selector};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::sync::OnceLock;

use super::html::{child_attr, child_text, first_attr, selector};
use super::{Scraper, WebPage, whole_episode_number};
use crate::clients::http::HttpFetcher;
use crate::error::ScrapeError;
use crate::extractors::{KeyRotation, KeySource};
use crate::matcher;
use crate::models::{ScrapedEpisode, TitleVariants};

static RESULT_ITEM: OnceLock<Selector> = OnceLock::new();
static RESULT_TITLE: OnceLock<Selector> = OnceLock::new();
static RESULT_LINK: OnceLock<Selector> = OnceLock::new();
static WATCH_MAIN: OnceLock<Selector> = OnceLock::new();
static EPISODE_LINK: OnceLock<Selector> = OnceLock::new();
static SPAN: OnceLock<Selector> = OnceLock::new();

#[derive(Debug, Clone, Deserialize)]
pub struct NineAnimeKeys {
    pub cipher: String,
}

#[derive(Debug, Deserialize)]
struct AjaxResult {
    result: String,
}

/// Episode existence and titles from 9anime. Disabled unless overridden.
pub struct NineAnime {
    http: HttpFetcher,
    url: String,
    keys: KeyRotation<NineAnimeKeys>,
}

impl NineAnime {
    #[must_use]
    pub fn new(http: HttpFetcher, url: &str, keys: KeyRotation<NineAnimeKeys>) -> Self {
        Self {
            http,
            url: url.trim_end_matches('/').to_string(),
            keys,
        }
    }

    /// The `vrf` request signature for a query.
    async fn vrf(&self, query: &str) -> Result<String, ScrapeError> {
        let keys = self
            .keys
            .current()
            .await
            .ok_or_else(|| ScrapeError::UpstreamTransient {
                service: "9anime".to_string(),
                message: "cipher key not loaded yet".to_string(),
            })?;
        Ok(signature(query, &keys.cipher))
    }
}

#[async_trait::async_trait]
impl Scraper for NineAnime {
    fn id(&self) -> &'static str {
        "9anime"
    }

    fn name(&self) -> &'static str {
        "9anime"
    }

    fn url(&self) -> &str {
        &self.url
    }

    fn enabled_by_default(&self) -> bool {
        false
    }

    fn info_only(&self) -> bool {
        true
    }

    async fn match_title(&self, titles: &TitleVariants) -> Result<Option<WebPage>, ScrapeError> {
        let Some(current) = titles.current.as_deref() else {
            return Ok(None);
        };

        let vrf = self.vrf(current).await?;
        let url = format!(
            "{}/filter?keyword={}&vrf={}&page=1",
            self.url,
            urlencoding::encode(current).replace("%20", "+"),
            urlencoding::encode(&vrf)
        );
        let body = self.http.get_text(&url).await?;
        let results = parse_results(&body, &self.url);

        Ok(pick_result(titles, results))
    }

    async fn fetch(
        &self,
        path: &str,
        start: i32,
        end: i32,
        excluded: &BTreeSet<i32>,
    ) -> Result<Vec<ScrapedEpisode>, ScrapeError> {
        let page_url = if path.starts_with("http") {
            path.to_string()
        } else {
            format!("{}{path}", self.url)
        };
        let page = self.http.get_text(&page_url).await?;
        let id = parse_watch_id(&page)
            .ok_or_else(|| ScrapeError::UpstreamLogicMismatch(format!("No watch id on {path}")))?;

        let vrf = self.vrf(&id).await?;
        let list_url = format!(
            "{}/ajax/episode/list/{id}?vrf={}",
            self.url,
            urlencoding::encode(&vrf)
        );
        let list: AjaxResult = self.http.get_json(&list_url, &[]).await?;

        Ok(parse_episodes(&list.result, &self.url)
            .into_iter()
            .filter(|e| {
                e.whole_number()
                    .is_some_and(|n| n >= start && n <= end && !excluded.contains(&n))
            })
            .collect())
    }
}

fn parse_results(body: &str, base: &str) -> Vec<WebPage> {
    let doc = Html::parse_document(body);
    let title = selector(&RESULT_TITLE, "div > div.info > div.b1 > a");
    let link = selector(&RESULT_LINK, "div > div.ani > a");

    doc.select(selector(&RESULT_ITEM, "#list-items > div.item"))
        .filter_map(|item| {
            Some(WebPage {
                title: child_text(item, title)?,
                path: format!("{base}{}", child_attr(item, link, "href")?),
            })
        })
        .collect()
}

/// Strict matching: the first result against every alternative, then every result.
fn pick_result(titles: &TitleVariants, results: Vec<WebPage>) -> Option<WebPage> {
    let exact = |alt: &str, page: &WebPage| {
        matcher::deep_match(alt, &page.title, false, matcher::DEFAULT_THRESHOLD)
    };

    let first = results.first()?;
    if titles.alternatives().any(|alt| exact(alt, first)) {
        return Some(first.clone());
    }

    titles
        .alternatives()
        .find_map(|alt| results.iter().find(|page| exact(alt, page)))
        .cloned()
}

fn parse_watch_id(body: &str) -> Option<String> {
    let doc = Html::parse_document(body);
    first_attr(&doc, selector(&WATCH_MAIN, "#watch-main"), "data-id")
}

fn parse_episodes(fragment: &str, base: &str) -> Vec<ScrapedEpisode> {
    let doc = Html::parse_fragment(fragment);
    let span = selector(&SPAN, "span");

    doc.select(selector(&EPISODE_LINK, "div.episodes > ul > li > a"))
        .filter_map(|a| {
            let ids = a.value().attr("data-ids")?;
            let id = ids.split(',').next()?.trim();
            let number = whole_episode_number(a.value().attr("data-num")?)?;

            let mut episode = ScrapedEpisode::proxy(number, format!("{base}/ajax/server/list/{id}"));
            episode.title = child_text(a, span).filter(|t| !t.is_empty());
            Some(episode)
        })
        .collect()
}

/// RC4 over the URL-encoded query, then unpadded base64.
fn signature(query: &str, key: &str) -> String {
    let encoded = urlencoding::encode(query);
    STANDARD_NO_PAD.encode(rc4(key.as_bytes(), encoded.as_bytes()))
}

fn rc4(key: &[u8], data: &[u8]) -> Vec<u8> {
    if key.is_empty() {
        return data.to_vec();
    }

    let mut state: [u8; 256] = std::array::from_fn(|i| u8::try_from(i).unwrap_or_default());
    let mut j: u8 = 0;
    for i in 0..256 {
        j = j.wrapping_add(state[i]).wrapping_add(key[i % key.len()]);
        state.swap(i, usize::from(j));
    }

    let (mut i, mut j) = (0u8, 0u8);
    data.iter()
        .map(|byte| {
            i = i.wrapping_add(1);
            j = j.wrapping_add(state[usize::from(i)]);
            state.swap(usize::from(i), usize::from(j));
            let k = state[usize::from(state[usize::from(i)].wrapping_add(state[usize::from(j)]))];
            byte ^ k
        })
        .collect()
}

/// Loads the rotating `{cipher, decipher}` key pair.
pub struct NineAnimeKeySource {
    http: HttpFetcher,
    url: String,
}

impl NineAnimeKeySource {
    #[must_use]
    pub fn new(http: HttpFetcher, url: &str) -> Self {
        Self {
            http,
            url: url.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl KeySource for NineAnimeKeySource {
    type Key = NineAnimeKeys;

    fn name(&self) -> &'static str {
        "9anime"
    }

    async fn load(&self) -> Result<NineAnimeKeys, ScrapeError> {
        self.http.get_json(&self.url, &[]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rc4_reference_vector() {
        assert_eq!(
            rc4(b"Key", b"Plaintext"),
            [0xbb, 0xf3, 0x16, 0xe8, 0xd9, 0x40, 0xaf, 0x0a, 0xd3]
        );
    }

    #[test]
    fn test_signature() {
        assert_eq!(signature("abc", "Key"), "iv0U");
        assert_eq!(signature("Frieren 2", "kMXzgyNzT3k5dYab"), "gLHAq6RRTCqmc+I");
    }

    fn titles(english: &str, romaji: &str) -> TitleVariants {
        TitleVariants {
            english: Some(english.to_string()),
            romaji: Some(romaji.to_string()),
            current: Some(english.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_results_and_strict_pick() {
        let body = r#"<div id="list-items">
            <div class="item"><div class="inner">
                <div class="ani"><a href="/watch/frieren-recap.1"></a></div>
                <div class="info"><div class="b1"><a>Frieren Recap Special</a></div></div>
            </div></div>
            <div class="item"><div class="inner">
                <div class="ani"><a href="/watch/sousou-no-frieren.3rk5"></a></div>
                <div class="info"><div class="b1"><a>Sousou no Frieren</a></div></div>
            </div></div>
        </div>"#;

        let results = parse_results(body, "https://9anime.id");
        assert_eq!(results.len(), 2);
        assert_eq!(results[1].path, "https://9anime.id/watch/sousou-no-frieren.3rk5");

        let picked = pick_result(&titles("Frieren: Beyond Journey's End", "Sousou no Frieren"), results).unwrap();
        assert_eq!(picked.title, "Sousou no Frieren");
    }

    #[test]
    fn test_no_results() {
        assert!(pick_result(&titles("A", "B"), Vec::new()).is_none());
    }

    #[test]
    fn test_episode_fragment() {
        let fragment = r#"<div class="episodes"><ul>
            <li><a data-ids="abc,def" data-num="1"><span>To the North</span></a></li>
            <li><a data-ids="ghi" data-num="2"><span></span></a></li>
            <li><a data-ids="jkl" data-num="2.5"></a></li>
        </ul></div>"#;
        let episodes = parse_episodes(fragment, "https://9anime.id");
        assert_eq!(episodes.len(), 2);
        assert_eq!(episodes[0].url, "https://9anime.id/ajax/server/list/abc");
        assert_eq!(episodes[0].title.as_deref(), Some("To the North"));
        assert_eq!(episodes[1].title, None);
    }
}
