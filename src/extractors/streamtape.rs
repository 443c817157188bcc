use regex::Regex;
use std::sync::OnceLock;

use super::{ExtractedVideo, VideoExtractor};
use crate::clients::http::HttpFetcher;
use crate::error::ScrapeError;
use crate::models::SourceParams;

static ROBOTLINK: OnceLock<Regex> = OnceLock::new();

fn get_regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("Invalid regex pattern defined in code"))
}

pub struct StreamTape {
    http: HttpFetcher,
}

impl StreamTape {
    #[must_use]
    pub const fn new(http: HttpFetcher) -> Self {
        Self { http }
    }
}

#[async_trait::async_trait]
impl VideoExtractor for StreamTape {
    fn name(&self) -> &'static str {
        "streamtape"
    }

    fn handles(&self, host: &str) -> bool {
        host.contains("streamtape")
    }

    async fn extract(
        &self,
        embed_url: &str,
        _params: &SourceParams,
    ) -> Result<ExtractedVideo, ScrapeError> {
        let page = self.http.get_text(embed_url).await?;
        parse_robotlink(&page).map(ExtractedVideo::new)
    }
}

/// The player assembles the link from two string literals in an inline script:
/// `document.getElementById('robotlink').innerHTML = '//host/get_video?id=...'+ ('xcd&token=...')`.
/// The first three characters of the second literal are junk.
fn parse_robotlink(page: &str) -> Result<String, ScrapeError> {
    let expr = get_regex(&ROBOTLINK, r"robotlink'\).innerHTML = (.*)'")
        .captures(page)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .ok_or_else(|| ScrapeError::NotFound("Video not found".to_string()))?;

    let (first, second) = expr
        .split_once("+ ('")
        .ok_or_else(|| ScrapeError::UpstreamLogicMismatch("Unexpected robotlink".to_string()))?;

    let first = first.replace('"', "");
    let second = second.get(3..).unwrap_or_default();

    Ok(format!("https:{first}{second}").replace('\'', ""))
}
