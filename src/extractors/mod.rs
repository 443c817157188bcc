//! Host-specific decoders turning an embed page into a playable URL.

pub mod crypto;
pub mod gogocdn;
pub mod keys;
pub mod rapidcloud;
pub mod streamtape;

use std::sync::Arc;

use crate::clients::http::HttpFetcher;
use crate::error::ScrapeError;
use crate::models::{SourceParams, Subtitle};

pub use gogocdn::GogoCdn;
pub use keys::{KeyRotation, KeySource};
pub use rapidcloud::{RapidCloud, RapidCloudKeySource};
pub use streamtape::StreamTape;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedVideo {
    pub url: String,
    /// HLS playlist rather than a progressive file.
    pub is_stream: bool,
    pub subtitles: Vec<Subtitle>,
}

impl ExtractedVideo {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            is_stream: url.contains(".m3u8"),
            url,
            subtitles: Vec::new(),
        }
    }
}

#[async_trait::async_trait]
pub trait VideoExtractor: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether embeds served from `host` belong to this extractor.
    fn handles(&self, host: &str) -> bool;

    async fn extract(
        &self,
        embed_url: &str,
        params: &SourceParams,
    ) -> Result<ExtractedVideo, ScrapeError>;
}

/// The extractors available to scraper plugins, looked up by embed host.
#[derive(Clone)]
pub struct ExtractorSet {
    extractors: Vec<Arc<dyn VideoExtractor>>,
}

impl ExtractorSet {
    #[must_use]
    pub fn new(extractors: Vec<Arc<dyn VideoExtractor>>) -> Self {
        Self { extractors }
    }

    #[must_use]
    pub fn standard(http: &HttpFetcher) -> Self {
        Self::new(vec![
            Arc::new(GogoCdn::new(http.clone())),
            Arc::new(RapidCloud::new(http.clone())),
            Arc::new(StreamTape::new(http.clone())),
        ])
    }

    #[must_use]
    pub fn by_name(&self, name: &str) -> Option<Arc<dyn VideoExtractor>> {
        self.extractors.iter().find(|e| e.name() == name).cloned()
    }

    #[must_use]
    pub fn for_url(&self, embed_url: &str) -> Option<Arc<dyn VideoExtractor>> {
        let url = url::Url::parse(embed_url).ok()?;
        let host = url.host_str()?;
        self.extractors.iter().find(|e| e.handles(host)).cloned()
    }

    /// Runs the extractor owning the embed host, or `fallback` when no extractor claims it.
    pub async fn extract(
        &self,
        embed_url: &str,
        params: &SourceParams,
        fallback: &str,
    ) -> Result<ExtractedVideo, ScrapeError> {
        let extractor = self
            .for_url(embed_url)
            .or_else(|| self.by_name(fallback))
            .ok_or_else(|| ScrapeError::NotFound(format!("No extractor for {embed_url}")))?;
        extractor.extract(embed_url, params).await
    }
}
