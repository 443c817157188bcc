use serde::Deserialize;
use serde_json::Value;

use super::crypto::decrypt_with_passphrase;
use super::keys::KeySource;
use super::{ExtractedVideo, VideoExtractor};
use crate::clients::http::{HttpFetcher, USER_AGENT};
use crate::error::ScrapeError;
use crate::models::{SourceParams, Subtitle};

const HOST: &str = "https://rapid-cloud.co";
const DEFAULT_TRACK_LABEL: &str = "Default (maybe)";

#[derive(Debug, Deserialize)]
struct SourcesResponse {
    /// Either a plain list or, when `encrypted`, a passphrase envelope string.
    sources: Value,
    #[serde(default)]
    encrypted: bool,
    #[serde(default)]
    tracks: Vec<Track>,
}

#[derive(Debug, Deserialize)]
struct Track {
    file: String,
    #[serde(default)]
    label: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SourceFile {
    file: String,
}

pub struct RapidCloud {
    http: HttpFetcher,
}

impl RapidCloud {
    #[must_use]
    pub const fn new(http: HttpFetcher) -> Self {
        Self { http }
    }
}

#[async_trait::async_trait]
impl VideoExtractor for RapidCloud {
    fn name(&self) -> &'static str {
        "rapidcloud"
    }

    fn handles(&self, host: &str) -> bool {
        host.contains("rapid-cloud")
    }

    async fn extract(
        &self,
        embed_url: &str,
        params: &SourceParams,
    ) -> Result<ExtractedVideo, ScrapeError> {
        let id = embed_id(embed_url);
        let referer = params.referer.as_deref().unwrap_or(embed_url);

        let url = format!("{HOST}/ajax/embed-6/getSources?id={id}");
        let response: SourcesResponse = self
            .http
            .get_json(
                &url,
                &[
                    ("X-Requested-With", "XMLHttpRequest"),
                    ("Referer", referer),
                    ("User-Agent", USER_AGENT),
                ],
            )
            .await?;

        parse_response(response, params.decryption_key.as_deref())
    }
}

/// Last path segment of the embed URL, without the query string.
fn embed_id(embed_url: &str) -> &str {
    let last = embed_url.rsplit('/').next().unwrap_or(embed_url);
    last.split('?').next().unwrap_or(last)
}

fn parse_response(
    response: SourcesResponse,
    key: Option<&str>,
) -> Result<ExtractedVideo, ScrapeError> {
    let sources: Vec<SourceFile> = if response.encrypted {
        let envelope = response.sources.as_str().ok_or_else(|| {
            ScrapeError::UpstreamLogicMismatch("Encrypted sources are not a string".to_string())
        })?;
        let key = key.ok_or_else(|| {
            ScrapeError::UpstreamLogicMismatch("RapidCloud key not loaded yet".to_string())
        })?;
        let plain = decrypt_with_passphrase(envelope, key)?;
        serde_json::from_str(&plain)
    } else {
        serde_json::from_value(response.sources)
    }
    .map_err(|e| ScrapeError::UpstreamLogicMismatch(format!("Unexpected RapidCloud sources: {e}")))?;

    let first = sources
        .into_iter()
        .next()
        .ok_or_else(|| ScrapeError::NotFound("RapidCloud returned no sources".to_string()))?;

    let mut video = ExtractedVideo::new(first.file);
    video.subtitles = response
        .tracks
        .into_iter()
        .map(|t| Subtitle {
            url: t.file,
            lang: t
                .label
                .filter(|l| !l.is_empty())
                .unwrap_or_else(|| DEFAULT_TRACK_LABEL.to_string()),
        })
        .collect();
    Ok(video)
}

/// Fetches the current RapidCloud passphrase, published as plain text.
pub struct RapidCloudKeySource {
    http: HttpFetcher,
    url: String,
}

impl RapidCloudKeySource {
    #[must_use]
    pub fn new(http: HttpFetcher, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
        }
    }
}

#[async_trait::async_trait]
impl KeySource for RapidCloudKeySource {
    type Key = String;

    fn name(&self) -> &'static str {
        "rapidcloud"
    }

    async fn load(&self) -> Result<String, ScrapeError> {
        let key = self.http.get_text(&self.url).await?.trim().to_string();
        if key.is_empty() {
            return Err(ScrapeError::UpstreamLogicMismatch(
                "RapidCloud key file is empty".to_string(),
            ));
        }
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embed_id() {
        assert_eq!(embed_id("https://rapid-cloud.co/embed-6/AbC123?vast=1"), "AbC123");
        assert_eq!(embed_id("https://rapid-cloud.co/embed-6/AbC123"), "AbC123");
    }

    #[test]
    fn test_plain_sources_with_tracks() {
        let response: SourcesResponse = serde_json::from_str(
            r#"{
                "sources": [{"file": "https://cdn.example/a.m3u8", "type": "hls"}],
                "encrypted": false,
                "tracks": [
                    {"file": "https://cdn.example/en.vtt", "label": "English"},
                    {"file": "https://cdn.example/unk.vtt"}
                ]
            }"#,
        )
        .unwrap();

        let video = parse_response(response, None).unwrap();
        assert_eq!(video.url, "https://cdn.example/a.m3u8");
        assert_eq!(video.subtitles.len(), 2);
        assert_eq!(video.subtitles[0].lang, "English");
        assert_eq!(video.subtitles[1].lang, "Default (maybe)");
    }

    #[test]
    fn test_encrypted_sources() {
        let response: SourcesResponse = serde_json::from_str(
            r#"{
                "sources": "U2FsdGVkX18BAgMEBQYHCFMw5iB5RTAgLH4kLqym5KlPX8utyf0tPy8CmV0oFfVc8+AAfRxTI5ezD1WGUmx3hVYxQsG0PhwsMKQH2GhRAYs=",
                "encrypted": true,
                "tracks": []
            }"#,
        )
        .unwrap();

        let video = parse_response(response, Some("c1d17096f2ca11b7")).unwrap();
        assert_eq!(video.url, "https://cdn.example/master.m3u8");
        assert!(video.is_stream);
    }

    #[test]
    fn test_encrypted_sources_need_a_key() {
        let response: SourcesResponse =
            serde_json::from_str(r#"{"sources": "U2FsdGVkX1", "encrypted": true}"#).unwrap();
        assert!(matches!(
            parse_response(response, None),
            Err(ScrapeError::UpstreamLogicMismatch(_))
        ));
    }
}
