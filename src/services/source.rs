use reqwest::{Client, StatusCode, header};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

use crate::config::SourceConfig;
use crate::db::Store;
use crate::entities::{sources, websites};
use crate::error::SourceError;
use crate::extractors::KeyRotation;
use crate::models::{RawSource, ResolvedSource, SourceParams, SourceType};
use crate::scrapers::ScraperRegistry;
use crate::services::cache::{KeyValueCache, get_json, set_json};

#[must_use]
pub fn cache_key(source_id: &str) -> String {
    format!("source-{source_id}")
}

/// Turns a stored source into a playable URL, with a short-lived cache in front.
pub struct SourceService {
    store: Store,
    cache: Arc<dyn KeyValueCache>,
    registry: ScraperRegistry,
    client: Client,
    rapidcloud_key: Arc<KeyRotation<String>>,
    ttl: chrono::Duration,
    liveness_timeout: Duration,
}

impl SourceService {
    #[must_use]
    pub fn new(
        store: Store,
        cache: Arc<dyn KeyValueCache>,
        registry: ScraperRegistry,
        client: Client,
        rapidcloud_key: Arc<KeyRotation<String>>,
        config: &SourceConfig,
    ) -> Self {
        Self {
            store,
            cache,
            registry,
            client,
            rapidcloud_key,
            ttl: chrono::Duration::hours(config.cache_ttl_hours),
            liveness_timeout: Duration::from_millis(config.liveness_timeout_ms),
        }
    }

    #[instrument(skip(self))]
    pub async fn get_source(&self, id: &str) -> Result<ResolvedSource, SourceError> {
        let start = Instant::now();
        let key = cache_key(id);

        if let Some(cached) = get_json::<ResolvedSource>(self.cache.as_ref(), &key).await {
            if self.is_alive(&cached).await {
                metrics::counter!("source_resolutions_total", "outcome" => "cache_hit").increment(1);
                return Ok(cached);
            }
            debug!(source_id = id, "Cached URL failed its liveness probe");
            if let Err(e) = self.cache.delete(&key).await {
                warn!(source_id = id, error = %e, "Failed to evict stale source");
            }
        }

        let result = self.resolve(id).await;
        let outcome = match &result {
            Ok(_) => "resolved",
            Err(SourceError::NotFound(_)) => "not_found",
            Err(SourceError::HardResolutionFailure(_)) => "unobtainable",
            Err(_) => "error",
        };
        metrics::counter!("source_resolutions_total", "outcome" => outcome).increment(1);

        let resolved = result?;
        set_json(self.cache.as_ref(), &key, &resolved, self.ttl).await;

        info!(
            event = "source_resolved",
            source_id = id,
            website = %resolved.website,
            duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            "Source resolved"
        );
        Ok(resolved)
    }

    async fn resolve(&self, id: &str) -> Result<ResolvedSource, SourceError> {
        let (source, website) = self
            .store
            .get_source_with_website(id)
            .await?
            .ok_or_else(|| SourceError::NotFound(id.to_string()))?;

        if source.source_type.parse::<SourceType>() == Ok(SourceType::Direct) {
            return Ok(ResolvedSource {
                id: source.id.clone(),
                url: source.target.clone(),
                subtitle: None,
                referer: source.referer.clone(),
                headers: Default::default(),
                priority: website.priority,
                browser: false,
                website: website.name,
            });
        }

        let plugin = self
            .registry
            .by_website(&website.id)
            .ok_or_else(|| SourceError::HardResolutionFailure(format!("{} is disabled", website.name)))?;

        let params = SourceParams {
            referer: source.referer.clone(),
            decryption_key: self.rapidcloud_key.current().await,
        };

        let raw = match plugin.raw_source(&source.target, &params).await {
            Ok(Some(raw)) => Some(raw),
            Ok(None) => None,
            Err(e) => {
                debug!(source_id = id, website = %website.name, error = %e, "Extraction failed, trying Consumet");
                None
            }
        };

        let raw = match raw {
            Some(raw) => raw,
            None => plugin
                .consumet_source(&source.target)
                .await
                .map_err(|e| SourceError::HardResolutionFailure(e.to_string()))?
                .ok_or_else(|| {
                    SourceError::HardResolutionFailure(format!(
                        "No extractor produced a URL for {id}"
                    ))
                })?,
        };

        Ok(to_resolved(&source, &website, raw))
    }

    /// HEAD against the cached URL. Anything but 200 counts as dead.
    async fn is_alive(&self, cached: &ResolvedSource) -> bool {
        let mut request = self.client.head(&cached.url).timeout(self.liveness_timeout);
        if let Some(referer) = &cached.referer {
            request = request.header(header::REFERER, referer);
        }
        match request.send().await {
            Ok(response) => response.status() == StatusCode::OK,
            Err(e) => {
                debug!(url = %cached.url, error = %e, "Liveness probe failed");
                false
            }
        }
    }
}

fn to_resolved(source: &sources::Model, website: &websites::Model, raw: RawSource) -> ResolvedSource {
    let subtitle = raw
        .subtitles
        .iter()
        .find(|s| s.lang.to_lowercase().starts_with("english"))
        .map(|s| s.url.clone());

    ResolvedSource {
        id: source.id.clone(),
        url: raw.video,
        subtitle,
        referer: raw.referer.or_else(|| source.referer.clone()),
        headers: raw.headers,
        priority: website.priority,
        browser: raw.browser,
        website: website.name.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Subtitle;

    #[test]
    fn test_english_subtitle_and_referer_fallback() {
        let source = sources::Model {
            id: "s1".to_string(),
            episode_id: "e1".to_string(),
            website_id: "zoro".to_string(),
            source_type: "PROXY".to_string(),
            target: "/watch/1".to_string(),
            resolution: None,
            format: None,
            referer: Some("https://zoro.to/".to_string()),
            created_at: crate::db::now(),
        };
        let website = websites::Model {
            id: "zoro".to_string(),
            name: "Zoro".to_string(),
            url: "https://zoro.to".to_string(),
            locale: "en_US".to_string(),
            priority: 2,
        };
        let raw = RawSource {
            video: "https://cdn.example/master.m3u8".to_string(),
            subtitles: vec![
                Subtitle { url: "https://cdn.example/pt.vtt".to_string(), lang: "Portuguese".to_string() },
                Subtitle { url: "https://cdn.example/en.vtt".to_string(), lang: "English".to_string() },
            ],
            ..Default::default()
        };

        let resolved = to_resolved(&source, &website, raw);
        assert_eq!(resolved.subtitle.as_deref(), Some("https://cdn.example/en.vtt"));
        assert_eq!(resolved.referer.as_deref(), Some("https://zoro.to/"));
        assert_eq!(resolved.priority, 2);
        assert_eq!(resolved.website, "Zoro");
    }

    #[test]
    fn test_cache_key() {
        assert_eq!(cache_key("abc"), "source-abc");
    }
}
