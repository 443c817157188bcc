use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::source::SourceType;

/// One episode as listed by a scraper plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapedEpisode {
    /// Sites publish half episodes and garbage; the reconciler only keeps whole numbers.
    pub number: f64,
    pub title: Option<String>,
    pub url: String,
    pub source_type: SourceType,
    pub resolution: Option<String>,
    pub format: Option<String>,
    pub referer: Option<String>,
}

impl ScrapedEpisode {
    #[must_use]
    pub fn proxy(number: f64, url: impl Into<String>) -> Self {
        Self {
            number,
            title: None,
            url: url.into(),
            source_type: SourceType::Proxy,
            resolution: None,
            format: None,
            referer: None,
        }
    }

    /// The episode number when it is a finite whole number that fits an `i32`.
    #[must_use]
    pub fn whole_number(&self) -> Option<i32> {
        let n = self.number;
        if !n.is_finite() || n.fract() != 0.0 || n < f64::from(i32::MIN) || n > f64::from(i32::MAX)
        {
            return None;
        }
        #[allow(clippy::cast_possible_truncation)]
        Some(n as i32)
    }
}

/// Episode metadata produced by a metadata provider.
///
/// Every field is optional: providers fill what they know and the store only
/// writes the non-empty ones.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EpisodeMeta {
    pub number: i32,
    pub title: Option<String>,
    pub title_variations: HashMap<String, String>,
    pub description: Option<String>,
    pub image: Option<String>,
    pub aired_at: Option<DateTime<Utc>>,
}

impl EpisodeMeta {
    /// Complete apart from the image, which backup providers never supply.
    #[must_use]
    pub fn is_complete_without_image(&self) -> bool {
        self.title.is_some()
            && !self.title_variations.is_empty()
            && self.description.is_some()
            && self.aired_at.is_some()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.title_variations.is_empty()
            && self.description.is_none()
            && self.image.is_none()
            && self.aired_at.is_none()
    }
}
