use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceType {
    /// The stored target is already the playable URL.
    Direct,
    /// The stored target must go through the owning plugin to become playable.
    Proxy,
}

impl SourceType {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "DIRECT",
            Self::Proxy => "PROXY",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DIRECT" => Ok(Self::Direct),
            "PROXY" => Ok(Self::Proxy),
            _ => Err(format!("Unknown source type: {s}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subtitle {
    pub url: String,
    pub lang: String,
}

/// A plugin's answer for "where does this stored reference actually play".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSource {
    pub video: String,
    pub subtitles: Vec<Subtitle>,
    pub referer: Option<String>,
    pub headers: HashMap<String, String>,
    /// Playback must happen from a browser context (referer-checked CDNs).
    pub browser: bool,
}

/// Per-request parameters handed to `Scraper::raw_source`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceParams {
    pub referer: Option<String>,
    pub decryption_key: Option<String>,
}

/// What the source resolution service hands back and caches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedSource {
    pub id: String,
    pub url: String,
    pub subtitle: Option<String>,
    pub referer: Option<String>,
    pub headers: HashMap<String, String>,
    pub priority: i32,
    pub browser: bool,
    pub website: String,
}
