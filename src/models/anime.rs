use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Catalog airing status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnimeStatus {
    NotYetReleased,
    Releasing,
    Finished,
    Cancelled,
    Hiatus,
}

impl AnimeStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NotYetReleased => "NOT_YET_RELEASED",
            Self::Releasing => "RELEASING",
            Self::Finished => "FINISHED",
            Self::Cancelled => "CANCELLED",
            Self::Hiatus => "HIATUS",
        }
    }
}

impl fmt::Display for AnimeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnimeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NOT_YET_RELEASED" => Ok(Self::NotYetReleased),
            "RELEASING" => Ok(Self::Releasing),
            "FINISHED" => Ok(Self::Finished),
            "CANCELLED" => Ok(Self::Cancelled),
            "HIATUS" => Ok(Self::Hiatus),
            _ => Err(format!("Unknown anime status: {s}")),
        }
    }
}

/// Catalog media format. Unrecognised values collapse to `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnimeFormat {
    Tv,
    TvShort,
    Movie,
    Special,
    Ova,
    Ona,
    Music,
    Unknown,
}

impl AnimeFormat {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Tv => "TV",
            Self::TvShort => "TV_SHORT",
            Self::Movie => "MOVIE",
            Self::Special => "SPECIAL",
            Self::Ova => "OVA",
            Self::Ona => "ONA",
            Self::Music => "MUSIC",
            Self::Unknown => "UNKNOWN",
        }
    }

    #[must_use]
    pub fn parse_lossy(s: &str) -> Self {
        match s {
            "TV" => Self::Tv,
            "TV_SHORT" => Self::TvShort,
            "MOVIE" => Self::Movie,
            "SPECIAL" => Self::Special,
            "OVA" => Self::Ova,
            "ONA" => Self::Ona,
            "MUSIC" => Self::Music,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for AnimeFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Edge types kept from the catalog relation graph. Anything else is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationType {
    Prequel,
    Sequel,
    Parent,
    SideStory,
}

impl RelationType {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Prequel => "PREQUEL",
            Self::Sequel => "SEQUEL",
            Self::Parent => "PARENT",
            Self::SideStory => "SIDE_STORY",
        }
    }
}

impl fmt::Display for RelationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PREQUEL" => Ok(Self::Prequel),
            "SEQUEL" => Ok(Self::Sequel),
            "PARENT" => Ok(Self::Parent),
            "SIDE_STORY" => Ok(Self::SideStory),
            _ => Err(format!("Unsupported relation type: {s}")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnimeTitle {
    pub english: Option<String>,
    pub romaji: Option<String>,
    pub native: Option<String>,
}

impl AnimeTitle {
    /// English when present, romaji otherwise.
    #[must_use]
    pub fn preferred(&self) -> Option<&str> {
        self.english
            .as_deref()
            .or(self.romaji.as_deref())
            .or(self.native.as_deref())
    }
}

/// Everything a scraper gets to search with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TitleVariants {
    pub english: Option<String>,
    pub romaji: Option<String>,
    pub native: Option<String>,
    pub synonyms: Vec<String>,
    /// Best guess for the site's own spelling, when one is known.
    pub current: Option<String>,
}

impl TitleVariants {
    #[must_use]
    pub fn new(title: &AnimeTitle, synonyms: Vec<String>) -> Self {
        Self {
            english: title.english.clone(),
            romaji: title.romaji.clone(),
            native: title.native.clone(),
            synonyms,
            current: title.preferred().map(ToString::to_string),
        }
    }

    /// Non-empty alternatives in search order: english, romaji, native, synonyms.
    pub fn alternatives(&self) -> impl Iterator<Item = &str> {
        [&self.english, &self.romaji, &self.native]
            .into_iter()
            .filter_map(|t| t.as_deref())
            .chain(self.synonyms.iter().map(String::as_str))
            .filter(|t| !t.is_empty())
    }
}

/// A catalog entry converted into the shape the store persists.
#[derive(Debug, Clone, PartialEq)]
pub struct AnimeRecord {
    pub anilist_id: i32,
    pub slug: String,
    pub title: AnimeTitle,
    pub synonyms: Vec<String>,
    pub cover_image: Option<String>,
    pub banner_image: Option<String>,
    pub color: Option<String>,
    pub description: Option<String>,
    pub duration: Option<i32>,
    pub popularity: Option<i32>,
    pub average_score: Option<i32>,
    pub status: AnimeStatus,
    pub season: String,
    pub year: Option<i32>,
    pub format: AnimeFormat,
    pub current_episode: i32,
    pub next_airing: Option<DateTime<Utc>>,
    pub genres: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            AnimeStatus::NotYetReleased,
            AnimeStatus::Releasing,
            AnimeStatus::Finished,
            AnimeStatus::Cancelled,
            AnimeStatus::Hiatus,
        ] {
            assert_eq!(status.as_str().parse::<AnimeStatus>().unwrap(), status);
        }
        assert!("AIRING".parse::<AnimeStatus>().is_err());
    }

    #[test]
    fn test_relation_type_rejects_unknown_edges() {
        assert_eq!("SEQUEL".parse::<RelationType>().unwrap(), RelationType::Sequel);
        assert!("ADAPTATION".parse::<RelationType>().is_err());
        assert!("CHARACTER".parse::<RelationType>().is_err());
    }

    #[test]
    fn test_alternatives_skip_empty() {
        let variants = TitleVariants {
            english: None,
            romaji: Some("Shingeki no Kyojin".to_string()),
            native: Some(String::new()),
            synonyms: vec!["AoT".to_string()],
            current: None,
        };
        let alts: Vec<&str> = variants.alternatives().collect();
        assert_eq!(alts, vec!["Shingeki no Kyojin", "AoT"]);
    }
}
