use sea_orm::entity::prelude::*;
use std::collections::{BTreeMap, HashMap};

use crate::models::{AnimeFormat, AnimeStatus, AnimeTitle, TitleVariants};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "anime")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    #[sea_orm(unique)]
    pub anilist_id: i32,
    pub slug: String,
    pub title_english: Option<String>,
    pub title_romaji: Option<String>,
    pub title_native: Option<String>,
    /// JSON array of alternative titles.
    #[sea_orm(column_type = "Text")]
    pub synonyms: String,
    pub cover_image: Option<String>,
    pub banner_image: Option<String>,
    pub color: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,
    pub duration: Option<i32>,
    pub popularity: Option<i32>,
    pub average_score: Option<i32>,
    pub status: String,
    pub season: String,
    pub year: Option<i32>,
    pub format: String,
    pub current_episode: i32,
    /// Next airing time reported by the catalog, RFC 3339.
    pub next_airing: Option<String>,
    pub last_episode_update: Option<String>,
    /// JSON object of website id -> last checked time (RFC 3339).
    #[sea_orm(column_type = "Text")]
    pub last_checks: String,
    /// JSON object of provider name -> provider id, e.g. {"mal": 5114, "anidb": 6107}.
    #[sea_orm(column_type = "Text")]
    pub mappings: String,
    pub created_at: String,
    pub updated_at: String,
}

impl Model {
    #[must_use]
    pub fn title(&self) -> AnimeTitle {
        AnimeTitle {
            english: self.title_english.clone(),
            romaji: self.title_romaji.clone(),
            native: self.title_native.clone(),
        }
    }

    #[must_use]
    pub fn synonym_list(&self) -> Vec<String> {
        serde_json::from_str(&self.synonyms).unwrap_or_default()
    }

    #[must_use]
    pub fn title_variants(&self) -> TitleVariants {
        TitleVariants::new(&self.title(), self.synonym_list())
    }

    /// Unknown status strings are treated as not yet released so nothing scrapes them.
    #[must_use]
    pub fn parsed_status(&self) -> AnimeStatus {
        self.status.parse().unwrap_or(AnimeStatus::NotYetReleased)
    }

    #[must_use]
    pub fn parsed_format(&self) -> AnimeFormat {
        AnimeFormat::parse_lossy(&self.format)
    }

    #[must_use]
    pub fn last_check_map(&self) -> HashMap<String, String> {
        serde_json::from_str(&self.last_checks).unwrap_or_default()
    }

    #[must_use]
    pub fn mapping_map(&self) -> BTreeMap<String, serde_json::Value> {
        serde_json::from_str(&self.mappings).unwrap_or_default()
    }

    /// Provider id as a string, whether the feed stored it as a number or text.
    #[must_use]
    pub fn mapping_id(&self, provider: &str) -> Option<String> {
        match self.mapping_map().get(provider)? {
            serde_json::Value::Number(n) => Some(n.to_string()),
            serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
            _ => None,
        }
    }

    #[must_use]
    pub fn next_airing_at(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        self.next_airing
            .as_deref()
            .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
            .map(|d| d.with_timezone(&chrono::Utc))
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::episodes::Entity")]
    Episodes,
    #[sea_orm(has_many = "super::anime_genres::Entity")]
    AnimeGenres,
    #[sea_orm(has_many = "super::anime_relations::Entity")]
    AnimeRelations,
}

impl Related<super::episodes::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Episodes.def()
    }
}

impl Related<super::genres::Entity> for Entity {
    fn to() -> RelationDef {
        super::anime_genres::Relation::Genres.def()
    }

    fn via() -> Option<RelationDef> {
        Some(super::anime_genres::Relation::Anime.def().rev())
    }
}

/// Relations linked from this anime (the "outgoing" side of the graph).
impl Related<super::relations::Entity> for Entity {
    fn to() -> RelationDef {
        super::anime_relations::Relation::Relations.def()
    }

    fn via() -> Option<RelationDef> {
        Some(super::anime_relations::Relation::Anime.def().rev())
    }
}

impl ActiveModelBehavior for ActiveModel {}
