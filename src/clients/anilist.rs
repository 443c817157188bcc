use anyhow::Result;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;

pub const ANILIST_API: &str = "https://graphql.anilist.co";

const MEDIA_FIELDS: &str = r"
    id
    idMal
    title { romaji english native }
    synonyms
    coverImage { extraLarge color }
    bannerImage
    description(asHtml: false)
    duration
    popularity
    averageScore
    status
    season
    seasonYear
    format
    episodes
    genres
    nextAiringEpisode { episode airingAt }
    relations {
        edges {
            relationType
            node { id type }
        }
    }
";

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct MediaTitle {
    pub romaji: Option<String>,
    pub english: Option<String>,
    pub native: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct CoverImage {
    #[serde(rename = "extraLarge")]
    pub extra_large: Option<String>,
    pub color: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub struct NextAiringEpisode {
    pub episode: i32,
    #[serde(rename = "airingAt")]
    pub airing_at: i64,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct RelationNode {
    pub id: i32,
    #[serde(rename = "type")]
    pub media_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct RelationEdge {
    #[serde(rename = "relationType")]
    pub relation_type: Option<String>,
    pub node: RelationNode,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct Relations {
    #[serde(default)]
    pub edges: Vec<RelationEdge>,
}

/// A catalog entry as returned by the GraphQL API.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct AnilistMedia {
    pub id: i32,
    #[serde(rename = "idMal")]
    pub id_mal: Option<i32>,
    #[serde(default)]
    pub title: MediaTitle,
    #[serde(default)]
    pub synonyms: Vec<String>,
    #[serde(rename = "coverImage", default)]
    pub cover_image: CoverImage,
    #[serde(rename = "bannerImage")]
    pub banner_image: Option<String>,
    pub description: Option<String>,
    pub duration: Option<i32>,
    pub popularity: Option<i32>,
    #[serde(rename = "averageScore")]
    pub average_score: Option<i32>,
    pub status: Option<String>,
    pub season: Option<String>,
    #[serde(rename = "seasonYear")]
    pub season_year: Option<i32>,
    pub format: Option<String>,
    pub episodes: Option<i32>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(rename = "nextAiringEpisode")]
    pub next_airing_episode: Option<NextAiringEpisode>,
    #[serde(default)]
    pub relations: Relations,
}

/// Filter for the paged airing query. `None` fields are left out of the request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AiringQuery {
    pub season: Option<String>,
    pub year: Option<i32>,
    pub status: Option<String>,
    pub format: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CatalogPage {
    pub media: Vec<AnilistMedia>,
    pub has_next_page: bool,
}

/// The catalog operations the sync engine depends on.
#[async_trait::async_trait]
pub trait CatalogApi: Send + Sync {
    async fn airing_page(&self, query: &AiringQuery, page: u32) -> Result<CatalogPage>;

    async fn media_by_id(&self, anilist_id: i32) -> Result<Option<AnilistMedia>>;

    async fn relation_edges(&self, anilist_id: i32) -> Result<Vec<RelationEdge>> {
        Ok(self
            .media_by_id(anilist_id)
            .await?
            .map(|m| m.relations.edges)
            .unwrap_or_default())
    }
}

#[derive(Deserialize)]
struct GraphQLResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQLError>,
}

#[derive(Deserialize)]
struct GraphQLError {
    message: String,
    status: Option<u16>,
}

#[derive(Deserialize)]
struct PageData {
    #[serde(rename = "Page")]
    page: PageBody,
}

#[derive(Deserialize)]
struct PageBody {
    #[serde(rename = "pageInfo")]
    page_info: PageInfo,
    #[serde(default)]
    media: Vec<AnilistMedia>,
}

#[derive(Deserialize)]
struct PageInfo {
    #[serde(rename = "hasNextPage")]
    has_next_page: bool,
}

#[derive(Deserialize)]
struct MediaData {
    #[serde(rename = "Media")]
    media: Option<AnilistMedia>,
}

#[derive(Clone)]
pub struct AnilistClient {
    client: Client,
    endpoint: String,
}

impl AnilistClient {
    #[must_use]
    pub fn with_shared_client(client: Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    async fn request<T: serde::de::DeserializeOwned>(
        &self,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<GraphQLResponse<T>> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("Accept", "application/json")
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await?;

        let status = response.status();
        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            anyhow::bail!("AniList returned HTTP {status}");
        }

        Ok(response.json().await?)
    }
}

#[async_trait::async_trait]
impl CatalogApi for AnilistClient {
    async fn airing_page(&self, query: &AiringQuery, page: u32) -> Result<CatalogPage> {
        let gql_query = format!(
            r"
            query ($page: Int, $season: MediaSeason, $year: Int, $status: MediaStatus, $format: MediaFormat) {{
                Page(page: $page, perPage: 50) {{
                    pageInfo {{ hasNextPage }}
                    media(type: ANIME, season: $season, seasonYear: $year, status: $status, format: $format) {{
                        {MEDIA_FIELDS}
                    }}
                }}
            }}
            "
        );

        let mut variables = json!({ "page": page });
        if let Some(season) = &query.season {
            variables["season"] = json!(season);
        }
        if let Some(year) = query.year {
            variables["year"] = json!(year);
        }
        if let Some(status) = &query.status {
            variables["status"] = json!(status);
        }
        if let Some(format) = &query.format {
            variables["format"] = json!(format);
        }

        let response: GraphQLResponse<PageData> = self.request(&gql_query, variables).await?;
        if let Some(error) = response.errors.first() {
            anyhow::bail!("AniList query failed: {}", error.message);
        }

        Ok(response
            .data
            .map(|d| CatalogPage {
                media: d.page.media,
                has_next_page: d.page.page_info.has_next_page,
            })
            .unwrap_or_default())
    }

    async fn media_by_id(&self, anilist_id: i32) -> Result<Option<AnilistMedia>> {
        let gql_query = format!(
            r"
            query ($id: Int) {{
                Media(id: $id, type: ANIME) {{
                    {MEDIA_FIELDS}
                }}
            }}
            "
        );

        let response: GraphQLResponse<MediaData> =
            self.request(&gql_query, json!({ "id": anilist_id })).await?;

        // An unknown id comes back as a 404 error entry rather than an empty result.
        if let Some(error) = response.errors.first() {
            if error.status == Some(404) {
                return Ok(None);
            }
            anyhow::bail!("AniList query failed: {}", error.message);
        }

        Ok(response.data.and_then(|d| d.media))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_deserializes_with_missing_optionals() {
        let raw = r##"{
            "id": 16498,
            "idMal": 16498,
            "title": { "romaji": "Shingeki no Kyojin", "english": "Attack on Titan", "native": null },
            "coverImage": { "extraLarge": "https://img/1.jpg", "color": "#e4a15d" },
            "status": "FINISHED",
            "format": "TV",
            "episodes": 25,
            "genres": ["Action"],
            "nextAiringEpisode": null,
            "relations": { "edges": [
                { "relationType": "SEQUEL", "node": { "id": 20958, "type": "ANIME" } }
            ] }
        }"##;

        let media: AnilistMedia = serde_json::from_str(raw).unwrap();
        assert_eq!(media.title.english.as_deref(), Some("Attack on Titan"));
        assert!(media.synonyms.is_empty());
        assert_eq!(media.relations.edges.len(), 1);
        assert_eq!(media.relations.edges[0].relation_type.as_deref(), Some("SEQUEL"));
    }

    #[test]
    fn test_not_found_error_shape() {
        let raw = r#"{ "data": { "Media": null }, "errors": [ { "message": "Not Found.", "status": 404 } ] }"#;
        let response: GraphQLResponse<MediaData> = serde_json::from_str(raw).unwrap();
        assert_eq!(response.errors[0].status, Some(404));
        assert!(response.data.and_then(|d| d.media).is_none());
    }
}
