use crate::entities::{prelude::*, sources, websites};
use crate::error::is_unique_violation;
use crate::models::SourceType;
use anyhow::Result;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, Set};

/// Input for a source the reconciler wants to exist.
#[derive(Debug, Clone)]
pub struct NewSource {
    pub episode_id: String,
    pub website_id: String,
    pub source_type: SourceType,
    pub target: String,
    pub resolution: Option<String>,
    pub format: Option<String>,
    pub referer: Option<String>,
}

pub struct SourceRepository {
    conn: DatabaseConnection,
}

impl SourceRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn get_with_website(
        &self,
        id: &str,
    ) -> Result<Option<(sources::Model, websites::Model)>> {
        let row = Sources::find_by_id(id.to_string())
            .find_also_related(Websites)
            .one(&self.conn)
            .await?;
        Ok(row.and_then(|(source, website)| website.map(|w| (source, w))))
    }

    pub async fn find(&self, episode_id: &str, website_id: &str) -> Result<Option<sources::Model>> {
        Ok(Sources::find()
            .filter(sources::Column::EpisodeId.eq(episode_id))
            .filter(sources::Column::WebsiteId.eq(website_id))
            .one(&self.conn)
            .await?)
    }

    pub async fn list_for_episode(&self, episode_id: &str) -> Result<Vec<sources::Model>> {
        Ok(Sources::find()
            .filter(sources::Column::EpisodeId.eq(episode_id))
            .all(&self.conn)
            .await?)
    }

    /// Creates the `(episode, website)` source unless one exists.
    ///
    /// Returns `Some` only when this call inserted the row; a concurrent
    /// insert that wins the unique index yields `None`.
    pub async fn create_if_absent(&self, source: &NewSource) -> Result<Option<sources::Model>> {
        if self
            .find(&source.episode_id, &source.website_id)
            .await?
            .is_some()
        {
            return Ok(None);
        }

        let model = sources::ActiveModel {
            id: Set(uuid::Uuid::new_v4().to_string()),
            episode_id: Set(source.episode_id.clone()),
            website_id: Set(source.website_id.clone()),
            source_type: Set(source.source_type.to_string()),
            target: Set(source.target.trim().to_string()),
            resolution: Set(source.resolution.as_deref().map(|s| s.trim().to_string())),
            format: Set(source.format.as_deref().map(|s| s.trim().to_string())),
            referer: Set(source.referer.as_deref().map(|s| s.trim().to_string())),
            created_at: Set(crate::db::now()),
        };

        match Sources::insert(model).exec_with_returning(&self.conn).await {
            Ok(created) => Ok(Some(created)),
            Err(e) if is_unique_violation(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn count(&self) -> Result<u64> {
        Ok(Sources::find().count(&self.conn).await?)
    }
}
