use crate::entities::{episodes, prelude::*, sources};
use crate::error::is_unique_violation;
use crate::models::EpisodeMeta;
use anyhow::Result;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, JoinType, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, RelationTrait, Set,
};
use std::collections::BTreeSet;

/// Repository for episode rows and their source coverage.
pub struct EpisodeRepository {
    conn: DatabaseConnection,
}

impl EpisodeRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn get(&self, id: &str) -> Result<Option<episodes::Model>> {
        Ok(Episodes::find_by_id(id.to_string()).one(&self.conn).await?)
    }

    pub async fn find(&self, anime_id: &str, number: i32) -> Result<Option<episodes::Model>> {
        Ok(Episodes::find()
            .filter(episodes::Column::AnimeId.eq(anime_id))
            .filter(episodes::Column::Number.eq(number))
            .one(&self.conn)
            .await?)
    }

    pub async fn list_for_anime(&self, anime_id: &str) -> Result<Vec<episodes::Model>> {
        Ok(Episodes::find()
            .filter(episodes::Column::AnimeId.eq(anime_id))
            .order_by_asc(episodes::Column::Number)
            .all(&self.conn)
            .await?)
    }

    pub async fn count_for_anime(&self, anime_id: &str) -> Result<u64> {
        Ok(Episodes::find()
            .filter(episodes::Column::AnimeId.eq(anime_id))
            .count(&self.conn)
            .await?)
    }

    /// Episode numbers in `[0, upto]` that already carry a source from `website_id`.
    pub async fn numbers_sourced_by(
        &self,
        anime_id: &str,
        website_id: &str,
        upto: i32,
    ) -> Result<BTreeSet<i32>> {
        let numbers: Vec<i32> = Episodes::find()
            .select_only()
            .column(episodes::Column::Number)
            .join(JoinType::InnerJoin, episodes::Relation::Sources.def())
            .filter(episodes::Column::AnimeId.eq(anime_id))
            .filter(episodes::Column::Number.between(0, upto))
            .filter(sources::Column::WebsiteId.eq(website_id))
            .into_tuple()
            .all(&self.conn)
            .await?;
        Ok(numbers.into_iter().collect())
    }

    /// Returns the episode for `(anime_id, number)`, creating it when absent.
    /// The flag is true only when this call inserted the row.
    pub async fn find_or_create(
        &self,
        anime_id: &str,
        number: i32,
        title: Option<&str>,
    ) -> Result<(episodes::Model, bool)> {
        if let Some(existing) = self.find(anime_id, number).await? {
            return Ok((existing, false));
        }

        let now = crate::db::now();
        let model = episodes::ActiveModel {
            id: Set(uuid::Uuid::new_v4().to_string()),
            anime_id: Set(anime_id.to_string()),
            number: Set(number),
            title: Set(title.map(ToString::to_string)),
            title_variations: Set(None),
            description: Set(None),
            image: Set(None),
            aired_at: Set(None),
            created_at: Set(now.clone()),
            updated_at: Set(now),
        };

        match Episodes::insert(model).exec_with_returning(&self.conn).await {
            Ok(created) => Ok((created, true)),
            Err(e) if is_unique_violation(&e) => {
                let existing = self
                    .find(anime_id, number)
                    .await?
                    .ok_or_else(|| anyhow::anyhow!("Episode {anime_id}#{number} vanished"))?;
                Ok((existing, false))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Sets the title only while it is still null. Returns whether a row changed.
    pub async fn fill_title_if_missing(&self, id: &str, title: &str) -> Result<bool> {
        let result = Episodes::update_many()
            .col_expr(episodes::Column::Title, Expr::value(title))
            .col_expr(
                episodes::Column::UpdatedAt,
                Expr::value(crate::db::now()),
            )
            .filter(episodes::Column::Id.eq(id))
            .filter(episodes::Column::Title.is_null())
            .exec(&self.conn)
            .await?;
        Ok(result.rows_affected > 0)
    }

    /// Creates or updates the episode the catalog just reported as aired.
    pub async fn upsert_aired(
        &self,
        anime_id: &str,
        number: i32,
        aired_at: Option<&str>,
    ) -> Result<episodes::Model> {
        let (episode, _) = self.find_or_create(anime_id, number, None).await?;
        let Some(aired_at) = aired_at else {
            return Ok(episode);
        };

        Ok(Episodes::update(episodes::ActiveModel {
            id: Set(episode.id),
            aired_at: Set(Some(aired_at.to_string())),
            updated_at: Set(crate::db::now()),
            ..Default::default()
        })
        .exec(&self.conn)
        .await?)
    }

    /// Writes the non-empty fields of `meta`. Returns false when the episode does not exist.
    pub async fn apply_meta(&self, anime_id: &str, meta: &EpisodeMeta) -> Result<bool> {
        if meta.is_empty() {
            return Ok(false);
        }
        let Some(episode) = self.find(anime_id, meta.number).await? else {
            return Ok(false);
        };

        let mut model = episodes::ActiveModel {
            id: Set(episode.id),
            updated_at: Set(crate::db::now()),
            ..Default::default()
        };
        if let Some(title) = meta.title.as_ref().filter(|t| !t.is_empty()) {
            model.title = Set(Some(title.clone()));
        }
        if !meta.title_variations.is_empty() {
            model.title_variations = Set(Some(serde_json::to_string(&meta.title_variations)?));
        }
        if let Some(description) = meta.description.as_ref().filter(|d| !d.is_empty()) {
            model.description = Set(Some(description.clone()));
        }
        if let Some(image) = meta.image.as_ref().filter(|i| !i.is_empty()) {
            model.image = Set(Some(image.clone()));
        }
        if let Some(aired_at) = meta.aired_at {
            model.aired_at = Set(Some(crate::db::timestamp(aired_at)));
        }

        Episodes::update(model).exec(&self.conn).await?;
        Ok(true)
    }

    pub async fn count(&self) -> Result<u64> {
        Ok(Episodes::find().count(&self.conn).await?)
    }
}
