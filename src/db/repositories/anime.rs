use crate::entities::{anime, anime_genres, genres, prelude::*};
use crate::error::is_unique_violation;
use crate::models::{AnimeRecord, AnimeStatus};
use anyhow::Result;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, FromQueryResult, JoinType,
    PaginatorTrait, QueryFilter, QuerySelect, RelationTrait, Set, Statement,
};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

pub struct AnimeRepository {
    conn: DatabaseConnection,
}

#[derive(Debug, Clone, FromQueryResult)]
struct IdRow {
    id: String,
}

impl AnimeRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn get(&self, id: &str) -> Result<Option<anime::Model>> {
        Ok(Anime::find_by_id(id.to_string()).one(&self.conn).await?)
    }

    pub async fn get_by_anilist_id(&self, anilist_id: i32) -> Result<Option<anime::Model>> {
        Ok(Anime::find()
            .filter(anime::Column::AnilistId.eq(anilist_id))
            .one(&self.conn)
            .await?)
    }

    pub async fn get_many(&self, ids: &[String]) -> Result<Vec<anime::Model>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }
        Ok(Anime::find()
            .filter(anime::Column::Id.is_in(ids.iter().cloned()))
            .all(&self.conn)
            .await?)
    }

    /// Inserts a catalog entry. Returns the stored row and whether this call created it.
    ///
    /// A concurrent insert of the same catalog id surfaces as a unique violation,
    /// in which case the other writer's row is returned.
    pub async fn create(&self, record: &AnimeRecord) -> Result<(anime::Model, bool)> {
        let now = crate::db::now();
        let model = anime::ActiveModel {
            id: Set(uuid::Uuid::new_v4().to_string()),
            anilist_id: Set(record.anilist_id),
            slug: Set(record.slug.clone()),
            title_english: Set(record.title.english.clone()),
            title_romaji: Set(record.title.romaji.clone()),
            title_native: Set(record.title.native.clone()),
            synonyms: Set(serde_json::to_string(&record.synonyms)?),
            cover_image: Set(record.cover_image.clone()),
            banner_image: Set(record.banner_image.clone()),
            color: Set(record.color.clone()),
            description: Set(record.description.clone()),
            duration: Set(record.duration),
            popularity: Set(record.popularity),
            average_score: Set(record.average_score),
            status: Set(record.status.to_string()),
            season: Set(record.season.clone()),
            year: Set(record.year),
            format: Set(record.format.to_string()),
            current_episode: Set(record.current_episode),
            next_airing: Set(record.next_airing.map(crate::db::timestamp)),
            last_episode_update: Set(None),
            last_checks: Set("{}".to_string()),
            mappings: Set("{}".to_string()),
            created_at: Set(now.clone()),
            updated_at: Set(now),
        };

        match Anime::insert(model).exec_with_returning(&self.conn).await {
            Ok(created) => {
                self.set_genres(&created.id, &record.genres).await?;
                Ok((created, true))
            }
            Err(e) if is_unique_violation(&e) => {
                debug!(
                    anilist_id = record.anilist_id,
                    "Anime inserted concurrently, using existing row"
                );
                let existing = self
                    .get_by_anilist_id(record.anilist_id)
                    .await?
                    .ok_or_else(|| anyhow::anyhow!("Anime {} vanished", record.anilist_id))?;
                Ok((existing, false))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Refreshes catalog fields on an existing row.
    ///
    /// `current_episode` never decreases unless `allow_decrease` is set.
    pub async fn update_from_catalog(
        &self,
        existing: &anime::Model,
        record: &AnimeRecord,
        allow_decrease: bool,
    ) -> Result<anime::Model> {
        let current_episode = if allow_decrease {
            record.current_episode
        } else {
            existing.current_episode.max(record.current_episode)
        };

        let model = anime::ActiveModel {
            id: Set(existing.id.clone()),
            slug: Set(record.slug.clone()),
            title_english: Set(record.title.english.clone()),
            title_romaji: Set(record.title.romaji.clone()),
            title_native: Set(record.title.native.clone()),
            synonyms: Set(serde_json::to_string(&record.synonyms)?),
            cover_image: Set(record.cover_image.clone()),
            banner_image: Set(record.banner_image.clone()),
            color: Set(record.color.clone()),
            description: Set(record.description.clone()),
            duration: Set(record.duration),
            popularity: Set(record.popularity),
            average_score: Set(record.average_score),
            status: Set(record.status.to_string()),
            season: Set(record.season.clone()),
            year: Set(record.year),
            format: Set(record.format.to_string()),
            current_episode: Set(current_episode),
            next_airing: Set(record.next_airing.map(crate::db::timestamp)),
            updated_at: Set(crate::db::now()),
            ..Default::default()
        };

        let updated = Anime::update(model).exec(&self.conn).await?;
        self.set_genres(&updated.id, &record.genres).await?;
        Ok(updated)
    }

    async fn set_genres(&self, anime_id: &str, names: &[String]) -> Result<()> {
        for name in names {
            Genres::insert(genres::ActiveModel {
                name: Set(name.clone()),
                ..Default::default()
            })
            .on_conflict(
                sea_orm::sea_query::OnConflict::column(genres::Column::Name)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(&self.conn)
            .await?;

            let Some(genre) = Genres::find()
                .filter(genres::Column::Name.eq(name.as_str()))
                .one(&self.conn)
                .await?
            else {
                continue;
            };

            AnimeGenres::insert(anime_genres::ActiveModel {
                anime_id: Set(anime_id.to_string()),
                genre_id: Set(genre.id),
            })
            .on_conflict(
                sea_orm::sea_query::OnConflict::columns([
                    anime_genres::Column::AnimeId,
                    anime_genres::Column::GenreId,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec_without_returning(&self.conn)
            .await?;
        }

        Ok(())
    }

    pub async fn genres_for(&self, anime_id: &str) -> Result<Vec<String>> {
        let rows = Genres::find()
            .join(JoinType::InnerJoin, genres::Relation::AnimeGenres.def())
            .filter(anime_genres::Column::AnimeId.eq(anime_id))
            .all(&self.conn)
            .await?;
        Ok(rows.into_iter().map(|g| g.name).collect())
    }

    pub async fn set_mappings(
        &self,
        id: &str,
        mappings: &BTreeMap<String, serde_json::Value>,
    ) -> Result<()> {
        Anime::update(anime::ActiveModel {
            id: Set(id.to_string()),
            mappings: Set(serde_json::to_string(mappings)?),
            updated_at: Set(crate::db::now()),
            ..Default::default()
        })
        .exec(&self.conn)
        .await?;
        Ok(())
    }

    /// Merges per-website check times into the stored map and, when a source
    /// was created, stamps the update time. Keys not in `checked` are left as
    /// stored, so concurrent jobs on the same anime keep each other's entries.
    pub async fn record_scrape_progress(
        &self,
        id: &str,
        checked: &HashMap<String, String>,
        last_episode_update: Option<&str>,
    ) -> Result<()> {
        let backend = self.conn.get_database_backend();
        let stmt = Statement::from_sql_and_values(
            backend,
            r"UPDATE anime
              SET last_checks = json_patch(COALESCE(NULLIF(last_checks, ''), '{}'), ?),
                  last_episode_update = COALESCE(?, last_episode_update),
                  updated_at = ?
              WHERE id = ?",
            [
                serde_json::to_string(checked)?.into(),
                last_episode_update.map(ToString::to_string).into(),
                crate::db::now().into(),
                id.into(),
            ],
        );
        self.conn.execute(stmt).await?;
        Ok(())
    }

    pub async fn list_ids_by_status(&self, statuses: &[AnimeStatus]) -> Result<Vec<String>> {
        let ids: Vec<String> = Anime::find()
            .select_only()
            .column(anime::Column::Id)
            .filter(anime::Column::Status.is_in(statuses.iter().map(ToString::to_string)))
            .into_tuple()
            .all(&self.conn)
            .await?;
        Ok(ids)
    }

    pub async fn list_ids_excluding_status(&self, status: AnimeStatus) -> Result<Vec<String>> {
        let ids: Vec<String> = Anime::find()
            .select_only()
            .column(anime::Column::Id)
            .filter(anime::Column::Status.ne(status.to_string()))
            .into_tuple()
            .all(&self.conn)
            .await?;
        Ok(ids)
    }

    /// Finished anime that never received a source.
    pub async fn list_finished_never_updated(&self) -> Result<Vec<String>> {
        let ids: Vec<String> = Anime::find()
            .select_only()
            .column(anime::Column::Id)
            .filter(anime::Column::Status.eq(AnimeStatus::Finished.to_string()))
            .filter(anime::Column::LastEpisodeUpdate.is_null())
            .into_tuple()
            .all(&self.conn)
            .await?;
        Ok(ids)
    }

    /// Releasing anime whose count of fully sourced episodes differs from
    /// `current_episode`. An episode is fully sourced when it carries exactly
    /// `playable_plugins` sources.
    pub async fn list_under_sourced_releasing(&self, playable_plugins: usize) -> Result<Vec<String>> {
        let backend = self.conn.get_database_backend();
        let stmt = Statement::from_sql_and_values(
            backend,
            r"SELECT a.id AS id FROM anime a
              WHERE a.status = ?
                AND a.current_episode != (
                  SELECT COUNT(*) FROM episodes e
                  WHERE e.anime_id = a.id
                    AND (SELECT COUNT(*) FROM sources s WHERE s.episode_id = e.id) = ?
                )",
            [
                AnimeStatus::Releasing.to_string().into(),
                i64::try_from(playable_plugins).unwrap_or(i64::MAX).into(),
            ],
        );
        let rows = IdRow::find_by_statement(stmt).all(&self.conn).await?;
        Ok(rows.into_iter().map(|r| r.id).collect())
    }

    /// Anime lacking a PREQUEL link or lacking a SEQUEL link. Anime with no
    /// relations at all fall under both.
    pub async fn list_missing_sequence_edges(&self) -> Result<Vec<String>> {
        let backend = self.conn.get_database_backend();
        let stmt = Statement::from_string(
            backend,
            r"SELECT a.id AS id FROM anime a
              WHERE NOT EXISTS (
                SELECT 1 FROM anime_relations ar
                JOIN relations r ON r.id = ar.relation_id
                WHERE ar.anime_id = a.id AND r.relation_type = 'PREQUEL'
              )
              OR NOT EXISTS (
                SELECT 1 FROM anime_relations ar
                JOIN relations r ON r.id = ar.relation_id
                WHERE ar.anime_id = a.id AND r.relation_type = 'SEQUEL'
              )",
        );
        let rows = IdRow::find_by_statement(stmt).all(&self.conn).await?;
        Ok(rows.into_iter().map(|r| r.id).collect())
    }

    pub async fn count(&self) -> Result<u64> {
        Ok(Anime::find().count(&self.conn).await?)
    }
}
