use crate::entities::{anime_relations, prelude::*, relations};
use crate::error::is_unique_violation;
use crate::models::RelationType;
use anyhow::Result;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, JoinType, QueryFilter, QuerySelect, RelationTrait,
    Set,
};

pub struct RelationRepository {
    conn: DatabaseConnection,
}

impl RelationRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn find(
        &self,
        relation_type: RelationType,
        anime_id: &str,
    ) -> Result<Option<relations::Model>> {
        Ok(Relations::find()
            .filter(relations::Column::RelationType.eq(relation_type.to_string()))
            .filter(relations::Column::AnimeId.eq(anime_id))
            .one(&self.conn)
            .await?)
    }

    /// Find-or-create on the `(relation_type, anime_id)` natural key.
    pub async fn find_or_create(
        &self,
        relation_type: RelationType,
        anime_id: &str,
    ) -> Result<relations::Model> {
        if let Some(existing) = self.find(relation_type, anime_id).await? {
            return Ok(existing);
        }

        let model = relations::ActiveModel {
            id: Set(uuid::Uuid::new_v4().to_string()),
            relation_type: Set(relation_type.to_string()),
            anime_id: Set(anime_id.to_string()),
        };

        match Relations::insert(model).exec_with_returning(&self.conn).await {
            Ok(created) => Ok(created),
            Err(e) if is_unique_violation(&e) => self
                .find(relation_type, anime_id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("Relation {relation_type}/{anime_id} vanished")),
            Err(e) => Err(e.into()),
        }
    }

    /// Links `anime_id` to a relation row. Linking twice is a no-op.
    pub async fn link(&self, anime_id: &str, relation_id: &str) -> Result<()> {
        AnimeRelations::insert(anime_relations::ActiveModel {
            anime_id: Set(anime_id.to_string()),
            relation_id: Set(relation_id.to_string()),
        })
        .on_conflict(
            sea_orm::sea_query::OnConflict::columns([
                anime_relations::Column::AnimeId,
                anime_relations::Column::RelationId,
            ])
            .do_nothing()
            .to_owned(),
        )
        .exec_without_returning(&self.conn)
        .await?;
        Ok(())
    }

    pub async fn linked_from(&self, anime_id: &str) -> Result<Vec<relations::Model>> {
        Ok(Relations::find()
            .join(JoinType::InnerJoin, relations::Relation::AnimeRelations.def())
            .filter(anime_relations::Column::AnimeId.eq(anime_id))
            .all(&self.conn)
            .await?)
    }
}
