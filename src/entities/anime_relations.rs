use sea_orm::entity::prelude::*;

/// Links an anime to the relation rows describing its neighbours.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "anime_relations")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub anime_id: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub relation_id: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::anime::Entity",
        from = "Column::AnimeId",
        to = "super::anime::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Anime,
    #[sea_orm(
        belongs_to = "super::relations::Entity",
        from = "Column::RelationId",
        to = "super::relations::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Relations,
}

impl Related<super::anime::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Anime.def()
    }
}

impl Related<super::relations::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Relations.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
