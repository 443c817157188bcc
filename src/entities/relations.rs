use sea_orm::entity::prelude::*;

/// A typed edge target. `(relation_type, anime_id)` is unique: one row per
/// "SEQUEL of anime X" no matter how many anime link to it.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "relations")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub relation_type: String,
    /// The related anime this edge points at.
    pub anime_id: String,
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
    Target,
    #[sea_orm(has_many = "super::anime_relations::Entity")]
    AnimeRelations,
}

impl Related<super::anime::Entity> for Entity {
    fn to() -> RelationDef {
        super::anime_relations::Relation::Anime.def()
    }

    fn via() -> Option<RelationDef> {
        Some(super::anime_relations::Relation::Relations.def().rev())
    }
}

impl ActiveModelBehavior for ActiveModel {}
