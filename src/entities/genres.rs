use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "genres")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub name: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::anime_genres::Entity")]
    AnimeGenres,
}

impl Related<super::anime::Entity> for Entity {
    fn to() -> RelationDef {
        super::anime_genres::Relation::Anime.def()
    }

    fn via() -> Option<RelationDef> {
        Some(super::anime_genres::Relation::Genres.def().rev())
    }
}

impl ActiveModelBehavior for ActiveModel {}
