use sea_orm::entity::prelude::*;

/// `(anime_id, number)` is unique; see the initial migration.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "episodes")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub anime_id: String,
    pub number: i32,
    pub title: Option<String>,
    /// JSON object of language -> title.
    #[sea_orm(column_type = "Text", nullable)]
    pub title_variations: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,
    pub image: Option<String>,
    pub aired_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Model {
    /// Every metadata field a provider can fill is present.
    #[must_use]
    pub const fn has_complete_meta(&self) -> bool {
        self.title.is_some()
            && self.title_variations.is_some()
            && self.description.is_some()
            && self.image.is_some()
            && self.aired_at.is_some()
    }

    /// Complete apart from the image, which backup providers never supply.
    #[must_use]
    pub const fn has_meta_except_image(&self) -> bool {
        self.title.is_some()
            && self.title_variations.is_some()
            && self.description.is_some()
            && self.aired_at.is_some()
    }
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
    #[sea_orm(has_many = "super::sources::Entity")]
    Sources,
}

impl Related<super::anime::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Anime.def()
    }
}

impl Related<super::sources::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Sources.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
