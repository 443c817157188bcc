use crate::entities::{prelude::*, websites};
use anyhow::Result;
use sea_orm::{DatabaseConnection, EntityTrait, QueryOrder, Set};

pub struct WebsiteRepository {
    conn: DatabaseConnection,
}

impl WebsiteRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn upsert(&self, website: &websites::Model) -> Result<()> {
        Websites::insert(websites::ActiveModel {
            id: Set(website.id.clone()),
            name: Set(website.name.clone()),
            url: Set(website.url.clone()),
            locale: Set(website.locale.clone()),
            priority: Set(website.priority),
        })
        .on_conflict(
            sea_orm::sea_query::OnConflict::column(websites::Column::Id)
                .update_columns([
                    websites::Column::Name,
                    websites::Column::Url,
                    websites::Column::Locale,
                    websites::Column::Priority,
                ])
                .to_owned(),
        )
        .exec_without_returning(&self.conn)
        .await?;
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<Option<websites::Model>> {
        Ok(Websites::find_by_id(id.to_string()).one(&self.conn).await?)
    }

    pub async fn list(&self) -> Result<Vec<websites::Model>> {
        Ok(Websites::find()
            .order_by_asc(websites::Column::Priority)
            .all(&self.conn)
            .await?)
    }
}
