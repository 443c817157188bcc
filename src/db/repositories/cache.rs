use crate::entities::{cache_entries, prelude::*};
use anyhow::Result;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};

/// Key-value entries with an expiry, backing [`crate::services::cache::DbCache`].
pub struct CacheRepository {
    conn: DatabaseConnection,
}

impl CacheRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Returns the live value for `key`. Expired rows are deleted on read.
    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        let Some(entry) = CacheEntries::find_by_id(key.to_string())
            .one(&self.conn)
            .await?
        else {
            return Ok(None);
        };

        if entry.expires_at <= crate::db::now() {
            self.delete(key).await?;
            return Ok(None);
        }

        Ok(Some(entry.value))
    }

    pub async fn set(&self, key: &str, value: &str, ttl: chrono::Duration) -> Result<()> {
        let expires_at = crate::db::timestamp(chrono::Utc::now() + ttl);

        CacheEntries::insert(cache_entries::ActiveModel {
            key: Set(key.to_string()),
            value: Set(value.to_string()),
            expires_at: Set(expires_at),
        })
        .on_conflict(
            sea_orm::sea_query::OnConflict::column(cache_entries::Column::Key)
                .update_columns([
                    cache_entries::Column::Value,
                    cache_entries::Column::ExpiresAt,
                ])
                .to_owned(),
        )
        .exec_without_returning(&self.conn)
        .await?;

        Ok(())
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        CacheEntries::delete_by_id(key.to_string())
            .exec(&self.conn)
            .await?;
        Ok(())
    }

    pub async fn purge_expired(&self) -> Result<u64> {
        let now = crate::db::now();
        let result = CacheEntries::delete_many()
            .filter(cache_entries::Column::ExpiresAt.lte(now))
            .exec(&self.conn)
            .await?;
        Ok(result.rows_affected)
    }
}
